//! Text message between two parties, with the reversible body encoding.
//!
//! The encoding is plain base64 and provides no confidentiality. It only
//! keeps other parties' bodies unreadable at a glance on a shared terminal.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MessageLimits;
use crate::party::{Party, PartyDirectory, PartyId};

/// A message. Fields are fixed after [`Message::create`]; only the body
/// encoding can be toggled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    sender: Party,
    recipient: Party,
    subject: String,
    body: String,
    created_at: DateTime<Utc>,
    is_encoded: bool,
}

impl Message {
    /// Validate and build a plain (not encoded) message.
    pub fn create(
        sender: Party,
        recipient: Party,
        subject: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
        limits: &MessageLimits,
    ) -> Result<Self, ValidationError> {
        let subject = subject.into();
        let body = body.into();
        validate_fields(&subject, &body, limits)?;
        Ok(Self {
            sender,
            recipient,
            subject,
            body,
            created_at,
            is_encoded: false,
        })
    }

    pub fn sender(&self) -> &Party {
        &self.sender
    }

    pub fn recipient(&self) -> &Party {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Body as currently stored (base64 text while encoded).
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_encoded(&self) -> bool {
        self.is_encoded
    }

    /// True if `party` is the sender or the recipient.
    pub fn involves(&self, party: PartyId) -> bool {
        self.sender.id() == party || self.recipient.id() == party
    }

    /// Replace the sender and recipient with the directory's entries for
    /// the same ids. Parties the directory does not know are kept as sent.
    pub fn refresh_parties(&mut self, directory: &PartyDirectory) {
        if let Some(p) = directory.get(self.sender.id()) {
            self.sender = p.clone();
        }
        if let Some(p) = directory.get(self.recipient.id()) {
            self.recipient = p.clone();
        }
    }

    /// True if either side prefers encoded messages.
    pub fn wants_encoding(&self) -> bool {
        self.sender.encryption_preference() || self.recipient.encryption_preference()
    }

    pub fn encode(&mut self) {
        if self.is_encoded {
            return;
        }
        self.body = STANDARD.encode(self.body.as_bytes());
        self.is_encoded = true;
    }

    /// Reverse [`Message::encode`]. On a malformed body the message is left untouched.
    pub fn decode(&mut self) -> Result<(), BodyDecodeError> {
        if !self.is_encoded {
            return Ok(());
        }
        let bytes = STANDARD.decode(self.body.as_bytes())?;
        self.body = String::from_utf8(bytes)?;
        self.is_encoded = false;
        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {}: {}",
            self.created_at.format("%H:%M:%S"),
            self.sender,
            self.recipient,
            self.subject
        )
    }
}

/// Field checks shared by [`Message::create`] and the role validators.
/// Emptiness is reported before length, subject before body.
pub fn validate_fields(
    subject: &str,
    body: &str,
    limits: &MessageLimits,
) -> Result<(), ValidationError> {
    if subject.is_empty() {
        return Err(ValidationError::Empty(Field::Subject));
    }
    if body.is_empty() {
        return Err(ValidationError::Empty(Field::Body));
    }
    let len = subject.chars().count();
    if len > limits.subject_max_chars {
        return Err(ValidationError::TooLong {
            field: Field::Subject,
            len,
            max: limits.subject_max_chars,
        });
    }
    let len = body.chars().count();
    if len > limits.body_max_chars {
        return Err(ValidationError::TooLong {
            field: Field::Body,
            len,
            max: limits.body_max_chars,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Subject,
    Body,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Subject => f.write_str("subject"),
            Field::Body => f.write_str("body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the {0} of the message cannot be empty")]
    Empty(Field),
    #[error("the {field} of the message is too long ({len} characters, maximum is {max})")]
    TooLong { field: Field, len: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum BodyDecodeError {
    #[error("body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
