//! Endpoint roles. The client is the crew terminal: it authors messages from
//! the logged-in party to Earth and hides other parties' encoded messages.
//! The server is Earth: it authors to any party and sees everything in plain text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::MessageLimits;
use crate::core::{ComposeError, Draft};
use crate::dispatch::Dispatch;
use crate::message::{self, BodyDecodeError};
use crate::party::{Party, PartyDirectory, PartyId};
use crate::render::{self, PartyLabel};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// The role expected at the other end of the link.
    pub fn peer(&self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }

    /// Only the crew terminal has a card reader.
    pub fn supports_login(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Session a station of this role starts with.
    pub fn initial_session(&self, directory: &PartyDirectory) -> Session {
        match self {
            Role::Client => Session::anonymous(directory),
            Role::Server => Session::as_party(directory.earth().clone()),
        }
    }

    /// Check a draft before it becomes a message. The server needs a
    /// recipient before anything else is looked at.
    pub fn validate(&self, draft: &Draft, limits: &MessageLimits) -> Result<(), ComposeError> {
        if let Role::Server = self {
            if draft.recipient.as_deref().map_or(true, |r| r.trim().is_empty()) {
                return Err(ComposeError::MissingRecipient);
            }
        }
        message::validate_fields(&draft.subject, &draft.body, limits)?;
        Ok(())
    }

    /// Resolve `(sender, recipient)` for a draft.
    pub fn author(
        &self,
        draft: &Draft,
        session: &Session,
        directory: &PartyDirectory,
    ) -> Result<(Party, Party), ComposeError> {
        match self {
            Role::Client => Ok((session.current().clone(), directory.earth().clone())),
            Role::Server => {
                let wanted = draft
                    .recipient
                    .as_deref()
                    .map(str::trim)
                    .ok_or(ComposeError::MissingRecipient)?;
                let recipient = directory
                    .by_key(wanted)
                    .or_else(|| wanted.parse::<u64>().ok().and_then(|id| directory.get(PartyId(id))))
                    .ok_or_else(|| ComposeError::UnknownRecipient(wanted.to_string()))?;
                Ok((directory.earth().clone(), recipient.clone()))
            }
        }
    }

    /// Encoding policy for a dispatch arriving at (or restored into) this
    /// station, as seen by `viewer`. Preferences are read from the message
    /// parties; [`crate::LinkCore`] refreshes them from the local directory first.
    pub fn apply_view_policy(
        &self,
        dispatch: &mut Dispatch,
        viewer: &Party,
    ) -> Result<(), BodyDecodeError> {
        match self {
            Role::Server => dispatch.decode_all(),
            Role::Client => {
                dispatch.encode_all();
                if viewer.is_anonymous() {
                    return Ok(());
                }
                dispatch.decode_all_of(viewer)
            }
        }
    }

    pub fn render(&self, dispatch: &Dispatch) -> String {
        let label = match self {
            Role::Client => PartyLabel::Id,
            Role::Server => PartyLabel::NameAndId,
        };
        render::render_dispatch(dispatch, label)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Field, Message, ValidationError};
    use chrono::Utc;

    fn draft(subject: &str, body: &str, recipient: Option<&str>) -> Draft {
        Draft {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: recipient.map(str::to_string),
        }
    }

    #[test]
    fn server_requires_recipient_first() {
        let limits = MessageLimits::default();
        assert!(matches!(
            Role::Server.validate(&draft("", "", None), &limits),
            Err(ComposeError::MissingRecipient)
        ));
        assert!(matches!(
            Role::Client.validate(&draft("", "", None), &limits),
            Err(ComposeError::Validation(ValidationError::Empty(Field::Subject)))
        ));
    }

    #[test]
    fn client_authors_to_earth() {
        let dir = PartyDirectory::builtin(6);
        let mut session = Session::anonymous(&dir);
        session.switch_to(dir.get(PartyId(3)).unwrap().clone());
        let (from, to) = Role::Client
            .author(&draft("s", "b", Some("test_encrypted_user")), &session, &dir)
            .unwrap();
        assert_eq!(from.id(), PartyId(3));
        assert_eq!(to.id(), PartyId::EARTH);
    }

    #[test]
    fn server_resolves_recipient_by_key_or_id() {
        let dir = PartyDirectory::builtin(6);
        let session = Role::Server.initial_session(&dir);
        let (from, to) = Role::Server
            .author(&draft("s", "b", Some("test_encrypted_user")), &session, &dir)
            .unwrap();
        assert_eq!(from.id(), PartyId::EARTH);
        assert_eq!(to.id(), PartyId(2));
        let (_, to) = Role::Server
            .author(&draft("s", "b", Some("3")), &session, &dir)
            .unwrap();
        assert_eq!(to.id(), PartyId(3));
        assert!(matches!(
            Role::Server.author(&draft("s", "b", Some("mars")), &session, &dir),
            Err(ComposeError::UnknownRecipient(r)) if r == "mars"
        ));
    }

    fn mixed_dispatch(dir: &PartyDirectory) -> Dispatch {
        let earth = dir.earth().clone();
        let enc = dir.get(PartyId(2)).unwrap().clone();
        let plain = dir.get(PartyId(3)).unwrap().clone();
        let limits = MessageLimits::default();
        let mut d = Dispatch::new(6);
        assert!(d.append_batch([
            Message::create(earth.clone(), enc, "a", "for the encrypted user", Utc::now(), &limits)
                .unwrap(),
            Message::create(earth, plain, "b", "for the plain user", Utc::now(), &limits).unwrap(),
        ]));
        d
    }

    #[test]
    fn client_policy_hides_others_messages() {
        let dir = PartyDirectory::builtin(6);
        let mut d = mixed_dispatch(&dir);
        Role::Client
            .apply_view_policy(&mut d, dir.no_account())
            .unwrap();
        assert!(d.messages()[0].is_encoded());
        assert!(!d.messages()[1].is_encoded());

        let mut d = mixed_dispatch(&dir);
        Role::Client
            .apply_view_policy(&mut d, dir.get(PartyId(2)).unwrap())
            .unwrap();
        assert!(!d.messages()[0].is_encoded());
        assert_eq!(d.messages()[0].body(), "for the encrypted user");
    }

    #[test]
    fn server_policy_decodes_everything() {
        let dir = PartyDirectory::builtin(6);
        let mut d = mixed_dispatch(&dir);
        d.encode_all_of(dir.earth());
        Role::Server.apply_view_policy(&mut d, dir.earth()).unwrap();
        assert!(d.messages().iter().all(|m| !m.is_encoded()));
    }

    #[test]
    fn render_labels_differ_by_role() {
        let dir = PartyDirectory::builtin(6);
        let d = mixed_dispatch(&dir);
        assert!(Role::Client.render(&d).contains("Sender: 1 "));
        assert!(Role::Server.render(&d).contains("Sender: Earth (1)"));
    }
}
