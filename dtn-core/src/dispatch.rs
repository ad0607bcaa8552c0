//! Dispatch: the capacity-bounded batch of messages exchanged once per cycle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{BodyDecodeError, Message};
use crate::party::{Party, PartyDirectory};

/// Ordered batch of at most `capacity` messages.
///
/// The bound also holds for dispatches decoded from the wire or a backup:
/// deserialization rejects an over-full dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DispatchRepr")]
pub struct Dispatch {
    id: Uuid,
    capacity: usize,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct DispatchRepr {
    id: Uuid,
    capacity: usize,
    messages: Vec<Message>,
}

impl TryFrom<DispatchRepr> for Dispatch {
    type Error = OverCapacity;

    fn try_from(repr: DispatchRepr) -> Result<Self, Self::Error> {
        if repr.messages.len() > repr.capacity {
            return Err(OverCapacity {
                len: repr.messages.len(),
                capacity: repr.capacity,
            });
        }
        Ok(Self {
            id: repr.id,
            capacity: repr.capacity,
            messages: repr.messages,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("dispatch holds {len} messages but its capacity is {capacity}")]
pub struct OverCapacity {
    pub len: usize,
    pub capacity: usize,
}

impl Dispatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
            messages: Vec::with_capacity(capacity),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.messages.len() == self.capacity
    }

    /// Append all of `messages` or none. Returns false (and leaves the
    /// dispatch unchanged) if they do not all fit.
    pub fn append_batch(&mut self, messages: impl IntoIterator<Item = Message>) -> bool {
        let batch: Vec<Message> = messages.into_iter().collect();
        if batch.len() > self.capacity - self.messages.len() {
            return false;
        }
        self.messages.extend(batch);
        true
    }

    pub fn count_by_sender(&self, party: &Party) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender().id() == party.id())
            .count()
    }

    /// Re-resolve every message's parties against the local directory.
    pub fn refresh_parties(&mut self, directory: &PartyDirectory) {
        for message in &mut self.messages {
            message.refresh_parties(directory);
        }
    }

    /// Encode every message whose sender or recipient prefers encoding.
    pub fn encode_all(&mut self) {
        for message in self.messages.iter_mut().filter(|m| m.wants_encoding()) {
            message.encode();
        }
    }

    /// Encode the messages `party` sent or received.
    pub fn encode_all_of(&mut self, party: &Party) {
        for message in self.messages.iter_mut().filter(|m| m.involves(party.id())) {
            message.encode();
        }
    }

    /// Decode the messages `party` sent or received.
    pub fn decode_all_of(&mut self, party: &Party) -> Result<(), BodyDecodeError> {
        decode_each(self.messages.iter_mut().filter(|m| m.involves(party.id())))
    }

    pub fn decode_all(&mut self) -> Result<(), BodyDecodeError> {
        decode_each(self.messages.iter_mut())
    }
}

/// Decode every message, carrying on past malformed bodies; the first
/// failure is returned once all others were attempted.
fn decode_each<'a>(messages: impl Iterator<Item = &'a mut Message>) -> Result<(), BodyDecodeError> {
    let mut first_err = None;
    for message in messages {
        if let Err(e) = message.decode() {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
