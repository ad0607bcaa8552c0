//! Who is at the terminal.

use crate::party::{Party, PartyDirectory};

/// The current party. Starts (and ends after logout) as the directory's
/// unauthenticated party.
#[derive(Debug, Clone)]
pub struct Session {
    current: Party,
}

impl Session {
    pub fn anonymous(directory: &PartyDirectory) -> Self {
        Self {
            current: directory.no_account().clone(),
        }
    }

    /// A session fixed to one party, e.g. Earth on the server.
    pub fn as_party(party: Party) -> Self {
        Self { current: party }
    }

    pub fn current(&self) -> &Party {
        &self.current
    }

    pub fn is_authenticated(&self) -> bool {
        !self.current.is_anonymous()
    }

    pub(crate) fn switch_to(&mut self, party: Party) -> Party {
        std::mem::replace(&mut self.current, party)
    }
}
