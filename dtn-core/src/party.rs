//! Parties (senders/recipients) and the static directory they are looked up in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric party id. Card ids decode to up to ten digits, so this is 64-bit.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId(pub u64);

impl PartyId {
    /// Reserved id of the unauthenticated party.
    pub const NO_ACCOUNT: PartyId = PartyId(0);
    /// Id of the Earth endpoint; every server-authored message is sent by it.
    pub const EARTH: PartyId = PartyId(1);

    pub fn is_anonymous(&self) -> bool {
        *self == Self::NO_ACCOUNT
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant on the link. Immutable once created.
///
/// Equality is by id only: parties are re-resolved from the directory and
/// copied into every message, so two values with the same id are the same party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    display_name: String,
    encryption_preference: bool,
    message_quota: usize,
}

impl Party {
    pub fn new(
        id: PartyId,
        display_name: impl Into<String>,
        encryption_preference: bool,
        message_quota: usize,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            encryption_preference,
            message_quota,
        }
    }

    pub fn id(&self) -> PartyId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether messages sent to or by this party are kept encoded.
    pub fn encryption_preference(&self) -> bool {
        self.encryption_preference
    }

    /// Messages this party may put into a single dispatch.
    pub fn message_quota(&self) -> usize {
        self.message_quota
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_anonymous()
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Party {}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Longest display name a directory accepts. Frame size planning in
/// [`crate::config::Config::validate`] assumes it.
pub const MAX_DISPLAY_NAME_CHARS: usize = 40;

/// Static mapping from symbolic key to party.
#[derive(Debug, Clone)]
pub struct PartyDirectory {
    entries: Vec<(String, Party)>,
    no_account: usize,
    earth: usize,
}

impl PartyDirectory {
    /// Build a directory. Must contain the `NO_ACCOUNT` and `EARTH` ids; the
    /// core relies on both being resolvable.
    pub fn new(entries: Vec<(String, Party)>) -> Result<Self, DirectoryError> {
        for (i, (key, party)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(k, p)| k == key || p.id == party.id) {
                return Err(DirectoryError::Duplicate(key.clone()));
            }
            if party.display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(DirectoryError::NameTooLong(key.clone()));
            }
        }
        let position = |id: PartyId| {
            entries
                .iter()
                .position(|(_, p)| p.id == id)
                .ok_or(DirectoryError::MissingReserved(id))
        };
        let no_account = position(PartyId::NO_ACCOUNT)?;
        let earth = position(PartyId::EARTH)?;
        Ok(Self {
            entries,
            no_account,
            earth,
        })
    }

    /// The deployment's built-in parties. Earth may fill a whole dispatch.
    pub fn builtin(dispatch_capacity: usize) -> Self {
        Self {
            entries: vec![
                (
                    "no_account".to_string(),
                    Party::new(PartyId::NO_ACCOUNT, "No account", false, 0),
                ),
                (
                    "earth".to_string(),
                    Party::new(PartyId::EARTH, "Earth", false, dispatch_capacity),
                ),
                (
                    "test_encrypted_user".to_string(),
                    Party::new(PartyId(2), "Test encrypted user", true, 1),
                ),
                (
                    "test_unencrypted_user".to_string(),
                    Party::new(PartyId(3), "Test unencrypted user", false, 2),
                ),
            ],
            no_account: 0,
            earth: 1,
        }
    }

    pub fn get(&self, id: PartyId) -> Option<&Party> {
        self.entries.iter().map(|(_, p)| p).find(|p| p.id == id)
    }

    pub fn by_key(&self, key: &str) -> Option<&Party> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    pub fn no_account(&self) -> &Party {
        &self.entries[self.no_account].1
    }

    pub fn earth(&self) -> &Party {
        &self.entries[self.earth].1
    }

    /// Iterate `(key, party)` in directory order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Party)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory has no party with reserved id {0}")]
    MissingReserved(PartyId),
    #[error("duplicate directory entry: {0}")]
    Duplicate(String),
    #[error("display name of {0} is longer than {MAX_DISPLAY_NAME_CHARS} characters")]
    NameTooLong(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id() {
        let a = Party::new(PartyId(7), "Seven", true, 3);
        let b = Party::new(PartyId(7), "Renamed", false, 0);
        let c = Party::new(PartyId(8), "Seven", true, 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn builtin_lookup() {
        let dir = PartyDirectory::builtin(6);
        assert_eq!(dir.earth().message_quota(), 6);
        assert!(dir.no_account().is_anonymous());
        assert_eq!(dir.no_account().message_quota(), 0);
        let enc = dir.by_key("test_encrypted_user").unwrap();
        assert!(enc.encryption_preference());
        assert_eq!(dir.get(PartyId(3)).unwrap().display_name(), "Test unencrypted user");
        assert!(dir.get(PartyId(6973377)).is_none());
    }

    #[test]
    fn new_requires_reserved_parties() {
        let only_earth = vec![(
            "earth".to_string(),
            Party::new(PartyId::EARTH, "Earth", false, 4),
        )];
        assert!(matches!(
            PartyDirectory::new(only_earth),
            Err(DirectoryError::MissingReserved(PartyId::NO_ACCOUNT))
        ));
    }

    #[test]
    fn new_rejects_duplicates() {
        let entries = vec![
            ("no_account".to_string(), Party::new(PartyId(0), "No account", false, 0)),
            ("earth".to_string(), Party::new(PartyId(1), "Earth", false, 4)),
            ("crew".to_string(), Party::new(PartyId(1), "Crew", false, 2)),
        ];
        assert!(matches!(
            PartyDirectory::new(entries),
            Err(DirectoryError::Duplicate(_))
        ));
    }

    #[test]
    fn new_rejects_long_names() {
        let entries = vec![
            ("no_account".to_string(), Party::new(PartyId(0), "No account", false, 0)),
            ("earth".to_string(), Party::new(PartyId(1), "Earth", false, 4)),
            (
                "crew".to_string(),
                Party::new(PartyId(2), "c".repeat(MAX_DISPLAY_NAME_CHARS + 1), false, 2),
            ),
        ];
        assert!(matches!(
            PartyDirectory::new(entries),
            Err(DirectoryError::NameTooLong(k)) if k == "crew"
        ));
    }

    #[test]
    fn display_shows_name_and_id() {
        let p = Party::new(PartyId(3), "Test unencrypted user", false, 2);
        assert_eq!(p.to_string(), "Test unencrypted user (3)");
    }
}
