//! Backup file for the exchange history.
//!
//! # File format
//!
//! ```text
//! [magic "DTNB" 4B][version 1B][payload len u32 LE][sha256 32B][payload]
//! ```
//!
//! The payload is the bincode-serialized `Vec<ExchangeRecord>` of non-empty
//! dispatches, in history order. Writes go to a temporary file in the same
//! directory which is fsynced and renamed over the backup, so a reader sees
//! either the old or the new content.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::history::{ExchangeHistory, ExchangeRecord};
use crate::integrity::{self, DIGEST_LEN};

const MAGIC: &[u8; 4] = b"DTNB";
pub const FORMAT_VERSION: u8 = 1;
/// Shortest file that can hold a header. Anything smaller is treated as
/// an interrupted first write and ignored.
pub const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + DIGEST_LEN;

/// Backup file at a fixed path.
#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist every non-empty record of `history`, replacing the file.
    pub fn save(&self, history: &ExchangeHistory) -> Result<usize, StorageError> {
        let records: Vec<&ExchangeRecord> = history.non_empty().collect();
        let payload = bincode::serialize(&records)?;
        let len = u32::try_from(payload.len()).map_err(|_| StorageError::TooLarge(payload.len()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&integrity::digest(&payload));
        out.extend_from_slice(&payload);

        let tmp = self.tmp_path()?;
        {
            let mut file = fs::File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            file.write_all(&out).map_err(|e| StorageError::io(&tmp, e))?;
            file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::io(&self.path, e));
        }
        debug!(path = %self.path.display(), records = records.len(), bytes = out.len(), "backup saved");
        Ok(records.len())
    }

    /// Load the saved records, empty dispatches dropped. A missing file or
    /// one shorter than a header yields no records.
    pub fn restore(&self) -> Result<Vec<ExchangeRecord>, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        if raw.len() < HEADER_LEN {
            warn!(
                path = %self.path.display(),
                bytes = raw.len(),
                "backup shorter than its header, ignoring"
            );
            return Ok(Vec::new());
        }

        let (header, payload) = raw.split_at(HEADER_LEN);
        if &header[..4] != MAGIC {
            return Err(StorageError::BadMagic);
        }
        if header[4] != FORMAT_VERSION {
            return Err(StorageError::UnsupportedVersion(header[4]));
        }
        let expected = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if payload.len() != expected {
            return Err(StorageError::LengthMismatch {
                expected,
                actual: payload.len(),
            });
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&header[9..HEADER_LEN]);
        if !integrity::verify(payload, &digest) {
            return Err(StorageError::DigestMismatch);
        }

        let records: Vec<ExchangeRecord> = bincode::deserialize(payload)?;
        Ok(records
            .into_iter()
            .filter(|r| !r.dispatch.is_empty())
            .collect())
    }

    /// Move an unreadable backup aside to `<path>.corrupt` so the next
    /// save does not replace it. Returns the new location.
    pub fn quarantine(&self) -> Result<PathBuf, StorageError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        let target = PathBuf::from(name);
        fs::rename(&self.path, &target).map_err(|e| StorageError::io(&self.path, e))?;
        warn!(from = %self.path.display(), to = %target.display(), "unreadable backup moved aside");
        Ok(target)
    }

    fn tmp_path(&self) -> Result<PathBuf, StorageError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| StorageError::io(&parent, e))?;
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("backup");
        Ok(parent.join(format!(".{name}.tmp")))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("backup i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("backup serialization error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("not a dispatch backup (bad magic)")]
    BadMagic,
    #[error("unsupported backup format version {0}")]
    UnsupportedVersion(u8),
    #[error("backup truncated: header announces {expected} payload bytes, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("backup digest mismatch")]
    DigestMismatch,
    #[error("backup payload too large: {0} bytes")]
    TooLarge(usize),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageLimits;
    use crate::dispatch::Dispatch;
    use crate::history::Direction;
    use crate::message::Message;
    use crate::party::{Party, PartyId};
    use chrono::Utc;

    fn dispatch_with(n: usize) -> Dispatch {
        let crew = Party::new(PartyId(3), "Test unencrypted user", false, 2);
        let earth = Party::new(PartyId::EARTH, "Earth", false, 6);
        let mut d = Dispatch::new(6);
        for i in 0..n {
            let m = Message::create(
                crew.clone(),
                earth.clone(),
                format!("subject {i}"),
                format!("body {i}"),
                Utc::now(),
                &MessageLimits::default(),
            )
            .unwrap();
            assert!(d.append_batch([m]));
        }
        d
    }

    fn sample_history() -> ExchangeHistory {
        ExchangeHistory::resume(
            vec![
                ExchangeRecord::sent(dispatch_with(2)),
                ExchangeRecord::received(dispatch_with(0)),
                ExchangeRecord::received(dispatch_with(1)),
            ],
            6,
        )
    }

    #[test]
    fn save_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("server_backup.bin"));
        let history = sample_history();
        assert_eq!(store.save(&history).unwrap(), 2);

        let restored = store.restore().unwrap();
        let expected: Vec<ExchangeRecord> = history.non_empty().cloned().collect();
        assert_eq!(restored, expected);
        assert_eq!(restored[0].direction, Direction::Sent);
        assert_eq!(restored[1].direction, Direction::Received);
        assert!(restored.iter().all(|r| !r.dispatch.is_empty()));
    }

    #[test]
    fn missing_file_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("none.bin"));
        assert!(store.restore().unwrap().is_empty());
    }

    #[test]
    fn short_file_restores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, b"DTNB\x01").unwrap();
        assert!(BackupStore::new(&path).restore().unwrap().is_empty());
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bin");
        let store = BackupStore::new(&path);
        store.save(&sample_history()).unwrap();
        let raw = fs::read(&path).unwrap();
        fs::write(&path, &raw[..raw.len() - 3]).unwrap();
        assert!(matches!(
            store.restore(),
            Err(StorageError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_payload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bin");
        let store = BackupStore::new(&path);
        store.save(&sample_history()).unwrap();
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, &raw).unwrap();
        assert!(matches!(store.restore(), Err(StorageError::DigestMismatch)));
    }

    #[test]
    fn foreign_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.bin");
        fs::write(&path, vec![0u8; HEADER_LEN + 8]).unwrap();
        assert!(matches!(
            BackupStore::new(&path).restore(),
            Err(StorageError::BadMagic)
        ));
    }

    #[test]
    fn quarantined_backup_survives_next_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_backup.bin");
        let garbage = vec![0xAAu8; HEADER_LEN + 8];
        fs::write(&path, &garbage).unwrap();
        let store = BackupStore::new(&path);
        assert!(store.restore().is_err());

        let moved = store.quarantine().unwrap();
        assert_eq!(moved, dir.path().join("client_backup.bin.corrupt"));
        store.save(&sample_history()).unwrap();
        assert_eq!(fs::read(&moved).unwrap(), garbage);
        assert_eq!(store.restore().unwrap().len(), 2);
    }

    #[test]
    fn save_replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new(dir.path().join("nested").join("b.bin"));
        store.save(&sample_history()).unwrap();
        let smaller = ExchangeHistory::resume(vec![ExchangeRecord::sent(dispatch_with(1))], 6);
        store.save(&smaller).unwrap();
        let restored = store.restore().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].dispatch.len(), 1);
        assert!(!dir.path().join("nested").join(".b.bin.tmp").exists());
    }
}
