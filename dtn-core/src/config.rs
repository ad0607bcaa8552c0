//! Core limits: dispatch capacity, field lengths and cycle interval.

use chrono::{DateTime, NaiveDate, Utc};

use crate::dispatch::Dispatch;
use crate::message::Message;
use crate::party::{Party, PartyId, MAX_DISPLAY_NAME_CHARS};
use crate::protocol::Frame;
use crate::wire::MAX_FRAME_LEN;

/// Widest char in UTF-8.
const WORST_CHAR: char = '\u{1F680}';

/// Default messages per dispatch. With the default field limits a full
/// dispatch of worst-case (4-byte UTF-8, encoded) messages stays under
/// [`crate::wire::MAX_FRAME_LEN`].
pub const DEFAULT_DISPATCH_CAPACITY: usize = 6;
pub const DEFAULT_SUBJECT_MAX_CHARS: usize = 64;
pub const DEFAULT_BODY_MAX_CHARS: usize = 280;
pub const DEFAULT_SECONDS_BETWEEN_DISPATCHES: u32 = 60;

/// Maximum subject/body lengths, counted in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    pub subject_max_chars: usize,
    pub body_max_chars: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            subject_max_chars: DEFAULT_SUBJECT_MAX_CHARS,
            body_max_chars: DEFAULT_BODY_MAX_CHARS,
        }
    }
}

/// Everything the core needs to know about the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub dispatch_capacity: usize,
    pub limits: MessageLimits,
    /// Countdown length; one unit is one host tick (one second on a station).
    pub seconds_between_dispatches: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            limits: MessageLimits::default(),
            seconds_between_dispatches: DEFAULT_SECONDS_BETWEEN_DISPATCHES,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.limits.subject_max_chars == 0 {
            return Err(ConfigError::ZeroLimit("subject_max_chars"));
        }
        if self.limits.body_max_chars == 0 {
            return Err(ConfigError::ZeroLimit("body_max_chars"));
        }
        let bytes = self.worst_case_frame_len()?;
        if bytes > u64::from(MAX_FRAME_LEN) {
            return Err(ConfigError::DispatchTooLarge { bytes });
        }
        Ok(())
    }

    /// Serialized size of a full dispatch frame where every char takes four
    /// bytes, every body is encoded and both parties carry the longest
    /// allowed name.
    pub fn worst_case_frame_len(&self) -> Result<u64, ConfigError> {
        let field_bytes = 4 * (self.limits.subject_max_chars as u64 + self.limits.body_max_chars as u64);
        if field_bytes > u64::from(MAX_FRAME_LEN) {
            return Ok(field_bytes);
        }
        let party = Party::new(
            PartyId(u64::MAX),
            WORST_CHAR.to_string().repeat(MAX_DISPLAY_NAME_CHARS),
            true,
            self.dispatch_capacity,
        );
        let mut message = Message::create(
            party.clone(),
            party,
            WORST_CHAR.to_string().repeat(self.limits.subject_max_chars),
            WORST_CHAR.to_string().repeat(self.limits.body_max_chars),
            latest_timestamp()?,
            &self.limits,
        )
        .map_err(|e| ConfigError::Sizing(e.to_string()))?;
        message.encode();

        let empty = Dispatch::new(self.dispatch_capacity);
        let mut single = empty.clone();
        single.append_batch([message]);
        let size = |dispatch: Dispatch| {
            bincode::serialized_size(&Frame::Dispatch {
                seq: u64::MAX,
                dispatch,
            })
            .map_err(|e| ConfigError::Sizing(e.to_string()))
        };
        let base = size(empty)?;
        let per_message = size(single)?.saturating_sub(base);
        Ok(base.saturating_add(per_message.saturating_mul(self.dispatch_capacity as u64)))
    }
}

/// Timestamp with the longest RFC 3339 rendering in four-digit years.
fn latest_timestamp() -> Result<DateTime<Utc>, ConfigError> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999))
        .map(|t| t.and_utc())
        .ok_or_else(|| ConfigError::Sizing("timestamp out of range".to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("dispatch capacity must be at least 1")]
    ZeroCapacity,
    #[error("{0} must be at least 1")]
    ZeroLimit(&'static str),
    #[error("a full dispatch can reach {bytes} bytes, more than the {MAX_FRAME_LEN}-byte frame limit")]
    DispatchTooLarge { bytes: u64 },
    #[error("cannot size a worst-case dispatch: {0}")]
    Sizing(String),
}
