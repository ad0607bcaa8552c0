//! Store-and-forward dispatch link: message model, capacity policy,
//! exchange cycle and history backup.
//! Host-driven: no I/O; host passes events and receives actions.

pub mod party;
pub mod config;
pub mod message;
pub mod dispatch;
pub mod protocol;
pub mod wire;

pub use config::{Config, ConfigError, MessageLimits};
pub use dispatch::Dispatch;
pub use message::{BodyDecodeError, Field, Message, ValidationError};
pub use party::{Party, PartyDirectory, PartyId};
pub use protocol::{Frame, PROTOCOL_VERSION};
pub use wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
pub use core::{ComposeError, CycleEvent, Draft, ExchangeError, ExchangeOutcome, LinkCore, Phase, SessionError};
pub use backup::{BackupStore, StorageError};
pub use card::{CardError, CardInput, CardReader};
pub use history::{Direction, ExchangeHistory, ExchangeRecord};
pub use role::Role;

pub mod capacity;
pub mod countdown;
pub mod card;
pub mod session;
pub mod render;
pub mod history;
pub mod role;
pub mod integrity;
pub mod backup;
pub mod core;
