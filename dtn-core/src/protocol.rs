//! DTN link wire protocol: frame types and version.

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatch;
use crate::role::Role;

/// Current protocol version. Checked in the handshake; both ends must match.
pub const PROTOCOL_VERSION: u8 = 1;

/// All wire frames. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Frame {
    /// Sent once by each side right after the connection is up.
    Hello { protocol_version: u8, role: Role },
    /// The sender's outbound dispatch. `seq` counts the sender's exchanges
    /// since the handshake, so a receiver can tell a late frame from the
    /// current one.
    Dispatch { seq: u64, dispatch: Dispatch },
}
