//! Messages sent to live log viewers over the streaming WebSocket.
//!
//! Keep-alive pings are transport frames and have no message type here.

use serde::{Deserialize, Serialize};

use crate::machine::MachineStatus;
use crate::types::DbId;

/// First message of every session: the machine snapshot.
pub const MSG_TYPE_INIT: &str = "init";

/// One progress log line.
pub const MSG_TYPE_LOG: &str = "log";

/// Terminal status; always the last message of a session.
pub const MSG_TYPE_STATUS: &str = "status";

/// Machine snapshot carried by the `init` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub id: DbId,
    pub name: String,
    pub address: String,
    pub status: MachineStatus,
    pub credential_removed: bool,
}

/// A single application message on the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Init {
        machine: MachineSnapshot,
    },
    Log {
        line: String,
    },
    Status {
        status: MachineStatus,
        credential_removed: bool,
    },
}

impl StreamMessage {
    /// Wire-level message type string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => MSG_TYPE_INIT,
            Self::Log { .. } => MSG_TYPE_LOG,
            Self::Status { .. } => MSG_TYPE_STATUS,
        }
    }

    /// Serialize to the JSON text frame payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
