use serde::{Deserialize, Serialize};

use crate::models::{Cursor, Message, Role, RoomCode};

/// Change notifications published after a store mutation commits. They only
/// tell subscribers *that* something changed; the store stays the source of
/// truth for *what*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    PendingChanged { code: RoomCode },
    MessageAppended { code: RoomCode, seq: u64 },
    RoomClosed { code: RoomCode },
}

impl RoomEvent {
    pub fn room_code(&self) -> &RoomCode {
        match self {
            Self::PendingChanged { code }
            | Self::MessageAppended { code, .. }
            | Self::RoomClosed { code } => code,
        }
    }
}

/// Why a viewer stopped being in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartReason {
    /// The viewer left on their own.
    Left,
    /// The room no longer exists (host left).
    RoomClosed,
}

/// Frames sent FROM server TO a connected viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ViewerEvent {
    /// Stream attached; `role` is `None` while the request is still pending.
    Ready {
        room_code: RoomCode,
        username: String,
        role: Option<Role>,
    },

    /// Messages after the viewer's previous cursor, oldest first
    Messages { messages: Vec<Message>, cursor: Cursor },

    /// Host only: the full pending list, sent whenever it differs from the last one
    PendingUsers { usernames: Vec<String> },

    /// Waiting guest was let in
    Approved { room_code: RoomCode },

    /// Waiting guest was turned away
    Rejected { room_code: RoomCode },

    Departed {
        room_code: RoomCode,
        reason: DepartReason,
    },

    /// A command from this viewer failed; the stream stays open
    Error { kind: String, message: String },
}

/// Commands sent FROM a viewer TO the server over the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ViewerCommand {
    Send { body: String },
    Approve { username: String },
    Reject { username: String },
    Leave,
}
