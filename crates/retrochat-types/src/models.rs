use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender name reserved for join/leave notices.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Number of decimal digits in a room code.
pub const ROOM_CODE_LEN: usize = 5;

/// A fixed-width decimal room code. Leading zeros are significant, so the
/// code is always carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Total number of distinct codes.
    pub const SPACE: u32 = 100_000;

    /// Accepts exactly five ASCII digits, surrounding whitespace ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == ROOM_CODE_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// Formats `n` (mod the code space) as a zero-padded code.
    pub fn from_number(n: u32) -> Self {
        Self(format!("{:05}", n % Self::SPACE))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in a room's message log. Every message carries the cursor value
/// of its own sequence number; `Cursor::START` precedes all of them.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cursor(pub u64);

impl Cursor {
    pub const START: Cursor = Cursor(0);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub name: String,
    pub host_username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub room_code: RoomCode,
    pub username: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub room_code: RoomCode,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

/// A chat line or system notice. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub room_code: RoomCode,
    pub seq: u64,
    pub sender: String,
    pub body: String,
    pub is_system: bool,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn cursor(&self) -> Cursor {
        Cursor(self.seq)
    }
}

pub fn joined_notice(username: &str) -> String {
    format!("{} has joined the chatroom", username)
}

pub fn left_notice(username: &str) -> String {
    format!("{} has left the chatroom", username)
}

/// How a username relates to a room right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Host,
    Member,
    Pending,
    Absent,
}

/// Room header plus who is in it, for collaborators that re-render after
/// every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: Room,
    pub members: Vec<String>,
    pub pending: Vec<String>,
    pub last_seq: Cursor,
}

/// What a `leave` actually did in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// Host left: the room and everything in it is gone.
    RoomClosed { farewell: Message },
    /// Guest left: one notice appended, room untouched otherwise.
    MemberLeft { farewell: Message },
    /// A waiting guest withdrew their request.
    RequestCancelled,
    /// Nothing to undo (never admitted, or already removed).
    NotInRoom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_keeps_leading_zeros() {
        assert_eq!(RoomCode::from_number(42).as_str(), "00042");
        assert_eq!(RoomCode::from_number(99_999).as_str(), "99999");
        assert_eq!(RoomCode::from_number(100_007).as_str(), "00007");
    }

    #[test]
    fn room_code_parse_rejects_bad_input() {
        assert_eq!(RoomCode::parse(" 04821 ").unwrap().as_str(), "04821");
        assert!(RoomCode::parse("4821").is_none());
        assert!(RoomCode::parse("482133").is_none());
        assert!(RoomCode::parse("48a13").is_none());
        assert!(RoomCode::parse("").is_none());
    }

    #[test]
    fn leave_outcome_is_tagged() {
        let json = serde_json::to_value(LeaveOutcome::RequestCancelled).unwrap();
        assert_eq!(json["kind"], "request_cancelled");
    }
}
