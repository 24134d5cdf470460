//! Database row types. These map directly to SQLite rows and are converted
//! into the shared `retrochat-types` models at the edge of each query.

use chrono::{DateTime, Utc};
use retrochat_types::models::{Member, Message, Room, RoomCode};
use rusqlite::Row;
use tracing::warn;

pub struct RoomRow {
    pub name: String,
    pub host: String,
    pub created_at: String,
}

impl RoomRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get("name")?,
            host: row.get("host")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn into_room(self, code: &RoomCode) -> Room {
        Room {
            code: code.clone(),
            name: self.name,
            host_username: self.host,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

pub struct MemberRow {
    pub username: String,
    pub joined_at: String,
}

impl MemberRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get("username")?,
            joined_at: row.get("joined_at")?,
        })
    }

    pub fn into_member(self, code: &RoomCode) -> Member {
        Member {
            room_code: code.clone(),
            username: self.username,
            joined_at: parse_timestamp(&self.joined_at),
        }
    }
}

pub struct MessageRow {
    pub seq: i64,
    pub sender: String,
    pub body: String,
    pub is_system: bool,
    pub sent_at: String,
}

impl MessageRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get("seq")?,
            sender: row.get("sender")?,
            body: row.get("body")?,
            is_system: row.get("is_system")?,
            sent_at: row.get("sent_at")?,
        })
    }

    pub fn into_message(self, code: &RoomCode) -> Message {
        Message {
            room_code: code.clone(),
            seq: u64::try_from(self.seq).unwrap_or_default(),
            sender: self.sender,
            body: self.body,
            is_system: self.is_system,
            sent_at: parse_timestamp(&self.sent_at),
        }
    }
}

/// Timestamps are written as RFC 3339. Older rows written by SQLite's
/// `datetime('now')` are "YYYY-MM-DD HH:MM:SS" without a zone; read those as UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_both_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(expected)), expected);
        assert_eq!(parse_timestamp("2024-03-01 12:30:05"), expected);
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }
}
