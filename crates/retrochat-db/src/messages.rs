use chrono::Utc;
use retrochat_types::models::{Cursor, Message, RoomCode};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::membership::member_exists;
use crate::models::{MessageRow, format_timestamp};
use crate::rooms::require_host;
use crate::{Database, StoreError, StoreResult};

/// Hard cap on an explicitly limited page. Unlimited reads are not capped.
pub const MAX_PAGE: u32 = 500;

impl Database {
    // -- Message Log --

    /// Appends without checking who the sender is. System notices and tests
    /// go through here; user chat goes through `post_message`.
    pub fn append_message(
        &self,
        code: &RoomCode,
        sender: &str,
        body: &str,
        is_system: bool,
    ) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let message = append_in(&tx, code, sender, body, is_system)?;
            tx.commit()?;
            Ok(message)
        })
    }

    /// Appends a chat line from `sender`, who must be the host or a member.
    pub fn post_message(&self, code: &RoomCode, sender: &str, body: &str) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let host = require_host(&tx, code)?;
            if !host.eq_ignore_ascii_case(sender) && !member_exists(&tx, code, sender)? {
                return Err(StoreError::NotAMember {
                    code: code.clone(),
                    username: sender.to_string(),
                });
            }

            let message = append_in(&tx, code, sender, body, false)?;
            tx.commit()?;
            Ok(message)
        })
    }

    /// Every message with `seq > cursor`, oldest first. Pure read: calling it
    /// again with the same cursor returns the same answer until a new append.
    /// `limit` turns the read into a page of at most `MAX_PAGE`; `None`
    /// returns everything.
    pub fn messages_since(
        &self,
        code: &RoomCode,
        cursor: Cursor,
        limit: Option<u32>,
    ) -> StoreResult<Vec<Message>> {
        // SQLite reads a negative LIMIT as no limit
        let limit = limit.map_or(-1, |n| i64::from(n.clamp(1, MAX_PAGE)));
        let after = i64::try_from(cursor.value()).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            require_host(&tx, code)?;

            let mut stmt = tx.prepare(
                "SELECT seq, sender, body, is_system, sent_at FROM messages
                 WHERE room_code = ?1 AND seq > ?2
                 ORDER BY seq ASC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map((code.as_str(), after, limit), MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);

            tx.finish()?;
            Ok(rows.into_iter().map(|r| r.into_message(code)).collect())
        })
    }

    /// Bulk purge of one room's log. Returns the number of rows removed.
    pub fn delete_messages(&self, code: &RoomCode) -> StoreResult<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE room_code = ?1", [code.as_str()])?;
            Ok(n)
        })
    }
}

/// Draws the next sequence number from the room row and inserts the message.
/// The caller owns the transaction. A missing room shows up here as
/// `RoomNotFound` because the counter update touches no row.
pub(crate) fn append_in(
    conn: &Connection,
    code: &RoomCode,
    sender: &str,
    body: &str,
    is_system: bool,
) -> StoreResult<Message> {
    let seq: i64 = conn
        .query_row(
            "UPDATE rooms SET last_seq = last_seq + 1 WHERE code = ?1 RETURNING last_seq",
            [code.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::RoomNotFound(code.clone()))?;

    let sent_at = Utc::now();
    conn.execute(
        "INSERT INTO messages (room_code, seq, sender, body, is_system, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (code.as_str(), seq, sender, body, is_system, format_timestamp(sent_at)),
    )?;

    Ok(Message {
        room_code: code.clone(),
        seq: u64::try_from(seq).unwrap_or_default(),
        sender: sender.to_string(),
        body: body.to_string(),
        is_system,
        sent_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_room() -> (Database, RoomCode) {
        let db = Database::open_in_memory().unwrap();
        let code = RoomCode::from_number(48213);
        db.insert_room(&code, "Arcade", "Al").unwrap().unwrap();
        (db, code)
    }

    #[test]
    fn appends_come_back_in_call_order() {
        let (db, code) = db_with_room();
        // Same-millisecond appends must still be totally ordered
        let bodies: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        for body in &bodies {
            db.append_message(&code, "Al", body, false).unwrap();
        }

        let log = db.messages_since(&code, Cursor::START, None).unwrap();
        let got: Vec<&str> = log.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(got, bodies.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(log.first().unwrap().seq, 1);
    }

    #[test]
    fn read_since_is_idempotent() {
        let (db, code) = db_with_room();
        db.append_message(&code, "Al", "one", false).unwrap();
        let last = db.append_message(&code, "Al", "two", false).unwrap();

        assert!(db.messages_since(&code, last.cursor(), None).unwrap().is_empty());
        assert!(db.messages_since(&code, last.cursor(), None).unwrap().is_empty());

        let tail = db.messages_since(&code, Cursor(1), None).unwrap();
        assert_eq!(tail, db.messages_since(&code, Cursor(1), None).unwrap());
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].body, "two");
    }

    #[test]
    fn limit_pages_without_skipping() {
        let (db, code) = db_with_room();
        for i in 0..5 {
            db.append_message(&code, "Al", &i.to_string(), false).unwrap();
        }

        let first = db.messages_since(&code, Cursor::START, Some(2)).unwrap();
        assert_eq!(first.len(), 2);
        let rest = db
            .messages_since(&code, first.last().unwrap().cursor(), Some(10))
            .unwrap();
        let bodies: Vec<&str> = rest.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["2", "3", "4"]);
    }

    #[test]
    fn unlimited_read_is_not_capped() {
        let (db, code) = db_with_room();
        let total = MAX_PAGE as usize + 1;
        for i in 0..total {
            db.append_message(&code, "Al", &i.to_string(), false).unwrap();
        }

        let all = db.messages_since(&code, Cursor::START, None).unwrap();
        assert_eq!(all.len(), total);
        assert_eq!(all.last().unwrap().seq, total as u64);

        let page = db.messages_since(&code, Cursor::START, Some(u32::MAX)).unwrap();
        assert_eq!(page.len(), MAX_PAGE as usize);
    }

    #[test]
    fn sequences_are_per_room() {
        let (db, code) = db_with_room();
        let other = RoomCode::from_number(1);
        db.insert_room(&other, "Den", "Cy").unwrap().unwrap();

        db.append_message(&code, "Al", "a", false).unwrap();
        db.append_message(&code, "Al", "b", false).unwrap();
        let first_elsewhere = db.append_message(&other, "Cy", "c", false).unwrap();
        assert_eq!(first_elsewhere.seq, 1);
    }

    #[test]
    fn post_requires_host_or_member() {
        let (db, code) = db_with_room();
        db.post_message(&code, "al", "hello").unwrap();

        assert!(matches!(
            db.post_message(&code, "Bo", "let me in"),
            Err(StoreError::NotAMember { .. })
        ));

        db.insert_pending(&code, "Bo").unwrap();
        db.approve_pending(&code, "Bo").unwrap();
        let msg = db.post_message(&code, "Bo", "hi").unwrap();
        assert!(!msg.is_system);
        assert_eq!(msg.seq, 3);
    }

    #[test]
    fn missing_room_fails_reads_and_writes() {
        let (db, code) = db_with_room();
        db.delete_room(&code).unwrap();
        assert!(matches!(
            db.append_message(&code, "Al", "x", false),
            Err(StoreError::RoomNotFound(_))
        ));
        assert!(matches!(
            db.messages_since(&code, Cursor::START, None),
            Err(StoreError::RoomNotFound(_))
        ));
    }

    #[test]
    fn delete_messages_empties_the_log_only() {
        let (db, code) = db_with_room();
        db.append_message(&code, "Al", "x", false).unwrap();
        db.append_message(&code, "Al", "y", false).unwrap();
        assert_eq!(db.delete_messages(&code).unwrap(), 2);
        assert!(db.messages_since(&code, Cursor::START, None).unwrap().is_empty());
        assert!(db.get_room(&code).unwrap().is_some());
    }
}
