use chrono::Utc;
use retrochat_types::models::{Cursor, Message, Room, RoomCode, RoomSnapshot, SYSTEM_SENDER};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::messages::append_in;
use crate::models::{RoomRow, format_timestamp};
use crate::{Database, StoreError, StoreResult};

impl Database {
    // -- Room Store --

    /// Inserts a room under `code`. Returns `None` when the code already
    /// belongs to a live room; the primary key makes check-and-insert one step.
    pub fn insert_room(&self, code: &RoomCode, name: &str, host: &str) -> StoreResult<Option<Room>> {
        let created_at = Utc::now();
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO rooms (code, name, host, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(code) DO NOTHING",
                (code.as_str(), name, host, format_timestamp(created_at)),
            )?;

            if inserted == 0 {
                debug!("Room code {} already taken", code);
                return Ok(None);
            }

            Ok(Some(Room {
                code: code.clone(),
                name: name.to_string(),
                host_username: host.to_string(),
                created_at,
            }))
        })
    }

    pub fn get_room(&self, code: &RoomCode) -> StoreResult<Option<Room>> {
        self.with_conn(|conn| query_room(conn, code))
    }

    /// Removes the room and everything that references it as one transaction.
    /// Returns false if there was no such room.
    pub fn delete_room(&self, code: &RoomCode) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = purge_room(&tx, code)?;
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Host teardown: appends the host's farewell notice and then purges the
    /// room, all inside one transaction. The notice is returned so it can be
    /// handed to viewers that are still attached.
    pub fn close_room(&self, code: &RoomCode, farewell: &str) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let notice = append_in(&tx, code, SYSTEM_SENDER, farewell, true)?;
            purge_room(&tx, code)?;
            tx.commit()?;

            info!("Room {} closed", code);
            Ok(notice)
        })
    }

    pub fn count_rooms(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM rooms", [], |r| r.get(0))?;
            Ok(u64::try_from(n).unwrap_or_default())
        })
    }

    /// Room header, members and pending list read under one snapshot.
    pub fn room_snapshot(&self, code: &RoomCode) -> StoreResult<RoomSnapshot> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let (row, last_seq) = tx
                .query_row(
                    "SELECT name, host, created_at, last_seq FROM rooms WHERE code = ?1",
                    [code.as_str()],
                    |row| Ok((RoomRow::from_row(row)?, row.get::<_, i64>("last_seq")?)),
                )
                .optional()?
                .ok_or_else(|| StoreError::RoomNotFound(code.clone()))?;

            let members = usernames(
                &tx,
                "SELECT username FROM room_users WHERE room_code = ?1 ORDER BY joined_at, rowid",
                code,
            )?;
            let pending = usernames(
                &tx,
                "SELECT username FROM pending_users WHERE room_code = ?1 ORDER BY id",
                code,
            )?;

            tx.finish()?;

            Ok(RoomSnapshot {
                room: row.into_room(code),
                members,
                pending,
                last_seq: Cursor(u64::try_from(last_seq).unwrap_or_default()),
            })
        })
    }

    /// Deletes pending, member and message rows whose room no longer exists.
    /// With foreign keys on this finds nothing; it exists for databases that
    /// were written with enforcement off.
    pub fn sweep_orphans(&self) -> StoreResult<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut removed = 0;
            for table in ["messages", "pending_users", "room_users"] {
                removed += tx.execute(
                    &format!(
                        "DELETE FROM {table} WHERE room_code NOT IN (SELECT code FROM rooms)"
                    ),
                    [],
                )?;
            }
            tx.commit()?;
            Ok(removed)
        })
    }
}

pub(crate) fn query_room(conn: &Connection, code: &RoomCode) -> StoreResult<Option<Room>> {
    let row = conn
        .query_row(
            "SELECT name, host, created_at FROM rooms WHERE code = ?1",
            [code.as_str()],
            RoomRow::from_row,
        )
        .optional()?;

    Ok(row.map(|r| r.into_room(code)))
}

/// Host of a live room, or `RoomNotFound`.
pub(crate) fn require_host(conn: &Connection, code: &RoomCode) -> StoreResult<String> {
    conn.query_row(
        "SELECT host FROM rooms WHERE code = ?1",
        [code.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::RoomNotFound(code.clone()))
}

/// Ordered delete: messages, pending, members, then the room itself.
fn purge_room(conn: &Connection, code: &RoomCode) -> StoreResult<bool> {
    let messages = conn.execute("DELETE FROM messages WHERE room_code = ?1", [code.as_str()])?;
    let pending = conn.execute("DELETE FROM pending_users WHERE room_code = ?1", [code.as_str()])?;
    let members = conn.execute("DELETE FROM room_users WHERE room_code = ?1", [code.as_str()])?;
    let rooms = conn.execute("DELETE FROM rooms WHERE code = ?1", [code.as_str()])?;

    debug!(
        "Purged room {}: {} messages, {} pending, {} members",
        code, messages, pending, members
    );
    Ok(rooms > 0)
}

fn usernames(conn: &Connection, sql: &str, code: &RoomCode) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([code.as_str()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}
