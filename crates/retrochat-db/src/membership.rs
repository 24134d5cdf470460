use chrono::Utc;
use retrochat_types::models::{
    Member, MembershipStatus, Message, PendingRequest, RoomCode, SYSTEM_SENDER, joined_notice,
    left_notice,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use crate::messages::append_in;
use crate::models::{MemberRow, format_timestamp};
use crate::rooms::require_host;
use crate::{Database, StoreError, StoreResult};

impl Database {
    // -- Membership Manager --

    /// Queues a join request. Usernames compare case-insensitively; a name
    /// already used by the host or a member is refused, and so is a second
    /// request under the same name.
    pub fn insert_pending(&self, code: &RoomCode, username: &str) -> StoreResult<PendingRequest> {
        let requested_at = Utc::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let host = require_host(&tx, code)?;
            if host.eq_ignore_ascii_case(username) || member_exists(&tx, code, username)? {
                return Err(StoreError::UsernameTaken {
                    code: code.clone(),
                    username: username.to_string(),
                });
            }

            let inserted = tx.execute(
                "INSERT INTO pending_users (room_code, username, requested_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_code, username) DO NOTHING",
                (code.as_str(), username, format_timestamp(requested_at)),
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyPending {
                    code: code.clone(),
                    username: username.to_string(),
                });
            }

            tx.commit()?;

            Ok(PendingRequest {
                room_code: code.clone(),
                username: username.to_string(),
                requested_at,
            })
        })
    }

    /// Pending usernames, oldest request first.
    pub fn list_pending(&self, code: &RoomCode) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            require_host(&tx, code)?;

            let mut stmt =
                tx.prepare("SELECT username FROM pending_users WHERE room_code = ?1 ORDER BY id")?;
            let names = stmt
                .query_map([code.as_str()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            drop(stmt);

            tx.finish()?;
            Ok(names)
        })
    }

    /// Consumes the pending request, records the member and appends the
    /// "has joined" notice, all or nothing. Whoever deletes the pending row
    /// first wins; everyone after sees `NoSuchPendingRequest`.
    pub fn approve_pending(&self, code: &RoomCode, username: &str) -> StoreResult<Message> {
        let joined_at = Utc::now();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            require_host(&tx, code)?;
            let name = take_pending(&tx, code, username)?;

            tx.execute(
                "INSERT INTO room_users (room_code, username, joined_at) VALUES (?1, ?2, ?3)",
                (code.as_str(), &name, format_timestamp(joined_at)),
            )?;
            let notice = append_in(&tx, code, SYSTEM_SENDER, &joined_notice(&name), true)?;

            tx.commit()?;

            info!("{} approved into room {}", name, code);
            Ok(notice)
        })
    }

    /// Consumes the pending request without admitting anyone. Same race
    /// contract as `approve_pending`. Also used when a waiting guest gives up.
    pub fn reject_pending(&self, code: &RoomCode, username: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_host(&tx, code)?;
            let name = take_pending(&tx, code, username)?;
            tx.commit()?;

            info!("{} turned away from room {}", name, code);
            Ok(())
        })
    }

    pub fn is_member(&self, code: &RoomCode, username: &str) -> StoreResult<bool> {
        self.with_conn(|conn| member_exists(conn, code, username))
    }

    pub fn membership_status(&self, code: &RoomCode, username: &str) -> StoreResult<MembershipStatus> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let host = require_host(&tx, code)?;
            let status = if host.eq_ignore_ascii_case(username) {
                MembershipStatus::Host
            } else if member_exists(&tx, code, username)? {
                MembershipStatus::Member
            } else if pending_exists(&tx, code, username)? {
                MembershipStatus::Pending
            } else {
                MembershipStatus::Absent
            };

            tx.finish()?;
            Ok(status)
        })
    }

    pub fn list_members(&self, code: &RoomCode) -> StoreResult<Vec<Member>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, joined_at FROM room_users
                 WHERE room_code = ?1 ORDER BY joined_at, rowid",
            )?;
            let rows = stmt
                .query_map([code.as_str()], MemberRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(|r| r.into_member(code)).collect())
        })
    }

    /// Guest departure. Removes the member row and appends the "has left"
    /// notice in one transaction; returns `None` if the user was not a member.
    pub fn remove_member(&self, code: &RoomCode, username: &str) -> StoreResult<Option<Message>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_host(&tx, code)?;

            let name: Option<String> = tx
                .query_row(
                    "DELETE FROM room_users WHERE room_code = ?1 AND username = ?2 RETURNING username",
                    (code.as_str(), username),
                    |row| row.get(0),
                )
                .optional()?;

            let Some(name) = name else {
                return Ok(None);
            };

            let notice = append_in(&tx, code, SYSTEM_SENDER, &left_notice(&name), true)?;
            tx.commit()?;

            info!("{} left room {}", name, code);
            Ok(Some(notice))
        })
    }
}

/// Deletes the pending row and returns the stored spelling of the name.
fn take_pending(conn: &Connection, code: &RoomCode, username: &str) -> StoreResult<String> {
    conn.query_row(
        "DELETE FROM pending_users WHERE room_code = ?1 AND username = ?2 RETURNING username",
        (code.as_str(), username),
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::NoSuchPendingRequest {
        code: code.clone(),
        username: username.to_string(),
    })
}

pub(crate) fn member_exists(conn: &Connection, code: &RoomCode, username: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM room_users WHERE room_code = ?1 AND username = ?2)",
        (code.as_str(), username),
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn pending_exists(conn: &Connection, code: &RoomCode, username: &str) -> StoreResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pending_users WHERE room_code = ?1 AND username = ?2)",
        (code.as_str(), username),
        |row| row.get(0),
    )?;
    Ok(exists)
}
