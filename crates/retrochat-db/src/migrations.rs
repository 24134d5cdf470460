use rusqlite::Connection;
use tracing::info;

use crate::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (rooms, membership, messages)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE rooms (
                code        TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                host        TEXT NOT NULL COLLATE NOCASE,
                created_at  TEXT NOT NULL,
                -- per-room message counter; messages.seq is drawn from it
                last_seq    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE pending_users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                room_code     TEXT NOT NULL REFERENCES rooms(code) ON DELETE CASCADE,
                username      TEXT NOT NULL COLLATE NOCASE,
                requested_at  TEXT NOT NULL,
                UNIQUE(room_code, username)
            );

            CREATE TABLE room_users (
                room_code   TEXT NOT NULL REFERENCES rooms(code) ON DELETE CASCADE,
                username    TEXT NOT NULL COLLATE NOCASE,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (room_code, username)
            );

            CREATE TABLE messages (
                room_code   TEXT NOT NULL REFERENCES rooms(code) ON DELETE CASCADE,
                seq         INTEGER NOT NULL,
                sender      TEXT NOT NULL,
                body        TEXT NOT NULL,
                is_system   INTEGER NOT NULL DEFAULT 0,
                sent_at     TEXT NOT NULL,
                PRIMARY KEY (room_code, seq)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
