pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

impl DbError {
    /// True when SQLite refused the write because another connection holds the lock.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

const SCHEMA_VERSION: i32 = 2;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// How long a writer waits on another connection's lock before SQLite reports BUSY.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    fn init(&self) -> Result<()> {
        // WAL mode so readers never block the single writer
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }
        if version < 2 {
            self.migrate_v2()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: performers, songs, partner edges and the singleton event state
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ticket_orders (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id        INTEGER NOT NULL UNIQUE,
                num_tickets     INTEGER NOT NULL CHECK (num_tickets >= 0),
                ticket_type     TEXT NOT NULL CHECK (ticket_type IN ('singer', 'audience')),
                customer_name   TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS performers (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                username            TEXT NOT NULL UNIQUE,
                first_name          TEXT NOT NULL,
                last_name           TEXT NOT NULL,
                role                TEXT NOT NULL CHECK (role IN ('singer', 'audience', 'host')),
                active              INTEGER NOT NULL DEFAULT 1,
                raffle_participant  INTEGER NOT NULL DEFAULT 0,
                raffle_winner       INTEGER NOT NULL DEFAULT 0,
                join_time           TEXT NOT NULL,
                ticket_order        INTEGER REFERENCES ticket_orders(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_performers_ticket ON performers(ticket_order);

            CREATE TABLE IF NOT EXISTS songs (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id            INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
                title               TEXT NOT NULL COLLATE NOCASE,
                show                TEXT NOT NULL COLLATE NOCASE,
                notes               TEXT NOT NULL DEFAULT '',

                -- Rank among the owner's unperformed songs; NULL once performed
                priority            INTEGER,
                -- Projected slot in the lineup; only the projector writes it
                position            INTEGER,

                request_time        TEXT NOT NULL,
                performance_time    TEXT,

                skipped             INTEGER NOT NULL DEFAULT 0,
                standby             INTEGER NOT NULL DEFAULT 0,
                spotlight           INTEGER NOT NULL DEFAULT 0,

                UNIQUE(owner_id, title, show)
            );

            CREATE INDEX IF NOT EXISTS idx_songs_owner ON songs(owner_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_songs_position
                ON songs(position) WHERE position IS NOT NULL;
            CREATE UNIQUE INDEX IF NOT EXISTS idx_songs_spotlight
                ON songs(spotlight) WHERE spotlight = 1;

            CREATE TABLE IF NOT EXISTS song_partners (
                song_id         INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
                performer_id    INTEGER NOT NULL REFERENCES performers(id) ON DELETE CASCADE,
                PRIMARY KEY (song_id, performer_id)
            );

            CREATE INDEX IF NOT EXISTS idx_partners_performer ON song_partners(performer_id);

            CREATE TABLE IF NOT EXISTS event_state (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                passcode        TEXT NOT NULL DEFAULT '',
                signup_open     INTEGER NOT NULL DEFAULT 1
            );
            ",
        )?;
        Ok(())
    }

    /// V2: group song suggestions and the current group song slot
    fn migrate_v2(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS group_songs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL COLLATE NOCASE,
                show            TEXT NOT NULL COLLATE NOCASE,
                suggested_by    TEXT NOT NULL DEFAULT '-',
                request_time    TEXT NOT NULL
            );
            ",
        )?;

        try_add_column(
            &self.conn,
            "event_state",
            "current_group_song INTEGER REFERENCES group_songs(id) ON DELETE SET NULL",
        )?;
        try_add_column(&self.conn, "event_state", "group_song_started_at TEXT")?;

        Ok(())
    }
}

/// Helper: try to add a column, ignore if it already exists.
fn try_add_column(conn: &Connection, table: &str, column_def: &str) -> Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {column_def}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("duplicate column") => {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_reach_current_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evening.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM group_songs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_single_spotlight_enforced_by_schema() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "INSERT INTO performers (username, first_name, last_name, role, join_time)
                 VALUES ('a_b', 'A', 'B', 'singer', '2022-07-10T00:00:00Z');
                 INSERT INTO songs (owner_id, title, show, request_time, spotlight)
                 VALUES (1, 'One', 'Show', '2022-07-10T00:00:01Z', 1);",
            )
            .unwrap();
        let second = db.conn.execute(
            "INSERT INTO songs (owner_id, title, show, request_time, spotlight)
             VALUES (1, 'Two', 'Show', '2022-07-10T00:00:02Z', 1)",
            [],
        );
        assert!(second.is_err());
    }
}
