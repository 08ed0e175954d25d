use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::{
    EventState, EveningStats, GroupSong, NewPerformer, NewSong, Performer, Role, Snapshot, Song,
    TicketOrder, TicketType,
};
use super::{Database, Result};

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role {s:?}").into()))
    }
}

impl ToSql for TicketType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TicketType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        TicketType::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown ticket type {s:?}").into()))
    }
}

/// Boolean song columns toggled by the spotlight/standby controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFlag {
    Skipped,
    Standby,
    Spotlight,
}

impl SongFlag {
    fn column(&self) -> &'static str {
        match self {
            SongFlag::Skipped => "skipped",
            SongFlag::Standby => "standby",
            SongFlag::Spotlight => "spotlight",
        }
    }
}

const PERFORMER_COLUMNS: &str = "id, username, first_name, last_name, role, active,
     raffle_participant, raffle_winner, join_time, ticket_order";

fn performer_from_row(row: &Row<'_>) -> rusqlite::Result<Performer> {
    Ok(Performer {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        role: row.get(4)?,
        active: row.get(5)?,
        raffle_participant: row.get(6)?,
        raffle_winner: row.get(7)?,
        join_time: row.get(8)?,
        ticket_order: row.get(9)?,
    })
}

const SONG_COLUMNS: &str = "id, owner_id, title, show, notes, priority, position,
     request_time, performance_time, skipped, standby, spotlight";

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        show: row.get(3)?,
        notes: row.get(4)?,
        partners: Vec::new(),
        priority: row.get(5)?,
        position: row.get(6)?,
        request_time: row.get(7)?,
        performance_time: row.get(8)?,
        skipped: row.get(9)?,
        standby: row.get(10)?,
        spotlight: row.get(11)?,
    })
}

// --- Event state -----------------------------------------------------------

/// Create the singleton event row if this is a fresh database.
pub fn ensure_event_state(conn: &Connection, passcode: &str, signup_open: bool) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO event_state (id, passcode, signup_open) VALUES (1, ?1, ?2)",
        params![passcode, signup_open],
    )?;
    Ok(())
}

pub fn event_state(conn: &Connection) -> Result<EventState> {
    let state = conn.query_row(
        "SELECT passcode, signup_open, current_group_song, group_song_started_at
         FROM event_state WHERE id = 1",
        [],
        |row| {
            Ok(EventState {
                passcode: row.get(0)?,
                signup_open: row.get(1)?,
                current_group_song: row.get(2)?,
                group_song_started_at: row.get(3)?,
            })
        },
    )?;
    Ok(state)
}

pub fn set_signup_open(conn: &Connection, open: bool) -> Result<()> {
    conn.execute("UPDATE event_state SET signup_open = ?1 WHERE id = 1", params![open])?;
    Ok(())
}

pub fn set_passcode(conn: &Connection, passcode: &str) -> Result<()> {
    conn.execute("UPDATE event_state SET passcode = ?1 WHERE id = 1", params![passcode])?;
    Ok(())
}

pub fn set_current_group_song(
    conn: &Connection,
    group_song: Option<i64>,
    started_at: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE event_state SET current_group_song = ?1, group_song_started_at = ?2 WHERE id = 1",
        params![group_song, started_at],
    )?;
    Ok(())
}

// --- Ticket orders ---------------------------------------------------------

pub fn insert_ticket_order(
    conn: &Connection,
    order_id: i64,
    num_tickets: i64,
    ticket_type: TicketType,
    customer_name: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO ticket_orders (order_id, num_tickets, ticket_type, customer_name)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(order_id) DO UPDATE SET
            num_tickets = excluded.num_tickets,
            ticket_type = excluded.ticket_type,
            customer_name = excluded.customer_name",
        params![order_id, num_tickets, ticket_type, customer_name],
    )?;
    let id = conn.query_row(
        "SELECT id FROM ticket_orders WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ticket_order(conn: &Connection, order_id: i64) -> Result<Option<TicketOrder>> {
    let order = conn
        .query_row(
            "SELECT id, order_id, num_tickets, ticket_type, customer_name
             FROM ticket_orders WHERE order_id = ?1",
            params![order_id],
            |row| {
                Ok(TicketOrder {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    num_tickets: row.get(2)?,
                    ticket_type: row.get(3)?,
                    customer_name: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(order)
}

/// How many performers already logged in with this order.
pub fn tickets_used(conn: &Connection, ticket_order: i64) -> Result<i64> {
    let used = conn.query_row(
        "SELECT COUNT(*) FROM performers WHERE ticket_order = ?1",
        params![ticket_order],
        |row| row.get(0),
    )?;
    Ok(used)
}

// --- Performers ------------------------------------------------------------

pub fn insert_performer(conn: &Connection, p: &NewPerformer) -> Result<i64> {
    conn.execute(
        "INSERT INTO performers (username, first_name, last_name, role, join_time, ticket_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![p.username, p.first_name, p.last_name, p.role, p.join_time, p.ticket_order],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn performer(conn: &Connection, id: i64) -> Result<Option<Performer>> {
    let sql = format!("SELECT {PERFORMER_COLUMNS} FROM performers WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], performer_from_row).optional()?)
}

pub fn performer_by_username(conn: &Connection, username: &str) -> Result<Option<Performer>> {
    let sql = format!("SELECT {PERFORMER_COLUMNS} FROM performers WHERE username = ?1");
    Ok(conn
        .query_row(&sql, params![username], performer_from_row)
        .optional()?)
}

pub fn performers(conn: &Connection) -> Result<Vec<Performer>> {
    let sql = format!("SELECT {PERFORMER_COLUMNS} FROM performers ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let performers = stmt
        .query_map([], performer_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(performers)
}

pub fn set_performer_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
    conn.execute(
        "UPDATE performers SET active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(())
}

pub fn set_raffle_participant(conn: &Connection, id: i64, participant: bool) -> Result<()> {
    conn.execute(
        "UPDATE performers SET raffle_participant = ?1 WHERE id = ?2",
        params![participant, id],
    )?;
    Ok(())
}

pub fn set_raffle_winner(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE performers SET raffle_winner = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// --- Songs -----------------------------------------------------------------

pub fn insert_song(conn: &Connection, s: &NewSong) -> Result<i64> {
    conn.execute(
        "INSERT INTO songs (owner_id, title, show, notes, priority, request_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![s.owner_id, s.title, s.show, s.notes, s.priority, s.request_time],
    )?;
    Ok(conn.last_insert_rowid())
}

fn partner_edges(conn: &Connection) -> Result<HashMap<i64, Vec<i64>>> {
    let mut stmt = conn.prepare(
        "SELECT song_id, performer_id FROM song_partners ORDER BY song_id, performer_id",
    )?;
    let mut edges: HashMap<i64, Vec<i64>> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (song_id, performer_id) = row?;
        edges.entry(song_id).or_default().push(performer_id);
    }
    Ok(edges)
}

pub fn song(conn: &Connection, id: i64) -> Result<Option<Song>> {
    let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1");
    let Some(mut song) = conn.query_row(&sql, params![id], song_from_row).optional()? else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(
        "SELECT performer_id FROM song_partners WHERE song_id = ?1 ORDER BY performer_id",
    )?;
    song.partners = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(song))
}

/// All songs with their partner sets, in creation order.
pub fn songs(conn: &Connection) -> Result<Vec<Song>> {
    let sql = format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let mut songs = stmt
        .query_map([], song_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut edges = partner_edges(conn)?;
    for song in &mut songs {
        if let Some(partners) = edges.remove(&song.id) {
            song.partners = partners;
        }
    }
    Ok(songs)
}

pub fn delete_song(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM songs WHERE id = ?1", params![id])?;
    Ok(())
}

/// Replace a song's partner edge set.
pub fn replace_partners(conn: &Connection, song_id: i64, partners: &[i64]) -> Result<()> {
    conn.execute("DELETE FROM song_partners WHERE song_id = ?1", params![song_id])?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO song_partners (song_id, performer_id) VALUES (?1, ?2)")?;
    for partner in partners {
        stmt.execute(params![song_id, partner])?;
    }
    Ok(())
}

pub fn set_song_flag(conn: &Connection, id: i64, flag: SongFlag, value: bool) -> Result<()> {
    let sql = format!("UPDATE songs SET {} = ?1 WHERE id = ?2", flag.column());
    conn.execute(&sql, params![value, id])?;
    Ok(())
}

/// Clear the spotlight everywhere. Returns how many songs held it.
pub fn clear_spotlight(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("UPDATE songs SET spotlight = 0 WHERE spotlight = 1", [])?)
}

pub fn set_performance_time(
    conn: &Connection,
    id: i64,
    performance_time: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "UPDATE songs SET performance_time = ?1 WHERE id = ?2",
        params![performance_time, id],
    )?;
    Ok(())
}

/// Write per-owner priorities. `None` marks a performed song.
pub fn set_priorities(conn: &Connection, priorities: &[(i64, Option<i64>)]) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE songs SET priority = ?1 WHERE id = ?2")?;
    for (song_id, priority) in priorities {
        stmt.execute(params![priority, song_id])?;
    }
    Ok(())
}

/// Clear every position, then write the new projection.
/// Clearing first keeps the unique position index satisfied mid-update.
pub fn write_positions(conn: &Connection, positions: &[(i64, i64)]) -> Result<()> {
    conn.execute("UPDATE songs SET position = NULL WHERE position IS NOT NULL", [])?;
    let mut stmt = conn.prepare_cached("UPDATE songs SET position = ?1 WHERE id = ?2")?;
    for (song_id, position) in positions {
        stmt.execute(params![position, song_id])?;
    }
    Ok(())
}

// --- Group songs -----------------------------------------------------------

pub fn insert_group_song(
    conn: &Connection,
    title: &str,
    show: &str,
    suggested_by: &str,
    request_time: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO group_songs (title, show, suggested_by, request_time) VALUES (?1, ?2, ?3, ?4)",
        params![title, show, suggested_by, request_time],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn group_song(conn: &Connection, id: i64) -> Result<Option<GroupSong>> {
    let song = conn
        .query_row(
            "SELECT id, title, show, suggested_by, request_time FROM group_songs WHERE id = ?1",
            params![id],
            |row| {
                Ok(GroupSong {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    show: row.get(2)?,
                    suggested_by: row.get(3)?,
                    request_time: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(song)
}

// --- Whole-evening operations ----------------------------------------------

/// Read performers, songs, partner edges and the event row in one pass.
/// Callers run this inside a transaction to get a consistent view.
pub fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    Ok(Snapshot {
        performers: performers(conn)?,
        songs: songs(conn)?,
        event: event_state(conn)?,
    })
}

/// Administrative reset: drop every entity of the evening, keep the passcode.
pub fn reset(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        UPDATE event_state SET current_group_song = NULL, group_song_started_at = NULL,
                               signup_open = 1;
        DELETE FROM song_partners;
        DELETE FROM songs;
        DELETE FROM performers;
        DELETE FROM ticket_orders;
        DELETE FROM group_songs;
        ",
    )?;
    Ok(())
}

impl Database {
    /// Evening statistics.
    pub fn stats(&self) -> Result<EveningStats> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |r| r.get(0))?) };

        Ok(EveningStats {
            performers: count("SELECT COUNT(*) FROM performers")?,
            active_singers: count(
                "SELECT COUNT(*) FROM performers WHERE active = 1 AND role = 'singer'",
            )?,
            songs_requested: count("SELECT COUNT(*) FROM songs")?,
            songs_performed: count(
                "SELECT COUNT(*) FROM songs WHERE performance_time IS NOT NULL",
            )?,
            songs_in_lineup: count("SELECT COUNT(*) FROM songs WHERE position IS NOT NULL")?,
        })
    }
}
