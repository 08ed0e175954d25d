//! The evening: every mutation and read the outside world performs on the
//! lineup goes through [`Evening`]. Each mutation runs in one immediate
//! transaction and ends with a recalculation, so positions are always
//! rebuilt from the entities they derive from.

mod performers;
mod songs;
mod spotlight;


use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::db::models::{
    EventState, EveningStats, GroupSong, Performer, Snapshot, Song, TicketType,
};
use crate::db::{Database, DbError, queries};
use crate::invariants::{self, Violation};
use crate::lineup::{self, Dashboard, Lineup, LineupEntry};
use crate::names;
use crate::ordering::{OrderingPolicy, disneyland_order};
use crate::projector::{Projection, project};
use crate::registry;

pub use performers::LoginRequest;
pub use songs::NewSongRequest;

#[derive(Error, Debug)]
pub enum EveningError {
    #[error("{0}")]
    Validation(String),
    #[error("Unknown performer {0}")]
    UnknownPerformer(i64),
    #[error("Unknown song {0}")]
    UnknownSong(i64),
    #[error("{owner} already signed up for \"{title}\" from {show}")]
    DuplicateSong {
        title: String,
        show: String,
        owner: String,
        /// Another performer owns it; a host may approve the duplicate.
        needs_approval: bool,
    },
    #[error("{partner} already signed you up for \"{title}\" from {show}")]
    SignedUpByPartner {
        title: String,
        show: String,
        partner: String,
    },
    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] Violation),
    #[error("Wrong passcode")]
    InvalidPasscode,
    #[error("Ticket order {order_id} has no tickets left")]
    TicketDepleted { order_id: i64 },
    #[error("{name} is already logged in")]
    AlreadyLoggedIn { name: String },
    #[error("The name {name} is already taken tonight")]
    NameCollision { name: String },
    #[error("Store stayed locked after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },
    #[error("Store failure: {0}")]
    Store(#[from] DbError),
}

impl From<rusqlite::Error> for EveningError {
    fn from(e: rusqlite::Error) -> Self {
        EveningError::Store(DbError::Sqlite(e))
    }
}

impl EveningError {
    fn is_busy(&self) -> bool {
        matches!(self, EveningError::Store(e) if e.is_busy())
    }
}

pub type Result<T> = std::result::Result<T, EveningError>;

/// Evening-level knobs, read from the `[evening]` table of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EveningSettings {
    /// How newcomers and veterans interleave while signup is open.
    pub ordering: OrderingPolicy,
    /// Seeds the event passcode on a fresh database.
    pub passcode: String,
    /// Seeds the signup gate on a fresh database.
    pub signup_open: bool,
    /// Extra attempts after the store reports BUSY.
    pub max_retries: u32,
    /// Backoff per attempt, grows linearly.
    pub retry_backoff_ms: u64,
    pub busy_timeout_ms: u64,
    /// Songs a raffle winner may own.
    pub raffle_song_limit: usize,
}

impl Default for EveningSettings {
    fn default() -> Self {
        Self {
            ordering: OrderingPolicy::default(),
            passcode: "dev".to_string(),
            signup_open: true,
            max_retries: 3,
            retry_backoff_ms: 50,
            busy_timeout_ms: 5000,
            raffle_song_limit: 1,
        }
    }
}

/// Rebuild every position from the entities: snapshot, validate, order, project, write.
/// Runs inside the caller's transaction.
fn recalculate_in(conn: &Connection, policy: OrderingPolicy) -> Result<Projection> {
    let snapshot = queries::load_snapshot(conn)?;
    invariants::check(&snapshot)?;

    let standings = registry::standings(&snapshot);
    let order = disneyland_order(&standings, snapshot.event.signup_open, policy);
    let projection = project(&order, &snapshot.songs);
    queries::write_positions(conn, &projection.positions)?;

    debug!(
        "Recalculated: ordering {:?}, {} songs positioned, {} newcomers",
        order,
        projection.len(),
        registry::newcomer_count(&standings)
    );
    Ok(projection)
}

fn require_performer(conn: &Connection, id: i64) -> Result<Performer> {
    queries::performer(conn, id)?.ok_or(EveningError::UnknownPerformer(id))
}

fn require_song(conn: &Connection, id: i64) -> Result<Song> {
    queries::song(conn, id)?.ok_or(EveningError::UnknownSong(id))
}

/// Shared handle on one evening's store.
pub struct Evening {
    db: Mutex<Database>,
    settings: EveningSettings,
    clock: Arc<dyn Clock>,
}

impl Evening {
    pub fn open(db: Database, settings: EveningSettings) -> Result<Self> {
        Self::with_clock(db, settings, Arc::new(SystemClock))
    }

    /// Open with an injected clock. Seeds the event state on a fresh store and
    /// recalculates once so positions match the entities on a cold start.
    pub fn with_clock(
        db: Database,
        settings: EveningSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        db.set_busy_timeout(Duration::from_millis(settings.busy_timeout_ms))?;
        let evening = Self {
            db: Mutex::new(db),
            settings,
            clock,
        };
        evening.mutate("open", |conn| {
            queries::ensure_event_state(
                conn,
                &evening.settings.passcode,
                evening.settings.signup_open,
            )?;
            Ok(())
        })?;
        Ok(evening)
    }

    pub fn settings(&self) -> &EveningSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| {
            warn!("Evening lock was poisoned by a panicked writer, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `f` and a recalculation in one immediate transaction, retrying while
    /// another connection holds the write lock.
    fn mutate<T>(&self, op: &str, f: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        self.transact(op, true, f)
    }

    /// Like `mutate`, for writes that cannot move a position.
    fn write<T>(&self, op: &str, f: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        self.transact(op, false, f)
    }

    fn transact<T>(
        &self,
        op: &str,
        recalculate: bool,
        mut f: impl FnMut(&Connection) -> Result<T>,
    ) -> Result<T> {
        let db = self.lock();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(&db.conn, recalculate, &mut f) {
                Err(e) if e.is_busy() && attempt <= self.settings.max_retries => {
                    warn!(
                        "{op}: store busy, retrying (attempt {attempt}/{})",
                        self.settings.max_retries + 1
                    );
                    let backoff = self.settings.retry_backoff_ms * u64::from(attempt);
                    thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) if e.is_busy() => {
                    return Err(EveningError::ConcurrencyConflict { attempts: attempt });
                }
                other => return other,
            }
        }
    }

    fn attempt<T>(
        &self,
        conn: &Connection,
        recalculate: bool,
        f: &mut impl FnMut(&Connection) -> Result<T>,
    ) -> Result<T> {
        // Dropping the transaction on any error rolls it back
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        if recalculate {
            recalculate_in(&tx, self.settings.ordering)?;
        }
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` against a consistent snapshot of the store.
    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.lock();
        let tx = Transaction::new_unchecked(&db.conn, TransactionBehavior::Deferred)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn snapshot(&self) -> Result<Snapshot> {
        self.read(|conn| Ok(queries::load_snapshot(conn)?))
    }

    // --- Event driver ------------------------------------------------------

    /// Rewrite every position from current state. Idempotent.
    pub fn recalculate(&self) -> Result<()> {
        self.mutate("recalculate", |_| Ok(()))
    }

    // --- Signup gate -------------------------------------------------------

    pub fn open_signup(&self) -> Result<()> {
        self.mutate("open_signup", |conn| {
            queries::set_signup_open(conn, true)?;
            Ok(())
        })?;
        info!("Signup opened");
        Ok(())
    }

    /// Newcomers move ahead of everyone who has already sung.
    pub fn close_signup(&self) -> Result<()> {
        self.mutate("close_signup", |conn| {
            queries::set_signup_open(conn, false)?;
            Ok(())
        })?;
        info!("Signup closed");
        Ok(())
    }

    // --- Administration ----------------------------------------------------

    pub fn register_ticket_order(
        &self,
        order_id: i64,
        num_tickets: i64,
        ticket_type: TicketType,
        customer_name: &str,
    ) -> Result<()> {
        if num_tickets < 0 {
            return Err(EveningError::Validation(
                "Number of tickets cannot be negative".to_string(),
            ));
        }
        let customer_name = names::collapse_whitespace(customer_name);
        self.write("register_ticket_order", |conn| {
            queries::insert_ticket_order(conn, order_id, num_tickets, ticket_type, &customer_name)?;
            Ok(())
        })?;
        info!("Ticket order {order_id}: {num_tickets} {} tickets", ticket_type.as_str());
        Ok(())
    }

    pub fn set_passcode(&self, passcode: &str) -> Result<()> {
        let passcode = passcode.trim();
        if passcode.is_empty() {
            return Err(EveningError::Validation("Passcode cannot be empty".to_string()));
        }
        self.write("set_passcode", |conn| {
            queries::set_passcode(conn, passcode)?;
            Ok(())
        })?;
        info!("Passcode changed");
        Ok(())
    }

    /// Drop every performer, song, ticket order and group song. The passcode stays.
    pub fn reset_evening(&self) -> Result<()> {
        self.mutate("reset_evening", |conn| {
            queries::reset(conn)?;
            Ok(())
        })?;
        info!("Evening reset");
        Ok(())
    }

    // --- Group songs -------------------------------------------------------

    pub fn suggest_group_song(
        &self,
        title: &str,
        show: &str,
        suggested_by: &str,
    ) -> Result<GroupSong> {
        let title = names::title_case(title);
        let show = names::title_case(show);
        if title.is_empty() || show.is_empty() {
            return Err(EveningError::Validation(
                "Group song needs a title and a show".to_string(),
            ));
        }
        let suggested_by = match names::collapse_whitespace(suggested_by) {
            s if s.is_empty() => "-".to_string(),
            s => s,
        };
        let now = self.clock.now();

        self.write("suggest_group_song", |conn| {
            let id = queries::insert_group_song(conn, &title, &show, &suggested_by, now)?;
            queries::group_song(conn, id)?
                .ok_or_else(|| EveningError::Validation(format!("Unknown group song {id}")))
        })
    }

    pub fn start_group_song(&self, id: i64) -> Result<GroupSong> {
        let now = self.clock.now();
        let song = self.write("start_group_song", |conn| {
            let song = queries::group_song(conn, id)?
                .ok_or_else(|| EveningError::Validation(format!("Unknown group song {id}")))?;
            queries::set_current_group_song(conn, Some(id), Some(now))?;
            Ok(song)
        })?;
        info!("Group song started: {} ({})", song.title, song.show);
        Ok(song)
    }

    pub fn end_group_song(&self) -> Result<()> {
        self.write("end_group_song", |conn| {
            queries::set_current_group_song(conn, None, None)?;
            Ok(())
        })
    }

    // --- Reads -------------------------------------------------------------

    pub fn lineup(&self) -> Result<Lineup> {
        Ok(lineup::lineup(&self.snapshot()?))
    }

    pub fn dashboard(&self, performer_id: i64) -> Result<Dashboard> {
        let snapshot = self.snapshot()?;
        if snapshot.performer(performer_id).is_none() {
            return Err(EveningError::UnknownPerformer(performer_id));
        }
        Ok(lineup::dashboard(&snapshot, performer_id))
    }

    pub fn current_song(&self) -> Result<Option<LineupEntry>> {
        let snapshot = self.snapshot()?;
        Ok(lineup::current_song(&snapshot).map(|s| LineupEntry::from_song(&snapshot, s)))
    }

    pub fn next_song(&self) -> Result<Option<LineupEntry>> {
        let snapshot = self.snapshot()?;
        Ok(lineup::next_song(&snapshot).map(|s| LineupEntry::from_song(&snapshot, s)))
    }

    pub fn spotlight(&self) -> Result<Option<Song>> {
        Ok(self.snapshot()?.spotlight().cloned())
    }

    /// The Disneyland ordering of performer ids as it stands right now.
    pub fn ordering(&self) -> Result<Vec<i64>> {
        let snapshot = self.snapshot()?;
        let standings = registry::standings(&snapshot);
        Ok(disneyland_order(
            &standings,
            snapshot.event.signup_open,
            self.settings.ordering,
        ))
    }

    pub fn performer(&self, id: i64) -> Result<Performer> {
        self.read(|conn| require_performer(conn, id))
    }

    pub fn performers(&self) -> Result<Vec<Performer>> {
        self.read(|conn| Ok(queries::performers(conn)?))
    }

    pub fn song(&self, id: i64) -> Result<Song> {
        self.read(|conn| require_song(conn, id))
    }

    pub fn songs(&self) -> Result<Vec<Song>> {
        self.read(|conn| Ok(queries::songs(conn)?))
    }

    /// Songs a performer owns or partners on.
    pub fn songs_of(&self, performer_id: i64) -> Result<Vec<Song>> {
        self.read(|conn| {
            require_performer(conn, performer_id)?;
            Ok(queries::songs(conn)?
                .into_iter()
                .filter(|s| s.involves(performer_id))
                .collect())
        })
    }

    pub fn event_state(&self) -> Result<EventState> {
        self.read(|conn| Ok(queries::event_state(conn)?))
    }

    pub fn passcode(&self) -> Result<String> {
        Ok(self.event_state()?.passcode)
    }

    pub fn current_group_song(&self) -> Result<Option<GroupSong>> {
        self.read(|conn| match queries::event_state(conn)?.current_group_song {
            Some(id) => Ok(queries::group_song(conn, id)?),
            None => Ok(None),
        })
    }

    pub fn stats(&self) -> Result<EveningStats> {
        Ok(self.lock().stats()?)
    }
}
