use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a performer is at the evening. Orthogonal flags (active, raffle) live on `Performer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Singer,
    Audience,
    Host,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Singer => "singer",
            Role::Audience => "audience",
            Role::Host => "host",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "singer" => Some(Role::Singer),
            "audience" => Some(Role::Audience),
            "host" => Some(Role::Host),
            _ => None,
        }
    }
}

/// Ticket type sold with an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Singer,
    Audience,
}

impl TicketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketType::Singer => "singer",
            TicketType::Audience => "audience",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "singer" => Some(TicketType::Singer),
            "audience" => Some(TicketType::Audience),
            _ => None,
        }
    }
}

/// A logged-in participant, read from the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performer {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub active: bool,
    pub raffle_participant: bool,
    pub raffle_winner: bool,
    pub join_time: DateTime<Utc>,
    pub ticket_order: Option<i64>,
}

impl Performer {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether this performer may own songs that enter the lineup.
    pub fn can_sing(&self) -> bool {
        match self.role {
            Role::Singer => true,
            Role::Audience => self.raffle_winner,
            Role::Host => false,
        }
    }
}

/// Data for inserting a performer (login phase).
pub struct NewPerformer {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub join_time: DateTime<Utc>,
    pub ticket_order: Option<i64>,
}

/// Scheduling state of a song, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SongState {
    Normal,
    Skipped,
    Standby,
    Spotlight,
}

/// A song request row plus its partner edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub show: String,
    pub notes: String,
    pub partners: Vec<i64>,
    pub priority: Option<i64>,
    pub position: Option<i64>,
    pub request_time: DateTime<Utc>,
    pub performance_time: Option<DateTime<Utc>>,
    pub skipped: bool,
    pub standby: bool,
    pub spotlight: bool,
}

impl Song {
    pub fn performed(&self) -> bool {
        self.performance_time.is_some()
    }

    /// Spotlight wins over standby, standby over skipped.
    pub fn state(&self) -> SongState {
        if self.spotlight {
            SongState::Spotlight
        } else if self.standby {
            SongState::Standby
        } else if self.skipped {
            SongState::Skipped
        } else {
            SongState::Normal
        }
    }

    /// Unperformed and not held out of the queue.
    pub fn is_pending(&self) -> bool {
        !self.performed() && !self.skipped && !self.standby
    }

    pub fn involves(&self, performer_id: i64) -> bool {
        self.owner_id == performer_id || self.partners.contains(&performer_id)
    }
}

/// Data for inserting a song request.
pub struct NewSong {
    pub owner_id: i64,
    pub title: String,
    pub show: String,
    pub notes: String,
    pub priority: i64,
    pub request_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketOrder {
    pub id: i64,
    pub order_id: i64,
    pub num_tickets: i64,
    pub ticket_type: TicketType,
    pub customer_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSong {
    pub id: i64,
    pub title: String,
    pub show: String,
    pub suggested_by: String,
    pub request_time: DateTime<Utc>,
}

/// The singleton evening record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventState {
    pub passcode: String,
    pub signup_open: bool,
    pub current_group_song: Option<i64>,
    pub group_song_started_at: Option<DateTime<Utc>>,
}

/// Everything the scheduler reads, taken inside one transaction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub performers: Vec<Performer>,
    pub songs: Vec<Song>,
    pub event: EventState,
}

impl Snapshot {
    pub fn performer(&self, id: i64) -> Option<&Performer> {
        self.performers.iter().find(|p| p.id == id)
    }

    pub fn song(&self, id: i64) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }

    pub fn spotlight(&self) -> Option<&Song> {
        self.songs.iter().find(|s| s.spotlight)
    }

    /// Names of everyone singing a song, owner first.
    pub fn singer_names(&self, song: &Song) -> Vec<String> {
        std::iter::once(song.owner_id)
            .chain(song.partners.iter().copied())
            .filter_map(|id| self.performer(id))
            .map(Performer::display_name)
            .collect()
    }
}

/// Evening statistics.
#[derive(Debug, Serialize)]
pub struct EveningStats {
    pub performers: i64,
    pub active_singers: i64,
    pub songs_requested: i64,
    pub songs_performed: i64,
    pub songs_in_lineup: i64,
}
