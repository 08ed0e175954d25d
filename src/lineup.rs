//! Read models over a snapshot: current song, next song, the lineup and a
//! performer's dashboard. Nothing here writes; positions come from the last
//! recalculation.

use serde::Serialize;

use crate::db::models::{Snapshot, Song, SongState};
use crate::names::join_names;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupEntry {
    pub song_id: i64,
    /// `None` for a spotlight song held on standby.
    pub position: Option<i64>,
    pub title: String,
    pub show: String,
    pub owner_id: i64,
    pub singers: String,
    pub notes: String,
}

impl LineupEntry {
    pub fn from_song(snapshot: &Snapshot, song: &Song) -> Self {
        Self {
            song_id: song.id,
            position: song.position,
            title: song.title.clone(),
            show: song.show.clone(),
            owner_id: song.owner_id,
            singers: join_names(&snapshot.singer_names(song)),
            notes: song.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lineup {
    pub current: Option<LineupEntry>,
    pub next: Vec<LineupEntry>,
}

impl Lineup {
    /// Current song first, then the rest of the queue.
    pub fn entries(&self) -> impl Iterator<Item = &LineupEntry> {
        self.current.iter().chain(self.next.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserNextSong {
    #[serde(flatten)]
    pub entry: LineupEntry,
    /// Lineup entries ahead of this one, the current song included.
    pub wait_amount: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub current: Option<LineupEntry>,
    pub next: Option<LineupEntry>,
    pub user_next: Option<UserNextSong>,
    pub raffle_winner_already_sang: bool,
}

/// Positioned songs sorted by position.
fn queued(snapshot: &Snapshot) -> Vec<&Song> {
    let mut songs: Vec<&Song> = snapshot.songs.iter().filter(|s| s.position.is_some()).collect();
    songs.sort_by_key(|s| s.position);
    songs
}

/// The spotlight song if there is one, else the lowest-positioned normal song.
pub fn current_song(snapshot: &Snapshot) -> Option<&Song> {
    snapshot.spotlight().or_else(|| {
        queued(snapshot)
            .into_iter()
            .find(|s| s.state() == SongState::Normal)
    })
}

/// The song after the current one. Under a spotlight this is the head of the
/// queue, the spotlight song itself excepted.
pub fn next_song(snapshot: &Snapshot) -> Option<&Song> {
    let queue = queued(snapshot);
    match snapshot.spotlight() {
        Some(spot) => queue
            .into_iter()
            .find(|s| s.id != spot.id && s.state() == SongState::Normal),
        None => {
            let current = current_song(snapshot)?.position;
            queue
                .into_iter()
                .find(|s| s.position > current && s.state() == SongState::Normal)
        }
    }
}

pub fn lineup(snapshot: &Snapshot) -> Lineup {
    let current = current_song(snapshot);
    let current_id = current.map(|s| s.id);
    let next = queued(snapshot)
        .into_iter()
        .filter(|s| Some(s.id) != current_id)
        .map(|s| LineupEntry::from_song(snapshot, s))
        .collect();

    Lineup {
        current: current.map(|s| LineupEntry::from_song(snapshot, s)),
        next,
    }
}

pub fn dashboard(snapshot: &Snapshot, performer_id: i64) -> Dashboard {
    let full = lineup(snapshot);

    let user_next = full
        .entries()
        .enumerate()
        .find(|(_, entry)| {
            snapshot
                .song(entry.song_id)
                .is_some_and(|s| s.involves(performer_id))
        })
        .map(|(wait_amount, entry)| UserNextSong {
            entry: entry.clone(),
            wait_amount,
        });

    let raffle_winner_already_sang = snapshot.performer(performer_id).is_some_and(|p| {
        p.raffle_winner
            && snapshot
                .songs
                .iter()
                .any(|s| s.owner_id == performer_id && s.performed())
    });

    Dashboard {
        current: full.current.clone(),
        next: next_song(snapshot).map(|s| LineupEntry::from_song(snapshot, s)),
        user_next,
        raffle_winner_already_sang,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventState, Performer, Role};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn performer(id: i64) -> Performer {
        Performer {
            id,
            username: format!("user_{id}"),
            first_name: format!("User_{id}"),
            last_name: "Last_name".into(),
            role: Role::Singer,
            active: true,
            raffle_participant: false,
            raffle_winner: false,
            join_time: at(id),
            ticket_order: None,
        }
    }

    fn song(id: i64, owner_id: i64, position: Option<i64>) -> Song {
        Song {
            id,
            owner_id,
            title: format!("Song_{id}"),
            show: "Wicked".into(),
            notes: String::new(),
            partners: Vec::new(),
            priority: Some(1),
            position,
            request_time: at(10 + id),
            performance_time: None,
            skipped: false,
            standby: false,
            spotlight: false,
        }
    }

    fn snapshot(songs: Vec<Song>) -> Snapshot {
        Snapshot {
            performers: (1..=4).map(performer).collect(),
            songs,
            event: EventState {
                passcode: "dev".into(),
                signup_open: true,
                current_group_song: None,
                group_song_started_at: None,
            },
        }
    }

    fn ids(lineup: &Lineup) -> Vec<i64> {
        lineup.entries().map(|e| e.song_id).collect()
    }

    #[test]
    fn test_empty_evening() {
        let snap = snapshot(Vec::new());
        assert!(current_song(&snap).is_none());
        assert!(next_song(&snap).is_none());
        assert_eq!(lineup(&snap), Lineup::default());
        let dash = dashboard(&snap, 1);
        assert!(dash.current.is_none() && dash.next.is_none() && dash.user_next.is_none());
    }

    #[test]
    fn test_single_song_is_current_without_next() {
        let snap = snapshot(vec![song(1, 1, Some(1))]);
        assert_eq!(current_song(&snap).map(|s| s.id), Some(1));
        assert!(next_song(&snap).is_none());
    }

    #[test]
    fn test_current_and_next_follow_positions() {
        let snap = snapshot(vec![song(1, 1, Some(2)), song(2, 2, Some(1)), song(3, 3, Some(3))]);
        assert_eq!(current_song(&snap).map(|s| s.id), Some(2));
        assert_eq!(next_song(&snap).map(|s| s.id), Some(1));
        assert_eq!(ids(&lineup(&snap)), vec![2, 1, 3]);
    }

    #[test]
    fn test_spotlight_on_standby_song_leaves_tail_alone() {
        let mut held = song(2, 2, None);
        held.standby = true;
        held.spotlight = true;
        let snap = snapshot(vec![song(1, 1, Some(1)), held, song(3, 3, Some(2))]);

        assert_eq!(current_song(&snap).map(|s| s.id), Some(2));
        assert_eq!(next_song(&snap).map(|s| s.id), Some(1));
        let l = lineup(&snap);
        assert_eq!(l.current.as_ref().and_then(|e| e.position), None);
        assert_eq!(ids(&l), vec![2, 1, 3]);
    }

    #[test]
    fn test_spotlight_on_queued_song_is_not_repeated() {
        let mut spot = song(3, 3, Some(2));
        spot.spotlight = true;
        let snap = snapshot(vec![song(1, 1, Some(1)), spot, song(4, 4, Some(3))]);

        assert_eq!(current_song(&snap).map(|s| s.id), Some(3));
        assert_eq!(next_song(&snap).map(|s| s.id), Some(1));
        assert_eq!(ids(&lineup(&snap)), vec![3, 1, 4]);
    }

    #[test]
    fn test_dashboard_wait_amount_counts_current() {
        let mut duet = song(2, 2, Some(2));
        duet.partners = vec![4];
        let snap = snapshot(vec![song(1, 1, Some(1)), duet, song(3, 3, Some(3))]);

        let dash = dashboard(&snap, 3);
        let user_next = dash.user_next.unwrap();
        assert_eq!(user_next.entry.song_id, 3);
        assert_eq!(user_next.wait_amount, 2);

        // Partners see the duet as their next song
        let partner = dashboard(&snap, 4).user_next.unwrap();
        assert_eq!(partner.entry.song_id, 2);
        assert_eq!(partner.entry.singers, "User_2 Last_name and User_4 Last_name");
        assert_eq!(partner.wait_amount, 1);

        assert_eq!(dashboard(&snap, 1).user_next.unwrap().wait_amount, 0);
    }

    #[test]
    fn test_raffle_winner_already_sang() {
        let mut sung = song(1, 1, None);
        sung.performance_time = Some(at(100));
        sung.priority = None;
        let mut snap = snapshot(vec![sung]);
        assert!(!dashboard(&snap, 1).raffle_winner_already_sang);

        snap.performers[0].role = Role::Audience;
        snap.performers[0].raffle_winner = true;
        assert!(dashboard(&snap, 1).raffle_winner_already_sang);
        assert!(dashboard(&snap, 1).user_next.is_none());
    }
}
