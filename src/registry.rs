//! Per-performer standing derived from a snapshot: join time, first request,
//! last performance, and whether they are eligible for the lineup right now.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::db::models::{Performer, Snapshot, Song};

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub performer_id: i64,
    pub join_time: DateTime<Utc>,
    /// Earliest request over owned songs, performed ones included.
    pub first_request_time: Option<DateTime<Utc>>,
    /// Latest performance of an owned song. Singing as a partner does not count.
    pub last_performance_time: Option<DateTime<Utc>>,
    /// Owns at least one unperformed, non-skipped, non-standby song.
    pub has_pending_song: bool,
    pub active: bool,
    pub can_sing: bool,
}

impl Standing {
    pub fn no_perform_this_evening(&self) -> bool {
        self.last_performance_time.is_none()
    }

    /// Belongs in the Disneyland ordering.
    pub fn eligible(&self) -> bool {
        self.active && self.can_sing && self.has_pending_song
    }
}

fn standing_for(performer: &Performer, owned: &[&Song]) -> Standing {
    Standing {
        performer_id: performer.id,
        join_time: performer.join_time,
        first_request_time: owned.iter().map(|s| s.request_time).min(),
        last_performance_time: owned.iter().filter_map(|s| s.performance_time).max(),
        has_pending_song: owned.iter().any(|s| s.is_pending()),
        active: performer.active,
        can_sing: performer.can_sing(),
    }
}

/// Standings for every performer, in id order.
pub fn standings(snapshot: &Snapshot) -> Vec<Standing> {
    let mut owned: HashMap<i64, Vec<&Song>> = HashMap::new();
    for song in &snapshot.songs {
        owned.entry(song.owner_id).or_default().push(song);
    }

    snapshot
        .performers
        .iter()
        .map(|p| standing_for(p, owned.get(&p.id).map(Vec::as_slice).unwrap_or(&[])))
        .collect()
}

/// Number of eligible performers who have not sung a song of their own yet.
pub fn newcomer_count(standings: &[Standing]) -> usize {
    standings
        .iter()
        .filter(|s| s.eligible() && s.no_perform_this_evening())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventState, Role};
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn performer(id: i64, role: Role) -> Performer {
        Performer {
            id,
            username: format!("user_{id}"),
            first_name: format!("User_{id}"),
            last_name: "Last_name".into(),
            role,
            active: true,
            raffle_participant: false,
            raffle_winner: false,
            join_time: at(id),
            ticket_order: None,
        }
    }

    fn song(id: i64, owner_id: i64, requested: i64, performed: Option<i64>) -> Song {
        Song {
            id,
            owner_id,
            title: format!("Song_{owner_id}_{id}"),
            show: "Wicked".into(),
            notes: String::new(),
            partners: Vec::new(),
            priority: if performed.is_some() { None } else { Some(1) },
            position: None,
            request_time: at(requested),
            performance_time: performed.map(at),
            skipped: false,
            standby: false,
            spotlight: false,
        }
    }

    fn snapshot(performers: Vec<Performer>, songs: Vec<Song>) -> Snapshot {
        Snapshot {
            performers,
            songs,
            event: EventState {
                passcode: "dev".into(),
                signup_open: true,
                current_group_song: None,
                group_song_started_at: None,
            },
        }
    }

    #[test]
    fn test_first_request_and_last_performance() {
        let snap = snapshot(
            vec![performer(1, Role::Singer)],
            vec![song(1, 1, 10, Some(20)), song(2, 1, 12, Some(30)), song(3, 1, 14, None)],
        );
        let s = &standings(&snap)[0];
        assert_eq!(s.first_request_time, Some(at(10)));
        assert_eq!(s.last_performance_time, Some(at(30)));
        assert!(s.eligible());
        assert!(!s.no_perform_this_evening());
    }

    #[test]
    fn test_partner_clock_does_not_advance() {
        let mut duet = song(1, 1, 10, Some(20));
        duet.partners = vec![2];
        let snap = snapshot(
            vec![performer(1, Role::Singer), performer(2, Role::Singer)],
            vec![duet, song(2, 2, 11, None)],
        );
        let all = standings(&snap);
        assert_eq!(all[0].last_performance_time, Some(at(20)));
        assert_eq!(all[1].last_performance_time, None);
        assert!(all[1].no_perform_this_evening());
        assert_eq!(newcomer_count(&all), 1);
    }

    #[test]
    fn test_eligibility_requires_active_singer_with_pending_song() {
        let mut inactive = performer(2, Role::Singer);
        inactive.active = false;
        let mut winner = performer(4, Role::Audience);
        winner.raffle_winner = true;
        let mut standby = song(5, 5, 5, None);
        standby.standby = true;

        let snap = snapshot(
            vec![
                performer(1, Role::Singer),
                inactive,
                performer(3, Role::Audience),
                winner,
                performer(5, Role::Singer),
                performer(6, Role::Host),
            ],
            vec![
                song(1, 1, 1, None),
                song(2, 2, 2, None),
                song(3, 3, 3, None),
                song(4, 4, 4, None),
                standby,
                song(6, 6, 6, None),
            ],
        );
        let eligible: Vec<i64> = standings(&snap)
            .iter()
            .filter(|s| s.eligible())
            .map(|s| s.performer_id)
            .collect();
        assert_eq!(eligible, vec![1, 4]);
    }
}
