//! Disneyland ordering: the spine of the lineup.
//!
//! Eligible performers are split into newcomers (no performance of their own
//! yet) and veterans. Newcomers queue by when they first asked for a song,
//! veterans by when they last sang. While signup is open the two queues are
//! interleaved like a FastPass line; once it closes every newcomer goes first.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::Standing;

/// How newcomers and veterans are interleaved while signup is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Merge both queues by the moment each performer (re-)entered it:
    /// a newcomer's first request against a veteran's last performance.
    #[default]
    Chronological,
    /// Strict one newcomer, one veteran, starting with a newcomer.
    Alternating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    performer_id: i64,
    key: DateTime<Utc>,
    join_time: DateTime<Utc>,
}

impl Entry {
    fn cmp_queue(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.join_time.cmp(&other.join_time))
            .then(self.performer_id.cmp(&other.performer_id))
    }
}

/// Split eligible standings into (newcomers, veterans), each sorted by its queue key.
fn queues(standings: &[Standing]) -> (Vec<Entry>, Vec<Entry>) {
    let mut newcomers = Vec::new();
    let mut veterans = Vec::new();

    for s in standings.iter().filter(|s| s.eligible()) {
        match (s.last_performance_time, s.first_request_time) {
            (Some(last), _) => veterans.push(Entry {
                performer_id: s.performer_id,
                key: last,
                join_time: s.join_time,
            }),
            (None, Some(first)) => newcomers.push(Entry {
                performer_id: s.performer_id,
                key: first,
                join_time: s.join_time,
            }),
            // Eligible means a pending owned song exists, so a first request does too
            (None, None) => {}
        }
    }

    newcomers.sort_by(Entry::cmp_queue);
    veterans.sort_by(Entry::cmp_queue);
    (newcomers, veterans)
}

fn merge_chronological(newcomers: Vec<Entry>, veterans: Vec<Entry>) -> Vec<i64> {
    let mut out = Vec::with_capacity(newcomers.len() + veterans.len());
    let mut n = newcomers.into_iter().peekable();
    let mut v = veterans.into_iter().peekable();

    loop {
        let take_newcomer = match (n.peek(), v.peek()) {
            (Some(a), Some(b)) => a.key <= b.key,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_newcomer { n.next() } else { v.next() };
        if let Some(entry) = next {
            out.push(entry.performer_id);
        }
    }
    out
}

fn merge_alternating(newcomers: Vec<Entry>, veterans: Vec<Entry>) -> Vec<i64> {
    let mut out = Vec::with_capacity(newcomers.len() + veterans.len());
    let mut n = newcomers.into_iter();
    let mut v = veterans.into_iter();

    loop {
        let a = n.next();
        let b = v.next();
        if a.is_none() && b.is_none() {
            break;
        }
        out.extend(a.map(|e| e.performer_id));
        out.extend(b.map(|e| e.performer_id));
    }
    out
}

/// Compute the ordered list of performer ids for the next performances.
/// Pure function of the standings and the signup gate.
pub fn disneyland_order(
    standings: &[Standing],
    signup_open: bool,
    policy: OrderingPolicy,
) -> Vec<i64> {
    let (newcomers, veterans) = queues(standings);

    if !signup_open {
        return newcomers
            .into_iter()
            .chain(veterans)
            .map(|e| e.performer_id)
            .collect();
    }

    match policy {
        OrderingPolicy::Chronological => merge_chronological(newcomers, veterans),
        OrderingPolicy::Alternating => merge_alternating(newcomers, veterans),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn newcomer(id: i64, first_request: i64) -> Standing {
        Standing {
            performer_id: id,
            join_time: at(id),
            first_request_time: Some(at(first_request)),
            last_performance_time: None,
            has_pending_song: true,
            active: true,
            can_sing: true,
        }
    }

    fn veteran(id: i64, first_request: i64, last_performance: i64) -> Standing {
        Standing {
            last_performance_time: Some(at(last_performance)),
            ..newcomer(id, first_request)
        }
    }

    #[test]
    fn test_empty() {
        assert!(disneyland_order(&[], true, OrderingPolicy::Chronological).is_empty());
        assert!(disneyland_order(&[], false, OrderingPolicy::Alternating).is_empty());
    }

    #[test]
    fn test_newcomers_by_first_request_not_join_time() {
        // 1 joined first but asked for a song last
        let standings = vec![newcomer(1, 50), newcomer(2, 20), newcomer(3, 30)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![2, 3, 1]
        );
    }

    #[test]
    fn test_performer_moves_behind_everyone_who_asked_before_they_sang() {
        // p1..p4 request at 10..13, p1 sings at 20
        let standings = vec![veteran(1, 10, 20), newcomer(2, 11), newcomer(3, 12), newcomer(4, 13)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![2, 3, 4, 1]
        );
    }

    #[test]
    fn test_chronological_interleaving() {
        // p1, p2 sang at 20 and 40; p3 asked at 15, p4 at 30
        let standings = vec![veteran(1, 1, 20), veteran(2, 2, 40), newcomer(3, 15), newcomer(4, 30)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![3, 1, 4, 2]
        );
    }

    #[test]
    fn test_alternating_starts_with_newcomer_regardless_of_time() {
        let standings = vec![veteran(1, 1, 2), veteran(2, 2, 3), newcomer(3, 50), newcomer(4, 60)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Alternating),
            vec![3, 1, 4, 2]
        );
    }

    #[test]
    fn test_alternating_drains_longer_queue() {
        let standings = vec![veteran(1, 1, 2), newcomer(3, 50), newcomer(4, 60), newcomer(5, 70)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Alternating),
            vec![3, 1, 4, 5]
        );
    }

    #[test]
    fn test_closed_signup_puts_newcomers_first() {
        // Open: [p1(v), p3(n), p2(v), p4(n), p5(n)]
        let standings = vec![
            veteran(1, 1, 10),
            veteran(2, 2, 30),
            newcomer(3, 20),
            newcomer(4, 40),
            newcomer(5, 50),
        ];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![1, 3, 2, 4, 5]
        );
        for policy in [OrderingPolicy::Chronological, OrderingPolicy::Alternating] {
            assert_eq!(disneyland_order(&standings, false, policy), vec![3, 4, 5, 1, 2]);
        }
    }

    #[test]
    fn test_ties_broken_by_join_time_then_id() {
        let mut a = newcomer(7, 10);
        a.join_time = at(5);
        let mut b = newcomer(3, 10);
        b.join_time = at(5);
        let mut c = newcomer(9, 10);
        c.join_time = at(1);
        assert_eq!(
            disneyland_order(&[a, b, c], true, OrderingPolicy::Chronological),
            vec![9, 3, 7]
        );
    }

    #[test]
    fn test_newcomer_wins_tie_with_veteran() {
        let standings = vec![veteran(1, 1, 10), newcomer(2, 10)];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![2, 1]
        );
    }

    #[test]
    fn test_ineligible_performers_left_out() {
        let mut gone = newcomer(2, 5);
        gone.active = false;
        let mut nothing_pending = veteran(3, 1, 2);
        nothing_pending.has_pending_song = false;
        let standings = vec![newcomer(1, 10), gone, nothing_pending];
        assert_eq!(
            disneyland_order(&standings, true, OrderingPolicy::Chronological),
            vec![1]
        );
    }
}
