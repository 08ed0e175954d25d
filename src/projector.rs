use std::collections::HashSet;

use crate::db::models::Song;

/// Positions assigned by one projection, as (song id, position) in lineup order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub positions: Vec<(i64, i64)>,
}

impl Projection {
    pub fn position_of(&self, song_id: i64) -> Option<i64> {
        self.positions
            .iter()
            .find(|(id, _)| *id == song_id)
            .map(|(_, pos)| *pos)
    }

    pub fn song_ids(&self) -> Vec<i64> {
        self.positions.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A performer's next pending song: lowest priority among owned songs that are
/// unperformed, not skipped and not on standby.
pub fn next_pending_song<'a>(owner_id: i64, songs: &'a [Song]) -> Option<&'a Song> {
    songs
        .iter()
        .filter(|s| s.owner_id == owner_id && s.is_pending())
        .min_by_key(|s| (s.priority.unwrap_or(i64::MAX), s.request_time, s.id))
}

/// Assign positions 1..K along the ordering, one song per performer.
///
/// A duet takes only its owner's slot; partners keep their own slot for songs
/// they own. Every song not returned here has no position.
pub fn project(order: &[i64], songs: &[Song]) -> Projection {
    let mut seen = HashSet::new();
    let mut positions = Vec::with_capacity(order.len());
    for &performer_id in order {
        if !seen.insert(performer_id) {
            continue;
        }
        if let Some(song) = next_pending_song(performer_id, songs) {
            positions.push((song.id, positions.len() as i64 + 1));
        }
    }

    Projection { positions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 10, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// Song `num` of singer `owner`, id = owner * 10 + num, priority = num.
    fn song(owner: i64, num: i64) -> Song {
        Song {
            id: owner * 10 + num,
            owner_id: owner,
            title: format!("Song_{owner}_{num}"),
            show: "Wicked".into(),
            notes: String::new(),
            partners: Vec::new(),
            priority: Some(num),
            position: None,
            request_time: at(owner * 10 + num),
            performance_time: None,
            skipped: false,
            standby: false,
            spotlight: false,
        }
    }

    fn performed(mut s: Song) -> Song {
        s.performance_time = Some(at(1000 + s.id));
        s.priority = None;
        s
    }

    fn songs_for(owners: &[i64], per_owner: i64) -> Vec<Song> {
        owners
            .iter()
            .flat_map(|&o| (1..=per_owner).map(move |n| song(o, n)))
            .collect()
    }

    fn lineup(p: &Projection) -> Vec<(i64, i64)> {
        p.song_ids().iter().map(|id| (id / 10, id % 10)).collect()
    }

    const ORDER: [i64; 10] = [5, 6, 2, 7, 8, 9, 3, 4, 1, 0];

    #[test]
    fn test_no_songs_no_positions() {
        assert!(project(&ORDER, &[]).is_empty());
    }

    #[test]
    fn test_all_performers_have_songs() {
        let songs = songs_for(&[1, 2, 3, 4, 5, 6, 7, 8, 9], 3);
        let p = project(&ORDER, &songs);
        assert_eq!(
            lineup(&p),
            vec![(5, 1), (6, 1), (2, 1), (7, 1), (8, 1), (9, 1), (3, 1), (4, 1), (1, 1)]
        );
        let positions: Vec<i64> = p.positions.iter().map(|(_, pos)| *pos).collect();
        assert_eq!(positions, (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_performers_without_songs_take_no_slot() {
        let songs = songs_for(&[1, 2, 3, 4, 5, 6, 8], 1);
        let p = project(&ORDER, &songs);
        assert_eq!(
            lineup(&p),
            vec![(5, 1), (6, 1), (2, 1), (8, 1), (3, 1), (4, 1), (1, 1)]
        );
    }

    #[test]
    fn test_next_song_after_performances() {
        let mut songs = songs_for(&[1, 2, 3], 3);
        songs[0] = performed(songs[0].clone()); // 1.1
        songs[1] = performed(songs[1].clone()); // 1.2
        songs[3] = performed(songs[3].clone()); // 2.1
        let p = project(&[2, 3, 1], &songs);
        assert_eq!(lineup(&p), vec![(2, 2), (3, 1), (1, 3)]);
    }

    #[test]
    fn test_priority_not_insertion_order_picks_song() {
        let mut songs = songs_for(&[1], 3);
        songs[0].priority = Some(3);
        songs[2].priority = Some(1);
        let p = project(&[1], &songs);
        assert_eq!(lineup(&p), vec![(1, 3)]);
    }

    #[test]
    fn test_duet_occupies_only_owner_slot() {
        // 1's first song is a duet with 2; 2 still gets a slot with their own song
        let mut songs = songs_for(&[1, 2], 1);
        songs[0].partners = vec![2];
        let p = project(&[1, 2], &songs);
        assert_eq!(lineup(&p), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn test_partner_only_performer_has_no_slot() {
        let mut songs = songs_for(&[1], 1);
        songs[0].partners = vec![3];
        let p = project(&[1, 3], &songs);
        assert_eq!(lineup(&p), vec![(1, 1)]);
    }

    #[test]
    fn test_skipped_and_standby_passed_over() {
        let mut songs = songs_for(&[1, 2, 3], 2);
        songs[0].skipped = true; // 1.1 -> 1.2 is next
        songs[2].standby = true; // 2.1 -> 2.2 is next
        songs[4].standby = true; // 3.1
        songs[5].skipped = true; // 3.2 -> nothing left for 3
        let p = project(&[1, 2, 3], &songs);
        assert_eq!(lineup(&p), vec![(1, 2), (2, 2)]);
        assert_eq!(p.position_of(12), Some(1));
        assert_eq!(p.position_of(11), None);
    }

    #[test]
    fn test_performers_missing_from_order_get_nothing() {
        let songs = songs_for(&[1, 2, 3], 1);
        let p = project(&[3, 1], &songs);
        assert_eq!(lineup(&p), vec![(3, 1), (1, 1)]);
    }
}
