use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;

use super::{Evening, EveningError, Result, require_performer, require_song};
use crate::db::models::{NewSong, Role, Song};
use crate::db::queries::{self, SongFlag};
use crate::names;

/// A song request as submitted by a performer or a host on their behalf.
#[derive(Debug, Clone, Default)]
pub struct NewSongRequest {
    pub owner_id: i64,
    pub title: String,
    pub show: String,
    pub partners: Vec<i64>,
    pub notes: String,
    /// Allow a song another performer already owns.
    pub approve_duplicate: bool,
}

fn same_song(song: &Song, title: &str, show: &str) -> bool {
    song.title.to_lowercase() == title.to_lowercase()
        && song.show.to_lowercase() == show.to_lowercase()
}

/// Renumber an owner's unperformed songs to 1..n, keeping their relative order.
/// `first` is moved to the front.
pub(super) fn renumber_priorities(
    conn: &Connection,
    owner_id: i64,
    first: Option<i64>,
) -> Result<()> {
    let mut pending: Vec<Song> = queries::songs(conn)?
        .into_iter()
        .filter(|s| s.owner_id == owner_id && !s.performed())
        .collect();
    pending.sort_by_key(|s| {
        (
            Some(s.id) != first,
            s.priority.unwrap_or(i64::MAX),
            s.request_time,
            s.id,
        )
    });

    let priorities: Vec<(i64, Option<i64>)> = pending
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, Some(i as i64 + 1)))
        .collect();
    queries::set_priorities(conn, &priorities)?;
    Ok(())
}

/// Record a performance. The spotlight, if this song held it, goes out.
pub(super) fn perform(conn: &Connection, song: &Song, at: DateTime<Utc>) -> Result<()> {
    queries::set_performance_time(conn, song.id, Some(at))?;
    queries::set_priorities(conn, &[(song.id, None)])?;
    if song.spotlight {
        queries::set_song_flag(conn, song.id, SongFlag::Spotlight, false)?;
    }
    renumber_priorities(conn, song.owner_id, None)
}

/// Partners must exist and be distinct. The partner invariant itself is
/// checked against the whole evening at recalculation.
fn clean_partners(conn: &Connection, partners: &[i64]) -> Result<Vec<i64>> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(partners.len());
    for &id in partners {
        require_performer(conn, id)?;
        if seen.insert(id) {
            cleaned.push(id);
        }
    }
    Ok(cleaned)
}

/// Reject a song the evening already has, in the ways a performer can collide.
fn check_duplicate(
    conn: &Connection,
    owner_id: i64,
    title: &str,
    show: &str,
    approve_duplicate: bool,
) -> Result<()> {
    let songs = queries::songs(conn)?;
    let same: Vec<&Song> = songs.iter().filter(|s| same_song(s, title, show)).collect();
    let name_of = |id: i64| -> Result<String> { Ok(require_performer(conn, id)?.display_name()) };

    if let Some(own) = same.iter().find(|s| s.owner_id == owner_id) {
        return Err(EveningError::DuplicateSong {
            title: own.title.clone(),
            show: own.show.clone(),
            owner: name_of(owner_id)?,
            needs_approval: false,
        });
    }
    if let Some(theirs) = same
        .iter()
        .find(|s| !s.performed() && s.partners.contains(&owner_id))
    {
        return Err(EveningError::SignedUpByPartner {
            title: theirs.title.clone(),
            show: theirs.show.clone(),
            partner: name_of(theirs.owner_id)?,
        });
    }
    if let Some(other) = same.first() {
        if !approve_duplicate {
            return Err(EveningError::DuplicateSong {
                title: other.title.clone(),
                show: other.show.clone(),
                owner: name_of(other.owner_id)?,
                needs_approval: true,
            });
        }
    }
    Ok(())
}

impl Evening {
    pub fn add_song(&self, req: &NewSongRequest) -> Result<Song> {
        let title = names::title_case(&req.title);
        let show = names::title_case(&req.show);
        if title.is_empty() || show.is_empty() {
            return Err(EveningError::Validation(
                "A song needs a title and a show".to_string(),
            ));
        }
        let notes = req.notes.trim().to_string();
        let limit = self.settings.raffle_song_limit;

        let id = self.mutate("add_song", |conn| {
            let owner = require_performer(conn, req.owner_id)?;
            if !owner.active {
                return Err(EveningError::Validation(format!(
                    "{} is logged out",
                    owner.display_name()
                )));
            }
            match owner.role {
                Role::Singer => {}
                Role::Host => {
                    return Err(EveningError::Validation(
                        "Hosts do not own songs; add it for a singer".to_string(),
                    ));
                }
                Role::Audience if !owner.raffle_winner => {
                    return Err(EveningError::Validation(format!(
                        "{} is in the audience and can only join as a partner",
                        owner.display_name()
                    )));
                }
                Role::Audience => {
                    let owned = queries::songs(conn)?
                        .iter()
                        .filter(|s| s.owner_id == owner.id)
                        .count();
                    if owned >= limit {
                        return Err(EveningError::Validation(format!(
                            "Raffle winners may sign up for {limit} song(s)"
                        )));
                    }
                }
            }

            check_duplicate(conn, owner.id, &title, &show, req.approve_duplicate)?;
            let partners = clean_partners(conn, &req.partners)?;

            let pending = queries::songs(conn)?
                .iter()
                .filter(|s| s.owner_id == owner.id && !s.performed())
                .count() as i64;
            let id = queries::insert_song(
                conn,
                &NewSong {
                    owner_id: owner.id,
                    title: title.clone(),
                    show: show.clone(),
                    notes: notes.clone(),
                    priority: pending + 1,
                    request_time: self.clock.now(),
                },
            )?;
            queries::replace_partners(conn, id, &partners)?;
            Ok(id)
        })?;

        let song = self.song(id)?;
        info!("Song added: \"{}\" ({}) by performer {}", song.title, song.show, song.owner_id);
        Ok(song)
    }

    pub fn remove_song(&self, song_id: i64) -> Result<()> {
        let song = self.mutate("remove_song", |conn| {
            let song = require_song(conn, song_id)?;
            queries::delete_song(conn, song_id)?;
            renumber_priorities(conn, song.owner_id, None)?;
            Ok(song)
        })?;
        info!("Song removed: \"{}\"", song.title);
        Ok(())
    }

    /// Reorder an owner's unperformed songs. `song_ids` must list each of them once.
    pub fn reorder_priorities(&self, owner_id: i64, song_ids: &[i64]) -> Result<()> {
        self.mutate("reorder_priorities", |conn| {
            require_performer(conn, owner_id)?;
            let pending: HashSet<i64> = queries::songs(conn)?
                .iter()
                .filter(|s| s.owner_id == owner_id && !s.performed())
                .map(|s| s.id)
                .collect();
            let given: HashSet<i64> = song_ids.iter().copied().collect();
            if given.len() != song_ids.len() || given != pending {
                return Err(EveningError::Validation(format!(
                    "Priorities must list each unperformed song of performer {owner_id} exactly once"
                )));
            }

            let priorities: Vec<(i64, Option<i64>)> = song_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, Some(i as i64 + 1)))
                .collect();
            queries::set_priorities(conn, &priorities)?;
            Ok(())
        })
    }

    /// Replace the partner set of an unperformed song.
    pub fn set_partners(&self, song_id: i64, partners: &[i64]) -> Result<()> {
        self.mutate("set_partners", |conn| {
            let song = require_song(conn, song_id)?;
            if song.performed() {
                return Err(EveningError::Validation(format!(
                    "\"{}\" was already performed",
                    song.title
                )));
            }
            let partners = clean_partners(conn, partners)?;
            queries::replace_partners(conn, song_id, &partners)?;
            Ok(())
        })
    }

    pub fn mark_performed(&self, song_id: i64) -> Result<()> {
        let now = self.clock.now();
        let song = self.mutate("mark_performed", |conn| {
            let song = require_song(conn, song_id)?;
            if song.performed() {
                return Err(EveningError::Validation(format!(
                    "\"{}\" was already performed",
                    song.title
                )));
            }
            perform(conn, &song, now)?;
            Ok(song)
        })?;
        info!("Performed: \"{}\" ({})", song.title, song.show);
        Ok(())
    }

    /// Undo a performance. The song goes back to the top of its owner's list.
    pub fn unmark_performed(&self, song_id: i64) -> Result<()> {
        let song = self.mutate("unmark_performed", |conn| {
            let song = require_song(conn, song_id)?;
            if !song.performed() {
                return Err(EveningError::Validation(format!(
                    "\"{}\" wasn't performed",
                    song.title
                )));
            }
            queries::set_performance_time(conn, song_id, None)?;
            renumber_priorities(conn, song.owner_id, Some(song_id))?;
            Ok(song)
        })?;
        info!("Performance undone: \"{}\"", song.title);
        Ok(())
    }

    fn set_flag(&self, op: &str, song_id: i64, flag: SongFlag, value: bool) -> Result<()> {
        self.mutate(op, |conn| {
            require_song(conn, song_id)?;
            queries::set_song_flag(conn, song_id, flag, value)?;
            Ok(())
        })
    }

    pub fn set_skipped(&self, song_id: i64) -> Result<()> {
        self.set_flag("set_skipped", song_id, SongFlag::Skipped, true)
    }

    pub fn unset_skipped(&self, song_id: i64) -> Result<()> {
        self.set_flag("unset_skipped", song_id, SongFlag::Skipped, false)
    }

    pub fn set_standby(&self, song_id: i64) -> Result<()> {
        self.set_flag("set_standby", song_id, SongFlag::Standby, true)
    }

    pub fn unset_standby(&self, song_id: i64) -> Result<()> {
        self.set_flag("unset_standby", song_id, SongFlag::Standby, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::models::NewPerformer;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 7, 10, 20, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let owner = queries::insert_performer(
            &db.conn,
            &NewPerformer {
                username: "a_b".into(),
                first_name: "A".into(),
                last_name: "B".into(),
                role: Role::Singer,
                join_time: at(0),
                ticket_order: None,
            },
        )
        .unwrap();
        (db, owner)
    }

    fn add(db: &Database, owner: i64, title: &str, priority: i64, secs: i64) -> i64 {
        queries::insert_song(
            &db.conn,
            &NewSong {
                owner_id: owner,
                title: title.into(),
                show: "Show".into(),
                notes: String::new(),
                priority,
                request_time: at(secs),
            },
        )
        .unwrap()
    }

    fn priorities(db: &Database) -> Vec<(i64, Option<i64>)> {
        queries::songs(&db.conn)
            .unwrap()
            .iter()
            .map(|s| (s.id, s.priority))
            .collect()
    }

    #[test]
    fn test_renumber_closes_gaps() {
        let (db, owner) = setup();
        let a = add(&db, owner, "One", 1, 1);
        let b = add(&db, owner, "Two", 4, 2);
        let c = add(&db, owner, "Three", 7, 3);
        renumber_priorities(&db.conn, owner, None).unwrap();
        assert_eq!(priorities(&db), vec![(a, Some(1)), (b, Some(2)), (c, Some(3))]);
    }

    #[test]
    fn test_renumber_moves_first_to_front() {
        let (db, owner) = setup();
        let a = add(&db, owner, "One", 1, 1);
        let b = add(&db, owner, "Two", 2, 2);
        let c = add(&db, owner, "Three", 3, 3);
        renumber_priorities(&db.conn, owner, Some(c)).unwrap();
        assert_eq!(priorities(&db), vec![(a, Some(2)), (b, Some(3)), (c, Some(1))]);
    }

    #[test]
    fn test_perform_clears_priority_and_spotlight() {
        let (db, owner) = setup();
        let a = add(&db, owner, "One", 1, 1);
        let b = add(&db, owner, "Two", 2, 2);
        queries::set_song_flag(&db.conn, a, SongFlag::Spotlight, true).unwrap();

        let song = queries::song(&db.conn, a).unwrap().unwrap();
        perform(&db.conn, &song, at(10)).unwrap();

        let song = queries::song(&db.conn, a).unwrap().unwrap();
        assert_eq!(song.performance_time, Some(at(10)));
        assert!(!song.spotlight);
        assert_eq!(priorities(&db), vec![(a, None), (b, Some(1))]);
    }

    #[test]
    fn test_same_song_ignores_case() {
        let (db, owner) = setup();
        let id = add(&db, owner, "Defying Gravity", 1, 1);
        let song = queries::song(&db.conn, id).unwrap().unwrap();
        assert!(same_song(&song, "defying gravity", "SHOW"));
        assert!(!same_song(&song, "Defying Gravity", "Wicked"));
    }
}
