//! Whole-evening checks run before every recalculation commits.

use std::collections::HashMap;

use thiserror::Error;

use crate::db::models::{Role, Snapshot};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `other_song_id` is the lower song id; either side may be the edited one.
    #[error("{name} cannot be a partner on both \"{other_title}\" and \"{title}\"")]
    PartnerOnTwoSongs {
        performer_id: i64,
        name: String,
        song_id: i64,
        title: String,
        other_song_id: i64,
        other_title: String,
    },
    #[error("{name} owns \"{title}\" and cannot also be its partner")]
    SelfPartner {
        performer_id: i64,
        name: String,
        song_id: i64,
        title: String,
    },
    #[error("songs {0:?} are all in the spotlight")]
    MultipleSpotlights(Vec<i64>),
}

/// A non-host performer is a partner on at most one unperformed song, and
/// never on their own.
pub fn check_partners(snapshot: &Snapshot) -> Result<(), Violation> {
    let mut seen: HashMap<i64, i64> = HashMap::new();
    let name_of = |id: i64| {
        snapshot
            .performer(id)
            .map(|p| p.display_name())
            .unwrap_or_else(|| format!("performer {id}"))
    };
    let title_of = |id: i64| snapshot.song(id).map(|s| s.title.clone()).unwrap_or_default();

    for song in snapshot.songs.iter().filter(|s| !s.performed()) {
        for &partner in &song.partners {
            if partner == song.owner_id {
                return Err(Violation::SelfPartner {
                    performer_id: partner,
                    name: name_of(partner),
                    song_id: song.id,
                    title: song.title.clone(),
                });
            }
            let is_host = snapshot
                .performer(partner)
                .is_some_and(|p| p.role == Role::Host);
            if is_host {
                continue;
            }
            if let Some(&other) = seen.get(&partner) {
                return Err(Violation::PartnerOnTwoSongs {
                    performer_id: partner,
                    name: name_of(partner),
                    song_id: song.id,
                    title: song.title.clone(),
                    other_song_id: other,
                    other_title: title_of(other),
                });
            }
            seen.insert(partner, song.id);
        }
    }
    Ok(())
}

pub fn check_spotlight(snapshot: &Snapshot) -> Result<(), Violation> {
    let lit: Vec<i64> = snapshot
        .songs
        .iter()
        .filter(|s| s.spotlight)
        .map(|s| s.id)
        .collect();
    if lit.len() > 1 {
        return Err(Violation::MultipleSpotlights(lit));
    }
    Ok(())
}

pub fn check(snapshot: &Snapshot) -> Result<(), Violation> {
    check_partners(snapshot)?;
    check_spotlight(snapshot)
}
