use log::info;

use super::songs::perform;
use super::{Evening, EveningError, Result, require_song};
use crate::db::queries::{self, SongFlag};

impl Evening {
    /// Put one song in the spotlight, taking it from any other. A standby song
    /// stays on standby while lit.
    pub fn set_spotlight(&self, song_id: i64) -> Result<()> {
        let song = self.mutate("set_spotlight", |conn| {
            let song = require_song(conn, song_id)?;
            if song.performed() {
                return Err(EveningError::Validation(format!(
                    "\"{}\" was already performed",
                    song.title
                )));
            }
            queries::clear_spotlight(conn)?;
            queries::set_song_flag(conn, song_id, SongFlag::Spotlight, true)?;
            Ok(song)
        })?;
        info!("Spotlight on \"{}\"", song.title);
        Ok(())
    }

    /// Turn the spotlight off. A lit song that was not on standby counts as
    /// performed; a standby song just goes back to waiting.
    /// Returns the song that held the spotlight.
    pub fn remove_spotlight(&self) -> Result<Option<i64>> {
        let now = self.clock.now();
        let lit = self.mutate("remove_spotlight", |conn| {
            let Some(song) = queries::songs(conn)?.into_iter().find(|s| s.spotlight) else {
                return Ok(None);
            };
            queries::clear_spotlight(conn)?;
            if !song.standby {
                perform(conn, &song, now)?;
            }
            Ok(Some(song))
        })?;

        if let Some(song) = &lit {
            if song.standby {
                info!("Spotlight off \"{}\", back on standby", song.title);
            } else {
                info!("Spotlight off \"{}\", marked performed", song.title);
            }
        }
        Ok(lit.map(|s| s.id))
    }
}
