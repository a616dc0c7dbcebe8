use std::collections::HashMap;
use tracing::{info, warn};

use crate::model::{EventRecord, SongplayFact, TimeDim};
use crate::resolver::ReferenceResolver;

/// Run-scoped surrogate-id source for the fact table. Ids are unique
/// and increasing within one run; nothing is promised across runs, so
/// callers must not treat `songplay_id` as stable between rebuilds.
pub struct SongplayIdArena {
    next: i64,
}

impl SongplayIdArena {
    pub fn new() -> Self {
        SongplayIdArena { next: 0 }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for SongplayIdArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the songplays fact table from the filtered events and the
/// persisted dimensions.
///
/// Join policy, in order:
/// 1. event → artist by name, left outer: no match leaves `artist_id`
///    null but keeps the row.
/// 2. event → song by (title, resolved artist_id), left outer: a song
///    is only looked up once its artist resolved.
/// 3. event → time by `ts`, inner: events with no matching time row are
///    dropped. That asymmetry is part of the contract.
pub fn build_songplays(
    events: &[EventRecord],
    resolver: &dyn ReferenceResolver,
    time: &[TimeDim],
) -> Vec<SongplayFact> {
    let time_by_ts: HashMap<i64, &TimeDim> = time.iter().map(|t| (t.ts, t)).collect();

    let mut arena = SongplayIdArena::new();
    let mut facts = Vec::with_capacity(events.len());
    let mut dropped = 0usize;
    let mut unmatched = 0usize;

    for event in events {
        let Some(time_row) = time_by_ts.get(&event.ts) else {
            dropped += 1;
            continue;
        };

        let artist_id = event
            .artist
            .as_deref()
            .and_then(|name| resolver.resolve_artist(name));
        let song_id = match (event.song.as_deref(), artist_id) {
            (Some(title), Some(artist_id)) => resolver.resolve_song(title, artist_id),
            _ => None,
        };
        if artist_id.is_none() {
            unmatched += 1;
        }

        facts.push(SongplayFact {
            songplay_id: arena.next_id(),
            start_datetime: time_row.start_datetime,
            user_id: event.user_id.clone(),
            level: event.level,
            song_id: song_id.map(str::to_string),
            artist_id: artist_id.map(str::to_string),
            session_id: event.session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
            year: time_row.year,
            month: time_row.month,
        });
    }

    if dropped > 0 {
        warn!("dropped {} events with no matching time row", dropped);
    }
    info!(
        "built {} songplay rows ({} with unresolved artist)",
        facts.len(),
        unmatched
    );
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::build_time;
    use crate::model::Level;
    use crate::resolver::ExactMatchResolver;
    use crate::model::{ArtistDim, SongDim};

    fn event(ts: i64, song: Option<&str>, artist: Option<&str>) -> EventRecord {
        EventRecord {
            ts,
            page: "NextSong".to_string(),
            user_id: "10".to_string(),
            first_name: "Sylvie".to_string(),
            last_name: "Cruz".to_string(),
            gender: "F".to_string(),
            level: Level::Free,
            session_id: 345,
            location: "SF".to_string(),
            user_agent: "UA".to_string(),
            song: song.map(str::to_string),
            artist: artist.map(str::to_string),
        }
    }

    fn catalog_resolver() -> ExactMatchResolver {
        ExactMatchResolver::new(
            &[SongDim {
                song_id: "S1".to_string(),
                title: "X".to_string(),
                artist_id: "A1".to_string(),
                year: 2000,
                duration: 180.5,
            }],
            &[ArtistDim {
                artist_id: "A1".to_string(),
                name: "Y".to_string(),
                location: None,
                latitude: None,
                longitude: None,
            }],
        )
    }

    #[test]
    fn resolves_song_and_artist_ids() {
        let events = vec![event(1541440192796, Some("X"), Some("Y"))];
        let time = build_time(&events).unwrap();
        let facts = build_songplays(&events, &catalog_resolver(), &time);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].song_id.as_deref(), Some("S1"));
        assert_eq!(facts[0].artist_id.as_deref(), Some("A1"));
        assert_eq!(facts[0].year, 2018);
        assert_eq!(facts[0].month, 11);
    }

    #[test]
    fn unknown_artist_still_emits_a_row() {
        let events = vec![event(1541440192796, Some("X"), Some("Unknown Band"))];
        let time = build_time(&events).unwrap();
        let facts = build_songplays(&events, &catalog_resolver(), &time);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].artist_id, None);
        // the song title exists in the catalog, but a song can only
        // match through its resolved artist
        assert_eq!(facts[0].song_id, None);
    }

    #[test]
    fn events_without_a_time_row_are_dropped() {
        let events = vec![event(1541440192796, Some("X"), Some("Y"))];
        let facts = build_songplays(&events, &catalog_resolver(), &[]);
        assert!(facts.is_empty());
    }

    #[test]
    fn every_fact_ts_exists_in_the_time_dimension() {
        let events = vec![
            event(1541440192796, Some("X"), Some("Y")),
            event(1541440193000, None, None),
        ];
        let time = build_time(&events[..1]).unwrap();
        let facts = build_songplays(&events, &catalog_resolver(), &time);
        assert_eq!(facts.len(), 1);
        assert!(time.iter().any(|t| t.start_datetime == facts[0].start_datetime));
    }

    #[test]
    fn surrogate_ids_are_unique_and_increasing() {
        let events = vec![
            event(1541440192796, None, None),
            event(1541440192796, None, None),
            event(1541440192796, None, None),
        ];
        let time = build_time(&events).unwrap();
        let facts = build_songplays(&events, &catalog_resolver(), &time);
        let ids: Vec<i64> = facts.iter().map(|f| f.songplay_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
