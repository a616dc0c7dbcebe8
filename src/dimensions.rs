use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::model::{ArtistDim, EventRecord, Level, SongDim, SongRecord, TimeDim, UserDim};
use crate::timeparts::TimeParts;

/// Projects the songs dimension, one row per catalog entry. The catalog
/// is assumed unique by `song_id`; duplicates pass through uncorrected,
/// so their count is at least surfaced in the logs.
pub fn build_songs(catalog: &[SongRecord]) -> Vec<SongDim> {
    let distinct_ids: HashSet<&str> = catalog.iter().map(|s| s.song_id.as_str()).collect();
    if distinct_ids.len() < catalog.len() {
        debug!(
            "catalog has {} duplicate song_id entries, passing them through",
            catalog.len() - distinct_ids.len()
        );
    }

    catalog
        .iter()
        .map(|s| SongDim {
            song_id: s.song_id.clone(),
            title: s.title.clone(),
            artist_id: s.artist_id.clone(),
            year: s.year,
            duration: s.duration,
        })
        .collect()
}

/// Projects the artists dimension with an explicit distinct step: a
/// catalog lists the same artist once per song, so rows are deduplicated
/// by `artist_id`, first occurrence wins.
pub fn build_artists(catalog: &[SongRecord]) -> Vec<ArtistDim> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut artists = Vec::new();
    for s in catalog {
        if seen.insert(s.artist_id.as_str()) {
            artists.push(ArtistDim {
                artist_id: s.artist_id.clone(),
                name: s.artist_name.clone(),
                location: s.artist_location.clone(),
                latitude: s.artist_latitude,
                longitude: s.artist_longitude,
            });
        }
    }

    debug!(
        "artists dimension: {} rows from {} catalog entries",
        artists.len(),
        catalog.len()
    );
    artists
}

/// Groups events by the user identity tuple and reduces `level` to the
/// highest-privilege value ever observed for that identity. Output is
/// sorted by the identity tuple so reruns produce identical tables.
pub fn build_users(events: &[EventRecord]) -> Vec<UserDim> {
    let mut levels: HashMap<(&str, &str, &str, &str), Level> = HashMap::new();
    for e in events {
        let key = (
            e.user_id.as_str(),
            e.first_name.as_str(),
            e.last_name.as_str(),
            e.gender.as_str(),
        );
        levels
            .entry(key)
            .and_modify(|level| *level = (*level).max(e.level))
            .or_insert(e.level);
    }

    let mut users: Vec<UserDim> = levels
        .into_iter()
        .map(|((user_id, first_name, last_name, gender), level)| UserDim {
            user_id: user_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            gender: gender.to_string(),
            level,
        })
        .collect();
    users.sort_by(|a, b| {
        (&a.user_id, &a.first_name, &a.last_name, &a.gender)
            .cmp(&(&b.user_id, &b.first_name, &b.last_name, &b.gender))
    });
    users
}

/// Derives the time dimension: one row per distinct `ts`, ordered by
/// `ts`. Duplicate timestamps across events collapse to a single row,
/// which is what keeps `ts` usable as the dimension key.
pub fn build_time(events: &[EventRecord]) -> Result<Vec<TimeDim>> {
    let mut rows: BTreeMap<i64, TimeDim> = BTreeMap::new();
    for e in events {
        if rows.contains_key(&e.ts) {
            continue;
        }
        let parts = TimeParts::from_epoch_millis(e.ts)?;
        rows.insert(
            e.ts,
            TimeDim {
                ts: e.ts,
                start_datetime: parts.start_datetime,
                start_timestamp: parts.start_timestamp,
                year: parts.year,
                month: parts.month,
                day_of_month: parts.day_of_month,
                hour: parts.hour,
                week_of_year: parts.week_of_year,
            },
        );
    }
    Ok(rows.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(song_id: &str, artist_id: &str, artist_name: &str) -> SongRecord {
        SongRecord {
            song_id: song_id.to_string(),
            title: format!("title of {}", song_id),
            artist_id: artist_id.to_string(),
            artist_name: artist_name.to_string(),
            artist_location: None,
            artist_latitude: None,
            artist_longitude: None,
            duration: 180.5,
            year: 2000,
        }
    }

    fn event(ts: i64, user_id: &str, level: Level) -> EventRecord {
        EventRecord {
            ts,
            page: "NextSong".to_string(),
            user_id: user_id.to_string(),
            first_name: "Sylvie".to_string(),
            last_name: "Cruz".to_string(),
            gender: "F".to_string(),
            level,
            session_id: 345,
            location: "SF".to_string(),
            user_agent: "UA".to_string(),
            song: None,
            artist: None,
        }
    }

    #[test]
    fn songs_keep_one_row_per_catalog_entry() {
        let catalog = vec![song("S1", "A1", "Y"), song("S1", "A1", "Y")];
        // duplicates propagate; the catalog is trusted to be unique
        assert_eq!(build_songs(&catalog).len(), 2);
    }

    #[test]
    fn artists_are_deduplicated_by_id() {
        let catalog = vec![
            song("S1", "A1", "Y"),
            song("S2", "A1", "Y"),
            song("S3", "A2", "Z"),
        ];
        let artists = build_artists(&catalog);
        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].artist_id, "A1");
        assert_eq!(artists[1].artist_id, "A2");
    }

    #[test]
    fn users_keep_highest_level_observed() {
        let events = vec![
            event(1, "10", Level::Free),
            event(2, "10", Level::Paid),
            event(3, "10", Level::Free),
            event(4, "20", Level::Free),
        ];
        let users = build_users(&events);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, "10");
        assert_eq!(users[0].level, Level::Paid);
        assert_eq!(users[1].level, Level::Free);
    }

    #[test]
    fn users_upgrade_regardless_of_event_order() {
        let events = vec![event(1, "10", Level::Paid), event(2, "10", Level::Free)];
        let users = build_users(&events);
        assert_eq!(users[0].level, Level::Paid);
    }

    #[test]
    fn time_rows_are_distinct_by_ts() {
        let events = vec![
            event(1541440192796, "10", Level::Free),
            event(1541440192796, "20", Level::Free),
            event(1541440193000, "10", Level::Free),
        ];
        let time = build_time(&events).unwrap();
        assert_eq!(time.len(), 2);
        assert_eq!(time[0].ts, 1541440192796);
        assert_eq!(time[0].year, 2018);
        assert_eq!(time[0].month, 11);
        assert_eq!(time[0].week_of_year, 45);
    }
}
