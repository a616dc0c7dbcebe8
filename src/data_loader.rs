use anyhow::{Context, Result};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::model::{EventRecord, SongRecord, SONG_PLAY_PAGE};

/// Collects every `.json` file under a directory, however deeply nested.
/// The list is sorted so repeated runs see the files in the same order.
fn json_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(OsStr::to_str) == Some("json")
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Parses a file as JSON lines: one object per non-empty line. A file
/// holding a single object is just the one-line case. Any malformed
/// line fails the whole run; there is no partial catalog or log.
fn parse_json_lines(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .with_context(|| format!("malformed JSON in {}", path.display()))
        })
        .collect()
}

/// Loads the song-metadata catalog from `<base>/song_data/`.
pub fn load_song_data(input_base: &Path) -> Result<Vec<SongRecord>> {
    let root = input_base.join("song_data");
    let files = json_files(&root)?;
    debug!("found {} catalog files under {}", files.len(), root.display());

    let mut records = Vec::new();
    for path in &files {
        for value in parse_json_lines(path)? {
            let record: SongRecord = serde_json::from_value(value)
                .with_context(|| format!("invalid catalog record in {}", path.display()))?;
            records.push(record);
        }
    }

    info!("loaded {} catalog records", records.len());
    Ok(records)
}

/// Loads the activity log from `<base>/log_data/` and keeps only song
/// plays (`page == "NextSong"`, exact match). This is the only
/// filtering step; events are not deduplicated.
pub fn load_log_data(input_base: &Path) -> Result<Vec<EventRecord>> {
    let root = input_base.join("log_data");
    let files = json_files(&root)?;
    debug!("found {} log files under {}", files.len(), root.display());

    let mut events = Vec::new();
    let mut seen = 0usize;
    for path in &files {
        for value in parse_json_lines(path)? {
            seen += 1;
            if value.get("page").and_then(Value::as_str) != Some(SONG_PLAY_PAGE) {
                continue;
            }
            let event: EventRecord = serde_json::from_value(value)
                .with_context(|| format!("invalid log record in {}", path.display()))?;
            events.push(event);
        }
    }

    info!("loaded {} events, kept {} song plays", seen, events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const SONG_A: &str = r#"{"song_id": "S1", "title": "X", "artist_id": "A1", "artist_name": "Y", "artist_location": "NY", "artist_latitude": 40.7, "artist_longitude": -74.0, "duration": 180.5, "year": 2000}"#;

    fn event_line(page: &str) -> String {
        format!(
            r#"{{"ts": 1541440192796, "page": "{}", "userId": "10", "firstName": "Sylvie", "lastName": "Cruz", "gender": "F", "level": "free", "sessionId": 345, "location": "SF", "userAgent": "UA", "song": "X", "artist": "Y"}}"#,
            page
        )
    }

    #[test]
    fn reads_nested_song_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "song_data/A/B/C/TRAA.json", SONG_A);
        write_file(dir.path(), "song_data/A/B/D/TRAB.json", SONG_A);

        let records = load_song_data(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].song_id, "S1");
    }

    #[test]
    fn malformed_catalog_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "song_data/A/bad.json", "{not json");
        assert!(load_song_data(dir.path()).is_err());
    }

    #[test]
    fn filters_to_song_plays_only() {
        let dir = tempfile::tempdir().unwrap();
        let lines = [
            event_line("NextSong"),
            // non-play pages carry a sparser schema; they must be
            // skipped before typed decoding is attempted
            r#"{"ts": 1541440193000, "page": "Home", "userId": "10", "firstName": null, "lastName": null, "gender": null, "level": "free", "sessionId": 345, "location": "SF", "userAgent": "UA", "song": null, "artist": null}"#.to_string(),
            event_line("NextSong"),
        ]
        .join("\n");
        write_file(dir.path(), "log_data/2018/11/events.json", &lines);

        let events = load_log_data(dir.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.page == SONG_PLAY_PAGE));
    }

    #[test]
    fn page_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "log_data/events.json",
            &event_line("nextsong"),
        );
        let events = load_log_data(dir.path()).unwrap();
        assert!(events.is_empty());
    }
}
