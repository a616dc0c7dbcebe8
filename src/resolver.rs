use std::collections::HashMap;
use tracing::warn;

use crate::model::{ArtistDim, SongDim};

/// Resolves the free-text song/artist references on log events back to
/// catalog ids. The log carries no foreign keys, only names, so this
/// reconstruction is inherently fragile; keeping it behind a trait lets
/// exact matching be swapped for normalized or fuzzy matching without
/// touching the fact builder.
pub trait ReferenceResolver {
    /// Maps an artist name to an artist_id.
    fn resolve_artist(&self, artist_name: &str) -> Option<&str>;

    /// Maps a song title to a song_id, scoped to an already-resolved
    /// artist: a song can only match through its artist.
    fn resolve_song(&self, title: &str, artist_id: &str) -> Option<&str>;
}

/// Exact, case-sensitive matching with no normalization — the original
/// join semantics. Duplicate artist names pointing at different ids are
/// a join ambiguity; the first id seen wins and the collision is logged
/// rather than multiplying rows.
pub struct ExactMatchResolver {
    artist_id_by_name: HashMap<String, String>,
    song_id_by_title_artist: HashMap<(String, String), String>,
}

impl ExactMatchResolver {
    pub fn new(songs: &[SongDim], artists: &[ArtistDim]) -> Self {
        let mut artist_id_by_name: HashMap<String, String> = HashMap::new();
        for artist in artists {
            if let Some(existing) = artist_id_by_name.get(&artist.name) {
                if existing != &artist.artist_id {
                    warn!(
                        "ambiguous artist name {:?}: keeping {}, ignoring {}",
                        artist.name, existing, artist.artist_id
                    );
                }
                continue;
            }
            artist_id_by_name.insert(artist.name.clone(), artist.artist_id.clone());
        }

        let mut song_id_by_title_artist: HashMap<(String, String), String> = HashMap::new();
        for song in songs {
            let key = (song.title.clone(), song.artist_id.clone());
            if let Some(existing) = song_id_by_title_artist.get(&key) {
                if existing != &song.song_id {
                    warn!(
                        "ambiguous song title {:?} for artist {}: keeping {}, ignoring {}",
                        song.title, song.artist_id, existing, song.song_id
                    );
                }
                continue;
            }
            song_id_by_title_artist.insert(key, song.song_id.clone());
        }

        ExactMatchResolver {
            artist_id_by_name,
            song_id_by_title_artist,
        }
    }
}

impl ReferenceResolver for ExactMatchResolver {
    fn resolve_artist(&self, artist_name: &str) -> Option<&str> {
        self.artist_id_by_name.get(artist_name).map(String::as_str)
    }

    fn resolve_song(&self, title: &str, artist_id: &str) -> Option<&str> {
        self.song_id_by_title_artist
            .get(&(title.to_string(), artist_id.to_string()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(artist_id: &str, name: &str) -> ArtistDim {
        ArtistDim {
            artist_id: artist_id.to_string(),
            name: name.to_string(),
            location: None,
            latitude: None,
            longitude: None,
        }
    }

    fn song(song_id: &str, title: &str, artist_id: &str) -> SongDim {
        SongDim {
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist_id: artist_id.to_string(),
            year: 2000,
            duration: 180.5,
        }
    }

    #[test]
    fn resolves_exact_matches() {
        let resolver = ExactMatchResolver::new(&[song("S1", "X", "A1")], &[artist("A1", "Y")]);
        assert_eq!(resolver.resolve_artist("Y"), Some("A1"));
        assert_eq!(resolver.resolve_song("X", "A1"), Some("S1"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let resolver = ExactMatchResolver::new(&[], &[artist("A1", "Y")]);
        assert_eq!(resolver.resolve_artist("y"), None);
    }

    #[test]
    fn song_match_requires_the_right_artist() {
        let resolver = ExactMatchResolver::new(&[song("S1", "X", "A1")], &[artist("A1", "Y")]);
        assert_eq!(resolver.resolve_song("X", "A2"), None);
    }

    #[test]
    fn duplicate_artist_names_keep_first_id() {
        let resolver =
            ExactMatchResolver::new(&[], &[artist("A1", "Y"), artist("A2", "Y")]);
        assert_eq!(resolver.resolve_artist("Y"), Some("A1"));
    }

    #[test]
    fn unknown_references_resolve_to_none() {
        let resolver = ExactMatchResolver::new(&[], &[]);
        assert_eq!(resolver.resolve_artist("Unknown Band"), None);
    }
}
