use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The `page` value that marks a listening event in the activity log.
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// Subscription level of a user. `Free < Paid` by variant order; the
/// users dimension reduces with `max` over this enum, never over the
/// string form ("f" > "p" lexically, which would invert the intent).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Free => "free",
            Level::Paid => "paid",
        }
    }
}

/// One entry of the song-metadata catalog, as found on disk.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub duration: f64,
    pub year: i32,
}

/// One song-play event from the activity log, after the `page` filter.
///
/// `song` and `artist` are free-text references into the catalog; they
/// carry no ids, which is why the fact builder has to resolve them by
/// name. They stay optional so an event with a missing reference still
/// flows through the outer-join path instead of failing the run.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub ts: i64,
    pub page: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: Level,
    pub session_id: i64,
    pub location: String,
    pub user_agent: String,
    pub song: Option<String>,
    pub artist: Option<String>,
}

//
// Output tables
//

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SongDim {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArtistDim {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserDim {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub level: Level,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TimeDim {
    pub ts: i64,
    pub start_datetime: NaiveDateTime,
    pub start_timestamp: f64,
    pub year: i32,
    pub month: u32,
    pub day_of_month: u32,
    pub hour: u32,
    pub week_of_year: u32,
}

/// One row of the songplays fact table. `song_id` and `artist_id` are
/// null when the textual reference could not be resolved; the row is
/// still emitted. `year`/`month` are the partition values, taken from
/// the matched time row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SongplayFact {
    pub songplay_id: i64,
    pub start_datetime: NaiveDateTime,
    pub user_id: String,
    pub level: Level,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: String,
    pub user_agent: String,
    pub year: i32,
    pub month: u32,
}
