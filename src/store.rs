use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, Float64Array, Int32Array, Int64Array, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::model::{ArtistDim, SongDim, SongplayFact, TimeDim, UserDim};
use crate::timeparts;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("unexpected column layout in {path}")]
    Schema { path: PathBuf },
    #[error("invalid datetime text {text:?} in {path}")]
    Datetime { path: PathBuf, text: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Parquet-backed table store under a single base directory. One
/// subdirectory per table, hive-style partition directories inside it,
/// full overwrite on every write. Partition column values are also kept
/// in the row data, so read-back never parses paths.
pub struct ParquetStore {
    base: PathBuf,
}

impl ParquetStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        ParquetStore { base: base.into() }
    }

    fn table_root(&self, table: &str) -> PathBuf {
        self.base.join(table)
    }

    /// Overwrite semantics: drop whatever a previous run left behind,
    /// then recreate the table directory.
    fn reset_table(&self, table: &str) -> Result<PathBuf> {
        let root = self.table_root(table);
        if root.exists() {
            fs::remove_dir_all(&root).map_err(io_err(&root))?;
        }
        fs::create_dir_all(&root).map_err(io_err(&root))?;
        Ok(root)
    }

    fn write_batch(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        // Write to a temp file first so a failed run never leaves a
        // half-written file under the final name.
        let temp_path = path.with_extension("parquet.tmp");
        let file = File::create(&temp_path).map_err(io_err(&temp_path))?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(Default::default()))
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        fs::rename(&temp_path, path).map_err(io_err(path))?;
        debug!("wrote {} rows to {}", batch.num_rows(), path.display());
        Ok(())
    }

    fn parquet_files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let root = self.table_root(table);
        let mut files = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| StoreError::Io {
                path: root.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(OsStr::to_str) == Some("parquet")
            {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
        let file = File::open(path).map_err(io_err(path))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    //
    // songs — partitioned by (year, artist_id)
    //

    pub fn write_songs(&self, rows: &[SongDim]) -> Result<()> {
        let root = self.reset_table("songs")?;

        let mut partitions: BTreeMap<(i32, &str), Vec<&SongDim>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry((row.year, row.artist_id.as_str()))
                .or_default()
                .push(row);
        }

        for ((year, artist_id), rows) in partitions {
            let path = root
                .join(format!("year={}", year))
                .join(format!("artist_id={}", artist_id))
                .join("data.parquet");
            self.write_batch(&path, &songs_to_batch(&rows)?)?;
        }

        info!("songs table written ({} rows)", rows.len());
        Ok(())
    }

    pub fn read_songs(&self) -> Result<Vec<SongDim>> {
        let mut songs = Vec::new();
        for path in self.parquet_files("songs")? {
            for batch in Self::read_batches(&path)? {
                songs.extend(batch_to_songs(&batch, &path)?);
            }
        }
        Ok(songs)
    }

    //
    // artists — unpartitioned
    //

    pub fn write_artists(&self, rows: &[ArtistDim]) -> Result<()> {
        let root = self.reset_table("artists")?;
        self.write_batch(&root.join("data.parquet"), &artists_to_batch(rows)?)?;
        info!("artists table written ({} rows)", rows.len());
        Ok(())
    }

    pub fn read_artists(&self) -> Result<Vec<ArtistDim>> {
        let mut artists = Vec::new();
        for path in self.parquet_files("artists")? {
            for batch in Self::read_batches(&path)? {
                artists.extend(batch_to_artists(&batch, &path)?);
            }
        }
        Ok(artists)
    }

    //
    // users — unpartitioned
    //

    pub fn write_users(&self, rows: &[UserDim]) -> Result<()> {
        let root = self.reset_table("users")?;
        self.write_batch(&root.join("data.parquet"), &users_to_batch(rows)?)?;
        info!("users table written ({} rows)", rows.len());
        Ok(())
    }

    //
    // time — partitioned by (year, month)
    //

    pub fn write_time(&self, rows: &[TimeDim]) -> Result<()> {
        let root = self.reset_table("time")?;

        let mut partitions: BTreeMap<(i32, u32), Vec<&TimeDim>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry((row.year, row.month))
                .or_default()
                .push(row);
        }

        for ((year, month), rows) in partitions {
            let path = root
                .join(format!("year={}", year))
                .join(format!("month={}", month))
                .join("data.parquet");
            self.write_batch(&path, &time_to_batch(&rows)?)?;
        }

        info!("time table written ({} rows)", rows.len());
        Ok(())
    }

    pub fn read_time(&self) -> Result<Vec<TimeDim>> {
        let mut time = Vec::new();
        for path in self.parquet_files("time")? {
            for batch in Self::read_batches(&path)? {
                time.extend(batch_to_time(&batch, &path)?);
            }
        }
        Ok(time)
    }

    //
    // songplays — partitioned by (year, month)
    //

    pub fn write_songplays(&self, rows: &[SongplayFact]) -> Result<()> {
        let root = self.reset_table("songplays")?;

        let mut partitions: BTreeMap<(i32, u32), Vec<&SongplayFact>> = BTreeMap::new();
        for row in rows {
            partitions
                .entry((row.year, row.month))
                .or_default()
                .push(row);
        }

        for ((year, month), rows) in partitions {
            let path = root
                .join(format!("year={}", year))
                .join(format!("month={}", month))
                .join("data.parquet");
            self.write_batch(&path, &songplays_to_batch(&rows)?)?;
        }

        info!("songplays table written ({} rows)", rows.len());
        Ok(())
    }

    pub fn read_songplays(&self) -> Result<Vec<SongplayFact>> {
        let mut facts = Vec::new();
        for path in self.parquet_files("songplays")? {
            for batch in Self::read_batches(&path)? {
                facts.extend(batch_to_songplays(&batch, &path)?);
            }
        }
        Ok(facts)
    }
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    index: usize,
    path: &Path,
) -> Result<&'a T> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::Schema {
            path: path.to_path_buf(),
        })
}

fn parse_datetime(text: &str, path: &Path) -> Result<chrono::NaiveDateTime> {
    timeparts::parse_isoformat(text).map_err(|_| StoreError::Datetime {
        path: path.to_path_buf(),
        text: text.to_string(),
    })
}

//
// Schemas and row <-> batch conversion, one trio per table
//

fn songs_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("duration", DataType::Float64, false),
    ]))
}

fn songs_to_batch(rows: &[&SongDim]) -> Result<RecordBatch> {
    let song_ids = StringArray::from_iter_values(rows.iter().map(|r| r.song_id.as_str()));
    let titles = StringArray::from_iter_values(rows.iter().map(|r| r.title.as_str()));
    let artist_ids = StringArray::from_iter_values(rows.iter().map(|r| r.artist_id.as_str()));
    let years = Int32Array::from_iter_values(rows.iter().map(|r| r.year));
    let durations = Float64Array::from_iter_values(rows.iter().map(|r| r.duration));

    RecordBatch::try_new(
        songs_schema(),
        vec![
            Arc::new(song_ids),
            Arc::new(titles),
            Arc::new(artist_ids),
            Arc::new(years),
            Arc::new(durations),
        ],
    )
    .map_err(Into::into)
}

fn batch_to_songs(batch: &RecordBatch, path: &Path) -> Result<Vec<SongDim>> {
    let song_id = column::<StringArray>(batch, 0, path)?;
    let title = column::<StringArray>(batch, 1, path)?;
    let artist_id = column::<StringArray>(batch, 2, path)?;
    let year = column::<Int32Array>(batch, 3, path)?;
    let duration = column::<Float64Array>(batch, 4, path)?;

    let mut songs = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        songs.push(SongDim {
            song_id: song_id.value(i).to_string(),
            title: title.value(i).to_string(),
            artist_id: artist_id.value(i).to_string(),
            year: year.value(i),
            duration: duration.value(i),
        });
    }
    Ok(songs)
}

fn artists_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ]))
}

fn artists_to_batch(rows: &[ArtistDim]) -> Result<RecordBatch> {
    let artist_ids = StringArray::from_iter_values(rows.iter().map(|r| r.artist_id.as_str()));
    let names = StringArray::from_iter_values(rows.iter().map(|r| r.name.as_str()));
    let locations: StringArray = rows.iter().map(|r| r.location.as_deref()).collect();
    let latitudes: Float64Array = rows.iter().map(|r| r.latitude).collect();
    let longitudes: Float64Array = rows.iter().map(|r| r.longitude).collect();

    RecordBatch::try_new(
        artists_schema(),
        vec![
            Arc::new(artist_ids),
            Arc::new(names),
            Arc::new(locations),
            Arc::new(latitudes),
            Arc::new(longitudes),
        ],
    )
    .map_err(Into::into)
}

fn batch_to_artists(batch: &RecordBatch, path: &Path) -> Result<Vec<ArtistDim>> {
    let artist_id = column::<StringArray>(batch, 0, path)?;
    let name = column::<StringArray>(batch, 1, path)?;
    let location = column::<StringArray>(batch, 2, path)?;
    let latitude = column::<Float64Array>(batch, 3, path)?;
    let longitude = column::<Float64Array>(batch, 4, path)?;

    let mut artists = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        artists.push(ArtistDim {
            artist_id: artist_id.value(i).to_string(),
            name: name.value(i).to_string(),
            location: location.is_valid(i).then(|| location.value(i).to_string()),
            latitude: latitude.is_valid(i).then(|| latitude.value(i)),
            longitude: longitude.is_valid(i).then(|| longitude.value(i)),
        });
    }
    Ok(artists)
}

fn users_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, false),
        Field::new("first_name", DataType::Utf8, false),
        Field::new("last_name", DataType::Utf8, false),
        Field::new("gender", DataType::Utf8, false),
        Field::new("level", DataType::Utf8, false),
    ]))
}

fn users_to_batch(rows: &[UserDim]) -> Result<RecordBatch> {
    let user_ids = StringArray::from_iter_values(rows.iter().map(|r| r.user_id.as_str()));
    let first_names = StringArray::from_iter_values(rows.iter().map(|r| r.first_name.as_str()));
    let last_names = StringArray::from_iter_values(rows.iter().map(|r| r.last_name.as_str()));
    let genders = StringArray::from_iter_values(rows.iter().map(|r| r.gender.as_str()));
    let levels = StringArray::from_iter_values(rows.iter().map(|r| r.level.as_str()));

    RecordBatch::try_new(
        users_schema(),
        vec![
            Arc::new(user_ids),
            Arc::new(first_names),
            Arc::new(last_names),
            Arc::new(genders),
            Arc::new(levels),
        ],
    )
    .map_err(Into::into)
}

fn time_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Int64, false),
        Field::new("start_datetime", DataType::Utf8, false),
        Field::new("start_timestamp", DataType::Float64, false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::UInt32, false),
        Field::new("day_of_month", DataType::UInt32, false),
        Field::new("hour", DataType::UInt32, false),
        Field::new("week_of_year", DataType::UInt32, false),
    ]))
}

fn time_to_batch(rows: &[&TimeDim]) -> Result<RecordBatch> {
    let ts = Int64Array::from_iter_values(rows.iter().map(|r| r.ts));
    let start_datetimes = StringArray::from_iter_values(
        rows.iter().map(|r| timeparts::isoformat(&r.start_datetime)),
    );
    let start_timestamps = Float64Array::from_iter_values(rows.iter().map(|r| r.start_timestamp));
    let years = Int32Array::from_iter_values(rows.iter().map(|r| r.year));
    let months = UInt32Array::from_iter_values(rows.iter().map(|r| r.month));
    let days = UInt32Array::from_iter_values(rows.iter().map(|r| r.day_of_month));
    let hours = UInt32Array::from_iter_values(rows.iter().map(|r| r.hour));
    let weeks = UInt32Array::from_iter_values(rows.iter().map(|r| r.week_of_year));

    RecordBatch::try_new(
        time_schema(),
        vec![
            Arc::new(ts),
            Arc::new(start_datetimes),
            Arc::new(start_timestamps),
            Arc::new(years),
            Arc::new(months),
            Arc::new(days),
            Arc::new(hours),
            Arc::new(weeks),
        ],
    )
    .map_err(Into::into)
}

fn batch_to_time(batch: &RecordBatch, path: &Path) -> Result<Vec<TimeDim>> {
    let ts = column::<Int64Array>(batch, 0, path)?;
    let start_datetime = column::<StringArray>(batch, 1, path)?;
    let start_timestamp = column::<Float64Array>(batch, 2, path)?;
    let year = column::<Int32Array>(batch, 3, path)?;
    let month = column::<UInt32Array>(batch, 4, path)?;
    let day_of_month = column::<UInt32Array>(batch, 5, path)?;
    let hour = column::<UInt32Array>(batch, 6, path)?;
    let week_of_year = column::<UInt32Array>(batch, 7, path)?;

    let mut time = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        time.push(TimeDim {
            ts: ts.value(i),
            start_datetime: parse_datetime(start_datetime.value(i), path)?,
            start_timestamp: start_timestamp.value(i),
            year: year.value(i),
            month: month.value(i),
            day_of_month: day_of_month.value(i),
            hour: hour.value(i),
            week_of_year: week_of_year.value(i),
        });
    }
    Ok(time)
}

fn songplays_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_datetime", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("level", DataType::Utf8, false),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, false),
        Field::new("location", DataType::Utf8, false),
        Field::new("user_agent", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::UInt32, false),
    ]))
}

fn songplays_to_batch(rows: &[&SongplayFact]) -> Result<RecordBatch> {
    let songplay_ids = Int64Array::from_iter_values(rows.iter().map(|r| r.songplay_id));
    let start_datetimes = StringArray::from_iter_values(
        rows.iter().map(|r| timeparts::isoformat(&r.start_datetime)),
    );
    let user_ids = StringArray::from_iter_values(rows.iter().map(|r| r.user_id.as_str()));
    let levels = StringArray::from_iter_values(rows.iter().map(|r| r.level.as_str()));
    let song_ids: StringArray = rows.iter().map(|r| r.song_id.as_deref()).collect();
    let artist_ids: StringArray = rows.iter().map(|r| r.artist_id.as_deref()).collect();
    let session_ids = Int64Array::from_iter_values(rows.iter().map(|r| r.session_id));
    let locations = StringArray::from_iter_values(rows.iter().map(|r| r.location.as_str()));
    let user_agents = StringArray::from_iter_values(rows.iter().map(|r| r.user_agent.as_str()));
    let years = Int32Array::from_iter_values(rows.iter().map(|r| r.year));
    let months = UInt32Array::from_iter_values(rows.iter().map(|r| r.month));

    RecordBatch::try_new(
        songplays_schema(),
        vec![
            Arc::new(songplay_ids),
            Arc::new(start_datetimes),
            Arc::new(user_ids),
            Arc::new(levels),
            Arc::new(song_ids),
            Arc::new(artist_ids),
            Arc::new(session_ids),
            Arc::new(locations),
            Arc::new(user_agents),
            Arc::new(years),
            Arc::new(months),
        ],
    )
    .map_err(Into::into)
}

fn batch_to_songplays(batch: &RecordBatch, path: &Path) -> Result<Vec<SongplayFact>> {
    let songplay_id = column::<Int64Array>(batch, 0, path)?;
    let start_datetime = column::<StringArray>(batch, 1, path)?;
    let user_id = column::<StringArray>(batch, 2, path)?;
    let level = column::<StringArray>(batch, 3, path)?;
    let song_id = column::<StringArray>(batch, 4, path)?;
    let artist_id = column::<StringArray>(batch, 5, path)?;
    let session_id = column::<Int64Array>(batch, 6, path)?;
    let location = column::<StringArray>(batch, 7, path)?;
    let user_agent = column::<StringArray>(batch, 8, path)?;
    let year = column::<Int32Array>(batch, 9, path)?;
    let month = column::<UInt32Array>(batch, 10, path)?;

    let mut facts = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let level = match level.value(i) {
            "paid" => crate::model::Level::Paid,
            _ => crate::model::Level::Free,
        };
        facts.push(SongplayFact {
            songplay_id: songplay_id.value(i),
            start_datetime: parse_datetime(start_datetime.value(i), path)?,
            user_id: user_id.value(i).to_string(),
            level,
            song_id: song_id.is_valid(i).then(|| song_id.value(i).to_string()),
            artist_id: artist_id.is_valid(i).then(|| artist_id.value(i).to_string()),
            session_id: session_id.value(i),
            location: location.value(i).to_string(),
            user_agent: user_agent.value(i).to_string(),
            year: year.value(i),
            month: month.value(i),
        });
    }
    Ok(facts)
}
