use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::data_loader;
use crate::dimensions;
use crate::fact;
use crate::plan::Plan;
use crate::resolver::ExactMatchResolver;
use crate::store::ParquetStore;

/// Reads a plan file and runs a full rebuild from it.
pub fn execute_plan(plan_file_path: &str) -> Result<()> {
    let content = std::fs::read_to_string(plan_file_path)
        .with_context(|| format!("reading plan file {}", plan_file_path))?;
    let plan: Plan = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing plan file {}", plan_file_path))?;
    run(&plan)
}

/// Full rebuild: both stages run every time, catalog first so the log
/// stage can join against freshly persisted tables.
pub fn run(plan: &Plan) -> Result<()> {
    let input_base = Path::new(&plan.input.base);
    let store = ParquetStore::new(&plan.output.base);

    process_song_data(input_base, &store)?;
    process_log_data(input_base, &store)?;

    info!("rebuild complete under {}", plan.output.base);
    Ok(())
}

fn process_song_data(input_base: &Path, store: &ParquetStore) -> Result<()> {
    info!("processing song data");
    let catalog = data_loader::load_song_data(input_base)?;

    let songs = dimensions::build_songs(&catalog);
    store.write_songs(&songs)?;

    let artists = dimensions::build_artists(&catalog);
    store.write_artists(&artists)?;
    Ok(())
}

fn process_log_data(input_base: &Path, store: &ParquetStore) -> Result<()> {
    info!("processing log data");
    let events = data_loader::load_log_data(input_base)?;

    let users = dimensions::build_users(&events);
    store.write_users(&users)?;

    let time = dimensions::build_time(&events)?;
    store.write_time(&time)?;

    // The fact table joins against what was actually persisted, read
    // back from disk, never against the in-memory intermediates.
    let songs = store.read_songs()?;
    let artists = store.read_artists()?;
    let time = store.read_time()?;

    let resolver = ExactMatchResolver::new(&songs, &artists);
    let facts = fact::build_songplays(&events, &resolver, &time);
    store.write_songplays(&facts)?;
    Ok(())
}
