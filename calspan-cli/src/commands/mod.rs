pub mod add;
pub mod busy;
pub mod count;
pub mod days;
pub mod remove;
pub mod remove_calendar;

use anyhow::{Context, Result};
use calspan_core::config::CalSpanConfig;
use calspan_core::db::Db;
use calspan_core::{BusytimeStore, EventStore};
use tracing::debug;

/// Open the data directory and build the event store on top of it.
pub fn open_store(config: &CalSpanConfig) -> Result<EventStore> {
    let data_path = config.data_path();
    std::fs::create_dir_all(&data_path)
        .with_context(|| format!("Could not create data directory {}", data_path.display()))?;

    debug!(path = %data_path.display(), "opening data directory");
    let db = Db::open(&data_path)?;
    Ok(EventStore::new(BusytimeStore::new(db, config.sync_window())))
}
