pub mod book;
pub mod config_check;
pub mod context;
pub mod track;

use crate::config::Config;
use crate::tracker::NarrativeTracker;

/// Open (or create) the tracker for `title` under the configured data dir.
pub(crate) fn open_tracker(config: &Config, title: &str) -> NarrativeTracker {
    NarrativeTracker::new(title, &config.memory).with_extraction(config.extraction.clone())
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
