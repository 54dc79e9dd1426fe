// Read-only commands: chapter context and cache statistics as JSON.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::{open_tracker, print_json};
use crate::config::Config;
use crate::series::SeriesManager;

pub fn context(
    config: &Config,
    title: &str,
    chapter: u32,
    series_file: Option<PathBuf>,
    book: Option<u32>,
) -> Result<()> {
    if chapter == 0 {
        bail!("Chapter numbers start at 1");
    }

    let mut tracker = open_tracker(config, title);
    if let Some(series_file) = series_file {
        if !series_file.exists() {
            bail!("Series file not found: {}", series_file.display());
        }
        let book = book
            .or(tracker.metadata().book_number)
            .unwrap_or(1);
        debug!("Using series {} as book {}", series_file.display(), book);
        tracker = tracker.with_series(Arc::new(SeriesManager::open(series_file)), book);
    }

    print_json(&tracker.context_for_chapter(chapter))
}

pub fn stats(config: &Config, title: &str) -> Result<()> {
    let tracker = open_tracker(config, title);
    print_json(&tracker.cache_stats())
}
