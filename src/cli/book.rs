// Commands that record the book's plan: metadata, cast, places, plot, summaries.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use super::open_tracker;
use crate::config::Config;
use crate::tracker::{CharacterRecord, PlotPoint, SettingRecord};

pub fn init(
    config: &Config,
    title: &str,
    author: Option<String>,
    genre: Option<String>,
    chapters: Option<u32>,
    target_words: Option<u64>,
) -> Result<()> {
    let mut tracker = open_tracker(config, title);

    if let Some(author) = author {
        tracker.set_metadata_field("author", author);
    }
    if let Some(genre) = genre {
        tracker.set_metadata_field("genre", genre);
    }
    if let Some(chapters) = chapters {
        tracker.set_chapter_count(chapters);
    }
    if let Some(words) = target_words {
        tracker.set_target_word_count(words);
    }

    tracker
        .save()
        .with_context(|| format!("Failed to write {}", tracker.path().display()))?;
    info!("Initialized \"{}\" at {}", title, tracker.path().display());
    println!("{}", tracker.path().display());
    Ok(())
}

pub fn character(
    config: &Config,
    title: &str,
    name: &str,
    role: Option<String>,
    description: Option<String>,
    pov_order: Option<u32>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Character name must not be empty");
    }

    let mut record = CharacterRecord::new(name.trim());
    record.role = role;
    record.description = description;
    record.pov_order = pov_order;

    let mut tracker = open_tracker(config, title);
    tracker.add_character(record);
    info!("Recorded character {} ({} total)", name, tracker.characters().len());
    Ok(())
}

pub fn setting(
    config: &Config,
    title: &str,
    name: &str,
    description: Option<String>,
    significance: Option<String>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Setting name must not be empty");
    }

    let mut tracker = open_tracker(config, title);
    tracker.add_setting(SettingRecord {
        name: name.trim().to_string(),
        description,
        significance,
    });
    info!("Recorded setting {}", name);
    Ok(())
}

pub fn plot_point(
    config: &Config,
    title: &str,
    chapter: u32,
    description: &str,
    kind: Option<String>,
) -> Result<()> {
    let mut tracker = open_tracker(config, title);
    tracker.add_plot_point(PlotPoint {
        chapter,
        description: description.to_string(),
        kind,
    });
    info!("Recorded plot point for chapter {}", chapter);
    Ok(())
}

pub fn summary(
    config: &Config,
    title: &str,
    chapter: u32,
    summary_file: &Path,
    words: Option<u64>,
) -> Result<()> {
    let summary = fs::read_to_string(summary_file)
        .with_context(|| format!("Failed to read summary from {}", summary_file.display()))?;
    let summary = summary.trim();
    if summary.is_empty() {
        bail!("Summary file {} is empty", summary_file.display());
    }
    let word_count = words.unwrap_or_else(|| count_words(summary));

    let mut tracker = open_tracker(config, title);
    tracker.add_chapter_summary(chapter, summary, word_count);
    info!(
        "Recorded summary for chapter {} ({} words, {} total)",
        chapter,
        word_count,
        tracker.structure().current_word_count
    );
    Ok(())
}

fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
