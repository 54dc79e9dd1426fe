//! Write-through, file-backed memory of a novel's narrative state.
//!
//! A [`NarrativeTracker`] owns one book's state file. Every mutation saves
//! the whole state immediately; save failures are logged and the in-memory
//! state stays authoritative for the rest of the process.

pub mod context;
pub mod extract;
pub mod model;
pub mod tracking;
pub mod update;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheStats;
use crate::config::{ExtractionConfig, MemoryConfig};
use crate::series::SeriesContextSource;
use crate::store::{self, PersistError};
use crate::util::{memory_file_path, now_rfc3339};

pub use context::{ChapterContext, ChapterNote, Latest, NarrativeContext};
pub use model::{
    BookMetadata, BookStructure, ChapterNumber, ChapterSummary, CharacterRecord, PlotPoint,
    SettingRecord,
};
pub use tracking::NarrativeTracking;
pub use update::{ChapterUpdate, CharacterUpdate, PlotThreadSnapshot, RelationshipSnapshot};

/// Everything persisted for one book.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookState {
    pub metadata: BookMetadata,
    pub structure: BookStructure,
    pub characters: Vec<CharacterRecord>,
    pub settings: Vec<SettingRecord>,
    pub plot_points: Vec<PlotPoint>,
    pub chapter_summaries: Vec<ChapterSummary>,
    pub narrative_tracking: NarrativeTracking,
}

impl BookState {
    fn fresh(limits: &MemoryConfig) -> Self {
        Self {
            narrative_tracking: NarrativeTracking::new(limits),
            ..Self::default()
        }
    }
}

struct SeriesLink {
    source: Arc<dyn SeriesContextSource>,
    book_number: u32,
}

pub struct NarrativeTracker {
    path: PathBuf,
    limits: MemoryConfig,
    extraction: ExtractionConfig,
    state: BookState,
    series: Option<SeriesLink>,
}

impl fmt::Debug for NarrativeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeTracker")
            .field("path", &self.path)
            .field("title", &self.state.metadata.title)
            .field("series_book", &self.series.as_ref().map(|s| s.book_number))
            .finish()
    }
}

impl NarrativeTracker {
    /// Tracker for `title`, stored as `<sanitized title>_memory.json` in the
    /// configured data directory.
    pub fn new(title: &str, limits: &MemoryConfig) -> Self {
        let path = memory_file_path(&limits.data_dir, title);
        let mut tracker = Self::open(path, limits);
        if tracker.state.metadata.title.is_empty() {
            tracker.state.metadata.title = title.trim().to_string();
            tracker.save_or_log();
        }
        tracker
    }

    /// Tracker backed by an explicit file. A missing file starts fresh; an
    /// unreadable one is moved aside as `<file>.corrupt` first. Either way a
    /// fresh file is written immediately.
    pub fn open(path: impl Into<PathBuf>, limits: &MemoryConfig) -> Self {
        let path = path.into();
        let (state, loaded) = match store::load_json::<BookState>(&path) {
            Ok(mut state) => {
                state.narrative_tracking.apply_limits(limits);
                debug!("Loaded narrative memory from {}", path.display());
                (state, true)
            }
            Err(e) if e.is_not_found() => {
                info!("Creating narrative memory at {}", path.display());
                (BookState::fresh(limits), false)
            }
            Err(e) => {
                warn!("Narrative memory {} is unreadable: {}", path.display(), e);
                if let Some(backup) = store::quarantine(&path) {
                    warn!("Moved unreadable memory to {}", backup.display());
                }
                (BookState::fresh(limits), false)
            }
        };

        let mut tracker = Self {
            path,
            limits: limits.clone(),
            extraction: ExtractionConfig::default(),
            state,
            series: None,
        };
        if !loaded {
            tracker.save_or_log();
        }
        tracker
    }

    /// Attach the series this book belongs to.
    pub fn with_series(mut self, source: Arc<dyn SeriesContextSource>, book_number: u32) -> Self {
        self.series = Some(SeriesLink {
            source,
            book_number,
        });
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &BookState {
        &self.state
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.state.metadata
    }

    pub fn structure(&self) -> &BookStructure {
        &self.state.structure
    }

    pub fn characters(&self) -> &[CharacterRecord] {
        &self.state.characters
    }

    pub fn settings(&self) -> &[SettingRecord] {
        &self.state.settings
    }

    pub fn plot_points(&self) -> &[PlotPoint] {
        &self.state.plot_points
    }

    pub fn chapter_summaries(&self) -> &[ChapterSummary] {
        &self.state.chapter_summaries
    }

    pub fn tracking(&self) -> &NarrativeTracking {
        &self.state.narrative_tracking
    }

    /// Write the full state to disk.
    pub fn save(&self) -> Result<(), PersistError> {
        store::save_json(&self.path, &self.state)
    }

    fn save_or_log(&mut self) {
        self.state.metadata.last_updated = now_rfc3339();
        if let Err(e) = self.save() {
            warn!("Failed to save narrative memory to {}: {}", self.path.display(), e);
        }
    }

    pub fn set_metadata_field(&mut self, key: &str, value: impl Into<String>) {
        self.state.metadata.set_field(key, value);
        self.save_or_log();
    }

    pub fn set_outline(&mut self, outline: Vec<String>) {
        self.state.structure.outline = outline;
        self.save_or_log();
    }

    pub fn set_target_word_count(&mut self, words: u64) {
        self.state.structure.target_word_count = words;
        self.save_or_log();
    }

    pub fn set_chapter_count(&mut self, chapters: u32) {
        self.state.structure.chapter_count = chapters;
        self.save_or_log();
    }

    /// Add a character, replacing an existing one with the same name
    /// (case-insensitive).
    pub fn add_character(&mut self, character: CharacterRecord) {
        let key = character.name.trim().to_lowercase();
        let characters = &mut self.state.characters;
        match characters
            .iter()
            .position(|c| c.name.trim().to_lowercase() == key)
        {
            Some(index) => characters[index] = character,
            None => characters.push(character),
        }
        self.save_or_log();
    }

    pub fn add_setting(&mut self, setting: SettingRecord) {
        let key = setting.name.trim().to_lowercase();
        let settings = &mut self.state.settings;
        match settings
            .iter()
            .position(|s| s.name.trim().to_lowercase() == key)
        {
            Some(index) => settings[index] = setting,
            None => settings.push(setting),
        }
        self.save_or_log();
    }

    pub fn add_plot_point(&mut self, plot_point: PlotPoint) {
        self.state.plot_points.push(plot_point);
        self.state.plot_points.sort_by_key(|p| p.chapter);
        self.save_or_log();
    }

    /// Record the summary of a finished chapter. Re-adding a chapter
    /// replaces its summary; the running word count never decreases.
    pub fn add_chapter_summary(
        &mut self,
        chapter: ChapterNumber,
        summary: impl Into<String>,
        word_count: u64,
    ) {
        let summary = ChapterSummary {
            chapter,
            summary: summary.into(),
            word_count,
        };
        let structure = &mut self.state.structure;
        let summaries = &mut self.state.chapter_summaries;
        match summaries.iter().position(|s| s.chapter == chapter) {
            Some(index) => {
                summaries[index] = summary;
                let total: u64 = summaries.iter().map(|s| s.word_count).sum();
                structure.current_word_count = structure.current_word_count.max(total);
            }
            None => {
                structure.current_word_count += word_count;
                summaries.push(summary);
                summaries.sort_by_key(|s| s.chapter);
            }
        }
        self.save_or_log();
    }

    /// Merge what `chapter` changed into the tracking sub-maps and save.
    pub fn update_narrative_tracking(&mut self, chapter: ChapterNumber, update: &ChapterUpdate) {
        if update.is_empty() {
            debug!("Chapter {} update carries nothing to track", chapter);
        }
        self.state
            .narrative_tracking
            .apply(chapter, update, self.limits.max_items_per_chapter);
        self.save_or_log();
    }

    pub fn clear_tracking(&mut self) {
        self.state.narrative_tracking.clear();
        info!("Cleared narrative tracking for {}", self.state.metadata.title);
        self.save_or_log();
    }

    /// Tracked state as of `chapter`. Entries that end up in the context
    /// count as used, and the new recency order is saved.
    pub fn narrative_context(&mut self, chapter: ChapterNumber) -> NarrativeContext {
        let context = context::narrative_context(
            &mut self.state.narrative_tracking,
            &self.state.characters,
            chapter,
        );
        if let Err(e) = self.save() {
            warn!("Failed to save narrative memory to {}: {}", self.path.display(), e);
        }
        context
    }

    /// Context for writing `chapter`: earlier summaries, the plot plan,
    /// tracked narrative state and, for series books, series context.
    pub fn context_for_chapter(&mut self, chapter: ChapterNumber) -> ChapterContext {
        let series = self.series.as_ref().map(|link| {
            context::without_book_cast(
                link.source.context_for_book(link.book_number),
                &self.state.characters,
            )
        });

        ChapterContext {
            chapter,
            previous_summaries: self
                .state
                .chapter_summaries
                .iter()
                .filter(|s| s.chapter < chapter)
                .cloned()
                .collect(),
            plot_points: self.state.plot_points.clone(),
            narrative: self.narrative_context(chapter),
            series,
        }
    }

    pub fn cache_stats(&self) -> BTreeMap<&'static str, CacheStats> {
        self.state.narrative_tracking.stats()
    }

    /// Declared characters followed by any others seen in tracking.
    pub fn known_character_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let declared = self.state.characters.iter().map(|c| c.name.clone());
        let tracked = self
            .state
            .narrative_tracking
            .character_arcs
            .iter()
            .chain(self.state.narrative_tracking.character_locations.iter())
            .map(|(name, _)| name.clone());
        declared
            .chain(tracked)
            .filter(|name| seen.insert(name.to_lowercase()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn limits(dir: &TempDir) -> MemoryConfig {
        MemoryConfig {
            data_dir: dir.path().to_path_buf(),
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_new_creates_file_named_after_title() {
        let dir = TempDir::new().unwrap();
        let tracker = NarrativeTracker::new("The Glass Orchard", &limits(&dir));

        assert_eq!(
            tracker.path(),
            dir.path().join("the_glass_orchard_memory.json")
        );
        assert!(tracker.path().exists());
        assert_eq!(tracker.metadata().title, "The Glass Orchard");
    }

    #[test]
    fn test_summary_word_count_never_decreases() {
        let dir = TempDir::new().unwrap();
        let mut tracker = NarrativeTracker::new("Counts", &limits(&dir));

        tracker.add_chapter_summary(1, "Arrival", 3000);
        tracker.add_chapter_summary(2, "Storm", 2500);
        assert_eq!(tracker.structure().current_word_count, 5500);

        tracker.add_chapter_summary(2, "Storm, revised", 2000);
        assert_eq!(tracker.structure().current_word_count, 5500);
        assert_eq!(tracker.chapter_summaries()[1].summary, "Storm, revised");

        tracker.add_chapter_summary(2, "Storm, expanded", 2800);
        assert_eq!(tracker.structure().current_word_count, 5800);
        assert_eq!(tracker.chapter_summaries().len(), 2);

        tracker.add_chapter_summary(2, "Storm, trimmed", 2600);
        assert_eq!(tracker.structure().current_word_count, 5800);
    }

    #[test]
    fn test_add_character_replaces_same_name() {
        let dir = TempDir::new().unwrap();
        let mut tracker = NarrativeTracker::new("Cast", &limits(&dir));

        tracker.add_character(CharacterRecord::new("Mara"));
        tracker.add_character(CharacterRecord::new("mara").with_role("pilot"));
        assert_eq!(tracker.characters().len(), 1);
        assert_eq!(tracker.characters()[0].role.as_deref(), Some("pilot"));
    }

    #[test]
    fn test_known_character_names_merges_tracked() {
        let dir = TempDir::new().unwrap();
        let mut tracker = NarrativeTracker::new("Names", &limits(&dir));
        tracker.add_character(CharacterRecord::new("Mara"));

        let mut update = ChapterUpdate::default();
        update.character_updates.insert(
            "Teodor".to_string(),
            CharacterUpdate {
                location: Some("quay".to_string()),
                ..CharacterUpdate::default()
            },
        );
        update.character_updates.insert(
            "MARA".to_string(),
            CharacterUpdate {
                development: Some("lies".to_string()),
                ..CharacterUpdate::default()
            },
        );
        tracker.update_narrative_tracking(1, &update);

        assert_eq!(tracker.known_character_names(), vec!["Mara", "Teodor"]);
    }

    #[test]
    fn test_clear_tracking_keeps_entity_lists() {
        let dir = TempDir::new().unwrap();
        let mut tracker = NarrativeTracker::new("Clear", &limits(&dir));
        tracker.add_character(CharacterRecord::new("Mara"));
        tracker.update_narrative_tracking(
            1,
            &ChapterUpdate {
                tone: Some("bleak".to_string()),
                ..ChapterUpdate::default()
            },
        );

        tracker.clear_tracking();

        assert!(tracker.tracking().tone.is_empty());
        assert_eq!(tracker.characters().len(), 1);
        let reopened = NarrativeTracker::open(tracker.path(), &limits(&dir));
        assert!(reopened.tracking().tone.is_empty());
    }

    #[test]
    fn test_context_reads_keep_entities_alive() {
        let dir = TempDir::new().unwrap();
        let small = MemoryConfig {
            entity_capacity: 2,
            cleanup_threshold: 1.0,
            ..limits(&dir)
        };
        let mut tracker = NarrativeTracker::new("Recency", &small);
        for (chapter, element) in [(1, "harbor"), (2, "bells")] {
            let mut update = ChapterUpdate::default();
            update
                .world_building
                .insert(element.to_string(), "detail".to_string());
            tracker.update_narrative_tracking(chapter, &update);
        }

        let context = tracker.context_for_chapter(3);
        assert!(context.narrative.world_building.contains_key("harbor"));

        let mut update = ChapterUpdate::default();
        update
            .world_building
            .insert("ferry".to_string(), "detail".to_string());
        tracker.update_narrative_tracking(3, &update);

        let world = &tracker.tracking().world_building;
        assert!(world.contains("harbor"));
        assert!(world.contains("ferry"));
        assert!(tracker.cache_stats()["world_building"].hits > 0);

        let reopened = NarrativeTracker::open(tracker.path(), &small);
        assert!(reopened.tracking().world_building.contains("harbor"));
    }

    #[test]
    fn test_save_failure_is_logged_not_raised() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();

        let mut tracker = NarrativeTracker::open(blocker.join("book_memory.json"), &limits(&dir));
        tracker.set_chapter_count(12);

        assert_eq!(tracker.structure().chapter_count, 12);
        assert!(tracker.save().is_err());
    }
}
