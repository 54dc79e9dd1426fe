//! The twenty bounded sub-maps that hold per-chapter narrative state.
//!
//! Entity-keyed tracks map an entity (character, relationship, thread,
//! object...) to its history by chapter. Chapter-keyed tracks map a chapter
//! number to a value or to a bounded list of notes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model::ChapterNumber;
use super::update::{non_blank, present, ChapterUpdate, PlotThreadSnapshot, RelationshipSnapshot};
use crate::cache::{BoundedCache, BoundedList, CacheStats};
use crate::config::MemoryConfig;

/// entity -> chapter -> snapshot
pub type EntityTrack<S> = BoundedCache<String, BTreeMap<ChapterNumber, S>>;

/// chapter -> value
pub type ChapterTrack<S> = BoundedCache<ChapterNumber, S>;

pub type NoteTrack = ChapterTrack<BoundedList<String>>;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeTracking {
    pub character_arcs: EntityTrack<String>,
    pub character_emotions: EntityTrack<String>,
    pub character_knowledge: EntityTrack<Vec<String>>,
    pub character_locations: EntityTrack<String>,
    pub character_appearance: EntityTrack<String>,
    pub relationships: EntityTrack<RelationshipSnapshot>,
    pub plot_threads: EntityTrack<PlotThreadSnapshot>,
    pub world_building: EntityTrack<String>,
    pub important_objects: EntityTrack<String>,
    pub themes: EntityTrack<String>,
    pub symbols: EntityTrack<String>,
    pub unresolved_questions: NoteTrack,
    pub foreshadowing: NoteTrack,
    pub callbacks: NoteTrack,
    pub timeline: NoteTrack,
    pub continuity: NoteTrack,
    pub pov_characters: ChapterTrack<String>,
    pub tone: ChapterTrack<String>,
    pub time_of_day: ChapterTrack<String>,
    pub weather: ChapterTrack<String>,
}

impl NarrativeTracking {
    pub fn new(limits: &MemoryConfig) -> Self {
        let mut tracking = Self::default();
        tracking.apply_limits(limits);
        tracking
    }

    /// Re-apply configured capacities. Needed after deserializing, since
    /// capacities are not stored in the file.
    pub fn apply_limits(&mut self, limits: &MemoryConfig) {
        let entities = limits.entity_capacity;
        let chapters = limits.chapter_capacity;
        let threshold = limits.cleanup_threshold;

        self.character_arcs.set_limits(entities, threshold);
        self.character_emotions.set_limits(entities, threshold);
        self.character_knowledge.set_limits(entities, threshold);
        self.character_locations.set_limits(entities, threshold);
        self.character_appearance.set_limits(entities, threshold);
        self.relationships.set_limits(entities, threshold);
        self.plot_threads.set_limits(entities, threshold);
        self.world_building.set_limits(entities, threshold);
        self.important_objects.set_limits(entities, threshold);
        self.themes.set_limits(entities, threshold);
        self.symbols.set_limits(entities, threshold);
        self.pov_characters.set_limits(chapters, threshold);
        self.tone.set_limits(chapters, threshold);
        self.time_of_day.set_limits(chapters, threshold);
        self.weather.set_limits(chapters, threshold);

        for track in [
            &mut self.unresolved_questions,
            &mut self.foreshadowing,
            &mut self.callbacks,
            &mut self.timeline,
            &mut self.continuity,
        ] {
            track.set_limits(chapters, threshold);
            for list in track.values_mut() {
                list.set_capacity(limits.max_items_per_chapter);
            }
        }
    }

    /// Merge one chapter's update. Blank names and values are skipped.
    pub fn apply(&mut self, chapter: ChapterNumber, update: &ChapterUpdate, max_items: usize) {
        for (name, character) in &update.character_updates {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            record(&mut self.character_arcs, name, chapter, present(&character.development));
            record(
                &mut self.character_emotions,
                name,
                chapter,
                present(&character.emotional_state),
            );
            record(&mut self.character_locations, name, chapter, present(&character.location));
            record(
                &mut self.character_appearance,
                name,
                chapter,
                present(&character.appearance),
            );

            let learned = non_blank(&character.knowledge);
            if !learned.is_empty() {
                self.character_knowledge.upsert_with(
                    name.to_string(),
                    BTreeMap::new,
                    |history| {
                        let facts = history.entry(chapter).or_default();
                        for fact in learned {
                            if !facts.contains(&fact) {
                                facts.push(fact);
                            }
                        }
                    },
                );
            }
        }

        for (key, snapshot) in &update.relationship_updates {
            let key = key.trim();
            if key.is_empty() || snapshot.is_blank() {
                continue;
            }
            self.relationships
                .upsert_with(key.to_string(), BTreeMap::new, |history| {
                    let entry = history.entry(chapter).or_default();
                    overwrite(&mut entry.status, &snapshot.status);
                    overwrite(&mut entry.dynamics, &snapshot.dynamics);
                });
        }

        for (key, snapshot) in &update.plot_thread_updates {
            let key = key.trim();
            if key.is_empty() || snapshot.is_blank() {
                continue;
            }
            self.plot_threads
                .upsert_with(key.to_string(), BTreeMap::new, |history| {
                    let entry = history.entry(chapter).or_default();
                    overwrite(&mut entry.status, &snapshot.status);
                    overwrite(&mut entry.development, &snapshot.development);
                });
        }

        record_all(&mut self.world_building, chapter, &update.world_building);
        record_all(&mut self.important_objects, chapter, &update.important_objects);
        record_all(&mut self.themes, chapter, &update.themes);
        record_all(&mut self.symbols, chapter, &update.symbols);

        append_notes(
            &mut self.unresolved_questions,
            chapter,
            &update.unresolved_questions,
            max_items,
        );
        append_notes(&mut self.foreshadowing, chapter, &update.foreshadowing, max_items);
        append_notes(&mut self.callbacks, chapter, &update.callbacks, max_items);
        append_notes(&mut self.timeline, chapter, &update.timeline_events, max_items);
        append_notes(&mut self.continuity, chapter, &update.continuity_notes, max_items);

        set_chapter_value(&mut self.pov_characters, chapter, present(&update.pov_character));
        set_chapter_value(&mut self.tone, chapter, present(&update.tone));
        set_chapter_value(&mut self.time_of_day, chapter, present(&update.time_of_day));
        set_chapter_value(&mut self.weather, chapter, present(&update.weather));
    }

    /// Stats for every sub-map, keyed by its name in the state file.
    pub fn stats(&self) -> BTreeMap<&'static str, CacheStats> {
        BTreeMap::from([
            ("character_arcs", self.character_arcs.stats()),
            ("character_emotions", self.character_emotions.stats()),
            ("character_knowledge", self.character_knowledge.stats()),
            ("character_locations", self.character_locations.stats()),
            ("character_appearance", self.character_appearance.stats()),
            ("relationships", self.relationships.stats()),
            ("plot_threads", self.plot_threads.stats()),
            ("world_building", self.world_building.stats()),
            ("important_objects", self.important_objects.stats()),
            ("themes", self.themes.stats()),
            ("symbols", self.symbols.stats()),
            ("unresolved_questions", self.unresolved_questions.stats()),
            ("foreshadowing", self.foreshadowing.stats()),
            ("callbacks", self.callbacks.stats()),
            ("timeline", self.timeline.stats()),
            ("continuity", self.continuity.stats()),
            ("pov_characters", self.pov_characters.stats()),
            ("tone", self.tone.stats()),
            ("time_of_day", self.time_of_day.stats()),
            ("weather", self.weather.stats()),
        ])
    }

    /// Empty every sub-map. Capacities are kept.
    pub fn clear(&mut self) {
        self.character_arcs.clear();
        self.character_emotions.clear();
        self.character_knowledge.clear();
        self.character_locations.clear();
        self.character_appearance.clear();
        self.relationships.clear();
        self.plot_threads.clear();
        self.world_building.clear();
        self.important_objects.clear();
        self.themes.clear();
        self.symbols.clear();
        self.unresolved_questions.clear();
        self.foreshadowing.clear();
        self.callbacks.clear();
        self.timeline.clear();
        self.continuity.clear();
        self.pov_characters.clear();
        self.tone.clear();
        self.time_of_day.clear();
        self.weather.clear();
    }
}

/// Latest snapshot strictly before `chapter`.
pub fn latest_before<S>(
    history: &BTreeMap<ChapterNumber, S>,
    chapter: ChapterNumber,
) -> Option<(ChapterNumber, &S)> {
    history
        .range(..chapter)
        .next_back()
        .map(|(number, snapshot)| (*number, snapshot))
}

fn record(track: &mut EntityTrack<String>, key: &str, chapter: ChapterNumber, value: Option<&str>) {
    if let Some(value) = value {
        track.upsert_with(key.to_string(), BTreeMap::new, |history| {
            history.insert(chapter, value.to_string());
        });
    }
}

fn record_all(
    track: &mut EntityTrack<String>,
    chapter: ChapterNumber,
    entries: &BTreeMap<String, String>,
) {
    for (key, value) in entries {
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        record(track, key, chapter, Some(value));
    }
}

fn append_notes(track: &mut NoteTrack, chapter: ChapterNumber, notes: &[String], max_items: usize) {
    let notes = non_blank(notes);
    if notes.is_empty() {
        return;
    }
    track.upsert_with(
        chapter,
        || BoundedList::new(max_items),
        |list| {
            for note in notes {
                if !list.iter().any(|existing| *existing == note) {
                    list.push(note);
                }
            }
        },
    );
}

fn set_chapter_value(
    track: &mut ChapterTrack<String>,
    chapter: ChapterNumber,
    value: Option<&str>,
) {
    if let Some(value) = value {
        track.set(chapter, value.to_string());
    }
}

fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = present(value) {
        *slot = Some(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::update::CharacterUpdate;

    fn limits() -> MemoryConfig {
        MemoryConfig {
            entity_capacity: 5,
            chapter_capacity: 5,
            max_items_per_chapter: 3,
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_character_development_is_keyed_by_chapter() {
        let mut tracking = NarrativeTracking::new(&limits());
        let mut update = ChapterUpdate::default();
        update.character_updates.insert(
            "Alice".to_string(),
            CharacterUpdate {
                development: Some("met Bob".to_string()),
                ..CharacterUpdate::default()
            },
        );

        tracking.apply(2, &update, 3);

        let arcs = tracking.character_arcs.peek("Alice").unwrap();
        assert_eq!(arcs.get(&2).map(String::as_str), Some("met Bob"));
        assert!(tracking.character_emotions.is_empty());
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut tracking = NarrativeTracking::new(&limits());
        tracking.apply(1, &ChapterUpdate::default(), 3);
        assert_eq!(tracking, NarrativeTracking::new(&limits()));
    }

    #[test]
    fn test_notes_are_capped_to_newest() {
        let mut tracking = NarrativeTracking::new(&limits());
        let update = ChapterUpdate {
            foreshadowing: ["a", "b", " ", "c", "d"].map(String::from).to_vec(),
            ..ChapterUpdate::default()
        };

        tracking.apply(4, &update, 3);

        let notes = tracking.foreshadowing.peek(&4).unwrap();
        assert_eq!(notes.to_vec(), vec!["b", "c", "d"]);
        assert_eq!(notes.dropped(), 1);
    }

    #[test]
    fn test_reapplying_notes_does_not_duplicate() {
        let mut tracking = NarrativeTracking::new(&limits());
        let update = ChapterUpdate {
            unresolved_questions: vec!["Who rang the bell?".to_string()],
            ..ChapterUpdate::default()
        };

        tracking.apply(2, &update, 3);
        tracking.apply(2, &update, 3);

        let questions = tracking.unresolved_questions.peek(&2).unwrap();
        assert_eq!(questions.to_vec(), vec!["Who rang the bell?"]);
    }

    #[test]
    fn test_relationship_fields_merge_within_a_chapter() {
        let mut tracking = NarrativeTracking::new(&limits());
        let mut first = ChapterUpdate::default();
        first.relationship_updates.insert(
            "Mara-Teodor".to_string(),
            RelationshipSnapshot {
                status: Some("allies".to_string()),
                dynamics: None,
            },
        );
        let mut second = ChapterUpdate::default();
        second.relationship_updates.insert(
            "Mara-Teodor".to_string(),
            RelationshipSnapshot {
                status: None,
                dynamics: Some("wary".to_string()),
            },
        );

        tracking.apply(3, &first, 3);
        tracking.apply(3, &second, 3);

        let snapshot = &tracking.relationships.peek("Mara-Teodor").unwrap()[&3];
        assert_eq!(snapshot.status.as_deref(), Some("allies"));
        assert_eq!(snapshot.dynamics.as_deref(), Some("wary"));
    }

    #[test]
    fn test_entity_capacity_evicts_least_recent_entity() {
        let mut tracking = NarrativeTracking::new(&MemoryConfig {
            entity_capacity: 2,
            cleanup_threshold: 1.0,
            ..MemoryConfig::default()
        });
        for (chapter, element) in [(1, "harbor"), (2, "bells"), (3, "ferry")] {
            let mut update = ChapterUpdate::default();
            update
                .world_building
                .insert(element.to_string(), "detail".to_string());
            tracking.apply(chapter, &update, 3);
        }

        assert_eq!(tracking.world_building.len(), 2);
        assert!(!tracking.world_building.contains("harbor"));
        assert_eq!(tracking.stats()["world_building"].evictions, 1);
    }

    #[test]
    fn test_apply_limits_shrinks_loaded_state() {
        let mut tracking = NarrativeTracking::default();
        for chapter in 1..=8 {
            tracking.tone.set(chapter, "calm".to_string());
        }
        tracking.apply_limits(&limits());
        assert_eq!(tracking.tone.len(), 5);
        assert!(tracking.tone.contains(&8));
        assert!(!tracking.tone.contains(&1));
    }

    #[test]
    fn test_latest_before_is_strict() {
        let history = BTreeMap::from([(1, "a"), (3, "b"), (5, "c")]);
        assert_eq!(latest_before(&history, 5), Some((3, &"b")));
        assert_eq!(latest_before(&history, 1), None);
        assert_eq!(latest_before(&history, 9), Some((5, &"c")));
    }

    #[test]
    fn test_chapter_keys_serialize_as_strings() {
        let mut tracking = NarrativeTracking::new(&limits());
        tracking.tone.set(3, "grim".to_string());
        let json = serde_json::to_value(&tracking).unwrap();
        assert_eq!(json["tone"]["3"], "grim");

        let restored: NarrativeTracking = serde_json::from_value(json).unwrap();
        assert_eq!(restored.tone.peek(&3).map(String::as_str), Some("grim"));
    }
}
