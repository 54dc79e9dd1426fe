//! Views of tracked state, assembled for the chapter about to be written.
//! Entries that make it into a context are read through `get`, so they count
//! as hits and move to the most recently used end of their cache.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use super::model::{rotating_pov, ChapterNumber, ChapterSummary, CharacterRecord, PlotPoint};
use super::tracking::{latest_before, ChapterTrack, EntityTrack, NarrativeTracking, NoteTrack};
use super::update::{PlotThreadSnapshot, RelationshipSnapshot};
use crate::cache::BoundedCache;
use crate::series::SeriesContext;

/// A value together with the chapter it was recorded for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Latest<T> {
    pub chapter: ChapterNumber,
    pub value: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterNote {
    pub chapter: ChapterNumber,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    pub pov_character: Option<String>,
    pub character_arcs: BTreeMap<String, Latest<String>>,
    pub character_emotions: BTreeMap<String, Latest<String>>,
    pub character_knowledge: BTreeMap<String, Latest<Vec<String>>>,
    pub character_locations: BTreeMap<String, Latest<String>>,
    pub character_appearance: BTreeMap<String, Latest<String>>,
    pub relationships: BTreeMap<String, Latest<RelationshipSnapshot>>,
    pub plot_threads: BTreeMap<String, Latest<PlotThreadSnapshot>>,
    pub world_building: BTreeMap<String, Latest<String>>,
    pub important_objects: BTreeMap<String, Latest<String>>,
    pub unresolved_questions: Vec<ChapterNote>,
    pub foreshadowing: Vec<ChapterNote>,
    pub callbacks: Vec<ChapterNote>,
    pub timeline: Vec<ChapterNote>,
    pub continuity: Vec<ChapterNote>,
    pub themes: BTreeMap<String, Vec<ChapterNote>>,
    pub symbols: BTreeMap<String, Vec<ChapterNote>>,
    pub previous_tone: Option<String>,
    pub previous_time_of_day: Option<String>,
    pub previous_weather: Option<String>,
}

/// Everything the generator needs before writing `chapter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterContext {
    pub chapter: ChapterNumber,
    pub previous_summaries: Vec<ChapterSummary>,
    pub plot_points: Vec<PlotPoint>,
    pub narrative: NarrativeContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesContext>,
}

pub(crate) fn narrative_context(
    tracking: &mut NarrativeTracking,
    characters: &[CharacterRecord],
    chapter: ChapterNumber,
) -> NarrativeContext {
    let previous = chapter.checked_sub(1);
    NarrativeContext {
        pov_character: pov_for_chapter(&mut tracking.pov_characters, characters, chapter),
        character_arcs: latest_per_key(&mut tracking.character_arcs, chapter),
        character_emotions: latest_per_key(&mut tracking.character_emotions, chapter),
        character_knowledge: latest_per_key(&mut tracking.character_knowledge, chapter),
        character_locations: latest_per_key(&mut tracking.character_locations, chapter),
        character_appearance: latest_per_key(&mut tracking.character_appearance, chapter),
        relationships: latest_per_key(&mut tracking.relationships, chapter),
        plot_threads: latest_per_key(&mut tracking.plot_threads, chapter),
        world_building: latest_per_key(&mut tracking.world_building, chapter),
        important_objects: latest_per_key(&mut tracking.important_objects, chapter),
        unresolved_questions: notes_before(&mut tracking.unresolved_questions, chapter),
        foreshadowing: notes_before(&mut tracking.foreshadowing, chapter),
        callbacks: notes_before(&mut tracking.callbacks, chapter),
        timeline: notes_before(&mut tracking.timeline, chapter),
        continuity: notes_before(&mut tracking.continuity, chapter),
        themes: history_before(&mut tracking.themes, chapter),
        symbols: history_before(&mut tracking.symbols, chapter),
        previous_tone: value_at(&mut tracking.tone, previous),
        previous_time_of_day: value_at(&mut tracking.time_of_day, previous),
        previous_weather: value_at(&mut tracking.weather, previous),
    }
}

/// Mark `keys` as used, in the order they appear in the context.
fn touch<K: Hash + Eq, V>(track: &mut BoundedCache<K, V>, keys: Vec<K>) {
    for key in keys {
        let _ = track.get(&key);
    }
}

fn value_at(track: &mut ChapterTrack<String>, chapter: Option<ChapterNumber>) -> Option<String> {
    track.get(&chapter?).ok().cloned()
}

/// Explicit POV for the chapter, else the declared rotation, else the most
/// recent earlier explicit POV.
fn pov_for_chapter(
    explicit: &mut ChapterTrack<String>,
    characters: &[CharacterRecord],
    chapter: ChapterNumber,
) -> Option<String> {
    if let Ok(pov) = explicit.get(&chapter) {
        return Some(pov.clone());
    }
    if let Some(pov) = rotating_pov(characters, chapter) {
        return Some(pov);
    }
    let prior = explicit
        .iter()
        .filter(|(number, _)| **number < chapter)
        .map(|(number, _)| *number)
        .max()?;
    explicit.get(&prior).ok().cloned()
}

fn latest_per_key<S: Clone>(
    track: &mut EntityTrack<S>,
    chapter: ChapterNumber,
) -> BTreeMap<String, Latest<S>> {
    let latest: BTreeMap<String, Latest<S>> = track
        .iter()
        .filter_map(|(key, history)| {
            latest_before(history, chapter).map(|(number, value)| {
                (
                    key.clone(),
                    Latest {
                        chapter: number,
                        value: value.clone(),
                    },
                )
            })
        })
        .collect();
    touch(track, latest.keys().cloned().collect());
    latest
}

fn notes_before(track: &mut NoteTrack, chapter: ChapterNumber) -> Vec<ChapterNote> {
    let mut chapters: Vec<ChapterNumber> = track
        .iter()
        .map(|(number, _)| *number)
        .filter(|number| *number < chapter)
        .collect();
    chapters.sort_unstable();
    let notes: Vec<ChapterNote> = chapters
        .iter()
        .filter_map(|number| track.peek(number).map(|notes| (*number, notes)))
        .flat_map(|(number, notes)| {
            notes.iter().map(move |note| ChapterNote {
                chapter: number,
                note: note.clone(),
            })
        })
        .collect();
    touch(track, chapters);
    notes
}

fn history_before(
    track: &mut EntityTrack<String>,
    chapter: ChapterNumber,
) -> BTreeMap<String, Vec<ChapterNote>> {
    let history: BTreeMap<String, Vec<ChapterNote>> = track
        .iter()
        .filter_map(|(key, history)| {
            let notes: Vec<ChapterNote> = history
                .range(..chapter)
                .map(|(number, note)| ChapterNote {
                    chapter: *number,
                    note: note.clone(),
                })
                .collect();
            (!notes.is_empty()).then(|| (key.clone(), notes))
        })
        .collect();
    touch(track, history.keys().cloned().collect());
    history
}

/// Drop recurring characters the book already defines (case-insensitive).
pub(crate) fn without_book_cast(
    mut series: SeriesContext,
    characters: &[CharacterRecord],
) -> SeriesContext {
    let cast: HashSet<String> = characters.iter().map(|c| c.name.to_lowercase()).collect();
    series
        .recurring_characters
        .retain(|c| !cast.contains(&c.character.name.to_lowercase()));
    series
}
