use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one chapter changed in the story, as produced by extraction or by
/// the host pipeline. Every field is optional; missing or blank fields leave
/// tracking untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterUpdate {
    pub pov_character: Option<String>,
    pub character_updates: BTreeMap<String, CharacterUpdate>,
    pub relationship_updates: BTreeMap<String, RelationshipSnapshot>,
    pub plot_thread_updates: BTreeMap<String, PlotThreadSnapshot>,
    pub unresolved_questions: Vec<String>,
    pub foreshadowing: Vec<String>,
    pub callbacks: Vec<String>,
    pub world_building: BTreeMap<String, String>,
    pub important_objects: BTreeMap<String, String>,
    pub timeline_events: Vec<String>,
    pub themes: BTreeMap<String, String>,
    pub symbols: BTreeMap<String, String>,
    pub continuity_notes: Vec<String>,
    pub tone: Option<String>,
    pub time_of_day: Option<String>,
    pub weather: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterUpdate {
    pub development: Option<String>,
    pub emotional_state: Option<String>,
    pub knowledge: Vec<String>,
    pub location: Option<String>,
    pub appearance: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipSnapshot {
    pub status: Option<String>,
    pub dynamics: Option<String>,
}

impl RelationshipSnapshot {
    pub fn is_blank(&self) -> bool {
        present(&self.status).is_none() && present(&self.dynamics).is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotThreadSnapshot {
    pub status: Option<String>,
    pub development: Option<String>,
}

impl PlotThreadSnapshot {
    pub fn is_blank(&self) -> bool {
        present(&self.status).is_none() && present(&self.development).is_none()
    }
}

impl ChapterUpdate {
    /// True when applying this update would record nothing.
    pub fn is_empty(&self) -> bool {
        present(&self.pov_character).is_none()
            && present(&self.tone).is_none()
            && present(&self.time_of_day).is_none()
            && present(&self.weather).is_none()
            && self.character_updates.iter().all(|(name, c)| {
                name.trim().is_empty()
                    || (present(&c.development).is_none()
                        && present(&c.emotional_state).is_none()
                        && non_blank(&c.knowledge).is_empty()
                        && present(&c.location).is_none()
                        && present(&c.appearance).is_none())
            })
            && self
                .relationship_updates
                .iter()
                .all(|(key, r)| key.trim().is_empty() || r.is_blank())
            && self
                .plot_thread_updates
                .iter()
                .all(|(key, p)| key.trim().is_empty() || p.is_blank())
            && [
                &self.world_building,
                &self.important_objects,
                &self.themes,
                &self.symbols,
            ]
            .iter()
            .all(|map| {
                map.iter()
                    .all(|(k, v)| k.trim().is_empty() || v.trim().is_empty())
            })
            && [
                &self.unresolved_questions,
                &self.foreshadowing,
                &self.callbacks,
                &self.timeline_events,
                &self.continuity_notes,
            ]
            .iter()
            .all(|list| non_blank(list).is_empty())
    }
}

/// Trimmed value of an optional string, `None` when missing or blank.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Trimmed non-blank items of a list.
pub(crate) fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
