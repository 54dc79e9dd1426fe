use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::util::now_rfc3339;

/// Chapter numbers start at 1.
pub type ChapterNumber = u32;

/// Flat descriptive metadata for one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub series_title: Option<String>,
    #[serde(default)]
    pub book_number: Option<u32>,
    #[serde(default = "now_rfc3339")]
    pub created_at: String,
    #[serde(default = "now_rfc3339")]
    pub last_updated: String,
    /// Any other key/value pairs the host wants to keep with the book.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl Default for BookMetadata {
    fn default() -> Self {
        let now = now_rfc3339();
        Self {
            title: String::new(),
            author: None,
            genre: None,
            series_title: None,
            book_number: None,
            created_at: now.clone(),
            last_updated: now,
            extra: BTreeMap::new(),
        }
    }
}

impl BookMetadata {
    /// Set a field by name. Unknown names land in `extra`.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match key {
            "title" => self.title = value,
            "author" => self.author = Some(value),
            "genre" => self.genre = Some(value),
            "series_title" => self.series_title = Some(value),
            "book_number" => match value.parse() {
                Ok(n) => self.book_number = Some(n),
                Err(_) => {
                    self.extra.insert(key.to_string(), value);
                }
            },
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookStructure {
    /// Planned number of chapters
    #[serde(default)]
    pub chapter_count: u32,
    #[serde(default)]
    pub target_word_count: u64,
    /// Highest summed word count of the chapter summaries seen so far.
    /// Revising a summary downward does not lower it.
    #[serde(default)]
    pub current_word_count: u64,
    #[serde(default)]
    pub outline: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    /// Position in the POV rotation; `None` for non-POV characters
    #[serde(default)]
    pub pov_order: Option<u32>,
}

impl CharacterRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_pov_order(mut self, order: u32) -> Self {
        self.pov_order = Some(order);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    pub chapter: ChapterNumber,
    pub description: String,
    /// e.g. "inciting incident", "midpoint", "climax"
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter: ChapterNumber,
    pub summary: String,
    pub word_count: u64,
}

/// Characters that take part in the POV rotation, in rotation order.
pub(crate) fn pov_rotation(characters: &[CharacterRecord]) -> Vec<&CharacterRecord> {
    let mut rotation: Vec<&CharacterRecord> =
        characters.iter().filter(|c| c.pov_order.is_some()).collect();
    rotation.sort_by(|a, b| a.pov_order.cmp(&b.pov_order).then_with(|| a.name.cmp(&b.name)));
    rotation
}

/// POV character for `chapter` by alternating through the rotation.
pub(crate) fn rotating_pov(
    characters: &[CharacterRecord],
    chapter: ChapterNumber,
) -> Option<String> {
    let rotation = pov_rotation(characters);
    if rotation.is_empty() {
        return None;
    }
    let index = chapter.saturating_sub(1) as usize % rotation.len();
    Some(rotation[index].name.clone())
}
