//! Series bible: what stays true across every book of a series.
//!
//! The narrative tracker only reads from it, through [`SeriesContextSource`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::store::{self, PersistError};
use crate::tracker::model::CharacterRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub number: u32,
    pub title: String,
    #[serde(default = "default_book_status")]
    pub status: String,
}

fn default_book_status() -> String {
    "planned".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringCharacter {
    #[serde(flatten)]
    pub character: CharacterRecord,
    pub first_book: u32,
}

/// A story arc spanning several books. A missing bound is open-ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesArc {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_book: Option<u32>,
    #[serde(default)]
    pub end_book: Option<u32>,
}

impl SeriesArc {
    pub fn spans(&self, book_number: u32) -> bool {
        self.start_book.is_none_or(|start| start <= book_number)
            && self.end_book.is_none_or(|end| book_number <= end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Universe {
    pub name: String,
    pub description: String,
    pub rules: Vec<String>,
    pub key_locations: Vec<String>,
    pub history: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesBible {
    pub series_title: String,
    pub books: Vec<BookEntry>,
    pub recurring_characters: Vec<RecurringCharacter>,
    pub series_arcs: Vec<SeriesArc>,
    pub universe: Option<Universe>,
}

/// Series-level facts relevant to one book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesContext {
    pub series_title: String,
    pub book_number: u32,
    pub recurring_characters: Vec<RecurringCharacter>,
    pub active_arcs: Vec<SeriesArc>,
    pub universe: Option<Universe>,
}

/// Anything that can describe the series a book belongs to.
pub trait SeriesContextSource: Send + Sync {
    fn context_for_book(&self, book_number: u32) -> SeriesContext;
}

impl SeriesBible {
    pub fn context_for_book(&self, book_number: u32) -> SeriesContext {
        SeriesContext {
            series_title: self.series_title.clone(),
            book_number,
            recurring_characters: self
                .recurring_characters
                .iter()
                .filter(|c| c.first_book <= book_number)
                .cloned()
                .collect(),
            active_arcs: self
                .series_arcs
                .iter()
                .filter(|arc| arc.spans(book_number))
                .cloned()
                .collect(),
            universe: self.universe.clone(),
        }
    }
}

/// File-backed series bible. Every mutation is saved immediately.
#[derive(Debug)]
pub struct SeriesManager {
    path: PathBuf,
    bible: SeriesBible,
}

impl SeriesManager {
    /// Series file location for a title inside `data_dir`.
    pub fn file_path(data_dir: &Path, series_title: &str) -> PathBuf {
        data_dir.join(format!(
            "{}_series.json",
            crate::util::sanitize_title(series_title)
        ))
    }

    /// Load the bible at `path`, starting empty when the file is missing or
    /// unreadable. Unreadable files are moved aside first.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let bible = match store::load_json::<SeriesBible>(&path) {
            Ok(bible) => bible,
            Err(e) if e.is_not_found() => {
                info!("No series file at {}, starting empty", path.display());
                SeriesBible::default()
            }
            Err(e) => {
                warn!("Could not read series file {}: {}", path.display(), e);
                store::quarantine(&path);
                SeriesBible::default()
            }
        };
        Self { path, bible }
    }

    pub fn create(path: impl Into<PathBuf>, series_title: &str) -> Result<Self, PersistError> {
        let mut manager = Self::open(path);
        manager.bible.series_title = series_title.to_string();
        manager.save()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bible(&self) -> &SeriesBible {
        &self.bible
    }

    pub fn save(&self) -> Result<(), PersistError> {
        store::save_json(&self.path, &self.bible)
    }

    /// Add a book, replacing any entry with the same number.
    pub fn add_book(&mut self, book: BookEntry) -> Result<(), PersistError> {
        self.bible.books.retain(|b| b.number != book.number);
        self.bible.books.push(book);
        self.bible.books.sort_by_key(|b| b.number);
        self.save()
    }

    /// Add a recurring character, replacing one with the same name
    /// (case-insensitive).
    pub fn add_recurring_character(
        &mut self,
        character: CharacterRecord,
        first_book: u32,
    ) -> Result<(), PersistError> {
        let key = character.name.to_lowercase();
        self.bible
            .recurring_characters
            .retain(|c| c.character.name.to_lowercase() != key);
        self.bible.recurring_characters.push(RecurringCharacter {
            character,
            first_book,
        });
        self.save()
    }

    pub fn add_series_arc(&mut self, arc: SeriesArc) -> Result<(), PersistError> {
        self.bible.series_arcs.retain(|a| a.name != arc.name);
        self.bible.series_arcs.push(arc);
        self.save()
    }

    pub fn set_universe(&mut self, universe: Universe) -> Result<(), PersistError> {
        self.bible.universe = Some(universe);
        self.save()
    }
}

impl SeriesContextSource for SeriesManager {
    fn context_for_book(&self, book_number: u32) -> SeriesContext {
        self.bible.context_for_book(book_number)
    }
}

impl SeriesContextSource for SeriesBible {
    fn context_for_book(&self, book_number: u32) -> SeriesContext {
        SeriesBible::context_for_book(self, book_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn arc(name: &str, start: Option<u32>, end: Option<u32>) -> SeriesArc {
        SeriesArc {
            name: name.to_string(),
            start_book: start,
            end_book: end,
            ..SeriesArc::default()
        }
    }

    #[test]
    fn test_context_filters_characters_and_arcs_by_book() {
        let bible = SeriesBible {
            series_title: "Harbor Cycle".to_string(),
            recurring_characters: vec![
                RecurringCharacter {
                    character: CharacterRecord::new("Mara"),
                    first_book: 1,
                },
                RecurringCharacter {
                    character: CharacterRecord::new("Ilse"),
                    first_book: 3,
                },
            ],
            series_arcs: vec![
                arc("the tide war", Some(1), Some(2)),
                arc("the drowned king", Some(2), None),
                arc("the ferryman", None, None),
            ],
            ..SeriesBible::default()
        };

        let context = bible.context_for_book(2);
        let names: Vec<_> = context
            .recurring_characters
            .iter()
            .map(|c| c.character.name.as_str())
            .collect();
        assert_eq!(names, vec!["Mara"]);
        assert_eq!(context.active_arcs.len(), 3);

        let context = bible.context_for_book(3);
        let arcs: Vec<_> = context.active_arcs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(arcs, vec!["the drowned king", "the ferryman"]);
        assert_eq!(context.recurring_characters.len(), 2);
    }

    #[test]
    fn test_manager_is_write_through() {
        let dir = TempDir::new().unwrap();
        let path = SeriesManager::file_path(dir.path(), "Harbor Cycle");
        let mut manager = SeriesManager::create(&path, "Harbor Cycle").unwrap();
        manager
            .add_book(BookEntry {
                number: 1,
                title: "Salt Roads".to_string(),
                status: "drafting".to_string(),
            })
            .unwrap();
        manager
            .add_recurring_character(CharacterRecord::new("Mara"), 1)
            .unwrap();
        manager
            .add_recurring_character(CharacterRecord::new("MARA").with_role("captain"), 1)
            .unwrap();
        manager
            .set_universe(Universe {
                name: "The Sunken Coast".to_string(),
                ..Universe::default()
            })
            .unwrap();

        let reopened = SeriesManager::open(&path);
        assert_eq!(reopened.bible(), manager.bible());
        assert_eq!(reopened.bible().recurring_characters.len(), 1);
        assert_eq!(
            reopened.bible().recurring_characters[0].character.role.as_deref(),
            Some("captain")
        );
        assert!(path.ends_with("harbor_cycle_series.json"));
    }

    #[test]
    fn test_corrupt_series_file_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken_series.json");
        std::fs::write(&path, "[[[").unwrap();

        let manager = SeriesManager::open(&path);
        assert_eq!(manager.bible(), &SeriesBible::default());
        assert!(dir.path().join("broken_series.json.corrupt").exists());
    }

    #[test]
    fn test_recurring_character_flattens_record() {
        let json = serde_json::to_value(RecurringCharacter {
            character: CharacterRecord::new("Mara"),
            first_book: 2,
        })
        .unwrap();
        assert_eq!(json["name"], "Mara");
        assert_eq!(json["first_book"], 2);
    }
}
