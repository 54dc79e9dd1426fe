//! Turning chapter prose into a [`ChapterUpdate`].
//!
//! The LLM is asked for a JSON object in the update's shape. When the call
//! fails or nothing parseable comes back, a name-matching heuristic keeps at
//! least the cast and POV continuity.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::model::{rotating_pov, ChapterNumber, CharacterRecord};
use super::update::ChapterUpdate;
use super::NarrativeTracker;
use crate::llm::{prompts, LlmClient};
use crate::util::truncate_chars;

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json|JSON)?\s*(\{[\s\S]*?\})\s*```").expect("valid fence regex")
});

impl NarrativeTracker {
    /// Ask `client` to extract narrative elements from `chapter_text`.
    /// Never fails: unusable model output falls back to [`fallback_extraction`].
    pub async fn extract_narrative_elements(
        &self,
        chapter_text: &str,
        chapter: ChapterNumber,
        client: &dyn LlmClient,
    ) -> ChapterUpdate {
        let known = self.known_character_names();
        let text = truncate_chars(chapter_text, self.extraction.max_chapter_chars);
        if text.len() < chapter_text.len() {
            debug!(
                "Chapter {} truncated to {} chars for extraction",
                chapter, self.extraction.max_chapter_chars
            );
        }
        let prompt = prompts::narrative_extraction(chapter, text, &known);

        info!("Extracting narrative elements for chapter {}", chapter);
        let response = match client
            .generate_content(
                &prompt,
                self.extraction.temperature,
                self.extraction.max_tokens,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Extraction call failed for chapter {}: {:#}", chapter, e);
                return fallback_extraction(chapter_text, chapter, self.characters(), &known);
            }
        };

        match parse_update(&response) {
            Some(update) => update,
            None => {
                warn!(
                    "Could not parse extraction response for chapter {}, using heuristics",
                    chapter
                );
                fallback_extraction(chapter_text, chapter, self.characters(), &known)
            }
        }
    }
}

/// Parse model output into an update. Returns `None` when no JSON object
/// can be found or it does not fit the update shape.
pub fn parse_update(response: &str) -> Option<ChapterUpdate> {
    let json = extract_json_block(response)?;
    match serde_json::from_str::<ChapterUpdate>(&json) {
        Ok(update) => Some(update),
        Err(e) => {
            debug!("Extraction JSON did not match update shape: {}", e);
            None
        }
    }
}

/// Pull a JSON object out of text that may carry prose or markdown fences.
pub fn extract_json_block(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(captures) = FENCED_JSON.captures(trimmed) {
        return Some(captures[1].trim().to_string());
    }

    // First { to last }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| trimmed[start..=end].to_string())
}

/// Heuristic extraction: every known character named in the text gets a
/// continuity note, and the POV comes from the declared rotation or the
/// first character mentioned.
pub fn fallback_extraction(
    chapter_text: &str,
    chapter: ChapterNumber,
    characters: &[CharacterRecord],
    known_names: &[String],
) -> ChapterUpdate {
    let mut mentioned: Vec<(usize, &str)> = known_names
        .iter()
        .filter_map(|name| first_mention(chapter_text, name).map(|pos| (pos, name.as_str())))
        .collect();
    mentioned.sort();

    let pov_character = rotating_pov(characters, chapter)
        .or_else(|| mentioned.first().map(|(_, name)| name.to_string()));

    ChapterUpdate {
        pov_character,
        continuity_notes: mentioned
            .iter()
            .map(|(_, name)| format!("{} appears in chapter {}", name, chapter))
            .collect(),
        ..ChapterUpdate::default()
    }
}

/// Byte offset of the first whole-word, case-insensitive mention of `name`.
fn first_mention(text: &str, name: &str) -> Option<usize> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let pattern = format!(r"(?i)\b{}\b", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.find(text).map(|m| m.start())
}
