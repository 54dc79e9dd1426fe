// Prompt used to turn chapter prose into a tracking update.

pub fn narrative_extraction(
    chapter_number: u32,
    chapter_text: &str,
    known_characters: &[String],
) -> String {
    let cast = if known_characters.is_empty() {
        "(none recorded yet)".to_string()
    } else {
        known_characters.join(", ")
    };

    format!(
        r#"You are a narrative continuity analyst for a novel in progress.

Read chapter {chapter} below and record what later chapters must stay consistent with.
Known characters: {cast}

Return ONE JSON object and nothing else. Omit any field you have nothing for.
Use the exact character names from the text.

{{
  "pov_character": "name of the point-of-view character",
  "character_updates": {{
    "<character name>": {{
      "development": "how the character changed or what they decided",
      "emotional_state": "emotional state at chapter end",
      "knowledge": ["facts the character learned"],
      "location": "where the character is at chapter end",
      "appearance": "notable change in appearance"
    }}
  }},
  "relationship_updates": {{
    "<name>-<name>": {{"status": "current status", "dynamics": "how they interact"}}
  }},
  "plot_thread_updates": {{
    "<thread name>": {{"status": "introduced|active|resolved", "development": "what happened"}}
  }},
  "unresolved_questions": ["questions raised for the reader"],
  "foreshadowing": ["hints planted for later payoff"],
  "callbacks": ["references back to earlier events"],
  "world_building": {{"<element>": "established detail"}},
  "important_objects": {{"<object>": "where it is or what state it is in"}},
  "timeline_events": ["events in the order they happen"],
  "themes": {{"<theme>": "how it appears in this chapter"}},
  "symbols": {{"<symbol>": "how it appears in this chapter"}},
  "continuity_notes": ["details that must not be contradicted"],
  "tone": "overall tone",
  "time_of_day": "time of day at chapter end",
  "weather": "weather at chapter end"
}}

## Chapter {chapter}

{chapter_text}
"#,
        chapter = chapter_number,
        cast = cast,
        chapter_text = chapter_text,
    )
}
