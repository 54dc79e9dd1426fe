//! Narrative extraction through the LLM client, with heuristic fallback

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;

use storykeeper::config::{ExtractionConfig, MemoryConfig};
use storykeeper::llm::{LlmClient, MockLlmClient};
use storykeeper::tracker::{CharacterRecord, NarrativeTracker};
use tempfile::TempDir;

fn tracker(dir: &TempDir) -> NarrativeTracker {
    let limits = MemoryConfig {
        data_dir: dir.path().to_path_buf(),
        ..MemoryConfig::default()
    };
    let mut tracker = NarrativeTracker::new("Harbor", &limits);
    tracker.add_character(CharacterRecord::new("Mara"));
    tracker.add_character(CharacterRecord::new("Teodor"));
    tracker
}

struct FailingClient;

#[async_trait]
impl LlmClient for FailingClient {
    async fn generate_content(
        &self,
        _prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        bail!("connection refused")
    }
}

/// Records the prompt and parameters it was called with.
#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<(String, f32, u32)>>,
}

#[async_trait]
impl LlmClient for RecordingClient {
    async fn generate_content(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), temperature, max_tokens));
        Ok("{\"tone\": \"wistful\"}".to_string())
    }
}

#[tokio::test]
async fn test_mock_extraction_applies_to_tracking() {
    let dir = TempDir::new().unwrap();
    let mut tracker = tracker(&dir);
    let client = MockLlmClient::new();

    let update = tracker
        .extract_narrative_elements("Mara stood in the fog.", 3, &client)
        .await;
    assert_eq!(update.pov_character.as_deref(), Some("Mara"));
    assert_eq!(
        update.character_updates["Mara"].development.as_deref(),
        Some("Decides to stay in the city")
    );

    tracker.update_narrative_tracking(3, &update);
    let context = tracker.narrative_context(4);
    assert_eq!(context.character_arcs["Mara"].value, "Decides to stay in the city");
    assert_eq!(context.unresolved_questions[0].note, "Who forged the schedule?");
    assert_eq!(context.previous_weather.as_deref(), Some("fog"));
}

#[tokio::test]
async fn test_client_failure_falls_back_to_heuristics() {
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir);

    let update = tracker
        .extract_narrative_elements("Teodor rowed while Mara slept.", 2, &FailingClient)
        .await;

    assert_eq!(update.pov_character.as_deref(), Some("Teodor"));
    assert_eq!(
        update.continuity_notes,
        vec![
            "Teodor appears in chapter 2".to_string(),
            "Mara appears in chapter 2".to_string()
        ]
    );
}

#[tokio::test]
async fn test_unparseable_response_falls_back() {
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir);
    let client = MockLlmClient::with_response("I could not find anything notable.");

    let update = tracker
        .extract_narrative_elements("Mara laughed.", 1, &client)
        .await;
    assert_eq!(update.continuity_notes, vec!["Mara appears in chapter 1"]);
}

#[tokio::test]
async fn test_extraction_uses_configured_parameters_and_truncates() {
    let dir = TempDir::new().unwrap();
    let tracker = tracker(&dir).with_extraction(ExtractionConfig {
        temperature: 0.1,
        max_tokens: 1234,
        max_chapter_chars: 10,
    });
    let client = RecordingClient::default();

    let update = tracker
        .extract_narrative_elements("0123456789TAIL-NOT-SENT", 5, &client)
        .await;
    assert_eq!(update.tone.as_deref(), Some("wistful"));

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (prompt, temperature, max_tokens) = &calls[0];
    assert!(prompt.contains("0123456789"));
    assert!(!prompt.contains("TAIL-NOT-SENT"));
    assert!(prompt.contains("Known characters: Mara, Teodor"));
    assert!((temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(*max_tokens, 1234);
}
