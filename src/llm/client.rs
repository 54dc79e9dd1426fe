use anyhow::Result;
use async_trait::async_trait;

/// Text-generation backend used by narrative extraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate_content(&self, prompt: &str, temperature: f32, max_tokens: u32)
        -> Result<String>;
}

/// Offline client for `--dry-run` and tests.
pub struct MockLlmClient {
    response: Option<String>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self { response: None }
    }

    /// Always answer with `response`, whatever the prompt.
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate_content(
        &self,
        prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        if let Some(ref response) = self.response {
            return Ok(response.clone());
        }

        if prompt.contains("narrative continuity analyst") {
            Ok(r#"Here is the analysis:
```json
{
  "pov_character": "Mara",
  "character_updates": {
    "Mara": {
      "development": "Decides to stay in the city",
      "emotional_state": "resolute",
      "knowledge": ["The ferry schedule was forged"],
      "location": "Harbor district"
    }
  },
  "relationship_updates": {
    "Mara-Teodor": {"status": "uneasy allies", "dynamics": "trading favors"}
  },
  "plot_thread_updates": {
    "forged schedule": {"status": "active", "development": "Mara finds the forger's mark"}
  },
  "unresolved_questions": ["Who forged the schedule?"],
  "foreshadowing": ["A bell rings twice at midnight"],
  "timeline_events": ["Mara arrives at the harbor"],
  "themes": {"trust": "Mara hides the letter from Teodor"},
  "tone": "tense",
  "time_of_day": "night",
  "weather": "fog"
}
```"#
                .to_string())
        } else {
            Ok(r#"{"status": "mock"}"#.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_answers_extraction_prompt() {
        let client = MockLlmClient::new();
        let out = client
            .generate_content("You are a narrative continuity analyst.", 0.3, 100)
            .await
            .unwrap();
        assert!(out.contains("\"pov_character\": \"Mara\""));
    }

    #[tokio::test]
    async fn test_mock_fixed_response() {
        let client = MockLlmClient::with_response("not json at all");
        let out = client.generate_content("anything", 0.3, 100).await.unwrap();
        assert_eq!(out, "not json at all");
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let client = MockLlmClient::default();
        let out = client.generate_content("hello", 0.7, 100).await.unwrap();
        assert_eq!(out, r#"{"status": "mock"}"#);
    }
}
