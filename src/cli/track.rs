// Commands that feed chapter results into narrative tracking.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use super::{open_tracker, print_json};
use crate::config::Config;
use crate::llm::factory;
use crate::tracker::ChapterUpdate;

/// Apply a JSON update payload from a file.
pub fn update(config: &Config, title: &str, chapter: u32, payload_file: &Path) -> Result<()> {
    let content = fs::read_to_string(payload_file)
        .with_context(|| format!("Failed to read payload {}", payload_file.display()))?;
    let update: ChapterUpdate = serde_json::from_str(&content)
        .with_context(|| format!("Invalid update payload in {}", payload_file.display()))?;

    let mut tracker = open_tracker(config, title);
    tracker.update_narrative_tracking(chapter, &update);
    info!("Applied tracking update for chapter {}", chapter);
    Ok(())
}

/// Extract narrative elements from chapter prose, print them, and apply
/// them unless `no_apply` is set.
pub async fn extract(
    config: &Config,
    title: &str,
    chapter: u32,
    chapter_file: &Path,
    no_apply: bool,
    dry_run: bool,
) -> Result<()> {
    let text = fs::read_to_string(chapter_file)
        .with_context(|| format!("Failed to read chapter {}", chapter_file.display()))?;
    let client = factory::create_client(config, dry_run)?;

    let mut tracker = open_tracker(config, title);
    let update = tracker
        .extract_narrative_elements(&text, chapter, client.as_ref())
        .await;
    print_json(&update)?;

    if no_apply {
        info!("Extraction for chapter {} not applied (--no-apply)", chapter);
    } else {
        tracker.update_narrative_tracking(chapter, &update);
        info!("Applied extracted update for chapter {}", chapter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::NarrativeTracker;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.memory.data_dir = dir.path().join("memory");
        config
    }

    #[test]
    fn test_update_applies_payload_file() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let payload = dir.path().join("update.json");
        fs::write(&payload, r#"{"tone": "grim", "weather": "sleet"}"#).unwrap();

        update(&config, "Salt Roads", 2, &payload).unwrap();

        let tracker = NarrativeTracker::new("Salt Roads", &config.memory);
        assert_eq!(
            tracker.tracking().tone.peek(&2).map(String::as_str),
            Some("grim")
        );
    }

    #[test]
    fn test_update_rejects_invalid_payload() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let payload = dir.path().join("update.json");
        fs::write(&payload, "[1, 2]").unwrap();

        let err = update(&config, "Salt Roads", 2, &payload).unwrap_err();
        assert!(err.to_string().contains("Invalid update payload"));
    }

    #[tokio::test]
    async fn test_extract_dry_run_applies_mock_update() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let chapter = dir.path().join("ch3.txt");
        fs::write(&chapter, "Mara walked the fog-bound quay.").unwrap();

        extract(&config, "Salt Roads", 3, &chapter, false, true)
            .await
            .unwrap();

        let tracker = NarrativeTracker::new("Salt Roads", &config.memory);
        assert_eq!(
            tracker.tracking().pov_characters.peek(&3).map(String::as_str),
            Some("Mara")
        );
    }

    #[tokio::test]
    async fn test_extract_no_apply_leaves_tracking_empty() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let chapter = dir.path().join("ch3.txt");
        fs::write(&chapter, "Mara walked the fog-bound quay.").unwrap();

        extract(&config, "Salt Roads", 3, &chapter, true, true)
            .await
            .unwrap();

        let tracker = NarrativeTracker::new("Salt Roads", &config.memory);
        assert!(tracker.tracking().pov_characters.is_empty());
    }
}
