use anyhow::{bail, Result};

use super::client::LlmClient;
use super::client::MockLlmClient;
use super::client_impl::{AnthropicClient, GeminiClient, OpenAIClient};
use crate::config::Config;

/// Create an LLM client based on configuration
pub fn create_client(config: &Config, dry_run: bool) -> Result<Box<dyn LlmClient>> {
    if dry_run {
        return Ok(Box::new(MockLlmClient::new()));
    }

    let api_key = config.get_api_key()?;
    let max_tokens = config.llm.get_max_tokens();
    let timeout = config.llm.timeout_secs;

    match config.llm.provider.as_str() {
        "anthropic" => match config.llm.base_url {
            Some(ref base_url) => Ok(Box::new(AnthropicClient::with_base_url(
                api_key,
                config.llm.model.clone(),
                base_url.clone(),
                max_tokens,
                timeout,
            )?)),
            None => Ok(Box::new(AnthropicClient::new(
                api_key,
                config.llm.model.clone(),
                max_tokens,
                timeout,
            )?)),
        },

        "openai" => Ok(Box::new(OpenAIClient::new(
            api_key,
            config.llm.model.clone(),
            max_tokens,
            timeout,
        )?)),

        "openai-compatible" => {
            let base_url = config
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string());

            Ok(Box::new(OpenAIClient::with_base_url(
                api_key,
                config.llm.model.clone(),
                base_url,
                max_tokens,
                timeout,
            )?))
        }

        "gemini" => Ok(Box::new(GeminiClient::new(
            api_key,
            config.llm.model.clone(),
            max_tokens,
            timeout,
        )?)),

        unknown => bail!("Unknown LLM provider: {}", unknown),
    }
}
