//! Text generation backend for topic extraction.
//!
//! [`AnthropicGenerator`] implements the core [`TextGenerator`] trait
//! against the Anthropic messages API. [`create_topic_extractor`] decides
//! whether topic extraction uses it at all: in mock mode, with
//! `topics.provider = "heuristic"`, or without `ANTHROPIC_API_KEY` the
//! extractor runs on the heuristic alone.

use anyhow::bail;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use expertise_graph_core::topics::{TextGenerator, TopicExtractor};
use expertise_graph_core::{Error, Result};

use crate::config::{Config, TopicsConfig};
use crate::embedding::send_json;

pub const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 256;
const TEMPERATURE: f64 = 0.2;

pub struct AnthropicGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
    pub fn new(config: &TopicsConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(format!("{}/v1/messages", self.url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let json = send_json("anthropic", request).await?;

        json.get("content")
            .and_then(|c| c.get(0))
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::ProviderResponse {
                provider: "anthropic".to_string(),
                message: "missing content[0].text".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the topic extractor from configuration and the environment.
pub fn create_topic_extractor(config: &Config) -> anyhow::Result<TopicExtractor> {
    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());
    create_topic_extractor_with_key(config, api_key)
}

/// [`create_topic_extractor`] with an explicit Anthropic key.
pub fn create_topic_extractor_with_key(
    config: &Config,
    api_key: Option<String>,
) -> anyhow::Result<TopicExtractor> {
    if config.embedding.mock || config.topics.provider == "heuristic" {
        return Ok(TopicExtractor::heuristic());
    }
    match (config.topics.provider.as_str(), api_key) {
        ("anthropic" | "auto", Some(key)) => {
            let generator = AnthropicGenerator::new(&config.topics, key)?;
            tracing::info!(model = %config.topics.model, "topic extraction via anthropic");
            Ok(TopicExtractor::with_generator(Arc::new(generator)))
        }
        ("anthropic", None) => bail!("ANTHROPIC_API_KEY environment variable not set"),
        _ => Ok(TopicExtractor::heuristic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, mock: bool) -> Config {
        let mut config = Config::minimal("/tmp/xg/db.sqlite");
        config.embedding.mock = mock;
        config.topics.provider = provider.to_string();
        config
    }

    #[test]
    fn test_mock_mode_is_heuristic() {
        let extractor =
            create_topic_extractor_with_key(&config("anthropic", true), Some("k".into())).unwrap();
        assert!(!extractor.uses_generator());
    }

    #[test]
    fn test_auto_uses_key_when_present() {
        let with_key =
            create_topic_extractor_with_key(&config("auto", false), Some("k".into())).unwrap();
        assert!(with_key.uses_generator());
        let without = create_topic_extractor_with_key(&config("auto", false), None).unwrap();
        assert!(!without.uses_generator());
    }

    #[test]
    fn test_explicit_anthropic_requires_key() {
        assert!(create_topic_extractor_with_key(&config("anthropic", false), None).is_err());
    }
}
