//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. A handful of environment variables override file values so a
//! deployment can switch to offline embeddings without editing config:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `XG_EMBED_MOCK` | `embedding.mock` |
//! | `XG_EMBED_FALLBACK` | `embedding.fallback` |
//! | `XG_RETENTION_DAYS` | `audit.retention_days` |
//!
//! ```toml
//! [db]
//! path = "./data/xg.sqlite"
//!
//! [embedding]
//! provider = "openai"
//! fallback = true
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use expertise_graph_core::chunk::ChunkOptions;
use expertise_graph_core::search::SearchSettings;
use expertise_graph_core::vector::DistanceMetric;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            token_budget: self.token_budget,
            overlap_tokens: self.overlap_tokens,
        }
    }
}

fn default_token_budget() -> usize {
    138
}
fn default_overlap_tokens() -> usize {
    18
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
    #[serde(default = "default_expert_limit")]
    pub expert_limit: usize,
    #[serde(default)]
    pub distance: DistanceMetric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_topics: default_max_topics(),
            expert_limit: default_expert_limit(),
            distance: DistanceMetric::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn settings(&self) -> SearchSettings {
        SearchSettings {
            max_topics: self.max_topics,
            expert_limit: self.expert_limit,
            ..SearchSettings::default()
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_topics() -> usize {
    8
}
fn default_expert_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `auto`, `openai`, `ollama`, or `mock`.
    #[serde(default = "default_auto")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Expected width before the first call; the marker wins once written.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of the provider API.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub fallback: bool,
    #[serde(default)]
    pub mock: bool,
    /// Defaults to `.embed_dim` next to the database.
    #[serde(default)]
    pub dim_marker_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_auto(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            fallback: true,
            mock: false,
            dim_marker_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicsConfig {
    /// `auto`, `anthropic`, or `heuristic`.
    #[serde(default = "default_auto")]
    pub provider: String,
    #[serde(default = "default_topic_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            provider: default_auto(),
            model: default_topic_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_topic_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Record topic observations for the document owner on ingest.
    #[serde(default = "default_true")]
    pub derive_expertise: bool,
    #[serde(default = "default_expertise_topics")]
    pub expertise_topics: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            derive_expertise: true,
            expertise_topics: default_expertise_topics(),
            max_text_chars: default_max_text_chars(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_expertise_topics() -> usize {
    3
}
fn default_max_text_chars() -> usize {
    20_000
}
fn default_fetch_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> i64 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4000".to_string()
}

fn default_auto() -> String {
    "auto".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Offline configuration rooted at `db_path`, used by tests and `xg init`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                provider: "mock".to_string(),
                mock: true,
                ..EmbeddingConfig::default()
            },
            topics: TopicsConfig {
                provider: "heuristic".to_string(),
                ..TopicsConfig::default()
            },
            ingest: IngestConfig::default(),
            audit: AuditConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Path of the embedding dimension marker file.
    pub fn dim_marker_path(&self) -> PathBuf {
        match &self.embedding.dim_marker_path {
            Some(path) => path.clone(),
            None => self
                .db
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(".embed_dim"),
        }
    }

    /// Apply `XG_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("XG_EMBED_MOCK") {
            self.embedding.mock = parse_bool(&v);
        }
        if let Some(v) = lookup("XG_EMBED_FALLBACK") {
            self.embedding.fallback = parse_bool(&v);
        }
        if let Some(v) = lookup("XG_RETENTION_DAYS") {
            self.audit.retention_days = v
                .trim()
                .parse()
                .with_context(|| format!("XG_RETENTION_DAYS is not a number: {}", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.token_budget == 0 {
            bail!("chunking.token_budget must be > 0");
        }
        if !(1..=20).contains(&self.retrieval.default_top_k) {
            bail!("retrieval.default_top_k must be in [1, 20]");
        }
        if self.retrieval.expert_limit == 0 {
            bail!("retrieval.expert_limit must be >= 1");
        }
        if self.embedding.timeout_secs == 0 || self.topics.timeout_secs == 0 {
            bail!("timeout_secs must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
        if self.ingest.max_text_chars == 0 {
            bail!("ingest.max_text_chars must be > 0");
        }
        if self.audit.retention_days < 1 {
            bail!("audit.retention_days must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "auto" | "openai" | "ollama" | "mock" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be auto, openai, ollama, or mock.",
                other
            ),
        }
        match self.topics.provider.as_str() {
            "auto" | "anthropic" | "heuristic" => {}
            other => bail!(
                "Unknown topics provider: '{}'. Must be auto, anthropic, or heuristic.",
                other
            ),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Read, parse, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_defaults_from_minimal_file() {
        let config = parse("[db]\npath = \"/tmp/xg/db.sqlite\"\n");
        assert_eq!(config.chunking.token_budget, 138);
        assert_eq!(config.chunking.overlap_tokens, 18);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.distance, DistanceMetric::InnerProduct);
        assert_eq!(config.embedding.provider, "auto");
        assert!(config.embedding.fallback);
        assert_eq!(config.embedding.timeout_secs, 20);
        assert_eq!(config.audit.retention_days, 90);
        assert_eq!(config.dim_marker_path(), PathBuf::from("/tmp/xg/.embed_dim"));
        config.validate().unwrap();
    }

    #[test]
    fn test_distance_metric_parses() {
        let config = parse("[db]\npath = \"x.db\"\n[retrieval]\ndistance = \"cosine\"\n");
        assert_eq!(config.retrieval.distance, DistanceMetric::Cosine);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = parse("[db]\npath = \"x.db\"\n[embedding]\nprovider = \"bedrock\"\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bedrock"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("XG_EMBED_MOCK", "1"),
            ("XG_EMBED_FALLBACK", "false"),
            ("XG_RETENTION_DAYS", "30"),
        ]
        .into_iter()
        .collect();
        let mut config = parse("[db]\npath = \"x.db\"\n");
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert!(config.embedding.mock);
        assert!(!config.embedding.fallback);
        assert_eq!(config.audit.retention_days, 30);

        let mut config = parse("[db]\npath = \"x.db\"\n");
        assert!(config
            .apply_overrides(|name| (name == "XG_RETENTION_DAYS").then(|| "soon".to_string()))
            .is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xg.toml");
        std::fs::write(
            &path,
            "[db]\npath = \"db.sqlite\"\n[chunking]\ntoken_budget = 300\n[server]\nbind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.token_budget, 300);
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_minimal_is_offline() {
        let config = Config::minimal("/tmp/db.sqlite");
        assert!(config.embedding.mock);
        assert_eq!(config.topics.provider, "heuristic");
        config.validate().unwrap();
    }
}
