//! Network embedding providers and provider selection.
//!
//! Implements the core [`EmbeddingProvider`] trait for:
//! - **[`OpenAiProvider`]**: `POST {url}/v1/embeddings`, bearer `OPENAI_API_KEY`.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! Plus the file-backed [`FileDimensionMarker`] and [`create_provider`],
//! which turns configuration into the process-wide provider stack.
//!
//! # Failure semantics
//!
//! Network providers never retry. Every request carries
//! `embedding.timeout_secs`; a non-2xx answer becomes
//! [`Error::ProviderStatus`] with the body cut to 200 characters, a
//! transport failure or timeout becomes [`Error::ProviderTransport`], and an
//! unreadable body becomes [`Error::ProviderResponse`]. With
//! `embedding.fallback = true` any of these is absorbed by the offline
//! provider.
//!
//! # Provider Selection
//!
//! | Config | Provider |
//! |--------|----------|
//! | `mock = true` or `provider = "mock"` | offline |
//! | `provider = "openai"` | OpenAI (requires `OPENAI_API_KEY`) |
//! | `provider = "ollama"` | Ollama |
//! | `provider = "auto"` | OpenAI when `OPENAI_API_KEY` is set, else offline |
//!
//! The result is always wrapped in a [`DimensionGuard`].

use anyhow::{bail, Context};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use expertise_graph_core::embedding::{
    DimensionGuard, DimensionMarker, EmbeddingProvider, FallbackProvider, OfflineProvider,
    OFFLINE_DIMS,
};
use expertise_graph_core::store::Store;
use expertise_graph_core::{Error, Result};

use crate::config::{Config, EmbeddingConfig};

pub const OPENAI_URL: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "text-embedding-3-small";
const OPENAI_DIMS: usize = 1536;

pub const OLLAMA_URL: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "nomic-embed-text";
const OLLAMA_DIMS: usize = 768;

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a prepared JSON request and return the parsed JSON body.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::ProviderTransport {
            provider: provider.to_string(),
            message: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            },
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::provider_status(provider, status.as_u16(), &body));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| Error::ProviderResponse {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

fn float_array(value: Option<&serde_json::Value>) -> Option<Vec<f32>> {
    let items = value?.as_array()?;
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .filter(|v| !v.is_empty())
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI embeddings API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_MODEL.to_string()),
            dims: config.dims.unwrap_or(OPENAI_DIMS),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }));
        let json = send_json("openai", request).await?;
        parse_openai_response(&json)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[0].embedding`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let first = json.get("data").and_then(|d| d.get(0));
    float_array(first.and_then(|item| item.get("embedding"))).ok_or_else(|| {
        Error::ProviderResponse {
            provider: "openai".to_string(),
            message: "missing data[0].embedding".to_string(),
        }
    })
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_MODEL.to_string()),
            dims: config.dims.unwrap_or(OLLAMA_DIMS),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&serde_json::json!({ "model": self.model, "input": text }));
        let json = send_json("ollama", request).await?;
        float_array(json.get("embeddings").and_then(|e| e.get(0))).ok_or_else(|| {
            Error::ProviderResponse {
                provider: "ollama".to_string(),
                message: "missing embeddings[0]".to_string(),
            }
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Dimension marker file ============

/// Dimension marker persisted as a small text file holding one integer.
#[derive(Debug, Clone)]
pub struct FileDimensionMarker {
    path: PathBuf,
}

impl FileDimensionMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn marker_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Store(anyhow::anyhow!(
        "dimension marker {}: {}",
        path.display(),
        err
    ))
}

impl DimensionMarker for FileDimensionMarker {
    fn get(&self) -> Result<Option<usize>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match content.trim().parse::<usize>() {
                Ok(dim) if dim > 0 => Ok(Some(dim)),
                _ => Err(marker_error(&self.path, "not a positive integer")),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(marker_error(&self.path, e)),
        }
    }

    fn set_if_absent(&self, dim: usize) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| marker_error(&self.path, e))?;
            }
        }
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(marker_error(&self.path, e)),
        };
        file.write_all(dim.to_string().as_bytes())
            .map_err(|e| marker_error(&self.path, e))?;
        Ok(true)
    }
}

// ============ Selection ============

/// Build the provider stack from configuration and the environment.
pub fn create_provider(
    config: &Config,
    store: Option<Arc<dyn Store>>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());
    create_provider_with_key(config, api_key, store)
}

/// [`create_provider`] with an explicit OpenAI key.
pub fn create_provider_with_key(
    config: &Config,
    openai_key: Option<String>,
    store: Option<Arc<dyn Store>>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let base = select_base(&config.embedding, openai_key)?;
    let marker = Arc::new(FileDimensionMarker::new(config.dim_marker_path()));
    let guard = DimensionGuard::new(base, marker, store)
        .context("Failed to read embedding dimension marker")?;
    tracing::info!(
        model = guard.model_name(),
        dim = guard.dims(),
        "embedding provider ready"
    );
    Ok(Arc::new(guard))
}

fn select_base(
    config: &EmbeddingConfig,
    openai_key: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let offline = || -> Arc<dyn EmbeddingProvider> { Arc::new(OfflineProvider::new(OFFLINE_DIMS)) };

    if config.mock || config.provider == "mock" {
        return Ok(offline());
    }

    let primary: Arc<dyn EmbeddingProvider> = match (config.provider.as_str(), openai_key) {
        ("openai" | "auto", Some(key)) => Arc::new(OpenAiProvider::new(config, key)?),
        ("openai", None) => bail!("OPENAI_API_KEY environment variable not set"),
        ("auto", None) => return Ok(offline()),
        ("ollama", _) => Arc::new(OllamaProvider::new(config)?),
        (other, _) => bail!("Unknown embedding provider: {}", other),
    };

    if config.fallback {
        Ok(Arc::new(FallbackProvider::new(primary, offline())))
    } else {
        Ok(primary)
    }
}
