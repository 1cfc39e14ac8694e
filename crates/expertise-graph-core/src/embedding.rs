//! Embedding provider trait and composable providers.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus the backends and decorators that need no network:
//!
//! | Type | Role |
//! |------|------|
//! | [`OfflineProvider`] | Deterministic pseudo-random vectors, model `mock` |
//! | [`FallbackProvider`] | Tries a primary, falls back to a secondary on any error |
//! | [`DimensionGuard`] | Pins every output to the persisted dimension |
//!
//! Network providers (OpenAI, Ollama) and the file-backed
//! [`DimensionMarker`] live in the `expertise-graph` app crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::vector::reconcile;

/// Model name reported by [`OfflineProvider`].
pub const OFFLINE_MODEL: &str = "mock";
/// Default output width of [`OfflineProvider`].
pub const OFFLINE_DIMS: usize = 256;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Expected vector width. `0` when unknown until the first call.
    fn dims(&self) -> usize;

    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
}

// ============ Offline ============

/// Deterministic offline provider.
///
/// The text is hashed over its UTF-16 code units into a 32-bit seed which
/// drives a mulberry32 generator; each component is a uniform value in
/// `[0, 1)`. Identical text and width always produce identical vectors.
#[derive(Debug, Clone)]
pub struct OfflineProvider {
    dims: usize,
}

impl OfflineProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut rng = Mulberry32::new(seed_hash(text));
        (0..self.dims).map(|_| rng.next_f32()).collect()
    }
}

impl Default for OfflineProvider {
    fn default() -> Self {
        Self::new(OFFLINE_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        OFFLINE_MODEL
    }
}

/// FNV-style 32-bit hash over UTF-16 code units.
fn seed_hash(text: &str) -> u32 {
    let mut h: u32 = 2_166_136_261;
    for unit in text.encode_utf16() {
        h ^= u32::from(unit);
        h = h
            .wrapping_add(h << 1)
            .wrapping_add(h << 4)
            .wrapping_add(h << 7)
            .wrapping_add(h << 8)
            .wrapping_add(h << 24);
    }
    h
}

struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next_f32(&mut self) -> f32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        (f64::from(t ^ (t >> 14)) / 4_294_967_296.0) as f32
    }
}

// ============ Fallback ============

/// Composite provider: on any primary error, use the secondary.
///
/// The fallback is logged with the primary's model name and the error
/// category only. An error from the secondary propagates.
pub struct FallbackProvider {
    primary: Arc<dyn EmbeddingProvider>,
    secondary: Arc<dyn EmbeddingProvider>,
    model: String,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn EmbeddingProvider>, secondary: Arc<dyn EmbeddingProvider>) -> Self {
        let model = format!("{}|fallback", primary.model_name());
        Self {
            primary,
            secondary,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FallbackProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.primary.embed(text).await {
            Ok(vec) => Ok(vec),
            Err(e) => {
                tracing::warn!(
                    model = self.primary.model_name(),
                    category = e.category(),
                    fallback = self.secondary.model_name(),
                    "embedding provider failed, using fallback"
                );
                self.secondary.embed(text).await
            }
        }
    }

    fn dims(&self) -> usize {
        match self.primary.dims() {
            0 => self.secondary.dims(),
            d => d,
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Dimension marker ============

/// Persisted, write-once record of the embedding width in use.
pub trait DimensionMarker: Send + Sync {
    fn get(&self) -> Result<Option<usize>>;

    /// Record `dim` unless a value already exists. Returns whether it was written.
    fn set_if_absent(&self, dim: usize) -> Result<bool>;
}

/// Process-local marker.
#[derive(Debug, Default)]
pub struct MemoryDimensionMarker {
    value: Mutex<Option<usize>>,
}

impl MemoryDimensionMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(dim: usize) -> Self {
        Self {
            value: Mutex::new(Some(dim)),
        }
    }
}

impl DimensionMarker for MemoryDimensionMarker {
    fn get(&self) -> Result<Option<usize>> {
        let value = self
            .value
            .lock()
            .map_err(|_| Error::Store(anyhow::anyhow!("dimension marker lock poisoned")))?;
        Ok(*value)
    }

    fn set_if_absent(&self, dim: usize) -> Result<bool> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| Error::Store(anyhow::anyhow!("dimension marker lock poisoned")))?;
        if value.is_some() {
            return Ok(false);
        }
        *value = Some(dim);
        Ok(true)
    }
}

// ============ Dimension guard ============

/// Decorator that keeps every embedding at the persisted width.
///
/// With a marker value `D`, outputs are truncated or zero-padded to `D`.
/// Without one, the first successful output's length is recorded in the
/// marker and, when a store is attached and holds no chunks yet, the
/// store's declared vector width is migrated to match. Migration problems
/// are logged and never fail `embed`.
pub struct DimensionGuard {
    inner: Arc<dyn EmbeddingProvider>,
    marker: Arc<dyn DimensionMarker>,
    store: Option<Arc<dyn Store>>,
    pinned: Mutex<Option<usize>>,
}

impl DimensionGuard {
    /// Wrap `inner`, reading the marker once.
    pub fn new(
        inner: Arc<dyn EmbeddingProvider>,
        marker: Arc<dyn DimensionMarker>,
        store: Option<Arc<dyn Store>>,
    ) -> Result<Self> {
        let pinned = marker.get()?;
        Ok(Self {
            inner,
            marker,
            store,
            pinned: Mutex::new(pinned),
        })
    }

    fn pinned(&self) -> Option<usize> {
        self.pinned.lock().ok().and_then(|p| *p)
    }

    fn pin(&self, dim: usize) {
        if let Ok(mut p) = self.pinned.lock() {
            *p = Some(dim);
        }
    }

    /// Record the first observed width. Returns the width now in force.
    async fn declare(&self, observed: usize) -> Option<usize> {
        let written = match self.marker.set_if_absent(observed) {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(dim = observed, category = e.category(), "could not write dimension marker");
                return None;
            }
        };
        let dim = if written {
            observed
        } else {
            // Another writer got there first.
            match self.marker.get() {
                Ok(Some(existing)) => existing,
                _ => observed,
            }
        };
        self.pin(dim);

        if written {
            tracing::info!(dim, model = self.inner.model_name(), "recorded embedding dimension");
            if let Some(store) = &self.store {
                self.migrate_store(store.as_ref(), dim).await;
            }
        }
        Some(dim)
    }

    async fn migrate_store(&self, store: &dyn Store, dim: usize) {
        match store.set_vector_dim_if_empty(dim).await {
            Ok(true) => tracing::info!(dim, "migrated chunk vector width"),
            Ok(false) => tracing::debug!(dim, "chunk vector width unchanged"),
            Err(e) => tracing::warn!(dim, category = e.category(), "chunk vector width migration failed"),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for DimensionGuard {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vec = self.inner.embed(text).await?;
        let dim = match self.pinned() {
            Some(dim) => Some(dim),
            None => self.declare(vec.len()).await,
        };
        Ok(match dim {
            Some(dim) => reconcile(vec, dim),
            None => vec,
        })
    }

    fn dims(&self) -> usize {
        self.pinned().unwrap_or_else(|| self.inner.dims())
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
