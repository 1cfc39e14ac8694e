//! Process-wide application context.
//!
//! [`App`] bundles everything an operation needs: the loaded config, the
//! store, the provider stack, the topic extractor, the audit sink, and the
//! [`SearchEngine`] built from them. The CLI builds one per command; the
//! HTTP server shares one across requests behind an `Arc`.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use expertise_graph_core::audit::{AuditRecord, AuditSink, TracingAuditSink};
use expertise_graph_core::embedding::EmbeddingProvider;
use expertise_graph_core::search::SearchEngine;
use expertise_graph_core::store::Store;
use expertise_graph_core::topics::TopicExtractor;

use crate::audit::SqliteAuditSink;
use crate::config::Config;
use crate::sqlite_store::SqliteStore;
use crate::{db, embedding, llm, migrate};

pub struct App {
    pub config: Config,
    pub engine: SearchEngine,
    audit: Arc<dyn AuditSink>,
    http: reqwest::Client,
}

impl App {
    /// Connect to the database, run migrations, and build the provider stack.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(
            pool.clone(),
            config.retrieval.distance,
        ));

        let audit: Arc<dyn AuditSink> = if config.audit.enabled {
            let sink = SqliteAuditSink::new(pool);
            if let Err(e) = sink.purge_older_than(config.audit.retention_days).await {
                tracing::warn!(error = %e, "audit retention purge failed");
            }
            Arc::new(sink)
        } else {
            Arc::new(TracingAuditSink)
        };

        let embedder = embedding::create_provider(&config, Some(store.clone()))?;
        let topics = llm::create_topic_extractor(&config)?;
        Self::from_parts(config, store, embedder, topics, audit)
    }

    /// Assemble an app from already-built parts.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        topics: TopicExtractor,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.ingest.fetch_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let engine = SearchEngine::new(store, embedder, topics)
            .with_audit(audit.clone())
            .with_settings(config.retrieval.settings());
        Ok(Self {
            config,
            engine,
            audit,
            http,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.engine.store()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        self.engine.embedder()
    }

    pub fn topics(&self) -> &TopicExtractor {
        self.engine.topics()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub async fn audit(&self, record: AuditRecord) {
        self.audit.record(record).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use expertise_graph_core::audit::NoopAuditSink;
    use expertise_graph_core::embedding::OfflineProvider;
    use expertise_graph_core::store::memory::InMemoryStore;

    /// Offline app over an in-memory store.
    pub fn memory_app() -> App {
        App::from_parts(
            Config::minimal("/tmp/xg-test/db.sqlite"),
            Arc::new(InMemoryStore::new()),
            Arc::new(OfflineProvider::default()),
            TopicExtractor::heuristic(),
            Arc::new(NoopAuditSink),
        )
        .unwrap()
    }
}
