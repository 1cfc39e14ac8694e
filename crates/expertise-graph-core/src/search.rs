//! Retrieval orchestrator: semantic search plus expert ranking.
//!
//! [`SearchEngine`] composes an [`EmbeddingProvider`], a [`Store`], and a
//! [`TopicExtractor`]. It holds no database or configuration dependencies
//! of its own; the application builds it once and shares it.
//!
//! # Search pipeline
//!
//! 1. Validate the query (non-empty) and `top_k` (`1..=20`).
//! 2. Embed the query and record the embedding latency.
//! 3. Fetch the `top_k` nearest chunks from the store.
//! 4. Project each hit to a [`Snippet`] of at most 200 characters.
//! 5. Extract candidate topics from the query plus the snippet texts.
//!
//! # Expert ranking
//!
//! Scores for the candidate topics are aggregated per person (best score,
//! freshest observation) and ranked by `score / (1 + freshness_days / 30)`.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditRecord, AuditSink, NoopAuditSink};
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{truncate_chars, CandidateTopic, Expert, Snippet, DISPLAY_SNIPPET_CHARS};
use crate::scoring::aggregate_experts;
use crate::store::Store;
use crate::topics::TopicExtractor;

/// Largest accepted `top_k` for search.
pub const MAX_SEARCH_TOP_K: usize = 20;
/// Largest accepted `top_k` for expert matching.
pub const MAX_MATCH_TOP_K: usize = 10;

/// Tuning knobs, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    /// Topics extracted per search.
    pub max_topics: usize,
    /// Experts returned per search.
    pub expert_limit: usize,
    /// Topics extracted from a match problem.
    pub match_topics: usize,
    /// Ranked experts considered before match filters apply.
    pub match_candidates: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_topics: 8,
            expert_limit: 10,
            match_topics: 6,
            match_candidates: 30,
        }
    }
}

/// Result of [`SearchEngine::search`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub snippets: Vec<Snippet>,
    pub candidate_topics: Vec<CandidateTopic>,
    /// Query embedding latency in milliseconds.
    #[serde(skip)]
    pub embed_ms: u64,
}

/// Result of [`SearchEngine::search_with_experts`]; the search API response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub snippets: Vec<Snippet>,
    pub candidate_topics: Vec<CandidateTopic>,
    pub experts: Vec<Expert>,
}

/// Filters for [`SearchEngine::match_experts`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFilter {
    #[serde(default = "default_match_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub max_freshness_days: Option<i64>,
}

fn default_match_top_k() -> usize {
    5
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self {
            top_k: default_match_top_k(),
            min_score: None,
            max_freshness_days: None,
        }
    }
}

/// Result of [`SearchEngine::match_experts`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    pub topics: Vec<CandidateTopic>,
    pub experts: Vec<Expert>,
}

/// Semantic search and expert ranking over a [`Store`].
#[derive(Clone)]
pub struct SearchEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    topics: TopicExtractor,
    audit: Arc<dyn AuditSink>,
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        topics: TopicExtractor,
    ) -> Self {
        Self {
            store,
            embedder,
            topics,
            audit: Arc::new(NoopAuditSink),
            settings: SearchSettings::default(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: SearchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn topics(&self) -> &TopicExtractor {
        &self.topics
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Embed `query`, fetch the nearest chunks, and extract candidate topics.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchOutcome> {
        validate_search(query, top_k)?;

        let started = Instant::now();
        let vector = self.embedder.embed(query).await?;
        let embed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            model = self.embedder.model_name(),
            dim = vector.len(),
            ms = embed_ms,
            "embedded query"
        );
        self.audit
            .record(
                AuditRecord::new("search.embed", true, embed_ms).details(json!({
                    "model": self.embedder.model_name(),
                    "dim": vector.len(),
                })),
            )
            .await;

        let hits = self.store.vector_search(&vector, top_k).await?;
        let snippets: Vec<Snippet> = hits
            .into_iter()
            .map(|hit| Snippet {
                text: truncate_chars(&hit.text, DISPLAY_SNIPPET_CHARS),
                source: hit.title,
                doc_id: hit.document_id,
            })
            .collect();

        let mut topic_text = String::from(query);
        for snippet in &snippets {
            topic_text.push(' ');
            topic_text.push_str(&snippet.text);
        }
        let candidate_topics = self
            .topics
            .extract(&topic_text, self.settings.max_topics)
            .await;

        tracing::debug!(
            count = snippets.len(),
            topics = candidate_topics.len(),
            "search complete"
        );
        Ok(SearchOutcome {
            snippets,
            candidate_topics,
            embed_ms,
        })
    }

    /// Rank people by their expertise in `topics`.
    pub async fn rank_experts(
        &self,
        topics: &[CandidateTopic],
        limit: usize,
    ) -> Result<Vec<Expert>> {
        let names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();
        if names.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let rows = self.store.expertise_for_topics(&names).await?;
        Ok(aggregate_experts(&rows, limit))
    }

    /// [`search`](Self::search) followed by [`rank_experts`](Self::rank_experts).
    pub async fn search_with_experts(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        let outcome = self.search(query, top_k).await?;
        let experts = self
            .rank_experts(&outcome.candidate_topics, self.settings.expert_limit)
            .await?;
        Ok(SearchResponse {
            snippets: outcome.snippets,
            candidate_topics: outcome.candidate_topics,
            experts,
        })
    }

    /// Find the people best placed to help with `problem`.
    pub async fn match_experts(&self, problem: &str, filter: &MatchFilter) -> Result<MatchOutcome> {
        if problem.trim().is_empty() {
            return Err(Error::input("problem must not be empty"));
        }
        if !(1..=MAX_MATCH_TOP_K).contains(&filter.top_k) {
            return Err(Error::input(format!(
                "topK must be between 1 and {}",
                MAX_MATCH_TOP_K
            )));
        }
        if let Some(min) = filter.min_score {
            if !(0.0..=1.0).contains(&min) {
                return Err(Error::input("minScore must be between 0 and 1"));
            }
        }
        if filter.max_freshness_days.is_some_and(|d| d < 0) {
            return Err(Error::input("maxFreshnessDays must not be negative"));
        }

        let topics = self
            .topics
            .extract(problem, self.settings.match_topics)
            .await;
        let experts = self
            .rank_experts(&topics, self.settings.match_candidates)
            .await?
            .into_iter()
            .filter(|e| filter.min_score.is_none_or(|min| e.score >= min))
            .filter(|e| {
                filter
                    .max_freshness_days
                    .is_none_or(|max| e.freshness_days <= max)
            })
            .take(filter.top_k)
            .collect();

        Ok(MatchOutcome { topics, experts })
    }
}

fn validate_search(query: &str, top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::input("queryText must not be empty"));
    }
    if !(1..=MAX_SEARCH_TOP_K).contains(&top_k) {
        return Err(Error::input(format!(
            "topK must be between 1 and {}",
            MAX_SEARCH_TOP_K
        )));
    }
    Ok(())
}
