//! Storage abstraction for Expertise Graph.
//!
//! The [`Store`] trait covers everything the retrieval pipeline and the
//! expertise engine persist: documents with their embedded chunks, the
//! declared vector width, topics, people, and expertise scores.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//! Multi-row writes ([`insert_document`](Store::insert_document),
//! [`record_observations`](Store::record_observations),
//! [`erase_person`](Store::erase_person)) are atomic: either every row is
//! written or none is.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{CandidateTopic, Chunk, Document, ExpertiseScore, Person, Topic};

/// A chunk returned from vector search, joined with its parent document title.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    /// Stored chunk text (at most 400 characters).
    pub text: String,
    /// Metric distance to the query; smaller is closer.
    pub distance: f32,
}

/// One expertise score joined with the person's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpertiseRow {
    pub person_id: String,
    /// `None` when the person was never registered.
    pub person_name: Option<String>,
    pub topic: String,
    pub score: f64,
    pub freshness_days: i64,
}

/// Stored chunk text of one of a person's documents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnippet {
    pub doc_id: String,
    pub chunk_index: i64,
    pub text: String,
}

/// Everything held about one person.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonExport {
    pub person_id: String,
    pub topics: Vec<ExpertiseScore>,
    pub documents: Vec<Document>,
    pub snippets: Vec<ExportSnippet>,
}

/// Row counts affected by [`Store::erase_person`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErasureReport {
    pub scores_deleted: u64,
    pub chunks_deleted: u64,
    pub documents_anonymized: u64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](Store::insert_document) | Write a document and its embedded chunks atomically |
/// | [`vector_dim`](Store::vector_dim) | Declared chunk vector width |
/// | [`set_vector_dim_if_empty`](Store::set_vector_dim_if_empty) | Change the width while no chunks exist |
/// | [`vector_search`](Store::vector_search) | Nearest chunks to a query vector |
/// | [`find_or_create_topic`](Store::find_or_create_topic) | Canonical topic lookup |
/// | [`record_observations`](Store::record_observations) | Apply topic observations to a person |
/// | [`expertise_for_topics`](Store::expertise_for_topics) | Scores for a set of topic names |
/// | [`age_expertise`](Store::age_expertise) | Advance freshness of every score |
/// | [`erase_person`](Store::erase_person) | Data-subject erasure |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document with its chunks and one vector per chunk, in chunk order.
    ///
    /// When no width is declared yet, the first vector's length becomes the
    /// declared width. Any vector of a different width fails with
    /// [`Error::DimensionMismatch`](crate::Error::DimensionMismatch) and
    /// nothing is written.
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Declared chunk vector width, if any.
    async fn vector_dim(&self) -> Result<Option<usize>>;

    /// Set the declared width when the chunk table is empty.
    ///
    /// Returns `false` without changing anything when chunks exist or the
    /// width already equals `dim`.
    async fn set_vector_dim_if_empty(&self, dim: usize) -> Result<bool>;

    async fn chunk_count(&self) -> Result<i64>;

    /// Up to `top_k` chunks ordered by ascending distance. Ties keep insertion order.
    async fn vector_search(&self, query: &[f32], top_k: usize) -> Result<Vec<ChunkHit>>;

    /// Look a topic up by canonical name (case-insensitive), creating it if missing.
    async fn find_or_create_topic(&self, name: &str) -> Result<Topic>;

    /// Apply [`merge_score`](crate::scoring::merge_score) for every candidate
    /// topic and reset its freshness, atomically. Returns the new scores in
    /// input order.
    async fn record_observations(
        &self,
        person_id: &str,
        topics: &[CandidateTopic],
    ) -> Result<Vec<ExpertiseScore>>;

    /// Single-topic form of [`record_observations`](Store::record_observations).
    async fn upsert_expertise(
        &self,
        person_id: &str,
        topic: &str,
        confidence: f64,
    ) -> Result<ExpertiseScore> {
        let observed = [CandidateTopic {
            name: topic.to_string(),
            confidence,
        }];
        self.record_observations(person_id, &observed)
            .await?
            .pop()
            .ok_or_else(|| crate::Error::NotFound(format!("topic '{}'", topic)))
    }

    /// Every score whose topic matches one of `names` (case-insensitive).
    async fn expertise_for_topics(&self, names: &[String]) -> Result<Vec<ExpertiseRow>>;

    /// A person's scores, highest first.
    async fn person_expertise(&self, person_id: &str) -> Result<Vec<ExpertiseScore>>;

    /// The `limit` highest scores for one topic, highest first.
    async fn topic_experts(&self, topic: &str, limit: usize) -> Result<Vec<ExpertiseRow>>;

    /// Add `days` to every score's freshness. Returns the number of rows aged.
    async fn age_expertise(&self, days: i64) -> Result<u64>;

    async fn upsert_person(&self, person: &Person) -> Result<()>;

    async fn export_person(&self, person_id: &str) -> Result<PersonExport>;

    /// Delete the person's scores and the chunks of their documents, and
    /// anonymize the documents themselves.
    async fn erase_person(&self, person_id: &str) -> Result<ErasureReport>;
}

/// Title written over erased documents.
pub const REDACTED_TITLE: &str = "[redacted]";
