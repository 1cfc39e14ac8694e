//! In-memory [`Store`] implementation for tests and embedded use.
//!
//! All state lives in one struct behind `std::sync::RwLock`, so every
//! operation is atomic with respect to the others. Vector search is a
//! brute-force scan using the configured [`DistanceMetric`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{
    canonical_topic_name, truncate_chars, CandidateTopic, Chunk, Document, ExpertiseScore, Person,
    Topic, STORED_SNIPPET_CHARS,
};
use crate::scoring::merge_score;
use crate::vector::DistanceMetric;

use super::{
    ChunkHit, ErasureReport, ExpertiseRow, ExportSnippet, PersonExport, Store, REDACTED_TITLE,
};

struct StoredChunk {
    id: String,
    document_id: String,
    chunk_index: i64,
    text: String,
    vector: Vec<f32>,
}

struct StoredScore {
    person_id: String,
    topic_id: i64,
    score: f64,
    freshness_days: i64,
}

#[derive(Default)]
struct State {
    documents: Vec<Document>,
    chunks: Vec<StoredChunk>,
    vector_dim: Option<usize>,
    topics: Vec<Topic>,
    people: HashMap<String, String>,
    scores: Vec<StoredScore>,
}

impl State {
    fn topic_by_key(&self, key: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name.to_lowercase() == key)
    }

    fn topic_name(&self, id: i64) -> String {
        self.topics
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.name.clone())
            .unwrap_or_default()
    }

    fn find_or_create_topic(&mut self, name: &str) -> Result<Topic> {
        let canonical = canonical_topic_name(name);
        if canonical.is_empty() {
            return Err(Error::input("topic name must not be empty"));
        }
        if let Some(topic) = self.topic_by_key(&canonical.to_lowercase()) {
            return Ok(topic.clone());
        }
        let topic = Topic {
            id: self.topics.len() as i64 + 1,
            name: canonical,
        };
        self.topics.push(topic.clone());
        Ok(topic)
    }

    fn row(&self, s: &StoredScore) -> ExpertiseRow {
        ExpertiseRow {
            person_id: s.person_id.clone(),
            person_name: self.people.get(&s.person_id).cloned(),
            topic: self.topic_name(s.topic_id),
            score: s.score,
            freshness_days: s.freshness_days,
        }
    }

    fn person_scores(&self, person_id: &str) -> Vec<ExpertiseScore> {
        let mut scores: Vec<ExpertiseScore> = self
            .scores
            .iter()
            .filter(|s| s.person_id == person_id)
            .map(|s| ExpertiseScore {
                person_id: s.person_id.clone(),
                topic: self.topic_name(s.topic_id),
                score: s.score,
                freshness_days: s.freshness_days,
            })
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.topic.cmp(&b.topic))
        });
        scores
    }
}

/// In-memory store.
pub struct InMemoryStore {
    state: RwLock<State>,
    metric: DistanceMetric,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_metric(DistanceMetric::default())
    }

    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self {
            state: RwLock::new(State::default()),
            metric,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Store(anyhow::anyhow!("in-memory store lock poisoned")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Store(anyhow::anyhow!("in-memory store lock poisoned")))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::input(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let mut state = self.write()?;

        let declared = state.vector_dim.or_else(|| vectors.first().map(Vec::len));
        if let Some(expected) = declared {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        state.vector_dim = declared;
        state.documents.push(doc.clone());
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            state.chunks.push(StoredChunk {
                id: chunk.id.clone(),
                document_id: doc.id.clone(),
                chunk_index: chunk.chunk_index,
                text: truncate_chars(&chunk.text, STORED_SNIPPET_CHARS),
                vector: vector.clone(),
            });
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let state = self.read()?;
        Ok(state.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn vector_dim(&self) -> Result<Option<usize>> {
        Ok(self.read()?.vector_dim)
    }

    async fn set_vector_dim_if_empty(&self, dim: usize) -> Result<bool> {
        let mut state = self.write()?;
        if !state.chunks.is_empty() || state.vector_dim == Some(dim) {
            return Ok(false);
        }
        state.vector_dim = Some(dim);
        Ok(true)
    }

    async fn chunk_count(&self) -> Result<i64> {
        Ok(self.read()?.chunks.len() as i64)
    }

    async fn vector_search(&self, query: &[f32], top_k: usize) -> Result<Vec<ChunkHit>> {
        let state = self.read()?;
        let Some(expected) = state.vector_dim else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        let mut hits: Vec<ChunkHit> = state
            .chunks
            .iter()
            .map(|c| ChunkHit {
                chunk_id: c.id.clone(),
                document_id: c.document_id.clone(),
                title: state
                    .documents
                    .iter()
                    .find(|d| d.id == c.document_id)
                    .map(|d| d.title.clone())
                    .unwrap_or_default(),
                text: c.text.clone(),
                distance: self.metric.distance(query, &c.vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn find_or_create_topic(&self, name: &str) -> Result<Topic> {
        self.write()?.find_or_create_topic(name)
    }

    async fn record_observations(
        &self,
        person_id: &str,
        topics: &[CandidateTopic],
    ) -> Result<Vec<ExpertiseScore>> {
        if topics.iter().any(|t| canonical_topic_name(&t.name).is_empty()) {
            return Err(Error::input("topic name must not be empty"));
        }
        let mut state = self.write()?;
        let mut updated = Vec::with_capacity(topics.len());

        for candidate in topics {
            let topic = state.find_or_create_topic(&candidate.name)?;
            let existing = state
                .scores
                .iter_mut()
                .find(|s| s.person_id == person_id && s.topic_id == topic.id);
            let score = match existing {
                Some(s) => {
                    s.score = merge_score(Some(s.score), candidate.confidence);
                    s.freshness_days = 0;
                    s.score
                }
                None => {
                    let score = merge_score(None, candidate.confidence);
                    state.scores.push(StoredScore {
                        person_id: person_id.to_string(),
                        topic_id: topic.id,
                        score,
                        freshness_days: 0,
                    });
                    score
                }
            };
            updated.push(ExpertiseScore {
                person_id: person_id.to_string(),
                topic: topic.name,
                score,
                freshness_days: 0,
            });
        }
        Ok(updated)
    }

    async fn expertise_for_topics(&self, names: &[String]) -> Result<Vec<ExpertiseRow>> {
        let state = self.read()?;
        let keys: HashSet<String> = names
            .iter()
            .map(|n| canonical_topic_name(n).to_lowercase())
            .collect();
        let topic_ids: HashSet<i64> = state
            .topics
            .iter()
            .filter(|t| keys.contains(&t.name.to_lowercase()))
            .map(|t| t.id)
            .collect();
        Ok(state
            .scores
            .iter()
            .filter(|s| topic_ids.contains(&s.topic_id))
            .map(|s| state.row(s))
            .collect())
    }

    async fn person_expertise(&self, person_id: &str) -> Result<Vec<ExpertiseScore>> {
        Ok(self.read()?.person_scores(person_id))
    }

    async fn topic_experts(&self, topic: &str, limit: usize) -> Result<Vec<ExpertiseRow>> {
        let state = self.read()?;
        let key = canonical_topic_name(topic).to_lowercase();
        let Some(topic_id) = state.topic_by_key(&key).map(|t| t.id) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<ExpertiseRow> = state
            .scores
            .iter()
            .filter(|s| s.topic_id == topic_id)
            .map(|s| state.row(s))
            .collect();
        rows.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.person_id.cmp(&b.person_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn age_expertise(&self, days: i64) -> Result<u64> {
        if days < 0 {
            return Err(Error::input("days must not be negative"));
        }
        let mut state = self.write()?;
        for s in state.scores.iter_mut() {
            s.freshness_days += days;
        }
        Ok(state.scores.len() as u64)
    }

    async fn upsert_person(&self, person: &Person) -> Result<()> {
        self.write()?
            .people
            .insert(person.id.clone(), person.name.clone());
        Ok(())
    }

    async fn export_person(&self, person_id: &str) -> Result<PersonExport> {
        let state = self.read()?;
        let documents: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| d.person_id.as_deref() == Some(person_id))
            .cloned()
            .collect();
        let doc_ids: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let snippets = state
            .chunks
            .iter()
            .filter(|c| doc_ids.contains(c.document_id.as_str()))
            .map(|c| ExportSnippet {
                doc_id: c.document_id.clone(),
                chunk_index: c.chunk_index,
                text: c.text.clone(),
            })
            .collect();

        Ok(PersonExport {
            person_id: person_id.to_string(),
            topics: state.person_scores(person_id),
            documents,
            snippets,
        })
    }

    async fn erase_person(&self, person_id: &str) -> Result<ErasureReport> {
        let mut state = self.write()?;
        let mut report = ErasureReport::default();

        let before = state.scores.len();
        state.scores.retain(|s| s.person_id != person_id);
        report.scores_deleted = (before - state.scores.len()) as u64;

        let owned: HashSet<String> = state
            .documents
            .iter()
            .filter(|d| d.person_id.as_deref() == Some(person_id))
            .map(|d| d.id.clone())
            .collect();

        let before = state.chunks.len();
        state.chunks.retain(|c| !owned.contains(&c.document_id));
        report.chunks_deleted = (before - state.chunks.len()) as u64;

        for doc in state.documents.iter_mut().filter(|d| owned.contains(&d.id)) {
            doc.person_id = None;
            doc.title = REDACTED_TITLE.to_string();
            doc.source_url = None;
        }
        report.documents_anonymized = owned.len() as u64;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;

    fn doc(id: &str, person: &str, title: &str) -> Document {
        Document {
            id: id.to_string(),
            person_id: Some(person.to_string()),
            title: title.to_string(),
            source_url: Some("https://wiki.example/page".to_string()),
            visibility: Visibility::Private,
            created_at: 1_700_000_000,
        }
    }

    fn chunk(doc_id: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("{}-{}", doc_id, index),
            document_id: doc_id.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    fn topic(name: &str, confidence: f64) -> CandidateTopic {
        CandidateTopic {
            name: name.to_string(),
            confidence,
        }
    }

    #[tokio::test]
    async fn test_first_insert_declares_width() {
        let store = InMemoryStore::new();
        assert_eq!(store.vector_dim().await.unwrap(), None);
        store
            .insert_document(&doc("d1", "p1", "A"), &[chunk("d1", 0, "x")], &[vec![1.0, 0.0]])
            .await
            .unwrap();
        assert_eq!(store.vector_dim().await.unwrap(), Some(2));
        assert_eq!(store.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mismatched_vector_rolls_back_document() {
        let store = InMemoryStore::new();
        store.set_vector_dim_if_empty(3).await.unwrap();
        let err = store
            .insert_document(
                &doc("d1", "p1", "A"),
                &[chunk("d1", 0, "x"), chunk("d1", 1, "y")],
                &[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.chunk_count().await.unwrap(), 0);
        assert!(store.get_document("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_width_change_only_while_empty() {
        let store = InMemoryStore::new();
        assert!(store.set_vector_dim_if_empty(4).await.unwrap());
        assert!(!store.set_vector_dim_if_empty(4).await.unwrap());
        store
            .insert_document(&doc("d1", "p1", "A"), &[chunk("d1", 0, "x")], &[vec![0.0; 4]])
            .await
            .unwrap();
        assert!(!store.set_vector_dim_if_empty(8).await.unwrap());
        assert_eq!(store.vector_dim().await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_vector_search_orders_and_joins_title() {
        let store = InMemoryStore::new();
        store
            .insert_document(
                &doc("d1", "p1", "Caching"),
                &[chunk("d1", 0, "far"), chunk("d1", 1, "near")],
                &[vec![-1.0, 0.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap();
        let hits = store.vector_search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "near");
        assert_eq!(hits[0].title, "Caching");
        assert!(hits[0].distance < hits[1].distance);

        let err = store.vector_search(&[1.0], 5).await.unwrap_err();
        assert_eq!(err.category(), "dimension_mismatch");
    }

    #[tokio::test]
    async fn test_vector_search_ties_keep_insertion_order() {
        let store = InMemoryStore::with_metric(DistanceMetric::Cosine);
        let chunks: Vec<Chunk> = (0..4).map(|i| chunk("d1", i, &format!("c{}", i))).collect();
        let vectors = vec![vec![1.0, 0.0]; 4];
        store
            .insert_document(&doc("d1", "p1", "T"), &chunks, &vectors)
            .await
            .unwrap();
        let hits = store.vector_search(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_stored_text_truncated() {
        let store = InMemoryStore::new();
        let long = "é".repeat(900);
        store
            .insert_document(&doc("d1", "p1", "T"), &[chunk("d1", 0, &long)], &[vec![1.0]])
            .await
            .unwrap();
        let hits = store.vector_search(&[1.0], 1).await.unwrap();
        assert_eq!(hits[0].text.chars().count(), STORED_SNIPPET_CHARS);
    }

    #[tokio::test]
    async fn test_topic_find_or_create_case_insensitive() {
        let store = InMemoryStore::new();
        let a = store.find_or_create_topic("  Machine   Learning ").await.unwrap();
        let b = store.find_or_create_topic("machine learning").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "Machine Learning");
        assert!(store.find_or_create_topic("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_record_observations_applies_decay() {
        let store = InMemoryStore::new();
        store
            .record_observations("p1", &[topic("Kafka", 0.8)])
            .await
            .unwrap();
        store.age_expertise(12).await.unwrap();

        let updated = store
            .record_observations("p1", &[topic("kafka", 0.5), topic("Flink", 0.6)])
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!((updated[0].score - 0.72).abs() < 1e-9);
        assert_eq!(updated[0].topic, "Kafka");
        assert_eq!(updated[0].freshness_days, 0);

        let listed = store.person_expertise("p1").await.unwrap();
        assert_eq!(listed[0].topic, "Kafka");
        assert_eq!(listed[0].freshness_days, 0);
        assert_eq!(listed[1].topic, "Flink");
    }

    #[tokio::test]
    async fn test_upsert_expertise_single_topic() {
        let store = InMemoryStore::new();
        let s = store.upsert_expertise("p1", "Rust", 0.4).await.unwrap();
        assert_eq!(s.score, 0.4);
        let s = store.upsert_expertise("p1", "Rust", 0.9).await.unwrap();
        assert_eq!(s.score, 0.9);
    }

    #[tokio::test]
    async fn test_expertise_for_topics_joins_names() {
        let store = InMemoryStore::new();
        store
            .upsert_person(&Person {
                id: "p1".into(),
                name: "Ada".into(),
            })
            .await
            .unwrap();
        store.upsert_expertise("p1", "Rust", 0.7).await.unwrap();
        store.upsert_expertise("p2", "Rust", 0.5).await.unwrap();
        store.upsert_expertise("p2", "Go", 0.5).await.unwrap();

        let mut rows = store
            .expertise_for_topics(&["rust".to_string()])
            .await
            .unwrap();
        rows.sort_by(|a, b| a.person_id.cmp(&b.person_id));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].person_name.as_deref(), Some("Ada"));
        assert_eq!(rows[1].person_name, None);
    }

    #[tokio::test]
    async fn test_erase_person_keeps_anonymized_documents() {
        let store = InMemoryStore::new();
        store
            .insert_document(&doc("d1", "p1", "Mine"), &[chunk("d1", 0, "x")], &[vec![1.0]])
            .await
            .unwrap();
        store
            .insert_document(&doc("d2", "p2", "Theirs"), &[chunk("d2", 0, "y")], &[vec![1.0]])
            .await
            .unwrap();
        store.upsert_expertise("p1", "Rust", 0.7).await.unwrap();

        let export = store.export_person("p1").await.unwrap();
        assert_eq!(export.documents.len(), 1);
        assert_eq!(export.snippets.len(), 1);
        assert_eq!(export.topics.len(), 1);

        let report = store.erase_person("p1").await.unwrap();
        assert_eq!(
            report,
            ErasureReport {
                scores_deleted: 1,
                chunks_deleted: 1,
                documents_anonymized: 1
            }
        );
        let d1 = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(d1.title, REDACTED_TITLE);
        assert_eq!(d1.person_id, None);
        assert_eq!(d1.source_url, None);
        assert_eq!(store.chunk_count().await.unwrap(), 1);
        assert!(store.person_expertise("p1").await.unwrap().is_empty());
    }
}
