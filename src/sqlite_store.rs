//! SQLite-backed [`Store`] implementation.
//!
//! Chunk embeddings are kept as text literals (see
//! [`to_literal`](expertise_graph_core::vector::to_literal)) and searched by
//! a brute-force scan in insertion order. The declared vector width lives in
//! `vector_meta` under the key `embedding_dim`.
//!
//! Multi-row writes run inside a single `pool.begin()` transaction; an
//! early return drops the transaction, which rolls it back.

use std::cmp::Ordering;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use expertise_graph_core::models::{
    canonical_topic_name, truncate_chars, CandidateTopic, Chunk, Document, ExpertiseScore, Person,
    Topic, Visibility, STORED_SNIPPET_CHARS,
};
use expertise_graph_core::scoring::merge_score;
use expertise_graph_core::store::{
    ChunkHit, ErasureReport, ExpertiseRow, ExportSnippet, PersonExport, Store, REDACTED_TITLE,
};
use expertise_graph_core::vector::{parse_literal, to_literal, DistanceMetric};
use expertise_graph_core::Error;

const DIM_KEY: &str = "embedding_dim";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    metric: DistanceMetric,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, metric: DistanceMetric) -> Self {
        Self { pool, metric }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_document_tx(
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
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;

        let declared = declared_dim(&mut tx).await?;
        let expected = declared.or_else(|| vectors.first().map(Vec::len));
        if let Some(expected) = expected {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                }
                .into());
            }
            if declared.is_none() {
                write_dim(&mut tx, expected).await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, person_id, title, source_url, visibility, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.person_id)
        .bind(&doc.title)
        .bind(&doc.source_url)
        .bind(doc.visibility.as_str())
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, doc_id, chunk_index, text_snippet, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&doc.id)
            .bind(chunk.chunk_index)
            .bind(truncate_chars(&chunk.text, STORED_SNIPPET_CHARS))
            .bind(&chunk.hash)
            .bind(to_literal(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_dim_if_empty_tx(&self, dim: usize) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&mut *tx)
            .await?;
        if count > 0 || declared_dim(&mut tx).await? == Some(dim) {
            return Ok(false);
        }
        write_dim(&mut tx, dim).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn vector_search_scan(&self, query: &[f32], top_k: usize) -> Result<Vec<ChunkHit>> {
        let mut conn = self.pool.acquire().await?;
        let Some(expected) = declared_dim(&mut conn).await? else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
            }
            .into());
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.doc_id, c.text_snippet, c.embedding, d.title
            FROM chunks c
            JOIN documents d ON d.id = c.doc_id
            ORDER BY c.rowid
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let literal: String = row.get("embedding");
            let Some(vector) = parse_literal(&literal) else {
                let id: String = row.get("id");
                tracing::warn!(chunk_id = %id, "skipping chunk with unreadable embedding");
                continue;
            };
            hits.push(ChunkHit {
                chunk_id: row.get("id"),
                document_id: row.get("doc_id"),
                title: row.get("title"),
                text: row.get("text_snippet"),
                distance: self.metric.distance(query, &vector),
            });
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn record_observations_tx(
        &self,
        person_id: &str,
        topics: &[CandidateTopic],
    ) -> Result<Vec<ExpertiseScore>> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut updated = Vec::with_capacity(topics.len());

        for candidate in topics {
            let topic = upsert_topic(&mut tx, &candidate.name).await?;
            let existing: Option<f64> = sqlx::query_scalar(
                "SELECT score FROM expertise_scores WHERE person_id = ? AND topic_id = ?",
            )
            .bind(person_id)
            .bind(topic.id)
            .fetch_optional(&mut *tx)
            .await?;
            let score = merge_score(existing, candidate.confidence);

            sqlx::query(
                r#"
                INSERT INTO expertise_scores (person_id, topic_id, score, freshness_days, updated_at)
                VALUES (?, ?, ?, 0, ?)
                ON CONFLICT(person_id, topic_id) DO UPDATE SET
                    score = excluded.score,
                    freshness_days = 0,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(person_id)
            .bind(topic.id)
            .bind(score)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            updated.push(ExpertiseScore {
                person_id: person_id.to_string(),
                topic: topic.name,
                score,
                freshness_days: 0,
            });
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn expertise_rows(&self, names: &[String]) -> Result<Vec<ExpertiseRow>> {
        let names: Vec<String> = names
            .iter()
            .map(|n| canonical_topic_name(n))
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            r#"
            SELECT e.person_id, p.name AS person_name, t.name AS topic, e.score, e.freshness_days
            FROM expertise_scores e
            JOIN topics t ON t.id = e.topic_id
            LEFT JOIN people p ON p.id = e.person_id
            WHERE t.name IN ({})
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for name in &names {
            query = query.bind(name);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(expertise_row).collect())
    }

    async fn person_scores(&self, person_id: &str) -> Result<Vec<ExpertiseScore>> {
        let rows = sqlx::query(
            r#"
            SELECT t.name AS topic, e.score, e.freshness_days
            FROM expertise_scores e
            JOIN topics t ON t.id = e.topic_id
            WHERE e.person_id = ?
            ORDER BY e.score DESC, t.name ASC
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ExpertiseScore {
                person_id: person_id.to_string(),
                topic: row.get("topic"),
                score: row.get("score"),
                freshness_days: row.get("freshness_days"),
            })
            .collect())
    }

    async fn topic_rows(&self, topic: &str, limit: usize) -> Result<Vec<ExpertiseRow>> {
        let rows = sqlx::query(
            r#"
            SELECT e.person_id, p.name AS person_name, t.name AS topic, e.score, e.freshness_days
            FROM expertise_scores e
            JOIN topics t ON t.id = e.topic_id
            LEFT JOIN people p ON p.id = e.person_id
            WHERE t.name = ?
            ORDER BY e.score DESC, e.person_id ASC
            LIMIT ?
            "#,
        )
        .bind(canonical_topic_name(topic))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(expertise_row).collect())
    }

    async fn export(&self, person_id: &str) -> Result<PersonExport> {
        let topics = self.person_scores(person_id).await?;

        let doc_rows = sqlx::query(
            r#"
            SELECT id, person_id, title, source_url, visibility, created_at
            FROM documents
            WHERE person_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;
        let documents = doc_rows
            .iter()
            .map(document_from_row)
            .collect::<Result<Vec<_>>>()?;

        let snippet_rows = sqlx::query(
            r#"
            SELECT c.doc_id, c.chunk_index, c.text_snippet
            FROM chunks c
            JOIN documents d ON d.id = c.doc_id
            WHERE d.person_id = ?
            ORDER BY d.created_at ASC, c.doc_id ASC, c.chunk_index ASC
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;
        let snippets = snippet_rows
            .iter()
            .map(|row| ExportSnippet {
                doc_id: row.get("doc_id"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text_snippet"),
            })
            .collect();

        Ok(PersonExport {
            person_id: person_id.to_string(),
            topics,
            documents,
            snippets,
        })
    }

    async fn erase_tx(&self, person_id: &str) -> Result<ErasureReport> {
        let mut tx = self.pool.begin().await?;

        let scores = sqlx::query("DELETE FROM expertise_scores WHERE person_id = ?")
            .bind(person_id)
            .execute(&mut *tx)
            .await?;
        let chunks = sqlx::query(
            "DELETE FROM chunks WHERE doc_id IN (SELECT id FROM documents WHERE person_id = ?)",
        )
        .bind(person_id)
        .execute(&mut *tx)
        .await?;
        let documents = sqlx::query(
            "UPDATE documents SET person_id = NULL, title = ?, source_url = NULL WHERE person_id = ?",
        )
        .bind(REDACTED_TITLE)
        .bind(person_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ErasureReport {
            scores_deleted: scores.rows_affected(),
            chunks_deleted: chunks.rows_affected(),
            documents_anonymized: documents.rows_affected(),
        })
    }
}

/// Recover a typed core error wrapped by `?` in the helpers above.
fn into_core(err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(core) => core,
        Err(other) => Error::Store(other),
    }
}

async fn declared_dim(conn: &mut SqliteConnection) -> Result<Option<usize>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM vector_meta WHERE key = ?")
        .bind(DIM_KEY)
        .fetch_optional(&mut *conn)
        .await?;
    value
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("corrupt {} in vector_meta: {:?}", DIM_KEY, v))
        })
        .transpose()
}

async fn write_dim(conn: &mut SqliteConnection, dim: usize) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO vector_meta (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(DIM_KEY)
    .bind(dim.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_topic(conn: &mut SqliteConnection, name: &str) -> Result<Topic> {
    let canonical = canonical_topic_name(name);
    if canonical.is_empty() {
        return Err(Error::input("topic name must not be empty").into());
    }
    sqlx::query("INSERT INTO topics (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(&canonical)
        .execute(&mut *conn)
        .await?;
    let row = sqlx::query("SELECT id, name FROM topics WHERE name = ?")
        .bind(&canonical)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Topic {
        id: row.get("id"),
        name: row.get("name"),
    })
}

fn expertise_row(row: &SqliteRow) -> ExpertiseRow {
    ExpertiseRow {
        person_id: row.get("person_id"),
        person_name: row.get("person_name"),
        topic: row.get("topic"),
        score: row.get("score"),
        freshness_days: row.get("freshness_days"),
    }
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let visibility: String = row.get("visibility");
    Ok(Document {
        id: row.get("id"),
        person_id: row.get("person_id"),
        title: row.get("title"),
        source_url: row.get("source_url"),
        visibility: visibility.parse::<Visibility>().map_err(|e| anyhow!(e))?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> expertise_graph_core::Result<()> {
        self.insert_document_tx(doc, chunks, vectors)
            .await
            .map_err(into_core)
    }

    async fn get_document(&self, id: &str) -> expertise_graph_core::Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, person_id, title, source_url, visibility, created_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(e.into()))?;
        row.as_ref()
            .map(document_from_row)
            .transpose()
            .map_err(into_core)
    }

    async fn vector_dim(&self) -> expertise_graph_core::Result<Option<usize>> {
        let mut conn = self.pool.acquire().await.map_err(|e| Error::Store(e.into()))?;
        declared_dim(&mut conn).await.map_err(into_core)
    }

    async fn set_vector_dim_if_empty(&self, dim: usize) -> expertise_graph_core::Result<bool> {
        self.set_dim_if_empty_tx(dim).await.map_err(into_core)
    }

    async fn chunk_count(&self) -> expertise_graph_core::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Store(e.into()))
    }

    async fn vector_search(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> expertise_graph_core::Result<Vec<ChunkHit>> {
        self.vector_search_scan(query, top_k).await.map_err(into_core)
    }

    async fn find_or_create_topic(&self, name: &str) -> expertise_graph_core::Result<Topic> {
        let mut conn = self.pool.acquire().await.map_err(|e| Error::Store(e.into()))?;
        upsert_topic(&mut conn, name).await.map_err(into_core)
    }

    async fn record_observations(
        &self,
        person_id: &str,
        topics: &[CandidateTopic],
    ) -> expertise_graph_core::Result<Vec<ExpertiseScore>> {
        self.record_observations_tx(person_id, topics)
            .await
            .map_err(into_core)
    }

    async fn expertise_for_topics(
        &self,
        names: &[String],
    ) -> expertise_graph_core::Result<Vec<ExpertiseRow>> {
        self.expertise_rows(names).await.map_err(into_core)
    }

    async fn person_expertise(
        &self,
        person_id: &str,
    ) -> expertise_graph_core::Result<Vec<ExpertiseScore>> {
        self.person_scores(person_id).await.map_err(into_core)
    }

    async fn topic_experts(
        &self,
        topic: &str,
        limit: usize,
    ) -> expertise_graph_core::Result<Vec<ExpertiseRow>> {
        self.topic_rows(topic, limit).await.map_err(into_core)
    }

    async fn age_expertise(&self, days: i64) -> expertise_graph_core::Result<u64> {
        if days < 0 {
            return Err(Error::input("days must not be negative"));
        }
        let result =
            sqlx::query("UPDATE expertise_scores SET freshness_days = freshness_days + ?")
                .bind(days)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Store(e.into()))?;
        Ok(result.rows_affected())
    }

    async fn upsert_person(&self, person: &Person) -> expertise_graph_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO people (id, name) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&person.id)
        .bind(&person.name)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.into()))?;
        Ok(())
    }

    async fn export_person(&self, person_id: &str) -> expertise_graph_core::Result<PersonExport> {
        self.export(person_id).await.map_err(into_core)
    }

    async fn erase_person(&self, person_id: &str) -> expertise_graph_core::Result<ErasureReport> {
        self.erase_tx(person_id).await.map_err(into_core)
    }
}
