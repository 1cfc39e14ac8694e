//! Idempotent schema migrations.
//!
//! | Table | Holds |
//! |-------|-------|
//! | `documents` | Ingested documents (owner cleared on erasure) |
//! | `chunks` | Chunk snippets with their embedding literal |
//! | `vector_meta` | Declared chunk vector width (`embedding_dim`) |
//! | `topics` | Canonical topic names, unique case-insensitively |
//! | `people` | Display names for person ids |
//! | `expertise_scores` | Score and freshness per (person, topic) |
//! | `audit_log` | Redacted audit records |

use anyhow::Result;
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        person_id TEXT,
        title TEXT NOT NULL,
        source_url TEXT,
        visibility TEXT NOT NULL DEFAULT 'private'
            CHECK (visibility IN ('private', 'team', 'org')),
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        doc_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text_snippet TEXT NOT NULL,
        hash TEXT NOT NULL,
        embedding TEXT NOT NULL,
        UNIQUE(doc_id, chunk_index),
        FOREIGN KEY (doc_id) REFERENCES documents(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS vector_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS topics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS people (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expertise_scores (
        person_id TEXT NOT NULL,
        topic_id INTEGER NOT NULL,
        score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
        freshness_days INTEGER NOT NULL DEFAULT 0 CHECK (freshness_days >= 0),
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (person_id, topic_id),
        FOREIGN KEY (topic_id) REFERENCES topics(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts INTEGER NOT NULL,
        actor TEXT,
        action TEXT NOT NULL,
        subject TEXT,
        details TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)",
    "CREATE INDEX IF NOT EXISTS idx_documents_person_id ON documents(person_id)",
    "CREATE INDEX IF NOT EXISTS idx_expertise_topic ON expertise_scores(topic_id, score DESC)",
    "CREATE INDEX IF NOT EXISTS idx_audit_ts ON audit_log(ts)",
];

/// Create every table and index that does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(count = STATEMENTS.len(), "migrations applied");
    Ok(())
}
