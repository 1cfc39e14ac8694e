//! Persistent audit log.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use expertise_graph_core::audit::{AuditRecord, AuditSink};

const SECONDS_PER_DAY: i64 = 86_400;

/// Writes redacted [`AuditRecord`]s to the `audit_log` table.
///
/// Insert failures are logged and swallowed: auditing never fails the
/// operation being audited.
#[derive(Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete records older than `days`. Returns the number removed.
    pub async fn purge_older_than(&self, days: i64) -> anyhow::Result<u64> {
        let cutoff = Utc::now().timestamp() - days * SECONDS_PER_DAY;
        let result = sqlx::query("DELETE FROM audit_log WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(count = removed, days, "purged audit records");
        }
        Ok(removed)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: AuditRecord) {
        let result = sqlx::query(
            "INSERT INTO audit_log (ts, actor, action, subject, details) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Utc::now().timestamp())
        .bind(&record.actor)
        .bind(&record.action)
        .bind(&record.subject)
        .bind(record.details_json().to_string())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(action = %record.action, error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use serde_json::json;

    async fn sink() -> (tempfile::TempDir, SqliteAuditSink) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect(&Config::minimal(dir.path().join("xg.sqlite")))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (dir, SqliteAuditSink::new(pool))
    }

    #[tokio::test]
    async fn test_records_are_redacted() {
        let (_dir, sink) = sink().await;
        sink.record(
            AuditRecord::new("ingest", true, 12)
                .actor("ada@example.com")
                .details(json!({"chunks": 3, "note": "by ada@example.com", "apiKey": "x"})),
        )
        .await;

        let (action, details): (String, String) =
            sqlx::query_as("SELECT action, details FROM audit_log")
                .fetch_one(&sink.pool)
                .await
                .unwrap();
        assert_eq!(action, "ingest");
        let details: serde_json::Value = serde_json::from_str(&details).unwrap();
        assert_eq!(details["ok"], json!(true));
        assert_eq!(details["ms"], json!(12));
        assert_eq!(details["chunks"], json!(3));
        assert_eq!(details["note"], json!("by ***@***"));
        assert_eq!(details["apiKey"], json!("***"));
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let (_dir, sink) = sink().await;
        let old = Utc::now().timestamp() - 100 * SECONDS_PER_DAY;
        sqlx::query("INSERT INTO audit_log (ts, action) VALUES (?, 'old')")
            .bind(old)
            .execute(&sink.pool)
            .await
            .unwrap();
        sink.record(AuditRecord::new("fresh", true, 0)).await;

        assert_eq!(sink.purge_older_than(90).await.unwrap(), 1);
        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&sink.pool)
            .await
            .unwrap();
        assert_eq!(left, 1);
    }
}
