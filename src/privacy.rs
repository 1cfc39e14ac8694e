//! Data-subject export and erasure.

use std::time::Instant;

use serde_json::json;

use expertise_graph_core::audit::AuditRecord;
use expertise_graph_core::models::{truncate_chars, STORED_SNIPPET_CHARS};
use expertise_graph_core::store::{ErasureReport, PersonExport};
use expertise_graph_core::Result;

use crate::app::App;
use crate::ingest::validate_person_id;

/// Everything stored about one person.
pub async fn export_person(app: &App, person_id: &str) -> Result<PersonExport> {
    validate_person_id(person_id)?;
    let started = Instant::now();
    let mut export = app.store().export_person(person_id).await?;
    for snippet in &mut export.snippets {
        snippet.text = truncate_chars(&snippet.text, STORED_SNIPPET_CHARS);
    }

    app.audit(
        AuditRecord::new("privacy.export", true, started.elapsed().as_millis() as u64).details(
            json!({
                "topics": export.topics.len(),
                "documents": export.documents.len(),
                "snippets": export.snippets.len(),
            }),
        ),
    )
    .await;
    Ok(export)
}

/// Delete a person's scores and chunks and anonymize their documents.
pub async fn erase_person(app: &App, person_id: &str) -> Result<ErasureReport> {
    validate_person_id(person_id)?;
    let started = Instant::now();
    let report = app.store().erase_person(person_id).await?;
    tracing::info!(
        count = report.chunks_deleted,
        documents = report.documents_anonymized,
        "erased person data"
    );

    app.audit(
        AuditRecord::new("privacy.delete", true, started.elapsed().as_millis() as u64)
            .details(serde_json::to_value(&report).unwrap_or_default()),
    )
    .await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::memory_app;
    use crate::ingest::{ingest_document, IngestRequest};
    use expertise_graph_core::models::Visibility;
    use expertise_graph_core::store::REDACTED_TITLE;

    const ADA: &str = "6f1c2d1e-8a4b-4c3d-9e2f-0a1b2c3d4e5f";

    #[tokio::test]
    async fn test_export_then_erase() {
        let app = memory_app();
        let out = ingest_document(
            &app,
            IngestRequest {
                person_id: ADA.to_string(),
                title: "Incident review".to_string(),
                text: Some("Postgres failover drills and Postgres replica lag.".to_string()),
                url: None,
                visibility: Visibility::Private,
            },
        )
        .await
        .unwrap();

        let export = export_person(&app, ADA).await.unwrap();
        assert_eq!(export.documents.len(), 1);
        assert_eq!(export.snippets.len(), out.chunk_count);
        assert!(!export.topics.is_empty());

        let report = erase_person(&app, ADA).await.unwrap();
        assert_eq!(report.chunks_deleted as usize, out.chunk_count);
        assert_eq!(report.documents_anonymized, 1);
        assert_eq!(app.store().chunk_count().await.unwrap(), 0);

        let doc = app.store().get_document(&out.doc_id).await.unwrap().unwrap();
        assert_eq!(doc.title, REDACTED_TITLE);
        assert!(doc.person_id.is_none());

        let after = export_person(&app, ADA).await.unwrap();
        assert!(after.topics.is_empty() && after.documents.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_uuid() {
        let app = memory_app();
        assert!(export_person(&app, "ada").await.is_err());
        assert!(erase_person(&app, "ada").await.is_err());
    }
}
