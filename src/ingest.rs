//! Document ingestion.
//!
//! Validate → (fetch URL) → chunk → embed every chunk → write the document
//! and its chunks in one transaction → derive expertise for the owner.
//!
//! Embedding happens before the transaction opens, so a provider failure
//! leaves nothing behind and no connection is held across network calls.

use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use expertise_graph_core::audit::AuditRecord;
use expertise_graph_core::chunk::chunk_document;
use expertise_graph_core::models::{truncate_chars, Document, Visibility};
use expertise_graph_core::{Error, Result};

use crate::app::App;

pub const MAX_TITLE_CHARS: usize = 200;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script.*?</script>").expect("valid script regex"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<style.*?</style>").expect("valid style regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub person_id: String,
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub doc_id: String,
    pub chunk_count: usize,
}

/// Check every field before any I/O.
pub fn validate(req: &IngestRequest, max_text_chars: usize) -> Result<()> {
    validate_person_id(&req.person_id)?;

    let title_chars = req.title.chars().count();
    if req.title.trim().is_empty() || title_chars > MAX_TITLE_CHARS {
        return Err(Error::input(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_CHARS
        )));
    }

    match (non_blank(&req.text), non_blank(&req.url)) {
        (None, None) => return Err(Error::input("provide text or url")),
        (Some(text), _) if text.chars().count() > max_text_chars => {
            return Err(Error::input(format!(
                "text must be at most {} characters",
                max_text_chars
            )))
        }
        _ => {}
    }

    if let Some(url) = non_blank(&req.url) {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| Error::input("url is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::input("url must use http or https"));
        }
    }
    Ok(())
}

pub fn validate_person_id(person_id: &str) -> Result<()> {
    Uuid::parse_str(person_id)
        .map(|_| ())
        .map_err(|_| Error::input("personId must be a UUID"))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Drop `<script>` and `<style>` blocks and every tag, then trim and cap.
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let text = SCRIPT_BLOCK.replace_all(html, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    truncate_chars(text.trim(), max_chars)
}

async fn fetch_url(app: &App, url: &str) -> Result<String> {
    let response = app
        .http()
        .get(url)
        .send()
        .await
        .map_err(|e| Error::ProviderTransport {
            provider: "fetch".to_string(),
            message: e.to_string(),
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::provider_status("fetch", status.as_u16(), ""));
    }
    let html = response.text().await.map_err(|e| Error::ProviderResponse {
        provider: "fetch".to_string(),
        message: e.to_string(),
    })?;
    Ok(html_to_text(&html, app.config.ingest.max_text_chars))
}

/// Ingest one document and return its id and chunk count.
pub async fn ingest_document(app: &App, req: IngestRequest) -> Result<IngestResult> {
    validate(&req, app.config.ingest.max_text_chars)?;

    let started = Instant::now();
    let result = run_ingest(app, &req).await;
    let ms = started.elapsed().as_millis() as u64;

    let record = match &result {
        Ok(out) => AuditRecord::new("ingest", true, ms)
            .subject(&out.doc_id)
            .details(json!({
                "chunks": out.chunk_count,
                "visibility": req.visibility.as_str(),
                "fromUrl": non_blank(&req.url).is_some(),
            })),
        Err(e) => AuditRecord::new("ingest", false, ms).details(json!({ "error": e.category() })),
    };
    app.audit(record.actor(&req.person_id)).await;
    result
}

async fn run_ingest(app: &App, req: &IngestRequest) -> Result<IngestResult> {
    let text = match non_blank(&req.text) {
        Some(text) => text.to_string(),
        None => match non_blank(&req.url) {
            Some(url) => fetch_url(app, url).await?,
            None => String::new(),
        },
    };
    if text.trim().is_empty() {
        return Err(Error::input("no text available"));
    }

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        person_id: Some(req.person_id.clone()),
        title: req.title.trim().to_string(),
        source_url: non_blank(&req.url).map(str::to_string),
        visibility: req.visibility,
        created_at: Utc::now().timestamp(),
    };
    let chunks = chunk_document(&doc.id, &text, app.config.chunking.options());

    let mut vectors = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        vectors.push(app.embedder().embed(&chunk.text).await?);
    }

    app.store().insert_document(&doc, &chunks, &vectors).await?;
    tracing::info!(
        count = chunks.len(),
        model = app.embedder().model_name(),
        "document ingested"
    );

    if app.config.ingest.derive_expertise {
        derive_expertise(app, &req.person_id, &text).await;
    }

    Ok(IngestResult {
        doc_id: doc.id,
        chunk_count: chunks.len(),
    })
}

/// Record the document's topics as observations for its owner.
async fn derive_expertise(app: &App, person_id: &str, text: &str) {
    let topics = app
        .topics()
        .extract(text, app.config.ingest.expertise_topics)
        .await;
    if topics.is_empty() {
        return;
    }
    match app.store().record_observations(person_id, &topics).await {
        Ok(scores) => tracing::debug!(count = scores.len(), "derived expertise from document"),
        Err(e) => tracing::warn!(category = e.category(), "expertise derivation failed"),
    }
}
