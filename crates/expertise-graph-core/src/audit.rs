//! Audit records and redaction.
//!
//! Pipeline steps report what they did as [`AuditRecord`]s to an
//! [`AuditSink`]. Records carry aggregate facts only (model names,
//! dimensions, latencies, counts); [`redact`] masks anything that looks
//! like an email address or API key before a record is persisted.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+").expect("valid email regex"));

static API_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[A-Za-z0-9_-]{10,}").expect("valid key regex"));

static SENSITIVE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)api|key|secret|token|email|embedding").expect("valid sensitive key regex")
});

const MASK: &str = "***";

/// One audited action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub action: String,
    pub ok: bool,
    pub ms: u64,
    pub actor: Option<String>,
    pub subject: Option<String>,
    pub details: Value,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, ok: bool, ms: u64) -> Self {
        Self {
            action: action.into(),
            ok,
            ms,
            actor: None,
            subject: None,
            details: Value::Null,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// `{ok, ms, ...details}` with details redacted.
    pub fn details_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("ok".to_string(), json!(self.ok));
        out.insert("ms".to_string(), json!(self.ms));
        if let Value::Object(details) = redact(self.details.clone()) {
            out.extend(details);
        }
        Value::Object(out)
    }
}

/// Destination for audit records. Recording never fails the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Emits records as structured `tracing` events.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            action = %record.action,
            ok = record.ok,
            ms = record.ms,
            details = %record.details_json(),
            "audit"
        );
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _record: AuditRecord) {}
}

/// Mask email addresses, `sk-` keys, and values under sensitive keys.
pub fn redact(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let s = EMAIL.replace_all(&s, "***@***");
            Value::String(API_KEY.replace_all(&s, "sk-***").into_owned())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if SENSITIVE_KEY.is_match(&k) {
                        (k, Value::String(MASK.to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}
