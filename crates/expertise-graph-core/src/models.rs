//! Core data models used throughout Expertise Graph.
//!
//! Persistent records (documents, chunks, topics, people, expertise scores)
//! and the transient values that flow out of the retrieval pipeline
//! (snippets, candidate topics, ranked experts). The transient types
//! serialize with the camelCase field names of the public API.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum characters of chunk text persisted in the chunk table.
pub const STORED_SNIPPET_CHARS: usize = 400;

/// Maximum characters of chunk text returned in a search [`Snippet`].
pub const DISPLAY_SNIPPET_CHARS: usize = 200;

/// Who may see a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Team,
    Org,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Team => "team",
            Visibility::Org => "org",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "team" => Ok(Visibility::Team),
            "org" => Ok(Visibility::Org),
            other => Err(format!(
                "unknown visibility '{}': expected private, team, or org",
                other
            )),
        }
    }
}

/// An ingested document. `person_id` is cleared by data-subject erasure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub person_id: Option<String>,
    pub title: String,
    pub source_url: Option<String>,
    pub visibility: Visibility,
    /// Unix seconds.
    pub created_at: i64,
}

/// A chunk of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Full chunk text; stores keep only the first [`STORED_SNIPPET_CHARS`].
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
}

/// Confidence that a person knows a topic, plus how stale that belief is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertiseScore {
    pub person_id: String,
    pub topic: String,
    pub score: f64,
    pub freshness_days: i64,
}

/// A proposed subject of a text, with confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTopic {
    pub name: String,
    pub confidence: f64,
}

/// A retrieved chunk projected for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub text: String,
    /// Title of the parent document.
    pub source: String,
    pub doc_id: String,
}

/// A ranked expert for a set of topics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expert {
    pub employee_id: String,
    pub name: String,
    /// Best raw score across the matched topics.
    pub score: f64,
    /// Freshest observation across the matched topics.
    pub freshness_days: i64,
}

/// Take at most `max` characters of `text` (never splits a character).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Canonical form of a topic name: trimmed with inner whitespace collapsed.
///
/// Stores compare canonical names case-insensitively.
pub fn canonical_topic_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 400), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("team".parse::<Visibility>().unwrap(), Visibility::Team);
        assert!("public".parse::<Visibility>().is_err());
        assert_eq!(Visibility::default(), Visibility::Private);
    }

    #[test]
    fn test_canonical_topic_name() {
        assert_eq!(canonical_topic_name("  Machine   learning \n"), "Machine learning");
    }

    #[test]
    fn test_expert_serializes_camel_case() {
        let e = Expert {
            employee_id: "p1".into(),
            name: "Ada".into(),
            score: 0.9,
            freshness_days: 3,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["employeeId"], "p1");
        assert_eq!(v["freshnessDays"], 3);
    }
}
