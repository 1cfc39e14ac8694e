//! Topic extraction.
//!
//! [`TopicExtractor`] proposes the subjects of a text as
//! [`CandidateTopic`]s, most confident first. When a [`TextGenerator`] is
//! configured it is asked for a JSON array of topics; any generation or
//! parse failure, or an empty answer, falls through to the deterministic
//! [`heuristic_topics`]. Extraction itself never fails.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::models::{truncate_chars, CandidateTopic};
use crate::scoring::clamp_unit;

/// Characters of input text included in a generation prompt.
pub const PROMPT_TEXT_CHARS: usize = 4000;

/// Tokens considered by the heuristic, in order of appearance.
const HEURISTIC_TOKEN_LIMIT: usize = 100;

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "into", "http", "https", "www", "team", "org", "your", "have",
    "been", "when", "what", "will", "about", "also", "like", "just", "repo", "branch", "master",
    "main", "staging", "deploy", "deploys", "update",
];

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z][a-z0-9-]{3,}").expect("valid token regex"));

/// A text-completion capability, e.g. a hosted LLM.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Extracts candidate topics, preferring a [`TextGenerator`] when present.
#[derive(Clone, Default)]
pub struct TopicExtractor {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl TopicExtractor {
    /// Extractor that only uses the heuristic.
    pub fn heuristic() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn uses_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// At most `max` topics for `text`, most confident first.
    pub async fn extract(&self, text: &str, max: usize) -> Vec<CandidateTopic> {
        if max == 0 {
            return Vec::new();
        }
        if let Some(generator) = &self.generator {
            match generator.generate(&topic_prompt(text)).await {
                Ok(reply) => match parse_topic_reply(&reply, max) {
                    Some(topics) if !topics.is_empty() => return topics,
                    _ => tracing::debug!(
                        model = generator.model_name(),
                        "unusable topic reply, using heuristic"
                    ),
                },
                Err(e) => tracing::warn!(
                    model = generator.model_name(),
                    category = e.category(),
                    "topic generation failed, using heuristic"
                ),
            }
        }
        heuristic_topics(text, max)
    }
}

/// Prompt asking for a strict JSON array of `{name, confidence}` objects.
pub fn topic_prompt(text: &str) -> String {
    format!(
        "Extract the main technical topics from the text below.\n\
         Respond with a strict JSON array only, no prose, in the form \
         [{{\"name\": \"Topic\", \"confidence\": 0.0}}], where confidence is between 0 and 1.\n\n\
         TEXT:\n{}",
        truncate_chars(text, PROMPT_TEXT_CHARS)
    )
}

/// Parse a generator reply into at most `max` topics.
///
/// Reads the outermost `[...]` of the reply. Names are trimmed and empty
/// names dropped; a missing or non-numeric confidence becomes 0.5, and all
/// confidences are clamped into `[0, 1]`. Returns `None` when no JSON
/// array can be parsed.
pub fn parse_topic_reply(reply: &str, max: usize) -> Option<Vec<CandidateTopic>> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    if end <= start {
        return None;
    }
    let items: Vec<serde_json::Value> = serde_json::from_str(&reply[start..=end]).ok()?;

    let mut topics: Vec<CandidateTopic> = items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let confidence = item
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.5);
            Some(CandidateTopic {
                name: name.to_string(),
                confidence: clamp_unit(confidence),
            })
        })
        .collect();

    topics.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    topics.truncate(max);
    Some(topics)
}

/// Deterministic keyword-frequency topics.
///
/// ```rust
/// use expertise_graph_core::topics::heuristic_topics;
///
/// let topics = heuristic_topics("Tokio tokio runtime", 1);
/// assert_eq!(topics[0].name, "Tokio");
/// ```
pub fn heuristic_topics(text: &str, max: usize) -> Vec<CandidateTopic> {
    let lowered = text.to_lowercase();
    let kept: Vec<&str> = TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOPWORDS.contains(t))
        .take(HEURISTIC_TOKEN_LIMIT)
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for &token in &kept {
        let count = counts.entry(token).or_insert(0);
        if *count == 0 {
            first_seen.push(token);
        }
        *count += 1;
    }

    // Stable sort keeps first-seen order among equal counts.
    first_seen.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let denominator = (kept.len() + 1) as f64;
    first_seen
        .into_iter()
        .take(max)
        .map(|token| CandidateTopic {
            name: capitalize(token),
            confidence: (0.5 + counts[token] as f64 / denominator).min(0.95),
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
