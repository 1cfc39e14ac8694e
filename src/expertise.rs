//! Expertise operations outside the search path: interviews, listings,
//! freshness aging, people, and the topic graph.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use expertise_graph_core::audit::AuditRecord;
use expertise_graph_core::graph::{build_topic_graph, TopicGraph};
use expertise_graph_core::models::{canonical_topic_name, ExpertiseScore, Person};
use expertise_graph_core::{Error, Result};

use crate::app::App;
use crate::ingest::validate_person_id;

/// Topics extracted from one interview.
pub const INTERVIEW_TOPICS: usize = 12;

#[derive(Debug, Clone, Deserialize)]
pub struct InterviewAnswer {
    pub q: String,
    pub a: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRequest {
    pub person_id: String,
    pub answers: Vec<InterviewAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedTopic {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewResult {
    pub topics_updated: Vec<UpdatedTopic>,
}

/// Turn interview answers into expertise observations for the interviewee.
pub async fn ingest_interview(app: &App, req: InterviewRequest) -> Result<InterviewResult> {
    validate_person_id(&req.person_id)?;
    if req.answers.is_empty() {
        return Err(Error::input("answers must not be empty"));
    }

    let started = Instant::now();
    let text = req
        .answers
        .iter()
        .map(|answer| format!("{}: {}", answer.q, answer.a))
        .collect::<Vec<_>>()
        .join("\n");
    let topics = app.topics().extract(&text, INTERVIEW_TOPICS).await;

    let result = app
        .store()
        .record_observations(&req.person_id, &topics)
        .await;
    let ms = started.elapsed().as_millis() as u64;

    let record = match &result {
        Ok(scores) => {
            AuditRecord::new("interview", true, ms).details(json!({ "count": scores.len() }))
        }
        Err(e) => AuditRecord::new("interview", false, ms).details(json!({ "error": e.category() })),
    };
    app.audit(record.actor(&req.person_id)).await;

    let topics_updated = result?
        .into_iter()
        .map(|s| UpdatedTopic {
            name: s.topic,
            score: s.score,
        })
        .collect();
    Ok(InterviewResult { topics_updated })
}

/// A person's scores, highest first.
pub async fn list_expertise(app: &App, person_id: &str) -> Result<Vec<ExpertiseScore>> {
    validate_person_id(person_id)?;
    app.store().person_expertise(person_id).await
}

/// Advance every score's freshness by `days`.
pub async fn age_expertise(app: &App, days: i64) -> Result<u64> {
    if days < 1 {
        return Err(Error::input("days must be >= 1"));
    }
    let aged = app.store().age_expertise(days).await?;
    tracing::info!(count = aged, days, "aged expertise scores");
    app.audit(AuditRecord::new("expertise.age", true, 0).details(json!({ "count": aged, "days": days })))
        .await;
    Ok(aged)
}

/// Register or rename a person.
pub async fn add_person(app: &App, person: Person) -> Result<Person> {
    validate_person_id(&person.id)?;
    let name = person.name.trim();
    if name.is_empty() {
        return Err(Error::input("name must not be empty"));
    }
    let person = Person {
        id: person.id,
        name: name.to_string(),
    };
    app.store().upsert_person(&person).await?;
    Ok(person)
}

/// Expert graph for one topic.
pub async fn topic_graph(app: &App, topic: &str) -> Result<TopicGraph> {
    let topic = canonical_topic_name(topic);
    if topic.is_empty() {
        return Err(Error::input("topic must not be empty"));
    }
    let rows = app.store().topic_experts(&topic, usize::MAX).await?;
    Ok(build_topic_graph(&topic, &rows))
}
