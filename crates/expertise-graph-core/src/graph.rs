//! Topic expertise graph.
//!
//! For one topic, nodes are the strongest experts and edges connect pairs
//! of people who both know the topic well and recently:
//!
//! | Rule | Value |
//! |------|-------|
//! | Nodes | top 20 by score |
//! | Edge eligibility | `min(score) >= 0.4` and `max(freshness) <= 60` |
//! | Edge weight | `min(score) / (1 + max(freshness) / 30)`, kept when `>= 0.25` |
//! | Edge cap | 200, heaviest first |
//!
//! The bus factor is the share of total score held by the top three
//! nodes; it is `1.0` when fewer than three people know the topic.

use std::cmp::Ordering;

use serde::Serialize;

use crate::scoring::rank_value;
use crate::store::ExpertiseRow;

pub const MAX_NODES: usize = 20;
pub const MAX_EDGES: usize = 200;
pub const EDGE_MIN_SCORE: f64 = 0.4;
pub const EDGE_MAX_FRESHNESS_DAYS: i64 = 60;
pub const EDGE_MIN_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub score_a: f64,
    pub score_b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicGraph {
    pub topic: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub bus_factor: f64,
}

/// Build the graph from every score row of `topic`.
pub fn build_topic_graph(topic: &str, rows: &[ExpertiseRow]) -> TopicGraph {
    let mut sorted: Vec<&ExpertiseRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.person_id.cmp(&b.person_id))
    });

    let nodes: Vec<GraphNode> = sorted
        .iter()
        .take(MAX_NODES)
        .map(|r| GraphNode {
            id: r.person_id.clone(),
            label: r.person_name.clone().unwrap_or_else(|| r.person_id.clone()),
            score: r.score,
        })
        .collect();

    let mut edges = Vec::new();
    for a in &sorted {
        for b in &sorted {
            if a.person_id >= b.person_id {
                continue;
            }
            let min_score = a.score.min(b.score);
            let max_fresh = a.freshness_days.max(b.freshness_days);
            if min_score < EDGE_MIN_SCORE || max_fresh > EDGE_MAX_FRESHNESS_DAYS {
                continue;
            }
            let weight = rank_value(min_score, max_fresh);
            if weight < EDGE_MIN_WEIGHT {
                continue;
            }
            edges.push(GraphEdge {
                source: a.person_id.clone(),
                target: b.person_id.clone(),
                weight,
                score_a: a.score,
                score_b: b.score,
            });
        }
    }
    edges.sort_by(|x, y| {
        y.weight
            .partial_cmp(&x.weight)
            .unwrap_or(Ordering::Equal)
            .then_with(|| x.source.cmp(&y.source))
            .then_with(|| x.target.cmp(&y.target))
    });
    edges.truncate(MAX_EDGES);

    TopicGraph {
        topic: topic.to_string(),
        bus_factor: bus_factor(&nodes),
        nodes,
        edges,
    }
}

fn bus_factor(nodes: &[GraphNode]) -> f64 {
    if nodes.len() < 3 {
        return 1.0;
    }
    let top: f64 = nodes.iter().take(3).map(|n| n.score).sum();
    let total: f64 = nodes.iter().map(|n| n.score).sum();
    top / (total + 1e-6)
}
