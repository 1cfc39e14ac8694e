//! Expertise scoring and decay.
//!
//! A score is the confidence that a person knows a topic. Each new
//! observation decays the previous belief by [`DECAY_FACTOR`] and keeps
//! whichever of the two is larger.
//!
//! Ranking discounts scores by staleness:
//!
//! ```text
//! rank = score / (1 + freshness_days / 30)
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::Expert;
use crate::store::ExpertiseRow;

/// Multiplier applied to an existing score on every new observation.
pub const DECAY_FACTOR: f64 = 0.9;

/// Days of staleness that halve a score's rank.
pub const FRESHNESS_SCALE_DAYS: f64 = 30.0;

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// New score after observing a topic with confidence `observed`.
///
/// ```rust
/// use expertise_graph_core::scoring::merge_score;
///
/// assert_eq!(merge_score(None, 0.7), 0.7);
/// assert!((merge_score(Some(0.8), 0.5) - 0.72).abs() < 1e-12);
/// assert_eq!(merge_score(Some(0.5), 0.9), 0.9);
/// ```
pub fn merge_score(existing: Option<f64>, observed: f64) -> f64 {
    let observed = clamp_unit(observed);
    match existing {
        None => observed,
        Some(prev) => clamp_unit((prev * DECAY_FACTOR).max(observed)),
    }
}

pub fn freshness_weight(freshness_days: i64) -> f64 {
    1.0 / (1.0 + freshness_days.max(0) as f64 / FRESHNESS_SCALE_DAYS)
}

pub fn rank_value(score: f64, freshness_days: i64) -> f64 {
    score * freshness_weight(freshness_days)
}

/// Collapse per-topic rows into one [`Expert`] per person and rank them.
///
/// Each person keeps their best score and freshest observation across the
/// rows. Experts are ordered by [`rank_value`] descending, ties broken by
/// person id, and truncated to `limit`.
pub fn aggregate_experts(rows: &[ExpertiseRow], limit: usize) -> Vec<Expert> {
    let mut by_person: HashMap<&str, Expert> = HashMap::new();

    for row in rows {
        let entry = by_person
            .entry(row.person_id.as_str())
            .or_insert_with(|| Expert {
                employee_id: row.person_id.clone(),
                name: row
                    .person_name
                    .clone()
                    .unwrap_or_else(|| row.person_id.clone()),
                score: row.score,
                freshness_days: row.freshness_days,
            });
        entry.score = entry.score.max(row.score);
        entry.freshness_days = entry.freshness_days.min(row.freshness_days);
    }

    let mut experts: Vec<Expert> = by_person.into_values().collect();
    experts.sort_by(|a, b| {
        rank_value(b.score, b.freshness_days)
            .partial_cmp(&rank_value(a.score, a.freshness_days))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    experts.truncate(limit);
    experts
}
