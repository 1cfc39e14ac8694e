//! Vector utilities: text literal codec, similarity, and distance metrics.
//!
//! Chunk embeddings are persisted as a bracketed decimal literal
//! (`[0.125000,-1.000000,...]`) so stores without a native vector type can
//! keep them in a text column and an external vector database can ingest
//! the same representation.
//!
//! | Metric          | Distance           | Ordering             |
//! |-----------------|--------------------|----------------------|
//! | `inner_product` | `-(a · b)`         | ascending (default)  |
//! | `cosine`        | `1 - cos(a, b)`    | ascending            |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Format a vector as `[v1,...,vN]` with six decimals per value.
///
/// Non-finite values are written as `0`.
///
/// ```rust
/// use expertise_graph_core::vector::to_literal;
///
/// assert_eq!(to_literal(&[0.5, -1.0]), "[0.500000,-1.000000]");
/// assert_eq!(to_literal(&[f32::NAN]), "[0]");
/// ```
pub fn to_literal(vec: &[f32]) -> String {
    let parts: Vec<String> = vec
        .iter()
        .map(|v| {
            if v.is_finite() {
                format!("{:.6}", f64::from(*v))
            } else {
                "0".to_string()
            }
        })
        .collect();
    format!("[{}]", parts.join(","))
}

/// Parse a literal produced by [`to_literal`]. Returns `None` when malformed.
pub fn parse_literal(literal: &str) -> Option<Vec<f32>> {
    let inner = literal.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, zero-norm, or
/// differently sized vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// How chunk vectors are compared to a query vector. Smaller distance is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    InnerProduct,
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            DistanceMetric::InnerProduct => -dot(query, candidate),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(query, candidate),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inner_product" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(format!(
                "unknown distance metric '{}': expected inner_product or cosine",
                other
            )),
        }
    }
}

/// Truncate or zero-pad `vec` to exactly `dim` values.
pub fn reconcile(mut vec: Vec<f32>, dim: usize) -> Vec<f32> {
    vec.resize(dim, 0.0);
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_format() {
        assert_eq!(to_literal(&[]), "[]");
        assert_eq!(to_literal(&[1.0, 0.25, -3.5]), "[1.000000,0.250000,-3.500000]");
        assert_eq!(to_literal(&[f32::INFINITY, 2.0]), "[0,2.000000]");
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("[0.5,-1.000000]"), Some(vec![0.5, -1.0]));
        assert_eq!(parse_literal("[]"), Some(vec![]));
        assert_eq!(parse_literal("0.5,1"), None);
        assert_eq!(parse_literal("[0.5,abc]"), None);
    }

    #[test]
    fn test_literal_is_within_six_decimals() {
        let v = vec![0.123_456_78_f32, -0.987_654_3];
        let back = parse_literal(&to_literal(&v)).unwrap();
        for (a, b) in v.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_distance_metrics_order() {
        let query = [1.0, 0.0];
        let near = [0.9, 0.1];
        let far = [-1.0, 0.0];
        for metric in [DistanceMetric::InnerProduct, DistanceMetric::Cosine] {
            assert!(metric.distance(&query, &near) < metric.distance(&query, &far));
        }
        assert_eq!(DistanceMetric::InnerProduct.distance(&[2.0], &[3.0]), -6.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!("l2".parse::<DistanceMetric>().is_err());
        assert_eq!(DistanceMetric::default().to_string(), "inner_product");
    }

    #[test]
    fn test_reconcile_truncates_and_pads() {
        assert_eq!(reconcile(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(reconcile(vec![1.0], 3), vec![1.0, 0.0, 0.0]);
    }
}
