//! Distance metrics over the sealed element types.
//!
//! Three metrics: squared Euclidean (L2), inner product, and cosine.
//! All return a score where **lower is better**: the inner product is
//! negated and cosine is reported as `1 − cos`, so min-heaps order
//! candidates closest-first under every metric. Kernels monomorphize over
//! [`Element`] and accumulate in f32; the enum itself is stateless and
//! freely shared across threads.

use crate::error::{Error, Result};
use crate::storage::Element;
use serde::{Deserialize, Serialize};

/// Distance function used for similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance. Range: \[0, ∞).
    L2,
    /// Negated inner product: `-dot(a, b)`. Lower = higher similarity.
    InnerProduct,
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    Cosine,
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L2" | "l2" => Ok(DistanceMetric::L2),
            "IP" | "ip" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(Error::Config(format!("unknown distance metric '{other}'"))),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::L2 => write!(f, "L2"),
            DistanceMetric::InnerProduct => write!(f, "IP"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

impl DistanceMetric {
    /// Distance between two stored vectors of the same element type.
    #[inline]
    pub fn compute<T: Element>(&self, a: &[T], b: &[T]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_sq(a, b),
            DistanceMetric::InnerProduct => -dot(a, b),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }

    /// Asymmetric distance: an f32 query (e.g. a group centroid) against a
    /// stored vector. Used by medoid selection.
    #[inline]
    pub fn compute_asym<T: Element>(&self, query: &[f32], stored: &[T]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_sq_asym(query, stored),
            DistanceMetric::InnerProduct => -dot_asym(query, stored),
            DistanceMetric::Cosine => 1.0 - cosine_similarity_asym(query, stored),
        }
    }
}

#[inline]
fn l2_sq<T: Element>(a: &[T], b: &[T]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x.to_f32() - y.to_f32();
            d * d
        })
        .sum()
}

#[inline]
fn dot<T: Element>(a: &[T], b: &[T]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.to_f32() * y.to_f32())
        .sum()
}

#[inline]
fn cosine_similarity<T: Element>(a: &[T], b: &[T]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[inline]
fn l2_sq_asym<T: Element>(query: &[f32], stored: &[T]) -> f32 {
    query
        .iter()
        .zip(stored.iter())
        .map(|(&x, &y)| {
            let d = x - y.to_f32();
            d * d
        })
        .sum()
}

#[inline]
fn dot_asym<T: Element>(query: &[f32], stored: &[T]) -> f32 {
    query
        .iter()
        .zip(stored.iter())
        .map(|(&x, &y)| x * y.to_f32())
        .sum()
}

#[inline]
fn cosine_similarity_asym<T: Element>(query: &[f32], stored: &[T]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_q = 0.0f32;
    let mut norm_s = 0.0f32;
    for (&x, &y) in query.iter().zip(stored.iter()) {
        let y = y.to_f32();
        dot += x * y;
        norm_q += x * x;
        norm_s += y * y;
    }
    let denom = (norm_q * norm_s).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_l2_squared() {
        let a = [0.0f32, 0.0, 0.0];
        let b = [3.0f32, 4.0, 0.0];
        assert!((DistanceMetric::L2.compute(&a, &b) - 25.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::L2.compute(&a, &a), 0.0);
    }

    #[test]
    fn test_inner_product_is_negated() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [4.0f32, 5.0, 6.0];
        assert!((DistanceMetric::InnerProduct.compute(&a, &b) - (-32.0)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        assert!((DistanceMetric::Cosine.compute(&a, &b) - 1.0).abs() < 1e-6);
        assert!(DistanceMetric::Cosine.compute(&a, &a).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = [0.0f32, 0.0];
        let b = [1.0f32, 1.0];
        // Degenerate norm: defined as distance 1 (similarity 0).
        assert!((DistanceMetric::Cosine.compute(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_i8_kernel() {
        let a = [-2i8, 0, 2];
        let b = [2i8, 0, -2];
        assert!((DistanceMetric::L2.compute(&a, &b) - 32.0).abs() < 1e-6);
        assert!((DistanceMetric::InnerProduct.compute(&a, &b) - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_u8_kernel() {
        let a = [0u8, 10];
        let b = [10u8, 0];
        assert!((DistanceMetric::L2.compute(&a, &b) - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_asym_matches_symmetric_for_f32() {
        let q = [0.5f32, -0.25, 0.75];
        let s = [1.0f32, 0.5, -0.5];
        for metric in [
            DistanceMetric::L2,
            DistanceMetric::InnerProduct,
            DistanceMetric::Cosine,
        ] {
            let sym = metric.compute(&q, &s);
            let asym = metric.compute_asym(&q, &s);
            assert!((sym - asym).abs() < 1e-6, "{metric}: {sym} vs {asym}");
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!(DistanceMetric::from_str("L2").unwrap(), DistanceMetric::L2);
        assert_eq!(
            DistanceMetric::from_str("IP").unwrap(),
            DistanceMetric::InnerProduct
        );
        assert_eq!(
            DistanceMetric::from_str("cosine").unwrap(),
            DistanceMetric::Cosine
        );
        assert!(matches!(
            DistanceMetric::from_str("manhattan"),
            Err(Error::Config(_))
        ));
    }
}
