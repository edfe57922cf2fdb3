//! Vector math used to rank stored embeddings.

use crate::error::{ GatewayError, Result };

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(dot_f64(a, b) as f32)
}

pub fn magnitude(v: &[f32]) -> f32 {
    squared_norm_f64(v).sqrt() as f32
}

/// Cosine of the angle between `a` and `b`.
///
/// Sums are accumulated in `f64`, so components near the `f32` range limits neither
/// overflow nor vanish. Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    let magnitude_a = squared_norm_f64(a).sqrt();
    let magnitude_b = squared_norm_f64(b).sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    let cosine = dot_f64(a, b) / (magnitude_a * magnitude_b);
    Ok(cosine.clamp(-1.0, 1.0) as f32)
}

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(GatewayError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

fn dot_f64(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn squared_norm_f64(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum()
}

/// Ranks `items` by descending cosine similarity to `query` and keeps the first `k`.
///
/// A candidate whose length differs from the query, or whose score is not finite,
/// scores 0.0 instead of failing the whole ranking. Equal scores keep their input order.
pub fn rank_by_similarity<T, F>(query: &[f32], items: Vec<T>, k: i64, vector_of: F) -> Vec<T>
where
    F: Fn(&T) -> &[f32],
{
    if k <= 0 || items.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f32, T)> = items
        .into_iter()
        .map(|item| {
            let score = cosine_similarity(query, vector_of(&item))
                .ok()
                .filter(|score| score.is_finite())
                .unwrap_or(0.0);
            // fold -0.0 into 0.0 so ties stay ties under total_cmp
            (score + 0.0, item)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(k as usize)
        .map(|(_, item)| item)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOLERANCE: f32 = 1e-5;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        let negated: Vec<f32> = v.iter().map(|x| -x).collect();
        let sim = cosine_similarity(&v, &negated).unwrap();
        assert!((sim + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let zero = vec![0.0; 3];
        assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &zero).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < TOLERANCE);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }

    #[test]
    fn huge_components_do_not_overflow() {
        let v = [1e20f32, 2e20];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < TOLERANCE, "got {}", sim);
        assert!(magnitude(&v).is_finite());
    }

    #[test]
    fn tiny_components_do_not_vanish() {
        let v = [1e-30f32, 0.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < TOLERANCE, "got {}", sim);
        assert!(magnitude(&v) > 0.0);
    }

    #[test]
    fn dot_product_of_huge_components_is_finite_when_representable() {
        assert_eq!(dot_product(&[1e20, -1e20], &[1e-20, 1e-20]).unwrap(), 0.0);
        assert!((dot_product(&[1e20], &[1e-20]).unwrap() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn magnitude_of_three_four() {
        assert!((magnitude(&[3.0, 4.0]) - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn rank_orders_by_descending_similarity() {
        let items = vec![("c", vec![0.0, 1.0]), ("a", vec![1.0, 0.0]), ("b", vec![0.9, 0.1])];
        let ranked = rank_by_similarity(&[1.0, 0.0], items, 2, |item| item.1.as_slice());
        let names: Vec<&str> = ranked.iter().map(|item| item.0).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rank_keeps_input_order_on_ties() {
        let items = vec![("first", vec![2.0, 0.0]), ("second", vec![1.0, 0.0]), ("third", vec![5.0, 0.0])];
        let ranked = rank_by_similarity(&[1.0, 0.0], items, 3, |item| item.1.as_slice());
        let names: Vec<&str> = ranked.iter().map(|item| item.0).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn rank_scores_mismatched_lengths_as_zero() {
        let items = vec![
            ("short", vec![1.0]),
            ("negative", vec![-1.0, 0.0]),
            ("match", vec![1.0, 0.0]),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], items, 3, |item| item.1.as_slice());
        let names: Vec<&str> = ranked.iter().map(|item| item.0).collect();
        assert_eq!(names, vec!["match", "short", "negative"]);
    }

    #[test]
    fn rank_prefers_large_vector_in_the_same_direction() {
        let items = vec![("small", vec![0.0, 1.0]), ("same_dir_large", vec![1e20, 0.0])];
        let ranked = rank_by_similarity(&[1.0, 0.0], items, 1, |item| item.1.as_slice());
        assert_eq!(ranked[0].0, "same_dir_large");
    }

    #[test]
    fn rank_treats_non_finite_scores_as_zero() {
        let items = vec![
            ("nan", vec![f32::NAN, 0.0]),
            ("good", vec![1.0, 0.1]),
            ("inf", vec![f32::INFINITY, 0.0]),
            ("opposite", vec![-1.0, 0.0]),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], items, 4, |item| item.1.as_slice());
        let names: Vec<&str> = ranked.iter().map(|item| item.0).collect();
        assert_eq!(names, vec!["good", "nan", "inf", "opposite"]);
    }

    #[test]
    fn rank_with_non_positive_k_is_empty() {
        let items = vec![vec![1.0, 0.0]];
        assert!(rank_by_similarity(&[1.0, 0.0], items.clone(), 0, |v| v.as_slice()).is_empty());
        assert!(rank_by_similarity(&[1.0, 0.0], items, -3, |v| v.as_slice()).is_empty());
    }
}
