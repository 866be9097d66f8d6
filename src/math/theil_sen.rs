//! Theil–Sen robust line: median of pairwise slopes.
//!
//! The estimator tolerates up to ~29% of points being arbitrary outliers. Its cost grows
//! with the number of point pairs, so large inputs use a seeded random subset of pairs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::median_mut;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TheilSenLine {
    pub slope: f64,
    pub intercept: f64,
    /// Number of pairwise slopes the median was taken over.
    pub pairs_used: usize,
}

impl TheilSenLine {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit a Theil–Sen line.
///
/// Pairs with identical `x` carry no slope information and are skipped. When the number
/// of pairs exceeds `max_pairs`, `max_pairs` pairs are drawn at random with a generator
/// seeded by `seed`, so results are reproducible. Returns `None` when no usable pair exists.
pub fn theil_sen(x: &[f64], y: &[f64], max_pairs: usize, seed: u64) -> Option<TheilSenLine> {
    let n = x.len();
    if n < 2 || y.len() != n {
        return None;
    }

    let total_pairs = n * (n - 1) / 2;
    let mut slopes = Vec::with_capacity(total_pairs.min(max_pairs.max(1)));
    let mut push = |i: usize, j: usize| {
        let dx = x[j] - x[i];
        if dx != 0.0 {
            let s = (y[j] - y[i]) / dx;
            if s.is_finite() {
                slopes.push(s);
            }
        }
    };

    if total_pairs <= max_pairs {
        for i in 0..n {
            for j in (i + 1)..n {
                push(i, j);
            }
        }
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..max_pairs {
            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            push(i.min(j), i.max(j));
        }
    }

    let pairs_used = slopes.len();
    let slope = median_mut(&mut slopes)?;
    let mut offsets: Vec<f64> = x.iter().zip(y).map(|(&xi, &yi)| yi - slope * xi).collect();
    let intercept = median_mut(&mut offsets)?;

    Some(TheilSenLine {
        slope,
        intercept,
        pairs_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_a_minority_of_gross_outliers() {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let mut y: Vec<f64> = x.iter().map(|v| 1.5 * v + 10.0).collect();
        y[3] = 500.0;
        y[17] = -400.0;
        y[25] = 900.0;

        let line = theil_sen(&x, &y, 10_000, 42).unwrap();
        assert!((line.slope - 1.5).abs() < 1e-12);
        assert!((line.intercept - 10.0).abs() < 1e-9);
    }

    #[test]
    fn sampled_pairs_are_reproducible() {
        let x: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.8 * v + ((v * 7.0) % 5.0)).collect();

        let a = theil_sen(&x, &y, 500, 7).unwrap();
        let b = theil_sen(&x, &y, 500, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.pairs_used, 500);
        assert!((a.slope - 0.8).abs() < 0.05);
    }

    #[test]
    fn constant_x_has_no_slope() {
        assert!(theil_sen(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], 100, 0).is_none());
    }
}
