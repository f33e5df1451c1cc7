// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Group Statistics
// ─────────────────────────────────────────────────────────────────────
//! Two-level model for event-related SDI.
//!
//!   a) per event, subject and ROI: signed-rank statistic of the empirical
//!      value against its K surrogates
//!   b) first level: one-sample t over events, per subject and ROI
//!   c) second level: sign-flip permutation t-test over subjects with
//!      max-statistic correction across ROIs

use nigsp_types::stats::{mean, rankdata, variance};
use nigsp_types::{Matrix, NigspError, NigspResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rng::SeedStream;

/// Largest sample count enumerated exhaustively by the permutation test.
const MAX_EXACT_SAMPLES: usize = 20;

/// One-sample t statistic without a p-value: `mean / sqrt(var / n)`,
/// `ddof = 1`. Zero variance gives ±∞ or NaN.
pub fn ttest_1samp_no_p(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    mean(values) / (variance(values, 1) / n).sqrt()
}

/// Column-wise t statistics of an observations × tests matrix.
pub fn ttest_columns(x: &Matrix) -> Vec<f64> {
    (0..x.cols()).map(|c| ttest_1samp_no_p(&x.column(c))).collect()
}

/// Signed-rank statistic of a vector of differences:
/// `Σ rank(|d|)·sign(d) / len`.
pub fn signed_rank_statistic(diffs: &[f64]) -> f64 {
    if diffs.is_empty() {
        return 0.0;
    }
    let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let ranks = rankdata(&abs);
    let sum: f64 = ranks
        .iter()
        .zip(diffs)
        .map(|(r, d)| {
            if *d > 0.0 {
                *r
            } else if *d < 0.0 {
                -*r
            } else {
                0.0
            }
        })
        .sum();
    sum / diffs.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationTest {
    /// Observed t per test.
    pub t_obs: Vec<f64>,
    /// Two-tailed, max-statistic corrected p per test.
    pub p_values: Vec<f64>,
    /// Max |t| of each sign pattern, identity first.
    pub h0: Vec<f64>,
}

fn max_abs_t(x: &Matrix, signs: &[f64]) -> f64 {
    let n = x.rows() as f64;
    (0..x.cols())
        .map(|c| {
            let col: Vec<f64> = (0..x.rows()).map(|r| x[(r, c)] * signs[r]).collect();
            let m = col.iter().sum::<f64>() / n;
            let var = variance(&col, 1);
            (m / (var / n).sqrt()).abs()
        })
        .filter(|t| t.is_finite())
        .fold(0.0, f64::max)
}

/// Sign-flip permutation t-test, two-tailed, corrected for multiple tests
/// with the max-|t| statistic.
///
/// `x` is observations × tests. With at most `MAX_EXACT_SAMPLES`
/// observations and `2^n <= n_permutations`, every sign pattern is used;
/// otherwise `n_permutations − 1` random patterns are drawn from `seed` and
/// the identity is added.
pub fn permutation_t_test(
    x: &Matrix,
    n_permutations: usize,
    seed: u64,
) -> NigspResult<PermutationTest> {
    let n = x.rows();
    if n < 2 {
        return Err(NigspError::InvalidType(format!(
            "permutation t-test needs at least 2 observations, got {n}"
        )));
    }
    if n_permutations == 0 {
        return Err(NigspError::Config("n_permutations must be >= 1".to_string()));
    }
    x.ensure_finite("permutation test input")?;

    let t_obs = ttest_columns(x);
    let identity = vec![1.0; n];
    let mut h0 = vec![max_abs_t(x, &identity)];

    let exact = n <= MAX_EXACT_SAMPLES && (1usize << n) <= n_permutations;
    if exact {
        for pattern in 1..(1usize << n) {
            let signs: Vec<f64> = (0..n)
                .map(|i| if pattern >> i & 1 == 1 { -1.0 } else { 1.0 })
                .collect();
            h0.push(max_abs_t(x, &signs));
        }
    } else {
        let mut rng = SeedStream::new(seed).rng(0);
        for _ in 1..n_permutations {
            let signs: Vec<f64> = (0..n)
                .map(|_| if rng.gen_bool(0.5) { -1.0 } else { 1.0 })
                .collect();
            h0.push(max_abs_t(x, &signs));
        }
    }

    let total = h0.len() as f64;
    let p_values = t_obs
        .iter()
        .map(|t| {
            let t = if t.is_finite() { t.abs() } else { 0.0 };
            h0.iter().filter(|&&h| h >= t).count() as f64 / total
        })
        .collect();

    Ok(PermutationTest {
        t_obs,
        p_values,
        h0,
    })
}

/// Intermediate and final maps of [`two_level_model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoLevelResult {
    /// Per event: subjects × ROIs signed-rank statistics.
    pub signed_rank: Vec<Matrix>,
    /// Subjects × ROIs t over events, non-finite values set to 0.
    pub first_level: Matrix,
    pub second_level: PermutationTest,
}

/// Event-related two-level model.
///
/// `empirical[e]` is subjects × ROIs; `surrogates[e][k]` has the same shape
/// for each of K surrogates.
pub fn two_level_model(
    empirical: &[Matrix],
    surrogates: &[Vec<Matrix>],
    n_permutations: usize,
    seed: u64,
) -> NigspResult<TwoLevelResult> {
    let n_events = empirical.len();
    if n_events == 0 {
        return Err(NigspError::InvalidType("two-level model needs events".to_string()));
    }
    if surrogates.len() != n_events {
        return Err(NigspError::shape("surrogate events", n_events, surrogates.len()));
    }
    let (s_len, r_len) = (empirical[0].rows(), empirical[0].cols());
    let k_len = surrogates[0].len();
    if k_len == 0 {
        return Err(NigspError::InvalidType(
            "two-level model needs at least one surrogate".to_string(),
        ));
    }
    for (e, (emp, surr)) in empirical.iter().zip(surrogates).enumerate() {
        if emp.rows() != s_len || emp.cols() != r_len {
            return Err(NigspError::shape(
                format!("empirical event {e}"),
                format!("{s_len}x{r_len}"),
                format!("{}x{}", emp.rows(), emp.cols()),
            ));
        }
        if surr.len() != k_len {
            return Err(NigspError::shape(format!("event {e} surrogates"), k_len, surr.len()));
        }
        if let Some(bad) = surr.iter().position(|m| m.rows() != s_len || m.cols() != r_len) {
            return Err(NigspError::shape(
                format!("event {e} surrogate {bad}"),
                format!("{s_len}x{r_len}"),
                format!("{}x{}", surr[bad].rows(), surr[bad].cols()),
            ));
        }
    }

    log::info!("computing signed-rank statistics for {n_events} events, {k_len} surrogates");
    let signed_rank: Vec<Matrix> = empirical
        .iter()
        .zip(surrogates)
        .map(|(emp, surr)| {
            let mut out = Matrix::zeros(s_len, r_len);
            for s in 0..s_len {
                for r in 0..r_len {
                    let diffs: Vec<f64> = surr.iter().map(|m| emp[(s, r)] - m[(s, r)]).collect();
                    out[(s, r)] = signed_rank_statistic(&diffs);
                }
            }
            out
        })
        .collect();

    log::info!("performing first-level tests");
    let mut first_level = Matrix::zeros(s_len, r_len);
    for s in 0..s_len {
        for r in 0..r_len {
            let per_event: Vec<f64> = signed_rank.iter().map(|m| m[(s, r)]).collect();
            let t = ttest_1samp_no_p(&per_event);
            first_level[(s, r)] = if t.is_finite() { t } else { 0.0 };
        }
    }

    log::info!("performing second-level tests");
    let second_level = permutation_t_test(&first_level, n_permutations, seed)?;

    Ok(TwoLevelResult {
        signed_rank,
        first_level,
        second_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttest_no_p() {
        // mean 2, var 1 (ddof 1), n 3 → 2 / sqrt(1/3)
        let t = ttest_1samp_no_p(&[1.0, 2.0, 3.0]);
        assert!((t - 2.0 * 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_signed_rank_all_positive() {
        // ranks 1..4 all positive → (1+2+3+4)/4
        assert!((signed_rank_statistic(&[0.1, 0.2, 0.3, 0.4]) - 2.5).abs() < 1e-12);
        assert!((signed_rank_statistic(&[-0.1, 0.1]) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_permutation_exact_enumeration() {
        let x = Matrix::from_rows(vec![vec![1.0], vec![1.2], vec![0.9], vec![1.1]]).unwrap();
        let r = permutation_t_test(&x, 1000, 0).unwrap();
        assert_eq!(r.h0.len(), 16);
        // only all-positive and all-negative patterns reach the observed |t|
        assert!((r.p_values[0] - 2.0 / 16.0).abs() < 1e-12, "p = {}", r.p_values[0]);
    }

    #[test]
    fn test_permutation_random_is_seeded() {
        let rows: Vec<Vec<f64>> = (0..25).map(|i| vec![(i as f64 * 0.3).sin(), 0.5]).collect();
        let x = Matrix::from_rows(rows).unwrap();
        let a = permutation_t_test(&x, 200, 7).unwrap();
        let b = permutation_t_test(&x, 200, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.h0.len(), 200);
    }

    #[test]
    fn test_two_level_shapes() {
        let emp: Vec<Matrix> = (0..3)
            .map(|e| Matrix::from_vec(4, 2, vec![1.0 + e as f64 * 0.1; 8]).unwrap())
            .collect();
        let surr: Vec<Vec<Matrix>> = (0..3)
            .map(|_| {
                (0..5)
                    .map(|k| Matrix::from_vec(4, 2, vec![k as f64 * 0.1; 8]).unwrap())
                    .collect()
            })
            .collect();
        let r = two_level_model(&emp, &surr, 100, 1).unwrap();
        assert_eq!(r.signed_rank.len(), 3);
        assert_eq!((r.first_level.rows(), r.first_level.cols()), (4, 2));
        assert_eq!(r.second_level.t_obs.len(), 2);
    }

    #[test]
    fn test_two_level_event_mismatch() {
        let emp = vec![Matrix::zeros(2, 2)];
        let err = two_level_model(&emp, &[], 10, 0).unwrap_err();
        assert!(matches!(err, NigspError::ShapeMismatch { .. }));
    }
}
