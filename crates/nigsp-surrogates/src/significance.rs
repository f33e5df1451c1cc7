// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Significance Testing
// ─────────────────────────────────────────────────────────────────────
//! Observed metric vs surrogate null distribution.
//!
//! Empirical: p = (# surrogates at least as extreme) / K.
//! Binomial:  each subject is one Bernoulli trial. A subject is flagged
//!            when its observed value ranks in the outer `threshold` of its
//!            own K surrogates; p = P(X ≥ flagged) for X ~ Bin(S, threshold).
//!            Needs an M × S metric, see [`bernoulli_significance`].
//! Two-tailed p-values are `min(1, 2·min(upper, lower))`.

use nigsp_types::{Matrix, NigspConfig, NigspError, NigspResult, Tail, TestMethod};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};

use crate::engine::NullDistribution;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceOptions {
    threshold: f64,
    tail: Tail,
    method: TestMethod,
}

impl SignificanceOptions {
    /// `threshold` must lie in (0, 1].
    pub fn new(threshold: f64, tail: Tail, method: TestMethod) -> NigspResult<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(NigspError::Config(format!(
                "significance threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self {
            threshold,
            tail,
            method,
        })
    }

    pub fn from_config(config: &NigspConfig) -> NigspResult<Self> {
        Self::new(config.p_threshold, config.tail, config.test_method)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn tail(&self) -> Tail {
        self.tail
    }

    pub fn method(&self) -> TestMethod {
        self.method
    }
}

impl Default for SignificanceOptions {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            tail: Tail::Two,
            method: TestMethod::Empirical,
        }
    }
}

/// Per-entry p-values and the mask of entries below threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub p_values: Vec<f64>,
    pub significant: Vec<bool>,
    pub threshold: f64,
    pub tail: Tail,
    pub method: TestMethod,
}

impl SignificanceResult {
    pub fn n_significant(&self) -> usize {
        self.significant.iter().filter(|&&s| s).count()
    }

    pub fn fraction_significant(&self) -> f64 {
        if self.significant.is_empty() {
            return 0.0;
        }
        self.n_significant() as f64 / self.significant.len() as f64
    }
}

// ── Binomial distribution ─────────────────────────────────────────────

fn binomial(n: u64, p: f64) -> NigspResult<Binomial> {
    Binomial::new(p, n).map_err(|e| NigspError::Config(format!("Bin({n}, {p}): {e}")))
}

/// `P(X ≤ k)` for `X ~ Bin(n, p)`.
pub fn binomial_cdf(k: u64, n: u64, p: f64) -> NigspResult<f64> {
    Ok(binomial(n, p)?.cdf(k))
}

/// `P(X ≥ k)` for `X ~ Bin(n, p)`.
pub fn binomial_sf(k: u64, n: u64, p: f64) -> NigspResult<f64> {
    let dist = binomial(n, p)?;
    Ok(if k == 0 { 1.0 } else { dist.sf(k - 1) })
}

// ── Entry-wise test ───────────────────────────────────────────────────

fn tail_counts(observed: f64, null: impl Iterator<Item = f64>) -> (u64, u64) {
    null.fold((0, 0), |(ge, le), v| {
        (ge + u64::from(v >= observed), le + u64::from(v <= observed))
    })
}

fn combine(tail: Tail, upper: f64, lower: f64) -> f64 {
    match tail {
        Tail::Upper => upper,
        Tail::Lower => lower,
        Tail::Two => (2.0 * upper.min(lower)).min(1.0),
    }
}

fn empirical_p(tail: Tail, (ge, le): (u64, u64), k: u64) -> f64 {
    combine(tail, ge as f64 / k as f64, le as f64 / k as f64)
}

fn check_observed(observed: &[f64]) -> NigspResult<()> {
    match observed.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(NigspError::NonFiniteValue {
            context: "observed metric".to_string(),
            index,
        }),
        None => Ok(()),
    }
}

fn warn_resolution(k: u64, threshold: f64) {
    if 1.0 / (k as f64) > threshold {
        log::warn!(
            "{k} surrogates cannot resolve p < {threshold}, at least {} are needed",
            (1.0 / threshold).ceil()
        );
    }
}

/// Test each observed entry against the matching column of `null`.
///
/// A flat null has no subject axis, so `TestMethod::Binomial` falls back
/// to empirical p-values here and the result records `Empirical`.
pub fn test_significance(
    observed: &[f64],
    null: &NullDistribution,
    opts: SignificanceOptions,
) -> NigspResult<SignificanceResult> {
    if observed.len() != null.n_entries() {
        return Err(NigspError::shape(
            "observed metric vs null distribution entries",
            null.n_entries(),
            observed.len(),
        ));
    }
    check_observed(observed)?;
    let k = null.n_samples() as u64;
    warn_resolution(k, opts.threshold);
    if opts.method == TestMethod::Binomial {
        log::warn!("binomial test needs per-subject values, using empirical p-values");
    }

    let p_values: Vec<f64> = observed
        .iter()
        .enumerate()
        .map(|(m, &obs)| {
            let counts = tail_counts(obs, null.samples().iter().map(|sample| sample[m]));
            empirical_p(opts.tail, counts, k)
        })
        .collect();
    let significant = p_values.iter().map(|&p| p < opts.threshold).collect();

    log::info!(
        "tested {} entries against {k} surrogates (empirical, {:?} tail)",
        observed.len(),
        opts.tail
    );

    Ok(SignificanceResult {
        p_values,
        significant,
        threshold: opts.threshold,
        tail: opts.tail,
        method: TestMethod::Empirical,
    })
}

// ── Subject-level trials ──────────────────────────────────────────────

fn check_subject_null(observed: &Matrix, null: &[Matrix]) -> NigspResult<()> {
    if null.is_empty() {
        return Err(NigspError::InvalidType(
            "subject-level test needs at least one surrogate".to_string(),
        ));
    }
    let (m_len, s_len) = (observed.rows(), observed.cols());
    for (k, surr) in null.iter().enumerate() {
        if surr.rows() != m_len || surr.cols() != s_len {
            return Err(NigspError::shape(
                format!("surrogate {k} shape"),
                format!("{m_len}x{s_len}"),
                format!("{}x{}", surr.rows(), surr.cols()),
            ));
        }
    }
    observed.ensure_finite("observed metric")
}

/// Rank of the observed value among K surrogates lands in the outer
/// `level` of the K + 1 positions.
fn in_outer(count: u64, k: u64, level: f64) -> bool {
    (count + 1) as f64 <= level * (k + 1) as f64
}

fn subject_flag(tail: Tail, (ge, le): (u64, u64), k: u64, level: f64) -> bool {
    match tail {
        Tail::Upper => in_outer(ge, k, level),
        Tail::Lower => in_outer(le, k, level),
        Tail::Two => in_outer(ge, k, level / 2.0) || in_outer(le, k, level / 2.0),
    }
}

/// Flag every (entry, subject) whose observed value sits in the outer
/// `level` of its own surrogates. Under exchangeable surrogates a flag
/// has probability at most `level`.
fn subject_mask(observed: &Matrix, null: &[Matrix], tail: Tail, level: f64) -> Vec<Vec<bool>> {
    let k = null.len() as u64;
    (0..observed.rows())
        .map(|m| {
            (0..observed.cols())
                .map(|s| {
                    let counts = tail_counts(observed[(m, s)], null.iter().map(|x| x[(m, s)]));
                    subject_flag(tail, counts, k, level)
                })
                .collect()
        })
        .collect()
}

/// Binomial test over subjects.
///
/// `observed` is M × S, `null` holds K matrices of the same shape. Each
/// subject flagged at `opts.threshold` counts as a success of a
/// Bernoulli(`threshold`) trial, and entry `m` gets
/// `p = P(X ≥ successes_m)` with `X ~ Bin(S, threshold)`. A single
/// subject has no trials to pool and falls back to empirical p-values.
pub fn bernoulli_significance(
    observed: &Matrix,
    null: &[Matrix],
    opts: SignificanceOptions,
) -> NigspResult<SignificanceResult> {
    check_subject_null(observed, null)?;
    let (m_len, s_len) = (observed.rows(), observed.cols());
    let k = null.len() as u64;

    if s_len < 2 {
        log::warn!("binomial test run on a single subject, using empirical p-values");
        let p_values: Vec<f64> = (0..m_len)
            .map(|m| {
                let counts = tail_counts(observed[(m, 0)], null.iter().map(|x| x[(m, 0)]));
                empirical_p(opts.tail, counts, k)
            })
            .collect();
        let significant = p_values.iter().map(|&p| p < opts.threshold).collect();
        return Ok(SignificanceResult {
            p_values,
            significant,
            threshold: opts.threshold,
            tail: opts.tail,
            method: TestMethod::Empirical,
        });
    }

    let resolvable = match opts.tail {
        Tail::Two => opts.threshold / 2.0,
        Tail::Upper | Tail::Lower => opts.threshold,
    };
    if 1.0 / (k + 1) as f64 > resolvable {
        log::warn!("{k} surrogates never flag a subject at p = {}", opts.threshold);
    }

    let mask = subject_mask(observed, null, opts.tail, opts.threshold);
    let trials = binomial(s_len as u64, opts.threshold)?;
    let p_values: Vec<f64> = mask
        .iter()
        .map(|row| {
            let successes = row.iter().filter(|&&f| f).count() as u64;
            if successes == 0 {
                1.0
            } else {
                trials.sf(successes - 1)
            }
        })
        .collect();
    let significant = p_values.iter().map(|&p| p < opts.threshold).collect();

    log::info!(
        "binomial test of {m_len} entries over {s_len} subjects and {k} surrogates ({:?} tail)",
        opts.tail
    );

    Ok(SignificanceResult {
        p_values,
        significant,
        threshold: opts.threshold,
        tail: opts.tail,
        method: TestMethod::Binomial,
    })
}

// ── Group-level Bernoulli test ────────────────────────────────────────

/// Outcome of [`group_bernoulli_test`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTestResult {
    /// Subject-level two-tailed mask, M × S.
    pub subject_mask: Vec<Vec<bool>>,
    /// Significant subjects per entry.
    pub counts: Vec<usize>,
    /// Smallest count declared significant at group level.
    pub critical_count: usize,
    pub significant: Vec<bool>,
}

/// Two-stage group test.
///
/// Stage 1 flags entry `m` of subject `s` when the observed value ranks in
/// the outer `p_subject / 2` of either tail of its K surrogates. Stage 2
/// treats each subject as a Bernoulli(`p_subject`) trial and declares an
/// entry significant when its count of flagged subjects has binomial tail
/// probability below `p_group / M` (Bonferroni over entries).
///
/// `observed` is M × S; `null` holds K matrices of the same shape.
pub fn group_bernoulli_test(
    observed: &Matrix,
    null: &[Matrix],
    p_subject: f64,
    p_group: f64,
) -> NigspResult<GroupTestResult> {
    for (name, p) in [("p_subject", p_subject), ("p_group", p_group)] {
        if !(p > 0.0 && p <= 1.0) {
            return Err(NigspError::Config(format!("{name} must be in (0, 1], got {p}")));
        }
    }
    check_subject_null(observed, null)?;
    let (m_len, s_len) = (observed.rows(), observed.cols());
    if s_len < 2 {
        log::warn!("group Bernoulli test run on a single subject");
    }

    let k = null.len();
    let mut level = p_subject;
    if 2.0 / (k + 1) as f64 > level {
        level = 2.0 / (k + 1) as f64;
        log::warn!(
            "{k} surrogates cannot resolve p = {p_subject} two-tailed, flagging subjects at p = {level}"
        );
    }

    let subject_mask = subject_mask(observed, null, Tail::Two, level);
    let counts: Vec<usize> = subject_mask
        .iter()
        .map(|row| row.iter().filter(|&&f| f).count())
        .collect();

    let alpha = p_group / m_len.max(1) as f64;
    let trials = binomial(s_len as u64, p_subject)?;
    let critical_count = (1..=s_len as u64)
        .find(|&c| trials.sf(c - 1) < alpha)
        .map_or(s_len + 1, |c| c as usize);
    let significant = counts.iter().map(|&c| c >= critical_count).collect();

    Ok(GroupTestResult {
        subject_mask,
        counts,
        critical_count,
        significant,
    })
}
