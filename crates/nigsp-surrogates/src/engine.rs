// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Surrogate Engine
// ─────────────────────────────────────────────────────────────────────
//! Configured engine → surrogate set → null distribution → test result.
//!
//! Realisations run on the rayon pool. Each one draws from its own
//! [`SeedStream`] stream keyed by its index and results are collected in
//! index order, so output is bit-identical for a fixed (seed, K) whatever
//! the pool size. The first failing realisation aborts the run.

use nigsp_graph::laplacian::Laplacian;
use nigsp_graph::spectral::{decompose, EigenDecomposition};
use nigsp_signal::fourier::forward;
use nigsp_types::{
    Matrix, NigspConfig, NigspError, NigspResult, SignConvention, Signal, SurrogateKind,
    TestMethod,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rng::SeedStream;
use crate::significance::{
    bernoulli_significance, test_significance, SignificanceOptions, SignificanceResult,
};
use crate::surrogates::{configuration_laplacian, degree_strata, permute_nodes, sign_flip_signal};

/// Per-run state shared read-only by every realisation.
enum Plan {
    SignFlip { coefficients: Signal, basis: Matrix },
    Permute { groups: Vec<Vec<usize>> },
}

/// CONFIGURED state: null model, K and seed.
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateEngine {
    kind: SurrogateKind,
    n_surrogates: usize,
    seeds: SeedStream,
    degree_bins: usize,
    sign_convention: SignConvention,
}

impl SurrogateEngine {
    pub fn new(kind: SurrogateKind, n_surrogates: usize, seed: u64) -> NigspResult<Self> {
        if n_surrogates == 0 {
            return Err(NigspError::Config("n_surrogates must be >= 1".to_string()));
        }
        Ok(Self {
            kind,
            n_surrogates,
            seeds: SeedStream::new(seed),
            degree_bins: 4,
            sign_convention: SignConvention::default(),
        })
    }

    pub fn from_config(config: &NigspConfig) -> NigspResult<Self> {
        Ok(Self::new(config.surrogate_kind, config.n_surrogates, config.seed)?
            .with_degree_bins(config.degree_bins)
            .with_sign_convention(config.sign_convention))
    }

    /// Quantile bins used by `StructureInformed`.
    pub fn with_degree_bins(mut self, bins: usize) -> Self {
        self.degree_bins = bins.max(1);
        self
    }

    /// Sign convention of the configuration-model basis.
    pub fn with_sign_convention(mut self, sign: SignConvention) -> Self {
        self.sign_convention = sign;
        self
    }

    pub fn kind(&self) -> SurrogateKind {
        self.kind
    }

    pub fn n_surrogates(&self) -> usize {
        self.n_surrogates
    }

    pub fn seed(&self) -> u64 {
        self.seeds.seed()
    }

    fn plan(
        &self,
        signal: &Signal,
        laplacian: &Laplacian,
        eigen: &EigenDecomposition,
    ) -> NigspResult<Plan> {
        let n = signal.n_nodes();
        if laplacian.n_nodes() != n || eigen.n_nodes() != n {
            return Err(NigspError::shape(
                "surrogate signal nodes vs graph nodes",
                laplacian.n_nodes(),
                n,
            ));
        }
        match self.kind {
            SurrogateKind::RandomSign => Ok(Plan::SignFlip {
                coefficients: forward(signal, eigen.eigenvectors())?,
                basis: eigen.eigenvectors().clone(),
            }),
            SurrogateKind::ConfigurationModel => {
                let conf = configuration_laplacian(laplacian)?;
                let basis = decompose(&conf, self.sign_convention)?.into_parts().1;
                Ok(Plan::SignFlip {
                    coefficients: forward(signal, &basis)?,
                    basis,
                })
            }
            SurrogateKind::StructureUninformed => Ok(Plan::Permute {
                groups: vec![(0..n).collect()],
            }),
            SurrogateKind::StructureInformed => {
                if self.degree_bins >= n {
                    return Err(NigspError::Config(format!(
                        "degree_bins = {} leaves every one of {n} nodes in its own stratum, \
                         so no node is ever permuted",
                        self.degree_bins
                    )));
                }
                let groups = degree_strata(laplacian.degree(), self.degree_bins);
                let fixed = groups.iter().filter(|g| g.len() < 2).count();
                if fixed > 0 {
                    log::warn!(
                        "{fixed} of {} degree strata hold a single node that is never permuted",
                        groups.len()
                    );
                }
                Ok(Plan::Permute { groups })
            }
        }
    }

    /// GENERATING: build K realisations of `signal`.
    pub fn generate(
        &self,
        signal: &Signal,
        laplacian: &Laplacian,
        eigen: &EigenDecomposition,
    ) -> NigspResult<SurrogateSet> {
        signal.ensure_finite("signal")?;
        let plan = self.plan(signal, laplacian, eigen)?;
        log::info!(
            "generating {} {:?} surrogates (seed {})",
            self.n_surrogates,
            self.kind,
            self.seeds.seed()
        );

        let realisations = (0..self.n_surrogates)
            .into_par_iter()
            .map(|k| {
                let mut rng = self.seeds.rng(k as u64);
                match &plan {
                    Plan::SignFlip {
                        coefficients,
                        basis,
                    } => sign_flip_signal(coefficients, basis, &mut rng),
                    Plan::Permute { groups } => permute_nodes(signal, groups, &mut rng),
                }
            })
            .collect::<NigspResult<Vec<Signal>>>()?;

        Ok(SurrogateSet {
            kind: self.kind,
            seed: self.seeds.seed(),
            realisations,
        })
    }
}

/// K surrogate signals, in realisation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurrogateSet {
    kind: SurrogateKind,
    seed: u64,
    realisations: Vec<Signal>,
}

impl SurrogateSet {
    pub fn kind(&self) -> SurrogateKind {
        self.kind
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.realisations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realisations.is_empty()
    }

    pub fn get(&self, k: usize) -> Option<&Signal> {
        self.realisations.get(k)
    }

    pub fn realisations(&self) -> &[Signal] {
        &self.realisations
    }

    /// AGGREGATED: evaluate `metric` on every realisation in parallel.
    pub fn null_distribution<F>(&self, metric: F) -> NigspResult<NullDistribution>
    where
        F: Fn(&Signal) -> NigspResult<Vec<f64>> + Sync,
    {
        let samples = self
            .realisations
            .par_iter()
            .map(&metric)
            .collect::<NigspResult<Vec<Vec<f64>>>>()?;
        NullDistribution::new(samples)
    }
}

/// K metric vectors of equal length M.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullDistribution {
    samples: Vec<Vec<f64>>,
}

impl NullDistribution {
    pub fn new(samples: Vec<Vec<f64>>) -> NigspResult<Self> {
        let m = samples.first().map(Vec::len).ok_or_else(|| {
            NigspError::InvalidType("null distribution needs at least one sample".to_string())
        })?;
        for (k, s) in samples.iter().enumerate() {
            if s.len() != m {
                return Err(NigspError::shape(format!("null sample {k} length"), m, s.len()));
            }
            if let Some(i) = s.iter().position(|v| !v.is_finite()) {
                return Err(NigspError::NonFiniteValue {
                    context: format!("null sample {k}"),
                    index: i,
                });
            }
        }
        Ok(Self { samples })
    }

    /// Number of surrogates K.
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Metric length M.
    pub fn n_entries(&self) -> usize {
        self.samples[0].len()
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// All K values of entry `m`.
    pub fn column(&self, m: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s[m]).collect()
    }

    pub fn mean(&self) -> Vec<f64> {
        let k = self.n_samples() as f64;
        (0..self.n_entries())
            .map(|m| self.samples.iter().map(|s| s[m]).sum::<f64>() / k)
            .collect()
    }

    /// Each sample reshaped to `rows × cols`, for metrics that were
    /// flattened row-major from a per-subject matrix.
    pub fn to_matrices(&self, rows: usize, cols: usize) -> NigspResult<Vec<Matrix>> {
        self.samples
            .iter()
            .map(|s| Matrix::from_vec(rows, cols, s.clone()))
            .collect()
    }

    /// TESTED: compare an observed metric against this distribution.
    pub fn test(
        &self,
        observed: &[f64],
        opts: SignificanceOptions,
    ) -> NigspResult<SignificanceResult> {
        test_significance(observed, self, opts)
    }

    /// TESTED per subject: `observed` is M × S, every sample holds the same
    /// M × S values flattened row-major.
    pub fn test_subjects(
        &self,
        observed: &Matrix,
        opts: SignificanceOptions,
    ) -> NigspResult<SignificanceResult> {
        let null = self.to_matrices(observed.rows(), observed.cols())?;
        match opts.method() {
            TestMethod::Binomial => bernoulli_significance(observed, &null, opts),
            TestMethod::Empirical => {
                let pooled = |x: &Matrix| {
                    (0..x.rows())
                        .map(|m| x.row(m).iter().sum::<f64>() / x.cols() as f64)
                        .collect::<Vec<f64>>()
                };
                let means = NullDistribution::new(null.iter().map(pooled).collect())?;
                test_significance(&pooled(observed), &means, opts)
            }
        }
    }
}
