// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{NigspError, NigspResult};

/// Laplacian normalisation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalisation {
    /// `L = D − A`.
    None,
    /// `D^{-1/2} (D − A) D^{-1/2}`.
    #[default]
    Symmetric,
    /// `D^{-1} (D − A)`.
    RandomWalkIn,
    /// `(D − A) D^{-1}`.
    RandomWalkOut,
}

impl Normalisation {
    /// Whether the resulting Laplacian is symmetric for symmetric input.
    pub fn preserves_symmetry(self) -> bool {
        matches!(self, Normalisation::None | Normalisation::Symmetric)
    }
}

/// Treatment of the connectivity diagonal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfLoops {
    /// Diagonal zeroed.
    #[default]
    Exclude,
    /// Diagonal kept as given.
    Include,
    /// Diagonal replaced by these values.
    Custom(Vec<f64>),
    /// Diagonal replaced by each node's off-diagonal degree.
    Degree,
}

/// Handling of negative edge weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeWeights {
    /// Fail with `NegativeWeight`.
    #[default]
    Reject,
    /// `|w|`.
    Absolute,
    /// Negatives set to zero.
    Remove,
    /// `(w − min) / max` over the whole matrix.
    Rescale,
}

/// How the spectrum is partitioned into bands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSpec {
    /// Two bands split at the energy median.
    #[default]
    Median,
    /// Explicit strictly increasing cutoff indices.
    Explicit(Vec<usize>),
}

/// Null model used to randomise signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurrogateKind {
    #[default]
    RandomSign,
    StructureUninformed,
    StructureInformed,
    ConfigurationModel,
}

/// Which side of the null distribution counts as extreme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tail {
    Upper,
    Lower,
    #[default]
    Two,
}

/// How a p-value is derived from the surrogate counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestMethod {
    #[default]
    Empirical,
    Binomial,
}

/// Quantity compared between bands by SDI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdiMeasure {
    /// Sum of squares.
    #[default]
    Energy,
    /// L2 norm.
    Norm,
}

/// How SDI combines several subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdiPooling {
    /// Band measures summed over subjects, then one ratio per node.
    #[default]
    PooledEnergy,
    /// One ratio per subject, averaged, then log2.
    SubjectMean,
}

/// How per-subject functional connectivity is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FcAggregation {
    #[default]
    Mean,
    Concatenate,
}

/// Sign fixing applied to each eigenvector after decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Largest-magnitude component positive (first on ties).
    #[default]
    LargestComponentPositive,
    /// First component above tolerance positive.
    FirstNonZeroPositive,
    /// Solver output untouched.
    Unchanged,
}

/// Runtime configuration for a NiGSP analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NigspConfig {
    /// Laplacian normalisation. Default: symmetric.
    pub normalisation: Normalisation,

    /// Diagonal policy. Default: exclude.
    pub self_loops: SelfLoops,

    /// Negative-weight policy. Default: reject.
    pub negative_weights: NegativeWeights,

    /// Permit zero-degree nodes (zero rows in the normalised Laplacian).
    /// Default: true.
    pub allow_isolated: bool,

    /// Eigenvector sign fixing.
    pub sign_convention: SignConvention,

    /// Band partition. Default: median split.
    pub bands: BandSpec,

    /// Z-score every node time series before the transform. Default: true.
    pub zscore: bool,

    /// SDI band measure.
    pub sdi_measure: SdiMeasure,

    /// SDI subject pooling. Default: pooled energy.
    pub sdi_pooling: SdiPooling,

    /// FC aggregation across subjects.
    pub fc_aggregation: FcAggregation,

    /// Number of surrogate realisations K. Default: 1000.
    pub n_surrogates: usize,

    /// Null model.
    pub surrogate_kind: SurrogateKind,

    /// Degree quantile bins for structure-informed permutation. Default: 4.
    pub degree_bins: usize,

    /// Significance threshold, in (0, 1]. Default: 0.05.
    pub p_threshold: f64,

    pub tail: Tail,

    pub test_method: TestMethod,

    /// Base seed of every random stream. Default: 42.
    pub seed: u64,
}

impl Default for NigspConfig {
    fn default() -> Self {
        Self {
            normalisation: Normalisation::Symmetric,
            self_loops: SelfLoops::Exclude,
            negative_weights: NegativeWeights::Reject,
            allow_isolated: true,
            sign_convention: SignConvention::LargestComponentPositive,
            bands: BandSpec::Median,
            zscore: true,
            sdi_measure: SdiMeasure::Energy,
            sdi_pooling: SdiPooling::PooledEnergy,
            fc_aggregation: FcAggregation::Mean,
            n_surrogates: 1000,
            surrogate_kind: SurrogateKind::RandomSign,
            degree_bins: 4,
            p_threshold: 0.05,
            tail: Tail::Two,
            test_method: TestMethod::Empirical,
            seed: 42,
        }
    }
}

impl NigspConfig {
    /// Validate configuration parameters that do not depend on data shape.
    pub fn validate(&self) -> NigspResult<()> {
        if !(self.p_threshold > 0.0 && self.p_threshold <= 1.0) {
            return Err(NigspError::Config(format!(
                "p_threshold must be in (0, 1], got {}",
                self.p_threshold
            )));
        }
        if !self.normalisation.preserves_symmetry() {
            return Err(NigspError::Config(format!(
                "{:?} normalisation gives a non-symmetric Laplacian with no orthonormal \
                 eigenbasis; use none or symmetric",
                self.normalisation
            )));
        }
        if self.n_surrogates == 0 {
            return Err(NigspError::Config(
                "n_surrogates must be >= 1".to_string(),
            ));
        }
        if self.degree_bins == 0 {
            return Err(NigspError::Config(
                "degree_bins must be >= 1".to_string(),
            ));
        }
        if let SelfLoops::Custom(values) = &self.self_loops {
            if let Some(v) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(NigspError::Config(format!(
                    "custom self-loop weights must be finite and >= 0, got {v}"
                )));
            }
        }
        if let BandSpec::Explicit(cutoffs) = &self.bands {
            if cutoffs.is_empty() {
                return Err(NigspError::Config(
                    "explicit band cutoffs must not be empty".to_string(),
                ));
            }
            if cutoffs.windows(2).any(|w| w[0] >= w[1]) {
                return Err(NigspError::Config(format!(
                    "explicit band cutoffs must be strictly increasing, got {cutoffs:?}"
                )));
            }
            if cutoffs[0] == 0 {
                return Err(NigspError::Config(
                    "band cutoff 0 would produce an empty first band".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> NigspResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| NigspError::Config(format!("JSON parse error: {e}")))
    }

    pub fn to_json(&self) -> NigspResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| NigspError::Config(format!("JSON encode error: {e}")))
    }
}
