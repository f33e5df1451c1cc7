// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Surrogates & Significance
// License: Apache-2.0
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Null models for graph signal metrics.
//!
//! Architecture:
//!   - Rng: one seeded ChaCha8 stream per realisation index
//!   - Surrogates: sign flip, node permutation, configuration model
//!   - Engine: parallel generation → null distribution
//!   - Significance: empirical p-values, subject-level binomial test,
//!     group Bernoulli test
//!   - Statistics: signed-rank, permutation t-test, two-level model

pub mod engine;
pub mod rng;
pub mod significance;
pub mod statistics;
pub mod surrogates;

pub use engine::{NullDistribution, SurrogateEngine, SurrogateSet};
pub use rng::SeedStream;
pub use significance::{
    bernoulli_significance, binomial_cdf, binomial_sf, group_bernoulli_test, test_significance,
    GroupTestResult, SignificanceOptions, SignificanceResult,
};
pub use statistics::{
    permutation_t_test, signed_rank_statistic, ttest_1samp_no_p, two_level_model,
    PermutationTest, TwoLevelResult,
};
pub use surrogates::{
    configuration_laplacian, degree_strata, permute_nodes, random_sign, sign_flip_signal,
};
