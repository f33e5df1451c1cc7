// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Types
// License: Apache-2.0
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Error hierarchy, configuration and dense arrays shared by every
//! NiGSP kernel crate.

pub mod array;
pub mod config;
pub mod error;
pub mod stats;

pub use array::{Matrix, Signal};
pub use config::{
    BandSpec, FcAggregation, NegativeWeights, NigspConfig, Normalisation, SdiMeasure,
    SdiPooling, SelfLoops, SignConvention, SurrogateKind, Tail, TestMethod,
};
pub use error::{NigspError, NigspResult};
