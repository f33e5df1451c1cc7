// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Core
// License: Apache-2.0
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Session aggregate and pipeline for structure-function decoupling
//! analysis on a structural graph.
//!
//! A run starts from an [`ScGraph`] (connectivity + signal) and moves
//! through immutable stages, each produced by consuming the previous one:
//!
//! 1. [`StructuralGraph`]: Laplacian of the connectivity matrix
//! 2. [`DecomposedGraph`]: eigenpairs and graph Fourier coefficients
//! 3. [`SplitGraph`]: band split and per-band reconstructions
//! 4. [`AnalysedGraph`]: node strength, FC, zero-crossings, SDI, gSDI
//! 5. [`TestedGraph`]: surrogate null distribution and significance
//!
//! [`Pipeline`] composes the stages from a [`nigsp_types::NigspConfig`].

pub mod pipeline;
pub mod session;

pub use pipeline::Pipeline;
pub use session::{
    AnalysedGraph, AnalysisOptions, DecomposedGraph, GraphMetrics, ScGraph, SplitGraph,
    StructuralGraph, TestedGraph,
};
