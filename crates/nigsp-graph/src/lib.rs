// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Graph Structure
// License: Apache-2.0
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Structural side of the kernel.
//!
//! Architecture:
//!   - Laplacian: connectivity → degree → (normalised) Laplacian
//!   - Spectral: cyclic Jacobi eigensolver, ascending sort, sign convention
//!   - Graph: node strength, edge zero-crossings, ordering consistency

pub mod graph;
pub mod laplacian;
pub mod spectral;

pub use graph::{node_strength, ordering_consistency, zero_crossings};
pub use laplacian::{build_laplacian, degree, normalise, Laplacian, LaplacianOptions};
pub use spectral::{decompose, recompose, EigenDecomposition};
