// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Graph Signal Processing
// License: Apache-2.0
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Signal side of the kernel: graph Fourier transform, band filtering,
//! time-series operations and structural decoupling metrics.

pub mod filter;
pub mod fourier;
pub mod metrics;
pub mod timeseries;

pub use filter::{band_eigenvectors, band_energy, filter, split, BandSignal};
pub use fourier::{
    forward, inverse, median_cutoff, resolve_split, spectral_energy, BandSplit,
};
pub use metrics::{
    energy_ratio, gsdi, gsdi_pairs, log_energy_ratio, sdi, sdi_per_subject, GsdiPair,
    SdiOptions, ENERGY_FLOOR, MAX_PAIR_BANDS,
};
pub use timeseries::{functional_connectivity, normalise_timeseries};
