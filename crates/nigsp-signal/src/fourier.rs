// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Graph Fourier Engine
// ─────────────────────────────────────────────────────────────────────
//! Projection of node signals onto the Laplacian eigenbasis and the
//! partition of that basis into frequency bands.
//!
//! For an orthonormal basis `V` (columns = eigenvectors):
//!   forward:  X̂ = Vᵗ X
//!   inverse:  X  = V X̂
//! applied independently to each subject block.

use std::ops::Range;

use nigsp_types::{BandSpec, Matrix, NigspError, NigspResult, Signal};
use serde::{Deserialize, Serialize};

fn check_basis(signal: &Signal, eigenvectors: &Matrix) -> NigspResult<usize> {
    let n = eigenvectors.ensure_square()?;
    if signal.n_nodes() != n {
        return Err(NigspError::shape(
            "signal nodes vs eigenvector rows",
            n,
            signal.n_nodes(),
        ));
    }
    Ok(n)
}

fn project(signal: &Signal, eigenvectors: &Matrix, transpose: bool) -> NigspResult<Signal> {
    let n = check_basis(signal, eigenvectors)?;
    let (_, t_len, s_len) = signal.shape();
    let mut out = Signal::zeros(n, t_len, s_len);
    for s in 0..s_len {
        let x = signal.subject(s);
        let y = out.subject_mut(s);
        for k in 0..n {
            let out_row = &mut y[k * t_len..(k + 1) * t_len];
            for i in 0..n {
                let coeff = if transpose {
                    eigenvectors[(i, k)]
                } else {
                    eigenvectors[(k, i)]
                };
                if coeff == 0.0 {
                    continue;
                }
                let in_row = &x[i * t_len..(i + 1) * t_len];
                for (o, &v) in out_row.iter_mut().zip(in_row) {
                    *o += coeff * v;
                }
            }
        }
    }
    Ok(out)
}

/// Graph Fourier transform: `Vᵗ X` per subject.
pub fn forward(signal: &Signal, eigenvectors: &Matrix) -> NigspResult<Signal> {
    signal.ensure_finite("signal")?;
    project(signal, eigenvectors, true)
}

/// Inverse graph Fourier transform: `V X̂` per subject.
pub fn inverse(coefficients: &Signal, eigenvectors: &Matrix) -> NigspResult<Signal> {
    project(coefficients, eigenvectors, false)
}

/// Energy per graph frequency, summed over time and subjects.
pub fn spectral_energy(coefficients: &Signal) -> Vec<f64> {
    let (n, _, s_len) = coefficients.shape();
    let mut energy = vec![0.0; n];
    for s in 0..s_len {
        for (k, e) in energy.iter_mut().enumerate() {
            *e += coefficients.series(k, s).iter().map(|v| v * v).sum::<f64>();
        }
    }
    energy
}

/// Smallest `k` in `[1, N−1]` with `Σ_{i<k} e_i ≥ ½ Σ e_i`.
///
/// An all-zero spectrum has no meaningful median and yields `k = 1`.
pub fn median_cutoff_from_energy(energy: &[f64]) -> NigspResult<usize> {
    let n = energy.len();
    if n < 2 {
        return Err(NigspError::InvalidBandSpecification(format!(
            "median split needs at least 2 graph frequencies, got {n}"
        )));
    }
    let total: f64 = energy.iter().sum();
    if total <= 0.0 {
        log::warn!("spectral energy is zero everywhere, using cutoff 1");
        return Ok(1);
    }
    let half = total / 2.0;
    let mut cumulative = 0.0;
    for k in 1..n {
        cumulative += energy[k - 1];
        if cumulative >= half {
            log::info!("found {k} as splitting index");
            return Ok(k);
        }
    }
    log::info!("found {} as splitting index", n - 1);
    Ok(n - 1)
}

/// Energy-median split point of a set of spectral coefficients.
pub fn median_cutoff(coefficients: &Signal) -> NigspResult<usize> {
    median_cutoff_from_energy(&spectral_energy(coefficients))
}

/// Strictly increasing cutoffs partitioning `0..N` into contiguous bands.
///
/// Band `b` covers `[c_{b-1}, c_b)` with `c_{-1} = 0` and `c_B = N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSplit {
    cutoffs: Vec<usize>,
    n_nodes: usize,
}

impl BandSplit {
    pub fn new(cutoffs: Vec<usize>, n_nodes: usize) -> NigspResult<Self> {
        if cutoffs.is_empty() {
            return Err(NigspError::InvalidBandSpecification(
                "at least one cutoff is required".to_string(),
            ));
        }
        if n_nodes < 2 {
            return Err(NigspError::InvalidBandSpecification(format!(
                "cannot split {n_nodes} graph frequencies"
            )));
        }
        if let Some(&c) = cutoffs.iter().find(|&&c| c == 0 || c > n_nodes - 1) {
            return Err(NigspError::InvalidBandSpecification(format!(
                "cutoff {c} outside [1, {}]",
                n_nodes - 1
            )));
        }
        if cutoffs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(NigspError::InvalidBandSpecification(format!(
                "cutoffs must be strictly increasing, got {cutoffs:?}"
            )));
        }
        Ok(Self { cutoffs, n_nodes })
    }

    /// Low/high split at `cutoff`.
    pub fn two_band(cutoff: usize, n_nodes: usize) -> NigspResult<Self> {
        Self::new(vec![cutoff], n_nodes)
    }

    pub fn cutoffs(&self) -> &[usize] {
        &self.cutoffs
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_bands(&self) -> usize {
        self.cutoffs.len() + 1
    }

    pub fn band(&self, b: usize) -> Range<usize> {
        let start = if b == 0 { 0 } else { self.cutoffs[b - 1] };
        let end = self.cutoffs.get(b).copied().unwrap_or(self.n_nodes);
        start..end
    }

    pub fn bands(&self) -> Vec<Range<usize>> {
        (0..self.n_bands()).map(|b| self.band(b)).collect()
    }
}

/// Turn a configured band spec into a concrete split for these coefficients.
pub fn resolve_split(spec: &BandSpec, coefficients: &Signal) -> NigspResult<BandSplit> {
    let n = coefficients.n_nodes();
    match spec {
        BandSpec::Median => BandSplit::two_band(median_cutoff(coefficients)?, n),
        BandSpec::Explicit(cutoffs) => BandSplit::new(cutoffs.clone(), n),
    }
}
