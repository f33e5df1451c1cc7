// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Band Filter
// ─────────────────────────────────────────────────────────────────────

use std::ops::Range;

use nigsp_types::{Matrix, NigspError, NigspResult, Signal};
use serde::{Deserialize, Serialize};

use crate::fourier::{inverse, BandSplit};

/// Node-domain reconstruction of one frequency band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSignal {
    band: Range<usize>,
    signal: Signal,
}

impl BandSignal {
    pub fn band(&self) -> Range<usize> {
        self.band.clone()
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn energy(&self) -> f64 {
        band_energy(&self.signal)
    }

    pub fn into_signal(self) -> Signal {
        self.signal
    }
}

fn check_band(band: &Range<usize>, n: usize) -> NigspResult<()> {
    if band.start >= band.end || band.end > n {
        return Err(NigspError::InvalidBandSpecification(format!(
            "band {band:?} is empty or exceeds {n} graph frequencies"
        )));
    }
    Ok(())
}

/// Zero every coefficient outside `band` and transform back.
pub fn filter(
    coefficients: &Signal,
    eigenvectors: &Matrix,
    band: Range<usize>,
) -> NigspResult<BandSignal> {
    let n = coefficients.n_nodes();
    check_band(&band, n)?;

    let t_len = coefficients.n_timepoints();
    let mut masked = coefficients.clone();
    for s in 0..coefficients.n_subjects() {
        let block = masked.subject_mut(s);
        for k in (0..n).filter(|k| !band.contains(k)) {
            block[k * t_len..(k + 1) * t_len].fill(0.0);
        }
    }
    let signal = inverse(&masked, eigenvectors)?;
    Ok(BandSignal { band, signal })
}

/// One band signal per band of `split`, in band order.
pub fn split(
    coefficients: &Signal,
    eigenvectors: &Matrix,
    split: &BandSplit,
) -> NigspResult<Vec<BandSignal>> {
    if split.n_nodes() != coefficients.n_nodes() {
        return Err(NigspError::shape(
            "band split size vs coefficient rows",
            split.n_nodes(),
            coefficients.n_nodes(),
        ));
    }
    log::debug!("splitting graph into {} bands", split.n_bands());
    split
        .bands()
        .into_iter()
        .map(|band| filter(coefficients, eigenvectors, band))
        .collect()
}

/// Total squared energy.
pub fn band_energy(signal: &Signal) -> f64 {
    signal.energy()
}

/// Eigenvector matrix with every column outside `band` zeroed.
pub fn band_eigenvectors(eigenvectors: &Matrix, band: Range<usize>) -> NigspResult<Matrix> {
    let n = eigenvectors.ensure_square()?;
    check_band(&band, n)?;
    let mut out = eigenvectors.clone();
    for r in 0..n {
        for c in (0..n).filter(|c| !band.contains(c)) {
            out[(r, c)] = 0.0;
        }
    }
    Ok(out)
}
