// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Time-Series Operations
// ─────────────────────────────────────────────────────────────────────

use nigsp_types::stats::{mean, pearson, std_dev};
use nigsp_types::{FcAggregation, Matrix, NigspResult, Signal};

/// Z-score every node series over time, per subject (ddof = 1).
///
/// Zero-variance series become all zeros. A single-timepoint signal is
/// returned unchanged.
pub fn normalise_timeseries(signal: &Signal) -> NigspResult<Signal> {
    signal.ensure_finite("signal")?;
    let (n, t_len, s_len) = signal.shape();
    if t_len < 2 {
        log::warn!("signal has a single timepoint, returning it as is");
        return Ok(signal.clone());
    }
    let mut out = signal.clone();
    for s in 0..s_len {
        for i in 0..n {
            let series = signal.series(i, s);
            let m = mean(series);
            let sd = std_dev(series, 1);
            let block = out.subject_mut(s);
            let row = &mut block[i * t_len..(i + 1) * t_len];
            if sd > 0.0 {
                for v in row.iter_mut() {
                    *v = (*v - m) / sd;
                }
            } else {
                row.fill(0.0);
            }
        }
    }
    Ok(out)
}

fn correlation_matrix(series: &[Vec<f64>]) -> Matrix {
    let n = series.len();
    let mut fc = Matrix::identity(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let r = pearson(&series[i], &series[j]).unwrap_or(0.0);
            fc[(i, j)] = r;
            fc[(j, i)] = r;
        }
    }
    fc
}

/// Pearson correlation between node time series.
///
/// Nodes with zero variance correlate 0 with every other node and 1 with
/// themselves.
pub fn functional_connectivity(signal: &Signal, aggregation: FcAggregation) -> NigspResult<Matrix> {
    signal.ensure_finite("signal")?;
    let (n, _, s_len) = signal.shape();
    match aggregation {
        FcAggregation::Concatenate => {
            let series: Vec<Vec<f64>> = (0..n)
                .map(|i| {
                    (0..s_len)
                        .flat_map(|s| signal.series(i, s).iter().copied())
                        .collect()
                })
                .collect();
            Ok(correlation_matrix(&series))
        }
        FcAggregation::Mean => {
            let mut acc = Matrix::zeros(n, n);
            for s in 0..s_len {
                let series: Vec<Vec<f64>> =
                    (0..n).map(|i| signal.series(i, s).to_vec()).collect();
                let fc = correlation_matrix(&series);
                for (a, v) in acc.as_mut_slice().iter_mut().zip(fc.as_slice()) {
                    *a += v;
                }
            }
            for a in acc.as_mut_slice() {
                *a /= s_len as f64;
            }
            Ok(acc)
        }
    }
}
