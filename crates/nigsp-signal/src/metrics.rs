// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Structural Decoupling Metrics
// ─────────────────────────────────────────────────────────────────────
//! SDI and generalised SDI.
//!
//! SDI_i = log2(E_high,i / E_low,i), with E pooled over time and subjects,
//! or under `SdiPooling::SubjectMean` the log2 of the subject-averaged ratio.
//! Positive values mean a node's activity is dominated by graph-frequency
//! components that disagree with the structure (decoupled); negative values
//! mean it follows the structure (coupled).

use nigsp_types::{Matrix, NigspError, NigspResult, SdiMeasure, SdiPooling, Signal};
use serde::{Deserialize, Serialize};

use crate::filter::BandSignal;

/// Energies below this are floored before taking a ratio.
pub const ENERGY_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdiOptions {
    pub measure: SdiMeasure,
    pub pooling: SdiPooling,
}

impl SdiOptions {
    pub fn new(measure: SdiMeasure) -> Self {
        Self {
            measure,
            pooling: SdiPooling::default(),
        }
    }

    pub fn with_pooling(mut self, pooling: SdiPooling) -> Self {
        self.pooling = pooling;
        self
    }
}

/// `numerator / denominator` of two energies.
///
/// Both zero gives 1; otherwise each side is floored at [`ENERGY_FLOOR`].
/// Under `SdiMeasure::Norm` the ratio is of square roots.
pub fn energy_ratio(numerator: f64, denominator: f64, measure: SdiMeasure) -> f64 {
    if numerator == 0.0 && denominator == 0.0 {
        return 1.0;
    }
    let ratio = numerator.max(ENERGY_FLOOR) / denominator.max(ENERGY_FLOOR);
    match measure {
        SdiMeasure::Energy => ratio,
        SdiMeasure::Norm => ratio.sqrt(),
    }
}

/// `log2` of [`energy_ratio`].
pub fn log_energy_ratio(numerator: f64, denominator: f64, measure: SdiMeasure) -> f64 {
    energy_ratio(numerator, denominator, measure).log2()
}

fn node_energy(signal: &Signal, node: usize, subject: usize) -> f64 {
    signal.series(node, subject).iter().map(|v| v * v).sum()
}

/// `log2(num / den)` at one node, pooled over subjects per `opts`.
fn pooled_log_ratio(num: &Signal, den: &Signal, node: usize, opts: SdiOptions) -> f64 {
    let s_len = num.n_subjects();
    match opts.pooling {
        SdiPooling::PooledEnergy => {
            let en: f64 = (0..s_len).map(|s| node_energy(num, node, s)).sum();
            let ed: f64 = (0..s_len).map(|s| node_energy(den, node, s)).sum();
            log_energy_ratio(en, ed, opts.measure)
        }
        SdiPooling::SubjectMean => {
            let total: f64 = (0..s_len)
                .map(|s| {
                    energy_ratio(node_energy(num, node, s), node_energy(den, node, s), opts.measure)
                })
                .sum();
            (total / s_len as f64).log2()
        }
    }
}

fn check_pair(low: &Signal, high: &Signal) -> NigspResult<()> {
    low.ensure_same_shape(high, "low vs high band signal")
}

/// Per-node SDI over all subjects.
pub fn sdi(low: &Signal, high: &Signal, opts: SdiOptions) -> NigspResult<Vec<f64>> {
    check_pair(low, high)?;
    Ok((0..low.n_nodes())
        .map(|i| pooled_log_ratio(high, low, i, opts))
        .collect())
}

/// SDI computed separately for each subject: N × S.
pub fn sdi_per_subject(low: &Signal, high: &Signal, opts: SdiOptions) -> NigspResult<Matrix> {
    check_pair(low, high)?;
    let (n, _, s_len) = low.shape();
    let mut out = Matrix::zeros(n, s_len);
    for i in 0..n {
        for s in 0..s_len {
            out[(i, s)] =
                log_energy_ratio(node_energy(high, i, s), node_energy(low, i, s), opts.measure);
        }
    }
    Ok(out)
}

/// Generalised SDI: one column per non-reference band, in band order,
/// holding `log2(E_b / E_reference)` per node.
pub fn gsdi(bands: &[BandSignal], reference: usize, opts: SdiOptions) -> NigspResult<Matrix> {
    if bands.len() < 2 {
        return Err(NigspError::InvalidBandSpecification(format!(
            "gSDI needs at least 2 bands, got {}",
            bands.len()
        )));
    }
    if reference >= bands.len() {
        return Err(NigspError::InvalidBandSpecification(format!(
            "reference band {reference} out of range for {} bands",
            bands.len()
        )));
    }
    let ref_signal = bands[reference].signal();
    for (b, band) in bands.iter().enumerate() {
        ref_signal.ensure_same_shape(band.signal(), &format!("band {b} vs reference"))?;
    }

    let n = ref_signal.n_nodes();
    let mut out = Matrix::zeros(n, bands.len() - 1);
    let others = bands.iter().enumerate().filter(|(b, _)| *b != reference);
    for (col, (_, band)) in others.enumerate() {
        for i in 0..n {
            out[(i, col)] = pooled_log_ratio(band.signal(), ref_signal, i, opts);
        }
    }
    Ok(out)
}

/// Above this many bands the combined-band enumeration is refused.
pub const MAX_PAIR_BANDS: usize = 12;

/// One labelled column of [`gsdi_pairs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsdiPair {
    /// `"k_over_j"` for two bands, `"k_over_(a_and_b)"` for a combined one.
    pub label: String,
    /// Per-node `log2(E_k / E_j)`.
    pub values: Vec<f64>,
}

fn band_set_label(members: &[usize]) -> String {
    match members {
        [single] => single.to_string(),
        _ => {
            let joined: Vec<String> = members.iter().map(usize::to_string).collect();
            format!("({})", joined.join("_and_"))
        }
    }
}

/// Every subset of `0..n` with between 1 and `n - 1` members, smallest
/// first, lexicographic within a size.
fn band_sets(n: usize) -> Vec<Vec<usize>> {
    let mut sets: Vec<Vec<usize>> = (1u32..(1 << n) - 1)
        .map(|mask| (0..n).filter(|b| mask & (1 << b) != 0).collect())
        .collect();
    sets.sort_by(|a: &Vec<usize>, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    sets
}

fn summed(bands: &[BandSignal], members: &[usize]) -> NigspResult<Signal> {
    let first = bands[members[0]].signal();
    let (n, t, s) = first.shape();
    let mut data = first.as_slice().to_vec();
    for &b in &members[1..] {
        for (acc, v) in data.iter_mut().zip(bands[b].signal().as_slice()) {
            *acc += v;
        }
    }
    Signal::from_vec(n, t, s, data)
}

/// gSDI of every band against every other band and every combination of
/// bands that leaves it out. Combined bands are the sum of their band
/// signals. With two bands this is `0_over_1` and `1_over_0`.
pub fn gsdi_pairs(bands: &[BandSignal], opts: SdiOptions) -> NigspResult<Vec<GsdiPair>> {
    if bands.len() < 2 {
        return Err(NigspError::InvalidBandSpecification(format!(
            "gSDI needs at least 2 bands, got {}",
            bands.len()
        )));
    }
    if bands.len() > MAX_PAIR_BANDS {
        return Err(NigspError::InvalidBandSpecification(format!(
            "combined-band gSDI supports at most {MAX_PAIR_BANDS} bands, got {}",
            bands.len()
        )));
    }
    let first = bands[0].signal();
    for (b, band) in bands.iter().enumerate().skip(1) {
        first.ensure_same_shape(band.signal(), &format!("band {b} vs band 0"))?;
    }

    let sets = band_sets(bands.len());
    let denominators = sets
        .iter()
        .map(|members| summed(bands, members))
        .collect::<NigspResult<Vec<Signal>>>()?;

    let n = first.n_nodes();
    let mut out = Vec::new();
    for (k, band) in bands.iter().enumerate() {
        for (members, den) in sets.iter().zip(&denominators) {
            if members.contains(&k) {
                continue;
            }
            out.push(GsdiPair {
                label: format!("{k}_over_{}", band_set_label(members)),
                values: (0..n)
                    .map(|i| pooled_log_ratio(band.signal(), den, i, opts))
                    .collect(),
            });
        }
    }
    log::debug!("gSDI over {} bands: {} labelled pairs", bands.len(), out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::split;
    use crate::fourier::{forward, BandSplit};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sdi_simple() {
        let low = Signal::from_vec(2, 2, 1, vec![1.0, 1.0, 2.0, 0.0]).unwrap();
        let high = Signal::from_vec(2, 2, 1, vec![2.0, 2.0, 1.0, 1.0]).unwrap();
        let v = sdi(&low, &high, SdiOptions::default()).unwrap();
        assert_abs_diff_eq!(v[0], 2.0, epsilon = 1e-12); // 8 / 2
        assert_abs_diff_eq!(v[1], -1.0, epsilon = 1e-12); // 2 / 4
    }

    #[test]
    fn test_sdi_antisymmetric() {
        let a = Signal::from_vec(3, 2, 2, (0..12).map(|i| (i as f64 * 0.7).sin()).collect())
            .unwrap();
        let b = Signal::from_vec(3, 2, 2, (0..12).map(|i| (i as f64 * 1.3).cos()).collect())
            .unwrap();
        let ab = sdi(&a, &b, SdiOptions::default()).unwrap();
        let ba = sdi(&b, &a, SdiOptions::default()).unwrap();
        for (x, y) in ab.iter().zip(&ba) {
            assert_abs_diff_eq!(*x, -*y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sdi_norm_is_half_energy() {
        let low = Signal::from_vec(1, 1, 1, vec![1.0]).unwrap();
        let high = Signal::from_vec(1, 1, 1, vec![4.0]).unwrap();
        let e = sdi(&low, &high, SdiOptions::new(SdiMeasure::Energy)).unwrap()[0];
        let n = sdi(&low, &high, SdiOptions::new(SdiMeasure::Norm)).unwrap()[0];
        assert_abs_diff_eq!(e, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(n, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sdi_zero_energy_fallbacks() {
        let zero = Signal::zeros(1, 2, 1);
        let one = Signal::from_vec(1, 2, 1, vec![1.0, 0.0]).unwrap();
        assert_eq!(sdi(&zero, &zero, SdiOptions::default()).unwrap()[0], 0.0);
        let v = sdi(&zero, &one, SdiOptions::default()).unwrap()[0];
        assert!(v.is_finite());
        assert_abs_diff_eq!(v, (1.0f64 / ENERGY_FLOOR).log2(), epsilon = 1e-9);
    }

    #[test]
    fn test_sdi_shape_mismatch() {
        let err = sdi(&Signal::zeros(2, 2, 1), &Signal::zeros(3, 2, 1), SdiOptions::default())
            .unwrap_err();
        assert!(matches!(err, NigspError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_sdi_per_subject_shape() {
        let low = Signal::from_vec(2, 1, 3, vec![1.0; 6]).unwrap();
        let high = Signal::from_vec(2, 1, 3, vec![2.0; 6]).unwrap();
        let m = sdi_per_subject(&low, &high, SdiOptions::default()).unwrap();
        assert_eq!((m.rows(), m.cols()), (2, 3));
        assert_abs_diff_eq!(m[(1, 2)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gsdi_columns_and_two_band_equivalence() {
        let v = Matrix::identity(4);
        let sig = Signal::from_vec(4, 2, 1, (1..=8).map(f64::from).collect()).unwrap();
        let coeffs = forward(&sig, &v).unwrap();

        let three = split(&coeffs, &v, &BandSplit::new(vec![1, 3], 4).unwrap()).unwrap();
        let g = gsdi(&three, 0, SdiOptions::default()).unwrap();
        assert_eq!((g.rows(), g.cols()), (4, 2));

        let two = split(&coeffs, &v, &BandSplit::two_band(2, 4).unwrap()).unwrap();
        let g2 = gsdi(&two, 0, SdiOptions::default()).unwrap();
        let s = sdi(two[0].signal(), two[1].signal(), SdiOptions::default()).unwrap();
        for i in 0..4 {
            assert_abs_diff_eq!(g2[(i, 0)], s[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gsdi_invalid_reference() {
        let v = Matrix::identity(3);
        let coeffs = Signal::zeros(3, 1, 1);
        let bands = split(&coeffs, &v, &BandSplit::two_band(1, 3).unwrap()).unwrap();
        assert!(matches!(
            gsdi(&bands, 2, SdiOptions::default()),
            Err(NigspError::InvalidBandSpecification(_))
        ));
        assert!(gsdi(&bands[..1], 0, SdiOptions::default()).is_err());
    }

    #[test]
    fn test_sdi_equal_energy_is_zero() {
        // same energy per node in both bands, different waveforms
        let low = Signal::from_vec(2, 2, 1, vec![1.0, 1.0, 2.0, 0.0]).unwrap();
        let high = Signal::from_vec(2, 2, 1, vec![1.0, -1.0, 0.0, 2.0]).unwrap();
        for measure in [SdiMeasure::Energy, SdiMeasure::Norm] {
            for pooling in [SdiPooling::PooledEnergy, SdiPooling::SubjectMean] {
                let opts = SdiOptions::new(measure).with_pooling(pooling);
                for v in sdi(&low, &high, opts).unwrap() {
                    assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_subject_mean_pooling() {
        // one node, two subjects: energies low (1, 4), high (4, 1)
        let low = Signal::from_vec(1, 1, 2, vec![1.0, 2.0]).unwrap();
        let high = Signal::from_vec(1, 1, 2, vec![2.0, 1.0]).unwrap();
        let pooled = sdi(&low, &high, SdiOptions::default()).unwrap()[0];
        assert_abs_diff_eq!(pooled, 0.0, epsilon = 1e-12);
        let opts = SdiOptions::default().with_pooling(SdiPooling::SubjectMean);
        let mean = sdi(&low, &high, opts).unwrap()[0];
        assert_abs_diff_eq!(mean, 2.125f64.log2(), epsilon = 1e-12);
    }

    #[test]
    fn test_subject_mean_matches_pooled_for_one_subject() {
        let low = Signal::from_vec(3, 4, 1, (0..12).map(|i| (i as f64).cos()).collect()).unwrap();
        let high = Signal::from_vec(3, 4, 1, (0..12).map(|i| (i as f64).sin()).collect()).unwrap();
        let a = sdi(&low, &high, SdiOptions::default()).unwrap();
        let opts = SdiOptions::default().with_pooling(SdiPooling::SubjectMean);
        let b = sdi(&low, &high, opts).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
        }
    }

    fn hadamard4() -> Matrix {
        let h = [
            [1.0, 1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0, -1.0],
            [1.0, 1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0, 1.0],
        ];
        Matrix::from_rows(h.iter().map(|r| r.iter().map(|v| v / 2.0).collect()).collect())
            .unwrap()
    }

    fn values_of<'a>(pairs: &'a [GsdiPair], label: &str) -> &'a [f64] {
        &pairs.iter().find(|p| p.label == label).unwrap().values
    }

    #[test]
    fn test_gsdi_pairs_labels_and_values() {
        let v = hadamard4();
        let x = Signal::from_vec(4, 3, 1, (0..12).map(|i| (i as f64 * 0.9).sin() + 0.5).collect())
            .unwrap();
        let coeffs = forward(&x, &v).unwrap();
        let three = split(&coeffs, &v, &BandSplit::new(vec![1, 2], 4).unwrap()).unwrap();
        let pairs = gsdi_pairs(&three, SdiOptions::default()).unwrap();

        let labels: Vec<&str> = pairs.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "0_over_1",
                "0_over_2",
                "0_over_(1_and_2)",
                "1_over_0",
                "1_over_2",
                "1_over_(0_and_2)",
                "2_over_0",
                "2_over_1",
                "2_over_(0_and_1)",
            ]
        );

        let against_1 = gsdi(&three, 1, SdiOptions::default()).unwrap();
        let (zero_one, one_zero) = (values_of(&pairs, "0_over_1"), values_of(&pairs, "1_over_0"));
        for i in 0..4 {
            assert_abs_diff_eq!(zero_one[i], against_1[(i, 0)], epsilon = 1e-12);
            assert_abs_diff_eq!(one_zero[i], -zero_one[i], epsilon = 1e-12);
        }

        // bands 1 and 2 together are the high band of a split at 1
        let two = split(&coeffs, &v, &BandSplit::two_band(1, 4).unwrap()).unwrap();
        let s = sdi(two[1].signal(), two[0].signal(), SdiOptions::default()).unwrap();
        let combined = values_of(&pairs, "0_over_(1_and_2)");
        for i in 0..4 {
            assert_abs_diff_eq!(combined[i], s[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_gsdi_pairs_two_bands_and_rejects_one() {
        let v = hadamard4();
        let x = Signal::from_vec(4, 2, 1, (1..=8).map(f64::from).collect()).unwrap();
        let bands = split(&forward(&x, &v).unwrap(), &v, &BandSplit::two_band(2, 4).unwrap())
            .unwrap();
        let pairs = gsdi_pairs(&bands, SdiOptions::default()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].label, "0_over_1");
        let s = sdi(bands[1].signal(), bands[0].signal(), SdiOptions::default()).unwrap();
        assert_eq!(pairs[0].values, s);
        assert!(matches!(
            gsdi_pairs(&bands[..1], SdiOptions::default()),
            Err(NigspError::InvalidBandSpecification(_))
        ));
    }
}
