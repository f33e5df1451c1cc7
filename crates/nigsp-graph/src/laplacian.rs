// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Laplacian Builder
// ─────────────────────────────────────────────────────────────────────
//! Connectivity matrix → (optionally normalised) graph Laplacian.
//!
//! Pipeline: finite check → negative-weight policy → non-negativity check →
//! self-loop policy → degree → `D − A` → inverse-degree scaling.
//!
//! Nodes with degree ≤ [`DEGREE_EPSILON`] take an inverse-degree factor of
//! zero in every normalised variant, so their row and column of the
//! normalised Laplacian are zero. Set `allow_isolated = false` to make
//! such nodes an error instead.

use nigsp_types::{
    Matrix, NegativeWeights, NigspConfig, NigspError, NigspResult, Normalisation, SelfLoops,
};
use serde::{Deserialize, Serialize};

/// Degrees at or below this are treated as zero.
pub const DEGREE_EPSILON: f64 = 1e-12;

/// Options for [`build_laplacian`].
#[derive(Debug, Clone, PartialEq)]
pub struct LaplacianOptions {
    pub self_loops: SelfLoops,
    pub normalisation: Normalisation,
    pub negative_weights: NegativeWeights,
    pub allow_isolated: bool,
}

impl Default for LaplacianOptions {
    fn default() -> Self {
        Self {
            self_loops: SelfLoops::Exclude,
            normalisation: Normalisation::Symmetric,
            negative_weights: NegativeWeights::Reject,
            allow_isolated: true,
        }
    }
}

impl LaplacianOptions {
    pub fn unnormalised() -> Self {
        Self {
            normalisation: Normalisation::None,
            ..Self::default()
        }
    }

    pub fn from_config(config: &NigspConfig) -> Self {
        Self {
            self_loops: config.self_loops.clone(),
            normalisation: config.normalisation,
            negative_weights: config.negative_weights,
            allow_isolated: config.allow_isolated,
        }
    }
}

/// Graph Laplacian together with the adjacency and degrees it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Laplacian {
    matrix: Matrix,
    adjacency: Matrix,
    degree: Vec<f64>,
    normalisation: Normalisation,
}

impl Laplacian {
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Adjacency after the negative-weight and self-loop policies.
    pub fn adjacency(&self) -> &Matrix {
        &self.adjacency
    }

    pub fn degree(&self) -> &[f64] {
        &self.degree
    }

    pub fn normalisation(&self) -> Normalisation {
        self.normalisation
    }

    pub fn n_nodes(&self) -> usize {
        self.matrix.rows()
    }

    pub fn isolated_nodes(&self) -> Vec<usize> {
        self.degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d <= DEGREE_EPSILON)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn into_matrix(self) -> Matrix {
        self.matrix
    }
}

/// Apply the negative-weight policy. The result is checked for finiteness
/// and non-negativity.
pub fn resolve_negative_weights(w: &Matrix, policy: NegativeWeights) -> NigspResult<Matrix> {
    let mut out = w.clone();
    match policy {
        NegativeWeights::Reject => {}
        NegativeWeights::Absolute => {
            for v in out.as_mut_slice() {
                *v = v.abs();
            }
        }
        NegativeWeights::Remove => {
            for v in out.as_mut_slice() {
                if *v < 0.0 {
                    *v = 0.0;
                }
            }
        }
        NegativeWeights::Rescale => {
            let min = out.as_slice().iter().copied().fold(f64::INFINITY, f64::min);
            for v in out.as_mut_slice() {
                *v -= min;
            }
            let max = out.max_abs();
            if max > 0.0 {
                for v in out.as_mut_slice() {
                    *v /= max;
                }
            } else {
                log::warn!("rescale of a constant connectivity matrix yields all zeros");
            }
        }
    }

    let n = out.cols();
    if let Some(idx) = out.as_slice().iter().position(|&v| v < 0.0) {
        return Err(NigspError::NegativeWeight {
            row: idx / n,
            col: idx % n,
            value: out.as_slice()[idx],
        });
    }
    Ok(out)
}

/// Apply the self-loop policy to the diagonal.
pub fn apply_self_loops(w: &Matrix, policy: &SelfLoops) -> NigspResult<Matrix> {
    let n = w.ensure_square()?;
    let mut out = w.clone();
    match policy {
        SelfLoops::Include => {}
        SelfLoops::Exclude => {
            for i in 0..n {
                out[(i, i)] = 0.0;
            }
        }
        SelfLoops::Custom(values) => {
            if values.len() != n {
                return Err(NigspError::shape("custom self-loop weights", n, values.len()));
            }
            for (i, &v) in values.iter().enumerate() {
                if !v.is_finite() {
                    return Err(NigspError::NonFiniteValue {
                        context: "custom self-loop weights".to_string(),
                        index: i,
                    });
                }
                if v < 0.0 {
                    return Err(NigspError::NegativeWeight {
                        row: i,
                        col: i,
                        value: v,
                    });
                }
                out[(i, i)] = v;
            }
        }
        SelfLoops::Degree => {
            for i in 0..n {
                let off: f64 = (0..n).filter(|&j| j != i).map(|j| w[(i, j)]).sum();
                out[(i, i)] = off;
            }
        }
    }
    Ok(out)
}

/// Degree vector: row sums of `w` after the self-loop policy.
pub fn degree(w: &Matrix, self_loops: &SelfLoops) -> NigspResult<Vec<f64>> {
    w.ensure_finite("connectivity")?;
    Ok(apply_self_loops(w, self_loops)?.row_sums())
}

fn inverse_factor(d: f64, kind: Normalisation) -> f64 {
    if d <= DEGREE_EPSILON {
        return 0.0;
    }
    match kind {
        Normalisation::None => 1.0,
        Normalisation::Symmetric => 1.0 / d.sqrt(),
        Normalisation::RandomWalkIn | Normalisation::RandomWalkOut => 1.0 / d,
    }
}

/// Inverse-degree scaling of an unnormalised Laplacian.
///
/// Zero-degree nodes get a zero row and column in every normalised
/// variant. `Normalisation::None` returns the input unchanged.
pub fn normalise(laplacian: &Matrix, degree: &[f64], kind: Normalisation) -> NigspResult<Matrix> {
    let n = laplacian.ensure_square()?;
    if degree.len() != n {
        return Err(NigspError::shape("degree vector", n, degree.len()));
    }
    if let Some(index) = degree.iter().position(|d| !d.is_finite()) {
        return Err(NigspError::NonFiniteValue {
            context: "degree vector".to_string(),
            index,
        });
    }
    if kind == Normalisation::None {
        return Ok(laplacian.clone());
    }

    let f: Vec<f64> = degree.iter().map(|&d| inverse_factor(d, kind)).collect();
    let mut out = Matrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let l = laplacian[(i, j)];
            out[(i, j)] = match kind {
                Normalisation::Symmetric => f[i] * l * f[j],
                Normalisation::RandomWalkIn => f[i] * l,
                Normalisation::RandomWalkOut => l * f[j],
                Normalisation::None => l,
            };
        }
    }

    for i in (0..n).filter(|&i| f[i] == 0.0) {
        for j in 0..n {
            out[(i, j)] = 0.0;
            out[(j, i)] = 0.0;
        }
    }
    Ok(out)
}

/// Build the graph Laplacian of a connectivity matrix.
pub fn build_laplacian(w: &Matrix, opts: &LaplacianOptions) -> NigspResult<Laplacian> {
    let n = w.ensure_square()?;
    w.ensure_finite("connectivity")?;

    let adjacency = resolve_negative_weights(w, opts.negative_weights)?;
    let adjacency = apply_self_loops(&adjacency, &opts.self_loops)?;
    let degree = adjacency.row_sums();

    let isolated: Vec<usize> = (0..n).filter(|&i| degree[i] <= DEGREE_EPSILON).collect();
    if !isolated.is_empty() && opts.normalisation != Normalisation::None {
        if !opts.allow_isolated {
            return Err(NigspError::DegenerateDegree { node: isolated[0] });
        }
        log::warn!(
            "{} zero-degree node(s) {:?}: zero rows/cols in the normalised Laplacian",
            isolated.len(),
            isolated
        );
    }

    let mut lap = Matrix::from_diag(&degree);
    for i in 0..n {
        for j in 0..n {
            lap[(i, j)] -= adjacency[(i, j)];
        }
    }
    let matrix = normalise(&lap, &degree, opts.normalisation)?;

    log::debug!(
        "built {:?} laplacian for {} nodes",
        opts.normalisation,
        n
    );

    Ok(Laplacian {
        matrix,
        adjacency,
        degree,
        normalisation: opts.normalisation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn complete(n: usize) -> Matrix {
        let mut w = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    w[(i, j)] = 1.0;
                }
            }
        }
        w
    }

    fn with_norm(kind: Normalisation) -> LaplacianOptions {
        LaplacianOptions {
            normalisation: kind,
            ..LaplacianOptions::default()
        }
    }

    #[test]
    fn test_three_node_complete_unnormalised() {
        let lap = build_laplacian(&complete(3), &LaplacianOptions::unnormalised()).unwrap();
        let expected = Matrix::from_rows(vec![
            vec![2.0, -1.0, -1.0],
            vec![-1.0, 2.0, -1.0],
            vec![-1.0, -1.0, 2.0],
        ])
        .unwrap();
        assert_eq!(lap.matrix(), &expected);
        assert_eq!(lap.degree(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_two_node_symmetric() {
        let w = Matrix::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let lap = build_laplacian(&w, &with_norm(Normalisation::Symmetric)).unwrap();
        let m = lap.matrix();
        assert_abs_diff_eq!(m[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(0, 1)], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(1, 0)], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(1, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_walk_variants() {
        let w = Matrix::from_rows(vec![
            vec![0.0, 2.0, 0.0],
            vec![2.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
        ])
        .unwrap();
        let rw_in = build_laplacian(&w, &with_norm(Normalisation::RandomWalkIn)).unwrap();
        // I - D^{-1} A: row 1 has degree 3
        assert_abs_diff_eq!(rw_in.matrix()[(1, 0)], -2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rw_in.matrix()[(0, 1)], -1.0, epsilon = 1e-12);

        let rw_out = build_laplacian(&w, &with_norm(Normalisation::RandomWalkOut)).unwrap();
        // I - A D^{-1}
        assert_abs_diff_eq!(rw_out.matrix()[(0, 1)], -2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rw_out.matrix()[(1, 0)], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_isolated_node_zero_row_and_col() {
        let w = Matrix::from_rows(vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0],
        ])
        .unwrap();
        for kind in [
            Normalisation::Symmetric,
            Normalisation::RandomWalkIn,
            Normalisation::RandomWalkOut,
        ] {
            let lap = build_laplacian(&w, &with_norm(kind)).unwrap();
            lap.matrix().ensure_finite("laplacian").unwrap();
            for j in 0..3 {
                assert_eq!(lap.matrix()[(2, j)], 0.0, "{kind:?} row");
                assert_eq!(lap.matrix()[(j, 2)], 0.0, "{kind:?} col");
            }
            assert_eq!(lap.isolated_nodes(), vec![2]);
        }
    }

    #[test]
    fn test_isolated_node_rejected() {
        let w = Matrix::from_rows(vec![vec![0.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let opts = LaplacianOptions {
            allow_isolated: false,
            ..LaplacianOptions::default()
        };
        let err = build_laplacian(&w, &opts).unwrap_err();
        assert_eq!(err, NigspError::DegenerateDegree { node: 0 });
    }

    #[test]
    fn test_negative_weight_rejected() {
        let w = Matrix::from_rows(vec![vec![0.0, -0.5], vec![-0.5, 0.0]]).unwrap();
        let err = build_laplacian(&w, &LaplacianOptions::default()).unwrap_err();
        assert!(matches!(err, NigspError::NegativeWeight { row: 0, col: 1, .. }));
    }

    #[test]
    fn test_negative_weight_policies() {
        let w = Matrix::from_rows(vec![vec![0.0, -0.5], vec![1.0, 0.0]]).unwrap();
        let abs = resolve_negative_weights(&w, NegativeWeights::Absolute).unwrap();
        assert_eq!(abs[(0, 1)], 0.5);
        let removed = resolve_negative_weights(&w, NegativeWeights::Remove).unwrap();
        assert_eq!(removed[(0, 1)], 0.0);
        let rescaled = resolve_negative_weights(&w, NegativeWeights::Rescale).unwrap();
        // (w - min) / max over [0, -0.5, 1, 0]
        assert_abs_diff_eq!(rescaled[(0, 0)], 0.5 / 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[(0, 1)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[(1, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_square_and_non_finite() {
        let w = Matrix::zeros(2, 3);
        assert!(matches!(
            build_laplacian(&w, &LaplacianOptions::default()),
            Err(NigspError::NonSquareMatrix { rows: 2, cols: 3 })
        ));
        let mut w = complete(2);
        w[(0, 1)] = f64::INFINITY;
        assert!(matches!(
            build_laplacian(&w, &LaplacianOptions::default()),
            Err(NigspError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn test_self_loop_policies() {
        let w = Matrix::from_rows(vec![vec![3.0, 1.0], vec![2.0, 5.0]]).unwrap();
        assert_eq!(degree(&w, &SelfLoops::Exclude).unwrap(), vec![1.0, 2.0]);
        assert_eq!(degree(&w, &SelfLoops::Include).unwrap(), vec![4.0, 7.0]);
        assert_eq!(
            degree(&w, &SelfLoops::Custom(vec![1.0, 0.0])).unwrap(),
            vec![2.0, 2.0]
        );
        assert_eq!(degree(&w, &SelfLoops::Degree).unwrap(), vec![2.0, 4.0]);
        assert!(degree(&w, &SelfLoops::Custom(vec![1.0])).is_err());
    }

    #[test]
    fn test_normalise_none_is_identity() {
        let l = Matrix::from_rows(vec![vec![1.0, -1.0], vec![-1.0, 1.0]]).unwrap();
        let out = normalise(&l, &[1.0, 1.0], Normalisation::None).unwrap();
        assert_eq!(out, l);
        assert!(normalise(&l, &[1.0], Normalisation::Symmetric).is_err());
    }

    proptest! {
        #[test]
        fn prop_rows_sum_to_zero(
            n in 2usize..8,
            seed in proptest::collection::vec(0.0f64..5.0, 64),
        ) {
            let mut w = Matrix::zeros(n, n);
            for i in 0..n {
                for j in (i + 1)..n {
                    let v = seed[(i * 8 + j) % seed.len()];
                    w[(i, j)] = v;
                    w[(j, i)] = v;
                }
            }
            let ones = Matrix::from_vec(n, 1, vec![1.0; n]).unwrap();
            for kind in [Normalisation::None, Normalisation::RandomWalkIn] {
                let lap = build_laplacian(&w, &with_norm(kind)).unwrap();
                let prod = lap.matrix().matmul(&ones).unwrap();
                for i in 0..n {
                    prop_assert!(prod[(i, 0)].abs() < 1e-9, "{:?} row {} = {}", kind, i, prod[(i, 0)]);
                }
            }
        }
    }
}
