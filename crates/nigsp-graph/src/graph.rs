// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Graph Metrics
// ─────────────────────────────────────────────────────────────────────
//! Structural metrics that need only the connectivity and the basis.

use nigsp_types::stats::spearman;
use nigsp_types::{Matrix, NigspError, NigspResult};

/// Row sums of `|W|`.
pub fn node_strength(w: &Matrix) -> NigspResult<Vec<f64>> {
    w.ensure_square()?;
    w.ensure_finite("connectivity")?;
    Ok((0..w.rows())
        .map(|i| w.row(i).iter().map(|v| v.abs()).sum())
        .collect())
}

/// Undirected edges `(i, j)`, `i < j`, with a positive weight in either
/// direction.
pub fn edge_list(w: &Matrix) -> NigspResult<Vec<(usize, usize)>> {
    let n = w.ensure_square()?;
    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if w[(i, j)] > 0.0 || w[(j, i)] > 0.0 {
                edges.push((i, j));
            }
        }
    }
    Ok(edges)
}

/// Per-eigenvector count of graph edges whose endpoints have components of
/// opposite sign.
///
/// A component of exactly zero never crosses, so the count is unchanged by
/// flipping the sign of any eigenvector.
pub fn zero_crossings(eigenvectors: &Matrix, w: &Matrix) -> NigspResult<Vec<usize>> {
    let n = w.ensure_square()?;
    if eigenvectors.rows() != n {
        return Err(NigspError::shape(
            "eigenvector rows vs connectivity nodes",
            n,
            eigenvectors.rows(),
        ));
    }
    let edges = edge_list(w)?;
    Ok((0..eigenvectors.cols())
        .map(|k| {
            edges
                .iter()
                .filter(|&&(i, j)| eigenvectors[(i, k)] * eigenvectors[(j, k)] < 0.0)
                .count()
        })
        .collect())
}

/// Sign changes between consecutive node indices, per eigenvector. Only
/// meaningful when node order reflects spatial adjacency.
pub fn sequential_zero_crossings(eigenvectors: &Matrix) -> Vec<usize> {
    let n = eigenvectors.rows();
    (0..eigenvectors.cols())
        .map(|k| {
            (1..n)
                .filter(|&i| eigenvectors[(i - 1, k)] * eigenvectors[(i, k)] < 0.0)
                .count()
        })
        .collect()
}

/// Spearman correlation between eigen-index and zero-crossing count.
///
/// Close to 1 when higher graph frequencies oscillate more across edges.
/// `None` when all counts are equal.
pub fn ordering_consistency(counts: &[usize]) -> Option<f64> {
    let index: Vec<f64> = (0..counts.len()).map(|i| i as f64).collect();
    let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    spearman(&index, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laplacian::{build_laplacian, LaplacianOptions};
    use crate::spectral::decompose;
    use nigsp_types::SignConvention;

    fn path(n: usize) -> Matrix {
        let mut w = Matrix::zeros(n, n);
        for i in 1..n {
            w[(i - 1, i)] = 1.0;
            w[(i, i - 1)] = 1.0;
        }
        w
    }

    #[test]
    fn test_node_strength_uses_absolute_weights() {
        let w = Matrix::from_rows(vec![vec![0.0, -2.0], vec![1.0, 0.5]]).unwrap();
        assert_eq!(node_strength(&w).unwrap(), vec![2.0, 1.5]);
    }

    #[test]
    fn test_path_graph_crossings_increase() {
        let w = path(6);
        let lap = build_laplacian(&w, &LaplacianOptions::unnormalised()).unwrap();
        let eig = decompose(lap.matrix(), SignConvention::default()).unwrap();
        let counts = zero_crossings(eig.eigenvectors(), &w).unwrap();
        // Path eigenvectors are cosines: mode k crosses k times
        assert_eq!(counts, vec![0, 1, 2, 3, 4, 5]);
        let rho = ordering_consistency(&counts).unwrap();
        assert!((rho - 1.0).abs() < 1e-12, "rho = {rho}");
        assert_eq!(sequential_zero_crossings(eig.eigenvectors()), counts);
    }

    #[test]
    fn test_crossings_invariant_to_sign_flip() {
        let w = path(5);
        let lap = build_laplacian(&w, &LaplacianOptions::default()).unwrap();
        let eig = decompose(lap.matrix(), SignConvention::default()).unwrap();
        let mut flipped = eig.eigenvectors().clone();
        for r in 0..5 {
            flipped[(r, 2)] = -flipped[(r, 2)];
        }
        assert_eq!(
            zero_crossings(eig.eigenvectors(), &w).unwrap(),
            zero_crossings(&flipped, &w).unwrap()
        );
    }

    #[test]
    fn test_crossings_shape_mismatch() {
        let err = zero_crossings(&Matrix::identity(3), &path(4)).unwrap_err();
        assert!(matches!(err, NigspError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_ordering_consistency_flat() {
        assert!(ordering_consistency(&[2, 2, 2]).is_none());
    }
}
