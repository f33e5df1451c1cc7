// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Null Models
// ─────────────────────────────────────────────────────────────────────
//! Single-realisation surrogate primitives. The engine drives these with one
//! random stream per realisation.
//!
//!   - sign flip: randomise the sign of each graph-frequency component
//!   - node permutation: shuffle node identities, globally or within
//!     degree strata
//!   - configuration model: null-graph Laplacian with the same strengths

use nigsp_graph::laplacian::{Laplacian, DEGREE_EPSILON};
use nigsp_signal::fourier::inverse;
use nigsp_types::{Matrix, NigspError, NigspResult, Signal};
use rand::seq::SliceRandom;
use rand::Rng;

/// Eigenvector matrix with each column multiplied by a random ±1.
pub fn random_sign<R: Rng + ?Sized>(eigenvectors: &Matrix, rng: &mut R) -> Matrix {
    let mut out = eigenvectors.clone();
    for c in 0..out.cols() {
        if rng.gen_bool(0.5) {
            for r in 0..out.rows() {
                out[(r, c)] = -out[(r, c)];
            }
        }
    }
    out
}

/// Flip the sign of every coefficient row independently per subject, then
/// reconstruct with `eigenvectors`.
///
/// Preserves the energy at every graph frequency.
pub fn sign_flip_signal<R: Rng + ?Sized>(
    coefficients: &Signal,
    eigenvectors: &Matrix,
    rng: &mut R,
) -> NigspResult<Signal> {
    let (n, t_len, s_len) = coefficients.shape();
    let mut flipped = coefficients.clone();
    for s in 0..s_len {
        let block = flipped.subject_mut(s);
        for k in 0..n {
            if rng.gen_bool(0.5) {
                for v in &mut block[k * t_len..(k + 1) * t_len] {
                    *v = -*v;
                }
            }
        }
    }
    inverse(&flipped, eigenvectors)
}

/// Permute node identities within each group, independently per subject.
///
/// `groups` must partition `0..N`. Node `i` of the output takes the whole
/// time series of the node it was mapped to.
pub fn permute_nodes<R: Rng + ?Sized>(
    signal: &Signal,
    groups: &[Vec<usize>],
    rng: &mut R,
) -> NigspResult<Signal> {
    let (n, t_len, s_len) = signal.shape();
    let covered: usize = groups.iter().map(Vec::len).sum();
    if covered != n {
        return Err(NigspError::shape("permutation groups", n, covered));
    }

    let mut out = Signal::zeros(n, t_len, s_len);
    let mut perm: Vec<usize> = (0..n).collect();
    for s in 0..s_len {
        for group in groups {
            let mut shuffled = group.clone();
            shuffled.shuffle(rng);
            for (&dst, &src) in group.iter().zip(&shuffled) {
                perm[dst] = src;
            }
        }
        let src = signal.subject(s);
        let dst = out.subject_mut(s);
        for (i, &p) in perm.iter().enumerate() {
            dst[i * t_len..(i + 1) * t_len].copy_from_slice(&src[p * t_len..(p + 1) * t_len]);
        }
    }
    Ok(out)
}

/// Split nodes into `bins` quantile bins of weighted degree.
///
/// Nodes are ordered by degree (ties by index) and cut into contiguous
/// groups of near-equal size. `bins` is clamped to `[1, N]`.
pub fn degree_strata(degree: &[f64], bins: usize) -> Vec<Vec<usize>> {
    let n = degree.len();
    if n == 0 {
        return Vec::new();
    }
    let bins = bins.clamp(1, n);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| degree[a].total_cmp(&degree[b]).then(a.cmp(&b)));
    (0..bins)
        .map(|b| order[b * n / bins..(b + 1) * n / bins].to_vec())
        .collect()
}

/// Configuration-model Laplacian `diag(s) − s sᵗ / Σs`, with `s` the
/// strengths of the symmetrically normalised adjacency `D^{-1/2} A D^{-1/2}`.
pub fn configuration_laplacian(laplacian: &Laplacian) -> NigspResult<Matrix> {
    let adjacency = laplacian.adjacency();
    let degree = laplacian.degree();
    let n = adjacency.ensure_square()?;

    let f: Vec<f64> = degree
        .iter()
        .map(|&d| if d > DEGREE_EPSILON { 1.0 / d.sqrt() } else { 0.0 })
        .collect();
    let mut strength = vec![0.0; n];
    for i in 0..n {
        for j in 0..n {
            // symmetric part so the result stays decomposable
            let a = 0.5 * (adjacency[(i, j)] + adjacency[(j, i)]);
            strength[i] += f[i] * a * f[j];
        }
    }
    let total: f64 = strength.iter().sum();
    if total <= DEGREE_EPSILON {
        return Err(NigspError::DegenerateDegree { node: 0 });
    }

    let mut out = Matrix::from_diag(&strength);
    for i in 0..n {
        for j in 0..n {
            out[(i, j)] -= strength[i] * strength[j] / total;
        }
    }
    Ok(out)
}
