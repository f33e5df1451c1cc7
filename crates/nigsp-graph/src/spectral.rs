// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Spectral Decomposer
// ─────────────────────────────────────────────────────────────────────
//! Laplacian → ascending eigenpairs with a fixed sign convention.
//!
//! Includes a pure-Rust cyclic Jacobi eigensolver for symmetric matrices.
//! Every decomposition is verified by recomposing `V diag(λ) Vᵗ` and
//! comparing against the input.

use nigsp_types::{Matrix, NigspError, NigspResult, SignConvention};
use serde::{Deserialize, Serialize};

/// Maximum allowed `|L − V diag(λ) Vᵗ|` entry after decomposition.
pub const RECOMPOSITION_TOLERANCE: f64 = 1e-6;

/// Symmetry tolerance, relative to the largest absolute entry.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

const MAX_SWEEPS: usize = 100;
const CONVERGENCE_TOL: f64 = 1e-12;
const ZERO_COMPONENT: f64 = 1e-12;

/// Eigenvalues in ascending order with eigenvectors as matching columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenDecomposition {
    eigenvalues: Vec<f64>,
    eigenvectors: Matrix,
    sign_convention: SignConvention,
}

impl EigenDecomposition {
    /// Assemble from precomputed parts. Eigenvalues must be ascending and
    /// match the eigenvector matrix width.
    pub fn from_parts(
        eigenvalues: Vec<f64>,
        eigenvectors: Matrix,
        sign_convention: SignConvention,
    ) -> NigspResult<Self> {
        let n = eigenvectors.ensure_square()?;
        if eigenvalues.len() != n {
            return Err(NigspError::shape("eigenvalue count", n, eigenvalues.len()));
        }
        let out = Self {
            eigenvalues,
            eigenvectors,
            sign_convention,
        };
        if !out.is_ascending() {
            return Err(NigspError::InvalidType(
                "eigenvalues must be in ascending order".to_string(),
            ));
        }
        Ok(out)
    }

    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Columns are eigenvectors.
    pub fn eigenvectors(&self) -> &Matrix {
        &self.eigenvectors
    }

    pub fn sign_convention(&self) -> SignConvention {
        self.sign_convention
    }

    pub fn n_nodes(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn eigenvector(&self, k: usize) -> Vec<f64> {
        self.eigenvectors.column(k)
    }

    /// Algebraic connectivity (second-smallest eigenvalue).
    pub fn fiedler_value(&self) -> f64 {
        if self.eigenvalues.len() < 2 {
            return 0.0;
        }
        self.eigenvalues[1]
    }

    /// Spectral gap ratio λ_1 / λ_2.
    pub fn spectral_gap(&self) -> f64 {
        if self.eigenvalues.len() < 3 {
            return 0.0;
        }
        let lam2 = self.eigenvalues[2];
        if lam2 < 1e-12 {
            return 0.0;
        }
        self.eigenvalues[1] / lam2
    }

    pub fn is_ascending(&self) -> bool {
        self.eigenvalues.windows(2).all(|w| w[0] <= w[1])
    }

    /// `max |VᵗV − I| ≤ tol`.
    pub fn is_orthonormal(&self, tol: f64) -> bool {
        let v = &self.eigenvectors;
        let n = v.rows();
        for i in 0..n {
            for j in i..n {
                let dot: f64 = (0..n).map(|k| v[(k, i)] * v[(k, j)]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                if (dot - expected).abs() > tol {
                    return false;
                }
            }
        }
        true
    }

    pub fn recompose(&self) -> NigspResult<Matrix> {
        recompose(&self.eigenvalues, &self.eigenvectors)
    }

    pub fn into_parts(self) -> (Vec<f64>, Matrix) {
        (self.eigenvalues, self.eigenvectors)
    }
}

/// Fail with `NonSymmetricMatrix` at the worst offending pair.
pub fn check_symmetric(m: &Matrix) -> NigspResult<()> {
    let n = m.ensure_square()?;
    let tol = SYMMETRY_TOLERANCE * m.max_abs().max(1.0);
    let mut worst: Option<(usize, usize, f64)> = None;
    for i in 0..n {
        for j in (i + 1)..n {
            let delta = (m[(i, j)] - m[(j, i)]).abs();
            if delta > tol && worst.map_or(true, |(_, _, d)| delta > d) {
                worst = Some((i, j, delta));
            }
        }
    }
    match worst {
        Some((row, col, delta)) => Err(NigspError::NonSymmetricMatrix { row, col, delta }),
        None => Ok(()),
    }
}

/// Decompose a real symmetric matrix.
///
/// Eigenvalues ascending, eigenvector columns permuted to match, signs
/// fixed by `sign`. Verifies the recomposition before returning.
pub fn decompose(l: &Matrix, sign: SignConvention) -> NigspResult<EigenDecomposition> {
    let n = l.ensure_square()?;
    l.ensure_finite("laplacian")?;
    check_symmetric(l)?;

    let mut solver = JacobiSolver::new(l);
    let sweeps = solver.run()?;
    let (mut eigvals, vectors) = solver.into_pairs()?;

    // Round-off negatives of a PSD input
    let clamp = ZERO_COMPONENT * l.max_abs().max(1.0);
    for val in eigvals.iter_mut() {
        if *val < 0.0 && *val > -clamp {
            *val = 0.0;
        }
    }

    let (eigvals, mut eigenvectors) = ascending(&eigvals, &vectors);
    orient(&mut eigenvectors, sign);

    let recomposed = recompose(&eigvals, &eigenvectors)?;
    let residual = l.max_abs_diff(&recomposed)?;
    if residual > RECOMPOSITION_TOLERANCE {
        return Err(NigspError::NonConvergentDecomposition { sweeps, residual });
    }

    log::debug!("decomposed {n}x{n} matrix in {sweeps} sweeps (residual {residual:.2e})");

    Ok(EigenDecomposition {
        eigenvalues: eigvals,
        eigenvectors,
        sign_convention: sign,
    })
}

/// `V diag(λ) Vᵗ`.
pub fn recompose(eigenvalues: &[f64], eigenvectors: &Matrix) -> NigspResult<Matrix> {
    let n = eigenvectors.rows();
    if eigenvectors.cols() != eigenvalues.len() {
        return Err(NigspError::shape(
            "eigenvalue count",
            eigenvectors.cols(),
            eigenvalues.len(),
        ));
    }
    let mut out = Matrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let mut acc = 0.0;
            for (m, &lam) in eigenvalues.iter().enumerate() {
                acc += eigenvectors[(i, m)] * lam * eigenvectors[(j, m)];
            }
            out[(i, j)] = acc;
            out[(j, i)] = acc;
        }
    }
    Ok(out)
}

/// Flip each eigenvector column so its pivot component is positive.
fn orient(vectors: &mut Matrix, convention: SignConvention) {
    let n = vectors.cols();
    for col in 0..n {
        let column = vectors.column(col);
        let pivot = match convention {
            SignConvention::Unchanged => None,
            SignConvention::LargestComponentPositive => column
                .iter()
                .copied()
                .reduce(|best, x| if x.abs() > best.abs() { x } else { best }),
            SignConvention::FirstNonZeroPositive => {
                column.iter().copied().find(|x| x.abs() > ZERO_COMPONENT)
            }
        };
        if matches!(pivot, Some(p) if p < 0.0) {
            for row in 0..vectors.rows() {
                vectors[(row, col)] = -vectors[(row, col)];
            }
        }
    }
}

/// Eigenpairs reordered by ascending eigenvalue.
fn ascending(values: &[f64], vectors: &Matrix) -> (Vec<f64>, Matrix) {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut sorted = Matrix::zeros(n, n);
    for (dst, &src) in order.iter().enumerate() {
        for row in 0..n {
            sorted[(row, dst)] = vectors[(row, src)];
        }
    }
    (order.iter().map(|&i| values[i]).collect(), sorted)
}

/// Cyclic Jacobi on a dense symmetric matrix.
///
/// Each sweep annihilates every upper off-diagonal entry once with a
/// plane rotation, accumulating the rotations into `v`. Stops when the
/// off-diagonal Frobenius norm falls below `CONVERGENCE_TOL` times the
/// full norm.
struct JacobiSolver {
    n: usize,
    a: Vec<f64>,
    v: Vec<f64>,
}

impl JacobiSolver {
    fn new(m: &Matrix) -> Self {
        let n = m.rows();
        let mut v = vec![0.0; n * n];
        for i in 0..n {
            v[i * n + i] = 1.0;
        }
        Self {
            n,
            a: m.as_slice().to_vec(),
            v,
        }
    }

    fn off_diagonal_norm(&self) -> f64 {
        let n = self.n;
        let upper: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| self.a[p * n + q].powi(2))
            .sum();
        (2.0 * upper).sqrt()
    }

    /// Zero `a[p][q]` with the smaller of the two stable rotation angles.
    fn rotate(&mut self, p: usize, q: usize) {
        let n = self.n;
        let apq = self.a[p * n + q];
        if apq == 0.0 {
            return;
        }
        let theta = (self.a[q * n + q] - self.a[p * n + p]) / (2.0 * apq);
        let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
        let c = (t * t + 1.0).sqrt().recip();
        let s = t * c;

        self.a[p * n + p] -= t * apq;
        self.a[q * n + q] += t * apq;
        self.a[p * n + q] = 0.0;
        self.a[q * n + p] = 0.0;
        for r in (0..n).filter(|&r| r != p && r != q) {
            let (arp, arq) = (self.a[r * n + p], self.a[r * n + q]);
            let new_rp = c * arp - s * arq;
            let new_rq = s * arp + c * arq;
            self.a[r * n + p] = new_rp;
            self.a[p * n + r] = new_rp;
            self.a[r * n + q] = new_rq;
            self.a[q * n + r] = new_rq;
        }
        for r in 0..n {
            let (vrp, vrq) = (self.v[r * n + p], self.v[r * n + q]);
            self.v[r * n + p] = c * vrp - s * vrq;
            self.v[r * n + q] = s * vrp + c * vrq;
        }
    }

    /// Sweep until converged; returns the number of sweeps performed.
    fn run(&mut self) -> NigspResult<usize> {
        let norm = self.a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let tol = CONVERGENCE_TOL * norm.max(f64::MIN_POSITIVE);
        for sweep in 0..MAX_SWEEPS {
            if self.off_diagonal_norm() <= tol {
                return Ok(sweep);
            }
            for p in 0..self.n {
                for q in (p + 1)..self.n {
                    self.rotate(p, q);
                }
            }
        }
        let residual = self.off_diagonal_norm();
        if residual <= tol {
            return Ok(MAX_SWEEPS);
        }
        Err(NigspError::NonConvergentDecomposition {
            sweeps: MAX_SWEEPS,
            residual,
        })
    }

    /// Diagonal as eigenvalues, accumulated rotations as eigenvector columns.
    fn into_pairs(self) -> NigspResult<(Vec<f64>, Matrix)> {
        let n = self.n;
        let values = (0..n).map(|i| self.a[i * n + i]).collect();
        Ok((values, Matrix::from_vec(n, n, self.v)?))
    }
}
