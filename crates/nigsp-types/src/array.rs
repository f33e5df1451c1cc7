// ─────────────────────────────────────────────────────────────────────
// NiGSP Kernel: Dense Arrays
// ─────────────────────────────────────────────────────────────────────
//! Dense row-major containers shared by every stage, plus the typed
//! conversion functions external loaders use to hand data to the kernel.
//!
//! Shape conventions:
//!   - `Matrix`: rows × cols, `data[r * cols + c]`.
//!   - `Signal`: nodes × timepoints × subjects, stored subject-major so that
//!     each subject block is an N×T row-major matrix:
//!     `data[s * N * T + i * T + t]`.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::{NigspError, NigspResult};

/// Dense row-major `f64` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Square matrix with `diag` on the diagonal.
    pub fn from_diag(diag: &[f64]) -> Self {
        let n = diag.len();
        let mut m = Self::zeros(n, n);
        for (i, &d) in diag.iter().enumerate() {
            m.data[i * n + i] = d;
        }
        m
    }

    /// Wrap a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> NigspResult<Self> {
        if data.len() != rows * cols {
            return Err(NigspError::shape(
                "matrix buffer length",
                rows * cols,
                data.len(),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Boundary conversion from nested rows.
    ///
    /// Ragged rows fail with `ShapeMismatch`, an empty outer vector with
    /// `InvalidType`. Nothing is padded or truncated.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> NigspResult<Self> {
        let n_rows = rows.len();
        if n_rows == 0 {
            return Err(NigspError::InvalidType(
                "matrix must have at least one row".to_string(),
            ));
        }
        let n_cols = rows[0].len();
        if n_cols == 0 {
            return Err(NigspError::InvalidType(
                "matrix must have at least one column".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (r, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(NigspError::shape(
                    format!("matrix row {r} length"),
                    n_cols,
                    row.len(),
                ));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Side length of a square matrix.
    pub fn ensure_square(&self) -> NigspResult<usize> {
        if !self.is_square() {
            return Err(NigspError::NonSquareMatrix {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(self.rows)
    }

    /// Fail on the first NaN or infinite entry.
    pub fn ensure_finite(&self, context: &str) -> NigspResult<()> {
        match self.data.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(NigspError::NonFiniteValue {
                context: context.to_string(),
                index,
            }),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.data[r * self.cols + c]).collect()
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols))
            .map(|i| self.data[i * self.cols + i])
            .collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.cols).map(|r| r.to_vec()).collect()
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        t
    }

    /// Dense product `self · other`.
    pub fn matmul(&self, other: &Matrix) -> NigspResult<Matrix> {
        if self.cols != other.rows {
            return Err(NigspError::shape(
                "matmul inner dimension",
                self.cols,
                other.rows,
            ));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                if a == 0.0 {
                    continue;
                }
                let other_row = &other.data[k * other.cols..(k + 1) * other.cols];
                let out_row = &mut out.data[i * other.cols..(i + 1) * other.cols];
                for (o, &b) in out_row.iter_mut().zip(other_row) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    /// Largest absolute element-wise difference.
    pub fn max_abs_diff(&self, other: &Matrix) -> NigspResult<f64> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(NigspError::shape(
                "matrix comparison",
                format!("{}x{}", self.rows, self.cols),
                format!("{}x{}", other.rows, other.cols),
            ));
        }
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().map(|v| v.abs()).fold(0.0, f64::max)
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.data.chunks(self.cols).map(|r| r.iter().sum()).collect()
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

/// Node × time × subject signal array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    n_nodes: usize,
    n_timepoints: usize,
    n_subjects: usize,
    data: Vec<f64>,
}

impl Signal {
    pub fn zeros(n_nodes: usize, n_timepoints: usize, n_subjects: usize) -> Self {
        Self {
            n_nodes,
            n_timepoints,
            n_subjects,
            data: vec![0.0; n_nodes * n_timepoints * n_subjects],
        }
    }

    /// Wrap a flat subject-major buffer.
    pub fn from_vec(
        n_nodes: usize,
        n_timepoints: usize,
        n_subjects: usize,
        data: Vec<f64>,
    ) -> NigspResult<Self> {
        let expected = n_nodes * n_timepoints * n_subjects;
        if data.len() != expected {
            return Err(NigspError::shape("signal buffer length", expected, data.len()));
        }
        if n_nodes == 0 || n_timepoints == 0 || n_subjects == 0 {
            return Err(NigspError::InvalidType(format!(
                "signal dimensions must be non-zero, got {n_nodes}x{n_timepoints}x{n_subjects}"
            )));
        }
        Ok(Self {
            n_nodes,
            n_timepoints,
            n_subjects,
            data,
        })
    }

    /// Single-subject signal from an N×T matrix.
    pub fn from_matrix(m: Matrix) -> NigspResult<Self> {
        let (n, t) = (m.rows(), m.cols());
        Self::from_vec(n, t, 1, m.into_vec())
    }

    /// Stack equally shaped N×T matrices as subjects.
    pub fn from_subjects(subjects: Vec<Matrix>) -> NigspResult<Self> {
        let first = subjects.first().ok_or_else(|| {
            NigspError::InvalidType("signal needs at least one subject".to_string())
        })?;
        let (n, t) = (first.rows(), first.cols());
        let s = subjects.len();
        let mut data = Vec::with_capacity(n * t * s);
        for (idx, m) in subjects.into_iter().enumerate() {
            if m.rows() != n || m.cols() != t {
                return Err(NigspError::shape(
                    format!("subject {idx} shape"),
                    format!("{n}x{t}"),
                    format!("{}x{}", m.rows(), m.cols()),
                ));
            }
            data.extend(m.into_vec());
        }
        Self::from_vec(n, t, s, data)
    }

    /// Boundary conversion from a nested `[node][time][subject]` array, the
    /// layout external loaders produce for N×T×S data.
    pub fn from_nested(nested: Vec<Vec<Vec<f64>>>) -> NigspResult<Self> {
        let n = nested.len();
        let t = nested.first().map_or(0, |row| row.len());
        let s = nested
            .first()
            .and_then(|row| row.first())
            .map_or(0, |cell| cell.len());
        if n == 0 || t == 0 || s == 0 {
            return Err(NigspError::InvalidType(
                "nested signal must be non-empty along every axis".to_string(),
            ));
        }
        let mut out = Self::zeros(n, t, s);
        for (i, row) in nested.iter().enumerate() {
            if row.len() != t {
                return Err(NigspError::shape(format!("node {i} timepoints"), t, row.len()));
            }
            for (tt, cell) in row.iter().enumerate() {
                if cell.len() != s {
                    return Err(NigspError::shape(
                        format!("node {i} time {tt} subjects"),
                        s,
                        cell.len(),
                    ));
                }
                for (ss, &v) in cell.iter().enumerate() {
                    out.set(i, tt, ss, v);
                }
            }
        }
        Ok(out)
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_timepoints(&self) -> usize {
        self.n_timepoints
    }

    pub fn n_subjects(&self) -> usize {
        self.n_subjects
    }

    /// `(nodes, timepoints, subjects)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_nodes, self.n_timepoints, self.n_subjects)
    }

    #[inline]
    pub fn get(&self, node: usize, time: usize, subject: usize) -> f64 {
        self.data[(subject * self.n_nodes + node) * self.n_timepoints + time]
    }

    #[inline]
    pub fn set(&mut self, node: usize, time: usize, subject: usize, value: f64) {
        self.data[(subject * self.n_nodes + node) * self.n_timepoints + time] = value;
    }

    /// N×T row-major block of one subject.
    pub fn subject(&self, s: usize) -> &[f64] {
        let block = self.n_nodes * self.n_timepoints;
        &self.data[s * block..(s + 1) * block]
    }

    pub fn subject_mut(&mut self, s: usize) -> &mut [f64] {
        let block = self.n_nodes * self.n_timepoints;
        &mut self.data[s * block..(s + 1) * block]
    }

    pub fn subject_matrix(&self, s: usize) -> Matrix {
        Matrix {
            rows: self.n_nodes,
            cols: self.n_timepoints,
            data: self.subject(s).to_vec(),
        }
    }

    /// Time series of one node for one subject.
    pub fn series(&self, node: usize, subject: usize) -> &[f64] {
        let start = (subject * self.n_nodes + node) * self.n_timepoints;
        &self.data[start..start + self.n_timepoints]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Total squared energy over every axis.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Fail unless `other` has exactly the same shape.
    pub fn ensure_same_shape(&self, other: &Signal, context: &str) -> NigspResult<()> {
        if self.shape() != other.shape() {
            return Err(NigspError::shape(
                context,
                format!("{:?}", self.shape()),
                format!("{:?}", other.shape()),
            ));
        }
        Ok(())
    }

    pub fn ensure_finite(&self, context: &str) -> NigspResult<()> {
        match self.data.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(NigspError::NonFiniteValue {
                context: context.to_string(),
                index,
            }),
            None => Ok(()),
        }
    }

    pub fn max_abs_diff(&self, other: &Signal) -> NigspResult<f64> {
        self.ensure_same_shape(other, "signal comparison")?;
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }
}
