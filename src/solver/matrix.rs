//! Matrix storage for the MNA system.
//!
//! Small systems are kept in a dense row-major buffer. Larger ones collect
//! coordinate triplets in a [`sprs::TriMat`]; duplicate entries are summed
//! when the triplets are compressed.

use sprs::{CsMat, TriMat};

use crate::error::{DcError, Result};

/// Storage strategy of a system matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    Dense,
    Sparse,
}

impl MatrixKind {
    /// Dense below `threshold` unknowns, sparse at or above.
    pub fn for_size(size: usize, threshold: usize) -> Self {
        if size >= threshold {
            MatrixKind::Sparse
        } else {
            MatrixKind::Dense
        }
    }
}

/// Dense square matrix (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    size: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Create a zero matrix.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size + col]
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.size + col] += value;
    }

    /// Row-major element buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

/// Sparse square matrix in coordinate form.
#[derive(Debug)]
pub struct SparseMatrix {
    size: usize,
    triplets: TriMat<f64>,
}

impl SparseMatrix {
    /// Create an empty matrix.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            triplets: TriMat::new((size, size)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Record `A[row, col] += value`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.triplets.add_triplet(row, col, value);
    }

    /// Number of stored triplets (duplicates counted separately).
    pub fn nnz(&self) -> usize {
        self.triplets.nnz()
    }

    /// Iterate over stored triplets.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.triplets
            .row_inds()
            .iter()
            .zip(self.triplets.col_inds())
            .zip(self.triplets.data())
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Compress into CSR form, summing duplicate entries.
    pub fn to_csr(&self) -> CsMat<f64> {
        self.triplets.to_csr()
    }

    pub fn clear(&mut self) {
        let capacity = self.triplets.nnz();
        self.triplets = TriMat::with_capacity((self.size, self.size), capacity);
    }
}

impl Clone for SparseMatrix {
    fn clone(&self) -> Self {
        let mut copy = SparseMatrix::new(self.size);
        for (r, c, v) in self.iter() {
            copy.add(r, c, v);
        }
        copy
    }
}

/// The system matrix in the storage chosen for the analysis.
#[derive(Debug, Clone)]
pub enum SystemMatrix {
    Dense(DenseMatrix),
    Sparse(SparseMatrix),
}

impl SystemMatrix {
    /// Create a zero matrix of the given kind.
    pub fn new(kind: MatrixKind, size: usize) -> Self {
        match kind {
            MatrixKind::Dense => SystemMatrix::Dense(DenseMatrix::new(size)),
            MatrixKind::Sparse => SystemMatrix::Sparse(SparseMatrix::new(size)),
        }
    }

    pub fn kind(&self) -> MatrixKind {
        match self {
            SystemMatrix::Dense(_) => MatrixKind::Dense,
            SystemMatrix::Sparse(_) => MatrixKind::Sparse,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            SystemMatrix::Dense(m) => m.size(),
            SystemMatrix::Sparse(m) => m.size(),
        }
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        match self {
            SystemMatrix::Dense(m) => m.add(row, col, value),
            SystemMatrix::Sparse(m) => m.add(row, col, value),
        }
    }

    /// Reset every entry to zero.
    pub fn clear(&mut self) {
        match self {
            SystemMatrix::Dense(m) => m.clear(),
            SystemMatrix::Sparse(m) => m.clear(),
        }
    }

    /// Nonzero entries as `(row, col, value)`. Sparse duplicates are
    /// returned unsummed.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        match self {
            SystemMatrix::Dense(m) => {
                let n = m.size();
                m.data()
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(k, &v)| (k / n, k % n, v))
                    .collect()
            }
            SystemMatrix::Sparse(m) => m.iter().collect(),
        }
    }

    /// Add every entry of `other` into this matrix.
    pub fn accumulate(&mut self, other: &SystemMatrix) -> Result<()> {
        DcError::check_len(self.size(), other.size())?;
        match (&mut *self, other) {
            (SystemMatrix::Dense(a), SystemMatrix::Dense(b)) => {
                for (x, y) in a.data.iter_mut().zip(&b.data) {
                    *x += y;
                }
            }
            (SystemMatrix::Sparse(a), SystemMatrix::Sparse(b)) => {
                for (r, c, v) in b.iter() {
                    a.add(r, c, v);
                }
            }
            (target, source) => {
                for (r, c, v) in source.triplets() {
                    target.add(r, c, v);
                }
            }
        }
        Ok(())
    }

    /// Overwrite this matrix with the entries of `other`.
    pub fn copy_from(&mut self, other: &SystemMatrix) -> Result<()> {
        if let (SystemMatrix::Dense(a), SystemMatrix::Dense(b)) = (&mut *self, other) {
            if a.size == b.size {
                a.data.copy_from_slice(&b.data);
                return Ok(());
            }
        }
        self.clear();
        self.accumulate(other)
    }

    /// `out += A·x`
    pub fn mul_add(&self, x: &[f64], out: &mut [f64]) -> Result<()> {
        let n = self.size();
        DcError::check_len(n, x.len())?;
        DcError::check_len(n, out.len())?;
        match self {
            SystemMatrix::Dense(m) => {
                for (row, chunk) in m.data.chunks_exact(n.max(1)).enumerate().take(n) {
                    out[row] += chunk.iter().zip(x).map(|(a, b)| a * b).sum::<f64>();
                }
            }
            SystemMatrix::Sparse(m) => {
                for (r, c, v) in m.iter() {
                    out[r] += v * x[c];
                }
            }
        }
        Ok(())
    }

    /// Copy of this matrix without its first row and column.
    ///
    /// Used to drop the ground equation from a full-index matrix.
    pub fn without_first(&self) -> SystemMatrix {
        let n = self.size().saturating_sub(1);
        let mut reduced = SystemMatrix::new(self.kind(), n);
        for (r, c, v) in self.triplets() {
            if r > 0 && c > 0 {
                reduced.add(r - 1, c - 1, v);
            }
        }
        reduced
    }

    /// Dense copy of the entries, summing sparse duplicates.
    pub fn to_dense(&self) -> DenseMatrix {
        match self {
            SystemMatrix::Dense(m) => m.clone(),
            SystemMatrix::Sparse(m) => {
                let mut dense = DenseMatrix::new(m.size());
                for (r, c, v) in m.iter() {
                    dense.add(r, c, v);
                }
                dense
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn filled(kind: MatrixKind) -> SystemMatrix {
        let mut m = SystemMatrix::new(kind, 3);
        m.add(0, 0, 2.0);
        m.add(0, 1, -1.0);
        m.add(1, 1, 3.0);
        m.add(1, 1, 1.0);
        m.add(2, 0, 4.0);
        m
    }

    #[test]
    fn test_mul_add_matches_between_kinds() {
        let x = [1.0, 2.0, 3.0];
        for kind in [MatrixKind::Dense, MatrixKind::Sparse] {
            let m = filled(kind);
            let mut out = vec![1.0; 3];
            m.mul_add(&x, &mut out).unwrap();
            assert_relative_eq!(out[0], 1.0 + 2.0 - 2.0);
            assert_relative_eq!(out[1], 1.0 + 8.0);
            assert_relative_eq!(out[2], 1.0 + 4.0);
        }
    }

    #[test]
    fn test_sparse_duplicates_summed_in_csr() {
        let m = filled(MatrixKind::Sparse);
        let dense = m.to_dense();
        assert_eq!(dense.get(1, 1), 4.0);
        if let SystemMatrix::Sparse(s) = &m {
            assert_eq!(s.nnz(), 5);
            assert_eq!(s.to_csr().nnz(), 4);
        }
    }

    #[test]
    fn test_without_first_drops_ground() {
        for kind in [MatrixKind::Dense, MatrixKind::Sparse] {
            let reduced = filled(kind).without_first().to_dense();
            assert_eq!(reduced.size(), 2);
            assert_eq!(reduced.get(0, 0), 4.0);
            assert_eq!(reduced.get(1, 0), 0.0);
        }
    }

    #[test]
    fn test_copy_and_accumulate() {
        for kind in [MatrixKind::Dense, MatrixKind::Sparse] {
            let base = filled(kind);
            let mut work = SystemMatrix::new(kind, 3);
            work.add(2, 2, 7.0);
            work.copy_from(&base).unwrap();
            work.accumulate(&base).unwrap();
            let dense = work.to_dense();
            assert_eq!(dense.get(2, 2), 0.0);
            assert_eq!(dense.get(1, 1), 8.0);
        }
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mut a = SystemMatrix::new(MatrixKind::Dense, 2);
        let b = SystemMatrix::new(MatrixKind::Dense, 3);
        assert!(matches!(
            a.accumulate(&b),
            Err(DcError::DimensionMismatch { .. })
        ));
    }
}
