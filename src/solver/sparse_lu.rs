//! Sparse LU backend on top of faer.
//!
//! The system matrix is handed to faer as a compressed-column matrix. The
//! symbolic analysis depends only on the sparsity pattern, so it is cached
//! and reused while the pattern stays the same; Newton iterations on one
//! circuit only change the values.
//!
//! faer does not fail on a zero pivot, it produces infinities. Every
//! factorization is therefore checked by solving against `A·1` once.

use std::fmt;

use faer::prelude::SpSolver;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::SparseColMat;
use faer::Mat;
use log::trace;

use crate::error::{DcError, Result};

use super::backend::LinearBackend;
use super::matrix::SystemMatrix;

/// Sparse LU solver with a cached symbolic factorization.
#[derive(Default)]
pub struct SparseLu {
    size: usize,
    symbolic: Option<SymbolicLu<usize>>,
    lu: Option<Lu<usize, f64>>,
    /// Column pointers of the cached pattern
    col_ptrs: Vec<usize>,
    /// Row indices of the cached pattern
    row_indices: Vec<usize>,
    /// Number of symbolic analyses performed
    pub analyze_count: usize,
    /// Number of numeric factorizations performed
    pub factor_count: usize,
}

impl fmt::Debug for SparseLu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseLu")
            .field("size", &self.size)
            .field("nnz", &self.row_indices.len())
            .field("factored", &self.lu.is_some())
            .field("analyze_count", &self.analyze_count)
            .field("factor_count", &self.factor_count)
            .finish()
    }
}

impl SparseLu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached pattern and factorization.
    pub fn reset_pattern(&mut self) {
        self.symbolic = None;
        self.lu = None;
        self.col_ptrs.clear();
        self.row_indices.clear();
    }

    fn pattern_matches(&self, mat: &SparseColMat<usize, f64>) -> bool {
        let symbolic = mat.symbolic();
        self.symbolic.is_some()
            && self.col_ptrs == symbolic.col_ptrs()
            && self.row_indices == symbolic.row_indices()
    }

    fn analyze(&mut self, mat: &SparseColMat<usize, f64>) -> Result<SymbolicLu<usize>> {
        if !self.pattern_matches(mat) {
            let symbolic = SymbolicLu::try_new(mat.symbolic()).map_err(|_| DcError::SingularMatrix)?;
            self.col_ptrs = mat.symbolic().col_ptrs().to_vec();
            self.row_indices = mat.symbolic().row_indices().to_vec();
            self.symbolic = Some(symbolic);
            self.analyze_count += 1;
            trace!(
                "sparse lu: symbolic analysis of {}x{} pattern with {} entries",
                self.size,
                self.size,
                self.row_indices.len()
            );
        }
        self.symbolic.clone().ok_or(DcError::SingularMatrix)
    }

    fn solve_with(lu: &Lu<usize, f64>, rhs: &mut [f64]) {
        let b = Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        let x = lu.solve(&b);
        for (i, r) in rhs.iter_mut().enumerate() {
            *r = x[(i, 0)];
        }
    }
}

impl LinearBackend for SparseLu {
    fn name(&self) -> &'static str {
        "sparse-lu"
    }

    fn factor(&mut self, matrix: &SystemMatrix) -> Result<()> {
        self.lu = None;
        let n = matrix.size();
        if n != self.size {
            self.reset_pattern();
            self.size = n;
        }
        if n == 0 {
            return Ok(());
        }

        // Duplicate triplets are summed by faer
        let triplets = matrix.triplets();
        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| DcError::malformed(format!("cannot build sparse matrix: {:?}", e)))?;

        let symbolic = self.analyze(&mat)?;
        let lu = Lu::try_new_with_symbolic(symbolic, mat.as_ref()).map_err(|_| DcError::SingularMatrix)?;
        self.factor_count += 1;

        // Zero pivots surface as non-finite values
        let mut check = vec![0.0; n];
        for &(r, _, v) in &triplets {
            check[r] += v;
        }
        Self::solve_with(&lu, &mut check);
        if check.iter().any(|v| !v.is_finite()) {
            return Err(DcError::SingularMatrix);
        }

        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [f64]) -> Result<()> {
        DcError::check_len(self.size, rhs.len())?;
        if self.size == 0 {
            return Ok(());
        }
        let lu = self.lu.as_ref().ok_or(DcError::SingularMatrix)?;
        Self::solve_with(lu, rhs);
        Ok(())
    }
}
