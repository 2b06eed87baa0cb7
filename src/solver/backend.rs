//! Linear-solve backends.
//!
//! A backend factors a [`SystemMatrix`] and then solves against any number
//! of right-hand sides. Either backend accepts either storage; the dense
//! one scatters sparse triplets into its own buffer and the sparse one
//! hands the nonzero entries of a dense matrix to faer.

use std::fmt;

use crate::error::{DcError, Result};

use super::matrix::{MatrixKind, SystemMatrix};
use super::sparse_lu::SparseLu;
use super::PIVOT_TOLERANCE;

/// A factor-then-solve linear solver.
pub trait LinearBackend: fmt::Debug {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Factor `matrix`, replacing any previous factorization.
    ///
    /// Fails with [`DcError::SingularMatrix`] if no usable pivot exists.
    fn factor(&mut self, matrix: &SystemMatrix) -> Result<()>;

    /// Overwrite `rhs` with the solution of the factored system.
    fn solve(&mut self, rhs: &mut [f64]) -> Result<()>;
}

/// The default backend for a storage kind.
pub fn backend_for(kind: MatrixKind) -> Box<dyn LinearBackend> {
    match kind {
        MatrixKind::Dense => Box::new(DenseLu::new()),
        MatrixKind::Sparse => Box::new(SparseLu::new()),
    }
}

/// Dense LU decomposition with partial pivoting.
#[derive(Debug, Default)]
pub struct DenseLu {
    size: usize,
    /// Combined L (unit diagonal, not stored) and U factors (row-major)
    lu: Vec<f64>,
    /// Row permutation
    pivots: Vec<usize>,
    /// Scratch copy of the right-hand side
    scratch: Vec<f64>,
    factored: bool,
}

impl DenseLu {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, matrix: &SystemMatrix) {
        let n = matrix.size();
        self.size = n;
        self.lu.resize(n * n, 0.0);
        self.pivots.resize(n, 0);
        match matrix {
            SystemMatrix::Dense(m) => self.lu.copy_from_slice(m.data()),
            SystemMatrix::Sparse(m) => {
                self.lu.fill(0.0);
                for (r, c, v) in m.iter() {
                    self.lu[r * n + c] += v;
                }
            }
        }
    }
}

impl LinearBackend for DenseLu {
    fn name(&self) -> &'static str {
        "dense-lu"
    }

    fn factor(&mut self, matrix: &SystemMatrix) -> Result<()> {
        self.factored = false;
        self.load(matrix);
        let n = self.size;

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;

            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if !(max_val >= PIVOT_TOLERANCE) {
                return Err(DcError::SingularMatrix);
            }

            // Swap rows if needed
            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                if factor == 0.0 {
                    continue;
                }
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        self.factored = true;
        Ok(())
    }

    fn solve(&mut self, rhs: &mut [f64]) -> Result<()> {
        let n = self.size;
        if !self.factored {
            return Err(DcError::SingularMatrix);
        }
        DcError::check_len(n, rhs.len())?;

        // Apply pivot permutation to the right-hand side
        self.scratch.clear();
        self.scratch.extend_from_slice(rhs);
        for i in 0..n {
            rhs[i] = self.scratch[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                rhs[i] -= self.lu[i * n + j] * rhs[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                rhs[i] -= self.lu[i * n + j] * rhs[j];
            }
            rhs[i] /= self.lu[i * n + i];
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn system(kind: MatrixKind) -> SystemMatrix {
        // Needs a row swap: the (0, 0) entry is zero
        let mut m = SystemMatrix::new(kind, 3);
        m.add(0, 1, 2.0);
        m.add(0, 2, 1.0);
        m.add(1, 0, 1.0);
        m.add(1, 1, 1.0);
        m.add(2, 0, 3.0);
        m.add(2, 2, 4.0);
        m
    }

    #[test]
    fn test_dense_lu_with_pivoting() {
        let mut lu = DenseLu::new();
        lu.factor(&system(MatrixKind::Dense)).unwrap();

        // x = [1, 2, 3] gives b = [7, 3, 15]
        let mut b = vec![7.0, 3.0, 15.0];
        lu.solve(&mut b).unwrap();
        assert_relative_eq!(b[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(b[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(b[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_backends_agree_on_either_storage() {
        for kind in [MatrixKind::Dense, MatrixKind::Sparse] {
            for mut backend in [backend_for(MatrixKind::Dense), backend_for(MatrixKind::Sparse)] {
                backend.factor(&system(kind)).unwrap();
                let mut b = vec![7.0, 3.0, 15.0];
                backend.solve(&mut b).unwrap();
                assert_relative_eq!(b[0], 1.0, epsilon = 1e-12);
                assert_relative_eq!(b[1], 2.0, epsilon = 1e-12);
                assert_relative_eq!(b[2], 3.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_dense_singular_detected() {
        let mut m = SystemMatrix::new(MatrixKind::Dense, 2);
        m.add(0, 0, 1.0);
        m.add(0, 1, 1.0);
        m.add(1, 0, 2.0);
        m.add(1, 1, 2.0);
        let mut lu = DenseLu::new();
        assert!(matches!(lu.factor(&m), Err(DcError::SingularMatrix)));

        let mut b = vec![1.0, 1.0];
        assert!(lu.solve(&mut b).is_err());
    }

    #[test]
    fn test_solve_rejects_wrong_length() {
        let mut lu = DenseLu::new();
        lu.factor(&system(MatrixKind::Dense)).unwrap();
        let mut b = vec![1.0; 2];
        assert!(matches!(
            lu.solve(&mut b),
            Err(DcError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
