//! Solver configuration.

use crate::error::{DcError, Result};

use super::matrix::MatrixKind;
use super::{
    DEFAULT_ABS_TOLERANCE, DEFAULT_EARLY_FACTOR, DEFAULT_LOCKED_MULTIPLE, DEFAULT_MAX_ITERATIONS,
    DEFAULT_REL_TOLERANCE, DEFAULT_RESIDUAL_TOLERANCE, DEFAULT_SPARSE_THRESHOLD,
};

/// How Newton steps are scaled down.
#[derive(Debug, Clone, PartialEq)]
pub struct DampingPolicy {
    /// Number of leading iterations that use `early_factor` (0 disables).
    pub early_iterations: usize,
    /// Factor applied during the early iterations, in (0, 1].
    pub early_factor: f64,
    /// Largest per-iteration change of a voltage-locked port, in thermal
    /// voltages.
    pub locked_multiple: f64,
}

impl Default for DampingPolicy {
    fn default() -> Self {
        Self {
            early_iterations: 0,
            early_factor: DEFAULT_EARLY_FACTOR,
            locked_multiple: DEFAULT_LOCKED_MULTIPLE,
        }
    }
}

impl DampingPolicy {
    /// Create a policy with default values (early damping disabled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale the first `iterations` steps by `factor`.
    pub fn with_early(mut self, iterations: usize, factor: f64) -> Self {
        self.early_iterations = iterations;
        self.early_factor = factor;
        self
    }

    /// Set the locked-port step limit, in thermal voltages.
    pub fn with_locked_multiple(mut self, multiple: f64) -> Self {
        self.locked_multiple = multiple;
        self
    }
}

/// Configuration for the Newton-Raphson solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Absolute tolerance on the update (volts or amperes).
    pub ea: f64,
    /// Relative tolerance on the update.
    pub er: f64,
    /// Absolute tolerance on every residual entry.
    pub eresiduals: f64,
    /// Maximum Newton-Raphson iterations.
    pub maxiter: usize,
    /// Step damping policy.
    pub damping: DampingPolicy,
    /// Unknown count at which sparse storage is used.
    pub sparse_threshold: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            ea: DEFAULT_ABS_TOLERANCE,
            er: DEFAULT_REL_TOLERANCE,
            eresiduals: DEFAULT_RESIDUAL_TOLERANCE,
            maxiter: DEFAULT_MAX_ITERATIONS,
            damping: DampingPolicy::default(),
            sparse_threshold: DEFAULT_SPARSE_THRESHOLD,
        }
    }
}

impl SolverOptions {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute update tolerance.
    pub fn with_ea(mut self, ea: f64) -> Self {
        self.ea = ea;
        self
    }

    /// Set the relative update tolerance.
    pub fn with_er(mut self, er: f64) -> Self {
        self.er = er;
        self
    }

    /// Set the residual tolerance.
    ///
    /// Tighter values cost iterations on nonlinear circuits but never
    /// affect linear ones, which are solved in a single pass.
    pub fn with_eresiduals(mut self, eresiduals: f64) -> Self {
        self.eresiduals = eresiduals;
        self
    }

    /// Set the maximum Newton-Raphson iterations.
    pub fn with_maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    /// Set the damping policy.
    pub fn with_damping(mut self, damping: DampingPolicy) -> Self {
        self.damping = damping;
        self
    }

    /// Set the unknown count at which sparse storage is used.
    pub fn with_sparse_threshold(mut self, threshold: usize) -> Self {
        self.sparse_threshold = threshold;
        self
    }

    /// Storage strategy for a system of `size` unknowns.
    pub fn matrix_kind(&self, size: usize) -> MatrixKind {
        MatrixKind::for_size(size, self.sparse_threshold)
    }

    /// Check that all tolerances and factors are usable.
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(DcError::invalid_option(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )))
            }
        };
        positive("ea", self.ea)?;
        positive("eresiduals", self.eresiduals)?;
        positive("locked_multiple", self.damping.locked_multiple)?;
        if !(self.er >= 0.0 && self.er.is_finite()) {
            return Err(DcError::invalid_option(format!(
                "er must be non-negative and finite, got {}",
                self.er
            )));
        }
        let f = self.damping.early_factor;
        if self.damping.early_iterations > 0 && !(f > 0.0 && f <= 1.0) {
            return Err(DcError::invalid_option(format!(
                "early damping factor must lie in (0, 1], got {}",
                f
            )));
        }
        Ok(())
    }
}

/// Per-solve inputs that are not part of the circuit.
#[derive(Debug, Clone, Default)]
pub struct SolveInputs {
    /// Extra conductances `(row, col, value)` in reduced indices, added to
    /// the base matrix.
    pub gmin: Vec<(usize, usize, f64)>,
    /// Extra constant currents added to the residual (reduced length).
    pub n_tran: Option<Vec<f64>>,
    /// Time passed to device evaluations.
    pub time: f64,
}

impl SolveInputs {
    /// Create empty inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `Gmin` entries.
    pub fn with_gmin(mut self, gmin: Vec<(usize, usize, f64)>) -> Self {
        self.gmin = gmin;
        self
    }

    /// Add `g` to the first `size` diagonal entries.
    pub fn with_gmin_diagonal(mut self, size: usize, g: f64) -> Self {
        self.gmin.extend((0..size).map(|i| (i, i, g)));
        self
    }

    /// Set the extra residual currents.
    pub fn with_n_tran(mut self, n_tran: Vec<f64>) -> Self {
        self.n_tran = Some(n_tran);
        self
    }

    /// Set the evaluation time.
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Check every entry against a system of `size` unknowns.
    pub fn check(&self, size: usize) -> Result<()> {
        if let Some(n_tran) = &self.n_tran {
            DcError::check_len(size, n_tran.len())?;
        }
        for &(row, col, _) in &self.gmin {
            let index = row.max(col);
            if index >= size {
                return Err(DcError::DimensionMismatch {
                    expected: size,
                    actual: index + 1,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let options = SolverOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.damping.early_iterations, 0);
    }

    #[test]
    fn test_invalid_tolerances_rejected() {
        assert!(SolverOptions::new().with_ea(0.0).validate().is_err());
        assert!(SolverOptions::new().with_eresiduals(-1.0).validate().is_err());
        assert!(SolverOptions::new().with_er(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_early_factor_only_checked_when_enabled() {
        let disabled = DampingPolicy::new().with_early(0, 5.0);
        assert!(SolverOptions::new().with_damping(disabled).validate().is_ok());

        let enabled = DampingPolicy::new().with_early(3, 5.0);
        assert!(matches!(
            SolverOptions::new().with_damping(enabled).validate(),
            Err(DcError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_matrix_kind_threshold() {
        let options = SolverOptions::new().with_sparse_threshold(10);
        assert_eq!(options.matrix_kind(9), MatrixKind::Dense);
        assert_eq!(options.matrix_kind(10), MatrixKind::Sparse);
    }

    #[test]
    fn test_inputs_check() {
        let inputs = SolveInputs::new().with_gmin_diagonal(3, 1e-12);
        assert!(inputs.check(3).is_ok());
        assert!(matches!(
            inputs.check(2),
            Err(DcError::DimensionMismatch { expected: 2, actual: 3 })
        ));

        let inputs = SolveInputs::new().with_n_tran(vec![0.0; 4]);
        assert!(inputs.check(3).is_err());
    }
}
