//! Newton-Raphson iteration with damping.
//!
//! Each iteration evaluates the residual at the current iterate, solves the
//! linearized system for the update and applies it scaled by the damping
//! factor:
//!
//! ```text
//! r  = (A + Gmin)·x + s + N_tran + Tx(x)
//! (A + Gmin + J)·Δx = -r
//! x ← x + d·Δx
//! ```
//!
//! The iteration has converged once every unknown satisfies
//! `|Δx_i| < er·|x_i| + ea` (with `x` the updated iterate) and
//! `|r_i| < eresiduals`. Circuits without nonlinear devices take a single
//! undamped linear solve.

use std::fmt;

use log::{debug, trace, warn};

use crate::circuit::{validate_circuit, Circuit};
use crate::error::{DcError, Result};

use super::backend::{backend_for, LinearBackend};
use super::damping::damping_factor;
use super::index::IndexMaps;
use super::matrix::{MatrixKind, SystemMatrix};
use super::nonlinear::NonlinearBuilder;
use super::options::{SolveInputs, SolverOptions};
use super::stamp::LinearTemplate;

/// Why a solve did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveFailure {
    /// The linearized system had no usable pivot.
    Singular,
    /// A non-finite value appeared in a device evaluation, the residual or
    /// the update.
    NumericOverflow,
    /// The iteration cap was reached.
    MaxIterations,
}

impl fmt::Display for SolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveFailure::Singular => write!(f, "singular matrix"),
            SolveFailure::NumericOverflow => write!(f, "numeric overflow"),
            SolveFailure::MaxIterations => write!(f, "maximum iterations reached"),
        }
    }
}

/// Outcome of one solve. The solution itself is written into the
/// caller's buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub converged: bool,
    /// Iterations performed (1 for linear circuits)
    pub iterations: usize,
    /// Residual of the accepted iterate (NaN on failure)
    pub residual: Vec<f64>,
    pub failure: Option<SolveFailure>,
    /// Per-unknown convergence flags of the last check, on `MaxIterations`
    pub mask: Option<Vec<bool>>,
}

impl SolveReport {
    /// Largest residual magnitude.
    pub fn residual_norm(&self) -> f64 {
        self.residual.iter().fold(0.0f64, |m, r| m.max(r.abs()))
    }
}

/// Scratch buffers of one in-flight solve.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// A + Gmin
    base: SystemMatrix,
    jacobian: SystemMatrix,
    /// A + Gmin + J
    system: SystemMatrix,
    /// s + N_tran
    constant: Vec<f64>,
    tx: Vec<f64>,
    residual: Vec<f64>,
    delta: Vec<f64>,
    mask: Vec<bool>,
}

impl Workspace {
    pub fn new(kind: MatrixKind, size: usize) -> Self {
        Self {
            base: SystemMatrix::new(kind, size),
            jacobian: SystemMatrix::new(kind, size),
            system: SystemMatrix::new(kind, size),
            constant: vec![0.0; size],
            tx: vec![0.0; size],
            residual: vec![0.0; size],
            delta: vec![0.0; size],
            mask: vec![false; size],
        }
    }

    /// Residual of the last evaluation.
    pub fn residual(&self) -> &[f64] {
        &self.residual
    }

    /// Load the base matrix and constant vector for a new solve.
    fn reset(&mut self, template: &LinearTemplate, inputs: &SolveInputs) -> Result<()> {
        self.base.copy_from(template.matrix())?;
        for &(row, col, g) in &inputs.gmin {
            self.base.add(row, col, g);
        }

        self.constant.copy_from_slice(template.sources());
        if let Some(n_tran) = &inputs.n_tran {
            for (c, n) in self.constant.iter_mut().zip(n_tran) {
                *c += n;
            }
        }

        self.tx.fill(0.0);
        self.residual.fill(0.0);
        self.delta.fill(0.0);
        self.mask.fill(false);
        Ok(())
    }

    /// `residual = base·x + constant + tx`
    fn evaluate_residual(&mut self, x: &[f64]) -> Result<()> {
        for ((r, c), t) in self.residual.iter_mut().zip(&self.constant).zip(&self.tx) {
            *r = c + t;
        }
        self.base.mul_add(x, &mut self.residual)?;
        ensure_finite(&self.residual)
    }

    /// Solve `system·delta = -residual`.
    fn solve_update(&mut self, backend: &mut dyn LinearBackend) -> Result<()> {
        backend.factor(&self.system)?;
        for (d, r) in self.delta.iter_mut().zip(&self.residual) {
            *d = -r;
        }
        backend.solve(&mut self.delta)?;
        ensure_finite(&self.delta)
    }

    /// Update the mask against the tolerances; true if every unknown passes.
    fn check_convergence(&mut self, x: &[f64], options: &SolverOptions) -> bool {
        let mut all = true;
        for (i, ok) in self.mask.iter_mut().enumerate() {
            *ok = self.delta[i].abs() < options.er * x[i].abs() + options.ea
                && self.residual[i].abs() < options.eresiduals;
            all &= *ok;
        }
        all
    }
}

fn ensure_finite(values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DcError::NumericalOverflow {
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |m, v| m.max(v.abs()))
}

/// Map numerical errors to a failure class; pass other errors through.
fn classify(err: DcError) -> Result<SolveFailure> {
    match err {
        DcError::SingularMatrix => Ok(SolveFailure::Singular),
        DcError::NumericalOverflow { .. } => Ok(SolveFailure::NumericOverflow),
        other => Err(other),
    }
}

enum Outcome {
    Converged { iterations: usize },
    Failed { failure: SolveFailure, iterations: usize },
}

/// Damped Newton-Raphson solver bound to one circuit topology.
#[derive(Debug)]
pub struct NewtonSolver {
    options: SolverOptions,
    maps: IndexMaps,
    template: LinearTemplate,
    nonlinear: NonlinearBuilder,
    backend: Box<dyn LinearBackend>,
    workspace: Workspace,
}

impl NewtonSolver {
    /// Build index maps, linear template and backend for `circuit`.
    pub fn new(circuit: &Circuit, options: SolverOptions) -> Result<Self> {
        options.validate()?;
        let maps = IndexMaps::new(circuit)?;
        validate_circuit(circuit)?;

        let size = maps.reduced_dim();
        let kind = options.matrix_kind(size);
        let template = LinearTemplate::new(circuit, &maps, kind)?;
        let nonlinear = NonlinearBuilder::new(circuit, &maps)?;
        let backend = backend_for(kind);

        debug!(
            "newton solver: {} unknowns, {} nonlinear devices, {:?} storage, backend {}",
            size,
            nonlinear.len(),
            kind,
            backend.name()
        );

        Ok(Self {
            options,
            maps,
            template,
            nonlinear,
            backend,
            workspace: Workspace::new(kind, size),
        })
    }

    /// Replace the linear backend.
    pub fn with_backend(mut self, backend: Box<dyn LinearBackend>) -> Self {
        self.set_backend(backend);
        self
    }

    pub fn set_backend(&mut self, backend: Box<dyn LinearBackend>) {
        debug!("newton solver: backend set to {}", backend.name());
        self.backend = backend;
    }

    pub fn maps(&self) -> &IndexMaps {
        &self.maps
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn template(&self) -> &LinearTemplate {
        &self.template
    }

    /// Storage used for the system matrices.
    pub fn matrix_kind(&self) -> MatrixKind {
        self.template.kind()
    }

    /// True if the circuit has no nonlinear devices.
    pub fn is_linear(&self) -> bool {
        self.nonlinear.is_empty()
    }

    /// Re-read source values after the circuit's sources changed.
    ///
    /// `circuit` must have the topology the solver was built for.
    pub fn refresh_sources(&mut self, circuit: &Circuit) -> Result<()> {
        self.maps.check_circuit(circuit)?;
        self.template.refresh_sources(circuit, &self.maps)
    }

    /// Solve starting from the iterate in `x`, leaving the solution there.
    ///
    /// Numerical failures are reported in the returned [`SolveReport`],
    /// with `x` and the residual filled with NaN. Errors are returned only
    /// for inconsistent inputs, including a `circuit` whose topology differs
    /// from the one the solver was built for.
    pub fn solve(&mut self, circuit: &Circuit, inputs: &SolveInputs, x: &mut [f64]) -> Result<SolveReport> {
        self.maps.check_circuit(circuit)?;
        let size = self.maps.reduced_dim();
        DcError::check_len(size, x.len())?;
        inputs.check(size)?;
        self.workspace.reset(&self.template, inputs)?;

        let outcome = if self.nonlinear.is_empty() {
            self.solve_linear(x)?
        } else {
            self.solve_nonlinear(circuit, inputs.time, x)?
        };

        match outcome {
            Outcome::Converged { iterations } => {
                debug!(
                    "newton: converged in {} iterations (max |r| = {:.3e})",
                    iterations,
                    max_abs(&self.workspace.residual)
                );
                Ok(SolveReport {
                    converged: true,
                    iterations,
                    residual: self.workspace.residual.clone(),
                    failure: None,
                    mask: None,
                })
            }
            Outcome::Failed { failure, iterations } => {
                warn!("DC solve failed after {} iterations: {}", iterations, failure);
                x.fill(f64::NAN);
                let mask = match failure {
                    SolveFailure::MaxIterations => Some(self.workspace.mask.clone()),
                    _ => None,
                };
                Ok(SolveReport {
                    converged: false,
                    iterations,
                    residual: vec![f64::NAN; size],
                    failure: Some(failure),
                    mask,
                })
            }
        }
    }

    fn solve_linear(&mut self, x: &mut [f64]) -> Result<Outcome> {
        match self.linear_pass(x) {
            Ok(()) => Ok(Outcome::Converged { iterations: 1 }),
            Err(err) => Ok(Outcome::Failed {
                failure: classify(err)?,
                iterations: 1,
            }),
        }
    }

    /// One undamped solve, then the residual at the solution.
    fn linear_pass(&mut self, x: &mut [f64]) -> Result<()> {
        let ws = &mut self.workspace;
        ws.evaluate_residual(x)?;
        ws.system.copy_from(&ws.base)?;
        ws.solve_update(self.backend.as_mut())?;
        for (xi, di) in x.iter_mut().zip(&ws.delta) {
            *xi += di;
        }
        ws.evaluate_residual(x)
    }

    fn solve_nonlinear(&mut self, circuit: &Circuit, time: f64, x: &mut [f64]) -> Result<Outcome> {
        let maxiter = self.options.maxiter;
        for n in 1..=maxiter {
            match self.iterate(circuit, time, n, x) {
                Ok(true) => return Ok(Outcome::Converged { iterations: n }),
                Ok(false) => {}
                Err(err) => {
                    return Ok(Outcome::Failed {
                        failure: classify(err)?,
                        iterations: n,
                    })
                }
            }
        }
        Ok(Outcome::Failed {
            failure: SolveFailure::MaxIterations,
            iterations: maxiter,
        })
    }

    /// One Newton iteration; returns true once converged.
    fn iterate(&mut self, circuit: &Circuit, time: f64, n: usize, x: &mut [f64]) -> Result<bool> {
        let ws = &mut self.workspace;
        self.nonlinear
            .build(circuit, x, time, &mut ws.jacobian, &mut ws.tx)?;
        ws.evaluate_residual(x)?;

        ws.system.copy_from(&ws.base)?;
        ws.system.accumulate(&ws.jacobian)?;
        ws.solve_update(self.backend.as_mut())?;

        let d = damping_factor(&self.options.damping, n, &ws.delta, self.nonlinear.locked_pairs());
        for (xi, di) in x.iter_mut().zip(&ws.delta) {
            *xi += d * di;
        }

        let converged = ws.check_convergence(x, &self.options);
        trace!(
            "newton iter {}: max |dx| = {:.3e}, max |r| = {:.3e}, damping = {:.3}",
            n,
            max_abs(&ws.delta),
            max_abs(&ws.residual),
            d
        );
        Ok(converged)
    }
}
