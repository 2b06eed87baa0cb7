//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine of the DC analyses.
//!
//! ## Modified Nodal Analysis
//!
//! The unknown vector `x` holds the node voltages (ground excluded) followed
//! by the auxiliary branch currents. The equations are written in residual
//! form
//!
//! ```text
//! r(x) = (A + Gmin)·x + s + N_tran + Tx(x) = 0
//! ```
//!
//! where:
//! - `A` is the constant coupling matrix of the linear stamps
//! - `s` is the constant source vector
//! - `Tx(x)` holds the currents injected by nonlinear devices
//! - `Gmin` and `N_tran` are optional inputs supplied by the caller
//!
//! For a voltage source between `p` and `n` with branch `j` the linear part
//! has the familiar block structure
//!
//! ```text
//! [ G   B ] [ v ]   [ i  ]
//! [ C   0 ] [ j ] + [ -e ] = 0
//! ```
//!
//! ## Pipeline
//!
//! 1. [`IndexMaps`] assigns matrix indices to nodes and branch currents
//! 2. [`LinearTemplate`] assembles `A` and `s` once per analysis
//! 3. [`NonlinearBuilder`] evaluates `Tx` and its Jacobian `J` per iteration
//! 4. [`NewtonSolver`] solves `(A + Gmin + J)·Δx = -r` through a
//!    [`LinearBackend`] and applies a damped update

mod backend;
mod damping;
mod index;
mod matrix;
mod newton;
mod nonlinear;
mod options;
mod sparse_lu;
mod stamp;

pub use backend::{backend_for, DenseLu, LinearBackend};
pub use damping::{damping_factor, LockedPair};
pub use index::IndexMaps;
pub use matrix::{DenseMatrix, MatrixKind, SparseMatrix, SystemMatrix};
pub use newton::{NewtonSolver, SolveFailure, SolveReport, Workspace};
pub use nonlinear::NonlinearBuilder;
pub use options::{DampingPolicy, SolveInputs, SolverOptions};
pub use sparse_lu::SparseLu;
pub use stamp::{fill_mna_matrix, fill_sources_matrix, LinearTemplate};

/// Default absolute tolerance on the Newton update (`ea`).
pub const DEFAULT_ABS_TOLERANCE: f64 = 1e-8;

/// Default relative tolerance on the Newton update (`er`).
pub const DEFAULT_REL_TOLERANCE: f64 = 1e-6;

/// Default absolute tolerance on every residual entry (`eresiduals`).
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 1e-9;

/// Default Newton-Raphson iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Systems with at least this many unknowns use sparse storage.
pub const DEFAULT_SPARSE_THRESHOLD: usize = 100;

/// Default damping factor applied during early iterations.
pub const DEFAULT_EARLY_FACTOR: f64 = 0.1;

/// A voltage-locked port may move at most this many thermal voltages per
/// iteration.
pub const DEFAULT_LOCKED_MULTIPLE: f64 = 10.0;

/// Pivots smaller than this are treated as zero.
pub const PIVOT_TOLERANCE: f64 = 1e-15;
