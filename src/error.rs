//! Error types for the DC solver.
//!
//! This module provides a unified error type [`DcError`] that covers
//! malformed circuit graphs, invalid analysis parameters and failures of
//! the linear-algebra backends.
//!
//! Non-convergence of a Newton solve is *not* an error: it is reported
//! through the `converged` flag of the returned solution, together with a
//! [`SolveFailure`](crate::solver::SolveFailure) naming the failure class.

use thiserror::Error;

/// Result type alias using [`DcError`].
pub type Result<T> = std::result::Result<T, DcError>;

/// Unified error type for all solver operations.
#[derive(Error, Debug)]
pub enum DcError {
    // ============ Circuit Graph Errors ============
    /// Node not found in circuit
    #[error("Node '{node}' not found in circuit")]
    NodeNotFound { node: String },

    /// Component not found in circuit
    #[error("Component '{name}' not found in circuit")]
    ComponentNotFound { name: String },

    /// Duplicate component name
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Invalid component parameter
    #[error("Invalid parameter '{param}' for component '{component}': {message}")]
    InvalidParameter {
        component: String,
        param: String,
        message: String,
    },

    /// Index maps do not match the declared graph (duplicate or missing terminals)
    #[error("Malformed circuit graph: {message}")]
    MalformedGraph { message: String },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Analysis Errors ============
    /// Component has no DC value that can be swept
    #[error("Component '{name}' has no DC value to sweep")]
    NotSweepable { name: String },

    /// Invalid sweep axis
    #[error("Invalid sweep: {message}")]
    InvalidSweep { message: String },

    /// Invalid solver option
    #[error("Invalid solver option: {message}")]
    InvalidOption { message: String },

    /// Caller-provided buffer has the wrong length
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // ============ Linear Algebra Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - circuit may have a short circuit or floating node")]
    SingularMatrix,

    /// Numerical overflow detected
    #[error("Numerical overflow detected at unknown {index} (value: {value:.2e})")]
    NumericalOverflow { index: usize, value: f64 },
}

impl DcError {
    /// Create a malformed-graph error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedGraph {
            message: message.into(),
        }
    }

    /// Create an invalid sweep error
    pub fn invalid_sweep(message: impl Into<String>) -> Self {
        Self::InvalidSweep {
            message: message.into(),
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(
        component: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            component: component.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Check the length of a caller-provided buffer.
    pub fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }
}
