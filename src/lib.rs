//! # dcop Core
//!
//! A DC circuit-equation solver built on Modified Nodal Analysis.
//!
//! This library provides:
//! - Index mapping of circuit nodes and branch currents to matrix rows
//! - Assembly of the constant MNA matrix and source vector
//! - Per-iteration residual and Jacobian contributions of nonlinear devices
//! - A damped Newton-Raphson solver with dense and sparse linear backends
//! - Operating-point and DC sweep analyses
//!
//! ## Architecture
//!
//! - [`circuit`] - Circuit graph representation and validation
//! - [`components`] - Component models (resistors, sources, diodes, BJTs, ...)
//! - [`solver`] - Index maps, MNA assembly, linear backends and Newton-Raphson
//! - [`analysis`] - Operating point and DC sweep
//!
//! ## Usage
//!
//! ```no_run
//! use dcop_core::{Circuit, OperatingPoint, SolverOptions};
//!
//! let mut circuit = Circuit::new();
//! circuit.add_voltage_source("V1", "in", "0", 5.0)?;
//! circuit.add_resistor("R1", "in", "out", 1e3)?;
//! circuit.add_resistor("R2", "out", "0", 1e3)?;
//!
//! let mut op = OperatingPoint::new(&circuit, SolverOptions::default())?;
//! let solution = op.run(None)?;
//! assert!(solution.converged);
//! println!("V(out) = {:?}", solution.voltage("out"));
//! # Ok::<(), dcop_core::DcError>(())
//! ```
//!
//! ## Equation Form
//!
//! Every analysis solves
//!
//! ```text
//! (A + Gmin)·x + s + N_tran + Tx(x) = 0
//! ```
//!
//! where `A` and `s` are the constant linear stamps, `Tx` the currents of
//! nonlinear devices and `Gmin`/`N_tran` optional caller inputs. Each KCL
//! row sums the currents leaving its node.

pub mod analysis;
pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use analysis::{DcSweep, OpSolution, OperatingPoint, SweepKind, SweepPoints, SweepSolution, SweepSpec};
pub use circuit::Circuit;
pub use error::{DcError, Result};
pub use solver::{SolveFailure, SolverOptions};

/// Reference temperature in kelvin.
pub const T_REF: f64 = 300.15;

/// Boltzmann constant over elementary charge, in V/K.
const K_OVER_Q: f64 = 8.617_333_262e-5;

/// Thermal voltage `kT/q` at the given temperature (kelvin).
pub fn thermal_voltage(temperature: f64) -> f64 {
    K_OVER_Q * temperature
}

/// Thermal voltage at [`T_REF`] (approximately 25.9mV)
pub const THERMAL_VOLTAGE: f64 = K_OVER_Q * T_REF;
