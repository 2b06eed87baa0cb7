//! DC analyses.
//!
//! - [`OperatingPoint`]: one Newton solve, labelled by node and component
//! - [`DcSweep`]: a warm-started sequence of operating points while one
//!   independent source is stepped

mod op;
mod solution;
mod sweep;

pub use op::OperatingPoint;
pub use solution::{OpSolution, SweepSolution};
pub use sweep::{DcSweep, SweepKind, SweepPoints, SweepSpec};

use crate::solver::IndexMaps;

/// Split a reduced solution vector into node voltages (ground included)
/// and branch currents.
fn split_solution(maps: &IndexMaps, x: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let node_unknowns = maps.num_nodes() - 1;
    let mut voltages = Vec::with_capacity(maps.num_nodes());
    voltages.push(0.0);
    voltages.extend_from_slice(&x[..node_unknowns]);
    (voltages, x[node_unknowns..].to_vec())
}
