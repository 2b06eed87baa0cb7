//! Analysis results.

use ndarray::{Array2, ArrayView1, Axis};

use crate::circuit::GROUND_NAME;
use crate::solver::SolveFailure;

fn normalize(name: &str) -> &str {
    match name {
        "0" | "GND" => GROUND_NAME,
        other => other,
    }
}

/// A single DC operating point.
#[derive(Debug, Clone)]
pub struct OpSolution {
    /// Node names, ground first
    pub node_names: Vec<String>,
    /// Node voltages (V), aligned with `node_names`
    pub voltages: Vec<f64>,
    /// Names of the components owning each branch current
    pub current_names: Vec<String>,
    /// Branch currents (A), aligned with `current_names`
    pub currents: Vec<f64>,
    /// Residual of the accepted iterate
    pub residual: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub failure: Option<SolveFailure>,
    /// Per-unknown convergence flags when the iteration cap was hit
    pub mask: Option<Vec<bool>>,
}

impl OpSolution {
    /// Voltage of a node by name (`"gnd"`, `"GND"` and `"0"` are ground).
    pub fn voltage(&self, node: &str) -> Option<f64> {
        let node = normalize(node);
        self.node_names
            .iter()
            .position(|n| n == node)
            .map(|i| self.voltages[i])
    }

    /// Branch current owned by a component.
    ///
    /// Positive current flows from the component's first terminal through
    /// it to the second.
    pub fn current(&self, component: &str) -> Option<f64> {
        self.current_names
            .iter()
            .position(|n| n == component)
            .map(|i| self.currents[i])
    }

    /// Largest residual magnitude.
    pub fn residual_norm(&self) -> f64 {
        self.residual.iter().fold(0.0f64, |m, r| m.max(r.abs()))
    }
}

/// Operating points along a swept source value.
///
/// Arrays are laid out as `(unknown, axis point)`.
#[derive(Debug, Clone)]
pub struct SweepSolution {
    /// Name of the swept source
    pub axis_name: String,
    /// Swept values
    pub axis: Vec<f64>,
    /// Node names, ground first
    pub node_names: Vec<String>,
    /// Node voltages, shape `(node_names.len(), axis.len())`
    pub voltages: Array2<f64>,
    /// Names of the components owning each branch current
    pub current_names: Vec<String>,
    /// Branch currents, shape `(current_names.len(), axis.len())`
    pub currents: Array2<f64>,
    /// True if every step converged
    pub converged: bool,
    /// Total iterations over all steps
    pub iterations: usize,
    pub step_converged: Vec<bool>,
    pub step_iterations: Vec<usize>,
    pub step_failures: Vec<Option<SolveFailure>>,
}

impl SweepSolution {
    /// Number of axis points.
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }

    /// Voltage curve of a node.
    pub fn voltage(&self, node: &str) -> Option<ArrayView1<'_, f64>> {
        let node = normalize(node);
        self.node_names
            .iter()
            .position(|n| n == node)
            .map(|i| self.voltages.index_axis(Axis(0), i))
    }

    /// Branch current curve owned by a component.
    pub fn current(&self, component: &str) -> Option<ArrayView1<'_, f64>> {
        self.current_names
            .iter()
            .position(|n| n == component)
            .map(|i| self.currents.index_axis(Axis(0), i))
    }
}
