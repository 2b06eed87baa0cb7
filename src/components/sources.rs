//! Voltage and current sources.

use crate::circuit::{BranchId, ComponentId, NodeId};

/// A voltage source component.
///
/// Voltage sources require an extra row/column in the MNA matrix for the
/// branch current. The source enforces: V+ - V- = V_source. The branch
/// current is positive when it flows into the `+` terminal.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative]
    pub dc_value: f64,
    pub branch: BranchId,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], dc_value: f64, branch: BranchId) -> Self {
        Self {
            id,
            name,
            nodes,
            dc_value,
            branch,
        }
    }

    /// Set the source value (used by DC sweeps).
    pub fn set_value(&mut self, value: f64) {
        self.dc_value = value;
    }

    /// Get the source voltage.
    pub fn voltage(&self) -> f64 {
        self.dc_value
    }
}

/// A current source component.
///
/// Current sources add directly to the source vector of the MNA equations.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [positive, negative] - current flows from + to - through the source
    pub dc_value: f64,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], dc_value: f64) -> Self {
        Self {
            id,
            name,
            nodes,
            dc_value,
        }
    }

    /// Set the source value.
    pub fn set_value(&mut self, value: f64) {
        self.dc_value = value;
    }

    /// Get the source current.
    pub fn current(&self) -> f64 {
        self.dc_value
    }
}
