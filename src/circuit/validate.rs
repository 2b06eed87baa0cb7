//! Circuit validation.

use std::collections::HashSet;

use crate::error::{DcError, Result};

use super::Circuit;

/// Validate a circuit for DC analysis.
///
/// Checks:
/// - The circuit has at least one component
/// - At least one component touches ground
/// - Every node is touched by some component
///
/// Index-count consistency is checked separately when the index maps
/// are built.
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.components.is_empty() {
        return Err(DcError::InvalidTopology {
            message: "Circuit has no components".to_string(),
        });
    }

    let touched: HashSet<_> = circuit
        .components
        .iter()
        .flat_map(|c| c.terminals().iter().copied())
        .collect();

    if !touched.iter().any(|n| n.is_ground()) {
        return Err(DcError::InvalidTopology {
            message: "No component is connected to ground".to_string(),
        });
    }

    for (idx, name) in circuit.node_names.iter().enumerate().skip(1) {
        if !touched.contains(&super::NodeId(idx)) {
            return Err(DcError::InvalidTopology {
                message: format!("Node '{}' is not connected to any component", name),
            });
        }
    }

    // TODO: detect voltage-source loops and current-source cutsets before solving
    Ok(())
}
