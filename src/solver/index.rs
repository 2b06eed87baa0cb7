//! Node and branch-current index maps.
//!
//! Two index spaces are kept side by side:
//! - *full*: ground is index 0, the other nodes follow in first-touched
//!   order, then the branch currents (`nnodes + k`);
//! - *reduced*: the full space with ground removed, so every reduced index
//!   is the full index minus one.
//!
//! The linear stamps are assembled in the full space; the Newton solver
//! works in the reduced one.

use crate::circuit::{BranchId, Circuit, ComponentId, NodeId, Port, VarIndex, GROUND_NAME};
use crate::error::{DcError, Result};

/// Index maps of one circuit, computed once per analysis.
#[derive(Debug, Clone)]
pub struct IndexMaps {
    /// Full index per `NodeId`
    node_full: Vec<Option<usize>>,
    /// Full index per `BranchId`
    current_full: Vec<Option<usize>>,
    /// Full terminal indices per component
    terminals_full: Vec<Vec<usize>>,
    /// Reduced terminal indices per component (`None` for ground)
    terminals_reduced: Vec<Vec<Option<usize>>>,
    /// Node names in full index order
    node_labels: Vec<String>,
    /// Owning component names in current order
    current_labels: Vec<String>,
}

impl IndexMaps {
    /// Build the maps for `circuit`.
    ///
    /// Fails with [`DcError::MalformedGraph`] when the touched nodes or the
    /// declared branches do not match the circuit's counts.
    pub fn new(circuit: &Circuit) -> Result<Self> {
        let mut node_full = vec![None; circuit.num_nodes()];
        let mut node_labels = vec![GROUND_NAME.to_string()];
        node_full[NodeId::GROUND.0] = Some(0);

        let mut terminals_full = Vec::with_capacity(circuit.components.len());
        for component in &circuit.components {
            let mut terminals = Vec::with_capacity(component.terminals().len());
            for &node in component.terminals() {
                let slot = node_full.get_mut(node.0).ok_or_else(|| {
                    DcError::malformed(format!(
                        "component '{}' references unknown node {}",
                        component.name(),
                        node
                    ))
                })?;
                let index = match *slot {
                    Some(index) => index,
                    None => {
                        let index = node_labels.len();
                        *slot = Some(index);
                        node_labels.push(circuit.node_name(node).to_string());
                        index
                    }
                };
                terminals.push(index);
            }
            terminals_full.push(terminals);
        }

        let nnodes = node_labels.len();
        if nnodes != circuit.num_nodes() {
            return Err(DcError::malformed(format!(
                "circuit declares {} nodes but components touch {}",
                circuit.num_nodes(),
                nnodes
            )));
        }

        let mut current_full = vec![None; circuit.num_branches];
        let mut current_labels = Vec::with_capacity(circuit.num_branches);
        for component in &circuit.components {
            let Some(branch) = component.branch() else { continue };
            let slot = current_full.get_mut(branch.0).ok_or_else(|| {
                DcError::malformed(format!(
                    "component '{}' uses undeclared branch {}",
                    component.name(),
                    branch
                ))
            })?;
            if slot.is_some() {
                return Err(DcError::malformed(format!(
                    "branch {} is claimed by more than one component ('{}')",
                    branch,
                    component.name()
                )));
            }
            *slot = Some(nnodes + current_labels.len());
            current_labels.push(component.name().to_string());
        }

        if current_labels.len() != circuit.num_branches {
            return Err(DcError::malformed(format!(
                "circuit declares {} branch currents but components own {}",
                circuit.num_branches,
                current_labels.len()
            )));
        }

        let terminals_reduced = terminals_full
            .iter()
            .map(|t| t.iter().map(|&i| i.checked_sub(1)).collect())
            .collect();

        Ok(Self {
            node_full,
            current_full,
            terminals_full,
            terminals_reduced,
            node_labels,
            current_labels,
        })
    }

    /// Number of nodes, ground included.
    pub fn num_nodes(&self) -> usize {
        self.node_labels.len()
    }

    /// Number of branch-current unknowns.
    pub fn num_currents(&self) -> usize {
        self.current_labels.len()
    }

    /// Size of the full index space (ground included).
    pub fn full_dim(&self) -> usize {
        self.num_nodes() + self.num_currents()
    }

    /// Size of the reduced index space, i.e. the length of `x`.
    pub fn reduced_dim(&self) -> usize {
        self.full_dim() - 1
    }

    pub fn num_components(&self) -> usize {
        self.terminals_full.len()
    }

    /// Check that `circuit` still has the shape these maps were built for.
    ///
    /// Source values may change; nodes, branches and component terminals
    /// may not.
    pub fn check_circuit(&self, circuit: &Circuit) -> Result<()> {
        if circuit.num_nodes() != self.num_nodes()
            || circuit.num_branches != self.num_currents()
            || circuit.components.len() != self.num_components()
        {
            return Err(DcError::malformed(format!(
                "circuit has {} nodes, {} branches and {} components, index maps expect {}, {} and {}",
                circuit.num_nodes(),
                circuit.num_branches,
                circuit.components.len(),
                self.num_nodes(),
                self.num_currents(),
                self.num_components()
            )));
        }
        for (component, terminals) in circuit.components.iter().zip(&self.terminals_full) {
            if component.terminals().len() != terminals.len() {
                return Err(DcError::malformed(format!(
                    "component '{}' changed its terminal count",
                    component.name()
                )));
            }
        }
        Ok(())
    }

    pub fn full_node(&self, node: NodeId) -> Option<usize> {
        self.node_full.get(node.0).copied().flatten()
    }

    /// Reduced index of a node; `None` for ground and unknown nodes.
    pub fn reduced_node(&self, node: NodeId) -> Option<usize> {
        self.full_node(node).and_then(|i| i.checked_sub(1))
    }

    pub fn full_current(&self, branch: BranchId) -> Option<usize> {
        self.current_full.get(branch.0).copied().flatten()
    }

    pub fn reduced_current(&self, branch: BranchId) -> Option<usize> {
        self.full_current(branch).map(|i| i - 1)
    }

    pub fn full_var(&self, var: VarIndex) -> Option<usize> {
        match var {
            VarIndex::Voltage(node) => self.full_node(node),
            VarIndex::Current(branch) => self.full_current(branch),
        }
    }

    /// Reduced index of an unknown; `None` for the ground voltage.
    pub fn reduced_var(&self, var: VarIndex) -> Option<usize> {
        match var {
            VarIndex::Voltage(node) => self.reduced_node(node),
            VarIndex::Current(branch) => self.reduced_current(branch),
        }
    }

    /// Full indices of a component's terminals, in declaration order.
    pub fn component_terminals(&self, id: ComponentId) -> &[usize] {
        self.terminals_full.get(id.0).map_or(&[], |t| t.as_slice())
    }

    /// Reduced indices of a component's terminals (`None` for ground).
    pub fn reduced_component_terminals(&self, id: ComponentId) -> &[Option<usize>] {
        self.terminals_reduced.get(id.0).map_or(&[], |t| t.as_slice())
    }

    /// Reduced indices of both ends of a port.
    pub fn resolve_port(&self, port: Port) -> Result<(Option<usize>, Option<usize>)> {
        let resolve = |node: NodeId| {
            self.full_node(node)
                .map(|i| i.checked_sub(1))
                .ok_or_else(|| DcError::malformed(format!("port node {} has no index", node)))
        };
        Ok((resolve(port.pos)?, resolve(port.neg)?))
    }

    /// Node names in full index order (`"gnd"` first).
    pub fn node_labels(&self) -> &[String] {
        &self.node_labels
    }

    /// Names of the components owning each current, in current order.
    pub fn current_labels(&self) -> &[String] {
        &self.current_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Component, Resistor, VoltageSource};

    fn divider() -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "in", "0", 5.0).unwrap();
        circuit.add_resistor("R1", "in", "out", 1e3).unwrap();
        circuit.add_resistor("R2", "out", "0", 1e3).unwrap();
        circuit
    }

    #[test]
    fn test_full_and_reduced_indices() {
        let circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();

        assert_eq!(maps.num_nodes(), 3);
        assert_eq!(maps.num_currents(), 1);
        assert_eq!(maps.full_dim(), 4);
        assert_eq!(maps.reduced_dim(), 3);
        assert_eq!(maps.node_labels(), ["gnd", "in", "out"]);
        assert_eq!(maps.current_labels(), ["V1"]);

        let out = circuit.find_node("out").unwrap();
        assert_eq!(maps.full_node(out), Some(2));
        assert_eq!(maps.reduced_node(out), Some(1));
        assert_eq!(maps.full_current(BranchId(0)), Some(3));
        assert_eq!(maps.reduced_current(BranchId(0)), Some(2));
    }

    #[test]
    fn test_ground_has_no_reduced_index() {
        let circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();

        assert_eq!(maps.full_node(NodeId::GROUND), Some(0));
        assert_eq!(maps.reduced_node(NodeId::GROUND), None);
        assert_eq!(maps.reduced_var(VarIndex::Voltage(NodeId::GROUND)), None);
        assert_eq!(maps.component_terminals(ComponentId(0)), [1, 0]);
        assert_eq!(maps.reduced_component_terminals(ComponentId(0)), [Some(0), None]);
    }

    #[test]
    fn test_first_touched_order() {
        // Declare nodes in one order, touch them in another
        let mut circuit = Circuit::new();
        let b = circuit.node("b");
        let a = circuit.node("a");
        circuit
            .add(Component::Resistor(Resistor::new(
                ComponentId(0),
                "R1".to_string(),
                [a, b],
                1e3,
            )))
            .unwrap();
        circuit
            .add(Component::Resistor(Resistor::new(
                ComponentId(1),
                "R2".to_string(),
                [b, NodeId::GROUND],
                1e3,
            )))
            .unwrap();

        let maps = IndexMaps::new(&circuit).unwrap();
        assert_eq!(maps.node_labels(), ["gnd", "a", "b"]);
        assert_eq!(maps.full_node(a), Some(1));
    }

    #[test]
    fn test_untouched_node_is_malformed() {
        let mut circuit = divider();
        circuit.node("dangling");
        assert!(matches!(
            IndexMaps::new(&circuit),
            Err(DcError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_branch_mismatch_is_malformed() {
        // Two sources claiming the same branch
        let mut circuit = Circuit::new();
        let a = circuit.node("a");
        let br = circuit.declare_branch();
        circuit.declare_branch();
        for (i, name) in ["V1", "V2"].iter().enumerate() {
            circuit
                .add(Component::VoltageSource(VoltageSource::new(
                    ComponentId(i),
                    name.to_string(),
                    [a, NodeId::GROUND],
                    1.0,
                    br,
                )))
                .unwrap();
        }
        assert!(matches!(
            IndexMaps::new(&circuit),
            Err(DcError::MalformedGraph { .. })
        ));

        // A declared branch nobody owns
        let mut circuit = divider();
        circuit.declare_branch();
        assert!(matches!(
            IndexMaps::new(&circuit),
            Err(DcError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_check_circuit_shape() {
        let circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();
        assert!(maps.check_circuit(&circuit).is_ok());

        let mut changed = divider();
        changed.component_mut(ComponentId(0)).set_dc_value(1.0);
        assert!(maps.check_circuit(&changed).is_ok());

        changed.add_resistor("R3", "out", "0", 1e3).unwrap();
        assert!(matches!(
            maps.check_circuit(&changed),
            Err(DcError::MalformedGraph { .. })
        ));
    }
}
