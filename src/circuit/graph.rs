//! Circuit graph structure.

use std::collections::HashMap;

use super::types::{BranchId, ComponentId, NodeId, Port, GROUND_NAME};
use crate::components::{
    Bjt, BjtParams, BjtType, Capacitor, Component, CurrentSource, Diode, DiodeParams, Inductor,
    Resistor, Vccs, Vcvs, VoltageSource,
};
use crate::error::{DcError, Result};

/// A circuit graph ready for analysis.
///
/// The circuit owns its nodes and components. Nodes are created on first
/// reference by name; ground is always node 0 and answers to `"gnd"`,
/// `"GND"` and `"0"`. Components needing an auxiliary current unknown get
/// a fresh [`BranchId`] when they are added through the `add_*` helpers.
#[derive(Debug)]
pub struct Circuit {
    /// All components in the circuit
    pub components: Vec<Component>,

    /// Mapping from node names to node IDs
    pub node_map: HashMap<String, NodeId>,

    /// Reverse mapping from node IDs to names
    pub node_names: Vec<String>,

    /// Number of branch current variables (voltage sources, inductors, VCVS)
    pub num_branches: usize,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Create an empty circuit containing only the ground node.
    pub fn new() -> Self {
        let mut node_map = HashMap::new();
        node_map.insert(GROUND_NAME.to_string(), NodeId::GROUND);
        Self {
            components: Vec::new(),
            node_map,
            node_names: vec![GROUND_NAME.to_string()],
            num_branches: 0,
        }
    }

    /// Number of nodes, ground included.
    pub fn num_nodes(&self) -> usize {
        self.node_names.len()
    }

    /// Get the total size of the reduced MNA solution vector.
    pub fn matrix_size(&self) -> usize {
        // Nodes (excluding ground) + branch currents
        (self.num_nodes() - 1) + self.num_branches
    }

    /// Get or create the node with the given name.
    pub fn node(&mut self, name: &str) -> NodeId {
        let normalized = normalize_node_name(name);
        if let Some(&id) = self.node_map.get(normalized) {
            return id;
        }
        let id = NodeId(self.node_names.len());
        self.node_map.insert(normalized.to_string(), id);
        self.node_names.push(normalized.to_string());
        id
    }

    /// Find a node ID by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.node_map.get(normalize_node_name(name)).copied()
    }

    /// Get the name of a node.
    pub fn node_name(&self, node: NodeId) -> &str {
        &self.node_names[node.0]
    }

    /// Allocate a new auxiliary current unknown.
    pub fn declare_branch(&mut self) -> BranchId {
        let branch = BranchId(self.num_branches);
        self.num_branches += 1;
        branch
    }

    /// The ID the next added component will receive.
    pub fn next_component_id(&self) -> ComponentId {
        ComponentId(self.components.len())
    }

    /// Add a fully constructed component.
    ///
    /// The component's terminals must be nodes of this circuit. Branch IDs
    /// are taken as given; [`IndexMaps`](crate::solver::IndexMaps) rejects
    /// graphs where they do not match the declared branch count.
    pub fn add(&mut self, component: Component) -> Result<ComponentId> {
        self.ensure_unique(component.name())?;
        for node in component.terminals() {
            if node.0 >= self.num_nodes() {
                return Err(DcError::NodeNotFound {
                    node: node.to_string(),
                });
            }
        }
        let id = self.next_component_id();
        self.components.push(component);
        Ok(id)
    }

    /// Add a resistor between two nodes.
    pub fn add_resistor(&mut self, name: &str, n1: &str, n2: &str, resistance: f64) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        if !(resistance > 0.0) {
            return Err(DcError::invalid_parameter(name, "resistance", "must be positive"));
        }
        let nodes = [self.node(n1), self.node(n2)];
        let id = self.next_component_id();
        self.add(Component::Resistor(Resistor::new(id, name.to_string(), nodes, resistance)))
    }

    /// Add a capacitor (open circuit at DC).
    pub fn add_capacitor(&mut self, name: &str, n1: &str, n2: &str, capacitance: f64) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(n1), self.node(n2)];
        let id = self.next_component_id();
        self.add(Component::Capacitor(Capacitor::new(id, name.to_string(), nodes, capacitance)))
    }

    /// Add an inductor (short circuit at DC, carries a branch current).
    pub fn add_inductor(&mut self, name: &str, n1: &str, n2: &str, inductance: f64) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(n1), self.node(n2)];
        let branch = self.declare_branch();
        let id = self.next_component_id();
        self.add(Component::Inductor(Inductor::new(id, name.to_string(), nodes, inductance, branch)))
    }

    /// Add an independent voltage source: `V(pos) - V(neg) = value`.
    pub fn add_voltage_source(&mut self, name: &str, pos: &str, neg: &str, value: f64) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(pos), self.node(neg)];
        let branch = self.declare_branch();
        let id = self.next_component_id();
        self.add(Component::VoltageSource(VoltageSource::new(id, name.to_string(), nodes, value, branch)))
    }

    /// Add an independent current source; `value` flows from `pos` through
    /// the source to `neg`.
    pub fn add_current_source(&mut self, name: &str, pos: &str, neg: &str, value: f64) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(pos), self.node(neg)];
        let id = self.next_component_id();
        self.add(Component::CurrentSource(CurrentSource::new(id, name.to_string(), nodes, value)))
    }

    /// Add a voltage-controlled current source.
    /// `I(out+ -> out-) = gm * (V(ctrl+) - V(ctrl-))`
    pub fn add_vccs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl: (&str, &str),
        gm: f64,
    ) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(out.0), self.node(out.1), self.node(ctrl.0), self.node(ctrl.1)];
        let id = self.next_component_id();
        self.add(Component::Vccs(Vccs::new(id, name.to_string(), nodes, gm)))
    }

    /// Add a voltage-controlled voltage source.
    /// `V(out+) - V(out-) = gain * (V(ctrl+) - V(ctrl-))`
    pub fn add_vcvs(
        &mut self,
        name: &str,
        out: (&str, &str),
        ctrl: (&str, &str),
        gain: f64,
    ) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(out.0), self.node(out.1), self.node(ctrl.0), self.node(ctrl.1)];
        let branch = self.declare_branch();
        let id = self.next_component_id();
        self.add(Component::Vcvs(Vcvs::new(id, name.to_string(), nodes, gain, branch)))
    }

    /// Add a diode from anode to cathode.
    pub fn add_diode(&mut self, name: &str, anode: &str, cathode: &str, params: DiodeParams) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(anode), self.node(cathode)];
        let id = self.next_component_id();
        self.add(Component::Diode(Diode::new(id, name.to_string(), nodes, params)))
    }

    /// Add a bipolar transistor with terminals (collector, base, emitter).
    pub fn add_bjt(
        &mut self,
        name: &str,
        terminals: (&str, &str, &str),
        bjt_type: BjtType,
        params: BjtParams,
    ) -> Result<ComponentId> {
        self.ensure_unique(name)?;
        let nodes = [self.node(terminals.0), self.node(terminals.1), self.node(terminals.2)];
        let id = self.next_component_id();
        self.add(Component::Bjt(Bjt::new(id, name.to_string(), nodes, bjt_type, params)))
    }

    /// Find a component ID by name.
    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .position(|c| c.name() == name)
            .map(ComponentId)
    }

    /// Get a component by ID.
    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    /// Get a mutable component by ID.
    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0]
    }

    /// Check whether any component requires Newton-Raphson iteration.
    pub fn has_nonlinear(&self) -> bool {
        self.components.iter().any(|c| c.is_nonlinear())
    }

    /// All node pairs whose voltage step is limited during damping.
    pub fn locked_ports(&self) -> Vec<Port> {
        self.components
            .iter()
            .filter_map(|c| c.nonlinear())
            .flat_map(|device| device.locked_ports())
            .collect()
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        if self.find_component(name).is_some() {
            return Err(DcError::DuplicateComponent {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

fn normalize_node_name(name: &str) -> &str {
    match name {
        "0" | "GND" => GROUND_NAME,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_aliases() {
        let mut circuit = Circuit::new();
        assert_eq!(circuit.node("0"), NodeId::GROUND);
        assert_eq!(circuit.node("GND"), NodeId::GROUND);
        assert_eq!(circuit.node("gnd"), NodeId::GROUND);
        assert_eq!(circuit.num_nodes(), 1);
    }

    #[test]
    fn test_nodes_created_on_first_reference() {
        let mut circuit = Circuit::new();
        circuit.add_resistor("R1", "in", "out", 1e3).unwrap();
        circuit.add_resistor("R2", "out", "0", 1e3).unwrap();

        assert_eq!(circuit.num_nodes(), 3);
        assert_eq!(circuit.find_node("in"), Some(NodeId(1)));
        assert_eq!(circuit.find_node("out"), Some(NodeId(2)));
        assert_eq!(circuit.node_name(NodeId(2)), "out");
    }

    #[test]
    fn test_branches_allocated_for_sources() {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "in", "0", 5.0).unwrap();
        circuit.add_resistor("R1", "in", "0", 1e3).unwrap();
        circuit.add_inductor("L1", "in", "0", 1e-3).unwrap();

        assert_eq!(circuit.num_branches, 2);
        assert_eq!(circuit.matrix_size(), 3);
    }

    #[test]
    fn test_duplicate_name_rejected_without_side_effects() {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "a", "0", 1.0).unwrap();
        let err = circuit.add_voltage_source("V1", "b", "0", 1.0).unwrap_err();

        assert!(matches!(err, DcError::DuplicateComponent { .. }));
        assert_eq!(circuit.num_branches, 1);
        assert!(circuit.find_node("b").is_none());
    }

    #[test]
    fn test_locked_ports_come_from_nonlinear_devices() {
        let mut circuit = Circuit::new();
        circuit.add_resistor("R1", "a", "0", 1e3).unwrap();
        circuit.add_diode("D1", "a", "0", DiodeParams::default()).unwrap();

        let ports = circuit.locked_ports();
        assert_eq!(ports, vec![Port::new(NodeId(1), NodeId::GROUND)]);
        assert!(circuit.has_nonlinear());
    }
}
