//! Linear controlled sources.
//!
//! Both sources read their control voltage from a node pair; they differ in
//! what they drive:
//! - VCCS: `I(out+ -> out-) = gm * (V(c+) - V(c-))`, a pure matrix stamp
//! - VCVS: `V(out+) - V(out-) = gain * (V(c+) - V(c-))`, needs a branch current

use crate::circuit::{BranchId, ComponentId, NodeId, Port};

/// Voltage-controlled current source.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 4], // [out+, out-, ctrl+, ctrl-]
    /// Transconductance (A/V)
    pub gm: f64,
}

impl Vccs {
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 4], gm: f64) -> Self {
        Self { id, name, nodes, gm }
    }

    pub fn output(&self) -> Port {
        Port::new(self.nodes[0], self.nodes[1])
    }

    pub fn control(&self) -> Port {
        Port::new(self.nodes[2], self.nodes[3])
    }
}

/// Voltage-controlled voltage source.
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 4], // [out+, out-, ctrl+, ctrl-]
    /// Voltage gain
    pub gain: f64,
    pub branch: BranchId,
}

impl Vcvs {
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 4], gain: f64, branch: BranchId) -> Self {
        Self {
            id,
            name,
            nodes,
            gain,
            branch,
        }
    }

    pub fn output(&self) -> Port {
        Port::new(self.nodes[0], self.nodes[1])
    }

    pub fn control(&self) -> Port {
        Port::new(self.nodes[2], self.nodes[3])
    }
}
