//! Component models for DC analysis.
//!
//! This module provides the reference component set:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source
//! - Controlled: VCCS, VCVS
//! - Nonlinear: Diode, BJT
//!
//! Every component describes itself to the solver through the same
//! capability set:
//! - *linear DC couplings*: constant coefficients of the base MNA matrix,
//! - *DC injections*: constant entries of the source vector,
//! - optionally a [`NonlinearDevice`] with drive and output ports.
//!
//! The solver never inspects concrete component types; it only branches on
//! [`Component::behavior`].

mod bjt;
mod controlled;
mod diode;
mod linear;
mod sources;

pub use bjt::{Bjt, BjtParams, BjtType};
pub use controlled::{Vccs, Vcvs};
pub use diode::{Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource};

use std::fmt;

use crate::circuit::{BranchId, ComponentId, NodeId, Port, VarIndex};

/// A constant coefficient of the base MNA matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coupling {
    pub row: VarIndex,
    pub col: VarIndex,
    pub value: f64,
}

/// A constant entry of the source vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Injection {
    pub row: VarIndex,
    pub value: f64,
}

/// Collector for the linear DC contributions of one component.
///
/// The system is written as `A·x + s = 0`, where each KCL row sums the
/// currents *leaving* its node. Ground entries are recorded like any other
/// node; the assembler drops the ground row and column afterwards.
#[derive(Debug, Default, Clone)]
pub struct LinearStamps {
    pub couplings: Vec<Coupling>,
    pub injections: Vec<Injection>,
}

impl LinearStamps {
    /// Record `A[row, col] += value`.
    pub fn couple(&mut self, row: VarIndex, col: VarIndex, value: f64) {
        self.couplings.push(Coupling { row, col, value });
    }

    /// Record `s[row] += value`.
    pub fn inject(&mut self, row: VarIndex, value: f64) {
        self.injections.push(Injection { row, value });
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   A[n1,n1] += G
    ///   A[n2,n2] += G
    ///   A[n1,n2] -= G
    ///   A[n2,n1] -= G
    pub fn conductance(&mut self, n1: NodeId, n2: NodeId, g: f64) {
        let (v1, v2) = (VarIndex::Voltage(n1), VarIndex::Voltage(n2));
        self.couple(v1, v1, g);
        self.couple(v2, v2, g);
        self.couple(v1, v2, -g);
        self.couple(v2, v1, -g);
    }

    /// Stamp the incidence of a branch current flowing from `pos` through
    /// the component to `neg`, together with the branch row `V(pos) - V(neg)`.
    pub fn branch(&mut self, pos: NodeId, neg: NodeId, br: BranchId) {
        let (vp, vn, ib) = (VarIndex::Voltage(pos), VarIndex::Voltage(neg), VarIndex::Current(br));
        self.couple(vp, ib, 1.0);
        self.couple(vn, ib, -1.0);
        self.couple(ib, vp, 1.0);
        self.couple(ib, vn, -1.0);
    }

    /// Stamp a current source; `current` flows from `pos` through the source to `neg`.
    pub fn current_source(&mut self, pos: NodeId, neg: NodeId, current: f64) {
        self.inject(VarIndex::Voltage(pos), current);
        self.inject(VarIndex::Voltage(neg), -current);
    }

    /// Stamp a transconductance: current `gm * (V(c+) - V(c-))` leaves
    /// `out+` and enters `out-`.
    pub fn transconductance(&mut self, out: Port, ctrl: Port, gm: f64) {
        let (op, on) = (VarIndex::Voltage(out.pos), VarIndex::Voltage(out.neg));
        let (cp, cn) = (VarIndex::Voltage(ctrl.pos), VarIndex::Voltage(ctrl.neg));
        self.couple(op, cp, gm);
        self.couple(op, cn, -gm);
        self.couple(on, cp, -gm);
        self.couple(on, cn, gm);
    }
}

/// The contract a voltage-dependent component must satisfy.
///
/// Currents are positive when they flow from an output port's `pos` node
/// through the device to its `neg` node. Drive voltages are passed in the
/// order of [`drive_ports`](Self::drive_ports).
pub trait NonlinearDevice: fmt::Debug {
    /// Node pairs whose voltage differences parametrize the device.
    fn drive_ports(&self) -> Vec<Port>;

    /// Node pairs into which the device injects current.
    fn output_ports(&self) -> Vec<Port>;

    /// Current through `port` for the given drive-port voltages.
    fn output_port_current(&self, port: usize, drive_voltages: &[f64], time: f64) -> f64;

    /// Partial derivative of the current of `output_port` with respect to
    /// the voltage of `drive_port`.
    fn drive_port_conductance(
        &self,
        output_port: usize,
        drive_port: usize,
        drive_voltages: &[f64],
        time: f64,
    ) -> f64;

    /// Node pairs whose per-iteration voltage change is limited by damping.
    fn locked_ports(&self) -> Vec<Port> {
        self.drive_ports()
    }
}

/// How the solver must treat a component.
#[derive(Debug, Clone, Copy)]
pub enum Behavior<'a> {
    /// Contributes only constant couplings and injections.
    Linear,
    /// Additionally contributes voltage-dependent currents every iteration.
    Nonlinear(&'a dyn NonlinearDevice),
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Vccs(Vccs),
    Vcvs(Vcvs),
    Diode(Diode),
    Bjt(Bjt),
}

impl Component {
    /// Get the component ID.
    pub fn id(&self) -> ComponentId {
        match self {
            Component::Resistor(r) => r.id,
            Component::Capacitor(c) => c.id,
            Component::Inductor(l) => l.id,
            Component::VoltageSource(v) => v.id,
            Component::CurrentSource(i) => i.id,
            Component::Vccs(g) => g.id,
            Component::Vcvs(e) => e.id,
            Component::Diode(d) => d.id,
            Component::Bjt(q) => q.id,
        }
    }

    /// Get the component name.
    pub fn name(&self) -> &str {
        match self {
            Component::Resistor(r) => &r.name,
            Component::Capacitor(c) => &c.name,
            Component::Inductor(l) => &l.name,
            Component::VoltageSource(v) => &v.name,
            Component::CurrentSource(i) => &i.name,
            Component::Vccs(g) => &g.name,
            Component::Vcvs(e) => &e.name,
            Component::Diode(d) => &d.name,
            Component::Bjt(q) => &q.name,
        }
    }

    /// Declared terminals, in declaration order.
    pub fn terminals(&self) -> &[NodeId] {
        match self {
            Component::Resistor(r) => &r.nodes,
            Component::Capacitor(c) => &c.nodes,
            Component::Inductor(l) => &l.nodes,
            Component::VoltageSource(v) => &v.nodes,
            Component::CurrentSource(i) => &i.nodes,
            Component::Vccs(g) => &g.nodes,
            Component::Vcvs(e) => &e.nodes,
            Component::Diode(d) => &d.nodes,
            Component::Bjt(q) => &q.nodes,
        }
    }

    /// The auxiliary current unknown owned by this component, if any.
    pub fn branch(&self) -> Option<BranchId> {
        match self {
            Component::Inductor(l) => Some(l.branch),
            Component::VoltageSource(v) => Some(v.branch),
            Component::Vcvs(e) => Some(e.branch),
            _ => None,
        }
    }

    /// Record the bias-independent contributions of this component.
    pub fn stamp_dc(&self, stamps: &mut LinearStamps) {
        match self {
            Component::Resistor(r) => {
                stamps.conductance(r.nodes[0], r.nodes[1], r.conductance());
            }

            // Open circuit at DC
            Component::Capacitor(_) => {}

            Component::Inductor(l) => {
                // Short circuit at DC: V(n1) - V(n2) = 0
                stamps.branch(l.nodes[0], l.nodes[1], l.branch);
            }

            Component::VoltageSource(v) => {
                stamps.branch(v.nodes[0], v.nodes[1], v.branch);
                stamps.inject(VarIndex::Current(v.branch), -v.voltage());
            }

            Component::CurrentSource(i) => {
                stamps.current_source(i.nodes[0], i.nodes[1], i.current());
            }

            Component::Vccs(g) => {
                stamps.transconductance(g.output(), g.control(), g.gm);
            }

            Component::Vcvs(e) => {
                let ctrl = e.control();
                let out = e.output();
                stamps.branch(out.pos, out.neg, e.branch);
                // Control voltage contribution
                let ib = VarIndex::Current(e.branch);
                stamps.couple(ib, VarIndex::Voltage(ctrl.pos), -e.gain);
                stamps.couple(ib, VarIndex::Voltage(ctrl.neg), e.gain);
            }

            // Fully described by their nonlinear ports
            Component::Diode(_) | Component::Bjt(_) => {}
        }
    }

    /// Constant coefficients of the base MNA matrix.
    pub fn dc_couplings(&self) -> Vec<Coupling> {
        let mut stamps = LinearStamps::default();
        self.stamp_dc(&mut stamps);
        stamps.couplings
    }

    /// Constant entries of the source vector.
    pub fn dc_sources(&self) -> Vec<Injection> {
        let mut stamps = LinearStamps::default();
        self.stamp_dc(&mut stamps);
        stamps.injections
    }

    /// Classify the component for the assembler.
    pub fn behavior(&self) -> Behavior<'_> {
        match self.nonlinear() {
            Some(device) => Behavior::Nonlinear(device),
            None => Behavior::Linear,
        }
    }

    /// The nonlinear model of this component, if it has one.
    pub fn nonlinear(&self) -> Option<&dyn NonlinearDevice> {
        match self {
            Component::Diode(d) => Some(d as &dyn NonlinearDevice),
            Component::Bjt(q) => Some(q as &dyn NonlinearDevice),
            _ => None,
        }
    }

    /// Check if this component is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear().is_some()
    }

    /// DC value of an independent source.
    pub fn dc_value(&self) -> Option<f64> {
        match self {
            Component::VoltageSource(v) => Some(v.dc_value),
            Component::CurrentSource(i) => Some(i.dc_value),
            _ => None,
        }
    }

    /// Set the DC value of an independent source.
    /// Returns `false` if the component has no DC value.
    pub fn set_dc_value(&mut self, value: f64) -> bool {
        match self {
            Component::VoltageSource(v) => {
                v.set_value(value);
                true
            }
            Component::CurrentSource(i) => {
                i.set_value(value);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistor_couplings() {
        let r = Component::Resistor(Resistor::new(
            ComponentId(0),
            "R1".to_string(),
            [NodeId(1), NodeId(2)],
            500.0,
        ));
        let couplings = r.dc_couplings();
        assert_eq!(couplings.len(), 4);
        assert_eq!(
            couplings[2],
            Coupling {
                row: VarIndex::Voltage(NodeId(1)),
                col: VarIndex::Voltage(NodeId(2)),
                value: -0.002,
            }
        );
        assert!(r.dc_sources().is_empty());
        assert!(matches!(r.behavior(), Behavior::Linear));
    }

    #[test]
    fn test_voltage_source_injects_negative_value() {
        let v = Component::VoltageSource(VoltageSource::new(
            ComponentId(0),
            "V1".to_string(),
            [NodeId(1), NodeId::GROUND],
            3.0,
            BranchId(0),
        ));
        assert_eq!(
            v.dc_sources(),
            vec![Injection {
                row: VarIndex::Current(BranchId(0)),
                value: -3.0,
            }]
        );
        assert_eq!(v.branch(), Some(BranchId(0)));
    }

    #[test]
    fn test_set_dc_value_only_on_sources() {
        let mut v = Component::CurrentSource(CurrentSource::new(
            ComponentId(0),
            "I1".to_string(),
            [NodeId(1), NodeId::GROUND],
            1e-3,
        ));
        assert!(v.set_dc_value(2e-3));
        assert_eq!(v.dc_value(), Some(2e-3));

        let mut d = Component::Diode(Diode::new(
            ComponentId(1),
            "D1".to_string(),
            [NodeId(1), NodeId::GROUND],
            DiodeParams::default(),
        ));
        assert!(!d.set_dc_value(1.0));
        assert_eq!(d.dc_value(), None);
        assert!(matches!(d.behavior(), Behavior::Nonlinear(_)));
    }
}
