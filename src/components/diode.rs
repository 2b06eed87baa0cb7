//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! Above `v_crit` the exponential is continued by its tangent so that large
//! Newton steps cannot overflow. Current and conductance stay consistent
//! everywhere, which the Jacobian builder relies on.

use crate::circuit::{ComponentId, NodeId, Port};
use crate::components::NonlinearDevice;
use crate::{thermal_voltage, T_REF};

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
    /// Junction temperature in kelvin
    pub temperature: f64,
    /// Voltage above which the exponential is linearly extrapolated
    pub v_crit: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            temperature: T_REF,
            v_crit: 0.9,
        }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self {
            is: 1e-9,
            n: 1.5,
            temperature: T_REF,
            v_crit: 0.6,
        }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * thermal_voltage(self.temperature)
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 2], // [anode, cathode]
    pub params: DiodeParams,
}

impl Diode {
    /// Create a new diode.
    pub fn new(id: ComponentId, name: String, nodes: [NodeId; 2], params: DiodeParams) -> Self {
        Self {
            id,
            name,
            nodes,
            params,
        }
    }

    /// Anode-to-cathode port.
    pub fn port(&self) -> Port {
        Port::new(self.nodes[0], self.nodes[1])
    }

    /// Calculate the diode current at a given voltage.
    pub fn current(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        let v_crit = self.params.v_crit;

        if v > v_crit {
            // Linear extrapolation for high forward bias
            let i_crit = self.params.is * ((v_crit / n_vt).exp() - 1.0);
            let g_crit = self.params.is / n_vt * (v_crit / n_vt).exp();
            i_crit + g_crit * (v - v_crit)
        } else {
            self.params.is * ((v / n_vt).exp() - 1.0)
        }
    }

    /// Calculate the conductance (dI/dV) at a given voltage.
    pub fn conductance(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        // dI/dV = Is/(n*Vt) * exp(V/(n*Vt)), frozen above v_crit
        self.params.is / n_vt * (v.min(self.params.v_crit) / n_vt).exp()
    }
}

impl NonlinearDevice for Diode {
    fn drive_ports(&self) -> Vec<Port> {
        vec![self.port()]
    }

    fn output_ports(&self) -> Vec<Port> {
        vec![self.port()]
    }

    fn output_port_current(&self, _port: usize, drive_voltages: &[f64], _time: f64) -> f64 {
        self.current(drive_voltages[0])
    }

    fn drive_port_conductance(
        &self,
        _output_port: usize,
        _drive_port: usize,
        drive_voltages: &[f64],
        _time: f64,
    ) -> f64 {
        self.conductance(drive_voltages[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diode() -> Diode {
        Diode::new(
            ComponentId(0),
            "D1".to_string(),
            [NodeId(1), NodeId(0)],
            DiodeParams::default(),
        )
    }

    #[test]
    fn test_diode_forward_bias() {
        let d = diode();

        // At 0V, current should be approximately 0
        assert!(d.current(0.0).abs() < 1e-10);

        // At forward bias, current should increase exponentially
        let i_small = d.current(0.3);
        let i_large = d.current(0.6);
        assert!(i_large > i_small * 100.0);
    }

    #[test]
    fn test_diode_reverse_bias() {
        let d = diode();

        // In reverse bias, current should approach -Is
        let i_rev = d.current(-1.0);
        assert!(i_rev < 0.0);
        assert!(i_rev > -2.0 * d.params.is);
    }

    #[test]
    fn test_conductance_matches_finite_difference() {
        let d = diode();
        for &v in &[0.2, 0.65, 0.9, 1.5] {
            let h = 1e-7;
            let numeric = (d.current(v + h) - d.current(v - h)) / (2.0 * h);
            assert_relative_eq!(d.conductance(v), numeric, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_extrapolation_keeps_current_finite() {
        let d = diode();
        assert!(d.current(100.0).is_finite());
        assert!(d.conductance(100.0).is_finite());
    }
}
