//! BJT (Bipolar Junction Transistor) model.
//!
//! Uses the transport form of the Ebers-Moll model for NPN and PNP
//! transistors. With `Vbe` and `Vbc` as drive ports:
//!
//! ```text
//! I_F = Is * (exp(Vbe / nVt) - 1)        forward junction
//! I_R = Is * (exp(Vbc / nVt) - 1)        reverse junction
//!
//! port 0 (C -> E): I_T  = I_F - I_R      transport current
//! port 1 (B -> E): I_BE = I_F / beta_f   base-emitter diode
//! port 2 (B -> C): I_BC = I_R / beta_r   base-collector diode
//! ```
//!
//! For a PNP every junction voltage and every port current changes sign,
//! which leaves all conductances unchanged.

use crate::circuit::{ComponentId, NodeId, Port};
use crate::components::NonlinearDevice;
use crate::{thermal_voltage, T_REF};

/// BJT type (NPN or PNP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BjtType {
    Npn,
    Pnp,
}

impl BjtType {
    fn sign(self) -> f64 {
        match self {
            BjtType::Npn => 1.0,
            BjtType::Pnp => -1.0,
        }
    }
}

/// Parameters for a BJT model.
#[derive(Debug, Clone)]
pub struct BjtParams {
    /// Forward current gain (β_F)
    pub beta_f: f64,
    /// Reverse current gain (β_R)
    pub beta_r: f64,
    /// Transport saturation current
    pub is: f64,
    /// Ideality factor
    pub n: f64,
    /// Junction temperature in kelvin
    pub temperature: f64,
    /// Junction voltage above which the exponential is linearly extrapolated
    pub v_crit: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            beta_f: 100.0,
            beta_r: 1.0,
            is: 1e-14,
            n: 1.0,
            temperature: T_REF,
            v_crit: 0.9,
        }
    }
}

impl BjtParams {
    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * thermal_voltage(self.temperature)
    }
}

/// A BJT component.
#[derive(Debug, Clone)]
pub struct Bjt {
    pub id: ComponentId,
    pub name: String,
    pub nodes: [NodeId; 3], // [collector, base, emitter]
    pub bjt_type: BjtType,
    pub params: BjtParams,
}

impl Bjt {
    /// Create a new BJT.
    pub fn new(
        id: ComponentId,
        name: String,
        nodes: [NodeId; 3],
        bjt_type: BjtType,
        params: BjtParams,
    ) -> Self {
        Self {
            id,
            name,
            nodes,
            bjt_type,
            params,
        }
    }

    /// Get the collector node.
    pub fn collector(&self) -> NodeId {
        self.nodes[0]
    }

    /// Get the base node.
    pub fn base(&self) -> NodeId {
        self.nodes[1]
    }

    /// Get the emitter node.
    pub fn emitter(&self) -> NodeId {
        self.nodes[2]
    }

    /// Junction current for an NPN-oriented junction voltage.
    fn junction_current(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        let v_crit = self.params.v_crit;
        if v > v_crit {
            // Linear extrapolation to prevent overflow
            let i_crit = self.params.is * ((v_crit / n_vt).exp() - 1.0);
            let g_crit = self.params.is / n_vt * (v_crit / n_vt).exp();
            i_crit + g_crit * (v - v_crit)
        } else {
            self.params.is * ((v / n_vt).exp() - 1.0)
        }
    }

    /// Junction conductance for an NPN-oriented junction voltage.
    fn junction_conductance(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        self.params.is / n_vt * (v.min(self.params.v_crit) / n_vt).exp()
    }

    /// Collector current (into the collector terminal).
    pub fn i_c(&self, v_be: f64, v_bc: f64) -> f64 {
        let dv = [v_be, v_bc];
        self.output_port_current(0, &dv, 0.0) - self.output_port_current(2, &dv, 0.0)
    }

    /// Base current (into the base terminal).
    pub fn i_b(&self, v_be: f64, v_bc: f64) -> f64 {
        let dv = [v_be, v_bc];
        self.output_port_current(1, &dv, 0.0) + self.output_port_current(2, &dv, 0.0)
    }
}

impl NonlinearDevice for Bjt {
    fn drive_ports(&self) -> Vec<Port> {
        vec![
            Port::new(self.base(), self.emitter()),
            Port::new(self.base(), self.collector()),
        ]
    }

    fn output_ports(&self) -> Vec<Port> {
        vec![
            Port::new(self.collector(), self.emitter()),
            Port::new(self.base(), self.emitter()),
            Port::new(self.base(), self.collector()),
        ]
    }

    fn output_port_current(&self, port: usize, drive_voltages: &[f64], _time: f64) -> f64 {
        let sign = self.bjt_type.sign();
        let i_f = self.junction_current(sign * drive_voltages[0]);
        let i_r = self.junction_current(sign * drive_voltages[1]);
        let i = match port {
            0 => i_f - i_r,
            1 => i_f / self.params.beta_f,
            _ => i_r / self.params.beta_r,
        };
        sign * i
    }

    fn drive_port_conductance(
        &self,
        output_port: usize,
        drive_port: usize,
        drive_voltages: &[f64],
        _time: f64,
    ) -> f64 {
        let sign = self.bjt_type.sign();
        let g_f = self.junction_conductance(sign * drive_voltages[0]);
        let g_r = self.junction_conductance(sign * drive_voltages[1]);
        match (output_port, drive_port) {
            (0, 0) => g_f,
            (0, _) => -g_r,
            (1, 0) => g_f / self.params.beta_f,
            (1, _) => 0.0,
            (_, 0) => 0.0,
            (_, _) => g_r / self.params.beta_r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bjt(bjt_type: BjtType) -> Bjt {
        Bjt::new(
            ComponentId(0),
            "Q1".to_string(),
            [NodeId(1), NodeId(2), NodeId(3)],
            bjt_type,
            BjtParams::default(),
        )
    }

    #[test]
    fn test_forward_active_gain() {
        let q = bjt(BjtType::Npn);
        let (v_be, v_bc) = (0.65, -5.0);
        let beta = q.i_c(v_be, v_bc) / q.i_b(v_be, v_bc);
        assert_relative_eq!(beta, q.params.beta_f, max_relative = 1e-6);
    }

    #[test]
    fn test_pnp_mirrors_npn() {
        let npn = bjt(BjtType::Npn);
        let pnp = bjt(BjtType::Pnp);
        assert_relative_eq!(pnp.i_c(-0.65, 5.0), -npn.i_c(0.65, -5.0));
        assert_relative_eq!(pnp.i_b(-0.65, 5.0), -npn.i_b(0.65, -5.0));
    }

    #[test]
    fn test_conductances_match_finite_differences() {
        for bjt_type in [BjtType::Npn, BjtType::Pnp] {
            let q = bjt(bjt_type);
            let s = bjt_type.sign();
            let dv = [s * 0.62, s * 0.3];
            let h = 1e-7;
            for out in 0..3 {
                for drv in 0..2 {
                    let mut plus = dv;
                    let mut minus = dv;
                    plus[drv] += h;
                    minus[drv] -= h;
                    let numeric = (q.output_port_current(out, &plus, 0.0)
                        - q.output_port_current(out, &minus, 0.0))
                        / (2.0 * h);
                    let analytic = q.drive_port_conductance(out, drv, &dv, 0.0);
                    assert_relative_eq!(analytic, numeric, epsilon = 1e-12, max_relative = 1e-4);
                }
            }
        }
    }
}
