//! Nonlinear residual and Jacobian contributions.
//!
//! Every Newton iteration evaluates the nonlinear devices at the current
//! iterate. Output port currents go into `Tx`:
//!
//! ```text
//! Tx[out+] += I        Tx[out-] -= I
//! ```
//!
//! and each (output, drive) conductance `g = dI/dV_drive` is stamped into
//! the Jacobian `J`:
//!
//! ```text
//! J[out+, drv+] += g   J[out+, drv-] -= g
//! J[out-, drv+] -= g   J[out-, drv-] += g
//! ```
//!
//! Ground rows and columns are skipped.

use crate::circuit::{Circuit, ComponentId};
use crate::components::Behavior;
use crate::error::{DcError, Result};

use super::damping::LockedPair;
use super::index::IndexMaps;
use super::matrix::SystemMatrix;

type PortIndices = (Option<usize>, Option<usize>);

/// A nonlinear device with its ports resolved to reduced indices.
#[derive(Debug, Clone)]
struct ResolvedDevice {
    component: ComponentId,
    drive: Vec<PortIndices>,
    output: Vec<PortIndices>,
}

fn voltage_at(x: &[f64], index: Option<usize>) -> f64 {
    index.map_or(0.0, |i| x[i])
}

fn check_finite(value: f64, index: Option<usize>) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DcError::NumericalOverflow {
            index: index.unwrap_or(0),
            value,
        })
    }
}

/// Builds `J` and `Tx` from the nonlinear devices of a circuit.
#[derive(Debug, Clone, Default)]
pub struct NonlinearBuilder {
    devices: Vec<ResolvedDevice>,
    locked: Vec<LockedPair>,
    drive_voltages: Vec<f64>,
}

impl NonlinearBuilder {
    /// Resolve the ports of every nonlinear component once.
    pub fn new(circuit: &Circuit, maps: &IndexMaps) -> Result<Self> {
        let mut devices = Vec::new();
        let mut locked = Vec::new();

        for (k, component) in circuit.components.iter().enumerate() {
            let Behavior::Nonlinear(device) = component.behavior() else {
                continue;
            };
            let drive = device
                .drive_ports()
                .into_iter()
                .map(|p| maps.resolve_port(p))
                .collect::<Result<Vec<_>>>()?;
            let output = device
                .output_ports()
                .into_iter()
                .map(|p| maps.resolve_port(p))
                .collect::<Result<Vec<_>>>()?;
            for port in device.locked_ports() {
                locked.push(maps.resolve_port(port)?);
            }
            devices.push(ResolvedDevice {
                component: ComponentId(k),
                drive,
                output,
            });
        }

        Ok(Self {
            devices,
            locked,
            drive_voltages: Vec::new(),
        })
    }

    /// True if the circuit has no nonlinear devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of nonlinear devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Voltage-locked port pairs, in reduced indices.
    pub fn locked_pairs(&self) -> &[LockedPair] {
        &self.locked
    }

    /// Reset `jacobian` and `tx`, then accumulate every device at `x`.
    ///
    /// Fails with [`DcError::NumericalOverflow`] if a device returns a
    /// non-finite current or conductance.
    pub fn build(
        &mut self,
        circuit: &Circuit,
        x: &[f64],
        time: f64,
        jacobian: &mut SystemMatrix,
        tx: &mut [f64],
    ) -> Result<()> {
        DcError::check_len(jacobian.size(), x.len())?;
        DcError::check_len(jacobian.size(), tx.len())?;
        jacobian.clear();
        tx.fill(0.0);

        for resolved in &self.devices {
            let device = circuit
                .components
                .get(resolved.component.0)
                .and_then(|c| c.nonlinear())
                .filter(|d| {
                    d.drive_ports().len() == resolved.drive.len()
                        && d.output_ports().len() == resolved.output.len()
                })
                .ok_or_else(|| {
                    DcError::malformed(format!(
                        "component {} is no longer the nonlinear device the ports were resolved for",
                        resolved.component
                    ))
                })?;

            self.drive_voltages.clear();
            self.drive_voltages.extend(
                resolved
                    .drive
                    .iter()
                    .map(|&(p, n)| voltage_at(x, p) - voltage_at(x, n)),
            );
            let dv = &self.drive_voltages;

            for (o, &(op, on)) in resolved.output.iter().enumerate() {
                let current = check_finite(device.output_port_current(o, dv, time), op.or(on))?;
                if let Some(i) = op {
                    tx[i] += current;
                }
                if let Some(i) = on {
                    tx[i] -= current;
                }

                for (d, &(dp, dn)) in resolved.drive.iter().enumerate() {
                    let g = check_finite(device.drive_port_conductance(o, d, dv, time), op.or(on))?;
                    if g == 0.0 {
                        continue;
                    }
                    for (row, row_sign) in [(op, 1.0), (on, -1.0)] {
                        let Some(r) = row else { continue };
                        if let Some(c) = dp {
                            jacobian.add(r, c, row_sign * g);
                        }
                        if let Some(c) = dn {
                            jacobian.add(r, c, -row_sign * g);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
