//! Linear stamp assembly.
//!
//! The base matrix `A` and source vector `s` only depend on the linear
//! couplings and injections of the components. They are assembled once in
//! the full index space and reduced by dropping the ground row and column.

use log::debug;

use crate::circuit::Circuit;
use crate::error::{DcError, Result};

use super::index::IndexMaps;
use super::matrix::{MatrixKind, SystemMatrix};

/// Accumulate every linear DC coupling into a full-index matrix.
pub fn fill_mna_matrix(circuit: &Circuit, maps: &IndexMaps, matrix: &mut SystemMatrix) -> Result<()> {
    DcError::check_len(maps.full_dim(), matrix.size())?;
    for component in &circuit.components {
        for coupling in component.dc_couplings() {
            let row = maps.full_var(coupling.row);
            let col = maps.full_var(coupling.col);
            match (row, col) {
                (Some(r), Some(c)) => matrix.add(r, c, coupling.value),
                _ => {
                    return Err(DcError::malformed(format!(
                        "component '{}' couples an unknown variable",
                        component.name()
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Accumulate every constant injection into a full-index vector.
pub fn fill_sources_matrix(circuit: &Circuit, maps: &IndexMaps, vector: &mut [f64]) -> Result<()> {
    DcError::check_len(maps.full_dim(), vector.len())?;
    for component in &circuit.components {
        for injection in component.dc_sources() {
            let row = maps.full_var(injection.row).ok_or_else(|| {
                DcError::malformed(format!(
                    "component '{}' injects into an unknown variable",
                    component.name()
                ))
            })?;
            vector[row] += injection.value;
        }
    }
    Ok(())
}

/// The reduced base matrix and source vector of one analysis.
#[derive(Debug, Clone)]
pub struct LinearTemplate {
    matrix: SystemMatrix,
    sources: Vec<f64>,
    /// Full-index scratch for source refreshes
    full_sources: Vec<f64>,
}

impl LinearTemplate {
    /// Assemble the template in the given storage.
    pub fn new(circuit: &Circuit, maps: &IndexMaps, kind: MatrixKind) -> Result<Self> {
        let mut full = SystemMatrix::new(kind, maps.full_dim());
        fill_mna_matrix(circuit, maps, &mut full)?;
        let matrix = full.without_first();

        let mut template = Self {
            matrix,
            sources: vec![0.0; maps.reduced_dim()],
            full_sources: vec![0.0; maps.full_dim()],
        };
        template.refresh_sources(circuit, maps)?;

        debug!(
            "linear template: {:?} storage, {} unknowns, {} nonzeros",
            kind,
            maps.reduced_dim(),
            template.matrix.triplets().len()
        );
        Ok(template)
    }

    /// Re-read the source values from the circuit.
    ///
    /// The base matrix is left untouched, so only source values may have
    /// changed since the template was built.
    pub fn refresh_sources(&mut self, circuit: &Circuit, maps: &IndexMaps) -> Result<()> {
        self.full_sources.fill(0.0);
        fill_sources_matrix(circuit, maps, &mut self.full_sources)?;
        self.sources.copy_from_slice(&self.full_sources[1..]);
        Ok(())
    }

    /// Reduced base matrix `A`.
    pub fn matrix(&self) -> &SystemMatrix {
        &self.matrix
    }

    /// Reduced source vector `s`.
    pub fn sources(&self) -> &[f64] {
        &self.sources
    }

    pub fn kind(&self) -> MatrixKind {
        self.matrix.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn divider() -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "in", "0", 5.0).unwrap();
        circuit.add_resistor("R1", "in", "out", 1e3).unwrap();
        circuit.add_resistor("R2", "out", "0", 1e3).unwrap();
        circuit
    }

    #[test]
    fn test_full_matrix_has_ground_row() {
        let circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();
        let mut full = SystemMatrix::new(MatrixKind::Dense, maps.full_dim());
        fill_mna_matrix(&circuit, &maps, &mut full).unwrap();
        let dense = full.to_dense();

        // Ground row: -I(V1) and R2
        assert_relative_eq!(dense.get(0, 0), 1e-3);
        assert_relative_eq!(dense.get(0, 2), -1e-3);
        assert_relative_eq!(dense.get(0, 3), -1.0);
        // Every KCL column sums to zero over the full node set
        for col in 0..3 {
            let sum: f64 = (0..3).map(|row| dense.get(row, col)).sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_reduced_template() {
        let circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();
        for kind in [MatrixKind::Dense, MatrixKind::Sparse] {
            let template = LinearTemplate::new(&circuit, &maps, kind).unwrap();
            let a = template.matrix().to_dense();

            assert_eq!(a.size(), 3);
            // in: R1, incidence of V1
            assert_relative_eq!(a.get(0, 0), 1e-3);
            assert_relative_eq!(a.get(0, 2), 1.0);
            // out: R1 + R2
            assert_relative_eq!(a.get(1, 1), 2e-3);
            // branch row: V(in)
            assert_relative_eq!(a.get(2, 0), 1.0);
            assert_eq!(template.sources(), [0.0, 0.0, -5.0]);
        }
    }

    #[test]
    fn test_refresh_sources_follows_circuit() {
        let mut circuit = divider();
        let maps = IndexMaps::new(&circuit).unwrap();
        let mut template = LinearTemplate::new(&circuit, &maps, MatrixKind::Dense).unwrap();

        let id = circuit.find_component("V1").unwrap();
        circuit.component_mut(id).set_dc_value(2.0);
        template.refresh_sources(&circuit, &maps).unwrap();
        assert_eq!(template.sources(), [0.0, 0.0, -2.0]);
    }

    #[test]
    fn test_current_source_injection_signs() {
        let mut circuit = Circuit::new();
        circuit.add_current_source("I1", "0", "a", 1e-3).unwrap();
        circuit.add_resistor("R1", "a", "0", 1e3).unwrap();
        let maps = IndexMaps::new(&circuit).unwrap();
        let mut s = vec![0.0; maps.full_dim()];
        fill_sources_matrix(&circuit, &maps, &mut s).unwrap();
        // Current flows 0 -> a through the source, so it leaves ground
        // and enters `a`
        assert_eq!(s, vec![1e-3, -1e-3]);
    }
}
