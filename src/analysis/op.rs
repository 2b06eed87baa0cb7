//! Operating-point analysis.

use log::debug;

use crate::circuit::Circuit;
use crate::error::{DcError, Result};
use crate::solver::{IndexMaps, LinearBackend, NewtonSolver, SolveInputs, SolverOptions};

use super::solution::OpSolution;
use super::split_solution;

/// DC operating point of a circuit.
#[derive(Debug)]
pub struct OperatingPoint<'c> {
    circuit: &'c Circuit,
    solver: NewtonSolver,
    inputs: SolveInputs,
}

impl<'c> OperatingPoint<'c> {
    /// Prepare the analysis: index maps, linear template and backend.
    pub fn new(circuit: &'c Circuit, options: SolverOptions) -> Result<Self> {
        Ok(Self {
            circuit,
            solver: NewtonSolver::new(circuit, options)?,
            inputs: SolveInputs::default(),
        })
    }

    /// Supply `Gmin`, `N_tran` and the evaluation time.
    pub fn with_inputs(mut self, inputs: SolveInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Replace the linear backend chosen from the system size.
    pub fn with_backend(mut self, backend: Box<dyn LinearBackend>) -> Self {
        self.solver.set_backend(backend);
        self
    }

    pub fn maps(&self) -> &IndexMaps {
        self.solver.maps()
    }

    pub fn solver(&self) -> &NewtonSolver {
        &self.solver
    }

    /// Solve from `x_guess` (zeros if `None`).
    pub fn run(&mut self, x_guess: Option<&[f64]>) -> Result<OpSolution> {
        let size = self.solver.maps().reduced_dim();
        let mut x = match x_guess {
            Some(guess) => {
                DcError::check_len(size, guess.len())?;
                guess.to_vec()
            }
            None => vec![0.0; size],
        };

        let report = self.solver.solve(self.circuit, &self.inputs, &mut x)?;
        debug!(
            "operating point: converged={}, iterations={}",
            report.converged, report.iterations
        );

        let maps = self.solver.maps();
        let (voltages, currents) = split_solution(maps, &x);
        Ok(OpSolution {
            node_names: maps.node_labels().to_vec(),
            voltages,
            current_names: maps.current_labels().to_vec(),
            currents,
            residual: report.residual,
            converged: report.converged,
            iterations: report.iterations,
            failure: report.failure,
            mask: report.mask,
        })
    }
}
