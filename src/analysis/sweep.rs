//! DC sweep analysis.
//!
//! Steps the DC value of one independent source and solves the operating
//! point at every value. Each step starts from the previous solution, so
//! small steps along a smooth curve converge in a few iterations.

use log::{debug, warn};
use ndarray::{s, Array2, ShapeBuilder};

use crate::circuit::{Circuit, ComponentId};
use crate::error::{DcError, Result};
use crate::solver::{IndexMaps, LinearBackend, NewtonSolver, SolveInputs, SolverOptions};

use super::solution::SweepSolution;

/// Upper bound on the number of sweep points.
const MAX_SWEEP_POINTS: usize = 10_000_000;

/// Spacing of the sweep axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Linear,
    /// Evenly spaced in `log10`; `start` and `stop` must share a nonzero sign.
    Logarithmic,
}

/// How many points the sweep axis has.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepPoints {
    /// Number of points, both ends included.
    Steps(usize),
    /// Distance between points (decades for logarithmic sweeps).
    StepSize(f64),
}

/// Sweep axis definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSpec {
    pub start: f64,
    pub stop: f64,
    pub points: SweepPoints,
    pub kind: SweepKind,
}

impl SweepSpec {
    /// `steps` evenly spaced points from `start` to `stop`.
    pub fn linear(start: f64, stop: f64, steps: usize) -> Self {
        Self {
            start,
            stop,
            points: SweepPoints::Steps(steps),
            kind: SweepKind::Linear,
        }
    }

    /// Points `step` apart from `start` towards `stop`.
    pub fn with_step(start: f64, stop: f64, step: f64) -> Self {
        Self {
            start,
            stop,
            points: SweepPoints::StepSize(step),
            kind: SweepKind::Linear,
        }
    }

    /// `steps` points evenly spaced in `log10`.
    pub fn logarithmic(start: f64, stop: f64, steps: usize) -> Self {
        Self {
            start,
            stop,
            points: SweepPoints::Steps(steps),
            kind: SweepKind::Logarithmic,
        }
    }

    /// Build the axis values.
    pub fn values(&self) -> Result<Vec<f64>> {
        if !self.start.is_finite() || !self.stop.is_finite() {
            return Err(DcError::invalid_sweep(format!(
                "bounds must be finite, got {} and {}",
                self.start, self.stop
            )));
        }

        match self.kind {
            SweepKind::Linear => spaced(self.start, self.stop, self.points),
            SweepKind::Logarithmic => {
                if self.start == 0.0 || self.stop == 0.0 || self.start.signum() != self.stop.signum() {
                    return Err(DcError::invalid_sweep(format!(
                        "logarithmic sweep needs bounds of the same nonzero sign, got {} and {}",
                        self.start, self.stop
                    )));
                }
                let sign = self.start.signum();
                let exponents = spaced(self.start.abs().log10(), self.stop.abs().log10(), self.points)?;
                let last = exponents.len() - 1;
                Ok(exponents
                    .iter()
                    .enumerate()
                    .map(|(i, e)| match i {
                        0 => self.start,
                        i if i == last && matches!(self.points, SweepPoints::Steps(_)) => self.stop,
                        _ => sign * 10f64.powf(*e),
                    })
                    .collect())
            }
        }
    }
}

/// Evenly spaced values from `start` towards `stop`.
fn spaced(start: f64, stop: f64, points: SweepPoints) -> Result<Vec<f64>> {
    match points {
        SweepPoints::Steps(0) => Err(DcError::invalid_sweep("sweep needs at least one point")),
        SweepPoints::Steps(1) => Ok(vec![start]),
        SweepPoints::Steps(n) => {
            if n > MAX_SWEEP_POINTS {
                return Err(DcError::invalid_sweep(format!("{} points exceed the limit", n)));
            }
            let span = stop - start;
            let last = n - 1;
            Ok((0..n)
                .map(|i| {
                    if i == last {
                        stop
                    } else {
                        start + span * (i as f64) / (last as f64)
                    }
                })
                .collect())
        }
        SweepPoints::StepSize(h) => {
            if !(h > 0.0 && h.is_finite()) {
                return Err(DcError::invalid_sweep(format!("step size must be positive, got {}", h)));
            }
            let span = stop - start;
            let count = (span.abs() / h + 0.5).floor();
            if count >= MAX_SWEEP_POINTS as f64 {
                return Err(DcError::invalid_sweep(format!("step {} is too small for the range", h)));
            }
            let step = h.copysign(span);
            Ok((0..=count as usize).map(|i| start + step * i as f64).collect())
        }
    }
}

/// Puts a swept source back to its original value when dropped.
struct SourceRestore<'a> {
    circuit: &'a mut Circuit,
    id: ComponentId,
    original: f64,
}

impl<'a> SourceRestore<'a> {
    fn new(circuit: &'a mut Circuit, id: ComponentId, original: f64) -> Self {
        Self {
            circuit,
            id,
            original,
        }
    }
}

impl Drop for SourceRestore<'_> {
    fn drop(&mut self) {
        self.circuit.component_mut(self.id).set_dc_value(self.original);
    }
}

/// DC sweep over one independent source.
#[derive(Debug)]
pub struct DcSweep<'c> {
    circuit: &'c mut Circuit,
    solver: NewtonSolver,
    inputs: SolveInputs,
}

impl<'c> DcSweep<'c> {
    /// Prepare the analysis: index maps, linear template and backend.
    pub fn new(circuit: &'c mut Circuit, options: SolverOptions) -> Result<Self> {
        let solver = NewtonSolver::new(circuit, options)?;
        Ok(Self {
            circuit,
            solver,
            inputs: SolveInputs::default(),
        })
    }

    /// Supply `Gmin`, `N_tran` and the evaluation time for every step.
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

    pub fn circuit(&self) -> &Circuit {
        &*self.circuit
    }

    /// Sweep `source` over `spec`.
    ///
    /// The first step starts from `x_guess` (zeros if `None`), every later
    /// step from the previous solution. After a failed step the next one
    /// starts from the initial guess again. The source's DC value is
    /// restored before returning, also on errors and panics.
    pub fn run(&mut self, source: &str, spec: SweepSpec, x_guess: Option<&[f64]>) -> Result<SweepSolution> {
        let axis = spec.values()?;
        let id = self
            .circuit
            .find_component(source)
            .ok_or_else(|| DcError::ComponentNotFound {
                name: source.to_string(),
            })?;
        let original = self
            .circuit
            .component(id)
            .dc_value()
            .ok_or_else(|| DcError::NotSweepable {
                name: source.to_string(),
            })?;

        let dim = self.solver.maps().reduced_dim();
        let start = match x_guess {
            Some(guess) => {
                DcError::check_len(dim, guess.len())?;
                guess.to_vec()
            }
            None => vec![0.0; dim],
        };

        let steps = axis.len();
        debug!(
            "dc sweep of {}: {} points from {} to {}",
            source, steps, axis[0], axis[steps - 1]
        );

        // Column k holds the solution of step k
        let mut solutions = Array2::<f64>::zeros((dim, steps).f());
        let mut step_converged = Vec::with_capacity(steps);
        let mut step_iterations = Vec::with_capacity(steps);
        let mut step_failures = Vec::with_capacity(steps);

        {
            let guard = SourceRestore::new(&mut *self.circuit, id, original);
            let data = solutions
                .as_slice_memory_order_mut()
                .ok_or_else(|| DcError::malformed("sweep buffer is not contiguous"))?;

            for (k, &value) in axis.iter().enumerate() {
                guard.circuit.component_mut(id).set_dc_value(value);
                self.solver.refresh_sources(&*guard.circuit)?;

                let (done, rest) = data.split_at_mut(k * dim);
                let column = &mut rest[..dim];
                if k > 0 && step_converged[k - 1] {
                    column.copy_from_slice(&done[(k - 1) * dim..]);
                } else {
                    column.copy_from_slice(&start);
                }

                let report = self.solver.solve(&*guard.circuit, &self.inputs, column)?;
                if !report.converged {
                    warn!(
                        "dc sweep of {}: step {} ({} = {}) did not converge: {:?}",
                        source, k, source, value, report.failure
                    );
                }
                step_converged.push(report.converged);
                step_iterations.push(report.iterations);
                step_failures.push(report.failure);
            }
        }
        self.solver.refresh_sources(&*self.circuit)?;

        let maps = self.solver.maps();
        let node_unknowns = maps.num_nodes() - 1;
        let mut voltages = Array2::<f64>::zeros((maps.num_nodes(), steps));
        voltages
            .slice_mut(s![1.., ..])
            .assign(&solutions.slice(s![..node_unknowns, ..]));
        let currents = solutions.slice(s![node_unknowns.., ..]).to_owned();

        let converged = step_converged.iter().all(|&c| c);
        let iterations = step_iterations.iter().sum();
        debug!(
            "dc sweep of {}: converged={}, total iterations={}",
            source, converged, iterations
        );

        Ok(SweepSolution {
            axis_name: source.to_string(),
            axis,
            node_names: maps.node_labels().to_vec(),
            voltages,
            current_names: maps.current_labels().to_vec(),
            currents,
            converged,
            iterations,
            step_converged,
            step_iterations,
            step_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::OperatingPoint;
    use crate::components::DiodeParams;
    use crate::solver::{DenseLu, SolveFailure, SystemMatrix};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn divider(v: f64) -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "in", "0", v).unwrap();
        circuit.add_resistor("R1", "in", "out", 1e3).unwrap();
        circuit.add_resistor("R2", "out", "0", 1e3).unwrap();
        circuit
    }

    fn diode_circuit(v: f64) -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add_voltage_source("V1", "in", "0", v).unwrap();
        circuit.add_resistor("R1", "in", "a", 1e3).unwrap();
        circuit.add_diode("D1", "a", "0", DiodeParams::default()).unwrap();
        circuit
    }

    /// Dense LU that reports a singular matrix on one chosen factorization.
    #[derive(Debug)]
    struct SingularOnCall {
        inner: DenseLu,
        calls: usize,
        fail_on: usize,
    }

    impl LinearBackend for SingularOnCall {
        fn name(&self) -> &'static str {
            "singular-on-call"
        }

        fn factor(&mut self, matrix: &SystemMatrix) -> Result<()> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(DcError::SingularMatrix);
            }
            self.inner.factor(matrix)
        }

        fn solve(&mut self, rhs: &mut [f64]) -> Result<()> {
            self.inner.solve(rhs)
        }
    }

    fn dc_value(circuit: &Circuit, name: &str) -> Option<f64> {
        circuit
            .find_component(name)
            .and_then(|id| circuit.component(id).dc_value())
    }

    #[test]
    fn test_linear_sweep_of_divider() {
        let mut circuit = divider(5.0);
        let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default()).unwrap();
        let result = sweep.run("V1", SweepSpec::linear(0.0, 5.0, 6), None).unwrap();

        assert_eq!(result.voltages.dim(), (3, 6));
        assert_eq!(result.currents.dim(), (1, 6));
        assert_eq!(result.axis, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(result.axis_name, "V1");
        assert!(result.converged);
        assert_eq!(result.iterations, 6);
        assert_eq!(result.step_iterations, vec![1; 6]);

        let out = result.voltage("out").unwrap();
        for (v, &axis) in out.iter().zip(&result.axis) {
            assert_abs_diff_eq!(*v, axis / 2.0, epsilon = 1e-12);
        }

        // First column equals the operating point at the start value
        let at_start = divider(0.0);
        let op = OperatingPoint::new(&at_start, SolverOptions::default())
            .unwrap()
            .run(None)
            .unwrap();
        for (i, v) in op.voltages.iter().enumerate() {
            assert_abs_diff_eq!(result.voltages[[i, 0]], *v, epsilon = 1e-12);
        }

        drop(sweep);
        assert_eq!(dc_value(&circuit, "V1"), Some(5.0));
    }

    #[test]
    fn test_current_source_sweep() {
        let mut circuit = Circuit::new();
        circuit.add_current_source("I1", "0", "a", 0.0).unwrap();
        circuit.add_resistor("R1", "a", "0", 2e3).unwrap();
        let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default()).unwrap();
        let result = sweep
            .run("I1", SweepSpec::with_step(0.0, 1e-3, 2.5e-4), None)
            .unwrap();

        assert_eq!(result.len(), 5);
        let a = result.voltage("a").unwrap();
        assert_relative_eq!(a[4], 2.0, max_relative = 1e-12);
        assert!(result.currents.is_empty());
    }

    #[test]
    fn test_warm_start_not_slower_than_cold() {
        let mut circuit = diode_circuit(1.0);
        let values = SweepSpec::linear(1.0, 1.5, 11).values().unwrap();
        let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default()).unwrap();
        let result = sweep.run("V1", SweepSpec::linear(1.0, 1.5, 11), None).unwrap();
        assert!(result.converged);

        for (k, &v) in values.iter().enumerate().skip(1) {
            let cold_circuit = diode_circuit(v);
            let cold = OperatingPoint::new(&cold_circuit, SolverOptions::default())
                .unwrap()
                .run(None)
                .unwrap();
            assert!(
                result.step_iterations[k] <= cold.iterations,
                "step {}: warm {} > cold {}",
                k,
                result.step_iterations[k],
                cold.iterations
            );
            assert_abs_diff_eq!(
                result.voltage("a").unwrap()[k],
                cold.voltage("a").unwrap(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_source_restored_after_error() {
        let mut circuit = divider(5.0);
        {
            // The out-of-range Gmin entry is only detected inside the solve
            let inputs = SolveInputs::new().with_gmin(vec![(10, 10, 1e-12)]);
            let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default())
                .unwrap()
                .with_inputs(inputs);
            let err = sweep.run("V1", SweepSpec::linear(0.0, 1.0, 3), None).unwrap_err();
            assert!(matches!(err, DcError::DimensionMismatch { .. }));
            assert_eq!(dc_value(sweep.circuit(), "V1"), Some(5.0));
        }
        assert_eq!(dc_value(&circuit, "V1"), Some(5.0));
    }

    #[test]
    fn test_source_restored_on_panic() {
        let mut circuit = divider(5.0);
        let id = circuit.find_component("V1").unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let guard = SourceRestore::new(&mut circuit, id, 5.0);
            guard.circuit.component_mut(id).set_dc_value(1.0);
            panic!("step failed");
        }));
        assert!(result.is_err());
        assert_eq!(dc_value(&circuit, "V1"), Some(5.0));
    }

    #[test]
    fn test_failed_steps_are_nan_and_reported() {
        let mut circuit = diode_circuit(5.0);
        let options = SolverOptions::new().with_maxiter(2);
        let mut sweep = DcSweep::new(&mut circuit, options).unwrap();
        let result = sweep.run("V1", SweepSpec::linear(1.0, 2.0, 3), None).unwrap();

        assert!(!result.converged);
        assert_eq!(result.iterations, 6);
        assert!(result.step_failures.iter().all(|f| f.is_some()));
        assert!(result.voltage("a").unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(dc_value(sweep.circuit(), "V1"), Some(5.0));
    }

    #[test]
    fn test_sweep_continues_after_failed_step() {
        let spec = SweepSpec::linear(1.0, 1.5, 6);
        let mut circuit = diode_circuit(1.0);
        let reference = DcSweep::new(&mut circuit, SolverOptions::default())
            .unwrap()
            .run("V1", spec, None)
            .unwrap();
        assert!(reference.converged);

        // One factorization per iteration: fail the first one of step 2
        let fail_on = reference.step_iterations[..2].iter().sum::<usize>() + 1;
        let backend = SingularOnCall {
            inner: DenseLu::new(),
            calls: 0,
            fail_on,
        };
        let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default())
            .unwrap()
            .with_backend(Box::new(backend));
        let result = sweep.run("V1", spec, None).unwrap();

        assert!(!result.converged);
        assert_eq!(result.step_converged, vec![true, true, false, true, true, true]);
        assert_eq!(result.step_failures[2], Some(SolveFailure::Singular));
        assert_eq!(result.step_iterations[2], 1);

        let a = result.voltage("a").unwrap();
        assert!(a[2].is_nan());
        assert!(result.current("V1").unwrap()[2].is_nan());
        assert_eq!(result.voltage("gnd").unwrap()[2], 0.0);

        // Step 3 starts from zeros again and repeats the cold solve
        let cold_circuit = diode_circuit(result.axis[3]);
        let cold = OperatingPoint::new(&cold_circuit, SolverOptions::default())
            .unwrap()
            .run(None)
            .unwrap();
        assert!(a[3].is_finite());
        assert_abs_diff_eq!(a[3], cold.voltage("a").unwrap(), epsilon = 1e-12);
        assert_eq!(result.step_iterations[3], cold.iterations);

        let expected = reference.voltage("a").unwrap();
        for k in [0, 1] {
            assert_abs_diff_eq!(a[k], expected[k], epsilon = 1e-12);
        }
        for k in [4, 5] {
            assert_abs_diff_eq!(a[k], expected[k], epsilon = 1e-6);
        }
        assert_eq!(dc_value(sweep.circuit(), "V1"), Some(1.0));
    }

    #[test]
    fn test_invalid_requests_rejected() {
        let mut circuit = divider(5.0);
        let mut sweep = DcSweep::new(&mut circuit, SolverOptions::default()).unwrap();

        assert!(matches!(
            sweep.run("V9", SweepSpec::linear(0.0, 1.0, 3), None),
            Err(DcError::ComponentNotFound { .. })
        ));
        assert!(matches!(
            sweep.run("R1", SweepSpec::linear(0.0, 1.0, 3), None),
            Err(DcError::NotSweepable { .. })
        ));
        assert!(matches!(
            sweep.run("V1", SweepSpec::linear(0.0, 1.0, 0), None),
            Err(DcError::InvalidSweep { .. })
        ));
        assert!(matches!(
            sweep.run("V1", SweepSpec::linear(0.0, 1.0, 3), Some(&[0.0][..])),
            Err(DcError::DimensionMismatch { .. })
        ));
        assert_eq!(dc_value(sweep.circuit(), "V1"), Some(5.0));
    }

    #[test]
    fn test_axis_values() {
        assert_eq!(SweepSpec::linear(2.0, 7.0, 1).values().unwrap(), vec![2.0]);
        assert_eq!(
            SweepSpec::linear(1.0, -1.0, 3).values().unwrap(),
            vec![1.0, 0.0, -1.0]
        );

        // Stop is reached within half a step
        let stepped = SweepSpec::with_step(0.0, 1.04, 0.25).values().unwrap();
        assert_eq!(stepped.len(), 5);
        assert_relative_eq!(stepped[4], 1.0);
        let down = SweepSpec::with_step(1.0, 0.0, 0.5).values().unwrap();
        assert_eq!(down, vec![1.0, 0.5, 0.0]);

        let log = SweepSpec::logarithmic(1e-3, 1.0, 4).values().unwrap();
        assert_eq!(log.len(), 4);
        assert_relative_eq!(log[1], 1e-2, max_relative = 1e-12);
        assert_relative_eq!(log[2], 1e-1, max_relative = 1e-12);
        assert_eq!(log[3], 1.0);

        let negative = SweepSpec::logarithmic(-1.0, -100.0, 3).values().unwrap();
        assert_relative_eq!(negative[1], -10.0, max_relative = 1e-12);
    }

    #[test]
    fn test_invalid_axis_rejected() {
        let invalid = [
            SweepSpec::linear(0.0, 1.0, 0),
            SweepSpec::linear(f64::NAN, 1.0, 3),
            SweepSpec::with_step(0.0, 1.0, 0.0),
            SweepSpec::with_step(0.0, 1.0, -0.1),
            SweepSpec::logarithmic(-1.0, 1.0, 3),
            SweepSpec::logarithmic(0.0, 1.0, 3),
        ];
        for spec in invalid {
            assert!(
                matches!(spec.values(), Err(DcError::InvalidSweep { .. })),
                "{:?}",
                spec
            );
        }
    }
}
