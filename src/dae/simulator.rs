//! Time-grid simulation of a reduced ODE.
//!
//! ```text
//! Created --initialize--> Initialized --run--> Running --> Completed
//!                                                  \-----> Failed
//! ```
//! `run` may be repeated from `Completed` or `Failed` (for example after
//! [`Simulator::set_options`]); `initialize` may be repeated in any state but
//! `Running`. A call that fails leaves the state untouched, except a failed
//! integration which moves the simulator to `Failed`.

use crate::dae::algebraic_elimination::{ReducedOde, StateFunction};
use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::dependents::OutputFunction;
use crate::numerical::NonStiff_api::{
    DormandPrince45, Integrator, IntegratorOptions, IntegratorStats, SolutionPoint,
};
use log::{error, info};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SimulatorState {
    Created,
    Initialized,
    Running,
    Completed,
    Failed,
}

/// States reported at the grid times, ordered by time.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub state_names: Vec<String>,
    pub points: Vec<SolutionPoint>,
}

impl Trajectory {
    pub fn new(state_names: Vec<String>, points: Vec<SolutionPoint>) -> Self {
        Self { state_names, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|(t, _)| *t).collect()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.points.last().map(|(t, _)| *t)
    }

    /// Values of one state over time.
    pub fn state_column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.state_names.iter().position(|s| s == name)?;
        Some(self.points.iter().map(|(_, x)| x[j]).collect())
    }

    /// rows = time points, columns = states
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.points.len(), self.state_names.len(), |i, j| {
            self.points[i].1[j]
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trajectory: Trajectory,
    /// rows = grid points, columns = outputs in request order
    pub outputs: DMatrix<f64>,
    pub output_names: Vec<String>,
    pub stats: IntegratorStats,
}

impl SimulationResult {
    pub fn output_column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.output_names.iter().position(|s| s == name)?;
        Some(self.outputs.column(j).iter().copied().collect())
    }
}

pub fn validate_grid(grid: &[f64]) -> DaeResult<()> {
    if grid.is_empty() {
        return Err(DaeError::InvalidGrid("grid is empty".to_string()));
    }
    if let Some(bad) = grid.iter().find(|t| !t.is_finite()) {
        return Err(DaeError::InvalidGrid(format!("non-finite time {}", bad)));
    }
    if let Some(w) = grid.windows(2).find(|w| w[1] <= w[0]) {
        return Err(DaeError::InvalidGrid(format!(
            "times must be strictly increasing, got {} then {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

pub struct Simulator {
    reduced: ReducedOde,
    rhs: StateFunction,
    outputs: OutputFunction,
    grid: Vec<f64>,
    integrator: Box<dyn Integrator>,
    options: IntegratorOptions,
    state: SimulatorState,
    x0: DVector<f64>,
    params: Vec<f64>,
    result: Option<SimulationResult>,
}

impl Simulator {
    /// The first grid point is the initial time.
    pub fn new(reduced: ReducedOde, outputs: OutputFunction, grid: Vec<f64>) -> DaeResult<Self> {
        validate_grid(&grid)?;
        let available = 1 + reduced.states.len() + reduced.parameters.len();
        let required = outputs.required_arguments();
        if required > available {
            return Err(DaeError::DimensionMismatch {
                what: "output function arguments".to_string(),
                expected: available,
                actual: required,
            });
        }
        let rhs = reduced.compile()?;
        Ok(Self {
            reduced,
            rhs,
            outputs,
            grid,
            integrator: Box::new(DormandPrince45::new()),
            options: IntegratorOptions::default(),
            state: SimulatorState::Created,
            x0: DVector::zeros(0),
            params: Vec::new(),
            result: None,
        })
    }

    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn set_options(&mut self, options: IntegratorOptions) -> DaeResult<()> {
        self.check_not_running("set_options")?;
        options.validate().map_err(DaeError::InvalidConfiguration)?;
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &IntegratorOptions {
        &self.options
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn grid(&self) -> &[f64] {
        &self.grid
    }

    pub fn reduced(&self) -> &ReducedOde {
        &self.reduced
    }

    fn check_not_running(&self, operation: &str) -> DaeResult<()> {
        if self.state == SimulatorState::Running {
            return Err(DaeError::InvalidState {
                operation: operation.to_string(),
                state: self.state,
            });
        }
        Ok(())
    }

    /// Sets the initial state (state order of the reduced ODE) and a value for every
    /// parameter and input.
    pub fn initialize(&mut self, initial_state: &[f64], parameters: &HashMap<String, f64>) -> DaeResult<()> {
        self.check_not_running("initialize")?;
        let expected = self.reduced.states.len();
        if initial_state.len() != expected {
            return Err(DaeError::DimensionMismatch {
                what: "initial state values".to_string(),
                expected,
                actual: initial_state.len(),
            });
        }
        let params = self
            .reduced
            .parameters
            .iter()
            .map(|name| {
                parameters
                    .get(name)
                    .copied()
                    .ok_or_else(|| DaeError::MissingParameter(name.clone()))
            })
            .collect::<DaeResult<Vec<f64>>>()?;

        self.x0 = DVector::from_column_slice(initial_state);
        self.params = params;
        self.result = None;
        self.state = SimulatorState::Initialized;
        info!("simulator initialized: x0 = {:?}, p = {:?}", initial_state, self.params);
        Ok(())
    }

    pub fn run(&mut self) -> DaeResult<&SimulationResult> {
        if !matches!(
            self.state,
            SimulatorState::Initialized | SimulatorState::Completed | SimulatorState::Failed
        ) {
            return Err(DaeError::InvalidState {
                operation: "run".to_string(),
                state: self.state,
            });
        }
        self.state = SimulatorState::Running;
        self.result = None;
        let t0 = self.grid[0];
        info!(
            "running {} from t = {} to t = {} over {} grid points",
            self.integrator.name(),
            t0,
            self.grid[self.grid.len() - 1],
            self.grid.len()
        );

        let f = &self.rhs;
        let p = &self.params;
        let rhs = move |t: f64, x: &DVector<f64>| f.eval(t, x, p);
        let outcome = self
            .integrator
            .integrate(&rhs, t0, &self.x0, &self.grid, &self.options);

        match outcome {
            Ok(points) => {
                let mut outputs = DMatrix::zeros(points.len(), self.outputs.len());
                for (i, (t, x)) in points.iter().enumerate() {
                    let row = self.outputs.evaluate(*t, x, &self.params);
                    outputs.row_mut(i).copy_from(&row.transpose());
                }
                let stats = self.integrator.stats();
                stats.log_table(self.integrator.name());
                self.state = SimulatorState::Completed;
                info!("simulation completed at t = {}", points.last().map_or(t0, |(t, _)| *t));
                let result = SimulationResult {
                    trajectory: Trajectory::new(self.reduced.states.clone(), points),
                    outputs,
                    output_names: self.outputs.names.clone(),
                    stats,
                };
                Ok(&*self.result.insert(result))
            }
            Err(failure) => {
                self.state = SimulatorState::Failed;
                error!(
                    "integration failed at t = {}: {} ({} grid points reached)",
                    failure.last_time,
                    failure.reason,
                    failure.reached.len()
                );
                Err(DaeError::Integration {
                    last_time: failure.last_time,
                    reason: failure.reason,
                    partial: Box::new(Trajectory::new(self.reduced.states.clone(), failure.reached)),
                })
            }
        }
    }

    pub fn result(&self) -> Option<&SimulationResult> {
        self.result.as_ref()
    }

    pub fn trajectory(&self) -> Option<&Trajectory> {
        self.result.as_ref().map(|r| &r.trajectory)
    }

    pub fn outputs(&self) -> Option<&DMatrix<f64>> {
        self.result.as_ref().map(|r| &r.outputs)
    }
}
