//! Whole reduce-and-simulate workflow, plus its settings document.
//!
//! # Example
//! ```rust, ignore
//! use dae_reduce::dae::{model::Model, pipeline::{simulate, SimulationConfig}, dependents::OutputRequest};
//! let model = Model::parse("state x start 1\nalgebraic z\nequation z = 2*x\nequation der(x) = -z")?;
//! let grid = vec![0.0, 0.5, 1.0];
//! let result = simulate(&model, &[OutputRequest::named("z")], grid, &HashMap::new(), Default::default())?;
//! println!("{:?}", result.output_column("z"));
//! ```

use crate::Utils::task_parser::TaskDocument;
use crate::dae::algebraic_elimination::{ReducedOde, eliminate};
use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::dependents::{OutputRequest, substitute_dependents};
use crate::dae::explicit_form::make_explicit;
use crate::dae::model::Model;
use crate::dae::simulator::{SimulationResult, Simulator};
use crate::numerical::NonStiff_api::{DormandPrince45, Integrator, IntegratorOptions, RungeKutta4};
use crate::symbolic::utils::linspace;
use log::{LevelFilter, info};
use rayon::prelude::*;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Explicit-form reduction followed by algebraic elimination.
pub fn reduce(model: &Model) -> DaeResult<ReducedOde> {
    let explicit = make_explicit(model)?;
    eliminate(model, &explicit)
}

/// Reduces independent models in parallel; results keep the input order.
pub fn reduce_many(models: &[Model]) -> Vec<DaeResult<ReducedOde>> {
    models.par_iter().map(reduce).collect()
}

/// Start values of the model overridden by `parameters`.
pub fn merged_parameters(model: &Model, parameters: &HashMap<String, f64>) -> HashMap<String, f64> {
    let mut merged = model.declared_parameter_values();
    merged.extend(parameters.iter().map(|(k, v)| (k.clone(), *v)));
    merged
}

/// Builds a simulator and runs it once from the model's start values.
///
/// `parameters` overrides the declared start values of parameters and inputs.
pub fn simulate(
    model: &Model,
    outputs: &[OutputRequest],
    grid: Vec<f64>,
    parameters: &HashMap<String, f64>,
    options: IntegratorOptions,
) -> DaeResult<SimulationResult> {
    run_with(model, outputs, grid, parameters, options, Box::new(DormandPrince45::new()))
}

fn run_with(
    model: &Model,
    outputs: &[OutputRequest],
    grid: Vec<f64>,
    parameters: &HashMap<String, f64>,
    options: IntegratorOptions,
    integrator: Box<dyn Integrator>,
) -> DaeResult<SimulationResult> {
    let reduced = reduce(model)?;
    let output_function = substitute_dependents(model, &reduced, outputs)?;
    let mut simulator = Simulator::new(reduced, output_function, grid)?.with_integrator(integrator);
    simulator.set_options(options)?;
    let x0 = model.initial_state();
    simulator.initialize(x0.as_slice(), &merged_parameters(model, parameters))?;
    simulator.run().cloned()
}

/// Simulation using every setting of a [`SimulationConfig`].
pub fn simulate_with_config(
    model: &Model,
    config: &SimulationConfig,
    parameters: &HashMap<String, f64>,
) -> DaeResult<SimulationResult> {
    let outputs: Vec<OutputRequest> = config.outputs.iter().map(|n| OutputRequest::named(n)).collect();
    run_with(
        model,
        &outputs,
        config.grid(),
        parameters,
        config.options.clone(),
        config.integrator(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverMethod {
    DormandPrince45,
    /// fixed-step RK4 with the given largest substep
    RungeKutta4 { step: f64 },
}

/// Settings read from a task document:
/// ```text
/// grid     start: 0  end: 10  points: 101
/// solver   method: dopri45 | rk4  rtol  atol  first_step  min_step  max_step  max_steps  deadline_ms  step
/// outputs  names: a, b, der(x)
/// logging  level: info  file: run.log
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub t_start: f64,
    pub t_end: f64,
    pub points: usize,
    pub method: SolverMethod,
    pub options: IntegratorOptions,
    pub outputs: Vec<String>,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0,
            points: 11,
            method: SolverMethod::DormandPrince45,
            options: IntegratorOptions::default(),
            outputs: Vec::new(),
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_document(text: &str) -> DaeResult<Self> {
        let doc = TaskDocument::parse(text).map_err(DaeError::InvalidConfiguration)?;
        Self::from_task_document(&doc).map_err(DaeError::InvalidConfiguration)
    }

    fn from_task_document(doc: &TaskDocument) -> Result<Self, String> {
        let mut config = SimulationConfig::default();
        for title in doc.sections.keys() {
            if !["grid", "solver", "outputs", "logging"].contains(&title.as_str()) {
                return Err(format!("unknown section {}", title));
            }
        }

        if let Some(v) = doc.get_float("grid", "start")? {
            config.t_start = v;
        }
        if let Some(v) = doc.get_float("grid", "end")? {
            config.t_end = v;
        }
        if let Some(v) = doc.get_usize("grid", "points")? {
            config.points = v;
        }
        if !(config.t_end > config.t_start) || config.points < 2 {
            return Err(format!(
                "grid needs end > start and at least 2 points, got [{}, {}] with {}",
                config.t_start, config.t_end, config.points
            ));
        }

        let options = &mut config.options;
        if let Some(v) = doc.get_float("solver", "rtol")? {
            options.rtol = v;
        }
        if let Some(v) = doc.get_float("solver", "atol")? {
            options.atol = v;
        }
        options.first_step = doc.get_float("solver", "first_step")?;
        if let Some(v) = doc.get_float("solver", "min_step")? {
            options.min_step = v;
        }
        if let Some(v) = doc.get_float("solver", "max_step")? {
            options.max_step = v;
        }
        if let Some(v) = doc.get_usize("solver", "max_steps")? {
            options.max_steps = v;
        }
        if let Some(ms) = doc.get_usize("solver", "deadline_ms")? {
            options.deadline = Some(Duration::from_millis(ms as u64));
        }
        options.validate()?;

        config.method = match doc.get_string("solver", "method")?.as_deref() {
            None | Some("dopri45") => SolverMethod::DormandPrince45,
            Some("rk4") => {
                let step = doc.get_float("solver", "step")?.unwrap_or(1e-3);
                if !(step > 0.0) {
                    return Err(format!("rk4 step must be positive, got {}", step));
                }
                SolverMethod::RungeKutta4 { step }
            }
            Some(other) => return Err(format!("unknown solver method {}", other)),
        };

        config.outputs = doc.get_strings("outputs", "names").unwrap_or_default();
        if let Some(level) = doc.get_string("logging", "level")? {
            config.log_level =
                LevelFilter::from_str(&level).map_err(|_| format!("unknown log level {}", level))?;
        }
        config.log_file = doc.get_string("logging", "file")?;
        info!("simulation config: {:?}", config);
        Ok(config)
    }

    pub fn grid(&self) -> Vec<f64> {
        linspace(self.t_start, self.t_end, self.points)
    }

    pub fn integrator(&self) -> Box<dyn Integrator> {
        match self.method {
            SolverMethod::DormandPrince45 => Box::new(DormandPrince45::new()),
            SolverMethod::RungeKutta4 { step } => Box::new(RungeKutta4::new(step)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config = SimulationConfig::from_document("").unwrap();
        assert_eq!(config, SimulationConfig::default());

        let text = "
            grid
              start: 0
              end: 2
              points: 5
            solver
              method: rk4
              step: 0.001
              rtol: 1e-8
              max_steps: 5000
              deadline_ms: 250
            outputs
              names: z, der(x)
            logging
              level: debug
        ";
        let config = SimulationConfig::from_document(text).unwrap();
        assert_eq!(config.grid(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(config.method, SolverMethod::RungeKutta4 { step: 0.001 });
        assert_eq!(config.options.rtol, 1e-8);
        assert_eq!(config.options.max_steps, 5000);
        assert_eq!(config.options.deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.outputs, vec!["z", "der(x)"]);
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.integrator().name(), "RungeKutta4");
    }

    #[test]
    fn test_bad_configs() {
        for text in [
            "grid\n end: -1",
            "grid\n points: 1",
            "solver\n method: euler",
            "solver\n rtol: fast",
            "solver\n rtol: -1",
            "plot\n color: red",
            "logging\n level: loud",
            "grid start",
        ] {
            assert!(
                matches!(SimulationConfig::from_document(text), Err(DaeError::InvalidConfiguration(_))),
                "{} should be rejected",
                text
            );
        }
    }

    #[test]
    fn test_simulate_with_config() {
        let model = Model::parse(
            "state x start 1\nparameter k start 1\nalgebraic z\nequation z = 2*k*x\nequation der(x) = -z",
        )
        .unwrap();
        let config = SimulationConfig::from_document("grid\n end: 1\n points: 3\noutputs\n names: z").unwrap();
        let result = simulate_with_config(&model, &config, &HashMap::new()).unwrap();
        assert_eq!(result.trajectory.times(), vec![0.0, 0.5, 1.0]);
        assert_relative_eq!(result.trajectory.points[2].1[0], (-2.0f64).exp(), epsilon = 1e-6);
        let z = result.output_column("z").unwrap();
        assert_relative_eq!(z[2], 2.0 * (-2.0f64).exp(), epsilon = 1e-6);

        // caller values win over declared start values
        let faster = HashMap::from([("k".to_string(), 2.0)]);
        let result = simulate_with_config(&model, &config, &faster).unwrap();
        assert_relative_eq!(result.trajectory.points[2].1[0], (-4.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_reduce_many_keeps_order() {
        let models = vec![
            Model::parse("state x\nequation der(x) = -x").unwrap(),
            Model::parse("state x\nalgebraic z\nequation z = sin(z)\nequation der(x) = z").unwrap(),
            Model::parse("state y\nalgebraic w\nequation w = 3*y\nequation der(y) = w").unwrap(),
        ];
        let reduced = reduce_many(&models);
        assert_eq!(reduced.len(), 3);
        assert!(reduced[0].is_ok());
        assert!(matches!(reduced[1], Err(DaeError::UnsolvableAlgebraicSystem { .. })));
        let third = reduced[2].as_ref().unwrap();
        assert_eq!(third.states, vec!["y"]);
        assert_relative_eq!(third.rhs[0].eval_expression(&["y"], &[1.0]).unwrap(), 3.0);
    }
}
