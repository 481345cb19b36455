// Copyright (c)  by Gleb E. Zaslavkiy
//MIT License
#![allow(non_snake_case)]
use crate::Utils::logger::{init_logger, save_result_to_csv, save_result_to_file};
use crate::dae::algebraic_elimination::solve_algebraic;
use crate::dae::dependents::OutputRequest;
use crate::dae::model::Model;
use crate::dae::pipeline::{SimulationConfig, reduce, simulate, simulate_with_config};
use crate::numerical::NonStiff_api::IntegratorOptions;
use crate::symbolic::utils::linspace;
use log::{LevelFilter, error};
use std::collections::HashMap;

/// gas in a rigid control volume, constant inflow and pressure driven outflow
pub const BASIC_VOLUME_MASS_CONSERVATION: &str = "
model BasicVolumeMassConservation
state m start 0.00119
algebraic P
algebraic mflow_out
parameter V start 1e-3
parameter R start 287
parameter T start 293
parameter k_out start 1e-9
input mflow_in start 1e-4
equation P*V = m*R*T
equation mflow_out = k_out*P
equation der(m) = mflow_in - mflow_out
";

/// internal energy balance of a filled volume, temperature from U = m*c_v*T
pub const BASIC_VOLUME_ENERGY_CONSERVATION: &str = "
model BasicVolumeEnergyConservation
state m start 0.00119
state U start 250
algebraic T
algebraic P
parameter V start 1e-3
parameter R start 287
parameter c_v start 717
parameter T_in start 300
input mflow_in start 1e-4
dependent_parameter h_in = (c_v + R)*T_in
equation U = m*c_v*T
equation P*V = m*R*T
equation der(m) = mflow_in
equation der(U) = h_in*mflow_in
";

/// volume with heat input and expansion work; der(U) and der(V) are coupled
pub const BASIC_VOLUME_TEST: &str = "
model BasicVolumeTest
state m start 0.00119
state U start 250
state V start 1e-3
algebraic T
algebraic P
parameter R start 287
parameter c_v start 717
parameter T_in start 300
parameter Qdot start 10
input mflow_in start 1e-4
input vdot start 1e-4
dependent_parameter h_in = (c_v + R)*T_in
dependent H = U + P*V
equation U = m*c_v*T
equation P*V = m*R*T
equation der(m) = mflow_in
equation der(V) = vdot
equation der(U) + P*der(V) = h_in*mflow_in + Qdot
";

/// two valves in series, no differential states
pub const CTRL_FLOW_SYSTEM: &str = "
model CtrlFlowSystem
algebraic mdot
algebraic P_mid
parameter P_in start 2e5
parameter P_out start 1e5
parameter K1 start 1e-3
parameter K2 start 2e-3
equation mdot = K1*(P_in - P_mid)
equation mdot = K2*(P_mid - P_out)
";

pub fn thermodynamics_examples(example: usize) {
    let _ = init_logger(LevelFilter::Info, None);
    match example {
        0 => {
            // conservation of mass in a control volume
            let model = Model::parse(BASIC_VOLUME_MASS_CONSERVATION).unwrap();
            let reduced = reduce(&model).unwrap();
            for (der, rhs) in reduced.derivatives.iter().zip(reduced.rhs.iter()) {
                println!("{} = {}", der, rhs);
            }
            let grid = linspace(0.0, 1.0, 100);
            let outputs = vec![OutputRequest::named("m"), OutputRequest::named("P")];
            let result = simulate(
                &model,
                &outputs,
                grid,
                &HashMap::new(),
                IntegratorOptions::default(),
            )
            .unwrap();
            println!("m(t) = {:?}", result.output_column("m").unwrap());
            println!("P(t) = {:?}", result.output_column("P").unwrap());
        }
        1 => {
            // conservation of energy in a control volume
            let model = Model::parse(BASIC_VOLUME_ENERGY_CONSERVATION).unwrap();
            let config = SimulationConfig::from_document(
                "
                grid
                  start: 0
                  end: 10
                  points: 100
                solver
                  method: dopri45
                  rtol: 1e-8
                  atol: 1e-12
                outputs
                  names: T, P
                ",
            )
            .unwrap();
            let result = simulate_with_config(&model, &config, &HashMap::new()).unwrap();
            println!("T(t) = {:?}", result.output_column("T").unwrap());
            // the same model with a hotter inflow
            let hotter = HashMap::from([("T_in".to_string(), 400.0)]);
            let result = simulate_with_config(&model, &config, &hotter).unwrap();
            println!("T(t), T_in = 400 K: {:?}", result.output_column("T").unwrap());
        }
        2 => {
            // heat transfer and work
            let model = Model::parse(BASIC_VOLUME_TEST).unwrap();
            let reduced = reduce(&model).unwrap();
            println!("algebraic variables eliminated by {}", reduced.elimination.strategy);
            for (der, rhs) in reduced.derivatives.iter().zip(reduced.rhs.iter()) {
                println!("{} = {}", der, rhs);
            }
            let outputs = vec![
                OutputRequest::named("T"),
                OutputRequest::named("U"),
                OutputRequest::named("V"),
                OutputRequest::named("H"),
            ];
            let result = simulate(
                &model,
                &outputs,
                linspace(0.0, 2.0, 100),
                &HashMap::new(),
                IntegratorOptions::default(),
            )
            .unwrap();
            println!("T(t) = {:?}", result.output_column("T").unwrap());
            println!("V(t) = {:?}", result.output_column("V").unwrap());
            if let Err(e) = save_result_to_file(&result, "BasicVolumeTest.txt") {
                error!("{}", e);
            }
            if let Err(e) = save_result_to_csv(&result, "BasicVolumeTest.csv") {
                error!("{}", e);
            }
        }
        3 => {
            // no differential states: only the algebraic system is solved
            let model = Model::parse(CTRL_FLOW_SYSTEM).unwrap();
            let elimination = solve_algebraic(&model).unwrap();
            let values = model.declared_parameter_values();
            let names: Vec<&str> = values.keys().map(|s| s.as_str()).collect();
            let numbers: Vec<f64> = names.iter().map(|n| values[*n]).collect();
            for name in &elimination.order {
                let solution = &elimination.solutions[name];
                println!(
                    "{} = {} = {}",
                    name,
                    solution,
                    solution.eval_expression(&names, &numbers).unwrap()
                );
            }
        }
        _ => {
            println!("example {} does not exist", example);
        }
    }
}
