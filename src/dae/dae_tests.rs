/////////////////////////////TESTS////////////////////////////////////////////////////
/*
cross-stage tests of the reduce-and-simulate pipeline:
explicit form round trip on random samples
elimination soundness for triangular systems
cycle detection
grid fidelity and output ordering
linear decay, algebraic elimination and dimension mismatch scenarios
thermodynamic control volume with dependent parameters
*/

#[cfg(test)]
mod tests {
    use crate::dae::algebraic_elimination::{EliminationStrategy, eliminate, solve_algebraic};
    use crate::dae::dae_error::DaeError;
    use crate::dae::dependents::{OutputRequest, substitute_dependents};
    use crate::dae::explicit_form::make_explicit;
    use crate::dae::model::Model;
    use crate::dae::pipeline::{reduce, simulate};
    use crate::dae::simulator::{Simulator, SimulatorState};
    use crate::numerical::NonStiff_api::IntegratorOptions;
    use crate::symbolic::symbolic_engine::Expr;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::collections::HashMap;

    /// seeded random samples in [-2, 2)
    fn samples(n: usize, dim: usize) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(2025);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.random_range(-2.0..2.0)).collect())
            .collect()
    }

    #[test]
    fn explicit_form_round_trip() {
        let model = Model::parse(
            "
            time t
            state x
            state y
            state w
            parameter a
            algebraic z
            equation der(x) - (a*y - sin(x)*t)
            equation der(y) = x*w + exp(-z)
            equation der(w) = -w^2 + cos(a)
            equation z = x + y
            ",
        )
        .unwrap();
        let explicit = make_explicit(&model).unwrap();
        let map = explicit.derivative_map();
        let vars = ["t", "x", "y", "w", "a", "z"];
        for sample in samples(20, vars.len()) {
            for eq in model.differential_equations() {
                let r = eq
                    .residual
                    .substitute_variables(&map)
                    .eval_expression(&vars, &sample)
                    .unwrap();
                assert_relative_eq!(r, 0.0, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn elimination_soundness_for_triangular_systems() {
        let model = Model::parse(
            "
            state x
            state y
            parameter p
            algebraic z1
            algebraic z2
            algebraic z3
            algebraic z4
            equation z4 = z3 * z1 + p
            equation z2 = exp(z1) - y
            equation z3 = z2^2 + z1
            equation z1 = sin(x) * p
            equation der(x) = z4
            equation der(y) = -z2
            ",
        )
        .unwrap();
        let elimination = solve_algebraic(&model).unwrap();
        assert_eq!(elimination.strategy, EliminationStrategy::TopologicalSubstitution);
        let vars = ["x", "y", "p"];
        for sample in samples(20, vars.len()) {
            for eq in model.algebraic_equations() {
                let r = eq
                    .residual
                    .substitute_variables(&elimination.solutions)
                    .eval_expression(&vars, &sample)
                    .unwrap();
                assert_relative_eq!(r, 0.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn cycle_detection() {
        for text in [
            "state x\nalgebraic z1\nalgebraic z2\nequation z1 = z2^3 + x\nequation z2 = exp(z1)\nequation der(x) = z1",
            "state x\nalgebraic z1\nalgebraic z2\nequation z1 = z2\nequation z2 = z1\nequation der(x) = z1",
            "state x\nalgebraic z1\nalgebraic z2\nequation z1 = x*z2\nequation z2 = z1/x\nequation der(x) = z1",
            "state x\nalgebraic z1\nalgebraic z2\nequation z1 = 49*z2 + x\nequation z2 = z1/49\nequation der(x) = z1",
        ] {
            let model = Model::parse(text).unwrap();
            let explicit = make_explicit(&model).unwrap();
            match eliminate(&model, &explicit) {
                Err(DaeError::AlgebraicCycle { cycle }) => assert_eq!(cycle.len(), 2),
                other => panic!("expected a cycle, got {:?}", other),
            }
        }
    }

    #[test]
    fn long_nonlinear_chain_is_resolved_in_order() {
        // z0 = x, z1 = z0^2 + 1, z_i = z_{i-1} + 1, declared in reverse order
        let n = 300;
        let mut text = String::from("state x\n");
        for i in 0..n {
            text.push_str(&format!("algebraic z{}\n", i));
        }
        for i in (2..n).rev() {
            text.push_str(&format!("equation z{} = z{} + 1\n", i, i - 1));
        }
        text.push_str("equation z1 = z0^2 + 1\n");
        text.push_str("equation z0 = x\n");
        text.push_str(&format!("equation der(x) = z{} - x\n", n - 1));
        let model = Model::parse(&text).unwrap();
        let reduced = reduce(&model).unwrap();
        assert_eq!(
            reduced.elimination.strategy,
            EliminationStrategy::TopologicalSubstitution
        );
        assert_eq!(reduced.elimination.order[0], "z0");
        let value = reduced.rhs[0].eval_expression(&["x"], &[0.5]).unwrap();
        // 0.25 + 299 - 0.5
        assert_relative_eq!(value, 298.75, epsilon = 1e-9);
    }

    #[test]
    fn grid_fidelity() {
        let model = Model::parse("state x start 1\nequation der(x) = -x").unwrap();
        let n = 7;
        let grid: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        let result = simulate(&model, &[], grid.clone(), &HashMap::new(), IntegratorOptions::default()).unwrap();
        assert_eq!(result.trajectory.len(), n + 1);
        assert_eq!(result.trajectory.times(), grid);
        assert_eq!(result.outputs.shape(), (n + 1, 0));
    }

    #[test]
    fn output_ordering() {
        let model = Model::parse(
            "state x start 1\nparameter k start 0.5\nalgebraic z\ndependent e = x^2/2\nequation z = k*x\nequation der(x) = -z",
        )
        .unwrap();
        let grid = vec![0.0, 0.5, 1.0, 1.5];
        let ab = simulate(
            &model,
            &[OutputRequest::named("z"), OutputRequest::named("e")],
            grid.clone(),
            &HashMap::new(),
            IntegratorOptions::default(),
        )
        .unwrap();
        let ba = simulate(
            &model,
            &[OutputRequest::named("e"), OutputRequest::named("z")],
            grid,
            &HashMap::new(),
            IntegratorOptions::default(),
        )
        .unwrap();
        assert_eq!(ab.output_names, vec!["z", "e"]);
        assert_eq!(ba.output_names, vec!["e", "z"]);
        assert_eq!(ab.outputs.column(0), ba.outputs.column(1));
        assert_eq!(ab.outputs.column(1), ba.outputs.column(0));
        assert_eq!(ab.output_column("z"), ba.output_column("z"));
    }

    #[test]
    fn scenario_linear_decay() {
        let model = Model::parse("state x start 1\nequation der(x) = -x").unwrap();
        let result = simulate(&model, &[], vec![0.0, 1.0], &HashMap::new(), IntegratorOptions::default()).unwrap();
        assert_eq!(result.trajectory.len(), 2);
        assert_relative_eq!(result.trajectory.points[1].1[0], (-1.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn scenario_algebraic_elimination() {
        let model =
            Model::parse("state x start 1\nalgebraic z\nequation z = 2*x\nequation der(x) = -z").unwrap();
        let reduced = reduce(&model).unwrap();
        assert!(!reduced.rhs[0].contains_variable("z"));
        let expected = Expr::parse_expression("-2*x").unwrap();
        for x in [-1.0, 0.3, 2.0] {
            assert_relative_eq!(
                reduced.rhs[0].eval_expression(&["x"], &[x]).unwrap(),
                expected.eval_expression(&["x"], &[x]).unwrap(),
                epsilon = 1e-12
            );
        }
        let result = simulate(
            &model,
            &[OutputRequest::named("z")],
            vec![0.0, 1.0],
            &HashMap::new(),
            IntegratorOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(result.trajectory.points[1].1[0], (-2.0f64).exp(), epsilon = 1e-6);
        assert_relative_eq!(result.outputs[(1, 0)], 2.0 * (-2.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn scenario_dimension_mismatch() {
        let model = Model::parse(
            "state a\nstate b\nstate c\nequation der(a) = b\nequation der(b) = c\nequation der(c) = -a",
        )
        .unwrap();
        let reduced = reduce(&model).unwrap();
        let outputs = substitute_dependents(&model, &reduced, &[]).unwrap();
        let mut sim = Simulator::new(reduced, outputs, vec![0.0, 1.0]).unwrap();
        match sim.initialize(&[1.0, 2.0], &HashMap::new()) {
            Err(DaeError::DimensionMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sim.state(), SimulatorState::Created);
    }

    #[test]
    fn control_volume_with_dependent_parameters() {
        // ideal gas in a rigid tank filled at a constant mass rate
        let model = Model::parse(
            "
            model FilledTank
            state m start 1.0
            algebraic P
            parameter V start 0.5
            parameter T start 300
            parameter M start 0.029
            input m_in start 0.01
            dependent_parameter R = 8.314 / M
            dependent rho = m / V
            equation der(m) = m_in
            equation P*V = m*R*T
            ",
        )
        .unwrap();
        let result = simulate(
            &model,
            &[OutputRequest::named("P"), OutputRequest::named("rho")],
            vec![0.0, 10.0, 20.0],
            &HashMap::new(),
            IntegratorOptions::default(),
        )
        .unwrap();
        let m_end = 1.0 + 0.01 * 20.0;
        assert_relative_eq!(result.trajectory.points[2].1[0], m_end, epsilon = 1e-9);
        let p = result.output_column("P").unwrap();
        assert_relative_eq!(p[2], m_end * 8.314 / 0.029 * 300.0 / 0.5, max_relative = 1e-9);
        let rho = result.output_column("rho").unwrap();
        assert_relative_eq!(rho[0], 2.0, epsilon = 1e-12);
    }
}
