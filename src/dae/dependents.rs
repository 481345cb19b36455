//! Output expressions rewritten in terms of time, states and parameters.

use crate::dae::algebraic_elimination::ReducedOde;
use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::model::Model;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_lambdify::Lambda;
use log::{debug, info};
use nalgebra::DVector;
use std::collections::BTreeSet;

/// A requested derived signal.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRequest {
    /// any declared variable, by name
    Named(String),
    /// a free expression over declared variables, reported under `label`
    Expression { label: String, expr: Expr },
}

impl OutputRequest {
    pub fn named(name: &str) -> Self {
        OutputRequest::Named(name.to_string())
    }

    pub fn expression(label: &str, expr: Expr) -> Self {
        OutputRequest::Expression {
            label: label.to_string(),
            expr,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            OutputRequest::Named(name) => name,
            OutputRequest::Expression { label, .. } => label,
        }
    }
}

impl From<&str> for OutputRequest {
    fn from(name: &str) -> Self {
        OutputRequest::named(name)
    }
}

/// Evaluates the requested outputs, in request order, from `(t, x, p)`.
#[derive(Debug, Clone)]
pub struct OutputFunction {
    pub names: Vec<String>,
    pub expressions: Vec<Expr>,
    compiled: Vec<Lambda>,
}

impl OutputFunction {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of `(t, x, p)` arguments the outputs need at least.
    pub fn required_arguments(&self) -> usize {
        self.compiled
            .iter()
            .filter_map(Lambda::max_slot)
            .max()
            .map_or(0, |slot| slot + 1)
    }

    pub fn evaluate(&self, t: f64, x: &DVector<f64>, p: &[f64]) -> DVector<f64> {
        let mut args = Vec::with_capacity(1 + x.len() + p.len());
        args.push(t);
        args.extend(x.iter());
        args.extend_from_slice(p);
        DVector::from_iterator(self.compiled.len(), self.compiled.iter().map(|l| l.eval(&args)))
    }
}

fn unresolved(output: &str, variable: &str) -> DaeError {
    DaeError::UnresolvedReference {
        output: output.to_string(),
        variable: variable.to_string(),
    }
}

/// Rewrites every request with, in turn, the resolved bindings, the reduced
/// right-hand sides for derivative handles and the algebraic solutions.
pub fn substitute_dependents(
    model: &Model,
    reduced: &ReducedOde,
    requests: &[OutputRequest],
) -> DaeResult<OutputFunction> {
    let derivative_map = reduced.derivative_map();
    let arguments = reduced.argument_names();
    let vars: Vec<&str> = arguments.iter().map(|s| s.as_str()).collect();

    let mut names = Vec::with_capacity(requests.len());
    let mut expressions = Vec::with_capacity(requests.len());
    let mut compiled = Vec::with_capacity(requests.len());
    for request in requests {
        let label = request.label();
        let raw = match request {
            OutputRequest::Named(name) => model
                .get_variable(name)
                .map_err(|_| unresolved(label, name))?
                .handle(),
            OutputRequest::Expression { expr, .. } => expr.clone(),
        };
        let mut referenced = BTreeSet::new();
        raw.collect_variables(&mut referenced);
        if let Some(undeclared) = referenced.iter().find(|r| model.get_variable(r).is_err()) {
            return Err(unresolved(label, undeclared));
        }

        let expr = raw
            .substitute_variables(model.resolved_bindings())
            .substitute_variables(&derivative_map)
            .substitute_variables(&reduced.elimination.solutions)
            .simplify();
        if let Some(variable) = expr
            .all_arguments_are_variables()
            .into_iter()
            .find(|v| !arguments.contains(v))
        {
            return Err(unresolved(label, &variable));
        }
        debug!("output {} = {}", label, expr);
        let lambda = expr.compile(&vars).map_err(|e| unresolved(label, &e))?;
        names.push(label.to_string());
        expressions.push(expr);
        compiled.push(lambda);
    }
    info!("{} outputs prepared: {:?}", names.len(), names);
    Ok(OutputFunction {
        names,
        expressions,
        compiled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dae::pipeline::reduce;
    use approx::assert_relative_eq;

    const MODEL: &str = "
        time t
        state x start 1
        parameter k start 2
        algebraic z
        dependent w = z + x*t
        dependent_parameter k2 = k*k
        equation z = k*x
        equation der(x) = -z
    ";

    #[test]
    fn test_outputs_in_request_order() {
        let model = Model::parse(MODEL).unwrap();
        let ode = reduce(&model).unwrap();
        let requests = vec![
            OutputRequest::named("w"),
            OutputRequest::named("z"),
            OutputRequest::named("der(x)"),
            OutputRequest::from("k2"),
            OutputRequest::named("t"),
            OutputRequest::expression("twice_x", Expr::parse_expression("2*x").unwrap()),
        ];
        let outputs = substitute_dependents(&model, &ode, &requests).unwrap();
        assert_eq!(outputs.names, vec!["w", "z", "der(x)", "k2", "t", "twice_x"]);
        let values = outputs.evaluate(0.5, &DVector::from_vec(vec![3.0]), &[2.0]);
        assert_eq!(values.len(), 6);
        // t, x, k
        assert_eq!(outputs.required_arguments(), 3);
        assert_relative_eq!(values[0], 6.0 + 1.5, epsilon = 1e-12);
        assert_relative_eq!(values[1], 6.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], -6.0, epsilon = 1e-12);
        assert_relative_eq!(values[3], 4.0, epsilon = 1e-12);
        assert_relative_eq!(values[4], 0.5, epsilon = 1e-12);
        assert_relative_eq!(values[5], 6.0, epsilon = 1e-12);
        for e in &outputs.expressions {
            assert!(!e.contains_variable("z"));
        }
    }

    #[test]
    fn test_unresolved_references() {
        let model = Model::parse(MODEL).unwrap();
        let ode = reduce(&model).unwrap();
        match substitute_dependents(&model, &ode, &[OutputRequest::named("ghost")]) {
            Err(DaeError::UnresolvedReference { output, variable }) => {
                assert_eq!(output, "ghost");
                assert_eq!(variable, "ghost");
            }
            other => panic!("unexpected {:?}", other),
        }
        let expr = Expr::parse_expression("x + y").unwrap();
        match substitute_dependents(&model, &ode, &[OutputRequest::expression("sum", expr)]) {
            Err(DaeError::UnresolvedReference { output, variable }) => {
                assert_eq!(output, "sum");
                assert_eq!(variable, "y");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_no_outputs() {
        let model = Model::parse(MODEL).unwrap();
        let ode = reduce(&model).unwrap();
        let outputs = substitute_dependents(&model, &ode, &[]).unwrap();
        assert!(outputs.is_empty());
        assert_eq!(outputs.required_arguments(), 0);
        assert_eq!(outputs.evaluate(0.0, &DVector::from_vec(vec![1.0]), &[1.0]).len(), 0);
    }
}
