//! Elimination of algebraic variables.
//!
//! The algebraic residuals `G(t, x, z, p) = 0` are solved for `z` symbolically and
//! the solutions are substituted into the explicit right-hand sides, leaving a pure
//! ODE in the states. Two strategies are tried in this order:
//!
//! 1. direct solve: `G` affine in `z` with full structural rank, `J_z * z = -G(z = 0)`
//!    solved in closed form;
//! 2. topological substitution: every equation is matched with one variable it can
//!    be solved for (`G_k` affine in `z_i` with a coefficient free of `z_i`), the
//!    resulting definitions are ordered over a [`DependencyGraph`] and resolved in
//!    that order.
//!
//! A dependency cycle in 2. is an [`DaeError::AlgebraicCycle`]; no matching is an
//! [`DaeError::UnsolvableAlgebraicSystem`].

use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::dependency_graph::{Cycle, DependencyGraph};
use crate::dae::explicit_form::ExplicitOde;
use crate::dae::model::Model;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_functions::{Jacobian, solve_linear_system};
use crate::symbolic::symbolic_lambdify::Lambda;
use crate::symbolic::utils::max_bipartite_matching;
use log::{debug, info};
use nalgebra::DVector;
use std::collections::{BTreeSet, HashMap};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EliminationStrategy {
    #[strum(serialize = "no algebraic variables")]
    NoAlgebraic,
    #[strum(serialize = "direct solve")]
    DirectSolve,
    #[strum(serialize = "topological substitution")]
    TopologicalSubstitution,
}

/// Closed-form solution of every algebraic variable in terms of time, states and parameters.
#[derive(Debug, Clone)]
pub struct Elimination {
    /// resolution order, dependencies first
    pub order: Vec<String>,
    pub solutions: HashMap<String, Expr>,
    pub strategy: EliminationStrategy,
}

/// Candidate definition of `variable` taken from equation `equation`.
struct Candidate {
    variable: usize,
    solution: Expr,
    constant_coefficient: bool,
}

pub fn solve_algebraic(model: &Model) -> DaeResult<Elimination> {
    let algebraics = model.algebraics();
    let residuals: Vec<Expr> = model
        .algebraic_equations()
        .iter()
        .map(|e| e.residual.clone())
        .collect();
    if algebraics.is_empty() {
        return Ok(Elimination {
            order: Vec::new(),
            solutions: HashMap::new(),
            strategy: EliminationStrategy::NoAlgebraic,
        });
    }

    let elimination = match direct_solve(&residuals, algebraics) {
        Some(elimination) => elimination,
        None => topological_substitution(&residuals, algebraics)?,
    };

    for (name, solution) in &elimination.solutions {
        if let Some(remaining) = first_reference(solution, algebraics) {
            return Err(DaeError::UnsolvableAlgebraicSystem {
                variables: vec![name.clone()],
                reason: format!("solution still depends on {}", remaining),
            });
        }
    }
    info!(
        "{} algebraic variables eliminated by {}",
        algebraics.len(),
        elimination.strategy
    );
    for name in &elimination.order {
        debug!("{} = {}", name, elimination.solutions[name]);
    }
    Ok(elimination)
}

fn first_reference(expr: &Expr, names: &[String]) -> Option<String> {
    let mut referenced = BTreeSet::new();
    expr.collect_variables(&mut referenced);
    names.iter().find(|n| referenced.contains(*n)).cloned()
}

/// `None` when the system is not linear in `z`, structurally deficient or singular.
fn direct_solve(residuals: &[Expr], algebraics: &[String]) -> Option<Elimination> {
    let mut jacobian = Jacobian::from_vectors(residuals.to_vec(), algebraics.to_vec());
    jacobian.calc_jacobian();
    let (j, g0) = match jacobian.affine_split() {
        Ok(split) => split,
        Err((row, var)) => {
            debug!("algebraic equation {} is nonlinear in {}", row, var);
            return None;
        }
    };
    if jacobian.structural_rank() < algebraics.len() {
        debug!("algebraic subsystem is structurally singular");
        return None;
    }
    let minus_g0: Vec<Expr> = g0.into_iter().map(|g| -g).collect();
    match solve_linear_system(&j, &minus_g0) {
        Ok(solution) => Some(Elimination {
            order: algebraics.to_vec(),
            solutions: algebraics.iter().cloned().zip(solution).collect(),
            strategy: EliminationStrategy::DirectSolve,
        }),
        Err(msg) => {
            debug!("direct solve failed: {}", msg);
            None
        }
    }
}

fn candidates(residual: &Expr, algebraics: &[String]) -> Vec<Candidate> {
    let mut found: Vec<Candidate> = algebraics
        .iter()
        .enumerate()
        .filter_map(|(i, z)| {
            if !residual.contains_variable(z) {
                return None;
            }
            let coefficient = residual.diff(z).simplify();
            if coefficient.is_zero() || coefficient.contains_variable(z) {
                return None;
            }
            let rest = residual.substitute_variable(z, &Expr::Const(0.0)).simplify();
            Some(Candidate {
                variable: i,
                constant_coefficient: coefficient.as_const().is_some(),
                solution: (-rest / coefficient).simplify(),
            })
        })
        .collect();
    // constant coefficients first: they never vanish
    found.sort_by_key(|c| !c.constant_coefficient);
    found
}

fn topological_substitution(residuals: &[Expr], algebraics: &[String]) -> DaeResult<Elimination> {
    let n = algebraics.len();
    let per_equation: Vec<Vec<Candidate>> = residuals.iter().map(|g| candidates(g, algebraics)).collect();
    let adjacency: Vec<Vec<usize>> = per_equation
        .iter()
        .map(|cs| cs.iter().map(|c| c.variable).collect())
        .collect();
    let matching = max_bipartite_matching(&adjacency, n);

    let mut definitions: Vec<(String, Expr)> = Vec::with_capacity(n);
    for (k, matched) in matching.iter().enumerate() {
        let Some(col) = matched else { continue };
        if let Some(c) = per_equation[k].iter().find(|c| c.variable == *col) {
            definitions.push((algebraics[*col].clone(), c.solution.clone()));
        }
    }
    if definitions.len() < n {
        let defined: BTreeSet<&String> = definitions.iter().map(|(name, _)| name).collect();
        let variables = algebraics
            .iter()
            .filter(|z| !defined.contains(z))
            .cloned()
            .collect();
        return Err(DaeError::UnsolvableAlgebraicSystem {
            variables,
            reason: "nonlinear and not triangular: no equation can be solved for these variables"
                .to_string(),
        });
    }

    let graph = DependencyGraph::from_definitions(&definitions);
    let order = graph
        .topological_order()
        .map_err(|Cycle(cycle)| DaeError::AlgebraicCycle { cycle })?;

    let mut solutions: HashMap<String, Expr> = HashMap::with_capacity(n);
    let mut names = Vec::with_capacity(n);
    for i in order {
        let name = graph.name(i).to_string();
        let Some((_, definition)) = definitions.iter().find(|(z, _)| *z == name) else {
            continue;
        };
        let resolved = definition.substitute_variables(&solutions).simplify();
        solutions.insert(name.clone(), resolved);
        names.push(name);
    }
    Ok(Elimination {
        order: names,
        solutions,
        strategy: EliminationStrategy::TopologicalSubstitution,
    })
}

/// Pure ODE in the states: `der(states[i]) = rhs[i](time, states, parameters)`.
#[derive(Debug, Clone)]
pub struct ReducedOde {
    pub time: String,
    pub states: Vec<String>,
    /// parameter vector layout: independent parameters then inputs
    pub parameters: Vec<String>,
    pub derivatives: Vec<String>,
    pub rhs: Vec<Expr>,
    pub elimination: Elimination,
}

impl ReducedOde {
    /// Argument layout of compiled functions: `[time, states..., parameters...]`.
    pub fn argument_names(&self) -> Vec<String> {
        std::iter::once(self.time.clone())
            .chain(self.states.iter().cloned())
            .chain(self.parameters.iter().cloned())
            .collect()
    }

    pub fn derivative_map(&self) -> HashMap<String, Expr> {
        self.derivatives
            .iter()
            .cloned()
            .zip(self.rhs.iter().cloned())
            .collect()
    }

    /// Compiles the right-hand sides into a numeric derivative function.
    pub fn compile(&self) -> DaeResult<StateFunction> {
        let names = self.argument_names();
        let vars: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let lambdas = self
            .rhs
            .iter()
            .zip(&self.derivatives)
            .map(|(f, d)| {
                if let Some(variable) = f.all_arguments_are_variables().into_iter().find(|v| !names.contains(v)) {
                    return Err(DaeError::UnresolvedReference {
                        output: d.clone(),
                        variable,
                    });
                }
                f.compile(&vars).map_err(|e| DaeError::UnresolvedReference {
                    output: d.clone(),
                    variable: e,
                })
            })
            .collect::<DaeResult<Vec<Lambda>>>()?;
        Ok(StateFunction {
            lambdas,
            n_states: self.states.len(),
            n_params: self.parameters.len(),
        })
    }
}

/// Numeric `f(t, x, p)` of a reduced ODE.
#[derive(Debug, Clone)]
pub struct StateFunction {
    lambdas: Vec<Lambda>,
    n_states: usize,
    n_params: usize,
}

impl StateFunction {
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn eval(&self, t: f64, x: &DVector<f64>, p: &[f64]) -> DVector<f64> {
        let mut args = Vec::with_capacity(1 + x.len() + p.len());
        args.push(t);
        args.extend(x.iter());
        args.extend_from_slice(p);
        DVector::from_iterator(self.lambdas.len(), self.lambdas.iter().map(|l| l.eval(&args)))
    }
}

/// Substitutes the algebraic solutions into the explicit ODE.
pub fn eliminate(model: &Model, explicit: &ExplicitOde) -> DaeResult<ReducedOde> {
    let elimination = solve_algebraic(model)?;
    let algebraics = model.algebraics();
    let mut rhs = Vec::with_capacity(explicit.rhs.len());
    for (f, d) in explicit.rhs.iter().zip(&explicit.derivatives) {
        let reduced = f.substitute_variables(&elimination.solutions).simplify();
        if let Some(z) = first_reference(&reduced, algebraics) {
            return Err(DaeError::UnsolvableAlgebraicSystem {
                variables: vec![z],
                reason: format!("still referenced by {}", d),
            });
        }
        debug!("{} = {}", d, reduced);
        rhs.push(reduced);
    }
    Ok(ReducedOde {
        time: explicit.time.clone(),
        states: explicit.states.clone(),
        parameters: model.parameter_names(),
        derivatives: explicit.derivatives.clone(),
        rhs,
        elimination,
    })
}
