//! Explicit-form reduction: `F(t, x, der(x), z, p) = 0` to `der(x) = f(t, x, z, p)`.
//!
//! The differential residuals are affine in the derivative handles, so
//! `F = J * der(x) + F0` with `J` the jacobian with respect to the derivatives and
//! `F0 = F(der(x) = 0)`. When `J` is the identity the explicit form is `-F0`,
//! otherwise `J * der(x) = -F0` is solved symbolically.

use crate::dae::dae_error::{DaeError, DaeResult};
use crate::dae::model::Model;
use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::symbolic_functions::{Jacobian, solve_linear_system};
use log::{debug, info};
use std::collections::HashMap;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ReductionStrategy {
    /// jacobian is the identity, right-hand sides read off directly
    #[strum(serialize = "identity")]
    Identity,
    #[strum(serialize = "linear solve")]
    LinearSolve,
}

/// `der(states[i]) = rhs[i]`; right-hand sides may still contain algebraic variables.
#[derive(Debug, Clone)]
pub struct ExplicitOde {
    pub time: String,
    pub states: Vec<String>,
    pub derivatives: Vec<String>,
    pub rhs: Vec<Expr>,
    pub strategy: ReductionStrategy,
}

impl ExplicitOde {
    /// derivative handle -> right-hand side
    pub fn derivative_map(&self) -> HashMap<String, Expr> {
        self.derivatives
            .iter()
            .cloned()
            .zip(self.rhs.iter().cloned())
            .collect()
    }
}

pub fn make_explicit(model: &Model) -> DaeResult<ExplicitOde> {
    let equations = model.differential_equations();
    let derivatives = model.derivatives();
    let residuals: Vec<Expr> = equations.iter().map(|e| e.residual.clone()).collect();

    let mut jacobian = Jacobian::from_vectors(residuals, derivatives.clone());
    jacobian.calc_jacobian();
    debug!("jacobian wrt derivatives: {:?}", jacobian.readable_jacobian());

    let (j, f0) = jacobian.affine_split().map_err(|(row, derivative)| {
        DaeError::NonAffineDerivative {
            equation: equations[row].index,
            derivative,
        }
    })?;

    let rank = jacobian.structural_rank();
    if rank < derivatives.len() {
        return Err(DaeError::SingularJacobian(format!(
            "structural rank {} for {} derivatives",
            rank,
            derivatives.len()
        )));
    }

    let (rhs, strategy) = if jacobian.is_identity() {
        let rhs = f0.into_iter().map(|f| (-f).simplify()).collect();
        (rhs, ReductionStrategy::Identity)
    } else {
        let minus_f0: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        let rhs = solve_linear_system(&j, &minus_f0).map_err(DaeError::SingularJacobian)?;
        (rhs, ReductionStrategy::LinearSolve)
    };
    info!(
        "explicit form of {} derivatives by {}",
        derivatives.len(),
        strategy
    );
    for (d, f) in derivatives.iter().zip(&rhs) {
        debug!("{} = {}", d, f);
    }

    Ok(ExplicitOde {
        time: model.time().to_string(),
        states: model.states().to_vec(),
        derivatives,
        rhs,
        strategy,
    })
}
