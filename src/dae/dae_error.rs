//! Error taxonomy of the reduce-and-simulate pipeline.
//!
//! Every stage reports failures synchronously through [`DaeError`]; structural
//! model errors are never downgraded or recovered from locally. Integration
//! failure is the one partial outcome: it carries the furthest time reached and
//! the trajectory up to that point.

use crate::dae::simulator::{SimulatorState, Trajectory};
use crate::numerical::NonStiff_api::IntegrationFailureReason;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DaeError {
    /// Undeclared reference, unknown role, duplicate name or non-square system
    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// A differential residual is nonlinear in a derivative variable
    #[error("differential equation {equation} is not affine in {derivative}")]
    NonAffineDerivative { equation: usize, derivative: String },

    #[error("jacobian with respect to the derivatives is singular: {0}")]
    SingularJacobian(String),

    #[error("algebraic variables form a dependency cycle: {}", .cycle.join(" -> "))]
    AlgebraicCycle { cycle: Vec<String> },

    #[error("algebraic system cannot be solved for {variables:?}: {reason}")]
    UnsolvableAlgebraicSystem { variables: Vec<String>, reason: String },

    #[error("output {output} references unresolved variable {variable}")]
    UnresolvedReference { output: String, variable: String },

    #[error("dimension mismatch: expected {expected} {what}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter {0} has no assigned value")]
    MissingParameter(String),

    /// Integrator gave up; `partial` holds every grid point reached before that
    #[error("integration failed at t = {last_time}: {reason}")]
    Integration {
        last_time: f64,
        reason: IntegrationFailureReason,
        partial: Box<Trajectory>,
    },

    #[error("invalid time grid: {0}")]
    InvalidGrid(String),

    #[error("{operation} is not allowed while the simulator is {state}")]
    InvalidState {
        operation: String,
        state: SimulatorState,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type DaeResult<T> = Result<T, DaeError>;

impl DaeError {
    /// Last successfully reached time of a failed integration.
    pub fn last_time(&self) -> Option<f64> {
        match self {
            DaeError::Integration { last_time, .. } => Some(*last_time),
            _ => None,
        }
    }

    /// Partial trajectory of a failed integration.
    pub fn partial_trajectory(&self) -> Option<&Trajectory> {
        match self {
            DaeError::Integration { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
