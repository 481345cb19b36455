//! Reduction of an implicit DAE model to an explicit ODE and its simulation on a time grid.
//!
//! Stages, each consuming the artifact of the previous one:
//! 1) [`model`]: variables by role and residual equations, loaded from a [`model_parser`] description
//! 2) [`explicit_form`]: `F(t, x, der(x), z, p) = 0` solved for the derivatives
//! 3) [`algebraic_elimination`]: algebraic variables solved and substituted out
//! 4) [`dependents`]: requested outputs rewritten in terms of time, states and parameters
//! 5) [`simulator`]: integration over the grid and output evaluation
//!
//! # Example
//! ```rust, ignore
//! use dae_reduce::dae::model::Model;
//! use dae_reduce::dae::pipeline::reduce;
//! let model = Model::parse("state x start 1\nalgebraic z\nequation z = 2*x\nequation der(x) = -z")?;
//! let reduced = reduce(&model)?;
//! println!("{} = {}", reduced.derivatives[0], reduced.rhs[0]); // der(x) = -2*x
//! ```

pub mod algebraic_elimination;
/// error enum of every stage
pub mod dae_error;
mod dae_tests;
/// arena graph with cycle detection, used for bindings and algebraic substitution order
pub mod dependency_graph;
pub mod dependents;
pub mod explicit_form;
pub mod model;
/// line oriented text form of a model
pub mod model_parser;
/// reduce, simulate and the simulation settings document
pub mod pipeline;
pub mod simulator;
