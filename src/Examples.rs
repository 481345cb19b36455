//! examples of usage of dae_reduce
/// control volume models: mass and energy conservation, heat and work, flow system without states
pub mod thermodynamics_examples;
