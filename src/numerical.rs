//! Numerical integration of the reduced ODE.
/// Explicit Runge-Kutta integrators behind the [`NonStiff_api::Integrator`] trait
///
/// # Example
/// ```rust, ignore
/// use dae_reduce::numerical::NonStiff_api::{DormandPrince45, Integrator, IntegratorOptions};
/// use nalgebra::DVector;
/// let rhs = |_t: f64, x: &DVector<f64>| -x;
/// let mut solver = DormandPrince45::new();
/// let grid = vec![0.0, 0.5, 1.0];
/// let points = solver
///     .integrate(&rhs, 0.0, &DVector::from_vec(vec![1.0]), &grid, &IntegratorOptions::default())
///     .unwrap();
/// println!("x(1) = {}", points[2].1[0]);
/// solver.stats().log_table(solver.name());
/// ```
pub mod NonStiff_api;
