//! Explicit Runge-Kutta integrators for the reduced ODE `x' = f(t, x)`.
//!
//! - [`DormandPrince45`]: adaptive embedded 5(4) pair with FSAL and 4th order dense
//!   output, so states are reported exactly at the requested grid times.
//! - [`RungeKutta4`]: classical fixed-step RK4, every grid interval is subdivided
//!   into equal substeps not longer than the requested step.
//!
//! Both implement [`Integrator`]; the simulator only talks to that trait.

use log::{debug, info, warn};
use nalgebra::DVector;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tabled::{builder::Builder, settings::Style};

/// Right-hand side of the reduced ODE.
pub type RhsFn<'a> = dyn Fn(f64, &DVector<f64>) -> DVector<f64> + 'a;

/// One reported point of a solution: `(t, x(t))`.
pub type SolutionPoint = (f64, DVector<f64>);

/// Tolerances and limits of an integration run.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratorOptions {
    pub rtol: f64,
    pub atol: f64,
    /// initial step; chosen automatically when `None`
    pub first_step: Option<f64>,
    pub min_step: f64,
    pub max_step: f64,
    pub max_steps: usize,
    /// wall-clock budget; the run is cancelled once exceeded
    pub deadline: Option<Duration>,
}

impl Default for IntegratorOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            first_step: None,
            min_step: 1e-14,
            max_step: f64::INFINITY,
            max_steps: 100_000,
            deadline: None,
        }
    }
}

impl IntegratorOptions {
    pub fn validate(&self) -> Result<(), String> {
        // a zero atol turns the error scale of a vanishing component into 0
        if !(self.rtol > 0.0) || !(self.atol > 0.0) {
            return Err(format!("tolerances must be positive: rtol {}, atol {}", self.rtol, self.atol));
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0) || !h.is_finite() {
                return Err(format!("first step must be positive and finite, got {}", h));
            }
        }
        if !(self.min_step >= 0.0) || !(self.max_step > self.min_step) {
            return Err(format!(
                "step bounds must satisfy 0 <= min_step < max_step, got {} and {}",
                self.min_step, self.max_step
            ));
        }
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IntegrationFailureReason {
    #[strum(serialize = "step size underflow")]
    StepSizeUnderflow,
    #[strum(serialize = "maximum number of steps exceeded")]
    MaxStepsExceeded,
    #[strum(serialize = "state became non-finite")]
    NonFiniteState,
    #[strum(serialize = "cancelled by deadline")]
    Cancelled,
}

/// Why and where an integration stopped, with everything reported before that.
#[derive(Debug, Clone)]
pub struct IntegratorFailure {
    pub reason: IntegrationFailureReason,
    pub last_time: f64,
    pub reached: Vec<SolutionPoint>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratorStats {
    pub n_steps: usize,
    pub n_accepted: usize,
    pub n_rejected: usize,
    pub n_rhs_evals: usize,
    pub wall_time: Duration,
}

impl IntegratorStats {
    /// Pretty table of the counters, written to the log at info level.
    pub fn log_table(&self, solver_name: &str) {
        let mut stats: HashMap<String, usize> = HashMap::new();
        stats.insert("steps".to_string(), self.n_steps);
        stats.insert("accepted steps".to_string(), self.n_accepted);
        stats.insert("rejected steps".to_string(), self.n_rejected);
        stats.insert("rhs evaluations".to_string(), self.n_rhs_evals);
        stats.insert("wall time, ms".to_string(), self.wall_time.as_millis() as usize);
        let mut table = Builder::from(stats).build();
        table.with(Style::modern_rounded());
        info!("\n \n {} STATISTICS \n \n {}", solver_name, table.to_string());
    }
}

/// Numerical ODE integration collaborator.
///
/// `integrate` must return one point per grid time, in grid order, with the time
/// component equal to the grid value. Grid times not after `t0` are reported
/// with the initial state.
pub trait Integrator: Send {
    fn name(&self) -> &'static str;
    fn integrate(
        &mut self,
        rhs: &RhsFn,
        t0: f64,
        x0: &DVector<f64>,
        grid: &[f64],
        options: &IntegratorOptions,
    ) -> Result<Vec<SolutionPoint>, IntegratorFailure>;
    fn stats(&self) -> IntegratorStats;
}

fn is_finite_vector(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// root mean square of `v / scale`
fn rms_norm(v: &DVector<f64>, scale: &DVector<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().zip(scale.iter()).map(|(a, s)| (a / s).powi(2)).sum();
    (sum / v.len() as f64).sqrt()
}

/// Deadline and grid bookkeeping shared by both integrators.
struct RunGuard<'g> {
    started: Instant,
    deadline: Option<Duration>,
    max_steps: usize,
    grid: &'g [f64],
    next: usize,
    out: Vec<SolutionPoint>,
}

impl<'g> RunGuard<'g> {
    fn new(grid: &'g [f64], options: &IntegratorOptions) -> Self {
        Self {
            started: Instant::now(),
            deadline: options.deadline,
            max_steps: options.max_steps,
            grid,
            next: 0,
            out: Vec::with_capacity(grid.len()),
        }
    }

    fn done(&self) -> bool {
        self.next >= self.grid.len()
    }

    fn final_time(&self) -> Option<f64> {
        self.grid.last().copied()
    }

    fn check_budget(&self, n_steps: usize, t: f64) -> Result<(), IntegrationFailureReason> {
        if let Some(limit) = self.deadline {
            if self.started.elapsed() > limit {
                warn!("integration cancelled at t = {} after {:?}", t, self.started.elapsed());
                return Err(IntegrationFailureReason::Cancelled);
            }
        }
        if n_steps >= self.max_steps {
            return Err(IntegrationFailureReason::MaxStepsExceeded);
        }
        Ok(())
    }

    /// Reports every grid time up to and including `t` using `state_at`.
    fn report_until<F: FnMut(f64) -> DVector<f64>>(&mut self, t: f64, mut state_at: F) {
        while let Some(&g) = self.grid.get(self.next) {
            if g > t {
                break;
            }
            self.out.push((g, state_at(g)));
            self.next += 1;
        }
    }

    fn fail(self, reason: IntegrationFailureReason, last_time: f64) -> IntegratorFailure {
        IntegratorFailure { reason, last_time, reached: self.out }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////
//                     DORMAND-PRINCE 5(4)
///////////////////////////////////////////////////////////////////////////////////////////////////////////////
const C: [f64; 6] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0];
const A: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0],
];
const B: [f64; 6] = [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0];
// difference between 5th and embedded 4th order weights, last entry is the FSAL stage
const E: [f64; 7] = [
    -71.0 / 57600.0,
    0.0,
    71.0 / 16695.0,
    -71.0 / 1920.0,
    17253.0 / 339200.0,
    -22.0 / 525.0,
    1.0 / 40.0,
];
// dense output: b_i(theta) = sum_j P[i][j] * theta^(j+1)
const P: [[f64; 4]; 7] = [
    [1.0, -8048581381.0 / 2820520608.0, 8663915743.0 / 2820520608.0, -12715105075.0 / 11282082432.0],
    [0.0, 0.0, 0.0, 0.0],
    [0.0, 131558114200.0 / 32700410799.0, -68118460800.0 / 10900136933.0, 87487479700.0 / 32700410799.0],
    [0.0, -1754552775.0 / 470086768.0, 14199869525.0 / 1410260304.0, -10690763975.0 / 1880347072.0],
    [0.0, 127303824393.0 / 49829197408.0, -318862633887.0 / 49829197408.0, 701980252875.0 / 199316789632.0],
    [0.0, -282668133.0 / 205662961.0, 2019193451.0 / 616988883.0, -1453857185.0 / 822651844.0],
    [0.0, 40617522.0 / 29380423.0, -110615467.0 / 29380423.0, 69997945.0 / 29380423.0],
];
const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

pub struct DormandPrince45 {
    pub t: f64,
    pub y: DVector<f64>,
    stats: IntegratorStats,
}

impl Default for DormandPrince45 {
    fn default() -> Self {
        Self::new()
    }
}

impl DormandPrince45 {
    pub fn new() -> DormandPrince45 {
        DormandPrince45 {
            t: 0.0,
            y: DVector::zeros(0),
            stats: IntegratorStats::default(),
        }
    }

    fn eval(&mut self, rhs: &RhsFn, t: f64, y: &DVector<f64>) -> DVector<f64> {
        self.stats.n_rhs_evals += 1;
        rhs(t, y)
    }

    /// Hairer's starting step heuristic for a method of order 4.
    fn select_initial_step(
        &mut self,
        rhs: &RhsFn,
        f0: &DVector<f64>,
        interval: f64,
        options: &IntegratorOptions,
    ) -> f64 {
        let y0 = self.y.clone();
        let scale = y0.map(|v| options.atol + v.abs() * options.rtol);
        let d0 = rms_norm(&y0, &scale);
        let d1 = rms_norm(f0, &scale);
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
        let h0 = h0.min(interval);
        let y1 = &y0 + f0 * h0;
        let f1 = self.eval(rhs, self.t + h0, &y1);
        let d2 = rms_norm(&(f1 - f0), &scale) / h0;
        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / 5.0)
        };
        (100.0 * h0).min(h1).min(interval)
    }

    /// One trial step of size h from (self.t, self.y); returns stages, new state and error norm.
    fn _step_impl(
        &mut self,
        rhs: &RhsFn,
        f0: &DVector<f64>,
        h: f64,
        options: &IntegratorOptions,
    ) -> (Vec<DVector<f64>>, DVector<f64>, f64) {
        let t = self.t;
        let y = self.y.clone();
        let mut k: Vec<DVector<f64>> = Vec::with_capacity(7);
        k.push(f0.clone());
        for s in 1..6 {
            let mut y_stage = y.clone();
            for (j, kj) in k.iter().enumerate().take(s) {
                if A[s][j] != 0.0 {
                    y_stage += kj * (h * A[s][j]);
                }
            }
            let ks = self.eval(rhs, t + C[s] * h, &y_stage);
            k.push(ks);
        }
        let mut y_new = y.clone();
        for (i, ki) in k.iter().enumerate() {
            if B[i] != 0.0 {
                y_new += ki * (h * B[i]);
            }
        }
        let f_new = self.eval(rhs, t + h, &y_new);
        k.push(f_new);

        let mut err = DVector::zeros(y.len());
        for (i, ki) in k.iter().enumerate() {
            if E[i] != 0.0 {
                err += ki * (h * E[i]);
            }
        }
        let scale = y.zip_map(&y_new, |a, b| options.atol + a.abs().max(b.abs()) * options.rtol);
        let error_norm = rms_norm(&err, &scale);
        (k, y_new, error_norm)
    }

    /// 4th order interpolant inside the last accepted step [t_old, t_old + h].
    fn dense_output(y_old: &DVector<f64>, k: &[DVector<f64>], h: f64, theta: f64) -> DVector<f64> {
        let mut y = y_old.clone();
        for (i, ki) in k.iter().enumerate() {
            let mut b_i = 0.0;
            let mut power = theta;
            for p in P[i] {
                b_i += p * power;
                power *= theta;
            }
            if b_i != 0.0 {
                y += ki * (h * b_i);
            }
        }
        y
    }
}

impl Integrator for DormandPrince45 {
    fn name(&self) -> &'static str {
        "DormandPrince45"
    }

    fn integrate(
        &mut self,
        rhs: &RhsFn,
        t0: f64,
        x0: &DVector<f64>,
        grid: &[f64],
        options: &IntegratorOptions,
    ) -> Result<Vec<SolutionPoint>, IntegratorFailure> {
        self.stats = IntegratorStats::default();
        self.t = t0;
        self.y = x0.clone();
        let mut guard = RunGuard::new(grid, options);
        let y0 = self.y.clone();
        guard.report_until(t0, |_| y0.clone());
        let Some(t_end) = guard.final_time().filter(|_| !guard.done()) else {
            self.stats.wall_time = guard.started.elapsed();
            return Ok(guard.out);
        };

        let mut f = self.eval(rhs, t0, x0);
        if !is_finite_vector(x0) || !is_finite_vector(&f) {
            self.stats.wall_time = guard.started.elapsed();
            return Err(guard.fail(IntegrationFailureReason::NonFiniteState, t0));
        }
        let mut h = match options.first_step {
            Some(h) => h,
            None => self.select_initial_step(rhs, &f, t_end - t0, options),
        };
        debug!("DormandPrince45: t0 = {}, t_end = {}, first step {}", t0, t_end, h);

        while !guard.done() {
            if let Err(reason) = guard.check_budget(self.stats.n_steps, self.t) {
                self.stats.wall_time = guard.started.elapsed();
                return Err(guard.fail(reason, self.t));
            }
            let remaining = t_end - self.t;
            h = h.min(options.max_step);
            let last_step = h >= remaining;
            if last_step {
                h = remaining;
            } else if h < options.min_step {
                self.stats.wall_time = guard.started.elapsed();
                return Err(guard.fail(IntegrationFailureReason::StepSizeUnderflow, self.t));
            }

            let (k, y_new, error_norm) = self._step_impl(rhs, &f, h, options);
            self.stats.n_steps += 1;

            if !error_norm.is_finite() || !is_finite_vector(&y_new) {
                self.stats.n_rejected += 1;
                h *= MIN_FACTOR;
                if h < options.min_step {
                    self.stats.wall_time = guard.started.elapsed();
                    return Err(guard.fail(IntegrationFailureReason::NonFiniteState, self.t));
                }
                continue;
            }

            if error_norm <= 1.0 {
                let t_old = self.t;
                let t_new = if last_step { t_end } else { t_old + h };
                let y_old = self.y.clone();
                guard.report_until(t_new, |g| {
                    if g == t_new {
                        y_new.clone()
                    } else {
                        Self::dense_output(&y_old, &k, h, (g - t_old) / h)
                    }
                });
                self.t = t_new;
                self.y = y_new;
                f = k[6].clone();
                self.stats.n_accepted += 1;
                let factor = if error_norm == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * error_norm.powf(ERROR_EXPONENT)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                h *= factor;
            } else {
                self.stats.n_rejected += 1;
                h *= (SAFETY * error_norm.powf(ERROR_EXPONENT)).max(MIN_FACTOR);
            }
        }
        self.stats.wall_time = guard.started.elapsed();
        Ok(guard.out)
    }

    fn stats(&self) -> IntegratorStats {
        self.stats.clone()
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////////////////
//                     CLASSICAL RK4
///////////////////////////////////////////////////////////////////////////////////////////////////////////////
pub struct RungeKutta4 {
    /// largest substep inside a grid interval
    pub step: f64,
    pub t: f64,
    pub y: DVector<f64>,
    stats: IntegratorStats,
}

impl RungeKutta4 {
    pub fn new(step: f64) -> RungeKutta4 {
        RungeKutta4 {
            step,
            t: 0.0,
            y: DVector::zeros(0),
            stats: IntegratorStats::default(),
        }
    }

    fn _rk4_step(&mut self, rhs: &RhsFn, h: f64) {
        let t = self.t;
        let y = &self.y;
        let k1 = rhs(t, y);
        let k2 = rhs(t + h / 2.0, &(y + &k1 * (h / 2.0)));
        let k3 = rhs(t + h / 2.0, &(y + &k2 * (h / 2.0)));
        let k4 = rhs(t + h, &(y + &k3 * h));
        self.y = y + (&k1 + &k2 * 2.0 + &k3 * 2.0 + &k4) * (h / 6.0);
        self.t += h;
        self.stats.n_rhs_evals += 4;
        self.stats.n_steps += 1;
        self.stats.n_accepted += 1;
    }
}

impl Integrator for RungeKutta4 {
    fn name(&self) -> &'static str {
        "RungeKutta4"
    }

    fn integrate(
        &mut self,
        rhs: &RhsFn,
        t0: f64,
        x0: &DVector<f64>,
        grid: &[f64],
        options: &IntegratorOptions,
    ) -> Result<Vec<SolutionPoint>, IntegratorFailure> {
        self.stats = IntegratorStats::default();
        self.t = t0;
        self.y = x0.clone();
        let mut guard = RunGuard::new(grid, options);
        let y0 = self.y.clone();
        guard.report_until(t0, |_| y0.clone());

        while let Some(&target) = grid.get(guard.next) {
            let span = target - self.t;
            let substeps = (span / self.step).ceil().max(1.0) as usize;
            let h = span / substeps as f64;
            if h < options.min_step {
                self.stats.wall_time = guard.started.elapsed();
                return Err(guard.fail(IntegrationFailureReason::StepSizeUnderflow, self.t));
            }
            for _ in 0..substeps {
                if let Err(reason) = guard.check_budget(self.stats.n_steps, self.t) {
                    self.stats.wall_time = guard.started.elapsed();
                    return Err(guard.fail(reason, self.t));
                }
                self._rk4_step(rhs, h);
                if !is_finite_vector(&self.y) {
                    self.stats.wall_time = guard.started.elapsed();
                    let last_time = self.t - h;
                    return Err(guard.fail(IntegrationFailureReason::NonFiniteState, last_time));
                }
            }
            // land exactly on the grid point
            self.t = target;
            let y = self.y.clone();
            guard.report_until(target, |_| y.clone());
        }
        self.stats.wall_time = guard.started.elapsed();
        Ok(guard.out)
    }

    fn stats(&self) -> IntegratorStats {
        self.stats.clone()
    }
}
