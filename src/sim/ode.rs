//! Adaptive explicit Runge-Kutta integration.
//!
//! [`DormandPrince`] implements the embedded 5(4) pair of Dormand and Prince
//! with first-same-as-last reuse of the final stage and a standard
//! proportional step-size controller. Outputs are produced exactly at the
//! requested times by shortening the last step before each of them.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A first-order ODE system `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// Number of unknowns.
    fn dimension(&self) -> usize;

    /// Writes `f(t, y)` into `dy`.
    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<()>;
}

/// Tolerances and limits of the adaptive integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegratorSettings {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// First trial step; estimated from the initial slope when `None`.
    pub initial_step: Option<f64>,
    /// Upper bound on the step size.
    pub max_step: Option<f64>,
    /// Maximum number of attempted steps per call.
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-8,
            initial_step: None,
            max_step: None,
            max_steps: 100_000,
        }
    }
}

impl IntegratorSettings {
    /// Returns a description of every invalid setting.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.rtol > 0.0 && self.rtol.is_finite()) {
            problems.push(format!("integrator.rtol: must be > 0, got {}", self.rtol));
        }
        if !(self.atol >= 0.0 && self.atol.is_finite()) {
            problems.push(format!("integrator.atol: must be >= 0, got {}", self.atol));
        }
        if let Some(h) = self.initial_step
            && !(h > 0.0 && h.is_finite())
        {
            problems.push(format!("integrator.initial_step: must be > 0, got {h}"));
        }
        if let Some(h) = self.max_step
            && !(h > 0.0)
        {
            problems.push(format!("integrator.max_step: must be > 0, got {h}"));
        }
        if self.max_steps == 0 {
            problems.push("integrator.max_steps: must be > 0".to_string());
        }
        problems
    }
}

// Dormand-Prince 5(4) tableau
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
// Fifth-order weights (also the last stage row)
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;
// Difference between fifth- and fourth-order weights
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

/// Step counters of one integrator instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

/// Adaptive Dormand-Prince 5(4) integrator bound to one system.
///
/// The step size found during one call to [`Self::integrate_to`] is carried
/// over to the next one.
pub struct DormandPrince<'a, S: OdeSystem + ?Sized> {
    system: &'a S,
    settings: IntegratorSettings,
    step: Option<f64>,
    stats: StepStats,
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
}

impl<'a, S: OdeSystem + ?Sized> DormandPrince<'a, S> {
    pub fn new(system: &'a S, settings: IntegratorSettings) -> Result<Self> {
        let problems = settings.problems();
        if !problems.is_empty() {
            return Err(Error::ConfigValidation { problems });
        }
        let n = system.dimension();
        Ok(Self {
            system,
            settings,
            step: settings.initial_step,
            stats: StepStats::default(),
            k: std::array::from_fn(|_| vec![0.0; n]),
            y_stage: vec![0.0; n],
            y_new: vec![0.0; n],
        })
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    /// Step size the next call will start from.
    pub fn step_size(&self) -> Option<f64> {
        self.step
    }

    /// Advances `(t, y)` up to exactly `t_end`.
    pub fn integrate_to(&mut self, t: &mut f64, y: &mut [f64], t_end: f64) -> Result<()> {
        let n = self.system.dimension();
        if y.len() != n {
            return Err(Error::ConfigValidation {
                problems: vec![format!("state vector has {} entries, expected {n}", y.len())],
            });
        }
        if !(t_end >= *t) {
            return Err(Error::Integration {
                time: *t,
                reason: format!("end time {t_end} is before the current time"),
            });
        }
        if t_end == *t {
            return Ok(());
        }

        self.eval(*t, y, 0)?;
        let mut h = match self.step {
            Some(h) => h,
            None => self.initial_step(y, t_end - *t),
        };

        // Domain error of the last rejected trial step
        let mut failure = None;
        let mut attempts = 0;
        while *t < t_end {
            attempts += 1;
            if attempts > self.settings.max_steps {
                if let Some(e) = failure.take() {
                    return Err(e);
                }
                return Err(Error::Integration {
                    time: *t,
                    reason: format!("exceeded {} steps", self.settings.max_steps),
                });
            }
            if let Some(max) = self.settings.max_step {
                h = h.min(max);
            }
            let remaining = t_end - *t;
            let last = h >= remaining;
            let h_try = if last { remaining } else { h };
            if !last && h_try <= 1e-14 * t.abs().max(1.0) {
                if let Some(e) = failure.take() {
                    return Err(e);
                }
                return Err(Error::Integration {
                    time: *t,
                    reason: format!("step size underflow (h = {h_try:e})"),
                });
            }

            // A trial stage outside the model's domain rejects the step
            let err = match self.try_step(*t, y, h_try) {
                Ok(err) => err,
                Err(e @ Error::NumericalDomain { .. }) => {
                    debug!("Rejected step of {h_try:e} at t={t}: {e}");
                    failure = Some(e);
                    f64::INFINITY
                }
                Err(e) => return Err(e),
            };
            if err <= 1.0 {
                failure = None;
                self.stats.accepted += 1;
                *t = if last { t_end } else { *t + h_try };
                y.copy_from_slice(&self.y_new);
                // First same as last
                self.k.swap(0, 6);
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                // Keep the unclipped step when the last one was shortened
                if !last || h_try * factor > h {
                    h = h_try * factor;
                }
            } else {
                self.stats.rejected += 1;
                let factor = (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, 1.0);
                h = h_try * factor;
            }
        }

        self.step = Some(h);
        Ok(())
    }

    /// One trial step of size `h`; leaves the result in `y_new` and the
    /// final stage in `k[6]`. Returns the scaled error norm.
    fn try_step(&mut self, t: f64, y: &[f64], h: f64) -> Result<f64> {
        self.stage(y, h, &[(0, A21)]);
        self.eval_stage(t + C2 * h, 1)?;
        self.stage(y, h, &[(0, A31), (1, A32)]);
        self.eval_stage(t + C3 * h, 2)?;
        self.stage(y, h, &[(0, A41), (1, A42), (2, A43)]);
        self.eval_stage(t + C4 * h, 3)?;
        self.stage(y, h, &[(0, A51), (1, A52), (2, A53), (3, A54)]);
        self.eval_stage(t + C5 * h, 4)?;
        self.stage(y, h, &[(0, A61), (1, A62), (2, A63), (3, A64), (4, A65)]);
        self.eval_stage(t + h, 5)?;

        for i in 0..y.len() {
            let k = &self.k;
            self.y_new[i] =
                y[i] + h * (B1 * k[0][i] + B3 * k[2][i] + B4 * k[3][i] + B5 * k[4][i] + B6 * k[5][i]);
        }
        let y_new = std::mem::take(&mut self.y_new);
        let result = self.eval(t + h, &y_new, 6);
        self.y_new = y_new;
        result?;

        let mut sum = 0.0;
        for i in 0..y.len() {
            let k = &self.k;
            let err = h
                * (E1 * k[0][i]
                    + E3 * k[2][i]
                    + E4 * k[3][i]
                    + E5 * k[4][i]
                    + E6 * k[5][i]
                    + E7 * k[6][i]);
            let scale = self.settings.atol + self.settings.rtol * y[i].abs().max(self.y_new[i].abs());
            let scaled = if scale > 0.0 { err / scale } else { err };
            sum += scaled * scaled;
        }
        let n = y.len().max(1) as f64;
        let norm = (sum / n).sqrt();
        if norm.is_nan() {
            return Err(Error::Integration {
                time: t,
                reason: "error estimate is not a number".to_string(),
            });
        }
        Ok(norm)
    }

    /// Fills `y_stage = y + h * sum(a * k)`.
    fn stage(&mut self, y: &[f64], h: f64, coeffs: &[(usize, f64)]) {
        for i in 0..y.len() {
            let mut acc = 0.0;
            for &(s, a) in coeffs {
                acc += a * self.k[s][i];
            }
            self.y_stage[i] = y[i] + h * acc;
        }
    }

    fn eval_stage(&mut self, t: f64, slot: usize) -> Result<()> {
        let y_stage = std::mem::take(&mut self.y_stage);
        let result = self.eval(t, &y_stage, slot);
        self.y_stage = y_stage;
        result
    }

    fn eval(&mut self, t: f64, y: &[f64], slot: usize) -> Result<()> {
        self.stats.evaluations += 1;
        self.system.rhs(t, y, &mut self.k[slot])
    }

    /// Initial step from the size of the state and of its slope; `k[0]`
    /// must hold `f(t, y)`.
    fn initial_step(&self, y: &[f64], span: f64) -> f64 {
        let scale = |i: usize| self.settings.atol + self.settings.rtol * y[i].abs();
        let rms = |v: &dyn Fn(usize) -> f64| {
            let n = y.len().max(1) as f64;
            ((0..y.len()).map(|i| v(i).powi(2)).sum::<f64>() / n).sqrt()
        };
        let d0 = rms(&|i| y[i] / scale(i));
        let d1 = rms(&|i| self.k[0][i] / scale(i));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        h0.min(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// Integrates `system` from `(t0, y0)` and returns the state at each time
    /// in `times` (which must be non-decreasing and start at or after `t0`).
    fn solve_at<S: OdeSystem + ?Sized>(
        system: &S,
        t0: f64,
        y0: &[f64],
        times: &[f64],
        settings: IntegratorSettings,
    ) -> Result<Vec<Vec<f64>>> {
        let mut stepper = DormandPrince::new(system, settings)?;
        let mut t = t0;
        let mut y = y0.to_vec();
        let mut out = Vec::with_capacity(times.len());
        for &t_out in times {
            stepper.integrate_to(&mut t, &mut y, t_out)?;
            out.push(y.clone());
        }
        Ok(out)
    }

    /// dy/dt = -lambda * y
    struct Decay(f64);

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<()> {
            dy[0] = -self.0 * y[0];
            Ok(())
        }
    }

    /// Harmonic oscillator y'' = -y written as a first-order system.
    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn rhs(&self, _t: f64, y: &[f64], dy: &mut [f64]) -> Result<()> {
            dy[0] = y[1];
            dy[1] = -y[0];
            Ok(())
        }
    }

    /// Fails once t passes 1.
    struct Breaks;

    impl OdeSystem for Breaks {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, t: f64, _y: &[f64], dy: &mut [f64]) -> Result<()> {
            if t > 1.0 {
                return Err(Error::NumericalDomain {
                    segment: 0,
                    time: t,
                    value: f64::NAN,
                    reason: "test",
                });
            }
            dy[0] = 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_exponential_decay() -> anyhow::Result<()> {
        let times = [0.5, 1.0, 2.0, 5.0];
        let out = solve_at(&Decay(1.3), 0.0, &[2.0], &times, IntegratorSettings::default())?;
        for (t, y) in times.iter().zip(&out) {
            assert_relative_eq!(y[0], 2.0 * (-1.3 * t).exp(), max_relative = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_oscillator_full_period() -> anyhow::Result<()> {
        let settings = IntegratorSettings {
            rtol: 1e-9,
            atol: 1e-12,
            ..Default::default()
        };
        let period = 2.0 * std::f64::consts::PI;
        let out = solve_at(&Oscillator, 0.0, &[1.0, 0.0], &[period / 4.0, period], settings)?;
        assert_relative_eq!(out[0][0], 0.0, epsilon = 1e-7);
        assert_relative_eq!(out[0][1], -1.0, epsilon = 1e-7);
        assert_relative_eq!(out[1][0], 1.0, epsilon = 1e-7);
        assert_relative_eq!(out[1][1], 0.0, epsilon = 1e-7);
        Ok(())
    }

    #[test]
    fn test_lands_exactly_on_output_times() -> anyhow::Result<()> {
        let system = Decay(0.1);
        let mut stepper = DormandPrince::new(&system, IntegratorSettings::default())?;
        let mut t = 0.0;
        let mut y = vec![1.0];
        for t_out in [0.1, 0.7, 3.0] {
            stepper.integrate_to(&mut t, &mut y, t_out)?;
            assert_eq!(t, t_out);
        }
        assert!(stepper.stats().accepted > 0);
        Ok(())
    }

    #[test]
    fn test_fixed_point_stays_put() -> anyhow::Result<()> {
        let out = solve_at(&Decay(1.0), 0.0, &[0.0], &[1.0, 100.0], IntegratorSettings::default())?;
        assert_eq!(out[1][0], 0.0);
        Ok(())
    }

    /// dy/dt = -lambda * y, undefined for negative y.
    struct PositiveDecay(f64);

    impl OdeSystem for PositiveDecay {
        fn dimension(&self) -> usize {
            1
        }

        fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<()> {
            if y[0] < 0.0 {
                return Err(Error::NumericalDomain {
                    segment: 0,
                    time: t,
                    value: y[0],
                    reason: "negative",
                });
            }
            dy[0] = -self.0 * y[0];
            Ok(())
        }
    }

    #[test]
    fn test_domain_error_in_trial_step_shrinks_step() -> anyhow::Result<()> {
        let system = PositiveDecay(10.0);
        let settings = IntegratorSettings {
            initial_step: Some(1.0),
            ..Default::default()
        };
        let mut stepper = DormandPrince::new(&system, settings)?;
        let mut t = 0.0;
        let mut y = vec![1.0];
        stepper.integrate_to(&mut t, &mut y, 1.0)?;
        assert_eq!(t, 1.0);
        assert_abs_diff_eq!(y[0], (-10.0f64).exp(), epsilon = 1e-6);
        assert!(stepper.stats().rejected >= 1);
        Ok(())
    }

    #[test]
    fn test_persistent_rhs_error_aborts() {
        let res = solve_at(&Breaks, 0.0, &[0.0], &[0.5, 2.0], IntegratorSettings::default());
        assert!(matches!(res, Err(Error::NumericalDomain { .. })));
    }

    #[test]
    fn test_step_limit() {
        let settings = IntegratorSettings {
            max_step: Some(0.01),
            max_steps: 10,
            ..Default::default()
        };
        let res = solve_at(&Decay(1.0), 0.0, &[1.0], &[1.0], settings);
        assert!(matches!(res, Err(Error::Integration { .. })));
    }

    #[test]
    fn test_backwards_time_is_rejected() -> anyhow::Result<()> {
        let system = Decay(1.0);
        let mut stepper = DormandPrince::new(&system, IntegratorSettings::default())?;
        let mut t = 1.0;
        let mut y = vec![1.0];
        assert!(stepper.integrate_to(&mut t, &mut y, 0.5).is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_settings() {
        let settings = IntegratorSettings {
            rtol: 0.0,
            max_steps: 0,
            ..Default::default()
        };
        assert_eq!(settings.problems().len(), 2);
        assert!(DormandPrince::new(&Decay(1.0), settings).is_err());
    }
}
