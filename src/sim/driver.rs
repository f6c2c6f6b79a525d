//! Integration driver: time grids, trajectories and simulation sessions.

use std::io::Write;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::sim::ode::{DormandPrince, IntegratorSettings, OdeSystem};

/// Largest number of samples a generated time grid may hold.
pub const MAX_GRID_SAMPLES: usize = 10_000_000;

/// `samples` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (samples - 1) as f64;
            (0..samples)
                .map(|k| if k + 1 == samples { stop } else { start + k as f64 * step })
                .collect()
        }
    }
}

/// Values `start, start + step, ...` strictly below `stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0 && step.is_finite()) || !start.is_finite() || !stop.is_finite() {
        return Err(Error::ConfigValidation {
            problems: vec![format!("arange({start}, {stop}, {step}): step must be > 0")],
        });
    }
    let count = ((stop - start) / step).ceil().max(0.0);
    if count > MAX_GRID_SAMPLES as f64 {
        return Err(Error::ConfigValidation {
            problems: vec![format!(
                "arange({start}, {stop}, {step}) has {count} samples, the limit is {MAX_GRID_SAMPLES}"
            )],
        });
    }
    let count = count as usize;
    Ok((0..count).map(|k| start + k as f64 * step).collect())
}

/// Checks that `grid` is non-empty, finite and strictly increasing.
pub fn check_time_grid(grid: &[f64]) -> std::result::Result<(), String> {
    if grid.is_empty() {
        return Err("time grid is empty".to_string());
    }
    if let Some(k) = grid.iter().position(|t| !t.is_finite()) {
        return Err(format!("time grid entry {k} is not finite"));
    }
    if let Some(k) = grid.windows(2).position(|w| w[1] <= w[0]) {
        return Err(format!(
            "time grid is not strictly increasing at entry {} ({} after {})",
            k + 1,
            grid[k + 1],
            grid[k]
        ));
    }
    Ok(())
}

/// Sampled solution: `states[k]` is the state at `times[k]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: f64, state: Vec<f64>) {
        self.times.push(time);
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn final_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }

    /// Time series of one state component.
    pub fn segment_series(&self, index: usize) -> Vec<f64> {
        self.states
            .iter()
            .filter_map(|s| s.get(index).copied())
            .collect()
    }

    /// Appends `other`, skipping its first sample if it repeats our last time.
    pub fn extend(&mut self, other: Trajectory) {
        let skip = match (self.final_time(), other.times.first()) {
            (Some(last), Some(&first)) if first == last => 1,
            _ => 0,
        };
        for (t, y) in other.times.into_iter().zip(other.states).skip(skip) {
            self.push(t, y);
        }
    }

    /// Writes one header row `t,<labels...>` and one row per sample.
    pub fn write_csv<W: Write>(&self, mut writer: W, labels: &[&str]) -> std::io::Result<()> {
        write!(writer, "t")?;
        for label in labels {
            write!(writer, ",{label}")?;
        }
        writeln!(writer)?;
        for (t, state) in self.times.iter().zip(&self.states) {
            write!(writer, "{t}")?;
            for v in state {
                write!(writer, ",{v}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Integrates `system` from `y0` at `grid[0]` and samples it at every grid time.
///
/// The first sample is `y0` itself.
pub fn integrate<S: OdeSystem + ?Sized>(
    system: &S,
    y0: &[f64],
    grid: &[f64],
    settings: IntegratorSettings,
) -> Result<Trajectory> {
    let (trajectory, _) = integrate_window(system, y0, grid, settings)?;
    Ok(trajectory)
}

/// Same as [`integrate`], also returning the last step size used.
fn integrate_window<S: OdeSystem + ?Sized>(
    system: &S,
    y0: &[f64],
    grid: &[f64],
    settings: IntegratorSettings,
) -> Result<(Trajectory, Option<f64>)> {
    check_time_grid(grid).map_err(|p| Error::ConfigValidation { problems: vec![p] })?;
    if y0.len() != system.dimension() {
        return Err(Error::ConfigValidation {
            problems: vec![format!(
                "initial state has {} entries, expected {}",
                y0.len(),
                system.dimension()
            )],
        });
    }

    let mut stepper = DormandPrince::new(system, settings)?;
    let mut t = grid[0];
    let mut y = y0.to_vec();
    let mut trajectory = Trajectory::new();
    trajectory.push(t, y.clone());
    for &t_out in &grid[1..] {
        stepper.integrate_to(&mut t, &mut y, t_out)?;
        trajectory.push(t, y.clone());
    }

    let stats = stepper.stats();
    debug!(
        "Integrated t = {} .. {}: {} accepted, {} rejected steps, {} evaluations",
        grid[0],
        t,
        stats.accepted,
        stats.rejected,
        stats.evaluations
    );
    Ok((trajectory, stepper.step_size()))
}

/// Simulation session driven forward in consecutive windows.
///
/// Each window starts from the last state of the previous one. The system
/// (and anything it cached at construction) is reused across windows.
#[derive(Debug)]
pub struct Simulation<S: OdeSystem> {
    system: S,
    settings: IntegratorSettings,
    time: f64,
    state: Vec<f64>,
    history: Trajectory,
}

impl<S: OdeSystem> Simulation<S> {
    pub fn new(system: S, y0: Vec<f64>, t0: f64, settings: IntegratorSettings) -> Result<Self> {
        let mut problems = settings.problems();
        if y0.len() != system.dimension() {
            problems.push(format!(
                "initial state has {} entries, expected {}",
                y0.len(),
                system.dimension()
            ));
        }
        if !t0.is_finite() {
            problems.push(format!("start time must be finite, got {t0}"));
        }
        if !problems.is_empty() {
            return Err(Error::ConfigValidation { problems });
        }

        let mut history = Trajectory::new();
        history.push(t0, y0.clone());
        Ok(Self {
            system,
            settings,
            time: t0,
            state: y0,
            history,
        })
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    /// Every sample recorded so far, starting with the initial state.
    pub fn history(&self) -> &Trajectory {
        &self.history
    }

    /// Integrates over `[time, time + duration]` sampled at `samples` evenly
    /// spaced points after the current time, and returns that window.
    pub fn advance(&mut self, duration: f64, samples: usize) -> Result<Trajectory> {
        if !(duration > 0.0 && duration.is_finite()) || samples == 0 {
            return Err(Error::ConfigValidation {
                problems: vec![format!(
                    "window needs a positive duration and at least one sample, got {duration} and {samples}"
                )],
            });
        }
        let grid = linspace(self.time, self.time + duration, samples + 1);
        self.run_grid(&grid)
    }

    /// Integrates over an explicit grid starting at the current time.
    ///
    /// `grid[0]` must equal [`Self::time`].
    pub fn run_grid(&mut self, grid: &[f64]) -> Result<Trajectory> {
        if grid.first() != Some(&self.time) {
            return Err(Error::ConfigValidation {
                problems: vec![format!(
                    "window must start at the current time {}, got {:?}",
                    self.time,
                    grid.first()
                )],
            });
        }

        let (window, step) = integrate_window(&self.system, &self.state, grid, self.settings)?;
        if step.is_some() {
            self.settings.initial_step = step;
        }
        if let (Some(t), Some(y)) = (window.final_time(), window.final_state()) {
            self.time = t;
            self.state = y.to_vec();
        }
        self.history.extend(window.clone());
        info!(
            "Advanced to t = {} ({} samples recorded)",
            self.time,
            self.history.len()
        );
        Ok(window)
    }
}
