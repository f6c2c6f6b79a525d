//! Equilibrium temperatures from the stationary heat balance.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sim::solve::solve_dense;

use super::model::ThermalModel;

/// Stopping criteria of the Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewtonSettings {
    /// Relative size of the last update below which the iteration stops.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
        }
    }
}

/// Largest number of step halvings tried to keep temperatures positive.
const MAX_HALVINGS: usize = 30;

impl ThermalModel {
    /// Solves `stationary_residual(y) = 0` by damped Newton iteration.
    ///
    /// Steps are halved until every temperature stays positive. A purely
    /// conductive model (zero emissivity everywhere) has a singular Jacobian
    /// and yields [`Error::SingularSystem`].
    pub fn equilibrium(&self, guess: &[f64], settings: NewtonSettings) -> Result<Vec<f64>> {
        let mut y = guess.to_vec();
        let mut residual = self.stationary_residual(&y)?;

        for iteration in 1..=settings.max_iterations {
            let jacobian = self.stationary_jacobian(&y);
            let rhs: Vec<f64> = residual.iter().map(|r| -r).collect();
            let delta = solve_dense(jacobian, rhs)?;

            let mut scale = 1.0;
            let mut halvings = 0;
            let mut candidate: Vec<f64> = y.iter().zip(&delta).map(|(a, d)| a + d).collect();
            while candidate.iter().any(|v| *v <= 0.0) {
                halvings += 1;
                if halvings > MAX_HALVINGS {
                    return Err(Error::NoConvergence {
                        iterations: iteration,
                        residual: max_abs(&residual),
                    });
                }
                scale *= 0.5;
                candidate = y.iter().zip(&delta).map(|(a, d)| a + scale * d).collect();
            }

            let step = max_abs(&delta) * scale;
            y = candidate;
            residual = self.stationary_residual(&y)?;

            if step <= settings.tolerance * (1.0 + max_abs(&y)) {
                debug!(
                    "Equilibrium reached after {iteration} iterations (residual {:e})",
                    max_abs(&residual)
                );
                return Ok(y);
            }
        }

        let residual = max_abs(&residual);
        warn!(
            "Equilibrium search stopped after {} iterations (residual {residual:e})",
            settings.max_iterations
        );
        Err(Error::NoConvergence {
            iterations: settings.max_iterations,
            residual,
        })
    }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |m, v| m.max(v.abs()))
}
