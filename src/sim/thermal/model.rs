//! Lumped thermal model of the segments of a mesh.
//!
//! Each segment `i` carries one temperature `y[i]` (kelvin) and obeys
//!
//! ```text
//! c[i] * dy[i]/dt = sum_j K[i][j] * (y[i] - y[j])
//!                 + R[i] * ((y[i] / T_ref)^4 - (T_amb / T_ref)^4)
//!                 + Q[i](t, y)
//! ```
//!
//! with `K[i][j] = -contact[i][j] * lambda[i][j]` (symmetric, non-positive)
//! and `R[i] = -sigma * eps[i] * area[i]`. `sigma` and `T_ref` are fixed by
//! [`STEFAN_BOLTZMANN_SCALED`] and [`REFERENCE_TEMPERATURE`]; their
//! combination equals the SI Stefan-Boltzmann constant.

use std::fmt;

use crate::error::{Error, Result};
use crate::geom::contact::ContactAreas;
use crate::sim::ode::OdeSystem;

use super::source::{HeatSource, NoSource};

/// Stefan-Boltzmann constant for temperatures expressed in units of 100 K.
pub const STEFAN_BOLTZMANN_SCALED: f64 = 5.67;

/// Temperature scale used inside the radiative term, in kelvin.
pub const REFERENCE_TEMPERATURE: f64 = 100.0;

/// Relative tolerance used when checking matrix symmetry.
const SYMMETRY_RTOL: f64 = 1e-12;

/// Right-hand side of the coupled segment heat balance.
///
/// Coupling and radiative coefficients are derived once in [`ThermalModel::new`]
/// and reused by every evaluation.
pub struct ThermalModel {
    coupling: Vec<Vec<f64>>,
    radiative_loss: Vec<f64>,
    specific_heat: Vec<f64>,
    ambient_quartic: f64,
    source: Box<dyn HeatSource>,
}

impl fmt::Debug for ThermalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThermalModel")
            .field("coupling", &self.coupling)
            .field("radiative_loss", &self.radiative_loss)
            .field("specific_heat", &self.specific_heat)
            .field("ambient_quartic", &self.ambient_quartic)
            .finish_non_exhaustive()
    }
}

impl ThermalModel {
    /// Builds the model from geometric and physical coefficients.
    ///
    /// # Arguments
    /// * `segment_areas` - Exposed area per segment
    /// * `contact_matrix` - Symmetric contact area matrix
    /// * `emissivity` - Per segment, in `[0, 1]`
    /// * `specific_heat` - Per segment, strictly positive
    /// * `conductivity` - Symmetric conductive coefficient matrix
    /// * `source` - External heat source term
    pub fn new(
        segment_areas: &[f64],
        contact_matrix: &[Vec<f64>],
        emissivity: &[f64],
        specific_heat: &[f64],
        conductivity: &[Vec<f64>],
        source: Box<dyn HeatSource>,
    ) -> Result<Self> {
        let n = segment_areas.len();
        let mut problems = Vec::new();

        check_vector(
            &mut problems,
            "emissivity",
            emissivity,
            n,
            |v| (0.0..=1.0).contains(&v),
            "must be in [0, 1]",
        );
        check_vector(
            &mut problems,
            "specific_heat",
            specific_heat,
            n,
            |v| v > 0.0,
            "must be > 0",
        );
        check_vector(
            &mut problems,
            "segment_areas",
            segment_areas,
            n,
            |v| v >= 0.0,
            "must be >= 0",
        );
        check_symmetric(&mut problems, "contact_matrix", contact_matrix, n);
        check_symmetric(&mut problems, "conductivity", conductivity, n);
        check_source(&mut problems, &*source, n);

        if !problems.is_empty() {
            return Err(Error::ConfigValidation { problems });
        }

        let coupling = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            0.0
                        } else {
                            -contact_matrix[i][j] * conductivity[i][j]
                        }
                    })
                    .collect()
            })
            .collect();

        let radiative_loss = emissivity
            .iter()
            .zip(segment_areas)
            .map(|(eps, area)| -STEFAN_BOLTZMANN_SCALED * eps * area)
            .collect();

        Ok(Self {
            coupling,
            radiative_loss,
            specific_heat: specific_heat.to_vec(),
            ambient_quartic: 0.0,
            source,
        })
    }

    /// Model without any external source term.
    pub fn without_source(
        segment_areas: &[f64],
        contact_matrix: &[Vec<f64>],
        emissivity: &[f64],
        specific_heat: &[f64],
        conductivity: &[Vec<f64>],
    ) -> Result<Self> {
        Self::new(
            segment_areas,
            contact_matrix,
            emissivity,
            specific_heat,
            conductivity,
            Box::new(NoSource),
        )
    }

    /// Convenience constructor taking areas from a [`ContactAreas`] result.
    pub fn from_areas(
        areas: &ContactAreas,
        emissivity: &[f64],
        specific_heat: &[f64],
        conductivity: &[Vec<f64>],
        source: Box<dyn HeatSource>,
    ) -> Result<Self> {
        Self::new(
            &areas.segment_areas,
            &areas.contact_matrix,
            emissivity,
            specific_heat,
            conductivity,
            source,
        )
    }

    /// Sets the temperature of the radiative environment (default 0 K).
    pub fn with_ambient_temperature(mut self, temperature: f64) -> Self {
        self.ambient_quartic = (temperature / REFERENCE_TEMPERATURE).powi(4);
        self
    }

    /// Replaces the heat source.
    pub fn with_source(mut self, source: Box<dyn HeatSource>) -> Result<Self> {
        let mut problems = Vec::new();
        check_source(&mut problems, &*source, self.segment_count());
        if !problems.is_empty() {
            return Err(Error::ConfigValidation { problems });
        }
        self.source = source;
        Ok(self)
    }

    pub fn segment_count(&self) -> usize {
        self.specific_heat.len()
    }

    /// Conductive coupling matrix `K`.
    pub fn coupling(&self) -> &[Vec<f64>] {
        &self.coupling
    }

    /// Radiative coefficient `R[i] = -sigma * eps[i] * area[i]`.
    pub fn radiative_loss(&self) -> &[f64] {
        &self.radiative_loss
    }

    pub fn specific_heat(&self) -> &[f64] {
        &self.specific_heat
    }

    /// Writes `dy/dt` at time `t` and state `y` into `dy`.
    pub fn evaluate(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<()> {
        self.check_state(t, y, dy.len())?;

        dy.fill(0.0);
        self.source.heat(t, y, dy)?;
        for (i, q) in dy.iter().enumerate() {
            if !q.is_finite() {
                return Err(domain_error(i, t, *q, "non-finite source term"));
            }
        }

        for i in 0..y.len() {
            let balance = self.conduction(i, y) + self.radiation(i, y) + dy[i];
            let rate = balance / self.specific_heat[i];
            if !rate.is_finite() {
                return Err(domain_error(i, t, rate, "non-finite temperature derivative"));
            }
            dy[i] = rate;
        }
        Ok(())
    }

    /// Allocating variant of [`Self::evaluate`].
    pub fn derivative(&self, t: f64, y: &[f64]) -> Result<Vec<f64>> {
        let mut dy = vec![0.0; y.len()];
        self.evaluate(t, y, &mut dy)?;
        Ok(dy)
    }

    /// Steady-state heat balance without the source term.
    ///
    /// Returns the net heat rate per segment (not divided by the specific
    /// heat); its roots are the equilibrium temperatures.
    pub fn stationary_residual(&self, y: &[f64]) -> Result<Vec<f64>> {
        self.check_state(f64::NAN, y, y.len())?;
        let mut out = Vec::with_capacity(y.len());
        for i in 0..y.len() {
            let r = self.conduction(i, y) + self.radiation(i, y);
            if !r.is_finite() {
                return Err(domain_error(i, f64::NAN, r, "non-finite stationary residual"));
            }
            out.push(r);
        }
        Ok(out)
    }

    /// Jacobian of [`Self::stationary_residual`] at `y`.
    pub fn stationary_jacobian(&self, y: &[f64]) -> Vec<Vec<f64>> {
        let n = y.len();
        let mut jac = vec![vec![0.0; n]; n];
        let scale = REFERENCE_TEMPERATURE.powi(4);
        for i in 0..n {
            let mut diag = 4.0 * self.radiative_loss[i] * y[i].powi(3) / scale;
            for j in 0..n {
                if i != j {
                    jac[i][j] = -self.coupling[i][j];
                    diag += self.coupling[i][j];
                }
            }
            jac[i][i] = diag;
        }
        jac
    }

    fn conduction(&self, i: usize, y: &[f64]) -> f64 {
        self.coupling[i]
            .iter()
            .zip(y)
            .map(|(k, yj)| k * (y[i] - yj))
            .sum()
    }

    fn radiation(&self, i: usize, y: &[f64]) -> f64 {
        let scaled = y[i] / REFERENCE_TEMPERATURE;
        self.radiative_loss[i] * (scaled.powi(4) - self.ambient_quartic)
    }

    fn check_state(&self, t: f64, y: &[f64], out_len: usize) -> Result<()> {
        let n = self.segment_count();
        if y.len() != n || out_len != n {
            return Err(Error::ConfigValidation {
                problems: vec![format!(
                    "state vector has {} entries (output {}), expected {n}",
                    y.len(),
                    out_len
                )],
            });
        }
        for (i, &v) in y.iter().enumerate() {
            if !v.is_finite() {
                return Err(domain_error(i, t, v, "non-finite temperature"));
            }
            if v < 0.0 {
                return Err(domain_error(i, t, v, "negative absolute temperature"));
            }
        }
        Ok(())
    }
}

impl OdeSystem for ThermalModel {
    fn dimension(&self) -> usize {
        self.segment_count()
    }

    fn rhs(&self, t: f64, y: &[f64], dy: &mut [f64]) -> Result<()> {
        self.evaluate(t, y, dy)
    }
}

fn domain_error(segment: usize, time: f64, value: f64, reason: &'static str) -> Error {
    Error::NumericalDomain {
        segment,
        time,
        value,
        reason,
    }
}

fn check_vector(
    problems: &mut Vec<String>,
    name: &str,
    values: &[f64],
    n: usize,
    valid: impl Fn(f64) -> bool,
    requirement: &str,
) {
    if values.len() != n {
        problems.push(format!("{name}: expected {n} entries, got {}", values.len()));
        return;
    }
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() || !valid(v) {
            problems.push(format!("{name}[{i}]: {requirement}, got {v}"));
        }
    }
}

fn check_source(problems: &mut Vec<String>, source: &dyn HeatSource, n: usize) {
    if let Some(len) = source.dimension()
        && len != n
    {
        problems.push(format!("source: expected {n} entries, got {len}"));
    }
}

fn check_symmetric(problems: &mut Vec<String>, name: &str, matrix: &[Vec<f64>], n: usize) {
    if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
        problems.push(format!("{name}: expected a {n}x{n} matrix"));
        return;
    }
    for i in 0..n {
        for j in 0..n {
            let (a, b) = (matrix[i][j], matrix[j][i]);
            if !a.is_finite() || a < 0.0 {
                problems.push(format!("{name}[{i}][{j}]: must be finite and >= 0, got {a}"));
            } else if j > i && (a - b).abs() > SYMMETRY_RTOL * a.abs().max(b.abs()) {
                problems.push(format!("{name}: not symmetric at ({i}, {j}): {a} != {b}"));
            }
        }
    }
}
