//! JSON configuration of a thermal run.
//!
//! Every field is checked up front; [`ThermalConfig::validate`] reports all
//! problems at once in a single [`Error::ConfigValidation`].

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geom::contact::{ContactAreas, ContactPlane, plane_problems};
use crate::geom::mesh::SegmentedMesh;
use crate::sim::driver::check_time_grid;
use crate::sim::ode::IntegratorSettings;

use super::expr::eval_range;
use super::model::ThermalModel;
use super::source::{ExprSource, HeatSource, NoSource};
use super::steady::NewtonSettings;

/// Conductive coefficients, per junction of a chain or as a full matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conductivity {
    /// Entry `k` couples segments `k` and `k + 1`.
    Chain(Vec<f64>),
    /// Symmetric `n x n` matrix.
    Matrix(Vec<Vec<f64>>),
}

impl Conductivity {
    /// Broadcasts into a symmetric `n x n` matrix.
    pub fn to_matrix(&self, n: usize) -> std::result::Result<Vec<Vec<f64>>, String> {
        match self {
            Conductivity::Chain(values) => {
                let expected = n.saturating_sub(1);
                if values.len() != expected {
                    return Err(format!(
                        "conductivity: expected {expected} chain entries, got {}",
                        values.len()
                    ));
                }
                let mut matrix = vec![vec![0.0; n]; n];
                for (k, &c) in values.iter().enumerate() {
                    matrix[k][k + 1] = c;
                    matrix[k + 1][k] = c;
                }
                Ok(matrix)
            }
            Conductivity::Matrix(rows) => {
                if rows.len() != n || rows.iter().any(|r| r.len() != n) {
                    return Err(format!("conductivity: expected a {n}x{n} matrix"));
                }
                Ok(rows.clone())
            }
        }
    }
}

/// Sample times, listed explicitly or as `linspace(...)` / `arange(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeGrid {
    Samples(Vec<f64>),
    Range(String),
}

impl TimeGrid {
    pub fn resolve(&self) -> std::result::Result<Vec<f64>, String> {
        let grid = match self {
            TimeGrid::Samples(times) => times.clone(),
            TimeGrid::Range(spec) => eval_range(spec).map_err(|e| format!("time_grid: {e}"))?,
        };
        check_time_grid(&grid).map_err(|e| format!("time_grid: {e}"))?;
        Ok(grid)
    }
}

/// Physical and numerical parameters of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermalConfig {
    pub emissivity: Option<Vec<f64>>,
    pub specific_heat: Option<Vec<f64>>,
    pub conductivity: Option<Conductivity>,
    pub contacts: Option<Vec<ContactPlane>>,
    #[serde(default)]
    pub contact_tolerance: f64,
    /// One expression per segment; absent means no source.
    #[serde(default)]
    pub source: Option<Vec<String>>,
    pub initial_temperature: Option<Vec<f64>>,
    #[serde(default)]
    pub ambient_temperature: f64,
    pub time_grid: Option<TimeGrid>,
    #[serde(default)]
    pub integrator: IntegratorSettings,
    #[serde(default)]
    pub equilibrium: NewtonSettings,
}

/// Everything needed to run a simulation on one mesh.
#[derive(Debug)]
pub struct SimulationSetup {
    pub labels: Vec<String>,
    pub areas: ContactAreas,
    pub model: ThermalModel,
    pub initial_temperature: Vec<f64>,
    pub time_grid: Vec<f64>,
    pub integrator: IntegratorSettings,
    pub equilibrium: NewtonSettings,
}

impl ThermalConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        debug!("Read configuration from {}", path.display());
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ConfigValidation {
            problems: vec![format!("malformed JSON: {e}")],
        })
    }

    /// Checks the configuration against a mesh of `n` segments.
    pub fn validate(&self, n: usize) -> Result<()> {
        let problems = self.problems(n);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigValidation { problems })
        }
    }

    /// Lists every missing or invalid field.
    pub fn problems(&self, n: usize) -> Vec<String> {
        let mut problems = Vec::new();

        match &self.emissivity {
            None => problems.push("emissivity: missing".to_string()),
            Some(v) => check_vector(
                &mut problems,
                "emissivity",
                v,
                n,
                |e| (0.0..=1.0).contains(&e),
                "must be in [0, 1]",
            ),
        }
        match &self.specific_heat {
            None => problems.push("specific_heat: missing".to_string()),
            Some(v) => check_vector(
                &mut problems,
                "specific_heat",
                v,
                n,
                |c| c > 0.0,
                "must be > 0",
            ),
        }
        match &self.initial_temperature {
            None => problems.push("initial_temperature: missing".to_string()),
            Some(v) => check_vector(
                &mut problems,
                "initial_temperature",
                v,
                n,
                |t| t >= 0.0,
                "must be >= 0 K",
            ),
        }
        match &self.conductivity {
            None => problems.push("conductivity: missing".to_string()),
            Some(c) => match c.to_matrix(n) {
                Err(p) => problems.push(p),
                Ok(m) => check_matrix(&mut problems, &m),
            },
        }
        match &self.contacts {
            None => problems.push("contacts: missing".to_string()),
            Some(planes) => problems.extend(plane_problems(planes, n)),
        }
        if !(self.contact_tolerance >= 0.0 && self.contact_tolerance.is_finite()) {
            problems.push(format!(
                "contact_tolerance: must be >= 0, got {}",
                self.contact_tolerance
            ));
        }
        if !(self.ambient_temperature >= 0.0 && self.ambient_temperature.is_finite()) {
            problems.push(format!(
                "ambient_temperature: must be >= 0 K, got {}",
                self.ambient_temperature
            ));
        }
        if let Err(p) = self.heat_source(n) {
            problems.push(p);
        }
        match &self.time_grid {
            None => problems.push("time_grid: missing".to_string()),
            Some(grid) => {
                if let Err(p) = grid.resolve() {
                    problems.push(p);
                }
            }
        }
        problems.extend(self.integrator.problems());
        if !(self.equilibrium.tolerance > 0.0) || self.equilibrium.max_iterations == 0 {
            problems.push("equilibrium: tolerance and max_iterations must be > 0".to_string());
        }

        problems
    }

    /// Compiles the source expressions for `n` segments.
    pub fn heat_source(&self, n: usize) -> std::result::Result<Box<dyn HeatSource>, String> {
        let Some(sources) = &self.source else {
            return Ok(Box::new(NoSource));
        };
        if sources.len() != n {
            return Err(format!("source: expected {n} entries, got {}", sources.len()));
        }
        let source = ExprSource::compile(sources).map_err(|(i, e)| format!("source[{i}]: {e}"))?;
        Ok(Box::new(source))
    }

    /// Validates against `mesh`, computes its areas and builds the model.
    pub fn prepare(&self, mesh: &SegmentedMesh) -> Result<SimulationSetup> {
        let n = mesh.segment_count();
        self.validate(n)?;

        let emissivity = required(&self.emissivity, "emissivity")?;
        let specific_heat = required(&self.specific_heat, "specific_heat")?;
        let conductivity = required(&self.conductivity, "conductivity")?;
        let contacts = required(&self.contacts, "contacts")?;
        let initial_temperature = required(&self.initial_temperature, "initial_temperature")?;
        let time_grid = required(&self.time_grid, "time_grid")?;

        let problem = |p: String| Error::ConfigValidation { problems: vec![p] };
        let conductivity = conductivity.to_matrix(n).map_err(problem)?;
        let time_grid = time_grid.resolve().map_err(problem)?;
        let source = self.heat_source(n).map_err(problem)?;

        let areas = ContactAreas::compute(mesh, contacts, self.contact_tolerance)?;
        let model =
            ThermalModel::from_areas(&areas, emissivity, specific_heat, &conductivity, source)?
                .with_ambient_temperature(self.ambient_temperature);

        info!(
            "Prepared {n} segments, {} samples over t = {} .. {}",
            time_grid.len(),
            time_grid[0],
            time_grid[time_grid.len() - 1]
        );

        Ok(SimulationSetup {
            labels: mesh.segment_names().into_iter().map(String::from).collect(),
            areas,
            model,
            initial_temperature: initial_temperature.clone(),
            time_grid,
            integrator: self.integrator,
            equilibrium: self.equilibrium,
        })
    }
}

fn required<'a, T>(field: &'a Option<T>, name: &str) -> Result<&'a T> {
    field.as_ref().ok_or_else(|| Error::ConfigValidation {
        problems: vec![format!("{name}: missing")],
    })
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

fn check_matrix(problems: &mut Vec<String>, matrix: &[Vec<f64>]) {
    for (i, row) in matrix.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if !v.is_finite() || v < 0.0 {
                problems.push(format!("conductivity[{i}][{j}]: must be finite and >= 0, got {v}"));
            } else if j > i && v != matrix[j][i] {
                problems.push(format!("conductivity: not symmetric at ({i}, {j})"));
            }
        }
    }
}
