//! Lumped heat exchange between mesh segments.

pub mod config;
pub mod expr;
pub mod model;
pub mod source;
pub mod steady;

pub use config::{Conductivity, SimulationSetup, ThermalConfig, TimeGrid};
pub use model::{REFERENCE_TEMPERATURE, STEFAN_BOLTZMANN_SCALED, ThermalModel};
pub use source::{ExprSource, HeatSource, NoSource};
pub use steady::NewtonSettings;
