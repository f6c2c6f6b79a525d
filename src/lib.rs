pub mod error;
pub mod geom;
pub mod io;
pub mod sim;

// Prelude
pub use error::{Error, Result};
pub use geom::contact::{Axis, ContactAreas, ContactPlane};
pub use geom::mesh::{Segment, SegmentedMesh};
pub use geom::point::Point;
pub use geom::triangles::{TriangleIndex, triangle_area};
pub use geom::vector::Vector;
pub use io::{parse_obj, read_obj, write_trajectory_csv};
pub use sim::driver::{Simulation, Trajectory, integrate};
pub use sim::ode::{IntegratorSettings, OdeSystem};
pub use sim::thermal::{HeatSource, NewtonSettings, ThermalConfig, ThermalModel};
