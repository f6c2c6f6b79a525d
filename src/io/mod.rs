//! File I/O for meshes and simulation results.

pub mod csv;
pub mod obj;

pub use csv::write_trajectory_csv;
pub use obj::{parse_obj, read_obj};
