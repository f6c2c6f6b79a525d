use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::sim::driver::Trajectory;

/// Writes `trajectory` as comma-separated rows with a `t,<labels...>` header.
pub fn write_trajectory_csv(path: &Path, trajectory: &Trajectory, labels: &[&str]) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    trajectory
        .write_csv(&mut writer, labels)
        .and_then(|_| writer.flush())
        .map_err(|e| Error::io(path, e))?;
    debug!("Wrote {} rows to {}", trajectory.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_write_trajectory_csv() -> anyhow::Result<()> {
        let mut traj = Trajectory::new();
        traj.push(0.0, vec![300.0]);
        traj.push(0.5, vec![299.5]);

        let dir = tempdir()?;
        let path = dir.path().join("out.csv");
        write_trajectory_csv(&path, &traj, &["box"])?;
        assert_eq!(fs::read_to_string(&path)?, "t,box\n0,300\n0.5,299.5\n");
        Ok(())
    }

    #[test]
    fn test_unwritable_path() {
        let traj = Trajectory::new();
        let res = write_trajectory_csv(Path::new("/nonexistent/dir/out.csv"), &traj, &[]);
        assert!(matches!(res, Err(Error::Io { .. })));
    }
}
