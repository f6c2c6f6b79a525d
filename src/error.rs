//! Error types shared by the loader, the area calculator and the solver.

use std::path::PathBuf;

use thiserror::Error;

use crate::sim::thermal::expr::ExprError;

/// Errors reported by this crate.
///
/// Every failure in the core surfaces as one of these variants; nothing is
/// silently replaced by a default value.
#[derive(Debug, Error)]
pub enum Error {
    /// A file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mesh source is syntactically or referentially broken.
    ///
    /// `line` is 1-based; `content` is the offending line as read.
    #[error("malformed mesh at line {line}: {reason} (`{content}`)")]
    MalformedMesh {
        line: usize,
        content: String,
        reason: String,
    },

    /// Subtracting contact areas left a segment with negative exposed area.
    #[error("segment {segment} has negative exposed area {area}")]
    NegativeArea { segment: usize, area: f64 },

    /// One or more configuration fields are missing or invalid.
    #[error("invalid configuration: {}", problems.join("; "))]
    ConfigValidation { problems: Vec<String> },

    /// An expression could not be compiled or evaluated.
    #[error(transparent)]
    Expression(#[from] ExprError),

    /// The thermal equations left their valid numerical domain.
    #[error("numerical domain error in segment {segment} at t={time}: {reason} (value {value})")]
    NumericalDomain {
        segment: usize,
        time: f64,
        value: f64,
        reason: &'static str,
    },

    /// A linear system had no usable pivot.
    #[error("singular matrix (pivot too small) at column {column}")]
    SingularSystem { column: usize },

    /// An iterative solve stopped before reaching its tolerance.
    #[error("no convergence after {iterations} iterations (residual {residual})")]
    NoConvergence { iterations: usize, residual: f64 },

    /// The ODE integrator could not make progress.
    #[error("integration failed at t={time}: {reason}")]
    Integration { time: f64, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(line: usize, content: &str, reason: impl Into<String>) -> Self {
        Self::MalformedMesh {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_lists_every_problem() {
        let err = Error::ConfigValidation {
            problems: vec!["emissivity: missing".into(), "specific_heat[2]: must be > 0".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("emissivity: missing"));
        assert!(msg.contains("specific_heat[2]"));
    }

    #[test]
    fn test_malformed_mesh_reports_line() {
        let err = Error::malformed(12, "v 1.0 abc 2.0", "invalid coordinate");
        let msg = err.to_string();
        assert!(msg.contains("line 12"));
        assert!(msg.contains("v 1.0 abc 2.0"));
    }
}
