//! External heat source terms.

use std::cell::RefCell;

use super::expr::{ExprError, Formula, StateContext};
use crate::error::Result;

/// Heat injected into (positive) or extracted from (negative) each segment.
///
/// Implementations must write one value per segment into `out`. The term
/// may depend on time and on the current temperatures.
pub trait HeatSource {
    fn heat(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<()>;

    /// Number of segments the source was written for, if fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Zero source term.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSource;

impl HeatSource for NoSource {
    fn heat(&self, _t: f64, _y: &[f64], out: &mut [f64]) -> Result<()> {
        out.fill(0.0);
        Ok(())
    }
}

/// Source term given as one compiled formula per segment.
#[derive(Debug)]
pub struct ExprSource {
    terms: Vec<Formula>,
    context: RefCell<StateContext>,
}

impl ExprSource {
    /// Compiles one formula per segment with `t` and `y1`..`yN` in scope.
    ///
    /// On failure returns the index of the offending formula.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> std::result::Result<Self, (usize, ExprError)> {
        let n = sources.len();
        let terms = sources
            .iter()
            .enumerate()
            .map(|(i, s)| Formula::compile(s.as_ref(), n).map_err(|e| (i, e)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let context = StateContext::new(n).map_err(|e| (0, e))?;
        Ok(Self {
            terms,
            context: RefCell::new(context),
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl HeatSource for ExprSource {
    fn heat(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<()> {
        let mut context = self.context.borrow_mut();
        for (o, term) in out.iter_mut().zip(&self.terms) {
            *o = term.eval(&mut context, t, y)?;
        }
        Ok(())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.terms.len())
    }
}

impl<F> HeatSource for F
where
    F: Fn(f64, &[f64], &mut [f64]),
{
    fn heat(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<()> {
        self(t, y, out);
        Ok(())
    }
}
