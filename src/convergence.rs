//! How "converged" and "diverged" are decided.
//!
//! The residual `r = b - A·x` is reduced to a single number by a [`ResidualNorm`]. The default is
//! [`MaxAbs`] (infinity norm, the worst row), [`L2`] can be plugged in instead: for the same
//! tolerance the two give different iteration counts.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reduces a residual vector to the scalar compared against the tolerance.
///
/// Implementations must propagate NaN: a NaN component gives a NaN norm.
pub trait ResidualNorm: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn reduce(&self, residual: &[f32]) -> f32;
}

/// `max_i |r_i|`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxAbs;

/// `sqrt(Σ r_i²)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L2;

impl ResidualNorm for MaxAbs {
    fn name(&self) -> &'static str {
        "max-abs"
    }

    fn reduce(&self, residual: &[f32]) -> f32 {
        let mut max = 0.0f32;
        for value in residual {
            // f32::max would swallow NaN
            if value.is_nan() {
                return f32::NAN;
            }
            max = max.max(value.abs());
        }
        max
    }
}

impl ResidualNorm for L2 {
    fn name(&self) -> &'static str {
        "l2"
    }

    fn reduce(&self, residual: &[f32]) -> f32 {
        residual
            .iter()
            .map(|value| (*value as f64) * (*value as f64))
            .sum::<f64>()
            .sqrt() as f32
    }
}

/// Why a solve stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The iteration cap was reached with the residual still above tolerance.
    MaxIterationsExceeded,
    /// A component of the iterate or of the residual became NaN or infinite.
    NonFiniteResidual,
    /// The [`CancelToken`] was triggered.
    Cancelled,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::MaxIterationsExceeded => "max-iterations-exceeded",
            AbortReason::NonFiniteResidual => "non-finite-residual",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of the iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Converged,
    Aborted(AbortReason),
}

/// Progress of a solve, updated after every sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceState {
    /// Number of completed sweeps.
    pub iteration: usize,
    /// Norm of the residual of the current iterate.
    pub residual: f32,
    pub converged: bool,
    pub diverged: bool,
}

impl ConvergenceState {
    /// State before any sweep, from the residual of the initial guess.
    pub fn start(residual: f32) -> Self {
        ConvergenceState {
            iteration: 0,
            residual,
            converged: false,
            diverged: false,
        }
    }
}

/// Stopping criteria: tolerance on the residual norm and a mandatory iteration cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub tolerance: f32,
    pub max_iterations: usize,
}

impl Criteria {
    /// Decides whether the loop stops at `state`.
    ///
    /// The checks run in this order: non-finite values, tolerance, iteration cap. Returns
    /// `None` while the loop should keep running, and flags `state` accordingly otherwise.
    ///
    /// # Example
    /// ```
    /// use wgpu_jacobi::convergence::{AbortReason, ConvergenceState, Criteria, Status};
    ///
    /// let criteria = Criteria { tolerance: 1e-3, max_iterations: 10 };
    /// let mut state = ConvergenceState::start(0.5);
    /// assert_eq!(criteria.assess(&mut state, true), None);
    ///
    /// state.iteration = 10;
    /// assert_eq!(
    ///     criteria.assess(&mut state, true),
    ///     Some(Status::Aborted(AbortReason::MaxIterationsExceeded))
    /// );
    /// ```
    pub fn assess(&self, state: &mut ConvergenceState, finite: bool) -> Option<Status> {
        if !finite || !state.residual.is_finite() {
            state.diverged = true;
            return Some(Status::Aborted(AbortReason::NonFiniteResidual));
        }
        if state.residual <= self.tolerance {
            state.converged = true;
            return Some(Status::Converged);
        }
        if state.iteration >= self.max_iterations {
            return Some(Status::Aborted(AbortReason::MaxIterationsExceeded));
        }
        None
    }
}

/// Cancellation signal shared between the caller and a running solve.
///
/// The solver looks at it between sweeps only, so a cancel takes effect at the next barrier.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod convergence_tests {
    use super::*;

    #[test]
    fn norms() {
        let residual = [3., -4., 0.];
        assert_eq!(MaxAbs.reduce(&residual), 4.);
        assert_eq!(L2.reduce(&residual), 5.);
        assert_eq!(MaxAbs.reduce(&[]), 0.);
        assert!(MaxAbs.reduce(&[1., f32::NAN, 2.]).is_nan());
        assert!(L2.reduce(&[1., f32::NAN]).is_nan());
        assert_eq!(MaxAbs.reduce(&[1., f32::NEG_INFINITY]), f32::INFINITY);
    }

    #[test]
    fn non_finite_wins_over_everything() {
        let criteria = Criteria {
            tolerance: 1.,
            max_iterations: 0,
        };
        let mut state = ConvergenceState::start(0.);
        assert_eq!(
            criteria.assess(&mut state, false),
            Some(Status::Aborted(AbortReason::NonFiniteResidual))
        );
        assert!(state.diverged && !state.converged);

        let mut state = ConvergenceState::start(f32::NAN);
        assert_eq!(
            criteria.assess(&mut state, true),
            Some(Status::Aborted(AbortReason::NonFiniteResidual))
        );
    }

    #[test]
    fn tolerance_is_inclusive_and_checked_before_the_cap() {
        let criteria = Criteria {
            tolerance: 0.25,
            max_iterations: 3,
        };
        let mut state = ConvergenceState::start(0.25);
        state.iteration = 3;
        assert_eq!(criteria.assess(&mut state, true), Some(Status::Converged));
        assert!(state.converged);
    }

    #[test]
    fn reasons_have_stable_names() {
        assert_eq!(
            AbortReason::MaxIterationsExceeded.to_string(),
            "max-iterations-exceeded"
        );
        assert_eq!(AbortReason::NonFiniteResidual.to_string(), "non-finite-residual");
        assert_eq!(AbortReason::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
