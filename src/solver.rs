//! The convergence driven iteration loop.
//!
//! A solve is a small state machine: it starts RUNNING with the residual of the initial guess,
//! and every iteration runs one full step of the [`Method`] through the backend, waits for all
//! the rows (the dispatch is a barrier), recomputes the residual and checks the [`Criteria`].
//! It ends either CONVERGED or ABORTED, see [`Status`].
//!
//! ```
//! use ndarray::array;
//! use wgpu_jacobi::backend::CpuBackend;
//! use wgpu_jacobi::solver::solve;
//! use wgpu_jacobi::system::LinearSystem;
//!
//! let system = LinearSystem::new(array![[2., -1.], [-1., 2.]], array![1., 0.]).unwrap();
//! let mut backend = CpuBackend::new();
//! let solution = pollster::block_on(solve(&system, &[0., 0.], 1e-4, 50, &mut backend)).unwrap();
//! assert!(solution.is_converged());
//! assert!((solution.iterate[0] - 2. / 3.).abs() < 1e-3);
//! ```

use ndarray::Array1;

use crate::algorithm::{Method, Workspace};
use crate::backend::{Backend, Staged};
use crate::convergence::{
    AbortReason, CancelToken, ConvergenceState, Criteria, MaxAbs, ResidualNorm, Status,
};
use crate::errors::{ConstructionError, SolveError};
use crate::kernel::Kernel;
use crate::system::LinearSystem;

/// Plain settings of a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Largest residual norm accepted as converged
    pub tolerance: f32,
    /// Number of sweeps after which the solve is aborted
    pub max_iterations: usize,
    pub method: Method,
    /// Keeps the `(iteration, residual)` pairs in [`Solution::trace`]
    pub record_trace: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            tolerance: 1e-4,
            max_iterations: 10_000,
            method: Method::Jacobi,
            record_trace: false,
        }
    }
}

/// Outcome of a solve which ran until a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: Status,
    /// Last iterate computed (the converged one, or the one the solve aborted on)
    pub iterate: Array1<f32>,
    pub state: ConvergenceState,
    /// `(iteration, residual)` pairs, from the initial guess on. Empty unless requested.
    pub trace: Vec<(usize, f32)>,
    /// Name of the norm the residuals are measured with
    pub norm: &'static str,
}

impl Solution {
    pub fn is_converged(&self) -> bool {
        self.status == Status::Converged
    }

    /// Why the solve was aborted, `None` if it converged
    pub fn reason(&self) -> Option<AbortReason> {
        match self.status {
            Status::Converged => None,
            Status::Aborted(reason) => Some(reason),
        }
    }

    /// Number of sweeps run
    pub fn iterations(&self) -> usize {
        self.state.iteration
    }

    /// Residual norm of [`Solution::iterate`]
    pub fn residual(&self) -> f32 {
        self.state.residual
    }
}

/// Builder over a [`SolverConfig`], the residual norm and the cancellation signal.
#[derive(Debug)]
pub struct Solver {
    config: SolverConfig,
    norm: Box<dyn ResidualNorm>,
    cancel: Option<CancelToken>,
}

impl Solver {
    /// A Jacobi solver with the max-abs residual norm
    pub fn new(tolerance: f32, max_iterations: usize) -> Self {
        Solver::from_config(SolverConfig {
            tolerance,
            max_iterations,
            ..SolverConfig::default()
        })
    }

    pub fn from_config(config: SolverConfig) -> Self {
        Solver {
            config,
            norm: Box::new(MaxAbs),
            cancel: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.config.method = method;
        self
    }

    /// Replaces the residual norm the tolerance is checked against
    pub fn norm<N: ResidualNorm + 'static>(mut self, norm: N) -> Self {
        self.norm = Box::new(norm);
        self
    }

    pub fn record_trace(mut self, record: bool) -> Self {
        self.config.record_trace = record;
        self
    }

    /// Lets the solve be stopped from outside, between two sweeps
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Runs the iteration loop from `initial_guess` until it converges or aborts.
    ///
    /// The backend is staged with the system before the first sweep, and released on return,
    /// whatever the outcome.
    ///
    /// # Errors
    /// - [`SolveError::Construction`] if the guess doesn't fit the system or the tolerance is
    ///   not a finite non negative number. Nothing has run yet.
    /// - [`SolveError::Backend`] if staging or a dispatch fails. The partial iterate is dropped.
    pub async fn solve<B: Backend>(
        &self,
        system: &LinearSystem,
        initial_guess: &[f32],
        backend: &mut B,
    ) -> Result<Solution, SolveError> {
        system.check_guess(initial_guess)?;
        let tolerance = self.config.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConstructionError::InvalidTolerance(tolerance).into());
        }
        let criteria = Criteria {
            tolerance,
            max_iterations: self.config.max_iterations,
        };
        let method = self.config.method;

        tracing::debug!(
            rows = system.dim(),
            backend = backend.name(),
            method = method.name(),
            norm = self.norm.name(),
            tolerance,
            max_iterations = criteria.max_iterations,
            "starting solve"
        );

        let mut backend = Staged::open(backend, system).await?;
        let mut workspace = Workspace::new(initial_guess);
        let mut trace = Vec::new();

        let mut state = ConvergenceState::start(
            self.residual(&mut *backend, system, &mut workspace)
                .await?,
        );
        let status = loop {
            self.record(&mut trace, &state);
            if let Some(status) = criteria.assess(&mut state, workspace.is_finite()) {
                break status;
            }
            if self.is_cancelled() {
                break Status::Aborted(AbortReason::Cancelled);
            }

            method
                .advance(&mut *backend, system, &mut workspace)
                .await?;
            state.residual = self
                .residual(&mut *backend, system, &mut workspace)
                .await?;
            state.iteration += 1;
        };
        drop(backend);

        match status {
            Status::Converged => tracing::debug!(
                iterations = state.iteration,
                residual = state.residual,
                "solve converged"
            ),
            Status::Aborted(reason) => tracing::info!(
                iterations = state.iteration,
                residual = state.residual,
                %reason,
                "solve aborted"
            ),
        }

        Ok(Solution {
            status,
            iterate: Array1::from(workspace.into_iterate()),
            state,
            trace,
            norm: self.norm.name(),
        })
    }

    /// Recomputes the residual of the current iterate and reduces it
    async fn residual<B: Backend>(
        &self,
        backend: &mut B,
        system: &LinearSystem,
        workspace: &mut Workspace,
    ) -> Result<f32, SolveError> {
        backend
            .dispatch(
                system,
                Kernel::Residual {
                    iterate: &workspace.current,
                },
                &mut workspace.residual,
            )
            .await?;
        Ok(self.norm.reduce(&workspace.residual))
    }

    fn record(&self, trace: &mut Vec<(usize, f32)>, state: &ConvergenceState) {
        tracing::trace!(iteration = state.iteration, residual = state.residual);
        if self.config.record_trace {
            trace.push((state.iteration, state.residual));
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// Solves `system` with Jacobi sweeps and the max-abs residual norm.
///
/// See [`Solver`] to pick another method, norm, or to record the residual trace.
pub async fn solve<B: Backend>(
    system: &LinearSystem,
    initial_guess: &[f32],
    tolerance: f32,
    max_iterations: usize,
    backend: &mut B,
) -> Result<Solution, SolveError> {
    Solver::new(tolerance, max_iterations)
        .solve(system, initial_guess, backend)
        .await
}
