//! The iteration rules: how one iterate is turned into the next one.
//!
//! The work of a rule goes through a [`Backend`] as row kernels; what is left on the host is
//! O(n) (a swap, a couple of dot products).

use crate::backend::Backend;
use crate::errors::BackendError;
use crate::kernel::Kernel;
use crate::system::LinearSystem;

/// Iterative method used by the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// Jacobi sweeps: every row is updated from the previous iterate only.
    ///
    /// Converges for strictly diagonally dominant systems.
    #[default]
    Jacobi,
    /// Steepest descent along the residual: `x <- x + s·r` with `s = (r·r)/(r·Ar)`.
    ///
    /// Converges for symmetric positive definite systems.
    SteepestDescent,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Jacobi => "jacobi",
            Method::SteepestDescent => "steepest-descent",
        }
    }

    /// Computes the next iterate into `workspace`, and makes it the current one.
    ///
    /// `workspace.residual` must hold the residual of the current iterate (the solver keeps it
    /// up to date); it is NOT updated here.
    pub(crate) async fn advance<B: Backend>(
        &self,
        backend: &mut B,
        system: &LinearSystem,
        workspace: &mut Workspace,
    ) -> Result<(), BackendError> {
        match self {
            Method::Jacobi => {
                backend
                    .dispatch(
                        system,
                        Kernel::Jacobi {
                            previous: &workspace.current,
                        },
                        &mut workspace.next,
                    )
                    .await?;
            }
            Method::SteepestDescent => {
                backend
                    .dispatch(
                        system,
                        Kernel::MatVec {
                            vector: &workspace.residual,
                        },
                        &mut workspace.scratch,
                    )
                    .await?;
                let step = descent_step(&workspace.residual, &workspace.scratch);
                for ((next, x), r) in workspace
                    .next
                    .iter_mut()
                    .zip(&workspace.current)
                    .zip(&workspace.residual)
                {
                    *next = x + step * r;
                }
            }
        }
        workspace.swap();
        Ok(())
    }
}

/// `(r·r)/(r·Ar)`, accumulated in `f64`
///
/// A vanishing denominator gives an infinite (or NaN) step, which the solver reports as a
/// non-finite residual.
fn descent_step(residual: &[f32], a_residual: &[f32]) -> f32 {
    let (rr, rar) = residual
        .iter()
        .zip(a_residual)
        .fold((0f64, 0f64), |(rr, rar), (r, ar)| {
            let r = *r as f64;
            (rr + r * r, rar + r * *ar as f64)
        });
    (rr / rar) as f32
}

/// Host buffers reused by every iteration of a solve.
///
/// `current` and `next` are swapped at the end of each step, so the buffer holding the old
/// iterate is recycled as the next output instead of being reallocated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Workspace {
    pub(crate) current: Vec<f32>,
    pub(crate) next: Vec<f32>,
    pub(crate) residual: Vec<f32>,
    pub(crate) scratch: Vec<f32>,
}

impl Workspace {
    pub(crate) fn new(initial_guess: &[f32]) -> Self {
        let n = initial_guess.len();
        Workspace {
            current: initial_guess.to_vec(),
            next: vec![0.0; n],
            residual: vec![0.0; n],
            scratch: vec![0.0; n],
        }
    }

    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    /// Whether every component of the current iterate and of its residual is finite
    pub(crate) fn is_finite(&self) -> bool {
        self.current
            .iter()
            .chain(&self.residual)
            .all(|value| value.is_finite())
    }

    pub(crate) fn into_iterate(self) -> Vec<f32> {
        self.current
    }
}
