//! Execution backends: where the row kernels actually run.
//!
//! A [`Backend`] is a caller owned execution context. It is handed to the solver by mutable
//! reference, so the same backend (and, for the accelerator, the same device and compiled
//! pipelines) can serve many solves one after the other.
//!
//! For every solve the backend goes through `prepare -> dispatch* -> release`:
//! - [`Backend::prepare`] stages the read-only system (device buffers, bind groups, ...)
//! - [`Backend::dispatch`] runs one kernel over all the rows and blocks until the whole output
//!   is back in host memory
//! - [`Backend::release`] frees whatever `prepare` allocated. The solver calls it on every exit
//!   path, errors included.

use std::ops::{Deref, DerefMut};

use crate::errors::BackendError;
use crate::kernel::Kernel;
use crate::system::LinearSystem;

pub mod accelerator;
pub mod cpu;

pub use accelerator::{AcceleratorBackend, AcceleratorConfig};
pub use cpu::CpuBackend;

/// Runs `n` independent row computations and returns their outputs.
///
/// Implementations must not retry a failed dispatch, and must not leave a partially written
/// `output` looking like a valid result: on error the caller throws it away.
#[allow(async_fn_in_trait)]
pub trait Backend {
    /// A short name for logs
    fn name(&self) -> &str;

    /// Stages the system for the dispatches to come.
    async fn prepare(&mut self, system: &LinearSystem) -> Result<(), BackendError>;

    /// Evaluates `kernel` for every row of `system`, writing row `i` into `output[i]`.
    ///
    /// `output` and the kernel input have the dimension of the system.
    async fn dispatch(
        &mut self,
        system: &LinearSystem,
        kernel: Kernel<'_>,
        output: &mut [f32],
    ) -> Result<(), BackendError>;

    /// Frees the resources allocated by [`Backend::prepare`]. Calling it twice is harmless.
    fn release(&mut self);
}

/// Checks the sizes of a dispatch against the system.
pub(crate) fn check_domain(
    system: &LinearSystem,
    kernel: &Kernel<'_>,
    output: &[f32],
) -> Result<(), BackendError> {
    let n = system.dim();
    if kernel.input().len() != n || output.len() != n {
        return Err(BackendError::Dispatch {
            kernel: kernel.entry_point(),
            reason: format!(
                "domain mismatch: system has {} rows, input has {}, output has {}",
                n,
                kernel.input().len(),
                output.len()
            ),
        });
    }
    Ok(())
}

/// A backend with a system staged on it, released when dropped.
pub(crate) struct Staged<'b, B: Backend> {
    backend: &'b mut B,
}

impl<'b, B: Backend> Staged<'b, B> {
    pub(crate) async fn open(
        backend: &'b mut B,
        system: &LinearSystem,
    ) -> Result<Staged<'b, B>, BackendError> {
        let mut staged = Staged { backend };
        // a failing prepare is released by the drop of `staged`
        staged.backend.prepare(system).await?;
        Ok(staged)
    }
}

impl<B: Backend> Deref for Staged<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: Backend> DerefMut for Staged<'_, B> {
    fn deref_mut(&mut self) -> &mut B {
        self.backend
    }
}

impl<B: Backend> Drop for Staged<'_, B> {
    fn drop(&mut self) {
        tracing::debug!(backend = self.backend.name(), "releasing staged system");
        self.backend.release();
    }
}
