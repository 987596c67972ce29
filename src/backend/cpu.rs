//! Thread parallel CPU backend on top of [`rayon`].

use rayon::prelude::*;

use super::{check_domain, Backend};
use crate::errors::BackendError;
use crate::kernel::Kernel;
use crate::system::LinearSystem;

/// Rows handed to a rayon task at least, so small systems don't pay for task splitting
const DEFAULT_MIN_ROWS_PER_TASK: usize = 16;

/// Evaluates the rows of a kernel on a rayon thread pool.
///
/// Every row writes its own slot of the output, so no locking is involved: the output slice is
/// split in disjoint chunks between the worker threads.
#[derive(Debug)]
pub struct CpuBackend {
    pool: Option<rayon::ThreadPool>,
    min_rows_per_task: usize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    /// Runs on rayon's global thread pool.
    pub fn new() -> Self {
        CpuBackend {
            pool: None,
            min_rows_per_task: DEFAULT_MIN_ROWS_PER_TASK,
        }
    }

    /// Runs on a dedicated pool of `threads` workers (`0` lets rayon pick).
    ///
    /// # Errors
    /// [`BackendError::Unavailable`] if the pool can't be spawned.
    pub fn with_threads(threads: usize) -> Result<Self, BackendError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("jacobi-cpu-{index}"))
            .build()
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;
        Ok(CpuBackend {
            pool: Some(pool),
            min_rows_per_task: DEFAULT_MIN_ROWS_PER_TASK,
        })
    }

    /// Sets the minimum number of rows evaluated by a single task.
    pub fn min_rows_per_task(mut self, rows: usize) -> Self {
        self.min_rows_per_task = rows.max(1);
        self
    }

    /// Number of worker threads the rows are spread on.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &str {
        "cpu-parallel"
    }

    async fn prepare(&mut self, system: &LinearSystem) -> Result<(), BackendError> {
        // the system is read in place, nothing to stage
        tracing::debug!(
            rows = system.dim(),
            threads = self.threads(),
            "cpu backend ready"
        );
        Ok(())
    }

    async fn dispatch(
        &mut self,
        system: &LinearSystem,
        kernel: Kernel<'_>,
        output: &mut [f32],
    ) -> Result<(), BackendError> {
        check_domain(system, &kernel, output)?;

        let min_len = self.min_rows_per_task;
        let mut sweep = || {
            output
                .par_iter_mut()
                .with_min_len(min_len)
                .enumerate()
                .for_each(|(row, slot)| *slot = kernel.evaluate(system, row));
        };
        match &self.pool {
            Some(pool) => pool.install(sweep),
            None => sweep(),
        }
        Ok(())
    }

    fn release(&mut self) {}
}
