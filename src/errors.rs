//! This module contains all the specific error implementation for the crate
//!
//! Errors are split by the moment they can happen: while building a [`LinearSystem`],
//! while talking to an execution backend, or (wrapping both) while running a solve.
//!
//! Reaching the iteration cap or producing a non-finite residual is NOT an error:
//! those are terminal states reported inside a [`Solution`].
//!
//! [`LinearSystem`]: crate::system::LinearSystem
//! [`Solution`]: crate::solver::Solution

use thiserror::Error;

/// Raised while validating the shape and content of a linear system.
///
/// These are always reported before the first sweep.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("The system is empty, at least one unknown is needed")]
    Empty,
    #[error("Coefficient matrix has dimensions {rows}x{cols}, but it needs to be square")]
    NotSquare { rows: usize, cols: usize },
    #[error("Right hand side has length {len}, but the system has dimension {n}")]
    RhsMismatch { n: usize, len: usize },
    #[error("Initial guess has length {len}, but the system has dimension {n}")]
    GuessMismatch { n: usize, len: usize },
    #[error("Entry ({row}, {col}) is not a finite number")]
    NonFinite { row: usize, col: usize },
    #[error("Diagonal entry of row {row} is zero or too close to zero ({value:e})")]
    ZeroDiagonal { row: usize, value: f32 },
    #[error("Tolerance {0} needs to be a finite, non negative number")]
    InvalidTolerance(f32),
}

/// Raised by an execution backend.
///
/// `Unavailable` happens when the backend is built, all the others during a solve. None of them
/// is retried: the solve is aborted and its partial iterate is dropped.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Execution backend is not available: {0}")]
    Unavailable(String),
    #[error("Can't allocate {size} bytes for buffer {label:?} on the device: {reason}")]
    Allocation {
        label: String,
        size: u64,
        reason: String,
    },
    #[error("Dispatch of kernel {kernel:?} failed: {reason}")]
    Dispatch {
        kernel: &'static str,
        reason: String,
    },
    #[error("Reading back the output of kernel {kernel:?} failed: {reason}")]
    Readback {
        kernel: &'static str,
        reason: String,
    },
    #[error("Domain of {domain} rows needs {required} workgroups, but the device allows at most {limit} per dimension")]
    WorkgroupLimit {
        domain: usize,
        required: u64,
        limit: u32,
    },
    #[error("Backend {0:?} received a dispatch before the system was staged")]
    NotPrepared(String),
}

/// Everything that can make [`solve`](crate::solver::solve) fail instead of returning a [`Solution`](crate::solver::Solution).
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
