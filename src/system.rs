//! The dense linear system `A x = b` handed to the solver.
//!
//! A [`LinearSystem`] is validated once when it's built and never mutated afterwards, so the
//! row kernels can read it from any number of threads (or copy it to a device) without locking.

use crate::errors::ConstructionError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Immutable description of a square system `A x = b`.
///
/// Invariants checked by [`LinearSystem::new`]:
/// - `A` is square and not empty, `b` has the same dimension
/// - every entry is finite
/// - every diagonal entry is non-zero (relative to the size of its row)
///
/// The matrix is kept in standard (row major) layout, which is also the layout the
/// accelerator backend copies to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    matrix: Array2<f32>,
    rhs: Array1<f32>,
}

impl LinearSystem {
    /// Builds a system from the coefficient matrix and the right hand side.
    ///
    /// # Errors
    /// Any [`ConstructionError`] but `GuessMismatch`, which is checked by the solver.
    ///
    /// # Example
    /// ```
    /// use ndarray::array;
    /// use wgpu_jacobi::system::LinearSystem;
    ///
    /// let system = LinearSystem::new(array![[2., -1.], [-1., 2.]], array![1., 0.]).unwrap();
    /// assert_eq!(system.dim(), 2);
    ///
    /// assert!(LinearSystem::new(array![[0., 1.], [1., 2.]], array![1., 0.]).is_err());
    /// ```
    pub fn new(matrix: Array2<f32>, rhs: Array1<f32>) -> Result<Self, ConstructionError> {
        let (rows, cols) = matrix.dim();
        if rows == 0 || cols == 0 {
            return Err(ConstructionError::Empty);
        }
        if rows != cols {
            return Err(ConstructionError::NotSquare { rows, cols });
        }
        if rhs.len() != rows {
            return Err(ConstructionError::RhsMismatch {
                n: rows,
                len: rhs.len(),
            });
        }

        for ((row, col), value) in matrix.indexed_iter() {
            if !value.is_finite() {
                return Err(ConstructionError::NonFinite { row, col });
            }
        }
        // the right hand side is reported as an extra column
        if let Some(row) = rhs.iter().position(|value| !value.is_finite()) {
            return Err(ConstructionError::NonFinite { row, col: cols });
        }

        for (row, coefficients) in matrix.outer_iter().enumerate() {
            let diagonal = coefficients[row];
            let scale = coefficients
                .iter()
                .fold(0.0f32, |acc, value| acc.max(value.abs()));
            if diagonal == 0.0 || diagonal.abs() <= f32::EPSILON * scale {
                return Err(ConstructionError::ZeroDiagonal {
                    row,
                    value: diagonal,
                });
            }
        }

        let matrix = if matrix.is_standard_layout() {
            matrix
        } else {
            matrix.as_standard_layout().into_owned()
        };

        Ok(LinearSystem { matrix, rhs })
    }

    /// Builds the finite difference system of the steady 1-D diffusion equation on `n` nodes.
    ///
    /// The matrix is the tridiagonal `[-1, 2, -1]` band, and the boundary values end up in the
    /// first and last entries of the right hand side.
    ///
    /// # Errors
    /// [`ConstructionError::Empty`] if `n == 0`, [`ConstructionError::NonFinite`] for non-finite
    /// boundary values.
    pub fn diffusion_1d(n: usize, left: f32, right: f32) -> Result<Self, ConstructionError> {
        if n == 0 {
            return Err(ConstructionError::Empty);
        }
        let mut matrix = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            matrix[[i, i]] = 2.0;
            if i > 0 {
                matrix[[i, i - 1]] = -1.0;
            }
            if i + 1 < n {
                matrix[[i, i + 1]] = -1.0;
            }
        }
        let mut rhs = Array1::<f32>::zeros(n);
        rhs[0] += left;
        rhs[n - 1] += right;

        LinearSystem::new(matrix, rhs)
    }

    /// Number of unknowns.
    pub fn dim(&self) -> usize {
        self.rhs.len()
    }

    pub fn matrix(&self) -> ArrayView2<'_, f32> {
        self.matrix.view()
    }

    pub fn rhs(&self) -> ArrayView1<'_, f32> {
        self.rhs.view()
    }

    /// Coefficients of row `i`, `A[i, ..]`.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f32> {
        self.matrix.row(i)
    }

    /// Checks `A[i,i]` against the largest off-diagonal row sum.
    ///
    /// Strict diagonal dominance is a sufficient condition for Jacobi to converge.
    pub fn is_diagonally_dominant(&self) -> bool {
        self.matrix.outer_iter().enumerate().all(|(i, row)| {
            let off_diagonal: f32 = row
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, value)| value.abs())
                .sum();
            row[i].abs() > off_diagonal
        })
    }

    /// Checks that an initial guess fits the system.
    pub(crate) fn check_guess(&self, guess: &[f32]) -> Result<(), ConstructionError> {
        if guess.len() != self.dim() {
            return Err(ConstructionError::GuessMismatch {
                n: self.dim(),
                len: guess.len(),
            });
        }
        if let Some(row) = guess.iter().position(|value| !value.is_finite()) {
            return Err(ConstructionError::NonFinite { row, col: 0 });
        }
        Ok(())
    }
}
