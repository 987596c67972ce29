//! Row kernels: the unit of parallel dispatch.
//!
//! Every kernel computes ONE output slot from read-only inputs (the system and one host
//! vector), so all the rows of a dispatch can run concurrently and in any order.
//! The same formulas are implemented in WGSL in `shaders/sweep.wgsl` for the accelerator.

use crate::system::LinearSystem;

/// A row-parallel operation on a [`LinearSystem`] together with the vector it reads.
///
/// The output always has the dimension of the system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel<'a> {
    /// One Jacobi sweep: `x_next[i] = (b[i] - Σ_{j≠i} A[i,j]·x_prev[j]) / A[i,i]`
    ///
    /// It only reads the previous iterate, never the output buffer.
    Jacobi { previous: &'a [f32] },
    /// Matrix vector product: `y[i] = Σ_j A[i,j]·v[j]`
    MatVec { vector: &'a [f32] },
    /// Residual of an iterate: `r[i] = b[i] - Σ_j A[i,j]·x[j]`
    Residual { iterate: &'a [f32] },
}

impl<'a> Kernel<'a> {
    /// Name of the WGSL entry point implementing this kernel, also used in logs and errors.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Kernel::Jacobi { .. } => "jacobi",
            Kernel::MatVec { .. } => "matvec",
            Kernel::Residual { .. } => "residual",
        }
    }

    /// The host vector read by the kernel, which is what gets staged on a device before a dispatch.
    pub fn input(&self) -> &'a [f32] {
        match *self {
            Kernel::Jacobi { previous } => previous,
            Kernel::MatVec { vector } => vector,
            Kernel::Residual { iterate } => iterate,
        }
    }

    /// Evaluates the kernel for a single row.
    ///
    /// Pure: reads `system` and the kernel input only.
    ///
    /// # Panics
    /// If `row` is out of the system's range or the input has the wrong length.
    pub fn evaluate(&self, system: &LinearSystem, row: usize) -> f32 {
        match *self {
            Kernel::Jacobi { previous } => jacobi_row(system, previous, row),
            Kernel::MatVec { vector } => row_dot(system, vector, row),
            Kernel::Residual { iterate } => residual_row(system, iterate, row),
        }
    }
}

/// Updated value of row `i` for one Jacobi sweep.
///
/// # Example
/// ```
/// use ndarray::array;
/// use wgpu_jacobi::kernel::jacobi_row;
/// use wgpu_jacobi::system::LinearSystem;
///
/// let system = LinearSystem::new(array![[2., -1.], [-1., 2.]], array![1., 0.]).unwrap();
/// assert_eq!(jacobi_row(&system, &[0., 0.], 0), 0.5);
/// assert_eq!(jacobi_row(&system, &[0.5, 0.], 1), 0.25);
/// ```
pub fn jacobi_row(system: &LinearSystem, previous: &[f32], i: usize) -> f32 {
    let coefficients = system.row(i);
    let mut sum = 0.0f32;
    for (j, (a, x)) in coefficients.iter().zip(previous).enumerate() {
        if j != i {
            sum += a * x;
        }
    }
    (system.rhs()[i] - sum) / coefficients[i]
}

/// `Σ_j A[i,j]·v[j]`
pub fn row_dot(system: &LinearSystem, vector: &[f32], i: usize) -> f32 {
    system
        .row(i)
        .iter()
        .zip(vector)
        .fold(0.0f32, |sum, (a, v)| sum + a * v)
}

/// `b[i] - Σ_j A[i,j]·x[j]`
pub fn residual_row(system: &LinearSystem, iterate: &[f32], i: usize) -> f32 {
    system.rhs()[i] - row_dot(system, iterate, i)
}

#[cfg(test)]
mod kernel_tests {
    use super::*;
    use ndarray::array;

    fn system() -> LinearSystem {
        LinearSystem::new(
            array![[4., -1., 0.], [-1., 4., -1.], [0., -1., 4.]],
            array![2., 4., 10.],
        )
        .unwrap()
    }

    #[test]
    fn jacobi_reads_only_the_previous_iterate() {
        let system = system();
        let previous = [1., 1., 1.];
        let next: Vec<f32> = (0..3)
            .map(|i| Kernel::Jacobi { previous: &previous }.evaluate(&system, i))
            .collect();
        assert_eq!(next, vec![0.75, 1.5, 2.75]);

        // evaluation order doesn't matter
        let reversed: Vec<f32> = (0..3)
            .rev()
            .map(|i| jacobi_row(&system, &previous, i))
            .collect();
        assert_eq!(reversed, vec![2.75, 1.5, 0.75]);
    }

    #[test]
    fn exact_solution_is_a_fixed_point() {
        let system = system();
        let solution = [1., 2., 3.];
        for i in 0..3 {
            assert_eq!(jacobi_row(&system, &solution, i), solution[i]);
            assert_eq!(residual_row(&system, &solution, i), 0.);
        }
    }

    #[test]
    fn matvec_and_residual() {
        let system = system();
        let v = [1., 0., -1.];
        let product: Vec<f32> = (0..3).map(|i| row_dot(&system, &v, i)).collect();
        assert_eq!(product, vec![4., 0., -4.]);

        let kernel = Kernel::Residual { iterate: &v };
        let residual: Vec<f32> = (0..3).map(|i| kernel.evaluate(&system, i)).collect();
        assert_eq!(residual, vec![-2., 4., 14.]);
        assert_eq!(kernel.entry_point(), "residual");
        assert_eq!(kernel.input(), &v);
    }
}
