use crate::algorithm::Method;
use crate::backend::{Backend, CpuBackend};
use crate::convergence::{AbortReason, CancelToken, Status};
use crate::errors::{BackendError, ConstructionError};
use crate::kernel::Kernel;
use crate::solver::{solve, Solver};
use crate::system::LinearSystem;
use ndarray::{array, Array1, Array2};

/// Strictly diagonally dominant system with a pseudo random off-diagonal pattern
fn dominant_system(n: usize) -> LinearSystem {
    let mut matrix = Array2::<f32>::zeros((n, n));
    for i in 0..n {
        let mut off_diagonal = 0.0;
        for j in 0..n {
            if i != j {
                let value = ((i * 7 + j * 3) % 5) as f32 - 2.0;
                matrix[[i, j]] = value;
                off_diagonal += value.abs();
            }
        }
        matrix[[i, i]] = off_diagonal + 1.0;
    }
    let rhs = Array1::from_iter((0..n).map(|i| i as f32 - 3.0));
    LinearSystem::new(matrix, rhs).unwrap()
}

#[tokio::test]
async fn two_by_two_boundary_case() {
    let system = LinearSystem::new(array![[2., -1.], [-1., 2.]], array![1., 0.]).unwrap();
    let solution = solve(&system, &[0., 0.], 1e-4, 50, &mut CpuBackend::new())
        .await
        .unwrap();

    assert_eq!(solution.status, Status::Converged);
    assert!(solution.iterations() < 50);
    assert!(solution.residual() <= 1e-4);
    assert!((solution.iterate[0] - 2. / 3.).abs() < 1e-3);
    assert!((solution.iterate[1] - 1. / 3.).abs() < 1e-3);
}

#[test]
fn zero_diagonal_fails_before_solving() {
    let err = LinearSystem::new(array![[0., 1.], [1., 1.]], array![1., 1.]).unwrap_err();
    assert!(matches!(err, ConstructionError::ZeroDiagonal { row: 0, .. }));
}

#[tokio::test]
async fn dominant_systems_converge_deterministically() {
    for n in [3, 8, 17] {
        let system = dominant_system(n);
        assert!(system.is_diagonally_dominant());
        let guess = vec![0.; n];

        let first = solve(&system, &guess, 1e-4, 2_000, &mut CpuBackend::new())
            .await
            .unwrap();
        let second = solve(&system, &guess, 1e-4, 2_000, &mut CpuBackend::with_threads(2).unwrap())
            .await
            .unwrap();

        assert!(first.is_converged(), "n = {n}: {:?}", first.status);
        assert_eq!(first.iterations(), second.iterations());
        assert_eq!(first.iterate, second.iterate);
    }
}

#[tokio::test]
async fn converged_iterate_is_a_fixed_point() {
    let system = dominant_system(8);
    let mut backend = CpuBackend::new();
    let first = solve(&system, &vec![0.; 8], 1e-4, 2_000, &mut backend)
        .await
        .unwrap();
    let guess = first.iterate.to_vec();
    let again = solve(&system, &guess, 1e-4, 2_000, &mut backend)
        .await
        .unwrap();

    assert!(again.is_converged());
    assert!(again.iterations() <= 1);
}

#[tokio::test]
async fn max_residual_never_increases() {
    // constant diagonal and symmetric: the residual contracts by 1/2 in max norm at each sweep
    let n = 20;
    let mut matrix = Array2::<f32>::zeros((n, n));
    for i in 0..n {
        matrix[[i, i]] = 4.;
        if i > 0 {
            matrix[[i, i - 1]] = -1.;
            matrix[[i - 1, i]] = -1.;
        }
    }
    let system = LinearSystem::new(matrix, Array1::ones(n)).unwrap();

    let solution = Solver::new(1e-5, 500)
        .record_trace(true)
        .solve(&system, &vec![0.; n], &mut CpuBackend::new())
        .await
        .unwrap();

    assert!(solution.is_converged());
    assert!(solution.trace.len() > 2);
    for pair in solution.trace.windows(2) {
        assert!(
            pair[1].1 <= pair[0].1 + 1e-6,
            "residual went up: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn oscillating_system_hits_the_iteration_cap() {
    // the Jacobi iteration matrix is a rotation: the iterate cycles forever
    let system = LinearSystem::new(array![[1., -1.], [1., 1.]], array![0., 2.]).unwrap();
    assert!(!system.is_diagonally_dominant());

    let solution = solve(&system, &[0., 0.], 1e-4, 100, &mut CpuBackend::new())
        .await
        .unwrap();

    assert_eq!(
        solution.status,
        Status::Aborted(AbortReason::MaxIterationsExceeded)
    );
    assert_eq!(solution.iterations(), 100);
    assert!(solution.iterate.iter().all(|x| x.is_finite()));
}

#[tokio::test]
async fn exploding_system_is_non_finite() {
    let system = LinearSystem::new(array![[1., 10.], [10., 1.]], array![1., 1.]).unwrap();

    let solution = solve(&system, &[0., 0.], 1e-4, 1_000, &mut CpuBackend::new())
        .await
        .unwrap();

    assert_eq!(solution.reason(), Some(AbortReason::NonFiniteResidual));
    assert!(solution.state.diverged);
    assert!(solution.iterations() < 100);
}

/// Cancels the token once a given number of dispatches has run
struct CancelAfter {
    inner: CpuBackend,
    token: CancelToken,
    after: usize,
    dispatches: usize,
}

impl Backend for CancelAfter {
    fn name(&self) -> &str {
        "cancel-after"
    }

    async fn prepare(&mut self, system: &LinearSystem) -> Result<(), BackendError> {
        self.inner.prepare(system).await
    }

    async fn dispatch(
        &mut self,
        system: &LinearSystem,
        kernel: Kernel<'_>,
        output: &mut [f32],
    ) -> Result<(), BackendError> {
        self.inner.dispatch(system, kernel, output).await?;
        self.dispatches += 1;
        if self.dispatches == self.after {
            self.token.cancel();
        }
        Ok(())
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

#[tokio::test]
async fn cancel_takes_effect_at_the_next_barrier() {
    let token = CancelToken::new();
    let mut backend = CancelAfter {
        inner: CpuBackend::new(),
        token: token.clone(),
        // initial residual, then sweep and residual of the first iteration, and the sweep of the second
        after: 4,
        dispatches: 0,
    };
    let system = LinearSystem::diffusion_1d(30, 1., 1.).unwrap();

    let solution = Solver::new(1e-6, 1_000)
        .cancel_token(token)
        .solve(&system, &vec![0.; 30], &mut backend)
        .await
        .unwrap();

    // the second iteration still completes
    assert_eq!(solution.reason(), Some(AbortReason::Cancelled));
    assert_eq!(solution.iterations(), 2);
    assert_eq!(backend.dispatches, 5);
}

#[tokio::test]
async fn jacobi_and_steepest_descent_agree_on_diffusion() {
    let system = LinearSystem::diffusion_1d(21, 200., 400.).unwrap();
    let guess = vec![0.; 21];
    let mut backend = CpuBackend::new();

    let jacobi = Solver::new(1e-3, 100_000)
        .solve(&system, &guess, &mut backend)
        .await
        .unwrap();
    let descent = Solver::new(1e-3, 100_000)
        .method(Method::SteepestDescent)
        .solve(&system, &guess, &mut backend)
        .await
        .unwrap();

    assert!(jacobi.is_converged());
    assert!(descent.is_converged());
    for (i, (j, d)) in jacobi.iterate.iter().zip(descent.iterate.iter()).enumerate() {
        let exact = 200. + 200. * (i as f32 + 1.) / 22.;
        assert!((j - exact).abs() < 0.5, "jacobi row {i}: {j} vs {exact}");
        assert!((d - exact).abs() < 0.5, "descent row {i}: {d} vs {exact}");
    }
}
