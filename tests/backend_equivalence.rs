extern crate wgpu_jacobi;

use ndarray::{Array1, Array2};
use wgpu_jacobi::algorithm::Method;
use wgpu_jacobi::backend::{AcceleratorBackend, AcceleratorConfig, Backend, CpuBackend};
use wgpu_jacobi::errors::{BackendError, SolveError};
use wgpu_jacobi::solver::{Solution, Solver};
use wgpu_jacobi::system::LinearSystem;

async fn accelerator() -> Option<AcceleratorBackend> {
    match AcceleratorBackend::new(AcceleratorConfig::default()).await {
        Ok(backend) => Some(backend),
        Err(BackendError::Unavailable(reason)) => {
            eprintln!("no accelerator on this machine, skipping: {reason}");
            None
        }
        Err(err) => panic!("unexpected accelerator error: {err}"),
    }
}

/// Symmetric, strictly diagonally dominant, bigger than one workgroup
fn banded_system(n: usize) -> LinearSystem {
    let mut matrix = Array2::<f32>::zeros((n, n));
    for i in 0..n {
        matrix[[i, i]] = 6.;
        for offset in 1..=2 {
            if i >= offset {
                matrix[[i, i - offset]] = -1.;
                matrix[[i - offset, i]] = -1.;
            }
        }
    }
    let rhs = Array1::from_iter((0..n).map(|i| ((i % 9) as f32) - 4.));
    LinearSystem::new(matrix, rhs).unwrap()
}

async fn run<B: Backend>(
    solver: &Solver,
    system: &LinearSystem,
    backend: &mut B,
) -> Result<Solution, SolveError> {
    solver
        .solve(system, &vec![0.; system.dim()], backend)
        .await
}

fn assert_equivalent(cpu: &Solution, gpu: &Solution) {
    assert_eq!(cpu.status, gpu.status);
    assert!(
        cpu.iterations().abs_diff(gpu.iterations()) <= 1,
        "cpu {} vs accelerator {} iterations",
        cpu.iterations(),
        gpu.iterations()
    );
    for (i, (c, g)) in cpu.iterate.iter().zip(gpu.iterate.iter()).enumerate() {
        assert!((c - g).abs() <= 1e-5, "row {i}: cpu {c} vs accelerator {g}");
    }
}

#[tokio::test]
async fn jacobi_backends_agree() {
    let Some(mut gpu) = accelerator().await else {
        return;
    };
    let system = banded_system(200);
    let solver = Solver::new(1e-5, 1_000);

    let cpu = run(&solver, &system, &mut CpuBackend::new()).await.unwrap();
    let accelerated = run(&solver, &system, &mut gpu).await.unwrap();

    assert!(cpu.is_converged());
    assert_equivalent(&cpu, &accelerated);
}

#[tokio::test]
async fn steepest_descent_backends_agree() {
    let Some(mut gpu) = accelerator().await else {
        return;
    };
    let system = banded_system(70);
    let solver = Solver::new(1e-5, 1_000).method(Method::SteepestDescent);

    let cpu = run(&solver, &system, &mut CpuBackend::new()).await.unwrap();
    let accelerated = run(&solver, &system, &mut gpu).await.unwrap();

    assert!(cpu.is_converged());
    assert_equivalent(&cpu, &accelerated);
}

#[tokio::test]
async fn one_accelerator_serves_many_solves() {
    let Some(mut gpu) = accelerator().await else {
        return;
    };
    let solver = Solver::new(1e-3, 100_000);
    for (n, left, right) in [(5, 1., 2.), (33, 200., 400.), (9, -1., 1.)] {
        let system = LinearSystem::diffusion_1d(n, left, right).unwrap();
        let solution = run(&solver, &system, &mut gpu).await.unwrap();
        assert!(solution.is_converged(), "n = {n}: {:?}", solution.status);
        let last = solution.iterate[n - 1];
        let expected = left + (right - left) * n as f32 / (n as f32 + 1.);
        assert!((last - expected).abs() < 1., "n = {n}: {last} vs {expected}");
    }
}

#[tokio::test]
async fn dedicated_cpu_pool_matches_the_global_one() {
    let system = banded_system(300);
    let solver = Solver::new(1e-5, 1_000);

    let global = run(&solver, &system, &mut CpuBackend::new()).await.unwrap();
    let mut pool = CpuBackend::with_threads(3).unwrap().min_rows_per_task(1);
    let dedicated = run(&solver, &system, &mut pool).await.unwrap();

    assert!(global.is_converged());
    assert_eq!(global.iterations(), dedicated.iterations());
    assert_eq!(global.iterate, dedicated.iterate);
}
