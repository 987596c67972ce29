//! Steady 1-D diffusion between two fixed temperatures, solved on every available backend.
//!
//! Run with `RUST_LOG=wgpu_jacobi=debug cargo run --example diffusion` to see the solver logs.

use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use wgpu_jacobi::algorithm::Method;
use wgpu_jacobi::backend::{AcceleratorBackend, AcceleratorConfig, Backend, CpuBackend};
use wgpu_jacobi::solver::{Solution, Solver, SolverConfig};
use wgpu_jacobi::system::LinearSystem;

const NODES: usize = 101;
const LEFT: f32 = 200.;
const RIGHT: f32 = 400.;

async fn run<B: Backend>(
    solver: &Solver,
    system: &LinearSystem,
    backend: &mut B,
) -> anyhow::Result<Solution> {
    let start = Instant::now();
    let solution = solver
        .solve(system, &vec![0.; system.dim()], backend)
        .await
        .with_context(|| format!("solve on {} failed", backend.name()))?;
    println!(
        "{:>12} {:>16}: {:?} after {} sweeps, residual {:.2e}, {:.3}s",
        backend.name(),
        solver.config().method.name(),
        solution.status,
        solution.iterations(),
        solution.residual(),
        start.elapsed().as_secs_f64()
    );
    Ok(solution)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let system = LinearSystem::diffusion_1d(NODES, LEFT, RIGHT)?;
    let config = SolverConfig {
        tolerance: 1e-3,
        max_iterations: 200_000,
        record_trace: true,
        ..SolverConfig::default()
    };

    let mut cpu = CpuBackend::new();
    let mut accelerator = match AcceleratorBackend::new(AcceleratorConfig::default()).await {
        Ok(backend) => Some(backend),
        Err(err) => {
            println!("accelerator skipped: {err}");
            None
        }
    };

    for method in [Method::Jacobi, Method::SteepestDescent] {
        let solver = Solver::from_config(config).method(method);
        let solution = run(&solver, &system, &mut cpu).await?;
        if let Some(backend) = accelerator.as_mut() {
            run(&solver, &system, backend).await?;
        }

        let step = (solution.trace.len() / 5).max(1);
        for (iteration, residual) in solution.trace.iter().step_by(step) {
            println!("    iter = {iteration:>6} | residual = {residual:.6}");
        }
        let middle = solution.iterate[NODES / 2];
        println!("    x[{}] = {middle:.3} (exact {:.3})", NODES / 2, (LEFT + RIGHT) / 2.);
    }

    Ok(())
}
