/*!
This crate solves dense linear systems `A x = b` with iterative methods, leveraging the GPU (or all the
CPU cores) for the heavy part of every iteration.

The work of an iteration is split in row kernels: each row of the output only reads the system and the
previous iterate, so all the rows can be computed at the same time. The kernels run on a [`backend::Backend`]:
- [`backend::CpuBackend`] spreads the rows on a [`rayon`] thread pool
- [`backend::AcceleratorBackend`] runs them as compute shaders through [`wgpu`]

The iteration loop in [`solver`] doesn't know which one it's using, and it's the same for both.

Keeping in mind the cost of moving data between the host (the CPU machine) and the device (the GPU), the
system is copied to the device once per solve, and the compiled kernels are kept for the whole life of the backend.
Only the iterate goes back and forth at each sweep, since the convergence check is done on the host.

```no_run
use wgpu_jacobi::backend::{AcceleratorBackend, AcceleratorConfig};
use wgpu_jacobi::solver::solve;
use wgpu_jacobi::system::LinearSystem;

# async fn run() -> Result<(), Box<dyn std::error::Error>> {
let system = LinearSystem::diffusion_1d(101, 200., 400.)?;
let mut backend = AcceleratorBackend::new(AcceleratorConfig::default()).await?;
let solution = solve(&system, &vec![0.; 101], 1e-3, 100_000, &mut backend).await?;
println!("{:?} after {} sweeps", solution.status, solution.iterations());
# Ok(())
# }
```
*/

pub mod algorithm;
pub mod backend;
pub mod coding;
pub mod convergence;
pub mod errors;
pub mod interface;
pub mod kernel;
pub mod solver;
pub mod system;
pub mod translator;
pub mod variable;

#[cfg(test)]
mod tests;
