//! GPU backend: the row kernels run as wgpu compute shaders.
//!
//! The shader module and its pipelines are compiled once, when the backend is built, and reused
//! by every solve. The device buffers of a system are allocated by `prepare`, reused by all the
//! dispatches of the solve, and destroyed by `release`: nothing accumulates across iterations.

use bytemuck::{Pod, Zeroable};

use super::{check_domain, Backend};
use crate::coding::Shader;
use crate::errors::BackendError;
use crate::interface::Executor;
use crate::kernel::Kernel;
use crate::system::LinearSystem;
use crate::translator::GpuArray;
use crate::variable::Variable;

/// Configuration of the [`AcceleratorBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct AcceleratorConfig {
    /// Label given to the device and to its objects, for debugging
    pub label: Option<String>,
    pub power_preference: wgpu::PowerPreference,
    /// Asks for a software adapter instead of a hardware one
    pub force_fallback_adapter: bool,
    /// Invocations per workgroup, replaces the workgroup token of the sweep shader
    pub workgroup_size: u32,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        AcceleratorConfig {
            label: Some("wgpu-jacobi".to_string()),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            workgroup_size: 64,
        }
    }
}

/// Uniform block of the sweep shader, padded to 16 bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct Params {
    n: u32,
    _pad: [u32; 3],
}

/// The compiled sweep kernels, one pipeline per entry point
#[derive(Debug)]
struct Pipelines {
    layout: wgpu::BindGroupLayout,
    jacobi: wgpu::ComputePipeline,
    matvec: wgpu::ComputePipeline,
    residual: wgpu::ComputePipeline,
}

impl Pipelines {
    fn get(&self, kernel: &Kernel<'_>) -> &wgpu::ComputePipeline {
        match kernel {
            Kernel::Jacobi { .. } => &self.jacobi,
            Kernel::MatVec { .. } => &self.matvec,
            Kernel::Residual { .. } => &self.residual,
        }
    }
}

/// Device side buffers of one staged system
#[derive(Debug)]
struct DevicePool {
    rows: usize,
    a: wgpu::Buffer,
    b: wgpu::Buffer,
    x_in: wgpu::Buffer,
    x_out: wgpu::Buffer,
    readback: wgpu::Buffer,
    params: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    workgroups: [u32; 3],
}

impl DevicePool {
    fn destroy(self) {
        for buffer in [
            &self.a,
            &self.b,
            &self.x_in,
            &self.x_out,
            &self.readback,
            &self.params,
        ] {
            buffer.destroy();
        }
    }
}

/// Runs the row kernels on a GPU through [`wgpu`].
///
/// Building it fails fast with [`BackendError::Unavailable`] when there is no usable adapter,
/// so a solve never starts on a backend which can't run it.
#[derive(Debug)]
pub struct AcceleratorBackend {
    executor: Executor,
    config: AcceleratorConfig,
    pipelines: Pipelines,
    pool: Option<DevicePool>,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl AcceleratorBackend {
    /// Acquires a device and compiles the sweep kernels on it.
    ///
    /// # Errors
    /// - [`BackendError::Unavailable`] if there is no adapter, the device can't be created,
    ///   the workgroup size isn't supported or the kernels don't compile
    pub async fn new(config: AcceleratorConfig) -> Result<AcceleratorBackend, BackendError> {
        let executor = Executor::new(&config).await?;

        let limits = executor.limits();
        if config.workgroup_size == 0
            || config.workgroup_size > limits.max_compute_workgroup_size_x
            || config.workgroup_size > limits.max_compute_invocations_per_workgroup
        {
            return Err(BackendError::Unavailable(format!(
                "workgroup size {} is not supported by the device (max {})",
                config.workgroup_size, limits.max_compute_workgroup_size_x
            )));
        }

        let pipelines = AcceleratorBackend::compile(&executor, config.workgroup_size).await?;

        Ok(AcceleratorBackend {
            executor,
            config,
            pipelines,
            pool: None,
        })
    }

    async fn compile(executor: &Executor, workgroup_size: u32) -> Result<Pipelines, BackendError> {
        let label = executor.label();
        executor.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = Shader::sweep_kernels(workgroup_size);
        let module = executor.get_shader_module(&shader);

        let layout = executor.get_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label,
            entries: &[
                storage_entry(0, true),  // a
                storage_entry(1, true),  // b
                storage_entry(2, true),  // x_in
                storage_entry(3, false), // x_out
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = executor.get_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label,
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = |entry_point: &str| {
            executor.get_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point,
            })
        };
        let jacobi = pipeline("jacobi");
        let matvec = pipeline("matvec");
        let residual = pipeline("residual");

        if let Some(err) = executor.pop_error_scope().await {
            return Err(BackendError::Unavailable(format!(
                "sweep kernels can't be compiled on this device: {err}"
            )));
        }
        tracing::debug!(workgroup_size, "sweep kernels compiled");

        Ok(Pipelines {
            layout,
            jacobi,
            matvec,
            residual,
        })
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn config(&self) -> &AcceleratorConfig {
        &self.config
    }

    fn push_scopes(&self) {
        self.executor.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.executor.push_error_scope(wgpu::ErrorFilter::Validation);
    }

    /// Pops the scopes of [`AcceleratorBackend::push_scopes`], out of memory errors first
    async fn pop_scopes(&self) -> Option<wgpu::Error> {
        let validation = self.executor.pop_error_scope().await;
        let out_of_memory = self.executor.pop_error_scope().await;
        out_of_memory.or(validation)
    }
}

impl Backend for AcceleratorBackend {
    fn name(&self) -> &str {
        "accelerator"
    }

    async fn prepare(&mut self, system: &LinearSystem) -> Result<(), BackendError> {
        self.release();

        let rows = system.dim();
        let matrix = GpuArray::from_ndarray2(system.matrix(), "A");
        let rhs = GpuArray::from_ndarray1(system.rhs(), "b");

        let limits = self.executor.limits();
        let workgroups = rhs.get_workgroup(
            self.config.workgroup_size,
            limits.max_compute_workgroups_per_dimension,
        )?;
        let n = u32::try_from(rows).map_err(|_| BackendError::Allocation {
            label: "params".to_string(),
            size: rows as u64,
            reason: "the system dimension doesn't fit in a u32".to_string(),
        })?;

        let max_binding = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        for variable in [&matrix, &rhs] {
            if variable.byte_size() > max_binding {
                return Err(BackendError::Allocation {
                    label: variable.get_name().unwrap_or_default().to_string(),
                    size: variable.byte_size(),
                    reason: format!("the device binds at most {max_binding} bytes"),
                });
            }
        }

        self.push_scopes();
        let a = self
            .executor
            .get_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: matrix.get_name(),
                contents: matrix.byte_data(),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let b = self
            .executor
            .get_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: rhs.get_name(),
                contents: rhs.byte_data(),
                usage: wgpu::BufferUsages::STORAGE,
            });
        // same size as b, the data is written by each dispatch
        let x_in = self.executor.get_buffer(
            &GpuArray::from_ndarray1(system.rhs(), "x_in")
                .to_buffer_descriptor(wgpu::BufferUsages::empty()),
        );
        let x_out = self.executor.get_buffer(
            &GpuArray::from_ndarray1(system.rhs(), "x_out")
                .to_buffer_descriptor(wgpu::BufferUsages::COPY_SRC),
        );
        let readback = self.executor.get_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: rhs.byte_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = self
            .executor
            .get_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("params"),
                contents: bytemuck::bytes_of(&Params { n, _pad: [0; 3] }),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = self.executor.get_bind_group(&wgpu::BindGroupDescriptor {
            label: self.executor.label(),
            layout: &self.pipelines.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: a.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: b.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: x_in.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: x_out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        let pool = DevicePool {
            rows,
            a,
            b,
            x_in,
            x_out,
            readback,
            params,
            bind_group,
            workgroups,
        };
        if let Some(err) = self.pop_scopes().await {
            pool.destroy();
            return Err(BackendError::Allocation {
                label: "system".to_string(),
                size: matrix.byte_size() + 4 * rhs.byte_size(),
                reason: err.to_string(),
            });
        }

        tracing::debug!(
            rows,
            bytes = matrix.byte_size() + 4 * rhs.byte_size(),
            workgroups = workgroups[0],
            "device buffers allocated"
        );
        self.pool = Some(pool);
        Ok(())
    }

    async fn dispatch(
        &mut self,
        system: &LinearSystem,
        kernel: Kernel<'_>,
        output: &mut [f32],
    ) -> Result<(), BackendError> {
        check_domain(system, &kernel, output)?;
        let entry_point = kernel.entry_point();
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| BackendError::NotPrepared(self.name().to_string()))?;
        if pool.rows != system.dim() {
            return Err(BackendError::Dispatch {
                kernel: entry_point,
                reason: format!(
                    "the staged system has {} rows, not {}",
                    pool.rows,
                    system.dim()
                ),
            });
        }

        let input = GpuArray::from_slice(kernel.input(), "x_in");
        self.executor.write_buffer(&pool.x_in, input.byte_data());

        self.push_scopes();
        let mut encoder = self.executor.dispatch_bind_and_pipeline(
            &pool.bind_group,
            self.pipelines.get(&kernel),
            &pool.workgroups,
            Some(entry_point),
        );
        encoder.copy_buffer_to_buffer(&pool.x_out, 0, &pool.readback, 0, input.byte_size());
        self.executor.execute(Some(encoder.finish()));
        if let Some(err) = self.pop_scopes().await {
            return Err(match err {
                wgpu::Error::OutOfMemory { .. } => BackendError::Allocation {
                    label: entry_point.to_string(),
                    size: input.byte_size(),
                    reason: err.to_string(),
                },
                _ => BackendError::Dispatch {
                    kernel: entry_point,
                    reason: err.to_string(),
                },
            });
        }

        self.executor
            .read_buffer(&pool.readback, output, entry_point)
            .await
    }

    fn release(&mut self) {
        if let Some(pool) = self.pool.take() {
            tracing::debug!(rows = pool.rows, "device buffers released");
            pool.destroy();
        }
    }
}
