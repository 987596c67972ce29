//! Low level access to the GPU through [`wgpu`].
//!
//! The [`Executor`] owns the device and its queue; the accelerator backend builds its buffers,
//! pipelines and command encoders through it and reads the sweep results back with it.

use std::borrow::Cow;

use crate::backend::AcceleratorConfig;
use crate::coding::Shader;
use crate::errors::BackendError;
use crate::translator::read_f32_into;
use wgpu::util::DeviceExt;

/// A GPU device with its queue, and the adapter it was requested from.
///
/// Device and queue live as long as the [`Executor`]: dropping it releases the device.
#[derive(Debug)]
pub struct Executor {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    label: Option<String>,
}

impl Executor {
    /// Picks an adapter matching `config` and requests a device on it.
    /// ```no_run
    /// use wgpu_jacobi::backend::AcceleratorConfig;
    /// use wgpu_jacobi::interface::Executor;
    ///
    /// let executor = pollster::block_on(Executor::new(&AcceleratorConfig::default())).unwrap();
    /// println!("running on {}", executor.adapter_name());
    /// ```
    ///
    /// # Errors
    /// - [`BackendError::Unavailable`] if no adapter is found or the device can't be requested
    pub async fn new(config: &AcceleratorConfig) -> Result<Executor, BackendError> {
        let Some(adapter) = Executor::find_adapter(config).await else {
            tracing::warn!("No adapter found for this machine");
            return Err(BackendError::Unavailable(
                "no compatible GPU adapter found".to_string(),
            ));
        };

        let label = config.label.as_deref();
        // the adapter buffer limits allow bigger systems than the defaults
        let adapter_limits = adapter.limits();
        let limits = wgpu::Limits {
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            ..wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits,
                    label,
                },
                None, // Trace path 'used for API call tracing'
            )
            .await
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;

        let info = adapter.get_info();
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "accelerator device ready"
        );

        Ok(Executor {
            adapter,
            device,
            queue,
            label: config.label.clone(),
        })
    }

    /// `None` when the machine has no adapter matching `config`
    async fn find_adapter(config: &AcceleratorConfig) -> Option<wgpu::Adapter> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None, // we only need compute
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
    }

    pub fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    /// The limits the device was created with
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Bind group layout shared by the pipelines and the bind groups of a kernel set
    pub fn get_bind_group_layout(
        &self,
        layout_descriptor: &wgpu::BindGroupLayoutDescriptor,
    ) -> wgpu::BindGroupLayout {
        self.device.create_bind_group_layout(layout_descriptor)
    }

    pub fn get_bind_group(
        &self,
        bind_group_descriptor: &wgpu::BindGroupDescriptor,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(bind_group_descriptor)
    }

    /// A buffer filled with the descriptor contents at creation
    pub fn get_buffer_init(
        &self,
        buffer_init_descriptor: &wgpu::util::BufferInitDescriptor,
    ) -> wgpu::Buffer {
        self.device.create_buffer_init(buffer_init_descriptor)
    }

    /// An uninitialized buffer, to be written by the queue or by a kernel
    pub fn get_buffer(&self, buffer_descriptor: &wgpu::BufferDescriptor) -> wgpu::Buffer {
        self.device.create_buffer(buffer_descriptor)
    }

    /// Compiles the WGSL of `shader`. Every token must have been replaced already.
    pub fn get_shader_module(&self, shader: &Shader) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: self.label(),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(shader.get_content())),
        })
    }

    pub fn get_pipeline_layout(
        &self,
        pipeline_layout_descriptor: &wgpu::PipelineLayoutDescriptor,
    ) -> wgpu::PipelineLayout {
        self.device.create_pipeline_layout(pipeline_layout_descriptor)
    }

    /// Validation errors surface through [`Executor::pop_error_scope`]
    pub fn get_pipeline(
        &self,
        pipeline_descriptor: &wgpu::ComputePipelineDescriptor,
    ) -> wgpu::ComputePipeline {
        self.device.create_compute_pipeline(pipeline_descriptor)
    }

    /// Records one compute pass over `workgroups` in a new encoder.
    ///
    /// Nothing runs until the finished encoder goes through [`Executor::execute`]; more commands
    /// (the copy to a readback buffer) can be appended before that.
    pub fn dispatch_bind_and_pipeline(
        &self,
        bind_group: &wgpu::BindGroup,
        pipeline: &wgpu::ComputePipeline,
        workgroups: &[u32; 3],
        label: Option<&str>,
    ) -> wgpu::CommandEncoder {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label,
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        }
        encoder
    }

    /// Copies host data into an existing buffer, through the queue
    pub fn write_buffer(&self, buffer: &wgpu::Buffer, data: &[u8]) {
        self.queue.write_buffer(buffer, 0, data);
    }

    /// Submits the command buffers to the queue
    pub fn execute<I: IntoIterator<Item = wgpu::CommandBuffer>>(
        &self,
        command_buffers: I,
    ) -> wgpu::SubmissionIndex {
        self.queue.submit(command_buffers)
    }

    /// Starts catching the device errors of kind `filter`, see [`Executor::pop_error_scope`]
    pub fn push_error_scope(&self, filter: wgpu::ErrorFilter) {
        self.device.push_error_scope(filter);
    }

    /// Gives back the first error caught since the matching [`Executor::push_error_scope`]
    pub async fn pop_error_scope(&self) -> Option<wgpu::Error> {
        self.device.pop_error_scope().await
    }

    /// Reads a `MAP_READ` buffer back into `output`, waiting for the device to be done with it
    ///
    /// The buffer is unmapped before returning, so it can be reused for the next copy.
    ///
    /// # Errors
    /// - [`BackendError::Readback`] if the buffer can't be mapped
    pub async fn read_buffer(
        &self,
        buffer: &wgpu::Buffer,
        output: &mut [f32],
        kernel: &'static str,
    ) -> Result<(), BackendError> {
        let size = std::mem::size_of_val(output) as u64;
        let buffer_slice = buffer.slice(..size);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            // the receiver is only gone if the read was abandoned
            let _ = sender.send(result);
        });

        // blocks until the submitted work and the mapping are done
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.receive().await {
            Some(Ok(())) => {
                {
                    let data = buffer_slice.get_mapped_range();
                    read_f32_into(&data, output);
                }
                buffer.unmap();
                Ok(())
            }
            Some(Err(err)) => Err(BackendError::Readback {
                kernel,
                reason: err.to_string(),
            }),
            None => Err(BackendError::Readback {
                kernel,
                reason: "mapping callback was dropped".to_string(),
            }),
        }
    }
}
