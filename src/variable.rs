use crate::errors::BackendError;
use core::fmt::Debug;
use wgpu::BufferDescriptor;

/// This trait is the entry point to make a host array GPU compatible
///
/// It contains all that is needed by the accelerator backend to create the device buffer holding
/// the data and to size the dispatch over it.
///
/// The row domain of a dispatch is one dimensional: one invocation per row of the system.
pub trait Variable
where
    Self: Debug + Send,
{
    /// This gets a buffer descriptor from the [`Variable`] itself
    ///
    /// The buffer is always a storage buffer which can be written from the host, any extra usage
    /// (e.g. [`wgpu::BufferUsages::COPY_SRC`] for outputs) is added with `extra_usage`.
    fn to_buffer_descriptor(&self, extra_usage: wgpu::BufferUsages) -> BufferDescriptor<'_> {
        BufferDescriptor {
            label: self.get_name(),
            mapped_at_creation: false,
            size: self.byte_size(),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | extra_usage,
        }
    }

    /// Gets an optional name associated with the [`Variable`]
    ///
    /// It is useful to always give variables a name for debugging purposes.
    fn get_name(&self) -> Option<&str>;

    /// This method is needed to pass the data to the GPU
    ///
    /// The GPU needs the data as an ordered stream of bytes, which is stored in
    /// the buffer and than distributed to the threads.
    fn byte_data(&self) -> &[u8];

    /// This function calculates the byte size of the object
    ///
    /// The size needs to be valid and true, as it will be used to allocate the buffer.
    fn byte_size(&self) -> u64 {
        self.byte_data().len() as u64
    }

    /// Number of rows the variable spans, i.e. the size of the dispatch domain over it
    fn rows(&self) -> usize;

    /// This method defines the workgroup count for the object
    ///
    /// It takes the number of rows and counts how many groups of `workgroup_size` invocations are
    /// needed to cover them all.
    ///
    /// # Errors
    /// - if the number of groups is over `limit` (usually `max_compute_workgroups_per_dimension`)
    fn get_workgroup(&self, workgroup_size: u32, limit: u32) -> Result<[u32; 3], BackendError> {
        let rows = self.rows();
        let required = (rows as u64).div_ceil(workgroup_size.max(1) as u64);
        match u32::try_from(required) {
            Ok(groups) if groups <= limit => Ok([groups, 1, 1]),
            _ => Err(BackendError::WorkgroupLimit {
                domain: rows,
                required,
                limit,
            }),
        }
    }
}
