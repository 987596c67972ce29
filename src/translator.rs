//! This module contains the structs which are responsible of having the GPU read the solver types
//!
//! Its responsibility is to translate [`ndarray`] arrays and plain slices in a form which can be
//! copied into a device buffer, and to translate the bytes read back from the device.

use crate::variable::Variable;
use ndarray::{ArrayView1, ArrayView2};
use std::borrow::Cow;

/// This struct is responible to get to the GPU the data in the correct form and sequence.
///
/// Matrices are flattened in row major order, which is what the kernels index (`a[i * n + j]`).
///
/// Note: it borrows the data whenever the array is already contiguous, so the array and the
/// name must outlive this struct.
#[derive(Debug, PartialEq)]
pub struct GpuArray<'a> {
    data: Cow<'a, [f32]>,
    rows: usize,
    name: &'a str,
}

impl<'a> GpuArray<'a> {
    /// This fucntion creates an array from a borrowed slice, one row per element
    pub fn from_slice(data: &'a [f32], name: &'a str) -> GpuArray<'a> {
        GpuArray {
            rows: data.len(),
            data: Cow::Borrowed(data),
            name,
        }
    }

    /// This fucntion creates an array from a borrowed [`ndarray`] vector
    pub fn from_ndarray1(array: ArrayView1<'a, f32>, name: &'a str) -> GpuArray<'a> {
        let rows = array.len();
        let data = match array.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(array.to_vec()),
        };
        GpuArray { data, rows, name }
    }

    /// This fucntion creates an array from a borrowed [`ndarray`] matrix
    ///
    /// Arrays which are not in standard layout are copied.
    ///
    /// # Example
    /// ```
    /// use ndarray::array;
    /// use wgpu_jacobi::translator::GpuArray;
    /// use wgpu_jacobi::variable::Variable;
    ///
    /// let a = array![[0., 1.], [2., 3.], [4., 5.]];
    /// let gpu_a = GpuArray::from_ndarray2(a.view(), "Matrix a");
    /// assert_eq!(gpu_a.rows(), 3);
    /// assert_eq!(gpu_a.byte_size(), 24);
    /// ```
    pub fn from_ndarray2(array: ArrayView2<'a, f32>, name: &'a str) -> GpuArray<'a> {
        let rows = array.nrows();
        let data = match array.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(array.iter().copied().collect()),
        };
        GpuArray { data, rows, name }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl Variable for GpuArray<'_> {
    fn get_name(&self) -> Option<&str> {
        Some(self.name)
    }

    fn byte_data(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    fn rows(&self) -> usize {
        self.rows
    }
}

/// Copies the `f32` values read back from a device buffer into `output`
///
/// Only the first `output.len()` values are read, padding at the end of the bytes is ignored.
pub fn read_f32_into(bytes: &[u8], output: &mut [f32]) {
    let values: &[f32] = bytemuck::cast_slice(&bytes[..std::mem::size_of_val(output)]);
    output.copy_from_slice(values);
}
