use std::path::Path;

/// WGSL source of the row kernels, see [`Shader::sweep_kernels`]
const SWEEP_SOURCE: &str = include_str!("../shaders/sweep.wgsl");

/// Token replaced with the workgroup size in [`SWEEP_SOURCE`]
pub const WORKGROUP_TOKEN: &str = "€wg";

/// The [`Shader`] is a struct containing WGSL code
///
/// This struct is not able to read or check WGSL code, it's only purpose is to
/// hold the content of it, evantually manipulate it, and feeding it to an [`Executor`](crate::interface::Executor)
///
/// All the code checking is done when the module is created by `Naga` (called by `wgpu`), and never through this stage of the
/// program.
/// This allows to write pseudo code with `€tokens` and to replace them at runtime with values only known
/// then, like the workgroup size chosen for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shader {
    content: String,
}

impl Shader {
    /// This method creates a shader from a string literal.
    ///
    /// No effort whatsoever is done at this stage to check the correctnes of the shader
    ///
    /// # Arguments
    /// * - `content` - a string holding the code of the shader
    pub fn from_content(content: &str) -> Self {
        Shader {
            content: content.to_string(),
        }
    }

    /// This functions reads a wgsl file to the shader content.
    ///
    /// It will open the file and simply put the content into the struct as a [`String`].
    ///
    /// # Errors
    /// - if the file doesn't exist or it's not readable
    ///
    /// # Example
    ///
    /// ```
    /// use wgpu_jacobi::coding::Shader;
    /// let shader = Shader::from_file_path("./shaders/sweep.wgsl").unwrap();
    /// assert!(shader.get_content().contains("fn jacobi"));
    /// ```
    pub fn from_file_path<P: AsRef<Path>>(path_to_module: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path_to_module)?;

        Ok(Shader { content })
    }

    /// The row kernels used by the accelerator backend, ready to be compiled
    ///
    /// It contains the `jacobi`, `matvec` and `residual` entry points, all sharing the same
    /// bind group layout, with the workgroup size already replaced.
    ///
    /// # Example
    /// ```
    /// use wgpu_jacobi::coding::Shader;
    /// let shader = Shader::sweep_kernels(64);
    /// assert!(shader.get_content().contains("@workgroup_size(64)"));
    /// ```
    pub fn sweep_kernels(workgroup_size: u32) -> Self {
        let mut shader = Shader::from_content(SWEEP_SOURCE);
        shader.replace(WORKGROUP_TOKEN, workgroup_size.to_string().as_str());
        shader
    }

    /// This function replace the `from` sring with the `to` string inside the [`Shader`]
    ///
    /// It replaces all the instances of the `from` string, so use this with caution, since no check on correctness of the final code
    /// is done in this function.
    ///
    /// # Examples
    /// ```
    /// use wgpu_jacobi::coding::Shader;
    /// let mut shader = Shader::from_content("@compute @workgroup_size(€wg) fn main() {}");
    /// shader.replace("€wg", "32");
    /// assert_eq!(shader, Shader::from_content("@compute @workgroup_size(32) fn main() {}"));
    /// ```
    pub fn replace(&mut self, from: &str, to: &str) {
        self.content = self.content.replace(from, to);
    }

    /// This methods gets the content of the [`Shader`] as a string reference
    pub fn get_content(&self) -> &str {
        &self.content
    }

    /// Checks whether some `€token` is still waiting to be replaced
    pub fn has_tokens(&self) -> bool {
        self.content.contains('€')
    }
}
