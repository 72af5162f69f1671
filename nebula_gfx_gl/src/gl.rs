/// GlDevice - uniform-location backend device and native-API seam
///
/// The GlApi trait is the boundary to the real graphics API: one link
/// entry point returning a program handle plus its active-uniform
/// reflection, per-location upload calls, and program deletion.
/// Locations only exist at runtime, so this backend never persists a
/// compile cache.

use std::sync::Arc;

use nebula_gfx::device::{DeviceConfig, GfxDevice, ReloadReport, ShaderRegistry};
use nebula_gfx::error::Result;
use nebula_gfx::gfx_info;
use nebula_gfx::shader::{ConstType, GfxShader, ShaderDesc, SourceProvider};

use crate::gl_shader::GlShader;

const LOG_SOURCE: &str = "nebula::gl::Device";

// ============================================================================
// Native API seam
// ============================================================================

/// One active uniform reported by program reflection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlUniformDesc {
    /// Uniform name as reported by the driver; arrays may carry a
    /// trailing `[0]`
    pub name: String,
    /// Uniform location
    pub location: i32,
    /// Declared type
    pub const_type: ConstType,
    /// Declared array element count (>= 1)
    pub array_size: u32,
}

/// Output of one program link
#[derive(Debug, Clone)]
pub struct GlLinkedProgram {
    /// Program object handle
    pub program: u32,
    /// Active uniforms, in reflection order
    pub uniforms: Vec<GlUniformDesc>,
    /// Non-fatal compiler/linker diagnostics
    pub warnings: Option<String>,
}

/// The native GL-style API, implemented by the embedding renderer
pub trait GlApi: Send + Sync {
    /// Compile both stages and link them into one program
    fn link_program(&self, vertex_source: &str, pixel_source: &str) -> Result<GlLinkedProgram>;

    /// Delete a program object
    fn delete_program(&self, program: u32);

    /// Upload float data to a location; `data` holds `count` dense
    /// elements of `const_type`
    fn set_uniform_f(&self, location: i32, const_type: ConstType, count: u32, data: &[f32]);

    /// Upload integer data to a location
    fn set_uniform_i(&self, location: i32, const_type: ConstType, count: u32, data: &[i32]);

    /// Upload matrix data to a location; `data` holds `count` dense
    /// elements with the rows of each source matrix contiguous
    fn set_uniform_matrix(&self, location: i32, const_type: ConstType, count: u32, data: &[f32]);
}

// ============================================================================
// Device
// ============================================================================

/// GL device implementation
pub struct GlDevice {
    api: Arc<dyn GlApi>,
    provider: Arc<dyn SourceProvider>,
    config: DeviceConfig,
    registry: ShaderRegistry,
}

impl GlDevice {
    /// Create the device over an embedder-supplied native API
    pub fn new(
        api: Arc<dyn GlApi>,
        provider: Arc<dyn SourceProvider>,
        config: DeviceConfig,
    ) -> Self {
        gfx_info!(
            LOG_SOURCE,
            "GL device created (shader model {})",
            config.shader_model
        );
        Self {
            api,
            provider,
            config,
            registry: ShaderRegistry::new(),
        }
    }

    /// Live shaders tracked for hot reload
    pub fn live_shader_count(&mut self) -> usize {
        self.registry.live_count()
    }
}

impl GfxDevice for GlDevice {
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn GfxShader>> {
        let shader: Arc<dyn GfxShader> = GlShader::new(
            desc,
            Arc::clone(&self.api),
            Arc::clone(&self.provider),
            &self.config,
        )?;
        self.registry.register(&shader);
        Ok(shader)
    }

    fn reload_shaders(&mut self) -> ReloadReport {
        self.registry.reload_all()
    }

    fn config(&self) -> &DeviceConfig {
        &self.config
    }
}
