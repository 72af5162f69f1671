/// D3d11Device - constant-block backend device and native-API seam
///
/// The D3d11Api trait is the boundary to the real graphics API: one
/// compile entry point returning bytecode plus per-stage cbuffer and
/// sampler reflection, and one whole-block upload call. Everything
/// above that seam lives in this crate and the core.

use std::sync::Arc;

use nebula_gfx::device::{DeviceConfig, GfxDevice, ReloadReport, ShaderRegistry};
use nebula_gfx::error::Result;
use nebula_gfx::gfx_info;
use nebula_gfx::shader::{ConstType, GfxShader, ShaderDesc, ShaderStage, SourceProvider};

use crate::d3d11_shader::D3d11Shader;

const LOG_SOURCE: &str = "nebula::d3d11::Device";

// ============================================================================
// Native API seam
// ============================================================================

/// One variable inside a reflected cbuffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D3d11VariableDesc {
    /// Variable name as declared in the source (no `$` prefix)
    pub name: String,
    /// Byte offset within the owning cbuffer
    pub offset: u32,
    /// Bytes occupied, including the padded row stride of truncated
    /// matrices
    pub size: u32,
    /// Declared type
    pub const_type: ConstType,
    /// Declared array element count (>= 1)
    pub array_size: u32,
}

/// One reflected cbuffer of a compiled stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D3d11CbufferDesc {
    /// Buffer name (e.g. "$Globals")
    pub name: String,
    /// Padded byte size of the hardware buffer
    pub size: u32,
    /// Variables in declaration order
    pub variables: Vec<D3d11VariableDesc>,
}

/// One reflected sampler bind point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D3d11SamplerBindDesc {
    /// Sampler name as declared in the source (no `$` prefix)
    pub name: String,
    /// Bind slot (t#/s# register)
    pub slot: u32,
    /// True for cube textures
    pub is_cube: bool,
}

/// Output of one stage compile
#[derive(Debug, Clone)]
pub struct D3d11CompiledStage {
    /// Compiled shader bytecode
    pub bytecode: Vec<u8>,
    /// Reflected cbuffers, in bind-slot order
    pub cbuffers: Vec<D3d11CbufferDesc>,
    /// Reflected sampler bind points
    pub samplers: Vec<D3d11SamplerBindDesc>,
    /// Non-fatal compiler diagnostics
    pub warnings: Option<String>,
}

/// The native D3D11-style API, implemented by the embedding renderer
pub trait D3d11Api: Send + Sync {
    /// Compile one stage to bytecode plus its reflection report
    fn compile(
        &self,
        stage: ShaderStage,
        source: &str,
        profile: &str,
    ) -> Result<D3d11CompiledStage>;

    /// Replace the full contents of one stage's constant buffer at a
    /// bind slot
    fn update_block(&self, stage: ShaderStage, slot: u32, bytes: &[u8]);
}

/// Compiler profile string for a stage and shader model
/// (e.g. `vs_5_0`)
pub fn stage_profile(stage: ShaderStage, shader_model: f32) -> String {
    let major = shader_model as u32;
    let minor = ((shader_model * 10.0).round() as u32) % 10;
    match stage {
        ShaderStage::Vertex => format!("vs_{}_{}", major, minor),
        ShaderStage::Pixel => format!("ps_{}_{}", major, minor),
    }
}

// ============================================================================
// Device
// ============================================================================

/// D3D11 device implementation
pub struct D3d11Device {
    api: Arc<dyn D3d11Api>,
    provider: Arc<dyn SourceProvider>,
    config: DeviceConfig,
    registry: ShaderRegistry,
}

impl D3d11Device {
    /// Create the device over an embedder-supplied native API
    pub fn new(
        api: Arc<dyn D3d11Api>,
        provider: Arc<dyn SourceProvider>,
        config: DeviceConfig,
    ) -> Self {
        gfx_info!(
            LOG_SOURCE,
            "D3D11 device created (shader model {})",
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

impl GfxDevice for D3d11Device {
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn GfxShader>> {
        let shader: Arc<dyn GfxShader> = D3d11Shader::new(
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
