/// D3d9Device - register-file backend device and native-API seam
///
/// The D3d9Api trait is the boundary to the real graphics API: one
/// compile entry point returning bytecode plus a CTAB-style constant
/// table, and the four register-range upload calls. Everything above
/// that seam (reflection translation, layouts, dirty tracking) lives in
/// this crate and the core.

use std::sync::Arc;

use nebula_gfx::device::{DeviceConfig, GfxDevice, ReloadReport, ShaderRegistry};
use nebula_gfx::error::Result;
use nebula_gfx::gfx_info;
use nebula_gfx::shader::{GfxShader, ShaderDesc, ShaderStage, SourceProvider};

use crate::d3d9_shader::D3d9Shader;

const LOG_SOURCE: &str = "nebula::d3d9::Device";

// ============================================================================
// Native API seam
// ============================================================================

/// Register file a constant is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum D3d9RegisterSet {
    /// float4 registers (c#)
    Float4,
    /// int4 registers (i#)
    Int4,
    /// sampler registers (s#)
    Sampler,
}

/// One entry of a compiled stage's constant table
///
/// Mirrors the CTAB layout: a register assignment plus the declared
/// shape. A matrix the compiler truncated (unused rows optimized away)
/// shows up with `register_count` below `rows * elements`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D3d9ConstantDesc {
    /// Constant name as declared in the source (no `$` prefix)
    pub name: String,
    /// Register file
    pub register_set: D3d9RegisterSet,
    /// First assigned register
    pub register_index: u32,
    /// Number of registers actually occupied
    pub register_count: u32,
    /// Declared row count (1 for vectors and scalars)
    pub rows: u32,
    /// Declared column count
    pub cols: u32,
    /// Declared array element count (>= 1)
    pub elements: u32,
    /// True for samplerCUBE declarations
    pub is_cube: bool,
}

/// Output of one stage compile
#[derive(Debug, Clone)]
pub struct D3d9CompiledStage {
    /// Compiled shader bytecode
    pub bytecode: Vec<u8>,
    /// CTAB-style constant table
    pub constants: Vec<D3d9ConstantDesc>,
    /// Non-fatal compiler diagnostics
    pub warnings: Option<String>,
}

/// The native D3D9-style API, implemented by the embedding renderer
///
/// Upload calls take whole registers: `data` length is a multiple of 4
/// floats/ints and lands at `start_register` onward.
pub trait D3d9Api: Send + Sync {
    /// Compile one stage to bytecode plus its constant table
    fn compile(&self, stage: ShaderStage, source: &str, profile: &str)
        -> Result<D3d9CompiledStage>;

    /// Upload a vertex-stage float4 register range
    fn set_vertex_consts_f(&self, start_register: u32, data: &[f32]);

    /// Upload a vertex-stage int4 register range
    fn set_vertex_consts_i(&self, start_register: u32, data: &[i32]);

    /// Upload a pixel-stage float4 register range
    fn set_pixel_consts_f(&self, start_register: u32, data: &[f32]);

    /// Upload a pixel-stage int4 register range
    fn set_pixel_consts_i(&self, start_register: u32, data: &[i32]);
}

/// Compiler profile string for a stage and shader model
/// (e.g. `vs_3_0`)
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

/// D3D9 device implementation
pub struct D3d9Device {
    api: Arc<dyn D3d9Api>,
    provider: Arc<dyn SourceProvider>,
    config: DeviceConfig,
    registry: ShaderRegistry,
}

impl D3d9Device {
    /// Create the device over an embedder-supplied native API
    pub fn new(
        api: Arc<dyn D3d9Api>,
        provider: Arc<dyn SourceProvider>,
        config: DeviceConfig,
    ) -> Self {
        gfx_info!(
            LOG_SOURCE,
            "D3D9 device created (shader model {})",
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

impl GfxDevice for D3d9Device {
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn GfxShader>> {
        let shader: Arc<dyn GfxShader> = D3d9Shader::new(
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
