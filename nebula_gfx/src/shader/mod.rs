/// Shader constant-buffer subsystem
///
/// Everything backend-agnostic about shader constants lives here: the
/// type and reflection vocabulary, byte-offset layouts with
/// change-detecting writes, stable constant handles, the per-material
/// staging buffer with dirty tracking, source loading with include
/// expansion, the compiled-shader cache primitives, and the
/// [`ShaderCore`] orchestration backends embed. The backend crates add
/// only compilation and upload translation over their native-API seam.

pub mod buffer;
pub mod cache;
pub mod handle;
pub mod layout;
pub mod shader;
pub mod source;
pub mod vertex_format;

mod const_desc;
mod const_type;

pub use buffer::{GenericConstBuffer, GfxShaderConstBuffer};
pub use const_desc::{SamplerDesc, ShaderConstDesc, ShaderMacro, ShaderStage, StageFlags};
pub use const_type::ConstType;
pub use handle::{HandleBinding, ShaderConstHandle, StageBinding};
pub use layout::{ConstBank, ConstBufferLayout, ConstParamDesc, ConstSubBufferDesc, LayoutSet};
pub use shader::{
    shader_model_macro, ConstBufferKey, GfxShader, InstancingConst, ShaderCore, ShaderDesc,
    ShaderState, SHADER_MODEL_MACRO,
};
pub use source::{load_expanded, render_macro_block, FileSourceProvider, SourceProvider};
pub use vertex_format::{VertexDeclType, VertexElement, VertexFormat};

#[cfg(test)]
pub mod mock_shader;
