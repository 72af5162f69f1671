/// Shader stages, stage masks, reflection descriptors, and macros

use std::sync::Arc;

use bitflags::bitflags;

use crate::shader::ConstType;

/// Shader stage
///
/// Only the two stages that carry numeric constants in this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Pixel/fragment shader
    Pixel,
}

impl ShaderStage {
    /// The single-bit mask for this stage
    pub fn flags(self) -> StageFlags {
        match self {
            ShaderStage::Vertex => StageFlags::VERTEX,
            ShaderStage::Pixel => StageFlags::PIXEL,
        }
    }
}

bitflags! {
    /// Mask of shader stages a constant is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageFlags: u8 {
        const VERTEX = 0b01;
        const PIXEL = 0b10;
    }
}

/// One named constant reported by backend reflection
///
/// Names are `$`-prefixed and case-sensitive; they are shared `Arc<str>`
/// so the handle map, layouts, and descriptor lists all reference one
/// allocation per name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderConstDesc {
    /// Constant name including the `$` prefix
    pub name: Arc<str>,

    /// Declared type
    pub const_type: ConstType,

    /// Element count for arrays (>= 1). For sampler types this field
    /// carries the resolved texture unit / bind register instead.
    pub array_size: u32,
}

/// One sampler reported by backend reflection
///
/// Samplers never occupy constant-buffer bytes; they resolve to a fixed
/// texture unit (GL) or bind register (D3D) recorded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    /// Sampler name including the `$` prefix
    pub name: Arc<str>,

    /// Sampler or SamplerCube
    pub const_type: ConstType,

    /// Resolved texture unit / bind register
    pub register: u32,
}

/// A preprocessor macro passed to shader compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderMacro {
    /// Macro name
    pub name: String,
    /// Macro value (may be empty)
    pub value: String,
}

impl ShaderMacro {
    /// Convenience constructor
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}
