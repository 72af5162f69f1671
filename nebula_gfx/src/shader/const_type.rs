/// Shader constant types shared by all backends

/// Type of a named shader constant
///
/// Matrix variants exist because shader compilers narrow declared matrix
/// uniforms when unused rows/columns are optimized away; callers still
/// supply full 4x4 source data and the layout primitives extract the
/// declared sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstType {
    /// 32-bit float scalar
    Float,
    /// 2-component float vector
    Float2,
    /// 3-component float vector
    Float3,
    /// 4-component float vector
    Float4,
    /// 2x2 float matrix
    Float2x2,
    /// 3x3 float matrix
    Float3x3,
    /// 4x4 float matrix
    Float4x4,
    /// 32-bit signed integer scalar
    Int,
    /// 2-component integer vector
    Int2,
    /// 3-component integer vector
    Int3,
    /// 4-component integer vector
    Int4,
    /// 2D texture sampler (bound to a texture unit, never part of a buffer)
    Sampler,
    /// Cube texture sampler
    SamplerCube,
}

impl ConstType {
    /// Dense size in bytes of one element of this type, without any
    /// backend padding or row alignment
    pub fn size_bytes(self) -> u32 {
        match self {
            ConstType::Float | ConstType::Int => 4,
            ConstType::Float2 | ConstType::Int2 => 8,
            ConstType::Float3 | ConstType::Int3 => 12,
            ConstType::Float4 | ConstType::Int4 => 16,
            ConstType::Float2x2 => 16,
            ConstType::Float3x3 => 36,
            ConstType::Float4x4 => 64,
            // Samplers resolve to a register index, not buffer bytes
            ConstType::Sampler | ConstType::SamplerCube => 4,
        }
    }

    /// True for Sampler and SamplerCube
    pub fn is_sampler(self) -> bool {
        matches!(self, ConstType::Sampler | ConstType::SamplerCube)
    }

    /// True for the matrix variants
    pub fn is_matrix(self) -> bool {
        matches!(
            self,
            ConstType::Float2x2 | ConstType::Float3x3 | ConstType::Float4x4
        )
    }

    /// True for Int, Int2, Int3, Int4
    pub fn is_int(self) -> bool {
        matches!(
            self,
            ConstType::Int | ConstType::Int2 | ConstType::Int3 | ConstType::Int4
        )
    }

    /// Logical row count of a matrix type
    ///
    /// Only meaningful for matrix variants; returns 1 otherwise.
    pub fn matrix_rows(self) -> u32 {
        match self {
            ConstType::Float2x2 => 2,
            ConstType::Float3x3 => 3,
            ConstType::Float4x4 => 4,
            _ => 1,
        }
    }

    /// Logical column count of a matrix type
    ///
    /// Only meaningful for matrix variants; returns 1 otherwise.
    pub fn matrix_cols(self) -> u32 {
        match self {
            ConstType::Float2x2 => 2,
            ConstType::Float3x3 => 3,
            ConstType::Float4x4 => 4,
            _ => 1,
        }
    }

    /// Serialized tag for the shader cache blob
    pub fn to_raw(self) -> u8 {
        match self {
            ConstType::Float => 0,
            ConstType::Float2 => 1,
            ConstType::Float3 => 2,
            ConstType::Float4 => 3,
            ConstType::Float2x2 => 4,
            ConstType::Float3x3 => 5,
            ConstType::Float4x4 => 6,
            ConstType::Int => 7,
            ConstType::Int2 => 8,
            ConstType::Int3 => 9,
            ConstType::Int4 => 10,
            ConstType::Sampler => 11,
            ConstType::SamplerCube => 12,
        }
    }

    /// Inverse of [`to_raw`](Self::to_raw); None for unknown tags
    /// (stale or corrupt cache data)
    pub fn from_raw(raw: u8) -> Option<ConstType> {
        Some(match raw {
            0 => ConstType::Float,
            1 => ConstType::Float2,
            2 => ConstType::Float3,
            3 => ConstType::Float4,
            4 => ConstType::Float2x2,
            5 => ConstType::Float3x3,
            6 => ConstType::Float4x4,
            7 => ConstType::Int,
            8 => ConstType::Int2,
            9 => ConstType::Int3,
            10 => ConstType::Int4,
            11 => ConstType::Sampler,
            12 => ConstType::SamplerCube,
            _ => return None,
        })
    }
}

#[cfg(test)]
#[path = "const_type_tests.rs"]
mod tests;
