/// Vertex format description
///
/// The shader core reads an instancing format to discover per-instance
/// constants: one element per vertex-stream slot, walked in order with
/// an accumulated byte offset. It never drives vertex declaration setup
/// here; that belongs to the embedding renderer.

use crate::shader::ConstType;

/// Element data type in a vertex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexDeclType {
    /// One 32-bit float
    Float,
    /// Two 32-bit floats
    Float2,
    /// Three 32-bit floats
    Float3,
    /// Four 32-bit floats
    Float4,
    /// Four normalized unsigned bytes, read as a float4 by the shader
    Color,
}

impl VertexDeclType {
    /// Bytes occupied in the vertex stream
    pub fn size_bytes(self) -> u32 {
        match self {
            VertexDeclType::Float => 4,
            VertexDeclType::Float2 => 8,
            VertexDeclType::Float3 => 12,
            VertexDeclType::Float4 => 16,
            VertexDeclType::Color => 4,
        }
    }

    /// The constant type a shader sees for this element
    pub fn const_type(self) -> ConstType {
        match self {
            VertexDeclType::Float => ConstType::Float,
            VertexDeclType::Float2 => ConstType::Float2,
            VertexDeclType::Float3 => ConstType::Float3,
            VertexDeclType::Float4 | VertexDeclType::Color => ConstType::Float4,
        }
    }
}

/// One element of a vertex format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexElement {
    /// Semantic name (e.g. "POSITION", "TRANSFORM")
    pub semantic: String,
    /// Distinguishes repeated semantics (TEXCOORD0, TEXCOORD1, ...)
    pub semantic_index: u32,
    /// Element data type
    pub decl_type: VertexDeclType,
    /// Vertex stream the element is fetched from
    pub stream_index: u32,
}

/// Ordered sequence of vertex elements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
}

impl VertexFormat {
    /// Create an empty format
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    /// Append an element
    pub fn add_element(
        &mut self,
        semantic: impl Into<String>,
        semantic_index: u32,
        decl_type: VertexDeclType,
        stream_index: u32,
    ) {
        self.elements.push(VertexElement {
            semantic: semantic.into(),
            semantic_index,
            decl_type,
            stream_index,
        });
    }

    /// Elements in declaration order
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Total bytes one entry of this format occupies in its stream
    pub fn stride(&self) -> u32 {
        self.elements.iter().map(|e| e.decl_type.size_bytes()).sum()
    }
}

#[cfg(test)]
#[path = "vertex_format_tests.rs"]
mod tests;
