//! Unit tests for vertex_format.rs

use crate::shader::vertex_format::{VertexDeclType, VertexFormat};
use crate::shader::ConstType;

#[test]
fn test_decl_type_sizes() {
    assert_eq!(VertexDeclType::Float.size_bytes(), 4);
    assert_eq!(VertexDeclType::Float2.size_bytes(), 8);
    assert_eq!(VertexDeclType::Float3.size_bytes(), 12);
    assert_eq!(VertexDeclType::Float4.size_bytes(), 16);
    assert_eq!(VertexDeclType::Color.size_bytes(), 4);
}

#[test]
fn test_decl_type_to_const_type() {
    assert_eq!(VertexDeclType::Float.const_type(), ConstType::Float);
    assert_eq!(VertexDeclType::Float2.const_type(), ConstType::Float2);
    assert_eq!(VertexDeclType::Float3.const_type(), ConstType::Float3);
    assert_eq!(VertexDeclType::Float4.const_type(), ConstType::Float4);
    assert_eq!(VertexDeclType::Color.const_type(), ConstType::Float4);
}

#[test]
fn test_format_preserves_declaration_order() {
    let mut format = VertexFormat::new();
    format.add_element("TRANSFORM", 0, VertexDeclType::Float4, 1);
    format.add_element("TRANSFORM", 1, VertexDeclType::Float4, 1);
    format.add_element("INSTANCE_COLOR", 0, VertexDeclType::Color, 1);

    let elements = format.elements();
    assert_eq!(elements.len(), 3);
    assert_eq!(elements[0].semantic, "TRANSFORM");
    assert_eq!(elements[0].semantic_index, 0);
    assert_eq!(elements[1].semantic_index, 1);
    assert_eq!(elements[2].semantic, "INSTANCE_COLOR");
    assert_eq!(elements[2].decl_type, VertexDeclType::Color);
}

#[test]
fn test_format_stride() {
    let mut format = VertexFormat::new();
    assert_eq!(format.stride(), 0);

    format.add_element("TRANSFORM", 0, VertexDeclType::Float4, 1);
    format.add_element("TRANSFORM", 1, VertexDeclType::Float4, 1);
    format.add_element("TRANSFORM", 2, VertexDeclType::Float4, 1);
    format.add_element("TRANSFORM", 3, VertexDeclType::Float4, 1);
    format.add_element("INSTANCE_COLOR", 0, VertexDeclType::Color, 1);
    assert_eq!(format.stride(), 68);
}
