//! Unit tests for const_type.rs

use crate::shader::ConstType;

// ============================================================================
// SIZE TESTS
// ============================================================================

#[test]
fn test_scalar_and_vector_sizes() {
    assert_eq!(ConstType::Float.size_bytes(), 4);
    assert_eq!(ConstType::Float2.size_bytes(), 8);
    assert_eq!(ConstType::Float3.size_bytes(), 12);
    assert_eq!(ConstType::Float4.size_bytes(), 16);
    assert_eq!(ConstType::Int.size_bytes(), 4);
    assert_eq!(ConstType::Int2.size_bytes(), 8);
    assert_eq!(ConstType::Int3.size_bytes(), 12);
    assert_eq!(ConstType::Int4.size_bytes(), 16);
}

#[test]
fn test_matrix_sizes_are_dense() {
    // Dense sizes; row padding is a layout concern, not a type concern
    assert_eq!(ConstType::Float2x2.size_bytes(), 16);
    assert_eq!(ConstType::Float3x3.size_bytes(), 36);
    assert_eq!(ConstType::Float4x4.size_bytes(), 64);
}

// ============================================================================
// CLASSIFICATION TESTS
// ============================================================================

#[test]
fn test_is_sampler() {
    assert!(ConstType::Sampler.is_sampler());
    assert!(ConstType::SamplerCube.is_sampler());
    assert!(!ConstType::Float.is_sampler());
    assert!(!ConstType::Float4x4.is_sampler());
    assert!(!ConstType::Int4.is_sampler());
}

#[test]
fn test_is_matrix() {
    assert!(ConstType::Float2x2.is_matrix());
    assert!(ConstType::Float3x3.is_matrix());
    assert!(ConstType::Float4x4.is_matrix());
    assert!(!ConstType::Float4.is_matrix());
    assert!(!ConstType::Sampler.is_matrix());
}

#[test]
fn test_is_int() {
    assert!(ConstType::Int.is_int());
    assert!(ConstType::Int2.is_int());
    assert!(ConstType::Int3.is_int());
    assert!(ConstType::Int4.is_int());
    assert!(!ConstType::Float.is_int());
    assert!(!ConstType::Sampler.is_int());
}

#[test]
fn test_matrix_dimensions() {
    assert_eq!(ConstType::Float2x2.matrix_rows(), 2);
    assert_eq!(ConstType::Float2x2.matrix_cols(), 2);
    assert_eq!(ConstType::Float3x3.matrix_rows(), 3);
    assert_eq!(ConstType::Float3x3.matrix_cols(), 3);
    assert_eq!(ConstType::Float4x4.matrix_rows(), 4);
    assert_eq!(ConstType::Float4x4.matrix_cols(), 4);
}

// ============================================================================
// SERIALIZATION TAG TESTS
// ============================================================================

#[test]
fn test_raw_round_trip_all_variants() {
    let all = [
        ConstType::Float,
        ConstType::Float2,
        ConstType::Float3,
        ConstType::Float4,
        ConstType::Float2x2,
        ConstType::Float3x3,
        ConstType::Float4x4,
        ConstType::Int,
        ConstType::Int2,
        ConstType::Int3,
        ConstType::Int4,
        ConstType::Sampler,
        ConstType::SamplerCube,
    ];
    for ty in all {
        assert_eq!(ConstType::from_raw(ty.to_raw()), Some(ty));
    }
}

#[test]
fn test_from_raw_rejects_unknown_tags() {
    assert_eq!(ConstType::from_raw(13), None);
    assert_eq!(ConstType::from_raw(0xFF), None);
}
