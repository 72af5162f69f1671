//! Integration tests for the GL backend behind the device seam
//!
//! These tests drive the uniform-location backend the way a renderer
//! would: sampler units assigned at link, the program-level shadow
//! deduplicating uploads across materials, and program lifetime across
//! the hot-reload sweep. No GPU required; the native API is a
//! recording fake.
//!
//! Run with: cargo test --test gl_integration_tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use glam::Vec4;

use nebula_gfx::device::{DeviceConfig, GfxDevice, ReloadReport};
use nebula_gfx::error::{Error, Result};
use nebula_gfx::shader::{ConstType, GfxShader, ShaderDesc, ShaderStage, SourceProvider};
use nebula_gfx_gl::{GlApi, GlDevice, GlLinkedProgram, GlUniformDesc};

// ============================================================================
// FAKES
// ============================================================================

struct MemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl MemoryProvider {
    fn new() -> Arc<Self> {
        let mut files = HashMap::new();
        files.insert(
            PathBuf::from("shaders/mat.vert"),
            "#version 150\nvoid main() {}\n".to_string(),
        );
        files.insert(
            PathBuf::from("shaders/mat.frag"),
            "#version 150\nvoid main() {}\n".to_string(),
        );
        Arc::new(Self { files })
    }
}

impl SourceProvider for MemoryProvider {
    fn load(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::InvalidResource(format!("no file '{}'", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Call {
    UniformF { location: i32, data: Vec<f32> },
    UniformI { location: i32, data: Vec<i32> },
    Delete(u32),
}

struct FakeApi {
    link_count: Mutex<u32>,
    fail: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            link_count: Mutex::new(0),
            fail: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl GlApi for FakeApi {
    fn link_program(&self, _vertex_source: &str, _pixel_source: &str) -> Result<GlLinkedProgram> {
        if *self.fail.lock().unwrap() {
            return Err(Error::CompileFailed {
                stage: ShaderStage::Vertex,
                log: "fake link error".to_string(),
            });
        }
        let mut count = self.link_count.lock().unwrap();
        *count += 1;
        Ok(GlLinkedProgram {
            program: *count,
            uniforms: vec![
                GlUniformDesc {
                    name: "fogData".to_string(),
                    location: 0,
                    const_type: ConstType::Float4,
                    array_size: 1,
                },
                GlUniformDesc {
                    name: "diffuseColor".to_string(),
                    location: 1,
                    const_type: ConstType::Float4,
                    array_size: 1,
                },
                GlUniformDesc {
                    name: "diffuseMap".to_string(),
                    location: 2,
                    const_type: ConstType::Sampler,
                    array_size: 1,
                },
            ],
            warnings: None,
        })
    }

    fn delete_program(&self, program: u32) {
        self.calls.lock().unwrap().push(Call::Delete(program));
    }

    fn set_uniform_f(&self, location: i32, _const_type: ConstType, _count: u32, data: &[f32]) {
        self.calls.lock().unwrap().push(Call::UniformF {
            location,
            data: data.to_vec(),
        });
    }

    fn set_uniform_i(&self, location: i32, _const_type: ConstType, _count: u32, data: &[i32]) {
        self.calls.lock().unwrap().push(Call::UniformI {
            location,
            data: data.to_vec(),
        });
    }

    fn set_uniform_matrix(&self, _location: i32, _const_type: ConstType, _count: u32, _data: &[f32]) {
    }
}

fn desc() -> ShaderDesc {
    ShaderDesc::new("shaders/mat.vert", "shaders/mat.frag", 2.0)
}

fn device(api: &Arc<FakeApi>) -> GlDevice {
    GlDevice::new(
        api.clone() as Arc<dyn GlApi>,
        MemoryProvider::new(),
        DeviceConfig::default(),
    )
}

// ============================================================================
// LINK AND SAMPLER UNITS
// ============================================================================

#[test]
fn test_integration_link_assigns_sampler_unit() {
    let api = FakeApi::new();
    let mut device = device(&api);
    let shader = device.create_shader(desc()).unwrap();

    // The sampler got texture unit 0 at link
    assert!(api.take_calls().contains(&Call::UniformI {
        location: 2,
        data: vec![0]
    }));
    assert_eq!(
        shader.get_const_handle("$diffuseMap").sampler_register(),
        Some(0)
    );
}

// ============================================================================
// MATERIAL FRAME LOOP
// ============================================================================

#[test]
fn test_integration_shadow_deduplicates_across_materials() {
    let api = FakeApi::new();
    let mut device = device(&api);
    let shader = device.create_shader(desc()).unwrap();

    let fog = shader.get_const_handle("$fogData");
    let color = shader.get_const_handle("$diffuseColor");

    // Two materials sharing fog but differing in color
    let mat_a = shader.alloc_const_buffer().unwrap();
    mat_a.set_float4(&fog, Vec4::new(1.0, 2.0, 3.0, 4.0));
    mat_a.set_float4(&color, Vec4::new(1.0, 0.0, 0.0, 1.0));

    let mat_b = shader.alloc_const_buffer().unwrap();
    mat_b.set_float4(&fog, Vec4::new(1.0, 2.0, 3.0, 4.0));
    mat_b.set_float4(&color, Vec4::new(0.0, 1.0, 0.0, 1.0));

    mat_a.activate(None);
    api.take_calls();

    // The shared fog value is already on the device; only color uploads
    mat_b.activate(Some(mat_a.as_ref()));
    assert_eq!(
        api.take_calls(),
        vec![Call::UniformF {
            location: 1,
            data: vec![0.0, 1.0, 0.0, 1.0]
        }]
    );

    // Re-activating with no changes uploads nothing
    mat_b.activate(Some(mat_b.as_ref()));
    assert!(api.take_calls().is_empty());
}

// ============================================================================
// HOT RELOAD SWEEP
// ============================================================================

#[test]
fn test_integration_reload_sweep_replaces_program() {
    let api = FakeApi::new();
    let mut device = device(&api);
    let shader = device.create_shader(desc()).unwrap();
    let fog = shader.get_const_handle("$fogData");
    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.activate(None);
    api.take_calls();

    let report = device.reload_shaders();
    assert_eq!(
        report,
        ReloadReport {
            reloaded: 1,
            failed: 0
        }
    );

    // Old program deleted, handle identity preserved, buffer flagged
    assert!(api.take_calls().contains(&Call::Delete(1)));
    assert!(Arc::ptr_eq(&fog, &shader.get_const_handle("$fogData")));
    assert!(fog.is_valid());
    assert!(buffer.is_lost());
    buffer.activate(None);
    assert!(!buffer.is_lost());
}

#[test]
fn test_integration_failed_reload_keeps_program_in_service() {
    let api = FakeApi::new();
    let mut device = device(&api);
    let shader = device.create_shader(desc()).unwrap();
    let fog = shader.get_const_handle("$fogData");
    api.take_calls();

    api.set_fail(true);
    let report = device.reload_shaders();
    assert_eq!(
        report,
        ReloadReport {
            reloaded: 0,
            failed: 1
        }
    );
    assert!(fog.is_valid());
    assert!(!api.take_calls().contains(&Call::Delete(1)));

    // The previous program still accepts uploads
    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.set_float4(&fog, Vec4::ONE);
    buffer.activate(None);
    assert_eq!(
        api.take_calls(),
        vec![Call::UniformF {
            location: 0,
            data: vec![1.0, 1.0, 1.0, 1.0]
        }]
    );
}
