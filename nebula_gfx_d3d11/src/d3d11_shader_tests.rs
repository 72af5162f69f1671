//! Unit tests for d3d11_shader.rs
//!
//! Covers cbuffer concatenation into the logical layout, minimal
//! sub-buffer uploads, the sampler surface, cache fast-path loading
//! with its sub-buffer table, and failed-reload retention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec4};

use nebula_gfx::device::DeviceConfig;
use nebula_gfx::error::{Error, Result};
use nebula_gfx::shader::layout::ConstBank;
use nebula_gfx::shader::{
    ConstType, GfxShader, GfxShaderConstBuffer, ShaderDesc, ShaderStage, SourceProvider,
};

use crate::d3d11::{
    stage_profile, D3d11Api, D3d11CbufferDesc, D3d11CompiledStage, D3d11SamplerBindDesc,
    D3d11VariableDesc,
};
use crate::d3d11_shader::D3d11Shader;

use super::translate_stage;

// ===== FAKES =====

struct MemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl MemoryProvider {
    fn new(files: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            files: files
                .iter()
                .map(|(path, text)| (PathBuf::from(path), text.to_string()))
                .collect(),
        })
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
struct Update {
    stage: ShaderStage,
    slot: u32,
    bytes: Vec<u8>,
}

struct FakeApi {
    compile_count: Mutex<u32>,
    fail: Mutex<bool>,
    updates: Mutex<Vec<Update>>,
}

impl FakeApi {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            compile_count: Mutex::new(0),
            fail: Mutex::new(false),
            updates: Mutex::new(Vec::new()),
        })
    }

    fn compile_count(&self) -> u32 {
        *self.compile_count.lock().unwrap()
    }

    fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn take_updates(&self) -> Vec<Update> {
        std::mem::take(&mut *self.updates.lock().unwrap())
    }
}

fn variable(name: &str, const_type: ConstType, offset: u32, size: u32) -> D3d11VariableDesc {
    D3d11VariableDesc {
        name: name.to_string(),
        offset,
        size,
        const_type,
        array_size: 1,
    }
}

impl D3d11Api for FakeApi {
    fn compile(
        &self,
        stage: ShaderStage,
        _source: &str,
        _profile: &str,
    ) -> Result<D3d11CompiledStage> {
        if *self.fail.lock().unwrap() {
            return Err(Error::CompileFailed {
                stage,
                log: "fake compile error".to_string(),
            });
        }
        *self.compile_count.lock().unwrap() += 1;
        let (cbuffers, samplers) = match stage {
            ShaderStage::Vertex => (
                vec![
                    D3d11CbufferDesc {
                        name: "$Globals".to_string(),
                        size: 80,
                        variables: vec![
                            variable("modelMat", ConstType::Float4x4, 0, 64),
                            variable("fogData", ConstType::Float4, 64, 16),
                        ],
                    },
                    D3d11CbufferDesc {
                        name: "PerObject".to_string(),
                        size: 16,
                        variables: vec![variable("objectTint", ConstType::Float4, 0, 16)],
                    },
                ],
                Vec::new(),
            ),
            ShaderStage::Pixel => (
                vec![D3d11CbufferDesc {
                    name: "$Globals".to_string(),
                    size: 32,
                    variables: vec![
                        variable("diffuseColor", ConstType::Float4, 0, 16),
                        variable("visCount", ConstType::Int, 16, 4),
                    ],
                }],
                vec![
                    D3d11SamplerBindDesc {
                        name: "diffuseMap".to_string(),
                        slot: 2,
                        is_cube: false,
                    },
                    D3d11SamplerBindDesc {
                        name: "skyMap".to_string(),
                        slot: 0,
                        is_cube: true,
                    },
                ],
            ),
        };
        Ok(D3d11CompiledStage {
            bytecode: format!("{:?}-bytecode", stage).into_bytes(),
            cbuffers,
            samplers,
            warnings: None,
        })
    }

    fn update_block(&self, stage: ShaderStage, slot: u32, bytes: &[u8]) {
        self.updates.lock().unwrap().push(Update {
            stage,
            slot,
            bytes: bytes.to_vec(),
        });
    }
}

fn provider() -> Arc<MemoryProvider> {
    MemoryProvider::new(&[
        ("shaders/test.vert", "// vertex\n"),
        ("shaders/test.frag", "// pixel\n"),
    ])
}

fn desc() -> ShaderDesc {
    ShaderDesc::new("shaders/test.vert", "shaders/test.frag", 5.0)
}

fn build_shader(api: &Arc<FakeApi>) -> Arc<D3d11Shader> {
    D3d11Shader::new(
        desc(),
        api.clone() as Arc<dyn D3d11Api>,
        provider(),
        &DeviceConfig::default(),
    )
    .unwrap()
}

// ===== TRANSLATION =====

#[test]
fn test_stage_profile_format() {
    assert_eq!(stage_profile(ShaderStage::Vertex, 5.0), "vs_5_0");
    assert_eq!(stage_profile(ShaderStage::Pixel, 4.1), "ps_4_1");
}

#[test]
fn test_translate_stage_concatenates_cbuffers() {
    let cbuffers = vec![
        D3d11CbufferDesc {
            name: "$Globals".to_string(),
            size: 80,
            variables: vec![
                variable("modelMat", ConstType::Float4x4, 0, 64),
                variable("fogData", ConstType::Float4, 64, 16),
            ],
        },
        D3d11CbufferDesc {
            name: "PerObject".to_string(),
            size: 16,
            variables: vec![variable("objectTint", ConstType::Float4, 0, 16)],
        },
    ];
    let (layout, subs) = translate_stage(&cbuffers);

    // Sub-buffers are contiguous at the running offset
    assert_eq!(subs.len(), 2);
    assert_eq!((subs[0].start, subs[0].size), (0, 80));
    assert_eq!((subs[1].start, subs[1].size), (80, 16));

    // Second cbuffer's variable shifts by its cbuffer start
    let tint = layout.lookup("$objectTint").unwrap();
    assert_eq!(tint.offset, 80);
    assert_eq!(tint.align_value, 4);

    // Matrices keep the 16-byte row stride
    let mat = layout.lookup("$modelMat").unwrap();
    assert_eq!(mat.offset, 0);
    assert_eq!(mat.align_value, 16);

    assert_eq!(layout.buffer_size(), 96);
}

#[test]
fn test_array_variables_get_register_stride() {
    let cbuffers = vec![D3d11CbufferDesc {
        name: "$Globals".to_string(),
        size: 64,
        variables: vec![D3d11VariableDesc {
            name: "bones".to_string(),
            offset: 0,
            size: 64,
            const_type: ConstType::Float4,
            array_size: 4,
        }],
    }];
    let (layout, _) = translate_stage(&cbuffers);
    let bones = layout.lookup("$bones").unwrap();
    assert_eq!(bones.array_size, 4);
    assert_eq!(bones.align_value, 16);
    assert_eq!(bones.element_size(), 16);
}

// ===== FULL SHADER FLOW =====

#[test]
fn test_value_in_one_cbuffer_uploads_only_that_sub_buffer() {
    let api = FakeApi::new();
    let shader = build_shader(&api);
    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.activate(None);
    api.take_updates();

    // $objectTint lives alone in the second vertex cbuffer
    buffer.set_float4(
        &shader.get_const_handle("$objectTint"),
        Vec4::new(1.0, 0.5, 0.25, 1.0),
    );
    buffer.activate(Some(buffer.as_ref()));

    let updates = api.take_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].stage, ShaderStage::Vertex);
    assert_eq!(updates[0].slot, 1);
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(&updates[0].bytes);
    assert_eq!(data, vec![1.0, 0.5, 0.25, 1.0]);
}

#[test]
fn test_dirty_sub_buffer_uploads_in_full() {
    let api = FakeApi::new();
    let shader = build_shader(&api);
    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.activate(None);
    api.take_updates();

    buffer.set_float4(
        &shader.get_const_handle("$fogData"),
        Vec4::new(0.5, 0.25, 0.0, 1.0),
    );
    buffer.activate(Some(buffer.as_ref()));

    // $fogData dirties bytes 64..80, but its whole cbuffer goes out
    let updates = api.take_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].slot, 0);
    assert_eq!(updates[0].bytes.len(), 80);
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(&updates[0].bytes);
    assert_eq!(&data[16..], &[0.5, 0.25, 0.0, 1.0]);
}

#[test]
fn test_matrix_stores_transposed_in_first_sub_buffer() {
    let api = FakeApi::new();
    let shader = build_shader(&api);
    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.activate(None);
    api.take_updates();

    let m = Mat4::from_cols(
        Vec4::new(1.0, 2.0, 3.0, 4.0),
        Vec4::new(5.0, 6.0, 7.0, 8.0),
        Vec4::new(9.0, 10.0, 11.0, 12.0),
        Vec4::new(13.0, 14.0, 15.0, 16.0),
    );
    buffer.set_matrix(&shader.get_const_handle("$modelMat"), &m);
    buffer.activate(Some(buffer.as_ref()));

    let updates = api.take_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].slot, 0);
    let data: Vec<f32> = bytemuck::pod_collect_to_vec(&updates[0].bytes);
    // Row-major rows of m: the transpose of its column-major storage
    assert_eq!(&data[0..4], &[1.0, 5.0, 9.0, 13.0]);
    assert_eq!(&data[12..16], &[4.0, 8.0, 12.0, 16.0]);
}

#[test]
fn test_identical_buffers_upload_nothing() {
    let api = FakeApi::new();
    let shader = build_shader(&api);

    let a = shader.alloc_const_buffer().unwrap();
    let b = shader.alloc_const_buffer().unwrap();
    let color = shader.get_const_handle("$diffuseColor");
    a.set_float4(&color, Vec4::ONE);
    b.set_float4(&color, Vec4::ONE);

    a.activate(None);
    api.take_updates();

    b.activate(Some(a.as_ref()));
    assert!(api.take_updates().is_empty());
}

#[test]
fn test_sampler_handles_and_numeric_noop() {
    let api = FakeApi::new();
    let shader = build_shader(&api);

    let map = shader.get_const_handle("$diffuseMap");
    assert!(map.is_sampler());
    assert_eq!(map.sampler_register(), Some(2));

    let sky = shader.get_const_handle("$skyMap");
    assert_eq!(sky.sampler_register(), Some(0));

    let buffer = shader.alloc_const_buffer().unwrap();
    buffer.set_float4(&map, Vec4::ONE);
    assert!(!buffer.generic().is_dirty());
}

#[test]
fn test_failed_reload_keeps_previous_program() {
    let api = FakeApi::new();
    let shader = build_shader(&api);
    let handle = shader.get_const_handle("$modelMat");
    let bytecode = shader.vertex_bytecode();

    api.set_fail(true);
    assert!(shader.reload().is_err());
    assert!(handle.is_valid());
    assert_eq!(shader.vertex_bytecode(), bytecode);
    assert_eq!(shader.reload_count(), 0);

    api.set_fail(false);
    shader.reload().unwrap();
    assert_eq!(shader.reload_count(), 1);
}

#[test]
fn test_first_compile_failure_is_an_error() {
    let api = FakeApi::new();
    api.set_fail(true);
    let result = D3d11Shader::new(
        desc(),
        api.clone() as Arc<dyn D3d11Api>,
        provider(),
        &DeviceConfig::default(),
    );
    assert!(result.is_err());
}

// ===== CACHE =====

#[test]
fn test_cache_replays_layouts_and_sub_buffers() {
    let cache_dir = std::env::temp_dir().join(format!(
        "nebula_d3d11_cache_{}_{:x}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let config = DeviceConfig {
        cache_dir: Some(cache_dir.clone()),
        ..DeviceConfig::default()
    };

    let api = FakeApi::new();
    let first = D3d11Shader::new(desc(), api.clone() as Arc<dyn D3d11Api>, provider(), &config)
        .unwrap();
    assert_eq!(api.compile_count(), 2);

    let second = D3d11Shader::new(desc(), api.clone() as Arc<dyn D3d11Api>, provider(), &config)
        .unwrap();
    assert_eq!(api.compile_count(), 2);

    assert_eq!(first.vertex_bytecode(), second.vertex_bytecode());
    assert_eq!(first.const_descs(), second.const_descs());
    assert_eq!(first.sub_buffers(0), second.sub_buffers(0));
    assert_eq!(first.sub_buffers(1), second.sub_buffers(1));
    assert!(second.get_const_handle("$skyMap").is_sampler());

    // Uploads still target the replayed sub-buffer table
    api.take_updates();
    let buffer = second.alloc_const_buffer().unwrap();
    buffer.set_float4(&second.get_const_handle("$objectTint"), Vec4::ONE);
    buffer.activate(None);
    let updates = api.take_updates();
    assert!(updates
        .iter()
        .any(|u| u.stage == ShaderStage::Vertex && u.slot == 1));

    std::fs::remove_dir_all(&cache_dir).ok();
}

#[test]
fn test_both_stage_banks_present() {
    let api = FakeApi::new();
    let shader = build_shader(&api);
    let layouts = shader.core().layouts();
    assert_eq!(layouts.len(), 2);
    assert!(layouts.get(ConstBank::Vertex).is_some());
    assert!(layouts.get(ConstBank::Pixel).is_some());
}
