//! Unit tests for device.rs
//!
//! Covers configuration defaults, the live-shader registry with its
//! reload sweep, and the backend plugin registry.

use std::sync::{Arc, Mutex};

use crate::device::{
    register_device_plugin, device_plugin_registry, DeviceConfig, GfxDevice, ReloadReport,
    ShaderRegistry,
};
use crate::shader::layout::{ConstBank, ConstBufferLayout, ConstParamDesc, LayoutSet};
use crate::shader::mock_shader::{MockDevice, MockReflection, MockShader};
use crate::shader::shader::{GfxShader, ShaderDesc};
use crate::shader::ConstType;

fn reflection() -> MockReflection {
    let mut program = ConstBufferLayout::new();
    program.add_parameter(ConstParamDesc {
        name: "$modelMat".into(),
        const_type: ConstType::Float4x4,
        offset: 0,
        size: 64,
        array_size: 1,
        align_value: 16,
    });
    let mut layouts = LayoutSet::new();
    layouts.push(ConstBank::Program, program);
    MockReflection {
        layouts,
        samplers: Vec::new(),
    }
}

fn desc(name: &str) -> ShaderDesc {
    ShaderDesc::new(format!("shaders/{}.vert", name), format!("shaders/{}.frag", name), 5.0)
}

// ===== CONFIG =====

#[test]
fn test_config_default() {
    let config = DeviceConfig::default();
    assert_eq!(config.shader_model, 5.0);
    assert!(config.global_macros.is_empty());
    assert!(config.cache_dir.is_none());
    assert_eq!(config.verbose_diagnostics, cfg!(debug_assertions));
}

// ===== SHADER REGISTRY =====

#[test]
fn test_registry_tracks_and_sweeps_shaders() {
    let mut registry = ShaderRegistry::new();
    let shader: Arc<dyn GfxShader> = MockShader::new(desc("a"), reflection());
    registry.register(&shader);
    assert_eq!(registry.live_count(), 1);

    drop(shader);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_registry_unregister() {
    let mut registry = ShaderRegistry::new();
    let shader: Arc<dyn GfxShader> = MockShader::new(desc("a"), reflection());
    let key = registry.register(&shader);
    registry.unregister(key);
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_reload_all_reports_failures_and_continues() {
    let mut registry = ShaderRegistry::new();
    let good = MockShader::new(desc("good"), reflection());
    let bad = MockShader::new(desc("bad"), reflection());
    bad.fail_next_reload();

    let good_dyn: Arc<dyn GfxShader> = good.clone();
    let bad_dyn: Arc<dyn GfxShader> = bad.clone();
    registry.register(&good_dyn);
    registry.register(&bad_dyn);

    let report = registry.reload_all();
    assert_eq!(
        report,
        ReloadReport {
            reloaded: 1,
            failed: 1
        }
    );

    // The failed shader stays registered for the next sweep
    assert_eq!(registry.live_count(), 2);
    assert_eq!(registry.reload_all().reloaded, 2);
}

#[test]
fn test_mock_device_reload_shaders() {
    let mut device = MockDevice::new(DeviceConfig::default(), reflection());
    let shader = device.create_shader(desc("a")).unwrap();
    let _other = device.create_shader(desc("b")).unwrap();
    assert_eq!(device.live_shader_count(), 2);

    let report = device.reload_shaders();
    assert_eq!(report.reloaded, 2);
    assert_eq!(shader.reload_count(), 1);
}

// ===== PLUGIN REGISTRY =====

#[test]
fn test_plugin_registration_and_creation() {
    register_device_plugin("mock_test_backend", |config| {
        Ok(Arc::new(Mutex::new(MockDevice::new(config, reflection())))
            as Arc<Mutex<dyn GfxDevice>>)
    });

    let registry = device_plugin_registry().lock().unwrap();
    let device = registry
        .as_ref()
        .unwrap()
        .create_device("mock_test_backend", DeviceConfig::default())
        .unwrap();
    drop(registry);

    let mut guard = device.lock().unwrap();
    let shader = guard.create_shader(desc("plugin")).unwrap();
    assert!(shader.get_const_handle("$modelMat").is_valid());
}

#[test]
fn test_unknown_plugin_fails_creation() {
    let registry = device_plugin_registry().lock().unwrap();
    let result = registry
        .as_ref()
        .unwrap()
        .create_device("no_such_backend", DeviceConfig::default());
    assert!(result.is_err());
}
