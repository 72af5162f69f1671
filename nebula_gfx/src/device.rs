/// GfxDevice trait - shader factory interface and plugin registry
///
/// The device is the explicit process-wide context the original system
/// kept in globals: the shader model, the global macro set, and the
/// cache location all live in a [`DeviceConfig`] passed to backend
/// construction. Exactly one concrete backend is selected at device
/// creation through the plugin registry; after that every shader the
/// device creates goes through the same vtable seam.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use slotmap::{new_key_type, SlotMap};

use crate::error::{Error, Result};
use crate::gfx_warn;
use crate::shader::{GfxShader, ShaderDesc, ShaderMacro};

const LOG_SOURCE: &str = "nebula::Device";

// ============================================================================
// Configuration
// ============================================================================

/// Device configuration
///
/// Replaces the original's process-global mutable state: global macros
/// and the shader model travel with the device instead of hiding in
/// statics.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Target shader model injected into every compile as the
    /// shader-model macro (3.0 for register files, 5.0 for constant
    /// blocks)
    pub shader_model: f32,
    /// Macros prepended to every shader's own macro list
    pub global_macros: Vec<ShaderMacro>,
    /// Directory for compiled-shader cache blobs; None disables caching
    pub cache_dir: Option<PathBuf>,
    /// Log per-shader reflection detail at Debug severity
    pub verbose_diagnostics: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            shader_model: 5.0,
            global_macros: Vec::new(),
            cache_dir: None,
            verbose_diagnostics: cfg!(debug_assertions),
        }
    }
}

// ============================================================================
// GfxDevice trait
// ============================================================================

/// Main device trait
///
/// This is the factory interface for creating shaders. Implemented by
/// backend-specific devices; one instance exists per process, created
/// when the graphics backend is selected.
pub trait GfxDevice: Send + Sync {
    /// Create and compile a shader
    ///
    /// # Arguments
    ///
    /// * `desc` - Shader descriptor (source paths, model, macros,
    ///   instancing format)
    ///
    /// # Returns
    ///
    /// A shared pointer to the compiled shader; a first-time compile
    /// failure is returned as an error
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn GfxShader>>;

    /// Recompile every live shader from source
    ///
    /// Shaders whose recompile fails keep their previous program and
    /// are reported in the returned count of failures; the hot-reload
    /// sweep never aborts part-way.
    fn reload_shaders(&mut self) -> ReloadReport;

    /// The configuration this device was created with
    fn config(&self) -> &DeviceConfig;
}

/// Outcome of a [`GfxDevice::reload_shaders`] sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Shaders recompiled successfully
    pub reloaded: u32,
    /// Shaders that failed and kept their previous program
    pub failed: u32,
}

// ============================================================================
// Shader registry (embedded by backend devices)
// ============================================================================

new_key_type! {
    /// Key into a device's live-shader registry
    pub struct ShaderKey;
}

/// Non-owning registry of the shaders a device has created
///
/// Backend devices embed one to drive [`GfxDevice::reload_shaders`].
/// Entries are weak; a shader dropped by the material system simply
/// disappears from the next sweep.
#[derive(Default)]
pub struct ShaderRegistry {
    shaders: SlotMap<ShaderKey, Weak<dyn GfxShader>>,
}

impl ShaderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            shaders: SlotMap::with_key(),
        }
    }

    /// Track a shader for hot reload
    pub fn register(&mut self, shader: &Arc<dyn GfxShader>) -> ShaderKey {
        self.shaders.insert(Arc::downgrade(shader))
    }

    /// Stop tracking a shader
    pub fn unregister(&mut self, key: ShaderKey) {
        self.shaders.remove(key);
    }

    /// Live shaders currently tracked (sweeps dead entries)
    pub fn live_count(&mut self) -> usize {
        self.shaders.retain(|_, weak| weak.strong_count() > 0);
        self.shaders.len()
    }

    /// Recompile every live shader, logging failures and carrying on
    pub fn reload_all(&mut self) -> ReloadReport {
        let mut report = ReloadReport::default();
        self.shaders.retain(|_, weak| match weak.upgrade() {
            Some(shader) => {
                match shader.reload() {
                    Ok(()) => report.reloaded += 1,
                    Err(e) => {
                        report.failed += 1;
                        gfx_warn!(
                            LOG_SOURCE,
                            "Reload failed for '{}', previous program kept: {}",
                            shader.core().desc().vertex_path.display(),
                            e
                        );
                    }
                }
                true
            }
            None => false,
        });
        report
    }
}

// ============================================================================
// Plugin system for registering device backends
// ============================================================================

/// Device plugin factory function type
type DevicePluginFactory =
    Box<dyn Fn(DeviceConfig) -> Result<Arc<Mutex<dyn GfxDevice>>> + Send + Sync>;

/// Plugin registry for device backends
pub struct DevicePluginRegistry {
    plugins: HashMap<&'static str, DevicePluginFactory>,
}

impl DevicePluginRegistry {
    /// Create a new plugin registry
    fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin
    ///
    /// # Arguments
    ///
    /// * `name` - Plugin name (e.g., "d3d11")
    /// * `factory` - Factory function to create the backend device
    pub fn register_plugin<F>(&mut self, name: &'static str, factory: F)
    where
        F: Fn(DeviceConfig) -> Result<Arc<Mutex<dyn GfxDevice>>> + Send + Sync + 'static,
    {
        self.plugins.insert(name, Box::new(factory));
    }

    /// Create a device using a registered plugin
    ///
    /// # Arguments
    ///
    /// * `plugin_name` - Name of the plugin to use
    /// * `config` - Device configuration
    ///
    /// # Returns
    ///
    /// A shared, thread-safe device instance
    pub fn create_device(
        &self,
        plugin_name: &str,
        config: DeviceConfig,
    ) -> Result<Arc<Mutex<dyn GfxDevice>>> {
        self.plugins
            .get(plugin_name)
            .ok_or_else(|| {
                Error::InitializationFailed(format!("Plugin '{}' not found", plugin_name))
            })?(config)
    }
}

static DEVICE_REGISTRY: Mutex<Option<DevicePluginRegistry>> = Mutex::new(None);

/// Get the global device plugin registry
pub fn device_plugin_registry() -> &'static Mutex<Option<DevicePluginRegistry>> {
    // Initialize on first access
    let mut registry = DEVICE_REGISTRY.lock().unwrap();
    if registry.is_none() {
        *registry = Some(DevicePluginRegistry::new());
    }
    drop(registry);
    &DEVICE_REGISTRY
}

/// Register a device plugin in the global registry
///
/// # Arguments
///
/// * `name` - Plugin name
/// * `factory` - Factory function
pub fn register_device_plugin<F>(name: &'static str, factory: F)
where
    F: Fn(DeviceConfig) -> Result<Arc<Mutex<dyn GfxDevice>>> + Send + Sync + 'static,
{
    device_plugin_registry()
        .lock()
        .unwrap()
        .as_mut()
        .unwrap()
        .register_plugin(name, factory);
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
