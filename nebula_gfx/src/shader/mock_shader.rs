/// Mock shader backend for unit tests (no GPU required)
///
/// This mock backend lets ShaderCore, device, and handle tests run
/// without a real compiler or graphics API: "compilation" commits a
/// canned reflection report, reloads can be told to fail, and const
/// buffers record the uploads they would have issued.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use crate::device::{DeviceConfig, GfxDevice, ReloadReport, ShaderRegistry};
use crate::error::{Error, Result};
use crate::shader::buffer::{GenericConstBuffer, GfxShaderConstBuffer};
use crate::shader::layout::{ConstBank, LayoutSet};
use crate::shader::shader::{GfxShader, ShaderCore, ShaderDesc, ShaderState};
use crate::shader::{SamplerDesc, ShaderStage};

// ============================================================================
// Mock reflection report
// ============================================================================

/// What the next mock "compile" reports
#[derive(Debug, Clone, Default)]
pub struct MockReflection {
    pub layouts: LayoutSet,
    pub samplers: Vec<SamplerDesc>,
}

// ============================================================================
// Mock shader
// ============================================================================

pub struct MockShader {
    core: ShaderCore,
    reflection: Mutex<MockReflection>,
    fail_next_reload: Mutex<bool>,
    compile_count: Mutex<u32>,
}

impl MockShader {
    /// Build a shader whose first compile commits `reflection`
    pub fn new(desc: ShaderDesc, reflection: MockReflection) -> Arc<Self> {
        let shader = Arc::new(Self {
            core: ShaderCore::new(desc),
            reflection: Mutex::new(reflection),
            fail_next_reload: Mutex::new(false),
            compile_count: Mutex::new(0),
        });
        shader.core.set_state(ShaderState::Compiling);
        shader.commit_current();
        shader
    }

    /// Replace what the next reload reflects
    pub fn set_reflection(&self, reflection: MockReflection) {
        *self.reflection.lock().unwrap() = reflection;
    }

    /// Make the next reload fail like a compile error
    pub fn fail_next_reload(&self) {
        *self.fail_next_reload.lock().unwrap() = true;
    }

    /// How many successful mock compiles have run
    pub fn compile_count(&self) -> u32 {
        *self.compile_count.lock().unwrap()
    }

    fn commit_current(&self) {
        let reflection = self.reflection.lock().unwrap().clone();
        let format = self.core.desc().instancing_format.clone();
        self.core
            .commit_reflection(reflection.layouts, reflection.samplers, format.as_ref());
        *self.compile_count.lock().unwrap() += 1;
    }
}

impl GfxShader for MockShader {
    fn core(&self) -> &ShaderCore {
        &self.core
    }

    fn reload(&self) -> Result<()> {
        if std::mem::take(&mut *self.fail_next_reload.lock().unwrap()) {
            return Err(Error::CompileFailed {
                stage: ShaderStage::Vertex,
                log: "mock compile failure".to_string(),
            });
        }
        self.commit_current();
        Ok(())
    }

    fn alloc_const_buffer(&self) -> Result<Arc<dyn GfxShaderConstBuffer>> {
        Ok(Arc::new(MockConstBuffer {
            generic: self.core.alloc_generic_buffer()?,
            uploads: Mutex::new(Vec::new()),
        }))
    }
}

// ============================================================================
// Mock const buffer
// ============================================================================

/// One upload a mock activate would have issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockUpload {
    pub bank_index: usize,
    pub bank: ConstBank,
    pub range: Range<u32>,
}

pub struct MockConstBuffer {
    generic: Arc<GenericConstBuffer>,
    pub uploads: Mutex<Vec<MockUpload>>,
}

impl MockConstBuffer {
    /// Drain the recorded uploads
    pub fn take_uploads(&self) -> Vec<MockUpload> {
        std::mem::take(&mut *self.uploads.lock().unwrap())
    }
}

impl GfxShaderConstBuffer for MockConstBuffer {
    fn generic(&self) -> &GenericConstBuffer {
        &self.generic
    }

    fn activate(&self, prev: Option<&dyn GfxShaderConstBuffer>) {
        let mut uploads = self.uploads.lock().unwrap();
        self.generic
            .activate_with(prev.map(|p| p.generic()), |bank_index, bank, _bytes, range| {
                uploads.push(MockUpload {
                    bank_index,
                    bank,
                    range,
                });
            });
    }
}

// ============================================================================
// Mock device
// ============================================================================

pub struct MockDevice {
    config: DeviceConfig,
    registry: ShaderRegistry,
    reflection: MockReflection,
}

impl MockDevice {
    pub fn new(config: DeviceConfig, reflection: MockReflection) -> Self {
        Self {
            config,
            registry: ShaderRegistry::new(),
            reflection,
        }
    }

    pub fn live_shader_count(&mut self) -> usize {
        self.registry.live_count()
    }
}

impl GfxDevice for MockDevice {
    fn create_shader(&mut self, desc: ShaderDesc) -> Result<Arc<dyn GfxShader>> {
        let shader: Arc<dyn GfxShader> = MockShader::new(desc, self.reflection.clone());
        self.registry.register(&shader);
        Ok(shader)
    }

    fn reload_shaders(&mut self) -> ReloadReport {
        self.registry.reload_all()
    }

    fn config(&self) -> &DeviceConfig {
        &self.config
    }
}
