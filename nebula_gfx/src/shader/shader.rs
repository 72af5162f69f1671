/// Shader orchestration: handle map, layout ownership, reload plumbing
///
/// Backends own program objects and reflection; everything that must
/// survive a recompile (the handle map, layout set, sampler list,
/// instancing constants, live-buffer registry) lives in ShaderCore and
/// is rebuilt through `commit_reflection`. Handles are never
/// reallocated, only invalidated and rebound, so references held by
/// material code stay good across live shader edits.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};

use crate::error::{Error, Result};
use crate::gfx_debug;
use crate::shader::buffer::GenericConstBuffer;
use crate::shader::handle::ShaderConstHandle;
use crate::shader::layout::LayoutSet;
use crate::shader::vertex_format::{VertexDeclType, VertexFormat};
use crate::shader::{ConstType, SamplerDesc, ShaderConstDesc, ShaderMacro};

const LOG_SOURCE: &str = "nebula::Shader";

/// Name of the shader-model macro injected into every compile
pub const SHADER_MODEL_MACRO: &str = "NEBULA_SM";

/// The shader-model macro for a compile (e.g. 3.0 becomes
/// `NEBULA_SM 30`)
pub fn shader_model_macro(shader_model: f32) -> ShaderMacro {
    ShaderMacro::new(
        SHADER_MODEL_MACRO,
        format!("{}", (shader_model * 10.0).round() as u32),
    )
}

// ===== STATES =====

/// Lifecycle of one shader object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderState {
    /// Created, no compile attempted yet
    Uninitialized,
    /// Compile/link in progress
    Compiling,
    /// Programs linked, reflection not yet committed
    Linked,
    /// Fully usable: reflection committed, handles bound
    Active,
    /// Compile or link failed with no usable program
    Failed,
}

// ===== DESC =====

/// Everything needed to build one shader
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// Vertex program source path
    pub vertex_path: PathBuf,
    /// Pixel program source path
    pub pixel_path: PathBuf,
    /// Target shader model (3.0 for the register-file generation, 5.0
    /// for the constant-buffer generation)
    pub shader_model: f32,
    /// Per-shader macros, appended after the device's global macros
    pub macros: Vec<ShaderMacro>,
    /// Per-instance vertex format, when the shader is instanced
    pub instancing_format: Option<VertexFormat>,
}

impl ShaderDesc {
    /// Descriptor with no extra macros and no instancing
    pub fn new(
        vertex_path: impl Into<PathBuf>,
        pixel_path: impl Into<PathBuf>,
        shader_model: f32,
    ) -> Self {
        Self {
            vertex_path: vertex_path.into(),
            pixel_path: pixel_path.into(),
            shader_model,
            macros: Vec::new(),
            instancing_format: None,
        }
    }
}

// ===== INSTANCING =====

/// One per-instance constant discovered from an instancing format
///
/// Consecutive elements sharing a semantic collapse into a single
/// entry; four float4 slots with one semantic read back as the 4x4
/// matrix they carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancingConst {
    /// Constant name: `$` followed by the element semantic
    pub name: Arc<str>,
    /// Constant type the shader sees
    pub const_type: ConstType,
    /// Byte offset within one instance's staging block
    pub offset: u32,
}

fn build_instancing_consts(format: &VertexFormat) -> (Vec<InstancingConst>, u32) {
    let elements = format.elements();
    let mut consts = Vec::new();
    let mut offset = 0u32;
    let mut i = 0;
    while i < elements.len() {
        let element = &elements[i];
        let mut run = 1;
        while i + run < elements.len() && elements[i + run].semantic == element.semantic {
            run += 1;
        }
        let run_size: u32 = elements[i..i + run]
            .iter()
            .map(|e| e.decl_type.size_bytes())
            .sum();
        let const_type = if run == 4 && element.decl_type == VertexDeclType::Float4 {
            ConstType::Float4x4
        } else {
            element.decl_type.const_type()
        };
        consts.push(InstancingConst {
            name: format!("${}", element.semantic).into(),
            const_type,
            offset,
        });
        offset += run_size;
        i += run;
    }
    (consts, offset)
}

// ===== CORE =====

new_key_type! {
    /// Key into a shader's live const-buffer registry
    pub struct ConstBufferKey;
}

#[derive(Debug)]
struct CoreState {
    state: ShaderState,
    handles: FxHashMap<Arc<str>, Arc<ShaderConstHandle>>,
    layouts: Arc<LayoutSet>,
    samplers: Vec<SamplerDesc>,
    instancing: Vec<InstancingConst>,
    instancing_stride: u32,
    buffers: SlotMap<ConstBufferKey, Weak<GenericConstBuffer>>,
    epoch: u32,
    reload_count: u32,
}

/// Backend-agnostic shader state
///
/// One per shader object, embedded in each backend's shader type. The
/// backend drives compilation and calls [`commit_reflection`]
/// (Self::commit_reflection) with what it reflected; the core owns
/// everything callers hold across reloads.
#[derive(Debug)]
pub struct ShaderCore {
    desc: ShaderDesc,
    inner: Mutex<CoreState>,
}

impl ShaderCore {
    /// Fresh core in the Uninitialized state
    pub fn new(desc: ShaderDesc) -> Self {
        Self {
            desc,
            inner: Mutex::new(CoreState {
                state: ShaderState::Uninitialized,
                handles: FxHashMap::default(),
                layouts: Arc::new(LayoutSet::new()),
                samplers: Vec::new(),
                instancing: Vec::new(),
                instancing_stride: 0,
                buffers: SlotMap::with_key(),
                epoch: 0,
                reload_count: 0,
            }),
        }
    }

    /// The descriptor this shader was created from
    pub fn desc(&self) -> &ShaderDesc {
        &self.desc
    }

    /// Current lifecycle state
    pub fn state(&self) -> ShaderState {
        match self.inner.lock() {
            Ok(inner) => inner.state,
            Err(_) => ShaderState::Failed,
        }
    }

    /// Backend hook for lifecycle transitions around compilation
    pub fn set_state(&self, state: ShaderState) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state = state;
        }
    }

    /// Number of successful recompiles after the first
    pub fn reload_count(&self) -> u32 {
        self.inner.lock().map(|inner| inner.reload_count).unwrap_or(0)
    }

    /// Bumps on every committed reflection; buffers compare epochs to
    /// reject stale previous-buffer comparisons
    pub fn epoch(&self) -> u32 {
        self.inner.lock().map(|inner| inner.epoch).unwrap_or(0)
    }

    /// The committed layout set
    pub fn layouts(&self) -> Arc<LayoutSet> {
        match self.inner.lock() {
            Ok(inner) => Arc::clone(&inner.layouts),
            Err(_) => Arc::new(LayoutSet::new()),
        }
    }

    /// The committed sampler list
    pub fn samplers(&self) -> Vec<SamplerDesc> {
        self.inner
            .lock()
            .map(|inner| inner.samplers.clone())
            .unwrap_or_default()
    }

    /// Per-instance constants, in stream order
    pub fn instancing_consts(&self) -> Vec<InstancingConst> {
        self.inner
            .lock()
            .map(|inner| inner.instancing.clone())
            .unwrap_or_default()
    }

    /// Bytes one instance occupies in the instancing stream
    pub fn instancing_stride(&self) -> u32 {
        self.inner
            .lock()
            .map(|inner| inner.instancing_stride)
            .unwrap_or(0)
    }

    /// Identity tag stamped into buffers allocated from this shader
    fn tag(&self) -> usize {
        self as *const ShaderCore as usize
    }

    // ===== HANDLES =====

    /// Get or create the handle for a constant name (never null)
    ///
    /// An unknown name yields a stored unbound handle that revalidates
    /// automatically if a future reload declares it. Names carry the
    /// `$` prefix.
    pub fn get_const_handle(&self, name: &str) -> Arc<ShaderConstHandle> {
        debug_assert!(
            name.starts_with('$'),
            "constant name '{}' is missing its '$' prefix",
            name
        );
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(handle) = inner.handles.get(name) {
                return Arc::clone(handle);
            }
            let key: Arc<str> = Arc::from(name);
            let handle = Arc::new(ShaderConstHandle::new_unbound(Arc::clone(&key)));
            inner.handles.insert(key, Arc::clone(&handle));
            handle
        } else {
            // Degraded path: hand out a detached unbound handle
            Arc::new(ShaderConstHandle::new_unbound(Arc::from(name)))
        }
    }

    /// Look up an existing handle without creating one
    ///
    /// Distinguishes "never requested and not declared" (None) from
    /// "exists but currently unbound" (a handle with `is_valid() ==
    /// false`).
    pub fn find_const_handle(&self, name: &str) -> Option<Arc<ShaderConstHandle>> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.handles.get(name).map(Arc::clone))
    }

    /// Full reflection list for the current program: every numeric
    /// constant once (first declaring bank wins), then every sampler
    /// with its bind register stored in `array_size`
    pub fn const_descs(&self) -> Vec<ShaderConstDesc> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let mut seen: FxHashSet<Arc<str>> = FxHashSet::default();
        let mut descs = Vec::new();
        for (_, layout) in inner.layouts.iter() {
            for param in layout.params() {
                if seen.insert(Arc::clone(&param.name)) {
                    descs.push(ShaderConstDesc {
                        name: Arc::clone(&param.name),
                        const_type: param.const_type,
                        array_size: param.array_size,
                    });
                }
            }
        }
        for sampler in &inner.samplers {
            descs.push(ShaderConstDesc {
                name: Arc::clone(&sampler.name),
                const_type: sampler.const_type,
                array_size: sampler.register,
            });
        }
        descs
    }

    // ===== REFLECTION COMMIT =====

    /// Swap in a freshly reflected program's metadata
    ///
    /// Invalidates every handle, rebinds the ones the new layouts,
    /// samplers, and instancing format still declare, then notifies
    /// every live const buffer to reallocate. Marks the shader Active.
    /// Called by backends only after a fully successful compile and
    /// link, so a failed recompile leaves the previous metadata (and
    /// program) in service.
    pub fn commit_reflection(
        &self,
        layouts: LayoutSet,
        samplers: Vec<SamplerDesc>,
        instancing_format: Option<&VertexFormat>,
    ) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let inner = &mut *inner;

        inner.epoch += 1;
        if inner.epoch > 1 {
            inner.reload_count += 1;
        }

        for handle in inner.handles.values() {
            handle.invalidate();
        }

        let layouts = Arc::new(layouts);
        let mut bound = 0usize;
        for (bank_index, (bank, layout)) in layouts.iter().enumerate() {
            for param in layout.params() {
                let handle = ensure_handle(&mut inner.handles, &param.name);
                handle.bind_buffer_param(bank_index, bank, param.clone());
                bound += 1;
            }
        }

        for sampler in &samplers {
            let handle = ensure_handle(&mut inner.handles, &sampler.name);
            handle.bind_sampler(sampler.const_type, sampler.register);
        }

        let (instancing, instancing_stride) = match instancing_format {
            Some(format) => build_instancing_consts(format),
            None => (Vec::new(), 0),
        };
        for entry in &instancing {
            let handle = ensure_handle(&mut inner.handles, &entry.name);
            handle.bind_instancing(entry.const_type, entry.offset);
        }

        inner.layouts = Arc::clone(&layouts);
        inner.samplers = samplers;
        inner.instancing = instancing;
        inner.instancing_stride = instancing_stride;
        inner.state = ShaderState::Active;

        inner.buffers.retain(|_, weak| match weak.upgrade() {
            Some(buffer) => {
                buffer.on_shader_reload(inner.epoch, Arc::clone(&layouts), instancing_stride);
                true
            }
            None => false,
        });

        gfx_debug!(
            LOG_SOURCE,
            "Committed reflection for '{}': {} constants, {} samplers, {} live buffers",
            self.desc.vertex_path.display(),
            bound,
            inner.samplers.len(),
            inner.buffers.len()
        );
    }

    // ===== BUFFERS =====

    /// Allocate a staging buffer against the current layouts and track
    /// it for reload notification
    pub fn alloc_generic_buffer(&self) -> Result<Arc<GenericConstBuffer>> {
        let tag = self.tag();
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::BackendError("shader core lock poisoned".to_string()))?;
        match inner.state {
            ShaderState::Linked | ShaderState::Active => {}
            state => {
                return Err(Error::InvalidResource(format!(
                    "cannot allocate a const buffer for '{}' in state {:?}",
                    self.desc.vertex_path.display(),
                    state
                )));
            }
        }
        let buffer = Arc::new(GenericConstBuffer::new(
            tag,
            inner.epoch,
            Arc::clone(&inner.layouts),
            inner.instancing_stride,
        ));
        inner.buffers.insert(Arc::downgrade(&buffer));
        Ok(buffer)
    }

    /// Buffers still alive against this shader (sweeps dead entries)
    pub fn live_buffer_count(&self) -> usize {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.buffers.retain(|_, weak| weak.strong_count() > 0);
                inner.buffers.len()
            }
            Err(_) => 0,
        }
    }
}

fn ensure_handle(
    handles: &mut FxHashMap<Arc<str>, Arc<ShaderConstHandle>>,
    name: &Arc<str>,
) -> Arc<ShaderConstHandle> {
    if let Some(handle) = handles.get(&**name) {
        return Arc::clone(handle);
    }
    let handle = Arc::new(ShaderConstHandle::new_unbound(Arc::clone(name)));
    handles.insert(Arc::clone(name), Arc::clone(&handle));
    handle
}

// ===== SHADER TRAIT =====

/// A compiled shader program pair with stable constant handles
///
/// Implemented by each backend. The handle and reflection surface all
/// forwards to [`ShaderCore`]; backends add compilation, program
/// ownership, and buffer construction.
pub trait GfxShader: Send + Sync {
    /// The backend-agnostic core
    fn core(&self) -> &ShaderCore;

    /// Recompile from source, keeping handles stable
    ///
    /// On failure the previously linked program stays in service and
    /// the error is returned; on success every live const buffer is
    /// reallocated against the new layouts.
    fn reload(&self) -> Result<()>;

    /// Allocate a const buffer sized to the current layouts
    ///
    /// Fails only if the shader never linked successfully.
    fn alloc_const_buffer(&self) -> Result<Arc<dyn crate::shader::GfxShaderConstBuffer>>;

    /// Get or create the handle for a constant name (never null)
    fn get_const_handle(&self, name: &str) -> Arc<ShaderConstHandle> {
        self.core().get_const_handle(name)
    }

    /// Look up an existing handle without creating one
    fn find_const_handle(&self, name: &str) -> Option<Arc<ShaderConstHandle>> {
        self.core().find_const_handle(name)
    }

    /// Full reflection list for the current program
    fn const_descs(&self) -> Vec<ShaderConstDesc> {
        self.core().const_descs()
    }

    /// Current lifecycle state
    fn state(&self) -> ShaderState {
        self.core().state()
    }

    /// Number of successful recompiles after the first
    fn reload_count(&self) -> u32 {
        self.core().reload_count()
    }
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
