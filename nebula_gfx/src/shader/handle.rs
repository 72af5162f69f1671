/// Stable identity for a named shader constant
///
/// A handle is created the first time a name is requested and lives as
/// long as the owning shader. Reloads never reallocate handles; the
/// shader invalidates every handle, then rebinds the ones the fresh
/// reflection still declares, so material code can hold a handle across
/// live shader edits. Writes through an unbound handle are silently
/// ignored, which lets callers probe for optional constants without
/// branching on presence.

use std::sync::{Arc, RwLock};

use crate::shader::layout::{ConstBank, ConstParamDesc};
use crate::shader::{ConstType, StageFlags};

// ===== BINDING =====

/// One stage's resolution of a buffer-backed constant
///
/// A name declared by both stages gets one [`StageBinding`] per bank,
/// tracked independently because each stage reflects its own offset.
#[derive(Debug, Clone)]
pub struct StageBinding {
    /// Index into the shader's layout set and the const buffer's
    /// backing stores
    pub bank_index: usize,
    /// Bank discriminant, checked at the write entry point
    pub bank: ConstBank,
    /// Offset, type, and stride information for this bank
    pub param: ConstParamDesc,
}

/// What a handle currently resolves to
#[derive(Debug, Clone)]
pub enum HandleBinding {
    /// Name not declared by the current program; writes are ignored
    Unbound,
    /// Numeric constant living in one or more backing buffers
    Buffer(Vec<StageBinding>),
    /// Texture sampler with a fixed unit / bind register; never part of
    /// a numeric buffer, bound by the renderer directly
    Sampler {
        /// Resolved texture unit / bind register
        register: u32,
    },
    /// Per-instance constant supplied through a vertex stream; writes
    /// go to the const buffer's instancing staging area
    Instancing {
        /// Byte offset into one instance's staging block
        offset: u32,
    },
}

#[derive(Debug)]
struct HandleState {
    binding: HandleBinding,
    const_type: Option<ConstType>,
    array_size: u32,
}

// ===== HANDLE =====

/// A named constant's identity across the lifetime of one shader
///
/// Owned by the shader's handle map; callers share it as
/// `Arc<ShaderConstHandle>`.
#[derive(Debug)]
pub struct ShaderConstHandle {
    name: Arc<str>,
    state: RwLock<HandleState>,
}

impl ShaderConstHandle {
    pub(crate) fn new_unbound(name: Arc<str>) -> Self {
        Self {
            name,
            state: RwLock::new(HandleState {
                binding: HandleBinding::Unbound,
                const_type: None,
                array_size: 0,
            }),
        }
    }

    /// Constant name including the `$` prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if the current program declares this constant
    pub fn is_valid(&self) -> bool {
        match self.state.read() {
            Ok(state) => !matches!(state.binding, HandleBinding::Unbound),
            Err(_) => false,
        }
    }

    /// Resolved type, from whichever stage declares the constant.
    /// None while unbound.
    pub fn const_type(&self) -> Option<ConstType> {
        self.state.read().ok().and_then(|state| state.const_type)
    }

    /// Resolved element count (>= 1 while bound, 0 while unbound)
    pub fn array_size(&self) -> u32 {
        self.state.read().map(|state| state.array_size).unwrap_or(0)
    }

    /// True if this handle resolved to a texture sampler
    pub fn is_sampler(&self) -> bool {
        match self.state.read() {
            Ok(state) => matches!(state.binding, HandleBinding::Sampler { .. }),
            Err(_) => false,
        }
    }

    /// Resolved texture unit / bind register for sampler handles
    pub fn sampler_register(&self) -> Option<u32> {
        self.state.read().ok().and_then(|state| match state.binding {
            HandleBinding::Sampler { register } => Some(register),
            _ => None,
        })
    }

    /// True if writes to this handle target the per-instance staging
    /// area instead of the constant buffer proper
    pub fn is_instancing(&self) -> bool {
        match self.state.read() {
            Ok(state) => matches!(state.binding, HandleBinding::Instancing { .. }),
            Err(_) => false,
        }
    }

    /// Byte offset into one instance's staging block
    pub fn instancing_offset(&self) -> Option<u32> {
        self.state.read().ok().and_then(|state| match state.binding {
            HandleBinding::Instancing { offset } => Some(offset),
            _ => None,
        })
    }

    /// Stages that read this constant (empty while unbound and for
    /// sampler or instancing handles)
    pub fn stage_flags(&self) -> StageFlags {
        match self.state.read() {
            Ok(state) => match &state.binding {
                HandleBinding::Buffer(stages) => stages
                    .iter()
                    .fold(StageFlags::empty(), |acc, s| acc | s.bank.stage_flags()),
                _ => StageFlags::empty(),
            },
            Err(_) => StageFlags::empty(),
        }
    }

    /// Run `f` against the current binding without cloning it. A
    /// poisoned lock reads as unbound, so writes degrade to no-ops.
    pub(crate) fn with_binding<R>(&self, f: impl FnOnce(&HandleBinding) -> R) -> R {
        match self.state.read() {
            Ok(state) => f(&state.binding),
            Err(_) => f(&HandleBinding::Unbound),
        }
    }

    /// Drop all bindings ahead of a reflection rebuild
    pub(crate) fn invalidate(&self) {
        if let Ok(mut state) = self.state.write() {
            state.binding = HandleBinding::Unbound;
            state.const_type = None;
            state.array_size = 0;
        }
    }

    /// Bind (or add a stage to) a buffer-backed constant
    pub(crate) fn bind_buffer_param(&self, bank_index: usize, bank: ConstBank, param: ConstParamDesc) {
        if let Ok(mut state) = self.state.write() {
            debug_assert!(
                state
                    .const_type
                    .is_none_or(|existing| existing == param.const_type),
                "constant '{}' declared with conflicting types across stages",
                self.name
            );
            if state.const_type.is_none() {
                state.const_type = Some(param.const_type);
                state.array_size = param.array_size;
            }
            let stage = StageBinding {
                bank_index,
                bank,
                param,
            };
            match &mut state.binding {
                HandleBinding::Buffer(stages) => stages.push(stage),
                binding => *binding = HandleBinding::Buffer(vec![stage]),
            }
        }
    }

    /// Bind as a texture sampler at a fixed unit / register
    pub(crate) fn bind_sampler(&self, const_type: ConstType, register: u32) {
        debug_assert!(const_type.is_sampler());
        if let Ok(mut state) = self.state.write() {
            state.binding = HandleBinding::Sampler { register };
            state.const_type = Some(const_type);
            state.array_size = 1;
        }
    }

    /// Bind as a per-instance constant at an offset within the
    /// instancing staging block
    pub(crate) fn bind_instancing(&self, const_type: ConstType, offset: u32) {
        if let Ok(mut state) = self.state.write() {
            state.binding = HandleBinding::Instancing { offset };
            state.const_type = Some(const_type);
            state.array_size = 1;
        }
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
