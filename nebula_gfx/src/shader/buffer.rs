/// Per-material-instance constant staging with dirty tracking
///
/// A GenericConstBuffer owns one zeroed byte store per bank of its
/// shader's layout set, plus a small staging block for per-instance
/// constants. Typed writes route through a handle's binding, compare
/// before copying, and widen a per-bank dirty range; `activate_with`
/// turns that range (or a byte-for-byte comparison against the
/// previously active buffer) into the minimal set of upload calls.
/// Matrices are transposed here, exactly once, before storage.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use glam::{IVec2, IVec3, IVec4, Mat4, Vec2, Vec3, Vec4};

use crate::shader::handle::{HandleBinding, ShaderConstHandle};
use crate::shader::layout::{diff_range, ConstBank, LayoutSet};
use crate::shader::ConstType;

// ===== BACKING STATE =====

#[derive(Debug)]
struct Bank {
    kind: ConstBank,
    bytes: Vec<u8>,
    // Half-open dirty byte range; start >= end means clean
    dirty_start: u32,
    dirty_end: u32,
}

impl Bank {
    fn new(kind: ConstBank, size: u32) -> Self {
        Self {
            kind,
            bytes: vec![0u8; size as usize],
            dirty_start: u32::MAX,
            dirty_end: 0,
        }
    }

    fn is_dirty(&self) -> bool {
        self.dirty_start < self.dirty_end
    }

    fn clear_dirty(&mut self) {
        self.dirty_start = u32::MAX;
        self.dirty_end = 0;
    }
}

#[derive(Debug)]
struct BufState {
    layouts: Arc<LayoutSet>,
    banks: Vec<Bank>,
    instancing: Vec<u8>,
    epoch: u32,
    was_lost: bool,
}

fn mark_all_dirty(state: &mut BufState) {
    for bank in &mut state.banks {
        bank.dirty_start = 0;
        bank.dirty_end = bank.bytes.len() as u32;
    }
}

// ===== GENERIC CONST BUFFER =====

/// Backend-agnostic constant staging for one shader
///
/// Backends wrap this in their [`GfxShaderConstBuffer`] implementation
/// and supply the upload calls; everything else (binding resolution,
/// change detection, dirty ranges, reload recovery) lives here.
#[derive(Debug)]
pub struct GenericConstBuffer {
    state: Mutex<BufState>,
    shader_tag: usize,
}

impl GenericConstBuffer {
    pub(crate) fn new(
        shader_tag: usize,
        epoch: u32,
        layouts: Arc<LayoutSet>,
        instancing_size: u32,
    ) -> Self {
        let banks = layouts
            .iter()
            .map(|(kind, layout)| Bank::new(kind, layout.buffer_size()))
            .collect();
        Self {
            state: Mutex::new(BufState {
                layouts,
                banks,
                instancing: vec![0u8; instancing_size as usize],
                epoch,
                was_lost: false,
            }),
            shader_tag,
        }
    }

    pub(crate) fn shader_tag(&self) -> usize {
        self.shader_tag
    }

    /// True if any write since the last activate changed a byte
    pub fn is_dirty(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.banks.iter().any(Bank::is_dirty),
            Err(_) => true,
        }
    }

    /// True between a shader reload and the next activate
    pub fn is_lost(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.was_lost,
            Err(_) => true,
        }
    }

    /// Number of backing banks (mirrors the shader's layout set)
    pub fn bank_count(&self) -> usize {
        self.state.lock().map(|state| state.banks.len()).unwrap_or(0)
    }

    /// Run `f` against one bank's raw bytes. Diagnostics and backend
    /// upload paths that keep their own shadow state read through this.
    pub fn with_bank<R>(&self, index: usize, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let state = self.state.lock().ok()?;
        state.banks.get(index).map(|bank| f(&bank.bytes))
    }

    /// Run `f` against the per-instance staging block. The embedder
    /// copies this into its instancing vertex stream once per draw.
    pub fn with_instancing<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self.state.lock() {
            Ok(state) => f(&state.instancing),
            Err(_) => f(&[]),
        }
    }

    // ===== WRITES =====

    /// Write a typed value through a handle
    ///
    /// Unbound and sampler handles ignore the write. Instancing handles
    /// write densely into the staging block. Buffer handles write into
    /// every stage's bank through the layout's change-detecting
    /// primitive and widen that bank's dirty range on change.
    pub fn set_value(&self, handle: &ShaderConstHandle, src_type: ConstType, data: &[u8]) {
        handle.with_binding(|binding| match binding {
            HandleBinding::Unbound | HandleBinding::Sampler { .. } => {}
            HandleBinding::Instancing { offset } => self.write_instancing(*offset, data),
            HandleBinding::Buffer(stages) => {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let layouts = Arc::clone(&state.layouts);
                for stage in stages {
                    let Some(bank) = state.banks.get_mut(stage.bank_index) else {
                        debug_assert!(false, "stale bank index on '{}'", handle.name());
                        continue;
                    };
                    let Some((_, layout)) = layouts.entry(stage.bank_index) else {
                        continue;
                    };
                    if layout.set(&stage.param, src_type, data, &mut bank.bytes) {
                        bank.dirty_start = bank.dirty_start.min(stage.param.offset);
                        bank.dirty_end = bank.dirty_end.max(stage.param.offset + stage.param.size);
                    }
                }
            }
        });
    }

    /// Write one or more matrices through a handle, transposing each
    /// element before storage
    pub fn set_matrix_value(&self, handle: &ShaderConstHandle, mats: &[Mat4]) {
        handle.with_binding(|binding| match binding {
            HandleBinding::Unbound | HandleBinding::Sampler { .. } => {}
            HandleBinding::Instancing { offset } => {
                let transposed = transpose_blocks(mats);
                self.write_instancing(*offset, bytemuck::cast_slice(&transposed));
            }
            HandleBinding::Buffer(stages) => {
                let transposed = transpose_blocks(mats);
                let data: &[u8] = bytemuck::cast_slice(&transposed);
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let layouts = Arc::clone(&state.layouts);
                for stage in stages {
                    let Some(bank) = state.banks.get_mut(stage.bank_index) else {
                        debug_assert!(false, "stale bank index on '{}'", handle.name());
                        continue;
                    };
                    let Some((_, layout)) = layouts.entry(stage.bank_index) else {
                        continue;
                    };
                    if layout.set_matrix(&stage.param, data, &mut bank.bytes) {
                        bank.dirty_start = bank.dirty_start.min(stage.param.offset);
                        bank.dirty_end = bank.dirty_end.max(stage.param.offset + stage.param.size);
                    }
                }
            }
        });
    }

    fn write_instancing(&self, offset: u32, data: &[u8]) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let start = offset as usize;
        let end = (start + data.len()).min(state.instancing.len());
        debug_assert!(
            start + data.len() <= state.instancing.len(),
            "instancing write past staging block"
        );
        if start < end {
            let span = end - start;
            state.instancing[start..end].copy_from_slice(&data[..span]);
        }
    }

    // ===== ACTIVATION =====

    /// Recompute dirty ranges against the previously active buffer and
    /// hand each dirty bank to `upload`, then mark the buffer clean
    ///
    /// Re-activating the already-active buffer keeps the dirty range
    /// accumulated by writes. Switching buffers replaces it: if `prev`
    /// is clean, trusted (same shader and epoch) and byte-identical,
    /// nothing uploads at all; if it differs, only the differing byte
    /// range per bank uploads; a dirty, lost, or foreign `prev` forces
    /// a full upload. A buffer whose store was just reallocated by a
    /// reload always uploads in full, then drops its lost flag.
    pub fn activate_with<F>(&self, prev: Option<&GenericConstBuffer>, mut upload: F)
    where
        F: FnMut(usize, ConstBank, &[u8], Range<u32>),
    {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        match prev {
            Some(other) if std::ptr::eq(other, self) => {
                // Same buffer as the previous draw; accumulated ranges stand
            }
            Some(other) => {
                if !self.compare_against(&mut state, other) {
                    mark_all_dirty(&mut state);
                }
            }
            None => mark_all_dirty(&mut state),
        }

        if state.was_lost {
            mark_all_dirty(&mut state);
        }
        state.was_lost = false;

        for (index, bank) in state.banks.iter_mut().enumerate() {
            if bank.is_dirty() {
                let range = bank.dirty_start..bank.dirty_end.min(bank.bytes.len() as u32);
                upload(index, bank.kind, &bank.bytes, range);
                bank.clear_dirty();
            }
        }
    }

    /// Replace `state`'s dirty ranges with the byte difference against
    /// `prev`. Returns false when `prev` cannot be trusted to reflect
    /// the device's current constants.
    fn compare_against(&self, state: &mut BufState, prev: &GenericConstBuffer) -> bool {
        if prev.shader_tag != self.shader_tag {
            return false;
        }
        let Ok(prev_state) = prev.state.lock() else {
            return false;
        };
        if prev_state.epoch != state.epoch
            || prev_state.was_lost
            || prev_state.banks.len() != state.banks.len()
            || prev_state.banks.iter().any(Bank::is_dirty)
        {
            return false;
        }
        for (bank, prev_bank) in state.banks.iter_mut().zip(prev_state.banks.iter()) {
            match diff_range(&bank.bytes, &prev_bank.bytes) {
                Some((start, end)) => {
                    bank.dirty_start = start;
                    bank.dirty_end = end;
                }
                None => bank.clear_dirty(),
            }
        }
        true
    }

    /// Drop dirty and lost flags without uploading. Backends that track
    /// device state through their own shadow copy finish an activate
    /// through this instead of [`activate_with`](Self::activate_with).
    pub fn clear_dirty_and_lost(&self) {
        if let Ok(mut state) = self.state.lock() {
            for bank in &mut state.banks {
                bank.clear_dirty();
            }
            state.was_lost = false;
        }
    }

    // ===== RELOAD =====

    /// Reallocate every bank for a fresh layout set, zero-filled, and
    /// flag the buffer lost until its next activate
    pub(crate) fn on_shader_reload(
        &self,
        epoch: u32,
        layouts: Arc<LayoutSet>,
        instancing_size: u32,
    ) {
        if let Ok(mut state) = self.state.lock() {
            state.banks = layouts
                .iter()
                .map(|(kind, layout)| Bank::new(kind, layout.buffer_size()))
                .collect();
            state.instancing = vec![0u8; instancing_size as usize];
            state.layouts = layouts;
            state.epoch = epoch;
            state.was_lost = true;
        }
    }
}

fn transpose_blocks(mats: &[Mat4]) -> Vec<Mat4> {
    mats.iter().map(|m| m.transpose()).collect()
}

// ===== BUFFER TRAIT =====

/// Writable constant snapshot, one per material instance
///
/// Backends implement `generic` and `activate`; the typed setters all
/// funnel into the shared staging logic. Every setter is a silent no-op
/// through an unbound handle and on numeric writes to sampler handles.
pub trait GfxShaderConstBuffer: Send + Sync {
    /// The shared staging state behind this buffer
    fn generic(&self) -> &GenericConstBuffer;

    /// Upload this buffer's dirty constants, given the buffer active on
    /// the device during the prior draw call (None at frame start).
    /// Invoked once per draw; a missing backend resource after a
    /// successful link halts debug builds rather than returning an
    /// error.
    fn activate(&self, prev: Option<&dyn GfxShaderConstBuffer>);

    /// True between a shader reload and this buffer's next activate
    fn is_lost(&self) -> bool {
        self.generic().is_lost()
    }

    fn set_float(&self, handle: &ShaderConstHandle, v: f32) {
        self.generic()
            .set_value(handle, ConstType::Float, bytemuck::bytes_of(&v));
    }

    fn set_float2(&self, handle: &ShaderConstHandle, v: Vec2) {
        self.generic()
            .set_value(handle, ConstType::Float2, bytemuck::bytes_of(&v));
    }

    fn set_float3(&self, handle: &ShaderConstHandle, v: Vec3) {
        self.generic()
            .set_value(handle, ConstType::Float3, bytemuck::bytes_of(&v));
    }

    fn set_float4(&self, handle: &ShaderConstHandle, v: Vec4) {
        self.generic()
            .set_value(handle, ConstType::Float4, bytemuck::bytes_of(&v));
    }

    fn set_int(&self, handle: &ShaderConstHandle, v: i32) {
        self.generic()
            .set_value(handle, ConstType::Int, bytemuck::bytes_of(&v));
    }

    fn set_int2(&self, handle: &ShaderConstHandle, v: IVec2) {
        self.generic()
            .set_value(handle, ConstType::Int2, bytemuck::bytes_of(&v));
    }

    fn set_int3(&self, handle: &ShaderConstHandle, v: IVec3) {
        self.generic()
            .set_value(handle, ConstType::Int3, bytemuck::bytes_of(&v));
    }

    fn set_int4(&self, handle: &ShaderConstHandle, v: IVec4) {
        self.generic()
            .set_value(handle, ConstType::Int4, bytemuck::bytes_of(&v));
    }

    /// Write a matrix; the stored bytes are the transpose of `m`
    fn set_matrix(&self, handle: &ShaderConstHandle, m: &Mat4) {
        self.generic()
            .set_matrix_value(handle, std::slice::from_ref(m));
    }

    /// Write a whole matrix array in one call
    fn set_matrix_array(&self, handle: &ShaderConstHandle, mats: &[Mat4]) {
        self.generic().set_matrix_value(handle, mats);
    }

    fn set_float_array(&self, handle: &ShaderConstHandle, values: &[f32]) {
        self.generic()
            .set_value(handle, ConstType::Float, bytemuck::cast_slice(values));
    }

    fn set_float2_array(&self, handle: &ShaderConstHandle, values: &[Vec2]) {
        self.generic()
            .set_value(handle, ConstType::Float2, bytemuck::cast_slice(values));
    }

    fn set_float3_array(&self, handle: &ShaderConstHandle, values: &[Vec3]) {
        self.generic()
            .set_value(handle, ConstType::Float3, bytemuck::cast_slice(values));
    }

    fn set_float4_array(&self, handle: &ShaderConstHandle, values: &[Vec4]) {
        self.generic()
            .set_value(handle, ConstType::Float4, bytemuck::cast_slice(values));
    }

    fn set_int_array(&self, handle: &ShaderConstHandle, values: &[i32]) {
        self.generic()
            .set_value(handle, ConstType::Int, bytemuck::cast_slice(values));
    }

    fn set_int2_array(&self, handle: &ShaderConstHandle, values: &[IVec2]) {
        self.generic()
            .set_value(handle, ConstType::Int2, bytemuck::cast_slice(values));
    }

    fn set_int3_array(&self, handle: &ShaderConstHandle, values: &[IVec3]) {
        self.generic()
            .set_value(handle, ConstType::Int3, bytemuck::cast_slice(values));
    }

    fn set_int4_array(&self, handle: &ShaderConstHandle, values: &[IVec4]) {
        self.generic()
            .set_value(handle, ConstType::Int4, bytemuck::cast_slice(values));
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
