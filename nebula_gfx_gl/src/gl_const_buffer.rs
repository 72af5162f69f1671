/// GlConstBuffer - per-uniform shadow-compared uploads
///
/// GL uniform state belongs to the program, not a buffer object, so the
/// device's current values are tracked in the shader's shadow copy.
/// Each activate compares every uniform's staged bytes against the
/// shadow and uploads only the ones that differ, regardless of which
/// buffer was active before. The shared dirty-range machinery is
/// bypassed; the staging store just gets its flags cleared.

use std::sync::{Arc, Mutex};

use nebula_gfx::shader::{GenericConstBuffer, GfxShaderConstBuffer};

use crate::gl::GlApi;
use crate::gl_shader::{GlUniformBinding, ProgramState};

/// GL const buffer implementation
pub struct GlConstBuffer {
    generic: Arc<GenericConstBuffer>,
    api: Arc<dyn GlApi>,
    state: Arc<Mutex<ProgramState>>,
}

impl GlConstBuffer {
    pub(crate) fn new(
        generic: Arc<GenericConstBuffer>,
        api: Arc<dyn GlApi>,
        state: Arc<Mutex<ProgramState>>,
    ) -> Self {
        Self { generic, api, state }
    }

    fn upload(&self, binding: &GlUniformBinding, bytes: &[u8]) {
        // pod_collect_to_vec: the byte store carries no alignment
        // guarantee for a reinterpreting cast
        if binding.const_type.is_matrix() {
            let data: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
            self.api.set_uniform_matrix(
                binding.location,
                binding.const_type,
                binding.array_size,
                &data,
            );
        } else if binding.const_type.is_int() {
            let data: Vec<i32> = bytemuck::pod_collect_to_vec(bytes);
            self.api
                .set_uniform_i(binding.location, binding.const_type, binding.array_size, &data);
        } else {
            let data: Vec<f32> = bytemuck::pod_collect_to_vec(bytes);
            self.api
                .set_uniform_f(binding.location, binding.const_type, binding.array_size, &data);
        }
    }
}

impl GfxShaderConstBuffer for GlConstBuffer {
    fn generic(&self) -> &GenericConstBuffer {
        &self.generic
    }

    fn activate(&self, _prev: Option<&dyn GfxShaderConstBuffer>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let state = &mut *state;
        self.generic.with_bank(0, |bytes| {
            if state.shadow.len() != bytes.len() {
                state.shadow = vec![0u8; bytes.len()];
            }
            for binding in &state.bindings {
                let start = binding.offset as usize;
                let end = (binding.offset + binding.size) as usize;
                if end > bytes.len() {
                    continue;
                }
                let staged = &bytes[start..end];
                if staged == &state.shadow[start..end] {
                    continue;
                }
                self.upload(binding, staged);
                state.shadow[start..end].copy_from_slice(staged);
            }
        });
        self.generic.clear_dirty_and_lost();
    }
}
