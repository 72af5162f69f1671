/// D3d11ConstBuffer - whole-sub-buffer uploads
///
/// Hardware constant buffers update as a unit, so a dirty byte range
/// maps to the sub-buffers it touches and each goes to the device in
/// full. A value confined to one cbuffer therefore never re-uploads its
/// stage's other cbuffers.

use std::sync::{Arc, Mutex};

use nebula_gfx::shader::{GenericConstBuffer, GfxShaderConstBuffer};

use crate::d3d11::D3d11Api;
use crate::d3d11_shader::SubBufferTable;

/// D3D11 const buffer implementation
pub struct D3d11ConstBuffer {
    generic: Arc<GenericConstBuffer>,
    api: Arc<dyn D3d11Api>,
    subs: Arc<Mutex<SubBufferTable>>,
}

impl D3d11ConstBuffer {
    pub(crate) fn new(
        generic: Arc<GenericConstBuffer>,
        api: Arc<dyn D3d11Api>,
        subs: Arc<Mutex<SubBufferTable>>,
    ) -> Self {
        Self { generic, api, subs }
    }
}

impl GfxShaderConstBuffer for D3d11ConstBuffer {
    fn generic(&self) -> &GenericConstBuffer {
        &self.generic
    }

    fn activate(&self, prev: Option<&dyn GfxShaderConstBuffer>) {
        let Ok(table) = self.subs.lock() else {
            return;
        };
        self.generic
            .activate_with(prev.map(|p| p.generic()), |index, bank, bytes, range| {
                let Some(stage) = bank.stage() else {
                    debug_assert!(false, "foreign bank {:?} in d3d11 buffer", bank);
                    return;
                };
                let Some(subs) = table.banks.get(index) else {
                    return;
                };
                for (slot, sub) in subs.iter().enumerate() {
                    if !sub.overlaps(range.start, range.end) {
                        continue;
                    }
                    // The bank store may be shorter than the padded
                    // hardware buffer; the device pads the tail
                    let start = (sub.start as usize).min(bytes.len());
                    let end = ((sub.start + sub.size) as usize).min(bytes.len());
                    if start < end {
                        self.api.update_block(stage, slot as u32, &bytes[start..end]);
                    }
                }
            });
    }
}
