/// D3d9ConstBuffer - dirty register-range uploads
///
/// Each bank's dirty byte range widens to whole registers and goes to
/// the device in one call: the float banks through set_*_consts_f, the
/// int banks through set_*_consts_i.

use std::sync::Arc;

use nebula_gfx::shader::layout::ConstBank;
use nebula_gfx::shader::{GenericConstBuffer, GfxShaderConstBuffer};

use crate::d3d9::D3d9Api;

/// Bytes per register (one float4 or int4)
const REGISTER_SIZE: u32 = 16;

/// D3D9 const buffer implementation
pub struct D3d9ConstBuffer {
    generic: Arc<GenericConstBuffer>,
    api: Arc<dyn D3d9Api>,
}

impl D3d9ConstBuffer {
    pub(crate) fn new(generic: Arc<GenericConstBuffer>, api: Arc<dyn D3d9Api>) -> Self {
        Self { generic, api }
    }
}

impl GfxShaderConstBuffer for D3d9ConstBuffer {
    fn generic(&self) -> &GenericConstBuffer {
        &self.generic
    }

    fn activate(&self, prev: Option<&dyn GfxShaderConstBuffer>) {
        self.generic
            .activate_with(prev.map(|p| p.generic()), |_, bank, bytes, range| {
                let start_register = range.start / REGISTER_SIZE;
                let end = range.end.div_ceil(REGISTER_SIZE) * REGISTER_SIZE;
                let span =
                    (start_register * REGISTER_SIZE) as usize..(end as usize).min(bytes.len());
                if span.is_empty() {
                    return;
                }
                // pod_collect_to_vec: the byte store carries no
                // alignment guarantee for a reinterpreting cast
                match bank {
                    ConstBank::VertexFloat | ConstBank::PixelFloat => {
                        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[span]);
                        if bank == ConstBank::VertexFloat {
                            self.api.set_vertex_consts_f(start_register, &data);
                        } else {
                            self.api.set_pixel_consts_f(start_register, &data);
                        }
                    }
                    ConstBank::VertexInt | ConstBank::PixelInt => {
                        let data: Vec<i32> = bytemuck::pod_collect_to_vec(&bytes[span]);
                        if bank == ConstBank::VertexInt {
                            self.api.set_vertex_consts_i(start_register, &data);
                        } else {
                            self.api.set_pixel_consts_i(start_register, &data);
                        }
                    }
                    // This backend only builds register-file banks
                    other => debug_assert!(false, "foreign bank {:?} in d3d9 buffer", other),
                }
            });
    }
}
