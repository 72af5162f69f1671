/*!
# Nebula GFX - D3D11 Backend

Constant-block implementation of the Nebula GFX shader constant
subsystem.

Each stage's reflected cbuffers concatenate into one logical constant
space, split back into hardware sub-buffers at upload time: any dirty
sub-buffer goes to the device in full through a single update call. The
native API sits behind the [`D3d11Api`] trait, implemented by the
embedding renderer; the backend is registered as a plugin and selected
at device creation.
*/

// D3D11 implementation modules
mod d3d11;
mod d3d11_const_buffer;
mod d3d11_shader;

pub use d3d11::{
    stage_profile, D3d11Api, D3d11CbufferDesc, D3d11CompiledStage, D3d11Device,
    D3d11SamplerBindDesc, D3d11VariableDesc,
};
pub use d3d11_const_buffer::D3d11ConstBuffer;
pub use d3d11_shader::D3d11Shader;

use std::sync::{Arc, Mutex};

use nebula_gfx::device::{register_device_plugin, GfxDevice};
use nebula_gfx::shader::SourceProvider;

/// Register the D3D11 backend with the plugin system
pub fn register(api: Arc<dyn D3d11Api>, provider: Arc<dyn SourceProvider>) {
    register_device_plugin("d3d11", move |config| {
        Ok(Arc::new(Mutex::new(D3d11Device::new(
            Arc::clone(&api),
            Arc::clone(&provider),
            config,
        ))) as Arc<Mutex<dyn GfxDevice>>)
    });
}
