/*!
# Nebula GFX - OpenGL Backend

Uniform-location implementation of the Nebula GFX shader constant
subsystem.

Reflected uniforms pack densely into one program-wide constant space and
upload individually by location; a program-level shadow copy of the
device's uniform state skips redundant uploads across buffers. Sampler
uniforms get sequential texture units assigned at link. The native API
sits behind the [`GlApi`] trait, implemented by the embedding renderer;
the backend is registered as a plugin and selected at device creation.
*/

// GL implementation modules
mod gl;
mod gl_const_buffer;
mod gl_shader;

pub use gl::{GlApi, GlDevice, GlLinkedProgram, GlUniformDesc};
pub use gl_const_buffer::GlConstBuffer;
pub use gl_shader::GlShader;

use std::sync::{Arc, Mutex};

use nebula_gfx::device::{register_device_plugin, GfxDevice};
use nebula_gfx::shader::SourceProvider;

/// Register the GL backend with the plugin system
pub fn register(api: Arc<dyn GlApi>, provider: Arc<dyn SourceProvider>) {
    register_device_plugin("gl", move |config| {
        Ok(Arc::new(Mutex::new(GlDevice::new(
            Arc::clone(&api),
            Arc::clone(&provider),
            config,
        ))) as Arc<Mutex<dyn GfxDevice>>)
    });
}
