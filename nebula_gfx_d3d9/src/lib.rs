/*!
# Nebula GFX - D3D9 Backend

Register-file implementation of the Nebula GFX shader constant
subsystem.

This crate maps named constants onto the four D3D9-style register banks
(vertex/pixel × float4/int4), translates CTAB-style reflection into
buffer layouts, and uploads dirty constants as contiguous register
ranges. The native API sits behind the [`D3d9Api`] trait, implemented
by the embedding renderer; the backend is registered as a plugin and
selected at device creation.
*/

// D3D9 implementation modules
mod d3d9;
mod d3d9_const_buffer;
mod d3d9_shader;

pub use d3d9::{
    stage_profile, D3d9Api, D3d9CompiledStage, D3d9ConstantDesc, D3d9Device, D3d9RegisterSet,
};
pub use d3d9_const_buffer::D3d9ConstBuffer;
pub use d3d9_shader::D3d9Shader;

use std::sync::{Arc, Mutex};

use nebula_gfx::device::{register_device_plugin, GfxDevice};
use nebula_gfx::shader::SourceProvider;

/// Register the D3D9 backend with the plugin system
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use nebula_gfx::device::DeviceConfig;
/// use nebula_gfx::shader::FileSourceProvider;
/// use nebula_gfx_d3d9::D3d9Device;
///
/// # fn api() -> Arc<dyn nebula_gfx_d3d9::D3d9Api> { unimplemented!() }
/// // Create the device directly
/// let device = D3d9Device::new(api(), Arc::new(FileSourceProvider), DeviceConfig::default());
/// ```
pub fn register(api: Arc<dyn D3d9Api>, provider: Arc<dyn SourceProvider>) {
    register_device_plugin("d3d9", move |config| {
        Ok(Arc::new(Mutex::new(D3d9Device::new(
            Arc::clone(&api),
            Arc::clone(&provider),
            config,
        ))) as Arc<Mutex<dyn GfxDevice>>)
    });
}
