/*!
# Nebula GFX

Cross-backend shader constant management.

This crate provides the backend-agnostic core of a shader
constant-buffer subsystem: named, typed constants mapped onto byte
layouts, stable handles that survive shader recompilation, per-material
staging buffers with dirty tracking, and the orchestration that ties
compilation, reflection, and buffer notification together. Backend
crates (register-file, constant-block, and uniform-location binding
models) implement the traits defined here over their native graphics
API.

## Architecture

- **GfxDevice**: factory trait for creating shaders, one concrete
  backend selected at device creation
- **GfxShader**: a compiled program pair exposing stable constant
  handles and const-buffer allocation
- **ShaderConstHandle**: identity of one named constant across reloads
- **GfxShaderConstBuffer**: per-material constant staging with
  change detection and minimal uploads

Backend implementations provide concrete types that implement these
traits; the native graphics API itself sits behind a small per-backend
seam trait implemented by the embedding renderer.
*/

// Internal modules
pub mod device;
pub mod error;
pub mod log;
pub mod shader;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub mod error {
        pub use crate::error::{Error, Result};
    }

    // Device trait, config, and plugin registry
    pub use crate::device::{DeviceConfig, GfxDevice};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{set_logger, DefaultLogger, LogEntry, LogSeverity, Logger};
        // Note: gfx_* macros are NOT re-exported here - they are internal only
    }

    // Shader sub-module with the whole constant subsystem
    pub mod shader {
        pub use crate::shader::*;
    }
}

// Re-export math library at crate root
pub use glam;
