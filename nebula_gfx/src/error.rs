//! Error types for Nebula GFX
//!
//! This module defines the error types used throughout the shader layer,
//! including compilation, reflection, and device interaction.

use std::fmt;

use crate::shader::ShaderStage;

/// Result type for Nebula GFX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula GFX errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (D3D9, D3D11, OpenGL, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Shader compilation or link failure, with the compiler's diagnostic text
    CompileFailed {
        /// Stage that failed to compile
        stage: ShaderStage,
        /// Diagnostic text captured from the backend compiler
        log: String,
    },

    /// An `#include` directive could not be resolved
    IncludeNotFound(String),

    /// Invalid resource (shader, constant buffer, handle, etc.)
    InvalidResource(String),

    /// Initialization failed (device, registry, subsystems)
    InitializationFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::CompileFailed { stage, log } => {
                write!(f, "Shader compile failed ({:?}): {}", stage, log)
            }
            Error::IncludeNotFound(path) => write!(f, "Include file not found: {}", path),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
