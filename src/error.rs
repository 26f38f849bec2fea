use std::path::PathBuf;

use thiserror::Error;

/// Failures while building a [`crate::GpuProgram`].
///
/// Compile and link failures are fatal to program construction: the caller
/// never receives a half-built program. The diagnostic text is preserved
/// verbatim so shader authors see the same message the compiler produced.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// A shader source file could not be read.
    #[error("failed to read shader source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage failed to parse or validate.
    #[error("{stage} shader '{label}' failed to compile:\n{diagnostic}")]
    Compile {
        stage: crate::shader::Stage,
        label: String,
        diagnostic: String,
    },

    /// The stages are individually valid but do not fit together, or the
    /// GPU rejected the assembled pipeline.
    #[error("failed to link program: {message}")]
    Link { message: String },
}

/// Failures while importing a model or loading one of its textures.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scene importer rejected the asset file.
    #[error("failed to import {path:?}: {message}")]
    Import { path: PathBuf, message: String },

    /// An image file exists but could not be decoded.
    #[error("failed to decode texture {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    /// An embedded data URI was malformed.
    #[error("malformed data URI in {path:?}: {message}")]
    DataUri { path: PathBuf, message: String },

    /// A mesh referenced a vertex that does not exist.
    #[error("index {index} out of range for mesh with {vertex_count} vertices")]
    InvalidIndex { index: u32, vertex_count: usize },
}

/// Failures while acquiring the GPU device.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to find a compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}
