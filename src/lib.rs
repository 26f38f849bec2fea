pub mod cache;
pub mod camera;
pub mod cli;
pub mod context;
pub mod error;
pub mod mesh;
pub mod model;
pub mod program;
pub mod shader;
pub mod texture;

pub use cache::{ResourceCache, TextureCache};
pub use camera::{Camera, CameraMovement, InputState};
pub use context::GpuContext;
pub use error::{AssetError, ContextError, ShaderError};
pub use mesh::{Mesh, Vertex};
pub use model::Model;
pub use program::{GpuProgram, PipelineConfig};
pub use texture::{SamplerOptions, Texture, TextureRole};
