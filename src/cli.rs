// cli.rs - Command-line interface configuration
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "mesh-viewer")]
#[command(about = "glTF model viewer with a free-fly camera", long_about = None)]
pub struct Cli {
    /// Model file to load
    pub model: PathBuf,

    /// Vertex shader source file
    #[arg(long, default_value = "shaders/model.vert.wgsl")]
    pub vertex_shader: PathBuf,

    /// Fragment shader source file
    #[arg(long, default_value = "shaders/model.frag.wgsl")]
    pub fragment_shader: PathBuf,

    /// Initial window width
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 600)]
    pub height: u32,
}
