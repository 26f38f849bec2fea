//! GPU program: linked shader stages plus their parameter plumbing.

use std::path::Path;

use crate::context::GpuContext;
use crate::error::ShaderError;
use crate::shader::{
    CompiledStage, ProgramLayout, Stage, UniformBlock, UniformValue, GLOBALS_BINDING,
    GLOBALS_GROUP, MATERIAL_SAMPLER_BINDING,
};
use crate::texture::TextureRole;

/// Fixed pipeline state the program is linked against.
pub struct PipelineConfig<'a> {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub vertex_layouts: &'a [wgpu::VertexBufferLayout<'a>],
}

struct ProgramUniforms {
    block: UniformBlock,
    buffer: wgpu::Buffer,
}

/// A compiled and linked vertex + fragment program.
///
/// A value of this type only exists after both stages compiled, the stage
/// interfaces linked, and the GPU accepted the pipeline - there is no
/// "maybe valid" state to use by accident. Uniform name -> offset lookups
/// are resolved once at link time and cached for the program's lifetime.
pub struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    globals_bind_group: wgpu::BindGroup,
    uniforms: Option<ProgramUniforms>,
    material_layout: Option<wgpu::BindGroupLayout>,
}

impl GpuProgram {
    /// Build a program from two WGSL source files.
    pub fn from_files(
        ctx: &GpuContext,
        vertex_path: &Path,
        fragment_path: &Path,
        config: &PipelineConfig<'_>,
    ) -> Result<Self, ShaderError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| ShaderError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let vertex_source = read(vertex_path)?;
        let fragment_source = read(fragment_path)?;
        Self::from_sources(
            ctx,
            &vertex_path.to_string_lossy(),
            &vertex_source,
            &fragment_path.to_string_lossy(),
            &fragment_source,
            config,
        )
    }

    /// Build a program from in-memory WGSL sources. Labels appear in
    /// diagnostics.
    pub fn from_sources(
        ctx: &GpuContext,
        vertex_label: &str,
        vertex_source: &str,
        fragment_label: &str,
        fragment_source: &str,
        config: &PipelineConfig<'_>,
    ) -> Result<Self, ShaderError> {
        let vs = CompiledStage::compile(Stage::Vertex, vertex_label, vertex_source)?;
        let fs = CompiledStage::compile(Stage::Fragment, fragment_label, fragment_source)?;
        let layout = ProgramLayout::link(&vs, &fs)?;

        let device = ctx.device();

        // Everything the GPU could still reject is created under one error
        // scope so a validation failure surfaces as a link error instead of
        // tearing the process down.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&vs.label),
            source: wgpu::ShaderSource::Wgsl(vs.source.as_str().into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&fs.label),
            source: wgpu::ShaderSource::Wgsl(fs.source.as_str().into()),
        });

        let mut globals_entries = Vec::new();
        if layout.uniforms.is_some() {
            globals_entries.push(wgpu::BindGroupLayoutEntry {
                binding: GLOBALS_BINDING,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Globals Bind Group Layout"),
            entries: &globals_entries,
        });

        let uniforms = layout.uniforms.map(|uniform_layout| {
            // Buffer size rounded up so the binding satisfies uniform
            // alignment on every backend.
            let size = u64::from(uniform_layout.size()).div_ceil(16) * 16;
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Program Uniform Buffer"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            ProgramUniforms {
                block: UniformBlock::new(uniform_layout),
                buffer,
            }
        });

        // Draw-time validation requires a bind group for every slot in the
        // pipeline layout, so the globals group exists even when it has no
        // entries.
        let mut globals_bindings = Vec::new();
        if let Some(uniforms) = &uniforms {
            globals_bindings.push(wgpu::BindGroupEntry {
                binding: GLOBALS_BINDING,
                resource: uniforms.buffer.as_entire_binding(),
            });
        }
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals Bind Group"),
            layout: &globals_layout,
            entries: &globals_bindings,
        });

        let material_layout = if layout.material.is_empty() {
            None
        } else {
            Some(Self::create_material_layout(device))
        };

        let mut bind_group_layouts = vec![&globals_layout];
        if let Some(material) = &material_layout {
            bind_group_layouts.push(material);
        }
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Program Pipeline Layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Program Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(&vs.entry_point),
                buffers: config.vertex_layouts,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(&fs.entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: config.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Link {
                message: error.to_string(),
            });
        }

        Ok(Self {
            pipeline,
            globals_bind_group,
            uniforms,
            material_layout,
        })
    }

    /// Activate the program on a render pass. Global GPU state changes
    /// until another program is bound.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(GLOBALS_GROUP, &self.globals_bind_group, &[]);
    }

    /// Stage a uniform value by name. A name the program does not expose is
    /// ignored (logged at debug level); returns whether the value landed.
    pub fn set_uniform<V: UniformValue>(&mut self, name: &str, value: V) -> bool {
        match &mut self.uniforms {
            Some(uniforms) => uniforms.block.set(name, value),
            None => {
                log::debug!("uniform `{name}` ignored; program has no uniform block");
                false
            }
        }
    }

    /// Upload staged uniform values. Cheap when nothing changed.
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if let Some(uniforms) = &mut self.uniforms {
            if uniforms.block.take_dirty() {
                queue.write_buffer(&uniforms.buffer, 0, uniforms.block.bytes());
            }
        }
    }

    /// Layout meshes build their material bind groups against; `None` when
    /// the fragment stage samples no material textures.
    pub fn material_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.material_layout.as_ref()
    }

    /// The material layout is the full role convention regardless of which
    /// subset the shader samples, so every mesh binds the same way.
    fn create_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let mut entries = Vec::with_capacity(TextureRole::ALL.len() + 1);
        for role in TextureRole::ALL {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: role.binding(),
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: MATERIAL_SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &entries,
        })
    }
}
