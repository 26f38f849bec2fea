//! Indexed vertex data plus its material textures, drawn in one call.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::cache::TextureCache;
use crate::context::GpuContext;
use crate::error::AssetError;
use crate::program::GpuProgram;
use crate::shader::{MATERIAL_GROUP, MATERIAL_SAMPLER_BINDING};
use crate::texture::{Texture, TextureRole};

/// Interleaved vertex attributes as the shaders consume them.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x3,
        4 => Float32x3,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Every index must name an existing vertex; a mesh violating this is
/// rejected before any GPU buffer is created.
pub fn validate_indices(indices: &[u32], vertex_count: usize) -> Result<(), AssetError> {
    match indices.iter().find(|&&index| index as usize >= vertex_count) {
        Some(&index) => Err(AssetError::InvalidIndex {
            index,
            vertex_count,
        }),
        None => Ok(()),
    }
}

/// One GPU-resident vertex/index buffer pair plus its textures.
///
/// Immutable after construction. The material bind group is assembled once
/// here - first texture of each role, placeholder for absent roles - so
/// repeated draws always bind identically.
pub struct Mesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    vertex_count: usize,
    textures: Vec<Arc<Texture>>,
    material_bind_group: Option<wgpu::BindGroup>,
}

impl Mesh {
    pub fn new(
        ctx: &GpuContext,
        program: &GpuProgram,
        cache: &mut TextureCache,
        vertices: &[Vertex],
        indices: &[u32],
        textures: Vec<Arc<Texture>>,
    ) -> Result<Self, AssetError> {
        validate_indices(indices, vertices.len())?;

        let device = ctx.device();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let material_bind_group = program
            .material_layout()
            .map(|layout| Self::create_material_bind_group(ctx, layout, cache, &textures));

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            vertex_count: vertices.len(),
            textures,
            material_bind_group,
        })
    }

    /// One indexed draw covering the whole index sequence. The program must
    /// already be bound on the pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        if let Some(material) = &self.material_bind_group {
            pass.set_bind_group(MATERIAL_GROUP, material, &[]);
        }
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn textures(&self) -> &[Arc<Texture>] {
        &self.textures
    }

    fn create_material_bind_group(
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        cache: &mut TextureCache,
        textures: &[Arc<Texture>],
    ) -> wgpu::BindGroup {
        let per_role: Vec<Arc<Texture>> = TextureRole::ALL
            .into_iter()
            .map(|role| {
                textures
                    .iter()
                    .find(|texture| texture.role() == role)
                    .cloned()
                    .unwrap_or_else(|| cache.placeholder(ctx, role))
            })
            .collect();

        let mut entries: Vec<wgpu::BindGroupEntry> = TextureRole::ALL
            .into_iter()
            .zip(&per_role)
            .map(|(role, texture)| wgpu::BindGroupEntry {
                binding: role.binding(),
                resource: wgpu::BindingResource::TextureView(texture.view()),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: MATERIAL_SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(cache.sampler()),
        });

        ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mesh Material Bind Group"),
            layout,
            entries: &entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 56); // 14 floats
        assert_eq!(layout.attributes.len(), 5);
    }

    #[test]
    fn in_range_indices_pass() {
        assert!(validate_indices(&[0, 1, 2, 2, 1, 0], 3).is_ok());
        assert!(validate_indices(&[], 0).is_ok());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = validate_indices(&[0, 1, 3], 3).unwrap_err();
        match err {
            AssetError::InvalidIndex {
                index,
                vertex_count,
            } => {
                assert_eq!(index, 3);
                assert_eq!(vertex_count, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
