//! Model import: flattens a glTF scene graph into a list of meshes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use glam::{Mat3, Mat4, Vec3};

use crate::cache::TextureCache;
use crate::context::GpuContext;
use crate::error::AssetError;
use crate::mesh::{Mesh, Vertex};
use crate::program::GpuProgram;
use crate::texture::{SamplerOptions, Texture, TextureRole};

/// An ordered list of meshes assembled from one asset file, plus the
/// texture cache shared by all of them.
///
/// Meshes draw in insertion order; overlapping transparent geometry is not
/// sorted. A model with zero meshes is a valid (empty) load.
pub struct Model {
    meshes: Vec<Mesh>,
    cache: TextureCache,
    source: PathBuf,
}

impl Model {
    /// Import an asset file. Node transforms are baked into the vertices;
    /// referenced textures resolve relative to the asset's directory
    /// through a per-model cache.
    pub fn load(ctx: &GpuContext, program: &GpuProgram, path: &Path) -> Result<Self, AssetError> {
        let gltf::Gltf { document, blob } =
            gltf::Gltf::open(path).map_err(|err| AssetError::Import {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let buffers = gltf::import_buffers(&document, Some(base), blob).map_err(|err| {
            AssetError::Import {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let mut cache = TextureCache::new(ctx, base, SamplerOptions::default());
        let mut meshes = Vec::new();

        for scene in document.scenes() {
            for node in scene.nodes() {
                load_node(
                    ctx,
                    program,
                    &mut cache,
                    &buffers,
                    path,
                    &node,
                    Mat4::IDENTITY,
                    &mut meshes,
                )?;
            }
        }

        if meshes.is_empty() {
            log::warn!("model {path:?} contains no meshes");
        } else {
            log::info!(
                "loaded {path:?}: {} meshes, {} textures",
                meshes.len(),
                cache.len()
            );
        }

        Ok(Self {
            meshes,
            cache,
            source: path.to_path_buf(),
        })
    }

    /// Draw every mesh in insertion order. The program must already be
    /// bound on the pass.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        for mesh in &self.meshes {
            mesh.draw(pass);
        }
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Distinct textures loaded for this model.
    pub fn texture_count(&self) -> usize {
        self.cache.len()
    }
}

#[allow(clippy::too_many_arguments)]
fn load_node(
    ctx: &GpuContext,
    program: &GpuProgram,
    cache: &mut TextureCache,
    buffers: &[gltf::buffer::Data],
    path: &Path,
    node: &gltf::Node,
    parent_transform: Mat4,
    meshes: &mut Vec<Mesh>,
) -> Result<(), AssetError> {
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let transform = parent_transform * local;

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if let Some(loaded) =
                load_primitive(ctx, program, cache, buffers, path, &primitive, transform)?
            {
                meshes.push(loaded);
            }
        }
    }

    for child in node.children() {
        load_node(
            ctx,
            program,
            cache,
            buffers,
            path,
            &child,
            transform,
            meshes,
        )?;
    }

    Ok(())
}

fn load_primitive(
    ctx: &GpuContext,
    program: &GpuProgram,
    cache: &mut TextureCache,
    buffers: &[gltf::buffer::Data],
    path: &Path,
    primitive: &gltf::Primitive,
    transform: Mat4,
) -> Result<Option<Mesh>, AssetError> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!(
            "skipping non-triangle primitive ({:?}) in {path:?}",
            primitive.mode()
        );
        return Ok(None);
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

    let positions: Vec<Vec3> = reader
        .read_positions()
        .ok_or_else(|| AssetError::Import {
            path: path.to_path_buf(),
            message: "mesh primitive has no positions".to_string(),
        })?
        .map(|pos| transform.transform_point3(Vec3::from_array(pos)))
        .collect();

    // Directions transform with the inverse transpose so non-uniform node
    // scale does not skew the lighting.
    let normal_matrix = Mat3::from_mat4(transform).inverse().transpose();
    let normals: Option<Vec<Vec3>> = reader.read_normals().map(|normals| {
        normals
            .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
            .collect()
    });
    let tex_coords: Option<Vec<[f32; 2]>> = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().collect());
    let rotation = Mat3::from_mat4(transform);
    let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(|tangents| {
        tangents
            .map(|t| {
                let dir = (rotation * Vec3::new(t[0], t[1], t[2])).normalize_or_zero();
                [dir.x, dir.y, dir.z, t[3]]
            })
            .collect()
    });

    let vertices = assemble_vertices(
        &positions,
        normals.as_deref(),
        tex_coords.as_deref(),
        tangents.as_deref(),
    );

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };

    let textures = load_material_textures(ctx, cache, buffers, path, primitive)?;

    Mesh::new(ctx, program, cache, &vertices, &indices, textures).map(Some)
}

/// Zip the attribute streams into interleaved vertices, filling defaults
/// for streams the primitive does not carry.
pub fn assemble_vertices(
    positions: &[Vec3],
    normals: Option<&[Vec3]>,
    tex_coords: Option<&[[f32; 2]]>,
    tangents: Option<&[[f32; 4]]>,
) -> Vec<Vertex> {
    positions
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let normal = normals
                .and_then(|n| n.get(i).copied())
                .unwrap_or(Vec3::Z);
            let uv = tex_coords.and_then(|t| t.get(i).copied()).unwrap_or([0.0; 2]);
            let (tangent, bitangent) = match tangents.and_then(|t| t.get(i)) {
                Some(&[x, y, z, w]) => {
                    let tangent = Vec3::new(x, y, z);
                    (tangent, normal.cross(tangent) * w)
                }
                None => (Vec3::ZERO, Vec3::ZERO),
            };
            Vertex {
                position: position.to_array(),
                normal: normal.to_array(),
                tex_coords: uv,
                tangent: tangent.to_array(),
                bitangent: bitangent.to_array(),
            }
        })
        .collect()
}

/// Role assignment for glTF material slots: base color is the diffuse map,
/// metallic-roughness stands in for specular, plus normal and occlusion.
fn load_material_textures(
    ctx: &GpuContext,
    cache: &mut TextureCache,
    buffers: &[gltf::buffer::Data],
    path: &Path,
    primitive: &gltf::Primitive,
) -> Result<Vec<Arc<Texture>>, AssetError> {
    let material = primitive.material();
    let pbr = material.pbr_metallic_roughness();
    let mut textures = Vec::new();

    if let Some(info) = pbr.base_color_texture() {
        textures.push(resolve_texture(
            ctx,
            cache,
            buffers,
            path,
            &info.texture(),
            TextureRole::Diffuse,
        )?);
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        textures.push(resolve_texture(
            ctx,
            cache,
            buffers,
            path,
            &info.texture(),
            TextureRole::Specular,
        )?);
    }
    if let Some(normal) = material.normal_texture() {
        textures.push(resolve_texture(
            ctx,
            cache,
            buffers,
            path,
            &normal.texture(),
            TextureRole::Normal,
        )?);
    }
    if let Some(occlusion) = material.occlusion_texture() {
        textures.push(resolve_texture(
            ctx,
            cache,
            buffers,
            path,
            &occlusion.texture(),
            TextureRole::Height,
        )?);
    }

    Ok(textures)
}

fn resolve_texture(
    ctx: &GpuContext,
    cache: &mut TextureCache,
    buffers: &[gltf::buffer::Data],
    path: &Path,
    texture: &gltf::Texture,
    role: TextureRole,
) -> Result<Arc<Texture>, AssetError> {
    let image = texture.source();
    match image.source() {
        gltf::image::Source::Uri { uri, .. } => {
            if let Some(rest) = uri.strip_prefix("data:") {
                let bytes = decode_data_uri(rest, path)?;
                cache.load_embedded(ctx, &format!("#image{}", image.index()), &bytes, role)
            } else {
                cache.load(ctx, uri, role)
            }
        }
        gltf::image::Source::View { view, .. } => {
            let buffer = &buffers[view.buffer().index()];
            let bytes = &buffer[view.offset()..view.offset() + view.length()];
            cache.load_embedded(ctx, &format!("#image{}", image.index()), bytes, role)
        }
    }
}

fn decode_data_uri(rest: &str, path: &Path) -> Result<Vec<u8>, AssetError> {
    let (header, payload) = rest.split_once(',').ok_or_else(|| AssetError::DataUri {
        path: path.to_path_buf(),
        message: "missing ',' separator".to_string(),
    })?;
    if !header.ends_with(";base64") {
        return Err(AssetError::DataUri {
            path: path.to_path_buf(),
            message: format!("unsupported encoding '{header}'"),
        });
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| AssetError::DataUri {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_fills_defaults() {
        let positions = [Vec3::ZERO, Vec3::X];
        let vertices = assemble_vertices(&positions, None, None, None);

        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertices[0].tex_coords, [0.0, 0.0]);
        assert_eq!(vertices[0].tangent, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn assemble_derives_bitangent_from_handedness() {
        let positions = [Vec3::ZERO];
        let normals = [Vec3::Z];
        let tangents = [[1.0, 0.0, 0.0, -1.0]];
        let vertices = assemble_vertices(&positions, Some(&normals), None, Some(&tangents));

        // cross(+Z, +X) = +Y, flipped by w = -1.
        assert_eq!(vertices[0].bitangent, [0.0, -1.0, 0.0]);
    }

    #[test]
    fn data_uri_roundtrip() {
        let payload = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let uri = format!("image/png;base64,{payload}");
        let bytes = decode_data_uri(&uri, Path::new("model.gltf")).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn data_uri_without_base64_is_rejected() {
        let err = decode_data_uri("image/png,abc", Path::new("model.gltf")).unwrap_err();
        assert!(matches!(err, AssetError::DataUri { .. }));
    }
}
