//! GPU textures and the CPU-side image pyramid they are uploaded from.

use std::path::Path;

use image::RgbaImage;

use crate::context::GpuContext;
use crate::error::AssetError;

/// Semantic role of a texture within a material.
///
/// Each role maps to a fixed binding index in the material bind group, so
/// a mesh always binds identically on repeated draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Diffuse,
    Specular,
    Normal,
    Height,
}

impl TextureRole {
    pub const ALL: [TextureRole; 4] = [
        TextureRole::Diffuse,
        TextureRole::Specular,
        TextureRole::Normal,
        TextureRole::Height,
    ];

    /// Binding index inside the material bind group.
    pub fn binding(self) -> u32 {
        match self {
            TextureRole::Diffuse => 0,
            TextureRole::Specular => 1,
            TextureRole::Normal => 2,
            TextureRole::Height => 3,
        }
    }

    pub fn from_binding(binding: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.binding() == binding)
    }

    pub fn label(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "diffuse",
            TextureRole::Specular => "specular",
            TextureRole::Normal => "normal",
            TextureRole::Height => "height",
        }
    }

    /// Color data is stored sRGB-encoded; the other roles hold linear data.
    fn format(self) -> wgpu::TextureFormat {
        match self {
            TextureRole::Diffuse => wgpu::TextureFormat::Rgba8UnormSrgb,
            _ => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Pixel used when a mesh has no texture for this role.
    fn placeholder_pixel(self) -> [u8; 4] {
        match self {
            TextureRole::Diffuse => [255, 255, 255, 255],
            TextureRole::Specular => [0, 0, 0, 255],
            // Flat +Z tangent-space normal.
            TextureRole::Normal => [128, 128, 255, 255],
            TextureRole::Height => [0, 0, 0, 255],
        }
    }
}

/// One mip level of RGBA8 pixel data.
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A decoded image plus its full mip chain, built on the CPU with
/// successive half-size downsamples. wgpu has no `glGenerateMipmap`
/// equivalent, so the chain is produced before upload.
pub struct ImagePyramid {
    levels: Vec<MipLevel>,
}

impl ImagePyramid {
    /// Decode an image file and build its mip chain.
    pub fn from_path(path: &Path) -> Result<Self, AssetError> {
        let image = image::open(path).map_err(|err| AssetError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self::from_image(image.to_rgba8()))
    }

    /// Decode from an in-memory encoded image. `origin` names the asset the
    /// bytes came from, for error reporting.
    pub fn from_memory(bytes: &[u8], origin: &Path) -> Result<Self, AssetError> {
        let image = image::load_from_memory(bytes).map_err(|err| AssetError::Decode {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self::from_image(image.to_rgba8()))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let mut levels = Vec::with_capacity(
            Self::mip_level_count(image.width(), image.height()) as usize,
        );
        let mut current = image;
        loop {
            let (width, height) = (current.width(), current.height());
            let done = width == 1 && height == 1;
            let next = if done {
                None
            } else {
                Some(image::imageops::resize(
                    &current,
                    (width / 2).max(1),
                    (height / 2).max(1),
                    image::imageops::FilterType::Triangle,
                ))
            };
            levels.push(MipLevel {
                width,
                height,
                data: current.into_raw(),
            });
            match next {
                Some(image) => current = image,
                None => break,
            }
        }
        Self { levels }
    }

    /// Number of levels in a full chain for the given base dimensions.
    pub fn mip_level_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    pub fn width(&self) -> u32 {
        self.levels[0].width
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height
    }

    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }
}

/// Wrap and filter modes for the shared material sampler.
#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    pub address_mode: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            address_mode: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
        }
    }
}

impl SamplerOptions {
    pub fn create(&self, device: &wgpu::Device) -> wgpu::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: self.address_mode,
            address_mode_v: self.address_mode,
            address_mode_w: self.address_mode,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            ..Default::default()
        })
    }
}

/// An uploaded 2D texture with its view.
pub struct Texture {
    role: TextureRole,
    source: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Texture {
    /// Upload a pyramid level by level.
    pub fn upload(
        ctx: &GpuContext,
        pyramid: &ImagePyramid,
        role: TextureRole,
        source: &str,
    ) -> Self {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(source),
            size: wgpu::Extent3d {
                width: pyramid.width(),
                height: pyramid.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: pyramid.levels().len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: role.format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, mip) in pyramid.levels().iter().enumerate() {
            ctx.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &mip.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * mip.width),
                    rows_per_image: Some(mip.height),
                },
                wgpu::Extent3d {
                    width: mip.width,
                    height: mip.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            role,
            source: source.to_string(),
            texture,
            view,
        }
    }

    /// 1x1 stand-in for a role the mesh does not supply.
    pub fn placeholder(ctx: &GpuContext, role: TextureRole) -> Self {
        let image = RgbaImage::from_pixel(1, 1, image::Rgba(role.placeholder_pixel()));
        let pyramid = ImagePyramid::from_image(image);
        Self::upload(ctx, &pyramid, role, &format!("placeholder ({})", role.label()))
    }

    pub fn role(&self) -> TextureRole {
        self.role
    }

    /// The cache key or label this texture was created from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_counts() {
        assert_eq!(ImagePyramid::mip_level_count(1, 1), 1);
        assert_eq!(ImagePyramid::mip_level_count(2, 2), 2);
        assert_eq!(ImagePyramid::mip_level_count(256, 256), 9);
        assert_eq!(ImagePyramid::mip_level_count(640, 480), 10);
    }

    #[test]
    fn pyramid_halves_down_to_one_pixel() {
        let image = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]));
        let pyramid = ImagePyramid::from_image(image);

        assert_eq!(pyramid.levels().len(), 3);
        assert_eq!((pyramid.levels()[0].width, pyramid.levels()[0].height), (4, 4));
        assert_eq!((pyramid.levels()[1].width, pyramid.levels()[1].height), (2, 2));
        assert_eq!((pyramid.levels()[2].width, pyramid.levels()[2].height), (1, 1));
        for mip in pyramid.levels() {
            assert_eq!(mip.data.len(), (mip.width * mip.height * 4) as usize);
        }
    }

    #[test]
    fn non_square_pyramid_keeps_min_dimension() {
        let image = RgbaImage::new(8, 2);
        let pyramid = ImagePyramid::from_image(image);

        let dims: Vec<_> = pyramid
            .levels()
            .iter()
            .map(|mip| (mip.width, mip.height))
            .collect();
        assert_eq!(dims, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn downsample_of_solid_color_stays_solid() {
        let image = RgbaImage::from_pixel(4, 4, image::Rgba([100, 150, 200, 255]));
        let pyramid = ImagePyramid::from_image(image);
        assert_eq!(pyramid.levels()[2].data, vec![100, 150, 200, 255]);
    }

    #[test]
    fn roles_round_trip_through_bindings() {
        for role in TextureRole::ALL {
            assert_eq!(TextureRole::from_binding(role.binding()), Some(role));
        }
        assert_eq!(TextureRole::from_binding(7), None);
    }
}
