//! Deduplicated, path-keyed resource loading.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::AssetError;
use crate::texture::{ImagePyramid, SamplerOptions, Texture, TextureRole};

/// Path -> `Arc<T>` map where the loader runs only on a miss.
///
/// Generic over the resource so the dedup behaviour is testable without a
/// GPU device. Failed loads are not cached; a later call for the same key
/// retries.
pub struct ResourceCache<T> {
    entries: HashMap<PathBuf, Arc<T>>,
}

impl<T> ResourceCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the existing handle for `key`, or run `load` and store its
    /// result.
    pub fn get_or_load<E>(
        &mut self,
        key: &Path,
        load: impl FnOnce(&Path) -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if let Some(hit) = self.entries.get(key) {
            return Ok(hit.clone());
        }
        let value = Arc::new(load(key)?);
        self.entries.insert(key.to_path_buf(), value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ResourceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Texture store scoped to one model's directory.
///
/// Texture paths in the asset are resolved relative to `root`; loading the
/// same path twice returns the same handle without a second decode or
/// upload. Also owns the shared material sampler and the per-role
/// placeholder textures.
pub struct TextureCache {
    root: PathBuf,
    textures: ResourceCache<Texture>,
    sampler: wgpu::Sampler,
    placeholders: HashMap<TextureRole, Arc<Texture>>,
}

impl TextureCache {
    pub fn new(ctx: &GpuContext, root: impl Into<PathBuf>, options: SamplerOptions) -> Self {
        Self {
            root: root.into(),
            textures: ResourceCache::new(),
            sampler: options.create(ctx.device()),
            placeholders: HashMap::new(),
        }
    }

    /// Load an image file relative to the cache root, or return the
    /// existing handle if this path was already loaded.
    pub fn load(
        &mut self,
        ctx: &GpuContext,
        relative: &str,
        role: TextureRole,
    ) -> Result<Arc<Texture>, AssetError> {
        let key = self.root.join(relative);
        self.textures.get_or_load(&key, |path| {
            log::debug!("decoding texture {path:?} ({})", role.label());
            let pyramid = ImagePyramid::from_path(path)?;
            Ok(Texture::upload(ctx, &pyramid, role, &path.to_string_lossy()))
        })
    }

    /// Load an image embedded in the asset (glTF buffer view or data URI).
    /// `key` must be unique per embedded image within the model.
    pub fn load_embedded(
        &mut self,
        ctx: &GpuContext,
        key: &str,
        bytes: &[u8],
        role: TextureRole,
    ) -> Result<Arc<Texture>, AssetError> {
        let key = self.root.join(key);
        self.textures.get_or_load(&key, |path| {
            let pyramid = ImagePyramid::from_memory(bytes, path)?;
            Ok(Texture::upload(ctx, &pyramid, role, &path.to_string_lossy()))
        })
    }

    /// Lazily created 1x1 texture for a role a mesh does not supply.
    pub fn placeholder(&mut self, ctx: &GpuContext, role: TextureRole) -> Arc<Texture> {
        self.placeholders
            .entry(role)
            .or_insert_with(|| Arc::new(Texture::placeholder(ctx, role)))
            .clone()
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Number of distinct textures loaded (placeholders excluded).
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_load_is_a_cache_hit() {
        let mut cache: ResourceCache<u32> = ResourceCache::new();
        let mut loads = 0;

        let first = cache
            .get_or_load::<()>(Path::new("a.png"), |_| {
                loads += 1;
                Ok(7)
            })
            .unwrap();
        let second = cache
            .get_or_load::<()>(Path::new("a.png"), |_| {
                loads += 1;
                Ok(8)
            })
            .unwrap();

        assert_eq!(loads, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_keys_load_separately() {
        let mut cache: ResourceCache<u32> = ResourceCache::new();
        cache
            .get_or_load::<()>(Path::new("a.png"), |_| Ok(1))
            .unwrap();
        cache
            .get_or_load::<()>(Path::new("b.png"), |_| Ok(2))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_loads_are_not_cached() {
        let mut cache: ResourceCache<u32> = ResourceCache::new();

        let result = cache.get_or_load(Path::new("broken.png"), |_| Err("corrupt"));
        assert!(result.is_err());
        assert!(!cache.contains(Path::new("broken.png")));

        let retried = cache
            .get_or_load::<&str>(Path::new("broken.png"), |_| Ok(3))
            .unwrap();
        assert_eq!(*retried, 3);
    }
}
