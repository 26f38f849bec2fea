//! WGSL compilation, reflection, and stage linking.
//!
//! Everything in this module is device-free: sources are parsed and
//! validated with naga, uniform layouts are reflected from the module IR,
//! and cross-stage compatibility is checked before any GPU object exists.
//! [`crate::GpuProgram`] builds the actual pipeline on top of this.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ShaderError;
use crate::texture::TextureRole;

/// Bind group 0 holds the per-frame uniform struct.
pub const GLOBALS_GROUP: u32 = 0;
pub const GLOBALS_BINDING: u32 = 0;
/// Bind group 1 holds the material textures; bindings 0..=3 are the four
/// texture roles, binding 4 the shared sampler.
pub const MATERIAL_GROUP: u32 = 1;
pub const MATERIAL_SAMPLER_BINDING: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn to_naga(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => write!(f, "vertex"),
            Stage::Fragment => write!(f, "fragment"),
        }
    }
}

/// A parsed and validated shader stage.
#[derive(Debug)]
pub struct CompiledStage {
    pub stage: Stage,
    pub label: String,
    pub source: String,
    pub entry_point: String,
    module: naga::Module,
}

impl CompiledStage {
    /// Parse and validate one WGSL stage.
    ///
    /// On failure the compiler diagnostic is preserved verbatim, rendered
    /// against the source so line/column context survives.
    pub fn compile(stage: Stage, label: &str, source: &str) -> Result<Self, ShaderError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|err| ShaderError::Compile {
            stage,
            label: label.to_string(),
            diagnostic: err.emit_to_string(source),
        })?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            stage,
            label: label.to_string(),
            diagnostic: err.emit_to_string(source),
        })?;

        let entry_point = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == stage.to_naga())
            .map(|ep| ep.name.clone())
            .ok_or_else(|| ShaderError::Compile {
                stage,
                label: label.to_string(),
                diagnostic: format!("source contains no {stage} entry point"),
            })?;

        Ok(Self {
            stage,
            label: label.to_string(),
            source: source.to_string(),
            entry_point,
            module,
        })
    }
}

/// Offset and byte size of one member of the uniform struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    pub size: u32,
}

/// Name -> slot map over the group-0 uniform struct, resolved once at link
/// time. Nested structs flatten to dotted names (`light.position`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    slots: BTreeMap<String, UniformSlot>,
    size: u32,
}

impl UniformLayout {
    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    /// Total byte size of the uniform struct.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }
}

/// Group-1 resource bindings declared by a stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterialBindings {
    pub textures: Vec<u32>,
    pub samplers: Vec<u32>,
    /// Group-1 bindings that are neither textures nor samplers.
    pub other: Vec<u32>,
}

impl MaterialBindings {
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.samplers.is_empty() && self.other.is_empty()
    }
}

/// The linked interface of a vertex + fragment pair.
#[derive(Debug)]
pub struct ProgramLayout {
    pub uniforms: Option<UniformLayout>,
    pub material: MaterialBindings,
}

impl ProgramLayout {
    /// Check that two compiled stages fit together and resolve the shared
    /// interface.
    ///
    /// Both stages may declare the group-0 uniform struct; when both do,
    /// the member layouts must match exactly. Material bindings must stay
    /// inside the fixed role convention and are fragment-only, since that
    /// is the visibility the material bind group layout carries.
    pub fn link(vs: &CompiledStage, fs: &CompiledStage) -> Result<Self, ShaderError> {
        let vs_uniforms = reflect_uniforms(&vs.module);
        let fs_uniforms = reflect_uniforms(&fs.module);

        let uniforms = match (vs_uniforms, fs_uniforms) {
            (Some(a), Some(b)) => {
                if a != b {
                    return Err(ShaderError::Link {
                        message: uniform_mismatch(&a, &b, &vs.label, &fs.label),
                    });
                }
                Some(a)
            }
            (a, b) => a.or(b),
        };

        if !reflect_material(&vs.module).is_empty() {
            return Err(ShaderError::Link {
                message: format!(
                    "'{}' binds material resources in the vertex stage; \
                     group {MATERIAL_GROUP} is fragment-only",
                    vs.label
                ),
            });
        }

        let material = reflect_material(&fs.module);
        if let Some(&binding) = material.other.first() {
            return Err(ShaderError::Link {
                message: format!(
                    "'{}' group {MATERIAL_GROUP} binding {binding} is neither a texture nor a sampler",
                    fs.label
                ),
            });
        }
        for &binding in &material.textures {
            if TextureRole::from_binding(binding).is_none() {
                return Err(ShaderError::Link {
                    message: format!(
                        "'{}' group {MATERIAL_GROUP} binding {binding} has no assigned texture role",
                        fs.label
                    ),
                });
            }
        }
        for &binding in &material.samplers {
            if binding != MATERIAL_SAMPLER_BINDING {
                return Err(ShaderError::Link {
                    message: format!(
                        "'{}' declares a sampler at group {MATERIAL_GROUP} binding {binding}; \
                         the material sampler lives at binding {MATERIAL_SAMPLER_BINDING}",
                        fs.label
                    ),
                });
            }
        }

        Ok(Self { uniforms, material })
    }
}

fn reflect_uniforms(module: &naga::Module) -> Option<UniformLayout> {
    for (_, var) in module.global_variables.iter() {
        if !matches!(var.space, naga::AddressSpace::Uniform) {
            continue;
        }
        let Some(binding) = &var.binding else {
            continue;
        };
        if binding.group != GLOBALS_GROUP || binding.binding != GLOBALS_BINDING {
            continue;
        }

        let ty = &module.types[var.ty];
        let mut slots = BTreeMap::new();
        let size = match &ty.inner {
            naga::TypeInner::Struct { members, span } => {
                collect_members(module, members, "", 0, &mut slots);
                *span
            }
            inner => {
                // A bare (non-struct) uniform is addressable by the
                // variable name itself.
                let size = inner.size(module.to_ctx());
                if let Some(name) = &var.name {
                    slots.insert(name.clone(), UniformSlot { offset: 0, size });
                }
                size
            }
        };
        return Some(UniformLayout { slots, size });
    }
    None
}

fn collect_members(
    module: &naga::Module,
    members: &[naga::StructMember],
    prefix: &str,
    base: u32,
    slots: &mut BTreeMap<String, UniformSlot>,
) {
    for member in members {
        let Some(name) = &member.name else {
            continue;
        };
        let full = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        let offset = base + member.offset;
        match &module.types[member.ty].inner {
            naga::TypeInner::Struct { members, .. } => {
                collect_members(module, members, &full, offset, slots);
            }
            inner => {
                slots.insert(
                    full,
                    UniformSlot {
                        offset,
                        size: inner.size(module.to_ctx()),
                    },
                );
            }
        }
    }
}

fn reflect_material(module: &naga::Module) -> MaterialBindings {
    let mut material = MaterialBindings::default();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        if binding.group != MATERIAL_GROUP {
            continue;
        }
        match &module.types[var.ty].inner {
            naga::TypeInner::Image { .. } => material.textures.push(binding.binding),
            naga::TypeInner::Sampler { .. } => material.samplers.push(binding.binding),
            _ => material.other.push(binding.binding),
        }
    }
    material.textures.sort_unstable();
    material.samplers.sort_unstable();
    material.other.sort_unstable();
    material
}

fn uniform_mismatch(a: &UniformLayout, b: &UniformLayout, vs: &str, fs: &str) -> String {
    for (name, slot) in &a.slots {
        match b.slots.get(name) {
            None => {
                return format!("uniform `{name}` is declared in '{vs}' but missing from '{fs}'");
            }
            Some(other) if other != slot => {
                return format!(
                    "uniform `{name}` layout differs between '{vs}' (offset {}, size {}) \
                     and '{fs}' (offset {}, size {})",
                    slot.offset, slot.size, other.offset, other.size
                );
            }
            Some(_) => {}
        }
    }
    for name in b.slots.keys() {
        if !a.slots.contains_key(name) {
            return format!("uniform `{name}` is declared in '{fs}' but missing from '{vs}'");
        }
    }
    format!("uniform struct size differs between '{vs}' ({}) and '{fs}' ({})", a.size, b.size)
}

/// Host-side value that can fill one uniform slot.
pub trait UniformValue {
    /// Raw bytes in WGSL memory layout.
    fn to_bytes(&self) -> Vec<u8>;
}

impl UniformValue for f32 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }
}

impl UniformValue for i32 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }
}

impl UniformValue for u32 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }
}

impl UniformValue for glam::Vec2 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(&self.to_array()).to_vec()
    }
}

impl UniformValue for glam::Vec3 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(&self.to_array()).to_vec()
    }
}

impl UniformValue for glam::Vec4 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(&self.to_array()).to_vec()
    }
}

impl UniformValue for glam::Mat4 {
    fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(&self.to_cols_array()).to_vec()
    }
}

impl UniformValue for glam::Mat3 {
    // mat3x3<f32> columns have vec4 stride.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48);
        for column in self.to_cols_array_2d() {
            out.extend_from_slice(bytemuck::bytes_of(&column));
            out.extend_from_slice(&0.0f32.to_le_bytes());
        }
        out
    }
}

/// CPU mirror of the uniform buffer.
///
/// `set` on a name the program does not expose is a no-op: scenes with
/// partially-matching shaders keep rendering, and the miss is logged at
/// debug level so it can still be found.
pub struct UniformBlock {
    layout: UniformLayout,
    data: Vec<u8>,
    dirty: bool,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let data = vec![0; layout.size() as usize];
        Self {
            layout,
            data,
            dirty: false,
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    /// Write a typed value. Returns whether anything was written.
    pub fn set<V: UniformValue>(&mut self, name: &str, value: V) -> bool {
        self.set_raw(name, &value.to_bytes())
    }

    pub fn set_raw(&mut self, name: &str, bytes: &[u8]) -> bool {
        let Some(slot) = self.layout.slot(name) else {
            log::debug!("uniform `{name}` not found in program; value ignored");
            return false;
        };
        if slot.size as usize != bytes.len() {
            log::debug!(
                "uniform `{name}` expects {} bytes, got {}; value ignored",
                slot.size,
                bytes.len()
            );
            return false;
        }
        let start = slot.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
        true
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Clears and returns the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
