//! Bind Group Format
//!
//! The slot/type schema of one bind group. Slots are assigned positionally:
//!
//! 1. uniform buffers (dynamic offsets enabled)
//! 2. textures, each optionally followed by its sampler in the next slot
//! 3. storage buffers and storage textures
//!
//! Every format carries a deterministic key string built from
//! `{slot, visibility, type parameters}` of each entry, interned to a compact
//! id. Formats built from the same ordered inputs share a key; reordering the
//! inputs changes it. Resource names do not take part in the key since they
//! do not affect layout compatibility.

use std::fmt::Write;

use crate::utils::KeyInterner;

// ─── Closed Parameter Enums ──────────────────────────────────────────────────

/// Sample type of a sampled texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleKind {
    Float,
    UnfilterableFloat,
    Sint,
    Uint,
    Depth,
}

impl TextureSampleKind {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureSampleType {
        match self {
            Self::Float => wgpu::TextureSampleType::Float { filterable: true },
            Self::UnfilterableFloat => wgpu::TextureSampleType::Float { filterable: false },
            Self::Sint => wgpu::TextureSampleType::Sint,
            Self::Uint => wgpu::TextureSampleType::Uint,
            Self::Depth => wgpu::TextureSampleType::Depth,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Float => "f",
            Self::UnfilterableFloat => "uf",
            Self::Sint => "i",
            Self::Uint => "u",
            Self::Depth => "d",
        }
    }

    /// Element type used in the texture's shader declaration.
    #[must_use]
    pub fn shader_element(self) -> &'static str {
        match self {
            Self::Float | Self::UnfilterableFloat | Self::Depth => "f32",
            Self::Sint => "i32",
            Self::Uint => "u32",
        }
    }
}

/// Texture view dimension of a texture or storage texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    D1,
    D2,
    D2Array,
    Cube,
    CubeArray,
    D3,
}

impl ViewDimension {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureViewDimension {
        match self {
            Self::D1 => wgpu::TextureViewDimension::D1,
            Self::D2 => wgpu::TextureViewDimension::D2,
            Self::D2Array => wgpu::TextureViewDimension::D2Array,
            Self::Cube => wgpu::TextureViewDimension::Cube,
            Self::CubeArray => wgpu::TextureViewDimension::CubeArray,
            Self::D3 => wgpu::TextureViewDimension::D3,
        }
    }

    /// Shape suffix used in shader type names (`texture_2d_array`).
    #[must_use]
    pub fn shader_suffix(self) -> &'static str {
        match self {
            Self::D1 => "1d",
            Self::D2 => "2d",
            Self::D2Array => "2d_array",
            Self::Cube => "cube",
            Self::CubeArray => "cube_array",
            Self::D3 => "3d",
        }
    }

    #[must_use]
    pub fn from_shader_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "1d" => Some(Self::D1),
            "2d" => Some(Self::D2),
            "2d_array" => Some(Self::D2Array),
            "cube" => Some(Self::Cube),
            "cube_array" => Some(Self::CubeArray),
            "3d" => Some(Self::D3),
            _ => None,
        }
    }

    /// Whether views of this dimension address several array layers.
    #[must_use]
    pub fn is_layered(self) -> bool {
        matches!(self, Self::D2Array | Self::Cube | Self::CubeArray)
    }
}

/// Texel format of a storage texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Bgra8Unorm,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
}

impl StorageFormat {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba8Snorm => wgpu::TextureFormat::Rgba8Snorm,
            Self::Rgba8Uint => wgpu::TextureFormat::Rgba8Uint,
            Self::Rgba8Sint => wgpu::TextureFormat::Rgba8Sint,
            Self::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            Self::Rgba16Uint => wgpu::TextureFormat::Rgba16Uint,
            Self::Rgba16Sint => wgpu::TextureFormat::Rgba16Sint,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::R32Uint => wgpu::TextureFormat::R32Uint,
            Self::R32Sint => wgpu::TextureFormat::R32Sint,
            Self::R32Float => wgpu::TextureFormat::R32Float,
            Self::Rg32Uint => wgpu::TextureFormat::Rg32Uint,
            Self::Rg32Sint => wgpu::TextureFormat::Rg32Sint,
            Self::Rg32Float => wgpu::TextureFormat::Rg32Float,
            Self::Rgba32Uint => wgpu::TextureFormat::Rgba32Uint,
            Self::Rgba32Sint => wgpu::TextureFormat::Rgba32Sint,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Name used in shader source (`rgba8unorm`).
    #[must_use]
    pub fn shader_name(self) -> &'static str {
        match self {
            Self::Rgba8Unorm => "rgba8unorm",
            Self::Rgba8Snorm => "rgba8snorm",
            Self::Rgba8Uint => "rgba8uint",
            Self::Rgba8Sint => "rgba8sint",
            Self::Bgra8Unorm => "bgra8unorm",
            Self::Rgba16Uint => "rgba16uint",
            Self::Rgba16Sint => "rgba16sint",
            Self::Rgba16Float => "rgba16float",
            Self::R32Uint => "r32uint",
            Self::R32Sint => "r32sint",
            Self::R32Float => "r32float",
            Self::Rg32Uint => "rg32uint",
            Self::Rg32Sint => "rg32sint",
            Self::Rg32Float => "rg32float",
            Self::Rgba32Uint => "rgba32uint",
            Self::Rgba32Sint => "rgba32sint",
            Self::Rgba32Float => "rgba32float",
        }
    }

    #[must_use]
    pub fn from_shader_name(name: &str) -> Option<Self> {
        const ALL: [StorageFormat; 17] = [
            StorageFormat::Rgba8Unorm,
            StorageFormat::Rgba8Snorm,
            StorageFormat::Rgba8Uint,
            StorageFormat::Rgba8Sint,
            StorageFormat::Bgra8Unorm,
            StorageFormat::Rgba16Uint,
            StorageFormat::Rgba16Sint,
            StorageFormat::Rgba16Float,
            StorageFormat::R32Uint,
            StorageFormat::R32Sint,
            StorageFormat::R32Float,
            StorageFormat::Rg32Uint,
            StorageFormat::Rg32Sint,
            StorageFormat::Rg32Float,
            StorageFormat::Rgba32Uint,
            StorageFormat::Rgba32Sint,
            StorageFormat::Rgba32Float,
        ];
        ALL.into_iter().find(|format| format.shader_name() == name)
    }
}

/// Access mode of a storage texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageAccess {
    Read,
    Write,
    ReadWrite,
}

impl StorageAccess {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::StorageTextureAccess {
        match self {
            Self::Read => wgpu::StorageTextureAccess::ReadOnly,
            Self::Write => wgpu::StorageTextureAccess::WriteOnly,
            Self::ReadWrite => wgpu::StorageTextureAccess::ReadWrite,
        }
    }

    #[must_use]
    pub fn shader_name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read_write",
        }
    }

    #[must_use]
    pub fn from_shader_name(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "read_write" => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

/// Binding type of a sampler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBinding {
    Filtering,
    NonFiltering,
    Comparison,
}

impl SamplerBinding {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::SamplerBindingType {
        match self {
            Self::Filtering => wgpu::SamplerBindingType::Filtering,
            Self::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            Self::Comparison => wgpu::SamplerBindingType::Comparison,
        }
    }

    /// Index into per-texture sampler caches.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    fn code(self) -> &'static str {
        match self {
            Self::Filtering => "f",
            Self::NonFiltering => "n",
            Self::Comparison => "c",
        }
    }
}

// ─── Input Formats ───────────────────────────────────────────────────────────

/// A uniform buffer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindUniformBufferFormat {
    pub name: String,
    pub visibility: wgpu::ShaderStages,
}

impl BindUniformBufferFormat {
    #[must_use]
    pub fn new(name: impl Into<String>, visibility: wgpu::ShaderStages) -> Self {
        Self {
            name: name.into(),
            visibility,
        }
    }
}

/// The sampler half of a texture/sampler pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSamplerFormat {
    pub name: String,
    pub comparison: bool,
}

/// A sampled texture slot, optionally paired with a sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTextureFormat {
    pub name: String,
    pub visibility: wgpu::ShaderStages,
    pub dimension: ViewDimension,
    pub sample: TextureSampleKind,
    pub multisampled: bool,
    pub sampler: Option<BindSamplerFormat>,
}

impl BindTextureFormat {
    /// A 2D float texture with a filtering sampler named `{name}_sampler`.
    #[must_use]
    pub fn new(name: impl Into<String>, visibility: wgpu::ShaderStages) -> Self {
        let name = name.into();
        Self {
            sampler: Some(BindSamplerFormat {
                name: format!("{name}_sampler"),
                comparison: false,
            }),
            name,
            visibility,
            dimension: ViewDimension::D2,
            sample: TextureSampleKind::Float,
            multisampled: false,
        }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: ViewDimension) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_sample(mut self, sample: TextureSampleKind) -> Self {
        self.sample = sample;
        self
    }

    #[must_use]
    pub fn without_sampler(mut self) -> Self {
        self.sampler = None;
        self
    }

    /// Binding type for the paired sampler.
    #[must_use]
    pub fn sampler_binding(&self) -> Option<SamplerBinding> {
        self.sampler.as_ref().map(|sampler| {
            if sampler.comparison {
                SamplerBinding::Comparison
            } else if self.sample == TextureSampleKind::Float {
                SamplerBinding::Filtering
            } else {
                SamplerBinding::NonFiltering
            }
        })
    }
}

/// A storage buffer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindStorageBufferFormat {
    pub name: String,
    pub visibility: wgpu::ShaderStages,
    pub read_only: bool,
    /// Element type as written in shader source (`array<Particle>`).
    pub type_name: String,
}

/// A storage texture slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindStorageTextureFormat {
    pub name: String,
    pub visibility: wgpu::ShaderStages,
    pub dimension: ViewDimension,
    pub format: StorageFormat,
    pub access: StorageAccess,
}

/// A storage slot: buffer or texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindStorageFormat {
    Buffer(BindStorageBufferFormat),
    Texture(BindStorageTextureFormat),
}

// ─── Realized Entries ────────────────────────────────────────────────────────

/// Type of one binding slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    UniformBuffer {
        dynamic_offset: bool,
    },
    Texture {
        sample: TextureSampleKind,
        dimension: ViewDimension,
        multisampled: bool,
    },
    Sampler(SamplerBinding),
    StorageBuffer {
        read_only: bool,
        type_name: String,
    },
    StorageTexture {
        dimension: ViewDimension,
        format: StorageFormat,
        access: StorageAccess,
    },
}

/// One binding slot of a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingEntry {
    pub name: String,
    pub slot: u32,
    pub visibility: wgpu::ShaderStages,
    pub kind: BindingKind,
}

impl BindingEntry {
    fn write_key(&self, key: &mut String) {
        let vis = self.visibility.bits();
        let slot = self.slot;
        // Writing to a String cannot fail.
        let _ = match &self.kind {
            BindingKind::UniformBuffer { dynamic_offset } => {
                write!(key, "#{slot}U:{vis}:{}", u8::from(*dynamic_offset))
            }
            BindingKind::Texture {
                sample,
                dimension,
                multisampled,
            } => write!(
                key,
                "#{slot}T:{vis}:{}:{}:{}",
                sample.code(),
                dimension.shader_suffix(),
                u8::from(*multisampled)
            ),
            BindingKind::Sampler(binding) => write!(key, "#{slot}S:{vis}:{}", binding.code()),
            BindingKind::StorageBuffer { read_only, .. } => {
                write!(key, "#{slot}B:{vis}:{}", u8::from(*read_only))
            }
            BindingKind::StorageTexture {
                dimension,
                format,
                access,
            } => write!(
                key,
                "#{slot}X:{vis}:{}:{}:{}",
                access.shader_name(),
                format.shader_name(),
                dimension.shader_suffix()
            ),
        };
    }

    fn layout_entry(&self) -> wgpu::BindGroupLayoutEntry {
        let ty = match &self.kind {
            BindingKind::UniformBuffer { dynamic_offset } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: *dynamic_offset,
                min_binding_size: None,
            },
            BindingKind::Texture {
                sample,
                dimension,
                multisampled,
            } => wgpu::BindingType::Texture {
                sample_type: sample.to_wgpu(),
                view_dimension: dimension.to_wgpu(),
                multisampled: *multisampled,
            },
            BindingKind::Sampler(binding) => wgpu::BindingType::Sampler(binding.to_wgpu()),
            BindingKind::StorageBuffer { read_only, .. } => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: *read_only,
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            BindingKind::StorageTexture {
                dimension,
                format,
                access,
            } => wgpu::BindingType::StorageTexture {
                access: access.to_wgpu(),
                format: format.to_wgpu(),
                view_dimension: dimension.to_wgpu(),
            },
        };

        wgpu::BindGroupLayoutEntry {
            binding: self.slot,
            visibility: self.visibility,
            ty,
            count: None,
        }
    }
}

// ─── BindGroupFormat ─────────────────────────────────────────────────────────

/// Ordered slot schema of a bind group, with its interned key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupFormat {
    entries: Vec<BindingEntry>,
    key: String,
    id: u32,
    buffer_count: usize,
    texture_count: usize,
    storage_count: usize,
}

impl BindGroupFormat {
    /// Assigns slots positionally and interns the resulting key.
    ///
    /// # Panics
    ///
    /// Panics on a texture sample type / view dimension combination the GPU
    /// cannot bind, on a comparison sampler paired with a non-depth texture,
    /// and on cube storage textures.
    #[must_use]
    pub fn new(
        keys: &mut KeyInterner,
        buffers: Vec<BindUniformBufferFormat>,
        textures: Vec<BindTextureFormat>,
        storage: Vec<BindStorageFormat>,
    ) -> Self {
        let buffer_count = buffers.len();
        let texture_count = textures.len();
        let storage_count = storage.len();

        let mut entries = Vec::with_capacity(buffer_count + texture_count * 2 + storage_count);
        let mut slot = 0u32;

        for buffer in buffers {
            entries.push(BindingEntry {
                name: buffer.name,
                slot,
                visibility: buffer.visibility,
                kind: BindingKind::UniformBuffer {
                    dynamic_offset: true,
                },
            });
            slot += 1;
        }

        for texture in textures {
            assert_texture_supported(&texture);
            let sampler_binding = texture.sampler_binding();
            entries.push(BindingEntry {
                name: texture.name,
                slot,
                visibility: texture.visibility,
                kind: BindingKind::Texture {
                    sample: texture.sample,
                    dimension: texture.dimension,
                    multisampled: texture.multisampled,
                },
            });
            slot += 1;

            if let (Some(sampler), Some(binding)) = (texture.sampler, sampler_binding) {
                entries.push(BindingEntry {
                    name: sampler.name,
                    slot,
                    visibility: texture.visibility,
                    kind: BindingKind::Sampler(binding),
                });
                slot += 1;
            }
        }

        for resource in storage {
            let entry = match resource {
                BindStorageFormat::Buffer(buffer) => BindingEntry {
                    name: buffer.name,
                    slot,
                    visibility: buffer.visibility,
                    kind: BindingKind::StorageBuffer {
                        read_only: buffer.read_only,
                        type_name: buffer.type_name,
                    },
                },
                BindStorageFormat::Texture(texture) => {
                    assert!(
                        !matches!(
                            texture.dimension,
                            ViewDimension::Cube | ViewDimension::CubeArray
                        ),
                        "unsupported storage texture '{}': cube dimensions cannot be bound as storage",
                        texture.name
                    );
                    BindingEntry {
                        name: texture.name,
                        slot,
                        visibility: texture.visibility,
                        kind: BindingKind::StorageTexture {
                            dimension: texture.dimension,
                            format: texture.format,
                            access: texture.access,
                        },
                    }
                }
            };
            entries.push(entry);
            slot += 1;
        }

        let mut key = String::with_capacity(entries.len() * 16);
        for entry in &entries {
            entry.write_key(&mut key);
        }
        let id = keys.intern(&key);

        Self {
            entries,
            key,
            id,
            buffer_count,
            texture_count,
            storage_count,
        }
    }

    /// A format with no entries, used to fill unused bind group indices.
    #[must_use]
    pub fn empty(keys: &mut KeyInterner) -> Self {
        Self::new(keys, Vec::new(), Vec::new(), Vec::new())
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// Deterministic key string.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Interned id of [`key`](Self::key), used in pipeline cache lookups.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    #[inline]
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.texture_count
    }

    #[inline]
    #[must_use]
    pub fn storage_count(&self) -> usize {
        self.storage_count
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the given resource name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&BindingEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Layout entries for creating the bind group layout.
    #[must_use]
    pub fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        self.entries.iter().map(BindingEntry::layout_entry).collect()
    }
}

fn assert_texture_supported(texture: &BindTextureFormat) {
    let supported = match (texture.sample, texture.dimension, texture.multisampled) {
        (TextureSampleKind::Float, _, true) => false,
        (_, ViewDimension::D2, true) => true,
        (_, _, true) => false,
        (TextureSampleKind::Depth, ViewDimension::D1 | ViewDimension::D3, false) => false,
        _ => true,
    };
    assert!(
        supported,
        "unsupported texture binding '{}': sample type {:?} with view dimension {:?} (multisampled: {})",
        texture.name, texture.sample, texture.dimension, texture.multisampled
    );

    if let Some(sampler) = &texture.sampler {
        assert!(
            !sampler.comparison || texture.sample == TextureSampleKind::Depth,
            "comparison sampler '{}' requires a depth texture, '{}' samples {:?}",
            sampler.name,
            texture.name,
            texture.sample
        );
    }
}
