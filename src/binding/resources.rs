//! GPU Buffers & Textures
//!
//! Backend halves of the buffer and texture objects that bind groups and
//! passes reference. Each carries a process-unique resource id; replacing the
//! underlying GPU object (reallocation, device restore) issues a new id, which
//! is how bind groups and tracked passes notice the change.
//!
//! Textures cache their sub-resource views by [`TextureViewKey`] and their
//! samplers by [`SamplerBinding`], so repeated binds never recreate them.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use super::format::{SamplerBinding, ViewDimension};
use crate::device::backend::GpuBackend;

// Id 0 is reserved: bind group fingerprints encode an unset slot as `[0, 0]`.
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique resource id. Never returns `0`.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── GpuBuffer ───────────────────────────────────────────────────────────────

/// A GPU buffer with a resource id and an optional CPU shadow of its
/// contents. Buffers with a shadow are re-uploaded on [`recreate`](Self::recreate).
pub struct GpuBuffer<B: GpuBackend> {
    id: u64,
    raw: B::Buffer,
    size: u64,
    usage: wgpu::BufferUsages,
    label: String,
    shadow: Option<Vec<u8>>,
}

impl<B: GpuBackend> GpuBuffer<B> {
    /// An uninitialised buffer.
    #[must_use]
    pub fn new(backend: &B, label: &str, size: u64, usage: wgpu::BufferUsages) -> Self {
        let raw = backend.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Self {
            id: next_resource_id(),
            raw,
            size,
            usage,
            label: label.to_string(),
            shadow: None,
        }
    }

    /// A buffer initialised from `data`, padded to the copy alignment. The
    /// contents are shadowed on the CPU.
    #[must_use]
    pub fn with_data(backend: &B, label: &str, usage: wgpu::BufferUsages, data: &[u8]) -> Self {
        let mut contents = data.to_vec();
        contents.resize(pad_to_copy_alignment(data.len() as u64) as usize, 0);
        let mut buffer = Self::new(
            backend,
            label,
            contents.len() as u64,
            usage | wgpu::BufferUsages::COPY_DST,
        );
        backend.write_buffer(&buffer.raw, 0, &contents);
        buffer.shadow = Some(contents);
        buffer
    }

    /// Writes `data` at `offset`, keeping the shadow in sync.
    pub fn write(&mut self, backend: &B, offset: u64, data: &[u8]) {
        backend.write_buffer(&self.raw, offset, data);
        if let Some(shadow) = &mut self.shadow {
            let start = offset as usize;
            let end = (start + data.len()).min(shadow.len());
            if start < end {
                shadow[start..end].copy_from_slice(&data[..end - start]);
            }
        }
    }

    /// Replaces the GPU object, re-uploading shadowed contents.
    pub fn recreate(&mut self, backend: &B) {
        self.raw = backend.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: self.size,
            usage: self.usage,
            mapped_at_creation: false,
        });
        self.id = next_resource_id();
        if let Some(shadow) = &self.shadow {
            backend.write_buffer(&self.raw, 0, shadow);
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn raw(&self) -> &B::Buffer {
        &self.raw
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Rounds up to `wgpu::COPY_BUFFER_ALIGNMENT`.
#[inline]
#[must_use]
pub fn pad_to_copy_alignment(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

// ─── Texture Description ─────────────────────────────────────────────────────

/// Creation parameters of a [`GpuTexture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array layers otherwise. Cube textures use six
    /// layers per cube.
    pub depth_or_layers: u32,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub format: wgpu::TextureFormat,
    pub dimension: ViewDimension,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    /// A single-layer, single-mip 2D texture.
    #[must_use]
    pub fn new_2d(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            depth_or_layers: 1,
            mip_level_count: 1,
            sample_count: 1,
            format,
            dimension: ViewDimension::D2,
            usage,
        }
    }

    /// Full mip chain for the texture's largest side.
    #[must_use]
    pub fn with_full_mips(mut self) -> Self {
        self.mip_level_count = self.width.max(self.height).max(1).ilog2() + 1;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    #[must_use]
    pub fn with_layers(mut self, dimension: ViewDimension, depth_or_layers: u32) -> Self {
        self.dimension = dimension;
        self.depth_or_layers = depth_or_layers;
        self
    }

    fn texture_dimension(&self) -> wgpu::TextureDimension {
        match self.dimension {
            ViewDimension::D1 => wgpu::TextureDimension::D1,
            ViewDimension::D3 => wgpu::TextureDimension::D3,
            _ => wgpu::TextureDimension::D2,
        }
    }
}

/// Sub-resource range of a texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewKey {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl TextureViewKey {
    #[must_use]
    pub fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// One mip level of one layer.
    #[must_use]
    pub fn single(mip: u32, layer: u32) -> Self {
        Self::new(mip, 1, layer, 1)
    }
}

/// Filtering and addressing of a texture's samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerParams {
    pub address_mode: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    /// Requested anisotropy; clamped to the device maximum. Only applied when
    /// every filter is linear.
    pub anisotropy: u16,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            address_mode: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            anisotropy: 1,
        }
    }
}

// ─── GpuTexture ──────────────────────────────────────────────────────────────

/// A GPU texture with its default view and view/sampler caches.
pub struct GpuTexture<B: GpuBackend> {
    id: u64,
    raw: B::Texture,
    desc: TextureDesc,
    default_view: B::TextureView,
    views: RefCell<FxHashMap<TextureViewKey, B::TextureView>>,
    samplers: RefCell<[Option<B::Sampler>; 3]>,
    sampler_params: SamplerParams,
    max_anisotropy: u16,
}

impl<B: GpuBackend> GpuTexture<B> {
    #[must_use]
    pub fn new(backend: &B, desc: TextureDesc) -> Self {
        let (raw, default_view) = create_raw(backend, &desc);
        Self {
            id: next_resource_id(),
            raw,
            desc,
            default_view,
            views: RefCell::new(FxHashMap::default()),
            samplers: RefCell::new([None, None, None]),
            sampler_params: SamplerParams::default(),
            max_anisotropy: backend.caps().max_anisotropy,
        }
    }

    /// Replaces the GPU object. Contents are not preserved.
    pub fn recreate(&mut self, backend: &B) {
        let (raw, default_view) = create_raw(backend, &self.desc);
        self.raw = raw;
        self.default_view = default_view;
        self.id = next_resource_id();
        self.views.get_mut().clear();
        *self.samplers.get_mut() = [None, None, None];
    }

    /// Changes sampling parameters; cached samplers are dropped.
    pub fn set_sampler_params(&mut self, params: SamplerParams) {
        if self.sampler_params != params {
            self.sampler_params = params;
            *self.samplers.get_mut() = [None, None, None];
        }
    }

    /// View of a sub-resource range, created on first request.
    pub fn view(&self, backend: &B, key: TextureViewKey) -> B::TextureView {
        if let Some(view) = self.views.borrow().get(&key) {
            return view.clone();
        }
        let view = backend.create_texture_view(
            &self.raw,
            &wgpu::TextureViewDescriptor {
                label: Some(&self.desc.label),
                format: None,
                dimension: Some(self.view_dimension(key).to_wgpu()),
                aspect: wgpu::TextureAspect::All,
                base_mip_level: key.base_mip,
                mip_level_count: Some(key.mip_count),
                base_array_layer: key.base_layer,
                array_layer_count: Some(key.layer_count),
                usage: None,
            },
        );
        self.views.borrow_mut().insert(key, view.clone());
        view
    }

    /// Sampler for the given binding type, created on first request.
    pub fn sampler(&self, backend: &B, binding: SamplerBinding) -> B::Sampler {
        if let Some(sampler) = &self.samplers.borrow()[binding.index()] {
            return sampler.clone();
        }
        let params = self.sampler_params;
        let (mag_filter, min_filter, mipmap_filter) = match binding {
            SamplerBinding::NonFiltering => (
                wgpu::FilterMode::Nearest,
                wgpu::FilterMode::Nearest,
                wgpu::MipmapFilterMode::Nearest,
            ),
            _ => (params.mag_filter, params.min_filter, params.mipmap_filter),
        };
        let all_linear = mag_filter == wgpu::FilterMode::Linear
            && min_filter == wgpu::FilterMode::Linear
            && mipmap_filter == wgpu::MipmapFilterMode::Linear;
        let anisotropy_clamp = if binding == SamplerBinding::Filtering && all_linear {
            params.anisotropy.clamp(1, self.max_anisotropy.max(1))
        } else {
            1
        };

        let sampler = backend.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&self.desc.label),
            address_mode_u: params.address_mode,
            address_mode_v: params.address_mode,
            address_mode_w: params.address_mode,
            mag_filter,
            min_filter,
            mipmap_filter,
            compare: (binding == SamplerBinding::Comparison)
                .then_some(wgpu::CompareFunction::LessEqual),
            anisotropy_clamp,
            ..Default::default()
        });
        self.samplers.borrow_mut()[binding.index()] = Some(sampler.clone());
        sampler
    }

    /// Dimension used for a view of `key`: single layers of layered textures
    /// are viewed as plain 2D.
    fn view_dimension(&self, key: TextureViewKey) -> ViewDimension {
        match self.desc.dimension {
            ViewDimension::D2Array | ViewDimension::Cube | ViewDimension::CubeArray
                if key.layer_count == 1 =>
            {
                ViewDimension::D2
            }
            ViewDimension::Cube if key.layer_count != 6 => ViewDimension::D2Array,
            ViewDimension::CubeArray if key.layer_count % 6 != 0 => ViewDimension::D2Array,
            other => other,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn raw(&self) -> &B::Texture {
        &self.raw
    }

    #[inline]
    #[must_use]
    pub fn default_view(&self) -> &B::TextureView {
        &self.default_view
    }

    #[inline]
    #[must_use]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.desc.format
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    #[inline]
    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        self.desc.mip_level_count
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.desc.sample_count
    }

    /// Number of cached sub-resource views.
    #[must_use]
    pub fn cached_view_count(&self) -> usize {
        self.views.borrow().len()
    }
}

fn create_raw<B: GpuBackend>(backend: &B, desc: &TextureDesc) -> (B::Texture, B::TextureView) {
    let raw = backend.create_texture(&wgpu::TextureDescriptor {
        label: Some(&desc.label),
        size: wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: desc.depth_or_layers.max(1),
        },
        mip_level_count: desc.mip_level_count.max(1),
        sample_count: desc.sample_count.max(1),
        dimension: desc.texture_dimension(),
        format: desc.format,
        usage: desc.usage,
        view_formats: &[],
    });
    let default_view = backend.create_texture_view(
        &raw,
        &wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(desc.dimension.to_wgpu()),
            ..Default::default()
        },
    );
    (raw, default_view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Command, RecordingBackend};

    #[test]
    fn resource_ids_skip_zero() {
        let ids: Vec<u64> = (0..4).map(|_| next_resource_id()).collect();
        assert!(ids.iter().all(|&id| id != 0));
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn view_cache_reuses_identical_ranges() {
        let backend = RecordingBackend::new();
        let texture = GpuTexture::new(
            &backend,
            TextureDesc::new_2d(
                "shadow",
                256,
                256,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING,
            )
            .with_full_mips(),
        );
        let a = texture.view(&backend, TextureViewKey::single(2, 0));
        let b = texture.view(&backend, TextureViewKey::single(2, 0));
        let c = texture.view(&backend, TextureViewKey::single(3, 0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(texture.cached_view_count(), 2);
        assert_eq!(texture.mip_level_count(), 9);
    }

    #[test]
    fn sampler_cache_per_binding_type() {
        let backend = RecordingBackend::new();
        let texture = GpuTexture::new(
            &backend,
            TextureDesc::new_2d(
                "depth",
                64,
                64,
                wgpu::TextureFormat::Depth32Float,
                wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        );
        let a = texture.sampler(&backend, SamplerBinding::Comparison);
        let b = texture.sampler(&backend, SamplerBinding::Comparison);
        let c = texture.sampler(&backend, SamplerBinding::NonFiltering);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let comparisons = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateSampler { comparison: true, .. }))
            .count();
        assert_eq!(comparisons, 1);
    }

    #[test]
    fn recreate_issues_new_id_and_reuploads() {
        let backend = RecordingBackend::new();
        let mut buffer = GpuBuffer::with_data(
            &backend,
            "vertices",
            wgpu::BufferUsages::VERTEX,
            &[1, 2, 3, 4, 5],
        );
        assert_eq!(buffer.size(), 8);
        let old = buffer.id();
        buffer.recreate(&backend);
        assert_ne!(buffer.id(), old);
        assert_eq!(
            backend.buffer_contents(*buffer.raw()),
            Some(vec![1, 2, 3, 4, 5, 0, 0, 0])
        );
    }
}
