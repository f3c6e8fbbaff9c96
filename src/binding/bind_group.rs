//! Bind Groups
//!
//! A [`BindGroup`] is a [`BindGroupFormat`] filled with concrete resources.
//! [`BindGroup::update`] always rebuilds the whole binding set from the
//! format's ordered slot list; there is no partial patching. Every rebuild
//! issues a new id so tracked passes re-bind it.
//!
//! The resource lists mirror the format's inputs: one entry per uniform
//! buffer, one per texture (its paired sampler comes from the texture's
//! sampler cache) and one per storage resource. A missing resource for a
//! slot is an invariant violation and panics.

use std::sync::Arc;

use smallvec::SmallVec;

use super::format::{BindGroupFormat, BindingKind};
use super::layout_cache::LayoutCache;
use super::resources::{GpuBuffer, GpuTexture, TextureViewKey, next_resource_id};
use crate::device::backend::{BindGroupEntry, BindingResource, GpuBackend};

/// A texture argument: the texture's default view or a cached sub-range view.
pub enum BindTexture<'a, B: GpuBackend> {
    Texture(&'a GpuTexture<B>),
    View(&'a GpuTexture<B>, TextureViewKey),
}

impl<'a, B: GpuBackend> BindTexture<'a, B> {
    #[inline]
    #[must_use]
    pub fn texture(&self) -> &'a GpuTexture<B> {
        match self {
            Self::Texture(texture) | Self::View(texture, _) => texture,
        }
    }

    fn fingerprint(&self, out: &mut Fingerprint) {
        match self {
            Self::Texture(texture) => out.extend([texture.id(), u64::MAX]),
            Self::View(texture, key) => out.extend([
                texture.id(),
                u64::from(key.base_mip)
                    | u64::from(key.mip_count) << 16
                    | u64::from(key.base_layer) << 32
                    | u64::from(key.layer_count) << 48,
            ]),
        }
    }

    fn resolve(&self, backend: &B, storage: bool) -> B::TextureView {
        match self {
            Self::View(texture, key) => texture.view(backend, *key),
            // Storage bindings need a single mip level.
            Self::Texture(texture) if storage && texture.mip_level_count() > 1 => {
                let desc = texture.desc();
                let layers = if desc.dimension == super::format::ViewDimension::D3 {
                    1
                } else {
                    desc.depth_or_layers.max(1)
                };
                texture.view(backend, TextureViewKey::new(0, 1, 0, layers))
            }
            Self::Texture(texture) => texture.default_view().clone(),
        }
    }
}

/// A uniform buffer argument. `size` limits the bound window, which is
/// required when the slot uses dynamic offsets into a larger buffer.
pub struct BindBuffer<'a, B: GpuBackend> {
    pub buffer: &'a GpuBuffer<B>,
    pub size: Option<u64>,
}

impl<'a, B: GpuBackend> BindBuffer<'a, B> {
    #[must_use]
    pub fn whole(buffer: &'a GpuBuffer<B>) -> Self {
        Self { buffer, size: None }
    }

    #[must_use]
    pub fn window(buffer: &'a GpuBuffer<B>, size: u64) -> Self {
        Self {
            buffer,
            size: Some(size),
        }
    }
}

/// A storage argument.
pub enum BindStorage<'a, B: GpuBackend> {
    Buffer(&'a GpuBuffer<B>),
    Texture(BindTexture<'a, B>),
}

type Fingerprint = SmallVec<[u64; 12]>;

/// A realized binding set.
pub struct BindGroup<B: GpuBackend> {
    id: u64,
    format: Arc<BindGroupFormat>,
    raw: Option<B::BindGroup>,
    fingerprint: Fingerprint,
    /// Ids of the buffers and textures bound by the last update.
    referenced: SmallVec<[u64; 8]>,
}

impl<B: GpuBackend> BindGroup<B> {
    /// An unrealized bind group; call [`update`](Self::update) before use.
    #[must_use]
    pub fn new(format: Arc<BindGroupFormat>) -> Self {
        Self {
            id: next_resource_id(),
            format,
            raw: None,
            fingerprint: Fingerprint::new(),
            referenced: SmallVec::new(),
        }
    }

    /// Rebuilds the binding set from scratch.
    ///
    /// # Panics
    ///
    /// Panics if a slot of the format has no resource.
    pub fn update(
        &mut self,
        backend: &B,
        layouts: &mut LayoutCache<B>,
        buffers: &[Option<BindBuffer<'_, B>>],
        textures: &[Option<BindTexture<'_, B>>],
        storage: &[Option<BindStorage<'_, B>>],
    ) {
        let format = Arc::clone(&self.format);
        let layout = layouts.bind_group_layout(backend, &format);

        // Resolved views and samplers must outlive the entry list.
        let mut views: Vec<B::TextureView> = Vec::with_capacity(textures.len() + storage.len());
        let mut samplers: Vec<B::Sampler> = Vec::with_capacity(textures.len());
        let mut plan: Vec<(u32, Planned<'_, B>)> = Vec::with_capacity(format.entries().len());
        let mut referenced: SmallVec<[u64; 8]> = SmallVec::new();

        let (mut buffer_index, mut texture_index, mut storage_index) = (0usize, 0usize, 0usize);
        let mut last_texture: Option<&BindTexture<'_, B>> = None;

        for entry in format.entries() {
            let planned = match &entry.kind {
                BindingKind::UniformBuffer { .. } => {
                    let Some(Some(binding)) = buffers.get(buffer_index) else {
                        missing_resource(&format, &entry.name, entry.slot)
                    };
                    buffer_index += 1;
                    referenced.push(binding.buffer.id());
                    Planned::Buffer(binding.buffer, binding.size)
                }
                BindingKind::Texture { .. } => {
                    let Some(Some(texture)) = textures.get(texture_index) else {
                        missing_resource(&format, &entry.name, entry.slot)
                    };
                    texture_index += 1;
                    last_texture = Some(texture);
                    referenced.push(texture.texture().id());
                    views.push(texture.resolve(backend, false));
                    Planned::View(views.len() - 1)
                }
                BindingKind::Sampler(binding) => {
                    let Some(texture) = last_texture else {
                        missing_resource(&format, &entry.name, entry.slot)
                    };
                    samplers.push(texture.texture().sampler(backend, *binding));
                    Planned::Sampler(samplers.len() - 1)
                }
                BindingKind::StorageBuffer { .. } => {
                    let Some(Some(BindStorage::Buffer(buffer))) = storage.get(storage_index) else {
                        missing_resource(&format, &entry.name, entry.slot)
                    };
                    storage_index += 1;
                    referenced.push(buffer.id());
                    Planned::Buffer(buffer, None)
                }
                BindingKind::StorageTexture { .. } => {
                    let Some(Some(BindStorage::Texture(texture))) = storage.get(storage_index) else {
                        missing_resource(&format, &entry.name, entry.slot)
                    };
                    storage_index += 1;
                    referenced.push(texture.texture().id());
                    views.push(texture.resolve(backend, true));
                    Planned::View(views.len() - 1)
                }
            };
            plan.push((entry.slot, planned));
        }

        let entries: Vec<BindGroupEntry<'_, B>> = plan
            .iter()
            .map(|(slot, planned)| BindGroupEntry {
                binding: *slot,
                resource: match planned {
                    Planned::Buffer(buffer, size) => BindingResource::Buffer {
                        buffer: buffer.raw(),
                        offset: 0,
                        size: *size,
                    },
                    Planned::View(index) => BindingResource::TextureView(&views[*index]),
                    Planned::Sampler(index) => BindingResource::Sampler(&samplers[*index]),
                },
            })
            .collect();

        self.raw = Some(backend.create_bind_group(
            &format!("BindGroup {}", format.id()),
            &layout,
            &entries,
        ));
        self.id = next_resource_id();
        self.fingerprint = fingerprint(buffers, textures, storage);
        self.referenced = referenced;
    }

    /// Rebuilds only if any argument differs from the last update. Returns
    /// whether a rebuild happened.
    pub fn update_if_changed(
        &mut self,
        backend: &B,
        layouts: &mut LayoutCache<B>,
        buffers: &[Option<BindBuffer<'_, B>>],
        textures: &[Option<BindTexture<'_, B>>],
        storage: &[Option<BindStorage<'_, B>>],
    ) -> bool {
        if self.raw.is_some() && self.fingerprint == fingerprint(buffers, textures, storage) {
            return false;
        }
        self.update(backend, layouts, buffers, textures, storage);
        true
    }

    /// Whether the last update bound the resource with this id.
    #[must_use]
    pub fn references(&self, resource_id: u64) -> bool {
        self.raw.is_some() && self.referenced.contains(&resource_id)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> &Arc<BindGroupFormat> {
        &self.format
    }

    /// The backend bind group, if [`update`](Self::update) has run.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> Option<&B::BindGroup> {
        self.raw.as_ref()
    }

    /// Drops the backend object. Used after device loss.
    pub fn invalidate(&mut self) {
        self.raw = None;
        self.fingerprint.clear();
        self.referenced.clear();
    }
}

#[cold]
fn missing_resource(format: &BindGroupFormat, name: &str, slot: u32) -> ! {
    panic!(
        "missing resource for binding '{name}' (slot {slot}) of bind group format {}",
        format.key()
    )
}

enum Planned<'a, B: GpuBackend> {
    Buffer(&'a GpuBuffer<B>, Option<u64>),
    View(usize),
    Sampler(usize),
}

fn fingerprint<B: GpuBackend>(
    buffers: &[Option<BindBuffer<'_, B>>],
    textures: &[Option<BindTexture<'_, B>>],
    storage: &[Option<BindStorage<'_, B>>],
) -> Fingerprint {
    let mut out = Fingerprint::new();
    for buffer in buffers {
        match buffer {
            Some(binding) => out.extend([binding.buffer.id(), binding.size.unwrap_or(u64::MAX)]),
            None => out.extend([0, 0]),
        }
    }
    for texture in textures {
        match texture {
            Some(texture) => texture.fingerprint(&mut out),
            None => out.extend([0, 0]),
        }
    }
    for resource in storage {
        match resource {
            Some(BindStorage::Buffer(buffer)) => out.extend([buffer.id(), u64::MAX]),
            Some(BindStorage::Texture(texture)) => texture.fingerprint(&mut out),
            None => out.extend([0, 0]),
        }
    }
    out
}
