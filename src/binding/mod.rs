//! Binding
//!
//! Bind group formats (slot schemas), bind groups (realized resource sets),
//! the buffer and texture objects they reference, and the layout caches.

pub mod bind_group;
pub mod format;
pub mod layout_cache;
pub mod resources;

pub use bind_group::{BindBuffer, BindGroup, BindStorage, BindTexture};
pub use format::{
    BindGroupFormat, BindSamplerFormat, BindStorageBufferFormat, BindStorageFormat,
    BindStorageTextureFormat, BindTextureFormat, BindUniformBufferFormat, BindingEntry,
    BindingKind, SamplerBinding, StorageAccess, StorageFormat, TextureSampleKind, ViewDimension,
};
pub use layout_cache::LayoutCache;
pub use resources::{GpuBuffer, GpuTexture, SamplerParams, TextureDesc, TextureViewKey};
