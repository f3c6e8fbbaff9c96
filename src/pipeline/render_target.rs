//! Render Targets
//!
//! [`RenderTargetFormat`] is the part of a render target a pipeline depends
//! on: attachment formats and sample count. Its key is interned so pipeline
//! hashing uses a single word. [`RenderTarget`] adds the textures.

use std::fmt::Write as _;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::binding::resources::{GpuTexture, TextureViewKey};
use crate::device::backend::GpuBackend;
use crate::utils::KeyInterner;

/// Attachment formats and sample count of a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetFormat {
    color_formats: SmallVec<[wgpu::TextureFormat; 4]>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
    id: u32,
}

impl RenderTargetFormat {
    #[must_use]
    pub fn new(
        keys: &mut KeyInterner,
        color_formats: &[wgpu::TextureFormat],
        depth_format: Option<wgpu::TextureFormat>,
        sample_count: u32,
    ) -> Self {
        let sample_count = sample_count.max(1);
        let mut key = String::from("rt");
        for format in color_formats {
            let _ = write!(key, ":{format:?}");
        }
        let _ = write!(key, "|{depth_format:?}|{sample_count}");
        Self {
            color_formats: color_formats.iter().copied().collect(),
            depth_format,
            sample_count,
            id: keys.intern(&key),
        }
    }

    #[inline]
    #[must_use]
    pub fn color_formats(&self) -> &[wgpu::TextureFormat] {
        &self.color_formats
    }

    #[inline]
    #[must_use]
    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.depth_format
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the depth format carries a stencil aspect.
    #[must_use]
    pub fn has_stencil(&self) -> bool {
        self.depth_format.is_some_and(|f| f.has_stencil_aspect())
    }
}

/// Textures rendered into by a pass.
///
/// Multisampled targets may carry single-sample resolve textures: one per
/// color attachment and one for depth. Depth is resolved by an explicit blit
/// after the pass when the pass asks for it.
pub struct RenderTarget<B: GpuBackend> {
    format: RenderTargetFormat,
    colors: Vec<Rc<GpuTexture<B>>>,
    color_resolves: Vec<Option<Rc<GpuTexture<B>>>>,
    depth: Option<Rc<GpuTexture<B>>>,
    depth_resolve: Option<Rc<GpuTexture<B>>>,
}

impl<B: GpuBackend> RenderTarget<B> {
    /// # Panics
    ///
    /// Panics if the target has no attachment or the attachments disagree on
    /// sample count.
    #[must_use]
    pub fn new(
        keys: &mut KeyInterner,
        colors: Vec<Rc<GpuTexture<B>>>,
        depth: Option<Rc<GpuTexture<B>>>,
    ) -> Self {
        let Some(sample_count) = colors.first().or(depth.as_ref()).map(|t| t.sample_count()) else {
            panic!("render target needs at least one attachment");
        };
        assert!(
            colors.iter().chain(depth.as_ref()).all(|t| t.sample_count() == sample_count),
            "render target attachments disagree on sample count"
        );
        let color_formats: SmallVec<[wgpu::TextureFormat; 4]> =
            colors.iter().map(|t| t.format()).collect();
        let format = RenderTargetFormat::new(
            keys,
            &color_formats,
            depth.as_ref().map(|t| t.format()),
            sample_count,
        );
        Self {
            format,
            color_resolves: vec![None; colors.len()],
            colors,
            depth,
            depth_resolve: None,
        }
    }

    /// Resolve textures for the color attachments, in attachment order.
    #[must_use]
    pub fn with_color_resolves(mut self, resolves: Vec<Option<Rc<GpuTexture<B>>>>) -> Self {
        assert_eq!(
            resolves.len(),
            self.colors.len(),
            "one resolve slot per color attachment"
        );
        self.color_resolves = resolves;
        self
    }

    #[must_use]
    pub fn with_depth_resolve(mut self, texture: Rc<GpuTexture<B>>) -> Self {
        self.depth_resolve = Some(texture);
        self
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> &RenderTargetFormat {
        &self.format
    }

    #[inline]
    #[must_use]
    pub fn colors(&self) -> &[Rc<GpuTexture<B>>] {
        &self.colors
    }

    #[inline]
    #[must_use]
    pub fn color_resolves(&self) -> &[Option<Rc<GpuTexture<B>>>] {
        &self.color_resolves
    }

    #[inline]
    #[must_use]
    pub fn depth(&self) -> Option<&Rc<GpuTexture<B>>> {
        self.depth.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn depth_resolve(&self) -> Option<&Rc<GpuTexture<B>>> {
        self.depth_resolve.as_ref()
    }

    /// Width and height of the first attachment.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.colors
            .first()
            .or(self.depth.as_ref())
            .map_or((0, 0), |t| t.size())
    }
}

/// View used to render into `texture`: the first mip level only.
pub(crate) fn attachment_view<B: GpuBackend>(backend: &B, texture: &GpuTexture<B>) -> B::TextureView {
    if texture.mip_level_count() > 1 || texture.desc().depth_or_layers > 1 {
        texture.view(backend, TextureViewKey::single(0, 0))
    } else {
        texture.default_view().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_formats_share_id() {
        let mut keys = KeyInterner::new();
        let color = [wgpu::TextureFormat::Rgba8Unorm];
        let a = RenderTargetFormat::new(&mut keys, &color, Some(wgpu::TextureFormat::Depth32Float), 1);
        let b = RenderTargetFormat::new(&mut keys, &color, Some(wgpu::TextureFormat::Depth32Float), 1);
        let c = RenderTargetFormat::new(&mut keys, &color, Some(wgpu::TextureFormat::Depth32Float), 4);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert!(!a.has_stencil());
    }
}
