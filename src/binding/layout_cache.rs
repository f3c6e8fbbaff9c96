//! Layout Caches
//!
//! Bind group layouts keyed by format id, and pipeline layouts keyed by the
//! ordered list of format ids they are built from. Both live on the device
//! and are dropped wholesale on device loss.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::format::BindGroupFormat;
use crate::device::backend::GpuBackend;

type FormatIds = SmallVec<[u32; 4]>;

pub struct LayoutCache<B: GpuBackend> {
    bind_group_layouts: FxHashMap<u32, B::BindGroupLayout>,
    pipeline_layouts: FxHashMap<FormatIds, B::PipelineLayout>,
}

impl<B: GpuBackend> Default for LayoutCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> LayoutCache<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_group_layouts: FxHashMap::default(),
            pipeline_layouts: FxHashMap::default(),
        }
    }

    /// Layout object of `format`, created on first request.
    pub fn bind_group_layout(&mut self, backend: &B, format: &BindGroupFormat) -> B::BindGroupLayout {
        self.bind_group_layouts
            .entry(format.id())
            .or_insert_with(|| {
                log::debug!("Creating bind group layout {}", format.key());
                backend.create_bind_group_layout(
                    &format!("BindGroupLayout {}", format.id()),
                    &format.layout_entries(),
                )
            })
            .clone()
    }

    /// Pipeline layout over `formats`, in bind group index order.
    pub fn pipeline_layout(&mut self, backend: &B, formats: &[&BindGroupFormat]) -> B::PipelineLayout {
        let ids: FormatIds = formats.iter().map(|f| f.id()).collect();
        if let Some(layout) = self.pipeline_layouts.get(&ids) {
            return layout.clone();
        }

        let layouts: Vec<B::BindGroupLayout> = formats
            .iter()
            .map(|format| self.bind_group_layout(backend, format))
            .collect();
        let refs: Vec<&B::BindGroupLayout> = layouts.iter().collect();
        let label = format!(
            "PipelineLayout[{}]",
            ids.iter().map(u32::to_string).collect::<Vec<_>>().join("-")
        );
        log::debug!("Creating {label}");
        let layout = backend.create_pipeline_layout(&label, &refs);
        self.pipeline_layouts.insert(ids, layout.clone());
        layout
    }

    #[must_use]
    pub fn bind_group_layout_count(&self) -> usize {
        self.bind_group_layouts.len()
    }

    #[must_use]
    pub fn pipeline_layout_count(&self) -> usize {
        self.pipeline_layouts.len()
    }

    pub fn clear(&mut self) {
        self.bind_group_layouts.clear();
        self.pipeline_layouts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::format::BindUniformBufferFormat;
    use crate::device::recording::RecordingBackend;
    use crate::utils::KeyInterner;

    #[test]
    fn equal_formats_share_layouts() {
        let backend = RecordingBackend::new();
        let mut keys = KeyInterner::new();
        let vis = wgpu::ShaderStages::VERTEX;
        let a = BindGroupFormat::new(&mut keys, vec![BindUniformBufferFormat::new("ub_view", vis)], vec![], vec![]);
        let b = BindGroupFormat::new(&mut keys, vec![BindUniformBufferFormat::new("ub_mesh", vis)], vec![], vec![]);
        let empty = BindGroupFormat::empty(&mut keys);

        let mut cache = LayoutCache::<RecordingBackend>::new();
        let la = cache.bind_group_layout(&backend, &a);
        let lb = cache.bind_group_layout(&backend, &b);
        assert_eq!(la, lb);
        assert_eq!(cache.bind_group_layout_count(), 1);

        let p1 = cache.pipeline_layout(&backend, &[&a, &empty]);
        let p2 = cache.pipeline_layout(&backend, &[&b, &empty]);
        let p3 = cache.pipeline_layout(&backend, &[&empty, &a]);
        assert_eq!(p1, p2);
        assert_ne!(p1, p3);
        assert_eq!(cache.pipeline_layout_count(), 2);
    }
}
