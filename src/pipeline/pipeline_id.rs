//! Pipeline handles.
//!
//! `Copy` indices into the cache storage vectors. Separate newtypes keep
//! render and compute handles from being mixed up.

/// Handle to a pipeline in [`RenderPipelineCache`](super::render::RenderPipelineCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(pub(crate) u32);

impl RenderPipelineId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a pipeline in [`ComputePipelineCache`](super::compute::ComputePipelineCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(pub(crate) u32);

impl ComputePipelineId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
