//! Compute Pipeline Cache
//!
//! Keyed like render pipelines, with four words: program id + 1 followed by
//! the three bind group format ids + 1 (0 for an unused index).

use super::hash::CollisionBuckets;
use super::pipeline_id::ComputePipelineId;
use super::shader_module::{ProgramStages, ShaderProgram};
use crate::binding::format::BindGroupFormat;
use crate::binding::layout_cache::LayoutCache;
use crate::device::backend::{ComputePipelineDesc, GpuBackend};
use crate::shader::BIND_GROUP_COUNT;

pub const COMPUTE_KEY_WORDS: usize = 1 + BIND_GROUP_COUNT;

pub struct ComputePipelineRequest<'a, B: GpuBackend> {
    pub program: &'a ShaderProgram<B>,
    pub bind_group_formats: [Option<&'a BindGroupFormat>; BIND_GROUP_COUNT],
}

impl<B: GpuBackend> ComputePipelineRequest<'_, B> {
    #[must_use]
    pub fn key_words(&self) -> [u32; COMPUTE_KEY_WORDS] {
        let [bg0, bg1, bg2] = self.bind_group_formats.map(|f| f.map_or(0, |f| f.id() + 1));
        [self.program.id() + 1, bg0, bg1, bg2]
    }
}

pub struct ComputePipelineCache<B: GpuBackend> {
    lookup: CollisionBuckets<COMPUTE_KEY_WORDS, ComputePipelineId>,
    pipelines: Vec<B::ComputePipeline>,
}

impl<B: GpuBackend> Default for ComputePipelineCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> ComputePipelineCache<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lookup: CollisionBuckets::new(),
            pipelines: Vec::with_capacity(8),
        }
    }

    /// Looks up or compiles the pipeline for `request`.
    ///
    /// # Panics
    ///
    /// Panics on a bind group format gap or a render program.
    pub fn get_or_create(
        &mut self,
        backend: &B,
        layouts: &mut LayoutCache<B>,
        entry_point: &str,
        request: &ComputePipelineRequest<'_, B>,
    ) -> ComputePipelineId {
        let words = request.key_words();
        let pipelines = &mut self.pipelines;
        *self.lookup.get_or_insert_with(&words, || {
            let ProgramStages::Compute { compute } = request.program.stages() else {
                panic!(
                    "render program '{}' used for a compute pipeline",
                    request.program.name()
                );
            };

            let used = request
                .bind_group_formats
                .iter()
                .rposition(Option::is_some)
                .map_or(0, |last| last + 1);
            let formats: Vec<&BindGroupFormat> = request.bind_group_formats[..used]
                .iter()
                .enumerate()
                .map(|(index, format)| {
                    format.unwrap_or_else(|| {
                        panic!(
                            "bind group format gap at index {index} of '{}': every index below {used} needs a format (use an empty format)",
                            request.program.name()
                        )
                    })
                })
                .collect();
            let layout = layouts.pipeline_layout(backend, &formats);

            let label = format!("ComputePipeline {}", request.program.name());
            log::debug!("Compute pipeline cache miss: {label}");
            let pipeline = backend.create_compute_pipeline(&ComputePipelineDesc {
                label: &label,
                layout: &layout,
                module: compute,
                entry: entry_point,
            });

            let id = ComputePipelineId(pipelines.len() as u32);
            pipelines.push(pipeline);
            id
        })
    }

    #[inline]
    #[must_use]
    pub fn pipeline(&self, id: ComputePipelineId) -> &B::ComputePipeline {
        &self.pipelines[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lookup.clear();
        self.pipelines.clear();
    }
}
