//! Render Pipeline Cache
//!
//! Render pipelines are looked up by a fixed-length array of hash words built
//! in a stable field order:
//!
//! | Word | Field                                   |
//! |------|-----------------------------------------|
//! | 0    | primitive type                          |
//! | 1    | shader program id + 1                   |
//! | 2    | cull mode                               |
//! | 3    | depth state key                         |
//! | 4    | blend state key                         |
//! | 5-6  | vertex format rendering ids + 1 (0: none) |
//! | 7    | render target format id + 1             |
//! | 8-10 | bind group format ids + 1 (0: none)     |
//! | 11   | front stencil key + 1 (0: disabled)     |
//! | 12   | back stencil key + 1 (0: disabled)      |
//! | 13   | strip index format (0: none)            |
//! | 14   | front face                              |
//!
//! The words are reduced with FNV-1a; see [`CollisionBuckets`] for how
//! collisions are kept apart. Pipelines are never evicted individually.

use super::hash::CollisionBuckets;
use super::pipeline_id::RenderPipelineId;
use super::render_target::RenderTargetFormat;
use super::shader_module::{ProgramStages, ShaderProgram};
use super::state::{
    BlendState, CullMode, DepthState, FrontFace, PrimitiveType, StencilParameters, stencil_state,
    stencil_word,
};
use super::vertex::{VertexFormat, VertexLayoutCache};
use crate::binding::format::BindGroupFormat;
use crate::binding::layout_cache::LayoutCache;
use crate::device::backend::{GpuBackend, RenderPipelineDesc};
use crate::shader::BIND_GROUP_COUNT;

pub const RENDER_KEY_WORDS: usize = 15;

/// Everything a render pipeline depends on.
pub struct RenderPipelineRequest<'a, B: GpuBackend> {
    pub program: &'a ShaderProgram<B>,
    pub primitive: PrimitiveType,
    pub cull: CullMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
    pub blend: BlendState,
    pub stencil_front: Option<StencilParameters>,
    pub stencil_back: Option<StencilParameters>,
    pub vertex_formats: [Option<&'a VertexFormat>; 2],
    /// Index format of strip topologies; ignored for lists.
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub target: &'a RenderTargetFormat,
    pub bind_group_formats: [Option<&'a BindGroupFormat>; BIND_GROUP_COUNT],
}

impl<B: GpuBackend> RenderPipelineRequest<'_, B> {
    /// Hash input words, in table order.
    #[must_use]
    pub fn key_words(&self) -> [u32; RENDER_KEY_WORDS] {
        let [vf0, vf1] = self.vertex_formats.map(|f| f.map_or(0, |f| f.rendering_id() + 1));
        let [bg0, bg1, bg2] = self.bind_group_formats.map(|f| f.map_or(0, |f| f.id() + 1));
        [
            self.primitive as u32,
            self.program.id() + 1,
            self.cull as u32,
            self.depth.key(),
            self.blend.key(),
            vf0,
            vf1,
            self.target.id() + 1,
            bg0,
            bg1,
            bg2,
            stencil_word(self.stencil_front.as_ref()),
            stencil_word(self.stencil_back.as_ref()),
            self.strip_index_word(),
            self.front_face as u32,
        ]
    }

    fn strip_index_format(&self) -> Option<wgpu::IndexFormat> {
        if self.primitive.is_strip() {
            self.strip_index_format
        } else {
            None
        }
    }

    fn strip_index_word(&self) -> u32 {
        match self.strip_index_format() {
            None => 0,
            Some(wgpu::IndexFormat::Uint16) => 1,
            Some(wgpu::IndexFormat::Uint32) => 2,
        }
    }

    /// Bind group formats up to the highest populated index.
    ///
    /// # Panics
    ///
    /// Panics if an index below the highest populated one has no format.
    fn layout_formats(&self) -> Vec<&BindGroupFormat> {
        let used = self
            .bind_group_formats
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);
        self.bind_group_formats[..used]
            .iter()
            .enumerate()
            .map(|(index, format)| {
                format.unwrap_or_else(|| {
                    panic!(
                        "bind group format gap at index {index} of '{}': every index below {used} needs a format (use an empty format)",
                        self.program.name()
                    )
                })
            })
            .collect()
    }
}

/// Entry points used for pipeline creation.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

pub struct RenderPipelineCache<B: GpuBackend> {
    lookup: CollisionBuckets<RENDER_KEY_WORDS, RenderPipelineId>,
    pipelines: Vec<B::RenderPipeline>,
}

impl<B: GpuBackend> Default for RenderPipelineCache<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> RenderPipelineCache<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lookup: CollisionBuckets::new(),
            pipelines: Vec::with_capacity(64),
        }
    }

    /// Looks up or compiles the pipeline for `request`.
    ///
    /// # Panics
    ///
    /// Panics on a bind group format gap or a compute program.
    pub fn get_or_create(
        &mut self,
        backend: &B,
        layouts: &mut LayoutCache<B>,
        vertex_layouts: &mut VertexLayoutCache,
        entry_points: EntryPoints<'_>,
        request: &RenderPipelineRequest<'_, B>,
    ) -> RenderPipelineId {
        let words = request.key_words();
        self.get_or_insert_keyed(&words, || {
            build_pipeline(backend, layouts, vertex_layouts, entry_points, request)
        })
    }

    fn get_or_insert_keyed(
        &mut self,
        words: &[u32; RENDER_KEY_WORDS],
        build: impl FnOnce() -> B::RenderPipeline,
    ) -> RenderPipelineId {
        let pipelines = &mut self.pipelines;
        *self.lookup.get_or_insert_with(words, || {
            let id = RenderPipelineId(pipelines.len() as u32);
            pipelines.push(build());
            id
        })
    }

    /// Cached id for `request`, without compiling.
    #[must_use]
    pub fn lookup(&self, request: &RenderPipelineRequest<'_, B>) -> Option<RenderPipelineId> {
        self.lookup.get(&request.key_words()).copied()
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this cache.
    #[inline]
    #[must_use]
    pub fn pipeline(&self, id: RenderPipelineId) -> &B::RenderPipeline {
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

fn build_pipeline<B: GpuBackend>(
    backend: &B,
    layouts: &mut LayoutCache<B>,
    vertex_layouts: &mut VertexLayoutCache,
    entry_points: EntryPoints<'_>,
    request: &RenderPipelineRequest<'_, B>,
) -> B::RenderPipeline {
    let ProgramStages::Render { vertex, fragment } = request.program.stages() else {
        panic!(
            "compute program '{}' used for a render pipeline",
            request.program.name()
        );
    };

    let layout = layouts.pipeline_layout(backend, &request.layout_formats());
    let buffers = vertex_layouts.get_or_create(request.vertex_formats);
    let buffer_layouts: Vec<wgpu::VertexBufferLayout<'_>> =
        buffers.iter().map(|desc| desc.as_wgpu()).collect();

    let target = request.target;
    let blend = request.blend.to_wgpu();
    let targets: Vec<Option<wgpu::ColorTargetState>> = target
        .color_formats()
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: request.blend.write_mask,
            })
        })
        .collect();

    let stencil_enabled = request.stencil_front.is_some() || request.stencil_back.is_some();
    let depth_stencil = target.depth_format().map(|format| wgpu::DepthStencilState {
        format,
        depth_write_enabled: Some(request.depth.write),
        depth_compare: Some(request.depth.effective_func().to_wgpu()),
        stencil: if stencil_enabled && format.has_stencil_aspect() {
            stencil_state(request.stencil_front.as_ref(), request.stencil_back.as_ref())
        } else {
            wgpu::StencilState::default()
        },
        bias: wgpu::DepthBiasState::default(),
    });

    let label = format!("RenderPipeline {}", request.program.name());
    log::debug!("Render pipeline cache miss: {label}");

    backend.create_render_pipeline(&RenderPipelineDesc {
        label: &label,
        layout: &layout,
        vertex_module: vertex,
        vertex_entry: entry_points.vertex,
        fragment_module: fragment,
        fragment_entry: entry_points.fragment,
        buffers: &buffer_layouts,
        primitive: wgpu::PrimitiveState {
            topology: request.primitive.to_wgpu(),
            strip_index_format: request.strip_index_format(),
            front_face: request.front_face.to_wgpu(),
            cull_mode: request.cull.to_wgpu(),
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: target.sample_count(),
            ..Default::default()
        },
        targets: &targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{RecordedHandle, RecordingBackend};
    use crate::pipeline::hash::{FNV_OFFSET_BASIS, FNV_PRIME, fnv1a_words};

    #[test]
    fn colliding_words_get_separate_pipelines() {
        let mut cache = RenderPipelineCache::<RecordingBackend>::new();
        let h = |w: u32| (FNV_OFFSET_BASIS ^ w).wrapping_mul(FNV_PRIME);

        let mut a = [0u32; RENDER_KEY_WORDS];
        a[0] = 3;
        a[1] = 5;
        let mut b = a;
        b[0] = 4;
        b[1] = a[1] ^ h(a[0]) ^ h(b[0]);
        assert_eq!(fnv1a_words(&a), fnv1a_words(&b));

        let pa = cache.get_or_insert_keyed(&a, || RecordedHandle(100));
        let pb = cache.get_or_insert_keyed(&b, || RecordedHandle(200));
        assert_ne!(pa, pb);
        assert_eq!(*cache.pipeline(pa), RecordedHandle(100));
        assert_eq!(*cache.pipeline(pb), RecordedHandle(200));

        let again = cache.get_or_insert_keyed(&a, || panic!("rebuilt a cached pipeline"));
        assert_eq!(again, pa);
        assert_eq!(cache.len(), 2);
    }
}
