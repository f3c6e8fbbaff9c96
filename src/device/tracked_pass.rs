//! Tracked Render Pass
//!
//! Wraps a backend render pass and skips state changes that would not change
//! anything: re-binding the same pipeline, bind group (with the same dynamic
//! offsets), vertex buffer or index buffer. Identity is the resource id, not
//! the handle, so a reallocated buffer always re-binds.

use std::ops::Range;

use super::backend::{GpuBackend, RenderPassEncoder};

const MAX_BIND_GROUPS: usize = 4;
const MAX_VERTEX_BUFFERS: usize = 8;
const MAX_DYNAMIC_OFFSETS: usize = 8;

// Fixed-size offsets avoid a heap allocation per bind.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BindGroupState {
    id: u64,
    offsets: [u32; MAX_DYNAMIC_OFFSETS],
    offset_count: u8,
}

pub struct TrackedRenderPass<B: GpuBackend> {
    pass: B::RenderPass,
    current_pipeline: Option<u32>,
    current_bind_groups: [Option<BindGroupState>; MAX_BIND_GROUPS],
    current_vertex_buffers: [Option<(u64, u64)>; MAX_VERTEX_BUFFERS],
    current_index_buffer: Option<(u64, u64)>,
    current_stencil_reference: Option<u32>,
}

impl<B: GpuBackend> TrackedRenderPass<B> {
    #[must_use]
    pub fn new(pass: B::RenderPass) -> Self {
        Self {
            pass,
            current_pipeline: None,
            current_bind_groups: [None; MAX_BIND_GROUPS],
            current_vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            current_index_buffer: None,
            current_stencil_reference: None,
        }
    }

    pub fn set_pipeline(&mut self, pipeline_id: u32, pipeline: &B::RenderPipeline) {
        if self.current_pipeline != Some(pipeline_id) {
            self.pass.set_pipeline(pipeline);
            self.current_pipeline = Some(pipeline_id);
        }
    }

    pub fn set_bind_group(&mut self, index: u32, group_id: u64, group: &B::BindGroup, offsets: &[u32]) {
        let slot = index as usize;
        let needs_update = match &self.current_bind_groups[slot] {
            Some(state) => {
                state.id != group_id
                    || state.offset_count as usize != offsets.len()
                    || state.offsets[..offsets.len()] != *offsets
            }
            None => true,
        };

        if needs_update {
            self.pass.set_bind_group(index, group, offsets);

            let mut state = BindGroupState {
                id: group_id,
                offsets: [0; MAX_DYNAMIC_OFFSETS],
                offset_count: offsets.len() as u8,
            };
            let len = offsets.len().min(MAX_DYNAMIC_OFFSETS);
            state.offsets[..len].copy_from_slice(&offsets[..len]);
            self.current_bind_groups[slot] = Some(state);
        }
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer_id: u64, buffer: &B::Buffer, offset: u64) {
        let index = slot as usize;
        if self.current_vertex_buffers[index] != Some((buffer_id, offset)) {
            self.pass.set_vertex_buffer(slot, buffer, offset);
            self.current_vertex_buffers[index] = Some((buffer_id, offset));
        }
    }

    pub fn set_index_buffer(
        &mut self,
        buffer_id: u64,
        buffer: &B::Buffer,
        offset: u64,
        format: wgpu::IndexFormat,
    ) {
        if self.current_index_buffer != Some((buffer_id, offset)) {
            self.pass.set_index_buffer(buffer, offset, format);
            self.current_index_buffer = Some((buffer_id, offset));
        }
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        if self.current_stencil_reference != Some(reference) {
            self.pass.set_stencil_reference(reference);
            self.current_stencil_reference = Some(reference);
        }
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        self.pass.set_viewport(x, y, width, height, min_depth, max_depth);
    }

    pub fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.pass.set_scissor_rect(x, y, width, height);
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    pub fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }

    pub fn draw_indirect(&mut self, buffer: &B::Buffer, offset: u64) {
        self.pass.draw_indirect(buffer, offset);
    }

    pub fn draw_indexed_indirect(&mut self, buffer: &B::Buffer, offset: u64) {
        self.pass.draw_indexed_indirect(buffer, offset);
    }

    pub(crate) fn into_inner(self) -> B::RenderPass {
        self.pass
    }
}
