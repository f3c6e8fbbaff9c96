//! GPU Device
//!
//! [`GpuDevice`] owns a backend and everything derived from it: the shader
//! processor, every cache (shader modules, layouts, vertex layouts, render
//! and compute pipelines), the frame state machine, the indirect draw buffer,
//! the dynamic uniform ring and pending read-backs.
//!
//! # Frame Flow
//!
//! ```text
//! frame_start ─▶ start_render_pass ─▶ draw* ─▶ end_render_pass ─▶ … ─▶ present
//!      │                                                              │
//!      └─ submits last frame's work, polls, reconciles the back buffer ┘
//! ```
//!
//! Every call happens on the thread that owns the device. Asynchronous work
//! (compiler messages, buffer maps) runs on a local executor driven by
//! [`GpuDevice::poll`], which `frame_start` calls.
//!
//! # Device Loss
//!
//! A lost backend is detected at `frame_start`. [`GpuDevice::handle_device_lost`]
//! drops every GPU object the device owns; [`GpuDevice::restore`] installs a
//! new backend. Caches refill lazily since their keys are content-derived.
//! Buffers, textures and bind groups owned by the caller must be recreated by
//! the caller ([`GpuBuffer::recreate`], [`GpuTexture::recreate`],
//! [`BindGroup::update`]).

use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use futures::executor::LocalPool;
use futures::future::{self, LocalBoxFuture};
use smallvec::SmallVec;
use wgpu::util::DrawIndexedIndirectArgs;

use super::backend::{
    BackBuffer, ColorAttachment, ComputePassEncoder, DepthStencilAttachment, GpuBackend,
    RenderPassBegin,
};
use super::frame::{FrameController, FrameState};
use super::indirect::{IndirectDrawBuffer, IndirectSlots};
use super::readback::ReadbackQueue;
use super::tracked_pass::TrackedRenderPass;
use super::uniform_ring::UniformRing;
use crate::binding::bind_group::{BindBuffer, BindGroup, BindStorage, BindTexture};
use crate::binding::format::{
    BindGroupFormat, BindStorageFormat, BindTextureFormat, BindUniformBufferFormat,
};
use crate::binding::layout_cache::LayoutCache;
use crate::binding::resources::{GpuBuffer, GpuTexture, TextureDesc};
use crate::errors::{BinderyError, Result};
use crate::pipeline::compute::{ComputePipelineCache, ComputePipelineRequest};
use crate::pipeline::render::{EntryPoints, RenderPipelineCache, RenderPipelineRequest};
use crate::pipeline::render_target::{RenderTarget, RenderTargetFormat, attachment_view};
use crate::pipeline::shader_module::ShaderModuleCache;
use crate::pipeline::state::RenderState;
use crate::pipeline::vertex::{VertexElementDesc, VertexFormat, VertexLayoutCache};
use crate::settings::{DeviceCaps, DeviceSettings};
use crate::shader::{
    BIND_GROUP_COUNT, MESH_GROUP, Shader, ShaderDefinition, ShaderProcessor, UniformBufferFormat,
    UniformStaging,
};
use crate::utils::KeyInterner;

/// Depth format of the depth buffer paired with the back buffer.
pub const DEFAULT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

// ─── Call Descriptions ───────────────────────────────────────────────────────

/// A vertex buffer and the format describing its contents.
pub struct VertexBufferBinding<'a, B: GpuBackend> {
    pub format: &'a VertexFormat,
    pub buffer: &'a GpuBuffer<B>,
}

pub struct IndexBufferBinding<'a, B: GpuBackend> {
    pub buffer: &'a GpuBuffer<B>,
    pub format: wgpu::IndexFormat,
    pub offset: u64,
}

/// What a draw reads its vertex range from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    /// Vertices, or indices when an index buffer is bound.
    Direct {
        first: u32,
        count: u32,
        base_vertex: i32,
    },
    /// Slot `index` of an indirect allocation. Requires an index buffer.
    Indirect { slots: IndirectSlots, index: u32 },
}

/// One draw call.
///
/// `bind_groups` holds the view, material and mesh groups. When
/// `mesh_uniforms` is set, its bytes are appended to the uniform ring and the
/// mesh group is bound at the resulting dynamic offset; the mesh group must
/// then have been prepared with [`GpuDevice::prepare_mesh_bind_group`].
pub struct DrawCall<'a, B: GpuBackend> {
    pub shader: &'a Shader,
    pub state: RenderState,
    pub vertex_buffers: [Option<VertexBufferBinding<'a, B>>; 2],
    pub index_buffer: Option<IndexBufferBinding<'a, B>>,
    pub bind_groups: [Option<&'a BindGroup<B>>; BIND_GROUP_COUNT],
    pub mesh_uniforms: Option<&'a UniformStaging>,
    pub range: DrawRange,
    pub instances: u32,
}

impl<'a, B: GpuBackend> DrawCall<'a, B> {
    /// A single-instance draw with default state and no resources.
    #[must_use]
    pub fn new(shader: &'a Shader, range: DrawRange) -> Self {
        Self {
            shader,
            state: RenderState::default(),
            vertex_buffers: [None, None],
            index_buffer: None,
            bind_groups: [None; BIND_GROUP_COUNT],
            mesh_uniforms: None,
            range,
            instances: 1,
        }
    }
}

pub enum Workgroups<'a, B: GpuBackend> {
    Direct { x: u32, y: u32, z: u32 },
    Indirect { buffer: &'a GpuBuffer<B>, offset: u64 },
}

pub struct DispatchCall<'a, B: GpuBackend> {
    pub shader: &'a Shader,
    pub bind_groups: [Option<&'a BindGroup<B>>; BIND_GROUP_COUNT],
    pub workgroups: Workgroups<'a, B>,
}

/// Render pass setup. Without a target the pass renders to the back buffer
/// and its depth buffer.
pub struct RenderPassDesc<'a, B: GpuBackend> {
    pub label: &'a str,
    pub target: Option<&'a RenderTarget<B>>,
    pub color_ops: wgpu::Operations<wgpu::Color>,
    pub depth_ops: Option<wgpu::Operations<f32>>,
    pub stencil_ops: Option<wgpu::Operations<u32>>,
    /// Resolve the multisampled depth attachment into the target's depth
    /// resolve texture after the pass.
    pub resolve_depth: bool,
    /// Regenerate the mip chain of mipmapped color targets after the pass.
    pub generate_mipmaps: bool,
}

impl<'a, B: GpuBackend> RenderPassDesc<'a, B> {
    /// Clears color to black and depth to 1, stores both.
    #[must_use]
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            target: None,
            color_ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
            resolve_depth: false,
            generate_mipmaps: false,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: &'a RenderTarget<B>) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_color_ops(mut self, ops: wgpu::Operations<wgpu::Color>) -> Self {
        self.color_ops = ops;
        self
    }

    #[must_use]
    pub fn with_depth_ops(mut self, ops: Option<wgpu::Operations<f32>>) -> Self {
        self.depth_ops = ops;
        self
    }

    #[must_use]
    pub fn with_stencil_ops(mut self, ops: Option<wgpu::Operations<u32>>) -> Self {
        self.stencil_ops = ops;
        self
    }

    #[must_use]
    pub fn resolving_depth(mut self) -> Self {
        self.resolve_depth = true;
        self
    }

    #[must_use]
    pub fn generating_mipmaps(mut self) -> Self {
        self.generate_mipmaps = true;
        self
    }
}

/// Work attached to the open render pass.
struct PassContext<B: GpuBackend> {
    target: RenderTargetFormat,
    depth_resolve: Option<(B::Texture, B::Texture)>,
    mipmaps: Vec<B::Texture>,
}

// ─── GpuDevice ───────────────────────────────────────────────────────────────

pub struct GpuDevice<B: GpuBackend> {
    backend: B,
    settings: DeviceSettings,
    caps: DeviceCaps,
    keys: KeyInterner,
    processor: ShaderProcessor,

    shader_modules: ShaderModuleCache<B>,
    layouts: LayoutCache<B>,
    vertex_layouts: VertexLayoutCache,
    render_pipelines: RenderPipelineCache<B>,
    compute_pipelines: ComputePipelineCache<B>,

    frame: FrameController<B>,
    pass: Option<PassContext<B>>,
    indirect: IndirectDrawBuffer<B>,
    uniforms: UniformRing<B>,
    readbacks: ReadbackQueue<B>,
    pool: LocalPool,

    back_buffer: Option<BackBuffer<B>>,
    back_buffer_format: Option<RenderTargetFormat>,
    default_depth: Option<GpuTexture<B>>,

    frame_index: u64,
    lost: bool,
}

impl<B: GpuBackend> GpuDevice<B> {
    #[must_use]
    pub fn new(backend: B, settings: DeviceSettings) -> Self {
        let caps = backend.caps();
        log::info!(
            "Device created: {} indirect slots, {} byte uniform ring",
            settings.indirect_draw_capacity,
            settings.uniform_ring_size
        );
        Self {
            indirect: IndirectDrawBuffer::new(&backend, settings.indirect_draw_capacity),
            uniforms: UniformRing::new(&backend, settings.uniform_ring_size),
            shader_modules: ShaderModuleCache::new(settings.diagnostic_context_lines),
            processor: ShaderProcessor::new(caps),
            keys: KeyInterner::new(),
            layouts: LayoutCache::new(),
            vertex_layouts: VertexLayoutCache::new(),
            render_pipelines: RenderPipelineCache::new(),
            compute_pipelines: ComputePipelineCache::new(),
            frame: FrameController::new(),
            pass: None,
            readbacks: ReadbackQueue::new(),
            pool: LocalPool::new(),
            back_buffer: None,
            back_buffer_format: None,
            default_depth: None,
            frame_index: 0,
            lost: false,
            backend,
            settings,
            caps,
        }
    }

    // ─── Frame ───────────────────────────────────────────────────────────────

    /// Begins a frame: submits work queued by the previous frame, drives
    /// asynchronous completions, checks for device loss, acquires the back
    /// buffer and resets the per-frame indirect slots and uniform ring.
    ///
    /// # Panics
    ///
    /// Panics while a pass is open.
    pub fn frame_start(&mut self) -> Result<()> {
        if !self.lost {
            self.submit();
        }
        self.poll(false);

        if !self.lost && self.backend.is_lost() {
            self.handle_device_lost();
        }
        if self.lost {
            return Err(BinderyError::DeviceLost);
        }

        self.back_buffer = self.backend.acquire_back_buffer();
        self.reconcile_back_buffer();

        self.indirect.frame_start();
        self.uniforms.frame_start(&self.backend);
        self.frame_index += 1;
        Ok(())
    }

    /// Submits pending work and presents the back buffer.
    pub fn present(&mut self) {
        if self.lost {
            return;
        }
        self.submit();
        self.backend.present();
        self.back_buffer = None;
    }

    fn reconcile_back_buffer(&mut self) {
        let Some(back) = &self.back_buffer else {
            log::debug!("No back buffer acquired for frame {}", self.frame_index + 1);
            return;
        };
        let size = (back.width, back.height);

        if self.default_depth.as_ref().is_none_or(|depth| depth.size() != size) {
            log::debug!("Back buffer is {}x{}; recreating default depth", size.0, size.1);
            self.default_depth = Some(GpuTexture::new(
                &self.backend,
                TextureDesc::new_2d(
                    "Default Depth",
                    size.0,
                    size.1,
                    DEFAULT_DEPTH_FORMAT,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                ),
            ));
        }

        let format_changed = self
            .back_buffer_format
            .as_ref()
            .is_none_or(|format| format.color_formats() != [back.format].as_slice());
        if format_changed {
            self.back_buffer_format = Some(RenderTargetFormat::new(
                &mut self.keys,
                &[back.format],
                Some(DEFAULT_DEPTH_FORMAT),
                1,
            ));
        }
    }

    /// Finishes the frame encoder and submits every pending command buffer,
    /// upload buffers first. Returns the number of command buffers submitted.
    ///
    /// # Panics
    ///
    /// Panics with "submit while a pass is open" while a pass is open.
    pub fn submit(&mut self) -> usize {
        self.uniforms.flush(&self.backend);
        let count = self.frame.submit(&self.backend);
        if !self.readbacks.is_empty() {
            self.readbacks.start(&self.backend, &self.pool.spawner());
        }
        count
    }

    /// Polls the backend and runs ready local tasks.
    pub fn poll(&mut self, wait: bool) {
        self.backend.poll(wait);
        self.pool.run_until_stalled();
    }

    /// Records work into a separate encoder that is submitted ahead of
    /// everything pending. Later uploads go in front of earlier ones.
    pub fn record_upload(&mut self, label: &str, record: impl FnOnce(&B, &mut B::CommandEncoder)) {
        let mut encoder = self.backend.create_command_encoder(label);
        record(&self.backend, &mut encoder);
        self.frame.enqueue_front(self.backend.finish(encoder));
    }

    // ─── Passes ──────────────────────────────────────────────────────────────

    /// Opens a render pass against the description's target or the back buffer.
    ///
    /// # Panics
    ///
    /// Panics with "pass already open" if a pass is open.
    pub fn start_render_pass(&mut self, desc: &RenderPassDesc<'_, B>) -> Result<()> {
        if self.lost {
            return Err(BinderyError::DeviceLost);
        }
        assert!(
            !self.frame.in_pass(),
            "pass already open: cannot begin render pass '{}'",
            desc.label
        );

        let backend = &self.backend;
        let mut color_views: Vec<(B::TextureView, Option<B::TextureView>)> = Vec::new();
        let mut depth_resolve = None;
        let mut mipmaps = Vec::new();

        let (target, depth_view) = match desc.target {
            Some(target) => {
                for (color, resolve) in target.colors().iter().zip(target.color_resolves()) {
                    color_views.push((
                        attachment_view(backend, color),
                        resolve.as_ref().map(|r| attachment_view(backend, r)),
                    ));
                    let rendered = resolve.as_ref().unwrap_or(color);
                    if desc.generate_mipmaps && rendered.mip_level_count() > 1 {
                        mipmaps.push(rendered.raw().clone());
                    }
                }
                if desc.resolve_depth {
                    match (target.depth(), target.depth_resolve()) {
                        (Some(depth), Some(destination)) if depth.sample_count() > 1 => {
                            depth_resolve =
                                Some((depth.raw().clone(), destination.raw().clone()));
                        }
                        _ => log::warn!(
                            "Render pass '{}' asks for a depth resolve but its target has no multisampled depth with a resolve texture",
                            desc.label
                        ),
                    }
                }
                (
                    target.format().clone(),
                    target.depth().map(|depth| attachment_view(backend, depth)),
                )
            }
            None => {
                let (Some(back), Some(format)) = (&self.back_buffer, &self.back_buffer_format) else {
                    return Err(BinderyError::BackBufferUnavailable);
                };
                if desc.resolve_depth || desc.generate_mipmaps {
                    log::warn!(
                        "Render pass '{}': depth resolve and mipmaps are ignored for the back buffer",
                        desc.label
                    );
                }
                color_views.push((back.view.clone(), None));
                (
                    format.clone(),
                    self.default_depth.as_ref().map(|depth| depth.default_view().clone()),
                )
            }
        };

        let has_depth = target.depth_format().is_some_and(|f| f.has_depth_aspect());
        let begin = RenderPassBegin {
            label: desc.label,
            color_attachments: color_views
                .iter()
                .map(|(view, resolve)| ColorAttachment {
                    view,
                    resolve_target: resolve.as_ref(),
                    ops: desc.color_ops,
                })
                .collect(),
            depth_stencil: depth_view.as_ref().map(|view| DepthStencilAttachment {
                view,
                depth_ops: if has_depth { desc.depth_ops } else { None },
                stencil_ops: if target.has_stencil() { desc.stencil_ops } else { None },
            }),
        };
        self.frame.begin_render_pass(&self.backend, &begin);
        self.pass = Some(PassContext {
            target,
            depth_resolve,
            mipmaps,
        });
        Ok(())
    }

    /// Closes the render pass and records its depth resolve and mipmap
    /// generation into the same encoder.
    ///
    /// # Panics
    ///
    /// Panics with "no matching pass" unless a render pass is open.
    pub fn end_render_pass(&mut self) {
        self.frame.end_render_pass(&self.backend);
        let Some(context) = self.pass.take() else {
            return;
        };
        if context.depth_resolve.is_none() && context.mipmaps.is_empty() {
            return;
        }
        let encoder = self.frame.encoder(&self.backend);
        if let Some((source, destination)) = &context.depth_resolve {
            self.backend.resolve_depth(encoder, source, destination);
        }
        for texture in &context.mipmaps {
            self.backend.generate_mipmaps(encoder, texture);
        }
    }

    /// # Panics
    ///
    /// Panics with "pass already open" if a pass is open.
    pub fn start_compute_pass(&mut self, label: &str) -> Result<()> {
        if self.lost {
            return Err(BinderyError::DeviceLost);
        }
        self.frame.begin_compute_pass(&self.backend, label);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics with "no matching pass" unless a compute pass is open.
    pub fn end_compute_pass(&mut self) {
        self.frame.end_compute_pass(&self.backend);
    }

    /// The open render pass, for viewport, scissor and other direct commands.
    ///
    /// # Panics
    ///
    /// Panics if no render pass is open.
    pub fn render_pass(&mut self) -> &mut TrackedRenderPass<B> {
        self.frame.render_pass()
    }

    // ─── Draw & Dispatch ─────────────────────────────────────────────────────

    /// Resolves the pipeline for `call` and records the draw into the open
    /// render pass.
    ///
    /// Fails for a shader that failed processing, on device loss and when the
    /// uniform ring is exhausted.
    ///
    /// # Panics
    ///
    /// Panics outside a render pass, on a bind group format gap, for a bind
    /// group that was never updated, for a stale mesh bind group, for a
    /// direct range past `u32::MAX`, for an indirect slot index outside its
    /// allocation and for an indirect draw without an index buffer.
    pub fn draw(&mut self, call: &DrawCall<'_, B>) -> Result<()> {
        if self.lost {
            return Err(BinderyError::DeviceLost);
        }
        let processed = call.shader.processed()?;
        let name = call.shader.name();
        let Some(context) = &self.pass else {
            panic!("no matching pass: draw of '{name}' outside a render pass");
        };
        if let DrawRange::Direct { first, count, .. } = call.range {
            assert!(
                first.checked_add(count).is_some(),
                "invalid draw range for '{name}': first {first} + count {count} overflows u32"
            );
        }

        let program = self.shader_modules.program(
            &self.backend,
            &mut self.keys,
            name,
            processed,
            &self.pool.spawner(),
        );
        let request = RenderPipelineRequest {
            program: &program,
            primitive: call.state.primitive,
            cull: call.state.cull,
            front_face: call.state.front_face,
            depth: call.state.depth,
            blend: call.state.blend,
            stencil_front: call.state.stencil_front,
            stencil_back: call.state.stencil_back,
            vertex_formats: call
                .vertex_buffers
                .each_ref()
                .map(|binding| binding.as_ref().map(|b| b.format)),
            strip_index_format: call.index_buffer.as_ref().map(|index| index.format),
            target: &context.target,
            bind_group_formats: call.bind_groups.map(|group| group.map(|g| g.format().as_ref())),
        };
        let entry_points = EntryPoints {
            vertex: &self.settings.vertex_entry_point,
            fragment: &self.settings.fragment_entry_point,
        };
        let pipeline_id = self.render_pipelines.get_or_create(
            &self.backend,
            &mut self.layouts,
            &mut self.vertex_layouts,
            entry_points,
            &request,
        );

        let mesh_offset = match call.mesh_uniforms {
            Some(staging) => {
                if let Some(mesh) = call.bind_groups[MESH_GROUP] {
                    assert!(
                        mesh.references(self.uniforms.buffer().id()),
                        "stale mesh bind group for '{name}': prepare it against the current uniform ring"
                    );
                }
                Some(self.uniforms.allocate(staging.as_bytes())?)
            }
            None => None,
        };

        let pass = self.frame.render_pass();
        pass.set_pipeline(pipeline_id.0, self.render_pipelines.pipeline(pipeline_id));

        for (index, group) in call.bind_groups.iter().enumerate() {
            let Some(group) = group else { continue };
            let Some(raw) = group.raw() else {
                panic!("bind group {index} of '{name}' used before update");
            };
            let first = if index == MESH_GROUP { mesh_offset } else { None };
            pass.set_bind_group(index as u32, group.id(), raw, &dynamic_offsets(group, first));
        }

        let mut slot = 0u32;
        for binding in call.vertex_buffers.iter().flatten() {
            for offset in binding.format.binding_offsets() {
                pass.set_vertex_buffer(slot, binding.buffer.id(), binding.buffer.raw(), offset);
                slot += 1;
            }
        }
        if let Some(index) = &call.index_buffer {
            pass.set_index_buffer(index.buffer.id(), index.buffer.raw(), index.offset, index.format);
        }
        if let Some(reference) = call.state.stencil_reference() {
            pass.set_stencil_reference(reference);
        }

        let instances = 0..call.instances;
        match (call.range, &call.index_buffer) {
            (DrawRange::Direct { first, count, base_vertex }, Some(_)) => {
                pass.draw_indexed(first..first + count, base_vertex, instances);
            }
            (DrawRange::Direct { first, count, .. }, None) => {
                pass.draw(first..first + count, instances);
            }
            (DrawRange::Indirect { slots, index }, Some(_)) => {
                pass.draw_indexed_indirect(self.indirect.buffer().raw(), slots.byte_offset(index));
            }
            (DrawRange::Indirect { .. }, None) => {
                panic!("indirect draw of '{name}' needs an index buffer: slots hold indexed arguments");
            }
        }
        Ok(())
    }

    /// Resolves the compute pipeline for `call` and records the dispatch.
    ///
    /// # Panics
    ///
    /// Panics outside a compute pass, on a bind group format gap and for a
    /// bind group that was never updated.
    pub fn dispatch(&mut self, call: &DispatchCall<'_, B>) -> Result<()> {
        if self.lost {
            return Err(BinderyError::DeviceLost);
        }
        let processed = call.shader.processed()?;
        let name = call.shader.name();
        assert!(
            self.frame.state() == FrameState::InComputePass,
            "no matching pass: dispatch of '{name}' outside a compute pass"
        );

        let program = self.shader_modules.program(
            &self.backend,
            &mut self.keys,
            name,
            processed,
            &self.pool.spawner(),
        );
        let request = ComputePipelineRequest {
            program: &program,
            bind_group_formats: call.bind_groups.map(|group| group.map(|g| g.format().as_ref())),
        };
        let pipeline_id = self.compute_pipelines.get_or_create(
            &self.backend,
            &mut self.layouts,
            &self.settings.compute_entry_point,
            &request,
        );

        let pass = self.frame.compute_pass();
        pass.set_pipeline(self.compute_pipelines.pipeline(pipeline_id));
        for (index, group) in call.bind_groups.iter().enumerate() {
            let Some(group) = group else { continue };
            let Some(raw) = group.raw() else {
                panic!("bind group {index} of '{name}' used before update");
            };
            pass.set_bind_group(index as u32, raw, &dynamic_offsets(group, None));
        }
        match &call.workgroups {
            Workgroups::Direct { x, y, z } => pass.dispatch(*x, *y, *z),
            Workgroups::Indirect { buffer, offset } => pass.dispatch_indirect(buffer.raw(), *offset),
        }
        Ok(())
    }

    // ─── Indirect Draws ──────────────────────────────────────────────────────

    /// Reserves `count` consecutive indirect draw slots for this frame.
    pub fn get_indirect_draw_slot(&mut self, count: u32) -> Result<IndirectSlots> {
        self.indirect.allocate(count)
    }

    /// Writes indexed draw arguments into `slots`.
    pub fn write_indirect_args(&self, slots: IndirectSlots, args: &[DrawIndexedIndirectArgs]) {
        self.indirect.write(&self.backend, slots, args);
    }

    /// The indirect argument buffer, for compute passes that fill it.
    #[must_use]
    pub fn indirect_buffer(&self) -> &GpuBuffer<B> {
        self.indirect.buffer()
    }

    // ─── Read-back ───────────────────────────────────────────────────────────

    /// Reads `size` bytes at `offset` of `buffer`.
    ///
    /// The copy is recorded into the frame encoder after everything recorded
    /// so far. With `immediate` the frame is submitted and the backend waited
    /// on, so the returned future is already resolved. Otherwise it resolves
    /// after a later submit and poll (`frame_start` does both).
    ///
    /// # Panics
    ///
    /// Panics while a pass is open.
    pub fn read_buffer(
        &mut self,
        buffer: &GpuBuffer<B>,
        offset: u64,
        size: u64,
        immediate: bool,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>>> {
        if self.lost {
            return future::ready(Err(BinderyError::DeviceLost)).boxed_local();
        }
        let encoder = self.frame.encoder(&self.backend);
        let receiver = self.readbacks.request(&self.backend, encoder, buffer, offset, size);
        if immediate {
            self.submit();
            self.poll(true);
        }
        receiver
            .map(|result| result.unwrap_or(Err(BinderyError::DeviceLost)))
            .boxed_local()
    }

    // ─── Shaders & Bindings ──────────────────────────────────────────────────

    /// Processes a shader definition against this device's capabilities.
    pub fn create_shader(&mut self, definition: &ShaderDefinition) -> Shader {
        Shader::new(definition, &self.processor, &mut self.keys)
    }

    #[must_use]
    pub fn create_bind_group_format(
        &mut self,
        buffers: Vec<BindUniformBufferFormat>,
        textures: Vec<BindTextureFormat>,
        storage: Vec<BindStorageFormat>,
    ) -> Arc<BindGroupFormat> {
        Arc::new(BindGroupFormat::new(&mut self.keys, buffers, textures, storage))
    }

    /// A format with no entries, for unused bind group indices.
    #[must_use]
    pub fn empty_bind_group_format(&mut self) -> Arc<BindGroupFormat> {
        Arc::new(BindGroupFormat::empty(&mut self.keys))
    }

    pub fn create_vertex_format(
        &mut self,
        elements: &[VertexElementDesc],
        vertex_count: Option<u32>,
        instancing: bool,
    ) -> Result<Arc<VertexFormat>> {
        VertexFormat::new(&mut self.keys, elements, vertex_count, instancing).map(Arc::new)
    }

    /// # Panics
    ///
    /// Panics if the target has no attachment or mixed sample counts.
    #[must_use]
    pub fn create_render_target(
        &mut self,
        colors: Vec<Rc<GpuTexture<B>>>,
        depth: Option<Rc<GpuTexture<B>>>,
    ) -> RenderTarget<B> {
        RenderTarget::new(&mut self.keys, colors, depth)
    }

    /// Rebuilds `group` from the given resources.
    pub fn update_bind_group(
        &mut self,
        group: &mut BindGroup<B>,
        buffers: &[Option<BindBuffer<'_, B>>],
        textures: &[Option<BindTexture<'_, B>>],
        storage: &[Option<BindStorage<'_, B>>],
    ) {
        group.update(&self.backend, &mut self.layouts, buffers, textures, storage);
    }

    /// Binds the uniform ring as the mesh uniform buffer of `group`, together
    /// with the group's textures and storage. Rebuilds only when something
    /// changed, which includes ring growth. Returns whether it rebuilt.
    pub fn prepare_mesh_bind_group(
        &mut self,
        group: &mut BindGroup<B>,
        uniforms: &UniformBufferFormat,
        textures: &[Option<BindTexture<'_, B>>],
        storage: &[Option<BindStorage<'_, B>>],
    ) -> bool {
        let window = BindBuffer::window(self.uniforms.buffer(), u64::from(uniforms.byte_size()));
        group.update_if_changed(&self.backend, &mut self.layouts, &[Some(window)], textures, storage)
    }

    // ─── Resources ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> GpuBuffer<B> {
        GpuBuffer::new(&self.backend, label, size, usage)
    }

    #[must_use]
    pub fn create_buffer_with_data(
        &self,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[u8],
    ) -> GpuBuffer<B> {
        GpuBuffer::with_data(&self.backend, label, usage, data)
    }

    pub fn write_buffer(&self, buffer: &mut GpuBuffer<B>, offset: u64, data: &[u8]) {
        buffer.write(&self.backend, offset, data);
    }

    #[must_use]
    pub fn create_texture(&self, desc: TextureDesc) -> GpuTexture<B> {
        GpuTexture::new(&self.backend, desc)
    }

    // ─── Device Loss ─────────────────────────────────────────────────────────

    /// Drops every GPU object owned by the device. The key interner is kept:
    /// keys are content-derived and stay valid for the next backend.
    pub fn handle_device_lost(&mut self) {
        log::info!(
            "Device lost at frame {}: dropping {} render pipelines, {} compute pipelines, {} shader modules",
            self.frame_index,
            self.render_pipelines.len(),
            self.compute_pipelines.len(),
            self.shader_modules.module_count()
        );
        self.lost = true;
        self.frame.reset();
        self.pass = None;
        self.readbacks.clear();
        self.shader_modules.clear();
        self.layouts.clear();
        self.render_pipelines.clear();
        self.compute_pipelines.clear();
        self.back_buffer = None;
        self.default_depth = None;
    }

    /// Installs a new backend after device loss and recreates the device's
    /// own buffers. Shader modules, layouts and pipelines rebuild lazily.
    pub fn restore(&mut self, backend: B) {
        if !self.lost {
            self.handle_device_lost();
        }
        self.caps = backend.caps();
        self.processor = ShaderProcessor::new(self.caps);
        self.indirect = IndirectDrawBuffer::new(&backend, self.settings.indirect_draw_capacity);
        self.uniforms = UniformRing::new(&backend, self.settings.uniform_ring_size);
        self.backend = backend;
        self.lost = false;
        log::info!("Device restored");
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    #[inline]
    pub fn keys(&mut self) -> &mut KeyInterner {
        &mut self.keys
    }

    #[inline]
    #[must_use]
    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    #[must_use]
    pub fn back_buffer(&self) -> Option<&BackBuffer<B>> {
        self.back_buffer.as_ref()
    }

    #[must_use]
    pub fn back_buffer_format(&self) -> Option<&RenderTargetFormat> {
        self.back_buffer_format.as_ref()
    }

    #[must_use]
    pub fn uniform_ring(&self) -> &UniformRing<B> {
        &self.uniforms
    }

    #[must_use]
    pub fn render_pipeline_count(&self) -> usize {
        self.render_pipelines.len()
    }

    #[must_use]
    pub fn compute_pipeline_count(&self) -> usize {
        self.compute_pipelines.len()
    }

    #[must_use]
    pub fn shader_module_count(&self) -> usize {
        self.shader_modules.module_count()
    }
}

/// One dynamic offset per uniform buffer of the group's format; `first`
/// replaces the offset of the first one.
fn dynamic_offsets<B: GpuBackend>(group: &BindGroup<B>, first: Option<u32>) -> SmallVec<[u32; 4]> {
    let mut offsets: SmallVec<[u32; 4]> = SmallVec::from_elem(0, group.format().buffer_count());
    if let (Some(offset), Some(slot)) = (first, offsets.first_mut()) {
        *slot = offset;
    }
    offsets
}
