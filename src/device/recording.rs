//! Recording Backend
//!
//! A headless [`GpuBackend`] that creates no GPU objects. Every call is
//! appended to a shared command log in the order it was made, so tests can
//! assert on the exact sequence of encoder calls the device produced.
//!
//! Buffer contents are simulated: `write_buffer` updates them immediately and
//! buffer-to-buffer copies take effect when their command buffer is
//! submitted, which is enough to exercise read-back end to end.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;

use super::backend::{
    BackBuffer, BindGroupEntry, BindingResource, ComputePassEncoder, ComputePipelineDesc,
    GpuBackend, RenderPassBegin, RenderPassEncoder, RenderPipelineDesc,
};
use crate::errors::{BinderyError, Result};
use crate::settings::DeviceCaps;
use crate::shader::diagnostics::CompilerMessage;

/// Opaque handle of a recorded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedHandle(pub u64);

impl RecordedHandle {
    #[inline]
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBuffer { id: u64, label: String, size: u64 },
    WriteBuffer { buffer: u64, offset: u64, len: usize },
    CreateTexture { id: u64, label: String },
    CreateTextureView {
        id: u64,
        texture: u64,
        base_mip: u32,
        mip_count: Option<u32>,
        base_layer: u32,
        layer_count: Option<u32>,
    },
    CreateSampler { id: u64, comparison: bool },
    CreateShaderModule { id: u64, label: String },
    CreateBindGroupLayout { id: u64, label: String },
    CreateBindGroup {
        id: u64,
        label: String,
        layout: u64,
        resources: Vec<u64>,
    },
    CreatePipelineLayout { id: u64, label: String, layouts: Vec<u64> },
    CreateRenderPipeline { id: u64, label: String },
    CreateComputePipeline { id: u64, label: String },
    CreateCommandEncoder { id: u64, label: String },
    BeginRenderPass {
        encoder: u64,
        label: String,
        color_views: Vec<u64>,
        depth_view: Option<u64>,
    },
    EndRenderPass,
    BeginComputePass { encoder: u64, label: String },
    EndComputePass,
    SetPipeline(u64),
    SetBindGroup { index: u32, group: u64, offsets: Vec<u32> },
    SetVertexBuffer { slot: u32, buffer: u64, offset: u64 },
    SetIndexBuffer {
        buffer: u64,
        offset: u64,
        format: wgpu::IndexFormat,
    },
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissorRect { x: u32, y: u32, width: u32, height: u32 },
    SetStencilReference(u32),
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    DrawIndirect { buffer: u64, offset: u64 },
    DrawIndexedIndirect { buffer: u64, offset: u64 },
    Dispatch { x: u32, y: u32, z: u32 },
    DispatchIndirect { buffer: u64, offset: u64 },
    CopyBufferToBuffer {
        encoder: u64,
        source: u64,
        destination: u64,
        size: u64,
    },
    GenerateMipmaps { texture: u64 },
    ResolveDepth { source: u64, destination: u64 },
    Finish { encoder: u64, command_buffer: u64 },
    Submit { command_buffers: Vec<u64> },
    MapRead { buffer: u64, offset: u64, size: u64 },
    Present,
}

impl Command {
    /// Whether this command is recorded inside a pass.
    #[must_use]
    pub fn is_pass_command(&self) -> bool {
        matches!(
            self,
            Self::SetPipeline(_)
                | Self::SetBindGroup { .. }
                | Self::SetVertexBuffer { .. }
                | Self::SetIndexBuffer { .. }
                | Self::SetViewport { .. }
                | Self::SetScissorRect { .. }
                | Self::SetStencilReference(_)
                | Self::Draw { .. }
                | Self::DrawIndexed { .. }
                | Self::DrawIndirect { .. }
                | Self::DrawIndexedIndirect { .. }
                | Self::Dispatch { .. }
                | Self::DispatchIndirect { .. }
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    source: u64,
    source_offset: u64,
    destination: u64,
    destination_offset: u64,
    size: u64,
}

#[derive(Debug)]
struct RecordingState {
    next_id: u64,
    commands: Vec<Command>,
    buffers: FxHashMap<u64, Vec<u8>>,
    compilation_messages: Vec<CompilerMessage>,
    back_buffer: (u32, u32),
    lost: bool,
}

impl RecordingState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

type Shared = Rc<RefCell<RecordingState>>;

// ─── Encoders ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RecordedEncoder {
    id: u64,
    copies: Vec<PendingCopy>,
}

#[derive(Debug)]
pub struct RecordedCommandBuffer {
    id: u64,
    copies: Vec<PendingCopy>,
}

impl RecordedCommandBuffer {
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct RecordedPass {
    state: Shared,
}

impl RecordedPass {
    fn push(&self, command: Command) {
        self.state.borrow_mut().commands.push(command);
    }
}

impl RenderPassEncoder<RecordingBackend> for RecordedPass {
    fn set_pipeline(&mut self, pipeline: &RecordedHandle) {
        self.push(Command::SetPipeline(pipeline.0));
    }

    fn set_bind_group(&mut self, index: u32, group: &RecordedHandle, offsets: &[u32]) {
        self.push(Command::SetBindGroup {
            index,
            group: group.0,
            offsets: offsets.to_vec(),
        });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &RecordedHandle, offset: u64) {
        self.push(Command::SetVertexBuffer {
            slot,
            buffer: buffer.0,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: &RecordedHandle, offset: u64, format: wgpu::IndexFormat) {
        self.push(Command::SetIndexBuffer {
            buffer: buffer.0,
            offset,
            format,
        });
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        self.push(Command::SetViewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        });
    }

    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.push(Command::SetScissorRect {
            x,
            y,
            width,
            height,
        });
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        self.push(Command::SetStencilReference(reference));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.push(Command::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.push(Command::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn draw_indirect(&mut self, buffer: &RecordedHandle, offset: u64) {
        self.push(Command::DrawIndirect {
            buffer: buffer.0,
            offset,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: &RecordedHandle, offset: u64) {
        self.push(Command::DrawIndexedIndirect {
            buffer: buffer.0,
            offset,
        });
    }
}

impl ComputePassEncoder<RecordingBackend> for RecordedPass {
    fn set_pipeline(&mut self, pipeline: &RecordedHandle) {
        self.push(Command::SetPipeline(pipeline.0));
    }

    fn set_bind_group(&mut self, index: u32, group: &RecordedHandle, offsets: &[u32]) {
        self.push(Command::SetBindGroup {
            index,
            group: group.0,
            offsets: offsets.to_vec(),
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Command::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&mut self, buffer: &RecordedHandle, offset: u64) {
        self.push(Command::DispatchIndirect {
            buffer: buffer.0,
            offset,
        });
    }
}

// ─── RecordingBackend ────────────────────────────────────────────────────────

/// Headless backend that logs every call.
///
/// Cloning shares the same log, so a test can keep a clone for inspection
/// after handing the backend to a device.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    state: Shared,
    caps: DeviceCaps,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_caps(DeviceCaps::default())
    }

    #[must_use]
    pub fn with_caps(caps: DeviceCaps) -> Self {
        Self {
            state: Rc::new(RefCell::new(RecordingState {
                next_id: 0,
                commands: Vec::new(),
                buffers: FxHashMap::default(),
                compilation_messages: Vec::new(),
                back_buffer: (800, 600),
                lost: false,
            })),
            caps,
        }
    }

    /// Snapshot of the command log.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// Drains the command log.
    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.state.borrow_mut().commands)
    }

    /// Commands recorded inside passes, in order.
    #[must_use]
    pub fn pass_commands(&self) -> Vec<Command> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|c| c.is_pass_command())
            .cloned()
            .collect()
    }

    /// Messages reported for every shader module created from now on.
    pub fn set_compilation_messages(&self, messages: Vec<CompilerMessage>) {
        self.state.borrow_mut().compilation_messages = messages;
    }

    pub fn set_back_buffer_size(&self, width: u32, height: u32) {
        self.state.borrow_mut().back_buffer = (width, height);
    }

    /// Simulates device loss.
    pub fn lose_device(&self) {
        self.state.borrow_mut().lost = true;
    }

    /// Simulated contents of a buffer.
    #[must_use]
    pub fn buffer_contents(&self, buffer: RecordedHandle) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer.0).cloned()
    }

    fn create(&self, make: impl FnOnce(u64) -> Command) -> RecordedHandle {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.commands.push(make(id));
        RecordedHandle(id)
    }

    fn push(&self, command: Command) {
        self.state.borrow_mut().commands.push(command);
    }
}

impl GpuBackend for RecordingBackend {
    type Buffer = RecordedHandle;
    type Texture = RecordedHandle;
    type TextureView = RecordedHandle;
    type Sampler = RecordedHandle;
    type BindGroupLayout = RecordedHandle;
    type BindGroup = RecordedHandle;
    type PipelineLayout = RecordedHandle;
    type ShaderModule = RecordedHandle;
    type RenderPipeline = RecordedHandle;
    type ComputePipeline = RecordedHandle;
    type CommandEncoder = RecordedEncoder;
    type CommandBuffer = RecordedCommandBuffer;
    type RenderPass = RecordedPass;
    type ComputePass = RecordedPass;

    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> RecordedHandle {
        let handle = self.create(|id| Command::CreateBuffer {
            id,
            label: desc.label.unwrap_or_default().to_string(),
            size: desc.size,
        });
        self.state
            .borrow_mut()
            .buffers
            .insert(handle.0, vec![0; desc.size as usize]);
        handle
    }

    fn write_buffer(&self, buffer: &RecordedHandle, offset: u64, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(contents) = state.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = (start + data.len()).min(contents.len());
            if start < end {
                contents[start..end].copy_from_slice(&data[..end - start]);
            }
        }
        state.commands.push(Command::WriteBuffer {
            buffer: buffer.0,
            offset,
            len: data.len(),
        });
    }

    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> RecordedHandle {
        self.create(|id| Command::CreateTexture {
            id,
            label: desc.label.unwrap_or_default().to_string(),
        })
    }

    fn create_texture_view(
        &self,
        texture: &RecordedHandle,
        desc: &wgpu::TextureViewDescriptor<'_>,
    ) -> RecordedHandle {
        self.create(|id| Command::CreateTextureView {
            id,
            texture: texture.0,
            base_mip: desc.base_mip_level,
            mip_count: desc.mip_level_count,
            base_layer: desc.base_array_layer,
            layer_count: desc.array_layer_count,
        })
    }

    fn create_sampler(&self, desc: &wgpu::SamplerDescriptor<'_>) -> RecordedHandle {
        self.create(|id| Command::CreateSampler {
            id,
            comparison: desc.compare.is_some(),
        })
    }

    fn create_shader_module(&self, label: &str, _source: &str) -> RecordedHandle {
        self.create(|id| Command::CreateShaderModule {
            id,
            label: label.to_string(),
        })
    }

    fn compilation_messages(
        &self,
        _module: &RecordedHandle,
    ) -> LocalBoxFuture<'static, Vec<CompilerMessage>> {
        let messages = self.state.borrow().compilation_messages.clone();
        futures::future::ready(messages).boxed_local()
    }

    fn create_bind_group_layout(
        &self,
        label: &str,
        _entries: &[wgpu::BindGroupLayoutEntry],
    ) -> RecordedHandle {
        self.create(|id| Command::CreateBindGroupLayout {
            id,
            label: label.to_string(),
        })
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: &RecordedHandle,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> RecordedHandle {
        let resources = entries
            .iter()
            .map(|entry| match entry.resource {
                BindingResource::Buffer { buffer, .. } => buffer.0,
                BindingResource::TextureView(view) => view.0,
                BindingResource::Sampler(sampler) => sampler.0,
            })
            .collect();
        self.create(|id| Command::CreateBindGroup {
            id,
            label: label.to_string(),
            layout: layout.0,
            resources,
        })
    }

    fn create_pipeline_layout(&self, label: &str, layouts: &[&RecordedHandle]) -> RecordedHandle {
        self.create(|id| Command::CreatePipelineLayout {
            id,
            label: label.to_string(),
            layouts: layouts.iter().map(|l| l.0).collect(),
        })
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, Self>) -> RecordedHandle {
        self.create(|id| Command::CreateRenderPipeline {
            id,
            label: desc.label.to_string(),
        })
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_, Self>) -> RecordedHandle {
        self.create(|id| Command::CreateComputePipeline {
            id,
            label: desc.label.to_string(),
        })
    }

    fn create_command_encoder(&self, label: &str) -> RecordedEncoder {
        let handle = self.create(|id| Command::CreateCommandEncoder {
            id,
            label: label.to_string(),
        });
        RecordedEncoder {
            id: handle.0,
            copies: Vec::new(),
        }
    }

    fn begin_render_pass(
        &self,
        encoder: &mut RecordedEncoder,
        desc: &RenderPassBegin<'_, Self>,
    ) -> RecordedPass {
        self.push(Command::BeginRenderPass {
            encoder: encoder.id,
            label: desc.label.to_string(),
            color_views: desc.color_attachments.iter().map(|c| c.view.0).collect(),
            depth_view: desc.depth_stencil.as_ref().map(|d| d.view.0),
        });
        RecordedPass {
            state: Rc::clone(&self.state),
        }
    }

    fn end_render_pass(&self, _pass: RecordedPass) {
        self.push(Command::EndRenderPass);
    }

    fn begin_compute_pass(&self, encoder: &mut RecordedEncoder, label: &str) -> RecordedPass {
        self.push(Command::BeginComputePass {
            encoder: encoder.id,
            label: label.to_string(),
        });
        RecordedPass {
            state: Rc::clone(&self.state),
        }
    }

    fn end_compute_pass(&self, _pass: RecordedPass) {
        self.push(Command::EndComputePass);
    }

    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut RecordedEncoder,
        source: &RecordedHandle,
        source_offset: u64,
        destination: &RecordedHandle,
        destination_offset: u64,
        size: u64,
    ) {
        encoder.copies.push(PendingCopy {
            source: source.0,
            source_offset,
            destination: destination.0,
            destination_offset,
            size,
        });
        self.push(Command::CopyBufferToBuffer {
            encoder: encoder.id,
            source: source.0,
            destination: destination.0,
            size,
        });
    }

    fn generate_mipmaps(&self, _encoder: &mut RecordedEncoder, texture: &RecordedHandle) {
        self.push(Command::GenerateMipmaps { texture: texture.0 });
    }

    fn resolve_depth(
        &self,
        _encoder: &mut RecordedEncoder,
        source: &RecordedHandle,
        destination: &RecordedHandle,
    ) {
        self.push(Command::ResolveDepth {
            source: source.0,
            destination: destination.0,
        });
    }

    fn finish(&self, encoder: RecordedEncoder) -> RecordedCommandBuffer {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.commands.push(Command::Finish {
            encoder: encoder.id,
            command_buffer: id,
        });
        RecordedCommandBuffer {
            id,
            copies: encoder.copies,
        }
    }

    fn submit(&self, command_buffers: Vec<RecordedCommandBuffer>) {
        let mut state = self.state.borrow_mut();
        for copy in command_buffers.iter().flat_map(|cb| &cb.copies) {
            let source = state
                .buffers
                .get(&copy.source)
                .map(|data| {
                    let start = (copy.source_offset as usize).min(data.len());
                    let end = (start + copy.size as usize).min(data.len());
                    data[start..end].to_vec()
                })
                .unwrap_or_default();
            if let Some(destination) = state.buffers.get_mut(&copy.destination) {
                let start = (copy.destination_offset as usize).min(destination.len());
                let end = (start + source.len()).min(destination.len());
                destination[start..end].copy_from_slice(&source[..end - start]);
            }
        }
        state.commands.push(Command::Submit {
            command_buffers: command_buffers.iter().map(|cb| cb.id).collect(),
        });
    }

    fn map_read(
        &self,
        buffer: &RecordedHandle,
        offset: u64,
        size: u64,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>>> {
        let mut state = self.state.borrow_mut();
        state.commands.push(Command::MapRead {
            buffer: buffer.0,
            offset,
            size,
        });
        let result = state
            .buffers
            .get(&buffer.0)
            .and_then(|data| data.get(offset as usize..(offset + size) as usize))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                BinderyError::BufferMapFailed(format!(
                    "range {offset}..{} outside buffer {}",
                    offset + size,
                    buffer.0
                ))
            });
        futures::future::ready(result).boxed_local()
    }

    fn poll(&self, _wait: bool) {}

    fn acquire_back_buffer(&mut self) -> Option<BackBuffer<Self>> {
        let mut state = self.state.borrow_mut();
        let (width, height) = state.back_buffer;
        let view = RecordedHandle(state.allocate());
        Some(BackBuffer {
            view,
            width,
            height,
            format: wgpu::TextureFormat::Bgra8Unorm,
        })
    }

    fn present(&mut self) {
        self.push(Command::Present);
    }

    fn is_lost(&self) -> bool {
        self.state.borrow().lost
    }
}
