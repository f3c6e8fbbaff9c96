//! GPU Backend Seam
//!
//! [`GpuBackend`] is the narrow set of operations the binding, pipeline and
//! frame layers need from the graphics API. Handles are associated types so
//! the same device logic runs against [`WgpuBackend`](super::WgpuBackend) and
//! against the headless [`RecordingBackend`](super::RecordingBackend) used in
//! tests.
//!
//! Descriptor types that only carry plain data are taken straight from
//! `wgpu`. Descriptors that reference backend handles are mirrored here with
//! the handle types swapped for the backend's own.

use std::fmt;
use std::ops::Range;

use futures::future::LocalBoxFuture;

use crate::errors::Result;
use crate::settings::DeviceCaps;
use crate::shader::diagnostics::CompilerMessage;

// ─── Pass Encoders ───────────────────────────────────────────────────────────

/// Commands recordable inside a render pass.
pub trait RenderPassEncoder<B: GpuBackend> {
    fn set_pipeline(&mut self, pipeline: &B::RenderPipeline);
    fn set_bind_group(&mut self, index: u32, group: &B::BindGroup, offsets: &[u32]);
    fn set_vertex_buffer(&mut self, slot: u32, buffer: &B::Buffer, offset: u64);
    fn set_index_buffer(&mut self, buffer: &B::Buffer, offset: u64, format: wgpu::IndexFormat);
    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32);
    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32);
    fn set_stencil_reference(&mut self, reference: u32);
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
    fn draw_indirect(&mut self, buffer: &B::Buffer, offset: u64);
    fn draw_indexed_indirect(&mut self, buffer: &B::Buffer, offset: u64);
}

/// Commands recordable inside a compute pass.
pub trait ComputePassEncoder<B: GpuBackend> {
    fn set_pipeline(&mut self, pipeline: &B::ComputePipeline);
    fn set_bind_group(&mut self, index: u32, group: &B::BindGroup, offsets: &[u32]);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn dispatch_indirect(&mut self, buffer: &B::Buffer, offset: u64);
}

// ─── Handle-Carrying Descriptors ─────────────────────────────────────────────

/// Resource bound at one slot of a bind group.
pub enum BindingResource<'a, B: GpuBackend> {
    Buffer {
        buffer: &'a B::Buffer,
        offset: u64,
        /// `None` binds the remainder of the buffer.
        size: Option<u64>,
    },
    TextureView(&'a B::TextureView),
    Sampler(&'a B::Sampler),
}

pub struct BindGroupEntry<'a, B: GpuBackend> {
    pub binding: u32,
    pub resource: BindingResource<'a, B>,
}

/// Everything needed to compile a render pipeline.
pub struct RenderPipelineDesc<'a, B: GpuBackend> {
    pub label: &'a str,
    pub layout: &'a B::PipelineLayout,
    pub vertex_module: &'a B::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_module: &'a B::ShaderModule,
    pub fragment_entry: &'a str,
    pub buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub primitive: wgpu::PrimitiveState,
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub multisample: wgpu::MultisampleState,
    pub targets: &'a [Option<wgpu::ColorTargetState>],
}

pub struct ComputePipelineDesc<'a, B: GpuBackend> {
    pub label: &'a str,
    pub layout: &'a B::PipelineLayout,
    pub module: &'a B::ShaderModule,
    pub entry: &'a str,
}

pub struct ColorAttachment<'a, B: GpuBackend> {
    pub view: &'a B::TextureView,
    pub resolve_target: Option<&'a B::TextureView>,
    pub ops: wgpu::Operations<wgpu::Color>,
}

pub struct DepthStencilAttachment<'a, B: GpuBackend> {
    pub view: &'a B::TextureView,
    pub depth_ops: Option<wgpu::Operations<f32>>,
    pub stencil_ops: Option<wgpu::Operations<u32>>,
}

pub struct RenderPassBegin<'a, B: GpuBackend> {
    pub label: &'a str,
    pub color_attachments: Vec<ColorAttachment<'a, B>>,
    pub depth_stencil: Option<DepthStencilAttachment<'a, B>>,
}

/// Output image of the current frame.
pub struct BackBuffer<B: GpuBackend> {
    pub view: B::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl<B: GpuBackend> Clone for BackBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}

impl<B: GpuBackend> fmt::Debug for BackBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

// ─── GpuBackend ──────────────────────────────────────────────────────────────

/// Graphics API operations used by the device.
///
/// All calls happen on the thread that owns the device. Asynchronous results
/// (compilation messages, buffer maps) are `'static` local futures that
/// resolve once the backend has been polled.
pub trait GpuBackend: Sized + 'static {
    type Buffer: Clone + fmt::Debug;
    type Texture: Clone + fmt::Debug;
    type TextureView: Clone + fmt::Debug;
    type Sampler: Clone + fmt::Debug;
    type BindGroupLayout: Clone + fmt::Debug;
    type BindGroup: Clone + fmt::Debug;
    type PipelineLayout: Clone + fmt::Debug;
    type ShaderModule: Clone + fmt::Debug;
    type RenderPipeline: Clone + fmt::Debug;
    type ComputePipeline: Clone + fmt::Debug;
    type CommandEncoder;
    type CommandBuffer;
    type RenderPass: RenderPassEncoder<Self>;
    type ComputePass: ComputePassEncoder<Self>;

    fn caps(&self) -> DeviceCaps;

    // Resources
    fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> Self::Buffer;
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]);
    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Self::Texture;
    fn create_texture_view(
        &self,
        texture: &Self::Texture,
        desc: &wgpu::TextureViewDescriptor<'_>,
    ) -> Self::TextureView;
    fn create_sampler(&self, desc: &wgpu::SamplerDescriptor<'_>) -> Self::Sampler;

    // Shaders, layouts and pipelines
    fn create_shader_module(&self, label: &str, source: &str) -> Self::ShaderModule;
    fn compilation_messages(
        &self,
        module: &Self::ShaderModule,
    ) -> LocalBoxFuture<'static, Vec<CompilerMessage>>;
    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Self::BindGroupLayout;
    fn create_bind_group(
        &self,
        label: &str,
        layout: &Self::BindGroupLayout,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> Self::BindGroup;
    fn create_pipeline_layout(
        &self,
        label: &str,
        layouts: &[&Self::BindGroupLayout],
    ) -> Self::PipelineLayout;
    fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, Self>) -> Self::RenderPipeline;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_, Self>)
    -> Self::ComputePipeline;

    // Command recording
    fn create_command_encoder(&self, label: &str) -> Self::CommandEncoder;
    fn begin_render_pass(
        &self,
        encoder: &mut Self::CommandEncoder,
        desc: &RenderPassBegin<'_, Self>,
    ) -> Self::RenderPass;
    fn end_render_pass(&self, pass: Self::RenderPass);
    fn begin_compute_pass(
        &self,
        encoder: &mut Self::CommandEncoder,
        label: &str,
    ) -> Self::ComputePass;
    fn end_compute_pass(&self, pass: Self::ComputePass);
    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut Self::CommandEncoder,
        source: &Self::Buffer,
        source_offset: u64,
        destination: &Self::Buffer,
        destination_offset: u64,
        size: u64,
    );
    /// Fills every mip level below the first from the level above it.
    fn generate_mipmaps(&self, encoder: &mut Self::CommandEncoder, texture: &Self::Texture);
    /// Resolves a multisampled depth texture into a single-sample one.
    fn resolve_depth(
        &self,
        encoder: &mut Self::CommandEncoder,
        source: &Self::Texture,
        destination: &Self::Texture,
    );
    fn finish(&self, encoder: Self::CommandEncoder) -> Self::CommandBuffer;
    fn submit(&self, command_buffers: Vec<Self::CommandBuffer>);

    // Host interaction
    /// Maps `size` bytes of a `MAP_READ` buffer. Only call after the copy
    /// into it has been submitted.
    fn map_read(
        &self,
        buffer: &Self::Buffer,
        offset: u64,
        size: u64,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>>>;
    fn poll(&self, wait: bool);

    // Presentation
    fn acquire_back_buffer(&mut self) -> Option<BackBuffer<Self>>;
    fn present(&mut self);

    fn is_lost(&self) -> bool;
}
