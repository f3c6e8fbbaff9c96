//! wgpu Backend
//!
//! [`WgpuBackend`] implements [`GpuBackend`] on top of `wgpu`. It owns the
//! adapter, device and queue, plus either a window surface or an offscreen
//! color texture that stands in for the back buffer.
//!
//! Device loss is reported through `wgpu`'s lost callback, which flips a
//! shared flag the [`GpuDevice`](super::GpuDevice) checks every frame.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use super::backend::{
    BackBuffer, BindGroupEntry, BindingResource, ComputePassEncoder, ComputePipelineDesc,
    GpuBackend, RenderPassBegin, RenderPassEncoder, RenderPipelineDesc,
};
use super::blit::{DepthResolver, MipmapBlitter};
use crate::errors::{BinderyError, Result};
use crate::settings::{DeviceCaps, DeviceSettings};
use crate::shader::diagnostics::CompilerMessage;

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

enum Presentation {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        current: Option<wgpu::SurfaceTexture>,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

/// GPU backend driven by `wgpu`.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    presentation: Presentation,
    caps: DeviceCaps,
    lost: Arc<AtomicBool>,
    mipmaps: MipmapBlitter,
    depth_resolver: DepthResolver,
}

impl WgpuBackend {
    /// Creates a backend rendering into an offscreen texture of the given size.
    pub async fn request_headless(settings: &DeviceSettings, width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = request_adapter(&instance, settings, None).await?;
        let (device, queue) = request_device(&adapter, settings).await?;
        let (texture, view) = offscreen_target(&device, width, height);
        Ok(Self::assemble(
            device,
            queue,
            Presentation::Offscreen { texture, view },
        ))
    }

    /// Creates a backend presenting to a window surface.
    pub async fn request_with_surface(
        settings: &DeviceSettings,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|e| BinderyError::AdapterRequestFailed(e.to_string()))?;
        let adapter = request_adapter(&instance, settings, Some(&surface)).await?;
        let (device, queue) = request_device(&adapter, settings).await?;

        let config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| {
                BinderyError::AdapterRequestFailed("Surface not supported by adapter".to_string())
            })?;
        surface.configure(&device, &config);

        Ok(Self::assemble(
            device,
            queue,
            Presentation::Surface {
                surface,
                config,
                current: None,
            },
        ))
    }

    fn assemble(device: wgpu::Device, queue: wgpu::Queue, presentation: Presentation) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("GPU device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let caps = DeviceCaps::from_limits(&device.limits(), device.features());
        log::info!(
            "GPU device ready: {} color attachments, {} bind groups, uniform offset alignment {}",
            caps.max_color_attachments,
            caps.max_bind_groups,
            caps.min_uniform_buffer_offset_alignment
        );

        Self {
            mipmaps: MipmapBlitter::new(&device),
            depth_resolver: DepthResolver::new(&device),
            device,
            queue,
            presentation,
            caps,
            lost,
        }
    }

    /// Resizes the surface or offscreen target. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        match &mut self.presentation {
            Presentation::Surface {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presentation::Offscreen { texture, view } => {
                let (new_texture, new_view) = offscreen_target(&self.device, width, height);
                *texture = new_texture;
                *view = new_view;
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    settings: &DeviceSettings,
    surface: Option<&wgpu::Surface<'static>>,
) -> Result<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: settings.adapter_preference.to_wgpu(),
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| BinderyError::AdapterRequestFailed(e.to_string()))
}

async fn request_device(
    adapter: &wgpu::Adapter,
    settings: &DeviceSettings,
) -> Result<(wgpu::Device, wgpu::Queue)> {
    let required_limits = if settings.downlevel_limits {
        wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
    } else {
        wgpu::Limits::default()
    };
    let required_features = adapter.features() & wgpu::Features::PRIMITIVE_INDEX;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("Bindery Device"),
            required_features,
            required_limits,
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await?;
    Ok((device, queue))
}

fn offscreen_target(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Back Buffer"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

// ─── Pass Encoders ───────────────────────────────────────────────────────────

impl RenderPassEncoder<WgpuBackend> for wgpu::RenderPass<'static> {
    fn set_pipeline(&mut self, pipeline: &wgpu::RenderPipeline) {
        wgpu::RenderPass::set_pipeline(self, pipeline);
    }

    fn set_bind_group(&mut self, index: u32, group: &wgpu::BindGroup, offsets: &[u32]) {
        wgpu::RenderPass::set_bind_group(self, index, group, offsets);
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &wgpu::Buffer, offset: u64) {
        wgpu::RenderPass::set_vertex_buffer(self, slot, buffer.slice(offset..));
    }

    fn set_index_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, format: wgpu::IndexFormat) {
        wgpu::RenderPass::set_index_buffer(self, buffer.slice(offset..), format);
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        wgpu::RenderPass::set_viewport(self, x, y, width, height, min_depth, max_depth);
    }

    fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) {
        wgpu::RenderPass::set_scissor_rect(self, x, y, width, height);
    }

    fn set_stencil_reference(&mut self, reference: u32) {
        wgpu::RenderPass::set_stencil_reference(self, reference);
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        wgpu::RenderPass::draw(self, vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        wgpu::RenderPass::draw_indexed(self, indices, base_vertex, instances);
    }

    fn draw_indirect(&mut self, buffer: &wgpu::Buffer, offset: u64) {
        wgpu::RenderPass::draw_indirect(self, buffer, offset);
    }

    fn draw_indexed_indirect(&mut self, buffer: &wgpu::Buffer, offset: u64) {
        wgpu::RenderPass::draw_indexed_indirect(self, buffer, offset);
    }
}

impl ComputePassEncoder<WgpuBackend> for wgpu::ComputePass<'static> {
    fn set_pipeline(&mut self, pipeline: &wgpu::ComputePipeline) {
        wgpu::ComputePass::set_pipeline(self, pipeline);
    }

    fn set_bind_group(&mut self, index: u32, group: &wgpu::BindGroup, offsets: &[u32]) {
        wgpu::ComputePass::set_bind_group(self, index, group, offsets);
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.dispatch_workgroups(x, y, z);
    }

    fn dispatch_indirect(&mut self, buffer: &wgpu::Buffer, offset: u64) {
        self.dispatch_workgroups_indirect(buffer, offset);
    }
}

// ─── GpuBackend ──────────────────────────────────────────────────────────────

impl GpuBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;
    type Texture = wgpu::Texture;
    type TextureView = wgpu::TextureView;
    type Sampler = wgpu::Sampler;
    type BindGroupLayout = wgpu::BindGroupLayout;
    type BindGroup = wgpu::BindGroup;
    type PipelineLayout = wgpu::PipelineLayout;
    type ShaderModule = wgpu::ShaderModule;
    type RenderPipeline = wgpu::RenderPipeline;
    type ComputePipeline = wgpu::ComputePipeline;
    type CommandEncoder = wgpu::CommandEncoder;
    type CommandBuffer = wgpu::CommandBuffer;
    type RenderPass = wgpu::RenderPass<'static>;
    type ComputePass = wgpu::ComputePass<'static>;

    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> wgpu::Buffer {
        self.device.create_buffer(desc)
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> wgpu::Texture {
        self.device.create_texture(desc)
    }

    fn create_texture_view(
        &self,
        texture: &wgpu::Texture,
        desc: &wgpu::TextureViewDescriptor<'_>,
    ) -> wgpu::TextureView {
        texture.create_view(desc)
    }

    fn create_sampler(&self, desc: &wgpu::SamplerDescriptor<'_>) -> wgpu::Sampler {
        self.device.create_sampler(desc)
    }

    fn create_shader_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.to_owned().into()),
        })
    }

    fn compilation_messages(
        &self,
        module: &wgpu::ShaderModule,
    ) -> LocalBoxFuture<'static, Vec<CompilerMessage>> {
        let module = module.clone();
        async move {
            let info = module.get_compilation_info().await;
            info.messages.iter().map(CompilerMessage::from_wgpu).collect()
        }
        .boxed_local()
    }

    fn create_bind_group_layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> wgpu::BindGroupLayout {
        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
    }

    fn create_bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        entries: &[BindGroupEntry<'_, Self>],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry<'_>> = entries
            .iter()
            .map(|entry| wgpu::BindGroupEntry {
                binding: entry.binding,
                resource: match entry.resource {
                    BindingResource::Buffer {
                        buffer,
                        offset,
                        size,
                    } => wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset,
                        size: size.and_then(wgpu::BufferSize::new),
                    }),
                    BindingResource::TextureView(view) => wgpu::BindingResource::TextureView(view),
                    BindingResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    fn create_pipeline_layout(
        &self,
        label: &str,
        layouts: &[&wgpu::BindGroupLayout],
    ) -> wgpu::PipelineLayout {
        let layouts: Vec<Option<&wgpu::BindGroupLayout>> = layouts.iter().copied().map(Some).collect();
        self.device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &layouts,
                immediate_size: 0,
            })
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, Self>) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(desc.layout),
                vertex: wgpu::VertexState {
                    module: desc.vertex_module,
                    entry_point: Some(desc.vertex_entry),
                    buffers: desc.buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: desc.fragment_module,
                    entry_point: Some(desc.fragment_entry),
                    targets: desc.targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: desc.primitive,
                depth_stencil: desc.depth_stencil.clone(),
                multisample: desc.multisample,
                multiview_mask: None,
                cache: None,
            })
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_, Self>) -> wgpu::ComputePipeline {
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label),
                layout: Some(desc.layout),
                module: desc.module,
                entry_point: Some(desc.entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }

    fn create_command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn begin_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        desc: &RenderPassBegin<'_, Self>,
    ) -> wgpu::RenderPass<'static> {
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = desc
            .color_attachments
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: color.view,
                    resolve_target: color.resolve_target,
                    ops: color.ops,
                    depth_slice: None,
                })
            })
            .collect();

        let depth_stencil_attachment =
            desc.depth_stencil
                .as_ref()
                .map(|depth| wgpu::RenderPassDepthStencilAttachment {
                    view: depth.view,
                    depth_ops: depth.depth_ops,
                    stencil_ops: depth.stencil_ops,
                });

        encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(desc.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime()
    }

    fn end_render_pass(&self, pass: wgpu::RenderPass<'static>) {
        drop(pass);
    }

    fn begin_compute_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
    ) -> wgpu::ComputePass<'static> {
        encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            })
            .forget_lifetime()
    }

    fn end_compute_pass(&self, pass: wgpu::ComputePass<'static>) {
        drop(pass);
    }

    fn copy_buffer_to_buffer(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Buffer,
        source_offset: u64,
        destination: &wgpu::Buffer,
        destination_offset: u64,
        size: u64,
    ) {
        encoder.copy_buffer_to_buffer(source, source_offset, destination, destination_offset, size);
    }

    fn generate_mipmaps(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        self.mipmaps.generate(&self.device, encoder, texture);
    }

    fn resolve_depth(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        destination: &wgpu::Texture,
    ) {
        self.depth_resolver
            .resolve(&self.device, encoder, source, destination);
    }

    fn finish(&self, encoder: wgpu::CommandEncoder) -> wgpu::CommandBuffer {
        encoder.finish()
    }

    fn submit(&self, command_buffers: Vec<wgpu::CommandBuffer>) {
        self.queue.submit(command_buffers);
    }

    fn map_read(
        &self,
        buffer: &wgpu::Buffer,
        offset: u64,
        size: u64,
    ) -> LocalBoxFuture<'static, Result<Vec<u8>>> {
        let (sender, receiver) = oneshot::channel();
        buffer
            .slice(offset..offset + size)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });

        let buffer = buffer.clone();
        async move {
            match receiver.await {
                Ok(Ok(())) => {
                    let data = buffer.slice(offset..offset + size).get_mapped_range().to_vec();
                    buffer.unmap();
                    Ok(data)
                }
                Ok(Err(err)) => Err(BinderyError::BufferMapFailed(err.to_string())),
                Err(_) => Err(BinderyError::BufferMapFailed(
                    "map callback dropped before completion".to_string(),
                )),
            }
        }
        .boxed_local()
    }

    fn poll(&self, wait: bool) {
        let poll_type = if wait {
            wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            }
        } else {
            wgpu::PollType::Poll
        };
        if let Err(err) = self.device.poll(poll_type) {
            log::warn!("Device poll failed: {err}");
        }
    }

    fn acquire_back_buffer(&mut self) -> Option<BackBuffer<Self>> {
        match &mut self.presentation {
            Presentation::Surface {
                surface,
                config,
                current,
            } => {
                let output = match surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(output) => output,
                    wgpu::CurrentSurfaceTexture::Suboptimal(output) => {
                        log::debug!("Surface texture is suboptimal");
                        output
                    }
                    wgpu::CurrentSurfaceTexture::Outdated => {
                        surface.configure(&self.device, config);
                        return None;
                    }
                    wgpu::CurrentSurfaceTexture::Timeout | wgpu::CurrentSurfaceTexture::Occluded => {
                        return None;
                    }
                    status @ (wgpu::CurrentSurfaceTexture::Lost
                    | wgpu::CurrentSurfaceTexture::Validation) => {
                        log::error!("Failed to acquire back buffer: {status:?}");
                        return None;
                    }
                };
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let back_buffer = BackBuffer {
                    view,
                    width: config.width,
                    height: config.height,
                    format: config.format,
                };
                *current = Some(output);
                Some(back_buffer)
            }
            Presentation::Offscreen { texture, view } => Some(BackBuffer {
                view: view.clone(),
                width: texture.width(),
                height: texture.height(),
                format: OFFSCREEN_FORMAT,
            }),
        }
    }

    fn present(&mut self) {
        if let Presentation::Surface { current, .. } = &mut self.presentation
            && let Some(output) = current.take()
        {
            output.present();
        }
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}
