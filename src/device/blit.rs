//! Blit Helpers
//!
//! Fullscreen-triangle passes the wgpu backend records after a render pass:
//! mip chain generation and multisampled depth resolve. Both share one
//! `FullscreenProgram` that compiles a pipeline per target format on first
//! use.

use std::borrow::Cow;
use std::cell::RefCell;

use rustc_hash::FxHashMap;

/// Where a fullscreen program writes.
#[derive(Clone, Copy)]
enum Output {
    Color,
    Depth,
}

struct FullscreenProgram {
    name: &'static str,
    output: Output,
    layout: wgpu::BindGroupLayout,
    shader: wgpu::ShaderModule,
    pipelines: RefCell<FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>>,
}

impl FullscreenProgram {
    fn new(
        device: &wgpu::Device,
        name: &'static str,
        output: Output,
        source: &'static str,
        inputs: &[wgpu::BindingType],
    ) -> Self {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = inputs
            .iter()
            .zip(0u32..)
            .map(|(ty, binding)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: *ty,
                count: None,
            })
            .collect();
        Self {
            name,
            output,
            layout: device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(name),
                entries: &entries,
            }),
            shader: device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            }),
            pipelines: RefCell::new(FxHashMap::default()),
        }
    }

    fn pipeline(&self, device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.borrow().get(&format) {
            return pipeline.clone();
        }
        log::debug!("{}: compiling pipeline for {format:?}", self.name);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(self.name),
            bind_group_layouts: &[Some(&self.layout)],
            immediate_size: 0,
        });
        let color = [Some(wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let (targets, depth_stencil): (
            &[Option<wgpu::ColorTargetState>],
            Option<wgpu::DepthStencilState>,
        ) = match self.output {
            Output::Color => (&color, None),
            Output::Depth => (
                &[],
                Some(wgpu::DepthStencilState {
                    format,
                    depth_write_enabled: Some(true),
                    depth_compare: Some(wgpu::CompareFunction::Always),
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
            ),
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some("fs_main"),
                targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.borrow_mut().insert(format, pipeline.clone());
        pipeline
    }

    /// Draws one fullscreen triangle into `target` reading `resources`.
    fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        resources: &[wgpu::BindingResource<'_>],
    ) {
        let pipeline = self.pipeline(device, format);
        let entries: Vec<wgpu::BindGroupEntry<'_>> = resources
            .iter()
            .zip(0u32..)
            .map(|(resource, binding)| wgpu::BindGroupEntry {
                binding,
                resource: resource.clone(),
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.name),
            layout: &self.layout,
            entries: &entries,
        });

        let color = [Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            depth_slice: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })];
        let (color_attachments, depth_stencil_attachment): (
            &[Option<wgpu::RenderPassColorAttachment<'_>>],
            Option<wgpu::RenderPassDepthStencilAttachment<'_>>,
        ) = match self.output {
            Output::Color => (&color, None),
            Output::Depth => (
                &[],
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view: target,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    // The fragment stage writes depth only.
                    stencil_ops: format.has_stencil_aspect().then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
            ),
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.name),
            color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

// ─── Mipmaps ─────────────────────────────────────────────────────────────────

pub(crate) struct MipmapBlitter {
    program: FullscreenProgram,
    sampler: wgpu::Sampler,
}

impl MipmapBlitter {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let program = FullscreenProgram::new(
            device,
            "Mipmap Blit",
            Output::Color,
            include_str!("shaders/blit.wgsl"),
            &[
                wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            ],
        );
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mipmap Blit"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self { program, sampler }
    }

    /// Renders every level from the one above it, layer by layer.
    pub(crate) fn generate(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
    ) {
        let levels = texture.mip_level_count();
        if levels < 2 {
            return;
        }
        let level_view = |level, layer, usage| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Mipmap Level"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: level,
                mip_level_count: Some(1),
                base_array_layer: layer,
                array_layer_count: Some(1),
                usage: Some(usage),
                ..Default::default()
            })
        };

        for layer in 0..texture.depth_or_array_layers() {
            for level in 1..levels {
                let source = level_view(level - 1, layer, wgpu::TextureUsages::TEXTURE_BINDING);
                let target = level_view(level, layer, wgpu::TextureUsages::RENDER_ATTACHMENT);
                self.program.draw(
                    device,
                    encoder,
                    &target,
                    texture.format(),
                    &[
                        wgpu::BindingResource::TextureView(&source),
                        wgpu::BindingResource::Sampler(&self.sampler),
                    ],
                );
            }
        }
    }
}

// ─── Depth Resolve ───────────────────────────────────────────────────────────

pub(crate) struct DepthResolver {
    program: FullscreenProgram,
}

impl DepthResolver {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        Self {
            program: FullscreenProgram::new(
                device,
                "Depth Resolve",
                Output::Depth,
                include_str!("shaders/resolve_depth.wgsl"),
                &[wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: true,
                }],
            ),
        }
    }

    /// Copies sample 0 of `source` into `destination`.
    pub(crate) fn resolve(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::Texture,
        destination: &wgpu::Texture,
    ) {
        // Depth-stencil formats bind only through a depth aspect view.
        let source = source.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Depth Resolve Source"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        let target = destination.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Depth Resolve Target"),
            ..Default::default()
        });
        self.program.draw(
            device,
            encoder,
            &target,
            destination.format(),
            &[wgpu::BindingResource::TextureView(&source)],
        );
    }
}
