//! GPU device tests
//!
//! Tests for:
//! - Draw recording: pipeline, bind groups, dynamic offsets, buffers
//! - Pipeline reuse across draws and frames
//! - Indirect draw slots
//! - Uniform ring exhaustion and growth
//! - Back buffer passes, depth resolve and mipmap generation
//! - Upload ordering
//! - Buffer read-back
//! - Compute dispatch
//! - Device loss and restore

use std::rc::Rc;
use std::sync::Arc;

use futures::FutureExt;
use glam::Vec4;
use wgpu::util::DrawIndexedIndirectArgs;

use bindery::binding::{BindBuffer, BindGroup, BindStorage, GpuBuffer, TextureDesc};
use bindery::device::{
    Command, DispatchCall, DrawCall, DrawRange, GpuDevice, IndexBufferBinding, RecordingBackend,
    RenderPassDesc, VertexBufferBinding, Workgroups,
};
use bindery::pipeline::{BlendState, RenderState, VertexDataType, VertexElementDesc, VertexFormat};
use bindery::shader::{Semantic, Shader, ShaderDefinition, UniformStaging};
use bindery::{BinderyError, DeviceSettings};

// ============================================================================
// Helpers
// ============================================================================

const VERTEX: &str = "\
uniform vec4 color;
attribute vec3 vertex_position;
varying vec4 vColor;

@vertex
fn vertexMain(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4f(vertex_position, 1.0);
    output.vColor = uniform.color;
    return output;
}
";

const FRAGMENT: &str = "\
varying vec4 vColor;

@fragment
fn fragmentMain(input: FragmentInput) -> FragmentOutput {
    var output: FragmentOutput;
    output.color = input.vColor;
    return output;
}
";

const COMPUTE: &str = "\
uniform uint count;
var<storage, read_write> values: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3u) {
    if (id.x >= uniform.count) {
        return;
    }
    values[id.x] = values[id.x] * 2.0;
}
";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn device_with(settings: DeviceSettings) -> GpuDevice<RecordingBackend> {
    init_logging();
    GpuDevice::new(RecordingBackend::new(), settings)
}

fn device() -> GpuDevice<RecordingBackend> {
    device_with(DeviceSettings::default())
}

fn unlit(device: &mut GpuDevice<RecordingBackend>) -> Shader {
    device.create_shader(
        &ShaderDefinition::render("unlit", VERTEX, FRAGMENT)
            .with_attribute("vertex_position", Semantic::Position),
    )
}

/// Everything a mesh draw of the unlit shader binds.
struct Scene {
    shader: Shader,
    vertex_format: Arc<VertexFormat>,
    vertices: GpuBuffer<RecordingBackend>,
    indices: GpuBuffer<RecordingBackend>,
    view: BindGroup<RecordingBackend>,
    material: BindGroup<RecordingBackend>,
    mesh: BindGroup<RecordingBackend>,
    uniforms: UniformStaging,
}

impl Scene {
    fn new(device: &mut GpuDevice<RecordingBackend>) -> Self {
        let shader = unlit(device);
        let processed = Arc::clone(shader.processed().unwrap());
        let vertex_format = device
            .create_vertex_format(
                &[VertexElementDesc::new(Semantic::Position, 3, VertexDataType::Float32)],
                None,
                false,
            )
            .unwrap();
        let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let vertices = device.create_buffer_with_data(
            "Positions",
            wgpu::BufferUsages::VERTEX,
            bytemuck::cast_slice(&positions),
        );
        let indices = device.create_buffer_with_data(
            "Indices",
            wgpu::BufferUsages::INDEX,
            bytemuck::cast_slice(&[0u16, 1, 2, 0]),
        );

        let empty = device.empty_bind_group_format();
        let mut view = BindGroup::new(Arc::clone(&empty));
        let mut material = BindGroup::new(empty);
        device.update_bind_group(&mut view, &[], &[], &[]);
        device.update_bind_group(&mut material, &[], &[], &[]);

        let mut mesh = BindGroup::new(Arc::clone(&processed.mesh_bind_group_format));
        device.prepare_mesh_bind_group(&mut mesh, &processed.mesh_uniform_format, &[], &[]);

        let mut uniforms = UniformStaging::new(Arc::clone(&processed.mesh_uniform_format));
        assert!(uniforms.set_vec4("color", Vec4::new(1.0, 0.5, 0.25, 1.0)));

        Self {
            shader,
            vertex_format,
            vertices,
            indices,
            view,
            material,
            mesh,
            uniforms,
        }
    }

    /// Rebuilds every group against the device's current backend.
    fn refresh(&mut self, device: &mut GpuDevice<RecordingBackend>) {
        let processed = Arc::clone(self.shader.processed().unwrap());
        device.update_bind_group(&mut self.view, &[], &[], &[]);
        device.update_bind_group(&mut self.material, &[], &[], &[]);
        device.prepare_mesh_bind_group(&mut self.mesh, &processed.mesh_uniform_format, &[], &[]);
    }

    fn draw(&self, range: DrawRange) -> DrawCall<'_, RecordingBackend> {
        DrawCall {
            vertex_buffers: [
                Some(VertexBufferBinding {
                    format: &self.vertex_format,
                    buffer: &self.vertices,
                }),
                None,
            ],
            index_buffer: Some(IndexBufferBinding {
                buffer: &self.indices,
                format: wgpu::IndexFormat::Uint16,
                offset: 0,
            }),
            bind_groups: [Some(&self.view), Some(&self.material), Some(&self.mesh)],
            mesh_uniforms: Some(&self.uniforms),
            ..DrawCall::new(&self.shader, range)
        }
    }
}

const TRIANGLE: DrawRange = DrawRange::Direct {
    first: 0,
    count: 3,
    base_vertex: 0,
};

fn count(commands: &[Command], matches: impl Fn(&Command) -> bool) -> usize {
    commands.iter().filter(|c| matches(c)).count()
}

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn mesh_offsets(commands: &[Command]) -> Vec<Vec<u32>> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::SetBindGroup { index: 2, offsets, .. } => Some(offsets.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Draws
// ============================================================================

#[test]
fn draw_records_pipeline_groups_and_buffers() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    device.backend().take_commands();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.end_render_pass();

    let commands = device.backend().pass_commands();
    assert!(matches!(commands[0], Command::SetPipeline(_)));
    assert!(commands.contains(&Command::SetBindGroup {
        index: 0,
        group: scene.view.raw().unwrap().id(),
        offsets: Vec::new(),
    }));
    assert!(commands.contains(&Command::SetBindGroup {
        index: 2,
        group: scene.mesh.raw().unwrap().id(),
        offsets: vec![0],
    }));
    assert!(commands.contains(&Command::SetVertexBuffer {
        slot: 0,
        buffer: scene.vertices.raw().id(),
        offset: 0,
    }));
    assert!(commands.contains(&Command::SetIndexBuffer {
        buffer: scene.indices.raw().id(),
        offset: 0,
        format: wgpu::IndexFormat::Uint16,
    }));
    assert_eq!(
        commands.last(),
        Some(&Command::DrawIndexed {
            indices: 0..3,
            base_vertex: 0,
            instances: 0..1,
        })
    );
}

#[test]
fn each_draw_gets_its_own_uniform_offset() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    let alignment = device.uniform_ring().alignment() as u32;
    device.backend().take_commands();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    for _ in 0..3 {
        device.draw(&scene.draw(TRIANGLE)).unwrap();
    }
    device.end_render_pass();

    let offsets = mesh_offsets(&device.backend().pass_commands());
    assert_eq!(offsets, vec![vec![0], vec![alignment], vec![2 * alignment]]);

    // Staged bytes reach the ring on submit.
    device.submit();
    let ring = *device.uniform_ring().buffer().raw();
    let contents = device.backend().buffer_contents(ring).unwrap();
    let start = alignment as usize;
    let color: Vec<f32> = words(&contents[start..start + 16])
        .into_iter()
        .map(f32::from_bits)
        .collect();
    assert_eq!(color, [1.0, 0.5, 0.25, 1.0]);
}

#[test]
fn redundant_state_is_not_rebound() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    device.backend().take_commands();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.end_render_pass();

    let commands = device.backend().pass_commands();
    assert_eq!(count(&commands, |c| matches!(c, Command::SetPipeline(_))), 1);
    assert_eq!(
        count(&commands, |c| matches!(c, Command::SetBindGroup { index: 0, .. })),
        1
    );
    assert_eq!(count(&commands, |c| matches!(c, Command::SetVertexBuffer { .. })), 1);
    // The mesh group moves to a new offset every draw.
    assert_eq!(
        count(&commands, |c| matches!(c, Command::SetBindGroup { index: 2, .. })),
        2
    );
}

#[test]
fn pipelines_are_reused_across_draws_and_frames() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);

    for _ in 0..3 {
        device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
        device.draw(&scene.draw(TRIANGLE)).unwrap();
        device.end_render_pass();
        device.present();
        device.frame_start().unwrap();
    }
    assert_eq!(device.render_pipeline_count(), 1);
    assert_eq!(device.shader_module_count(), 2);

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let blended = DrawCall {
        state: RenderState {
            blend: BlendState::ALPHA,
            ..RenderState::default()
        },
        ..scene.draw(TRIANGLE)
    };
    device.draw(&blended).unwrap();
    device.end_render_pass();

    assert_eq!(device.render_pipeline_count(), 2);
    let created = count(&device.backend().commands(), |c| {
        matches!(c, Command::CreateRenderPipeline { .. })
    });
    assert_eq!(created, 2);
}

#[test]
fn failed_shaders_cannot_draw() {
    let mut device = device();
    device.frame_start().unwrap();
    let broken = device.create_shader(
        &ShaderDefinition::render(
            "broken",
            VERTEX,
            FRAGMENT.replace("varying vec4 vColor;", "varying vec4 vNormal;"),
        )
        .with_attribute("vertex_position", Semantic::Position),
    );
    assert!(broken.is_failed());

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let result = device.draw(&DrawCall::new(&broken, TRIANGLE));
    assert!(matches!(
        result,
        Err(BinderyError::ShaderUnavailable { ref name }) if name == "broken"
    ));
    device.end_render_pass();
    assert_eq!(device.render_pipeline_count(), 0);
}

#[test]
#[should_panic(expected = "no matching pass")]
fn drawing_outside_a_pass_panics() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    let _ = device.draw(&scene.draw(TRIANGLE));
}

#[test]
#[should_panic(expected = "pass already open")]
fn nested_render_passes_panic() {
    let mut device = device();
    device.frame_start().unwrap();
    device.start_render_pass(&RenderPassDesc::new("outer")).unwrap();
    let _ = device.start_render_pass(&RenderPassDesc::new("inner"));
}

#[test]
#[should_panic(expected = "submit while a pass is open")]
fn submitting_inside_a_pass_panics() {
    let mut device = device();
    device.frame_start().unwrap();
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.submit();
}

#[test]
#[should_panic(expected = "used before update")]
fn unrealized_bind_groups_panic() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    let fresh = BindGroup::new(Arc::clone(scene.view.format()));

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let call = DrawCall {
        bind_groups: [Some(&fresh), Some(&scene.material), Some(&scene.mesh)],
        ..scene.draw(TRIANGLE)
    };
    let _ = device.draw(&call);
}

// ============================================================================
// Indirect Draws
// ============================================================================

#[test]
fn indirect_slots_increase_and_reset_each_frame() {
    let mut device = device();
    device.frame_start().unwrap();

    let a = device.get_indirect_draw_slot(4).unwrap();
    let b = device.get_indirect_draw_slot(2).unwrap();
    let c = device.get_indirect_draw_slot(1).unwrap();
    assert_eq!((a.first, a.count), (0, 4));
    assert_eq!((b.first, b.count), (4, 2));
    assert_eq!(c.first, 6);

    device.frame_start().unwrap();
    assert_eq!(device.get_indirect_draw_slot(1).unwrap().first, 0);
}

#[test]
fn exhausted_indirect_slots_fail() {
    let mut device = device_with(DeviceSettings {
        indirect_draw_capacity: 8,
        ..Default::default()
    });
    device.frame_start().unwrap();

    device.get_indirect_draw_slot(6).unwrap();
    let err = device.get_indirect_draw_slot(3).unwrap_err();
    assert!(matches!(
        err,
        BinderyError::IndirectSlotsExhausted {
            requested: 3,
            used: 6,
            capacity: 8,
        }
    ));
    // The remaining slots are still available.
    assert_eq!(device.get_indirect_draw_slot(2).unwrap().first, 6);
}

#[test]
fn indirect_draws_read_their_slot() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);

    let slots = device.get_indirect_draw_slot(2).unwrap();
    device.write_indirect_args(
        slots,
        &[
            DrawIndexedIndirectArgs {
                index_count: 3,
                instance_count: 1,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            },
            DrawIndexedIndirectArgs {
                index_count: 6,
                instance_count: 2,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            },
        ],
    );

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device
        .draw(&scene.draw(DrawRange::Indirect { slots, index: 1 }))
        .unwrap();
    device.end_render_pass();

    let buffer = *device.indirect_buffer().raw();
    assert_eq!(
        device.backend().pass_commands().last(),
        Some(&Command::DrawIndexedIndirect {
            buffer: buffer.id(),
            offset: slots.byte_offset(1),
        })
    );
    let contents = device.backend().buffer_contents(buffer).unwrap();
    let second = slots.byte_offset(1) as usize;
    assert_eq!(words(&contents[second..second + 8]), [6, 2]);
}

#[test]
#[should_panic(expected = "indirect args overflow: 2 args for an allocation of 1 slots")]
fn oversized_indirect_writes_panic() {
    let mut device = device();
    device.frame_start().unwrap();
    let first = device.get_indirect_draw_slot(1).unwrap();
    let _second = device.get_indirect_draw_slot(1).unwrap();

    let args = DrawIndexedIndirectArgs {
        index_count: 3,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
    };
    device.write_indirect_args(first, &[args, args]);
}

#[test]
#[should_panic(expected = "indirect slot index 2 out of range")]
fn indirect_index_outside_the_allocation_panics() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);
    let slots = device.get_indirect_draw_slot(2).unwrap();
    let _later = device.get_indirect_draw_slot(1).unwrap();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let _ = device.draw(&scene.draw(DrawRange::Indirect { slots, index: 2 }));
}

#[test]
#[should_panic(expected = "overflows u32")]
fn direct_ranges_past_u32_max_panic() {
    let mut device = device();
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let _ = device.draw(&scene.draw(DrawRange::Direct {
        first: u32::MAX - 1,
        count: 3,
        base_vertex: 0,
    }));
}

// ============================================================================
// Uniform Ring
// ============================================================================

#[test]
fn uniform_ring_grows_at_the_next_frame() {
    let mut device = device_with(DeviceSettings {
        uniform_ring_size: 256,
        ..Default::default()
    });
    device.frame_start().unwrap();
    let mut scene = Scene::new(&mut device);
    let first_ring = device.uniform_ring().buffer().id();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    let err = device.draw(&scene.draw(TRIANGLE)).unwrap_err();
    assert!(matches!(err, BinderyError::UniformRingExhausted { .. }));
    assert!(device.uniform_ring().growth_pending());
    device.end_render_pass();

    device.frame_start().unwrap();
    assert_eq!(device.uniform_ring().capacity(), 512);
    assert_ne!(device.uniform_ring().buffer().id(), first_ring);
    assert!(!scene.mesh.references(device.uniform_ring().buffer().id()));

    scene.refresh(&mut device);
    assert!(scene.mesh.references(device.uniform_ring().buffer().id()));
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.end_render_pass();
}

#[test]
#[should_panic(expected = "stale mesh bind group")]
fn mesh_groups_must_follow_the_ring() {
    let mut device = device_with(DeviceSettings {
        uniform_ring_size: 256,
        ..Default::default()
    });
    device.frame_start().unwrap();
    let scene = Scene::new(&mut device);

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    let _ = device.draw(&scene.draw(TRIANGLE));
    device.end_render_pass();
    device.frame_start().unwrap();

    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let _ = device.draw(&scene.draw(TRIANGLE));
}

// ============================================================================
// Passes & Back Buffer
// ============================================================================

#[test]
fn back_buffer_passes_use_the_default_depth() {
    let mut device = device();
    assert!(matches!(
        device.start_render_pass(&RenderPassDesc::new("early")),
        Err(BinderyError::BackBufferUnavailable)
    ));

    device.frame_start().unwrap();
    let view = device.back_buffer().unwrap().view;
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.end_render_pass();

    let begin = device
        .backend()
        .commands()
        .into_iter()
        .find_map(|c| match c {
            Command::BeginRenderPass {
                color_views,
                depth_view,
                ..
            } => Some((color_views, depth_view)),
            _ => None,
        })
        .unwrap();
    assert_eq!(begin.0, vec![view.id()]);
    assert!(begin.1.is_some());

    device.present();
    assert!(device.back_buffer().is_none());
    assert_eq!(device.backend().commands().last(), Some(&Command::Present));
}

#[test]
fn default_depth_follows_the_back_buffer_size() {
    let mut device = device();
    let depth_created = |device: &GpuDevice<RecordingBackend>| {
        count(&device.backend().commands(), |c| {
            matches!(c, Command::CreateTexture { label, .. } if label == "Default Depth")
        })
    };

    device.frame_start().unwrap();
    device.frame_start().unwrap();
    assert_eq!(depth_created(&device), 1);

    device.backend().set_back_buffer_size(1024, 768);
    device.frame_start().unwrap();
    assert_eq!(depth_created(&device), 2);
    assert_eq!(device.back_buffer().map(|b| (b.width, b.height)), Some((1024, 768)));
}

#[test]
fn target_passes_resolve_depth_and_build_mipmaps() {
    let mut device = device();
    device.frame_start().unwrap();

    let attachment = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    let color = Rc::new(device.create_texture(
        TextureDesc::new_2d("Color MS", 256, 256, wgpu::TextureFormat::Rgba8Unorm, attachment)
            .with_samples(4),
    ));
    let resolve = Rc::new(device.create_texture(
        TextureDesc::new_2d("Color", 256, 256, wgpu::TextureFormat::Rgba8Unorm, attachment)
            .with_full_mips(),
    ));
    let depth = Rc::new(device.create_texture(
        TextureDesc::new_2d("Depth MS", 256, 256, wgpu::TextureFormat::Depth32Float, attachment)
            .with_samples(4),
    ));
    let depth_resolve = Rc::new(device.create_texture(TextureDesc::new_2d(
        "Depth",
        256,
        256,
        wgpu::TextureFormat::Depth32Float,
        attachment,
    )));
    let target = device
        .create_render_target(vec![color], Some(Rc::clone(&depth)))
        .with_color_resolves(vec![Some(Rc::clone(&resolve))])
        .with_depth_resolve(Rc::clone(&depth_resolve));
    assert_eq!(target.format().sample_count(), 4);
    device.backend().take_commands();

    let desc = RenderPassDesc::new("offscreen")
        .with_target(&target)
        .resolving_depth()
        .generating_mipmaps();
    device.start_render_pass(&desc).unwrap();
    device.end_render_pass();

    let commands = device.backend().take_commands();
    let end = commands
        .iter()
        .position(|c| *c == Command::EndRenderPass)
        .unwrap();
    assert_eq!(
        commands[end + 1..],
        [
            Command::ResolveDepth {
                source: depth.raw().id(),
                destination: depth_resolve.raw().id(),
            },
            Command::GenerateMipmaps {
                texture: resolve.raw().id(),
            },
        ]
    );
}

#[test]
fn uploads_are_submitted_first_newest_in_front() {
    let mut device = device();
    device.frame_start().unwrap();
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.end_render_pass();

    device.record_upload("upload a", |_, _| {});
    device.record_upload("upload b", |_, _| {});
    assert_eq!(device.submit(), 3);

    let commands = device.backend().commands();
    let command_buffer = |label: &str| {
        let encoder = commands
            .iter()
            .find_map(|c| match c {
                Command::CreateCommandEncoder { id, label: l } if l == label => Some(*id),
                _ => None,
            })
            .unwrap();
        commands
            .iter()
            .find_map(|c| match c {
                Command::Finish {
                    encoder: e,
                    command_buffer,
                } if *e == encoder => Some(*command_buffer),
                _ => None,
            })
            .unwrap()
    };
    let submitted = commands
        .iter()
        .rev()
        .find_map(|c| match c {
            Command::Submit { command_buffers } => Some(command_buffers.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        submitted,
        vec![
            command_buffer("upload b"),
            command_buffer("upload a"),
            command_buffer("Frame Encoder"),
        ]
    );
}

// ============================================================================
// Read-back
// ============================================================================

fn values_buffer(device: &GpuDevice<RecordingBackend>) -> GpuBuffer<RecordingBackend> {
    device.create_buffer_with_data(
        "Values",
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        bytemuck::cast_slice(&[1u32, 2, 3, 4]),
    )
}

#[test]
fn immediate_reads_resolve_on_return() {
    let mut device = device();
    device.frame_start().unwrap();
    let buffer = values_buffer(&device);

    let bytes = pollster::block_on(device.read_buffer(&buffer, 4, 8, true)).unwrap();
    assert_eq!(words(&bytes), [2, 3]);
}

#[test]
fn deferred_reads_resolve_after_the_next_frame_start() {
    let mut device = device();
    device.frame_start().unwrap();
    let buffer = values_buffer(&device);

    let mut read = device.read_buffer(&buffer, 0, 16, false);
    assert!((&mut read).now_or_never().is_none());

    device.frame_start().unwrap();
    let bytes = read.now_or_never().unwrap().unwrap();
    assert_eq!(words(&bytes), [1, 2, 3, 4]);
}

// ============================================================================
// Compute
// ============================================================================

#[test]
fn dispatch_records_into_the_compute_pass() {
    let mut device = device();
    device.frame_start().unwrap();
    let shader = device.create_shader(&ShaderDefinition::compute("double", COMPUTE));
    let processed = Arc::clone(shader.processed().unwrap());

    let params = device.create_buffer_with_data(
        "Params",
        wgpu::BufferUsages::UNIFORM,
        bytemuck::bytes_of(&64u32),
    );
    let values = device.create_buffer("Values", 256, wgpu::BufferUsages::STORAGE);
    let empty = device.empty_bind_group_format();
    let mut view = BindGroup::new(Arc::clone(&empty));
    let mut material = BindGroup::new(empty);
    let mut mesh = BindGroup::new(Arc::clone(&processed.mesh_bind_group_format));
    device.update_bind_group(&mut view, &[], &[], &[]);
    device.update_bind_group(&mut material, &[], &[], &[]);
    device.update_bind_group(
        &mut mesh,
        &[Some(BindBuffer::whole(&params))],
        &[],
        &[Some(BindStorage::Buffer(&values))],
    );
    device.backend().take_commands();

    let call = DispatchCall {
        shader: &shader,
        bind_groups: [Some(&view), Some(&material), Some(&mesh)],
        workgroups: Workgroups::Direct { x: 1, y: 1, z: 1 },
    };
    device.start_compute_pass("double").unwrap();
    device.dispatch(&call).unwrap();
    device.dispatch(&call).unwrap();
    device.end_compute_pass();

    let commands = device.backend().take_commands();
    assert_eq!(device.compute_pipeline_count(), 1);
    assert!(commands.contains(&Command::SetBindGroup {
        index: 2,
        group: mesh.raw().unwrap().id(),
        offsets: vec![0],
    }));
    assert_eq!(
        count(&commands, |c| *c == Command::Dispatch { x: 1, y: 1, z: 1 }),
        2
    );
}

#[test]
#[should_panic(expected = "no matching pass")]
fn dispatch_outside_a_compute_pass_panics() {
    let mut device = device();
    device.frame_start().unwrap();
    let shader = device.create_shader(&ShaderDefinition::compute("double", COMPUTE));
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    let _ = device.dispatch(&DispatchCall {
        shader: &shader,
        bind_groups: [None, None, None],
        workgroups: Workgroups::Direct { x: 1, y: 1, z: 1 },
    });
}

// ============================================================================
// Device Loss
// ============================================================================

#[test]
fn lost_devices_drop_their_objects_until_restored() {
    let mut device = device();
    device.frame_start().unwrap();
    let mut scene = Scene::new(&mut device);
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.end_render_pass();
    let buffer = values_buffer(&device);

    device.backend().lose_device();
    assert!(matches!(device.frame_start(), Err(BinderyError::DeviceLost)));
    assert!(device.is_lost());
    assert_eq!(device.render_pipeline_count(), 0);
    assert_eq!(device.shader_module_count(), 0);
    assert!(device.back_buffer().is_none());

    // Everything fails cleanly while lost.
    assert!(matches!(device.frame_start(), Err(BinderyError::DeviceLost)));
    assert!(matches!(
        device.start_render_pass(&RenderPassDesc::new("main")),
        Err(BinderyError::DeviceLost)
    ));
    assert!(matches!(
        pollster::block_on(device.read_buffer(&buffer, 0, 4, true)),
        Err(BinderyError::DeviceLost)
    ));

    device.restore(RecordingBackend::new());
    assert!(!device.is_lost());
    device.frame_start().unwrap();

    scene.vertices.recreate(device.backend());
    scene.indices.recreate(device.backend());
    scene.refresh(&mut device);
    device.start_render_pass(&RenderPassDesc::new("main")).unwrap();
    device.draw(&scene.draw(TRIANGLE)).unwrap();
    device.end_render_pass();

    assert_eq!(device.render_pipeline_count(), 1);
    let created = count(&device.backend().commands(), |c| {
        matches!(c, Command::CreateRenderPipeline { .. })
    });
    assert_eq!(created, 1);
}

#[test]
fn pending_reads_fail_on_device_loss() {
    let mut device = device();
    device.frame_start().unwrap();
    let buffer = values_buffer(&device);

    let read = device.read_buffer(&buffer, 0, 16, false);
    device.backend().lose_device();
    device.handle_device_lost();

    assert!(matches!(
        pollster::block_on(read),
        Err(BinderyError::DeviceLost)
    ));
}
