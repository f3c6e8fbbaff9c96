//! Pipeline cache tests
//!
//! Tests for:
//! - Render pipeline reuse for equal hash inputs
//! - Key words reacting to every state field
//! - FNV-1a collisions kept apart by exact-match buckets
//! - Bind group format gaps
//! - Compute pipeline reuse
//! - Shader module and program sharing

use std::rc::Rc;
use std::sync::Arc;

use futures::executor::LocalPool;

use bindery::binding::{BindGroupFormat, LayoutCache};
use bindery::device::{Command, RecordingBackend};
use bindery::pipeline::hash::{CollisionBuckets, FNV_OFFSET_BASIS, FNV_PRIME, fnv1a_words};
use bindery::pipeline::render::RENDER_KEY_WORDS;
use bindery::pipeline::{
    BlendState, CompareFunc, ComputePipelineCache, ComputePipelineRequest, CullMode, DepthState,
    EntryPoints, FrontFace, PrimitiveType, RenderPipelineCache, RenderPipelineRequest,
    RenderTargetFormat, ShaderModuleCache, ShaderProgram, StencilParameters, VertexDataType,
    VertexElementDesc, VertexFormat, VertexLayoutCache,
};
use bindery::shader::{Semantic, ShaderDefinition, ShaderProcessor};
use bindery::{DeviceCaps, KeyInterner};

// ============================================================================
// Fixture
// ============================================================================

const VERTEX: &str = "\
attribute vec3 vertex_position;
uniform vec4 tint;

@vertex
fn vertexMain(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4f(vertex_position, 1.0);
    return output;
}
";

const FRAGMENT: &str = "\
uniform vec4 tint;

@fragment
fn fragmentMain(input: FragmentInput) -> FragmentOutput {
    var output: FragmentOutput;
    output.color = uniform.tint;
    return output;
}
";

const COMPUTE: &str = "\
var<storage, read_write> values: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3u) {
    values[id.x] = values[id.x] * 2.0;
}
";

const ENTRY_POINTS: EntryPoints<'static> = EntryPoints {
    vertex: "vertexMain",
    fragment: "fragmentMain",
};

struct Fixture {
    backend: RecordingBackend,
    keys: KeyInterner,
    pool: LocalPool,
    modules: ShaderModuleCache<RecordingBackend>,
    layouts: LayoutCache<RecordingBackend>,
    vertex_layouts: VertexLayoutCache,
    pipelines: RenderPipelineCache<RecordingBackend>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            backend: RecordingBackend::new(),
            keys: KeyInterner::new(),
            pool: LocalPool::new(),
            modules: ShaderModuleCache::new(3),
            layouts: LayoutCache::new(),
            vertex_layouts: VertexLayoutCache::new(),
            pipelines: RenderPipelineCache::new(),
        }
    }

    fn program(&mut self, name: &str, vertex: &str, fragment: &str) -> Rc<ShaderProgram<RecordingBackend>> {
        let definition = ShaderDefinition::render(name, vertex, fragment)
            .with_attribute("vertex_position", Semantic::Position);
        let processed = ShaderProcessor::new(DeviceCaps::default())
            .process(&definition, &mut self.keys)
            .unwrap();
        let program = self.modules.program(
            &self.backend,
            &mut self.keys,
            name,
            &processed,
            &self.pool.spawner(),
        );
        self.pool.run_until_stalled();
        program
    }

    fn vertex_format(&mut self) -> VertexFormat {
        VertexFormat::new(
            &mut self.keys,
            &[VertexElementDesc::new(Semantic::Position, 3, VertexDataType::Float32)],
            None,
            false,
        )
        .unwrap()
    }

    fn target(&mut self) -> RenderTargetFormat {
        RenderTargetFormat::new(
            &mut self.keys,
            &[wgpu::TextureFormat::Rgba8Unorm],
            Some(wgpu::TextureFormat::Depth24PlusStencil8),
            1,
        )
    }

    fn mesh_format(&mut self) -> BindGroupFormat {
        BindGroupFormat::new(
            &mut self.keys,
            vec![bindery::binding::BindUniformBufferFormat::new(
                "ub_mesh",
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
            Vec::new(),
            Vec::new(),
        )
    }

    fn created_pipelines(&self) -> usize {
        self.backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateRenderPipeline { .. }))
            .count()
    }
}

fn request<'a>(
    program: &'a ShaderProgram<RecordingBackend>,
    vertex: &'a VertexFormat,
    target: &'a RenderTargetFormat,
    groups: [Option<&'a BindGroupFormat>; 3],
) -> RenderPipelineRequest<'a, RecordingBackend> {
    RenderPipelineRequest {
        program,
        primitive: PrimitiveType::Triangles,
        cull: CullMode::Back,
        front_face: FrontFace::Ccw,
        depth: DepthState::DEFAULT,
        blend: BlendState::NONE,
        stencil_front: None,
        stencil_back: None,
        vertex_formats: [Some(vertex), None],
        strip_index_format: None,
        target,
        bind_group_formats: groups,
    }
}

// ============================================================================
// Render Pipelines
// ============================================================================

#[test]
fn equal_inputs_from_distinct_objects_share_a_pipeline() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);

    // Two independently built copies of every input.
    let (vertex_a, vertex_b) = (f.vertex_format(), f.vertex_format());
    let (target_a, target_b) = (f.target(), f.target());
    let (empty_a, empty_b) = (
        BindGroupFormat::empty(&mut f.keys),
        BindGroupFormat::empty(&mut f.keys),
    );
    let (mesh_a, mesh_b) = (f.mesh_format(), f.mesh_format());

    let a = request(&program, &vertex_a, &target_a, [Some(&empty_a), Some(&empty_a), Some(&mesh_a)]);
    let b = request(&program, &vertex_b, &target_b, [Some(&empty_b), Some(&empty_b), Some(&mesh_b)]);
    assert_eq!(a.key_words(), b.key_words());

    let id_a = f.pipelines.get_or_create(&f.backend, &mut f.layouts, &mut f.vertex_layouts, ENTRY_POINTS, &a);
    let id_b = f.pipelines.get_or_create(&f.backend, &mut f.layouts, &mut f.vertex_layouts, ENTRY_POINTS, &b);

    assert_eq!(id_a, id_b);
    assert_eq!(f.pipelines.pipeline(id_a), f.pipelines.pipeline(id_b));
    assert_eq!(f.pipelines.len(), 1);
    assert_eq!(f.created_pipelines(), 1);
    assert_eq!(f.pipelines.lookup(&b), Some(id_a));
}

#[test]
fn every_state_field_changes_the_key() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();
    let empty = BindGroupFormat::empty(&mut f.keys);
    let mesh = f.mesh_format();
    let groups = [Some(&empty), Some(&empty), Some(&mesh)];

    let base = request(&program, &vertex, &target, groups).key_words();
    let variants: Vec<RenderPipelineRequest<'_, RecordingBackend>> = vec![
        RenderPipelineRequest {
            primitive: PrimitiveType::Lines,
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            cull: CullMode::None,
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            front_face: FrontFace::Cw,
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            depth: DepthState::NO_WRITE,
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            blend: BlendState::ALPHA,
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            stencil_front: Some(StencilParameters {
                func: CompareFunc::Equal,
                ..Default::default()
            }),
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            vertex_formats: [None, None],
            ..request(&program, &vertex, &target, groups)
        },
        RenderPipelineRequest {
            bind_group_formats: [Some(&empty), Some(&mesh), Some(&mesh)],
            ..request(&program, &vertex, &target, groups)
        },
    ];

    for (index, variant) in variants.iter().enumerate() {
        assert_ne!(variant.key_words(), base, "variant {index} kept the base key");
    }
}

#[test]
fn stencil_reference_is_not_part_of_the_key() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();

    let stencil = |reference| StencilParameters {
        func: CompareFunc::Equal,
        reference,
        ..Default::default()
    };
    let a = RenderPipelineRequest {
        stencil_front: Some(stencil(1)),
        ..request(&program, &vertex, &target, [None, None, None])
    };
    let b = RenderPipelineRequest {
        stencil_front: Some(stencil(7)),
        ..request(&program, &vertex, &target, [None, None, None])
    };
    assert_eq!(a.key_words(), b.key_words());
}

#[test]
fn strip_index_format_only_counts_for_strips() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();

    let list = |format| RenderPipelineRequest {
        strip_index_format: format,
        ..request(&program, &vertex, &target, [None, None, None])
    };
    assert_eq!(
        list(None).key_words(),
        list(Some(wgpu::IndexFormat::Uint16)).key_words()
    );

    let strip = |format| RenderPipelineRequest {
        primitive: PrimitiveType::TriangleStrip,
        strip_index_format: format,
        ..request(&program, &vertex, &target, [None, None, None])
    };
    assert_ne!(
        strip(Some(wgpu::IndexFormat::Uint16)).key_words(),
        strip(Some(wgpu::IndexFormat::Uint32)).key_words()
    );
}

#[test]
fn pipeline_layouts_are_shared_across_pipelines() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();
    let empty = BindGroupFormat::empty(&mut f.keys);
    let mesh = f.mesh_format();
    let groups = [Some(&empty), Some(&empty), Some(&mesh)];

    let opaque = request(&program, &vertex, &target, groups);
    let blended = RenderPipelineRequest {
        blend: BlendState::ALPHA,
        ..request(&program, &vertex, &target, groups)
    };
    f.pipelines.get_or_create(&f.backend, &mut f.layouts, &mut f.vertex_layouts, ENTRY_POINTS, &opaque);
    f.pipelines.get_or_create(&f.backend, &mut f.layouts, &mut f.vertex_layouts, ENTRY_POINTS, &blended);

    assert_eq!(f.pipelines.len(), 2);
    assert_eq!(f.layouts.pipeline_layout_count(), 1);
    assert_eq!(f.layouts.bind_group_layout_count(), 2);
    assert_eq!(f.vertex_layouts.len(), 1);
}

#[test]
#[should_panic(expected = "bind group format gap at index 1")]
fn bind_group_gaps_panic() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();
    let empty = BindGroupFormat::empty(&mut f.keys);
    let mesh = f.mesh_format();

    let gapped = request(&program, &vertex, &target, [Some(&empty), None, Some(&mesh)]);
    f.pipelines.get_or_create(&f.backend, &mut f.layouts, &mut f.vertex_layouts, ENTRY_POINTS, &gapped);
}

// ============================================================================
// Collisions
// ============================================================================

#[test]
fn crafted_collisions_keep_both_entries() {
    let mut f = Fixture::new();
    let program = f.program("unlit", VERTEX, FRAGMENT);
    let vertex = f.vertex_format();
    let target = f.target();

    let a = request(&program, &vertex, &target, [None, None, None]).key_words();
    let h = |word: u32| (FNV_OFFSET_BASIS ^ word).wrapping_mul(FNV_PRIME);
    let mut b = a;
    b[0] = PrimitiveType::Points as u32;
    b[1] = a[1] ^ h(a[0]) ^ h(b[0]);
    assert_ne!(a, b);
    assert_eq!(fnv1a_words(&a), fnv1a_words(&b));

    let mut buckets: CollisionBuckets<RENDER_KEY_WORDS, &str> = CollisionBuckets::new();
    assert_eq!(*buckets.get_or_insert_with(&a, || "triangles"), "triangles");
    assert_eq!(*buckets.get_or_insert_with(&b, || "points"), "points");
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets.bucket_count(), 1);
    assert_eq!(buckets.get(&a), Some(&"triangles"));
    assert_eq!(buckets.get(&b), Some(&"points"));
}

#[test]
fn hash_is_order_sensitive() {
    assert_ne!(fnv1a_words(&[1, 2, 3]), fnv1a_words(&[3, 2, 1]));
    assert_eq!(fnv1a_words(&[]), FNV_OFFSET_BASIS);
}

// ============================================================================
// Compute Pipelines & Programs
// ============================================================================

#[test]
fn compute_pipelines_are_cached_per_program_and_layout() {
    let mut f = Fixture::new();
    let definition = ShaderDefinition::compute("double", COMPUTE);
    let processed = ShaderProcessor::new(DeviceCaps::default())
        .process(&definition, &mut f.keys)
        .unwrap();
    let program = f.modules.program(
        &f.backend,
        &mut f.keys,
        "double",
        &processed,
        &f.pool.spawner(),
    );
    let empty = BindGroupFormat::empty(&mut f.keys);
    let mesh = Arc::clone(&processed.mesh_bind_group_format);

    let mut cache = ComputePipelineCache::<RecordingBackend>::new();
    let request = ComputePipelineRequest {
        program: &program,
        bind_group_formats: [Some(&empty), Some(&empty), Some(mesh.as_ref())],
    };
    let a = cache.get_or_create(&f.backend, &mut f.layouts, "main", &request);
    let b = cache.get_or_create(&f.backend, &mut f.layouts, "main", &request);
    assert_eq!(a, b);
    assert_eq!(cache.len(), 1);

    let without_mesh = ComputePipelineRequest {
        program: &program,
        bind_group_formats: [Some(&empty), None, None],
    };
    let c = cache.get_or_create(&f.backend, &mut f.layouts, "main", &without_mesh);
    assert_ne!(a, c);
    assert_eq!(cache.len(), 2);
}

#[test]
fn identical_shader_text_compiles_once() {
    let mut f = Fixture::new();
    let a = f.program("first", VERTEX, FRAGMENT);
    let b = f.program("second", VERTEX, FRAGMENT);
    assert_eq!(a.id(), b.id());
    assert_eq!(f.modules.module_count(), 2);
    assert_eq!(f.modules.program_count(), 1);

    let other = FRAGMENT.replace("uniform.tint", "uniform.tint * 0.5");
    let c = f.program("third", VERTEX, &other);
    assert_ne!(a.id(), c.id());
    // The vertex stage text is unchanged and reuses its module.
    assert_eq!(f.modules.module_count(), 3);
}
