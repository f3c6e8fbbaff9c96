//! Shader processor tests
//!
//! Tests for:
//! - Mesh uniform buffer and mesh bind group derivation
//! - Attribute locations, dropping and integer retyping
//! - Varying validation
//! - External uniform and bind group formats
//! - Resource pairing and rejection of unsupported resources
//! - Failed shaders

use std::sync::Arc;

use bindery::binding::{
    BindGroupFormat, BindTextureFormat, BindUniformBufferFormat, BindingKind, TextureSampleKind,
    ViewDimension,
};
use bindery::pipeline::{VertexDataType, VertexElementDesc, VertexFormat};
use bindery::shader::processor::UNUSED_UNIFORM;
use bindery::shader::{
    MATERIAL_GROUP, ProcessedShader, ProcessedStages, ProcessingOptions, Semantic, Shader,
    ShaderDefinition, ShaderProcessError, ShaderProcessor, UniformBufferFormat, VIEW_GROUP,
    ValueType,
};
use bindery::{BinderyError, DeviceCaps, KeyInterner};

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

fn processor() -> ShaderProcessor {
    ShaderProcessor::new(DeviceCaps::default())
}

fn process(definition: &ShaderDefinition) -> Result<ProcessedShader, ShaderProcessError> {
    let mut keys = KeyInterner::new();
    processor().process(definition, &mut keys)
}

fn stages(processed: &ProcessedShader) -> (&str, &str) {
    match &processed.stages {
        ProcessedStages::Render { vertex, fragment } => (vertex, fragment),
        ProcessedStages::Compute { .. } => panic!("expected a render shader"),
    }
}

fn position_format(keys: &mut KeyInterner) -> Arc<VertexFormat> {
    Arc::new(
        VertexFormat::new(
            keys,
            &[VertexElementDesc::new(Semantic::Position, 3, VertexDataType::Float32)],
            None,
            false,
        )
        .unwrap(),
    )
}

// ============================================================================
// Mesh Uniforms & Bind Group
// ============================================================================

#[test]
fn color_and_position_scenario() {
    let mut keys = KeyInterner::new();
    let options = ProcessingOptions {
        vertex_formats: [position_format(&mut keys)].into_iter().collect(),
        ..Default::default()
    };
    let definition = ShaderDefinition::render("unlit", VERTEX, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position)
        .with_options(options);

    let processed = processor().process(&definition, &mut keys).unwrap();

    let uniforms = processed.mesh_uniform_format.uniforms();
    assert_eq!(uniforms.len(), 1);
    assert_eq!(uniforms[0].name, "color");
    assert_eq!(uniforms[0].ty, ValueType::parse("vec4f").unwrap());
    assert_eq!(uniforms[0].count, 0);

    let format = &processed.mesh_bind_group_format;
    assert_eq!(format.entries().len(), 1);
    assert_eq!(format.buffer_count(), 1);
    assert!(matches!(
        format.entries()[0].kind,
        BindingKind::UniformBuffer { dynamic_offset: true }
    ));

    assert_eq!(
        processed.attribute_locations.get("vertex_position"),
        Some(&Semantic::Position.location())
    );
    assert!(processed.warnings.is_empty());
}

#[test]
fn generated_code_is_spliced_into_both_stages() {
    let definition = ShaderDefinition::render("unlit", VERTEX, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position);
    let processed = process(&definition).unwrap();
    let (vertex, fragment) = stages(&processed);

    assert!(vertex.contains("@location(0) vertex_position: vec3f"));
    assert!(vertex.contains("_copy_vertex_input(input);"));
    assert!(vertex.contains("output.vColor = ub_mesh.color;"));
    assert!(vertex.contains("@group(2) @binding(0) var<uniform> ub_mesh: struct_ub_mesh;"));
    assert!(fragment.contains("@location(0) vColor: vec4f"));
    assert!(!vertex.contains("uniform vec4 color;"));
}

#[test]
fn formatting_differences_keep_format_keys() {
    let spaced = "\
// mesh tint
uniform   vec4   color ;

attribute vec3 vertex_position;
/* interpolated */
varying vec4 vColor;

@vertex
fn vertexMain(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4f(vertex_position, 1.0);
    output.vColor = uniform.color;
    return output;
}
";
    let mut keys = KeyInterner::new();
    let a = processor()
        .process(
            &ShaderDefinition::render("a", VERTEX, FRAGMENT)
                .with_attribute("vertex_position", Semantic::Position),
            &mut keys,
        )
        .unwrap();
    let b = processor()
        .process(
            &ShaderDefinition::render("b", spaced, FRAGMENT)
                .with_attribute("vertex_position", Semantic::Position),
            &mut keys,
        )
        .unwrap();

    assert_eq!(a.mesh_bind_group_format.key(), b.mesh_bind_group_format.key());
    assert_eq!(a.mesh_bind_group_format.id(), b.mesh_bind_group_format.id());
    assert_eq!(a.mesh_uniform_format, b.mesh_uniform_format);
}

#[test]
fn shader_without_uniforms_gets_a_placeholder() {
    let vertex = "\
@vertex
fn vertexMain(@builtin(vertex_index) index: u32) -> @builtin(position) vec4f {
    return vec4f(0.0, 0.0, 0.0, 1.0);
}
";
    let fragment = "\
@fragment
fn fragmentMain() -> @location(0) vec4f {
    return vec4f(1.0);
}
";
    let processed = process(&ShaderDefinition::render("empty", vertex, fragment)).unwrap();
    let uniforms = processed.mesh_uniform_format.uniforms();
    assert_eq!(uniforms.len(), 1);
    assert_eq!(uniforms[0].name, UNUSED_UNIFORM);
    assert_eq!(processed.mesh_bind_group_format.buffer_count(), 1);
}

#[test]
fn uniform_arrays_need_numeric_sizes() {
    let vertex = VERTEX.replace("uniform vec4 color;", "uniform vec4 color;\nuniform mat4 bones[MAX_BONES];");
    let err = process(
        &ShaderDefinition::render("skinned", vertex, FRAGMENT)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap_err();
    assert!(matches!(err, ShaderProcessError::InvalidArraySize { ref name, .. } if name == "bones"));
}

#[test]
fn stages_must_agree_on_uniform_types() {
    let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying vec4 vColor;\nuniform vec3 color;");
    let err = process(
        &ShaderDefinition::render("conflict", VERTEX, fragment)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ShaderProcessError::ConflictingUniformType { ref name, .. } if name == "color"
    ));
}

// ============================================================================
// Attributes & Varyings
// ============================================================================

#[test]
fn integer_vertex_data_retypes_float_attributes() {
    let vertex = "\
attribute vec3 vertex_position;
attribute vec4 vertex_color;
varying vec4 vColor;

@vertex
fn vertexMain(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = vec4f(vertex_position, 1.0);
    output.vColor = vec4f(vertex_color) / 255.0;
    return output;
}
";
    let mut keys = KeyInterner::new();
    let format = VertexFormat::new(
        &mut keys,
        &[
            VertexElementDesc::new(Semantic::Position, 3, VertexDataType::Float32),
            VertexElementDesc::new(Semantic::Color, 4, VertexDataType::Uint8),
        ],
        None,
        false,
    )
    .unwrap();
    let options = ProcessingOptions {
        vertex_formats: [Arc::new(format)].into_iter().collect(),
        ..Default::default()
    };
    let definition = ShaderDefinition::render("colored", vertex, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position)
        .with_attribute("vertex_color", Semantic::Color)
        .with_options(options);

    let processed = processor().process(&definition, &mut keys).unwrap();
    let (vertex, _) = stages(&processed);
    assert!(vertex.contains("@location(4) vertex_color: vec4u"));
    assert!(vertex.contains("var<private> vertex_color: vec4u;"));
    assert!(vertex.contains("@location(0) vertex_position: vec3f"));
}

#[test]
fn normalized_integer_data_stays_float() {
    let vertex = VERTEX.replace(
        "attribute vec3 vertex_position;",
        "attribute vec3 vertex_position;\nattribute vec4 vertex_color;",
    );
    let mut keys = KeyInterner::new();
    let format = VertexFormat::new(
        &mut keys,
        &[VertexElementDesc::new(Semantic::Color, 4, VertexDataType::Uint8).normalized()],
        None,
        false,
    )
    .unwrap();
    let options = ProcessingOptions {
        vertex_formats: [Arc::new(format)].into_iter().collect(),
        ..Default::default()
    };
    let definition = ShaderDefinition::render("normalized", vertex, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position)
        .with_attribute("vertex_color", Semantic::Color)
        .with_options(options);

    let processed = processor().process(&definition, &mut keys).unwrap();
    assert!(stages(&processed).0.contains("@location(4) vertex_color: vec4f"));
}

#[test]
fn unmapped_attributes_are_dropped_with_a_warning() {
    let vertex = VERTEX.replace(
        "attribute vec3 vertex_position;",
        "attribute vec3 vertex_position;\nattribute vec2 vertex_texCoord9;",
    );
    let processed = process(
        &ShaderDefinition::render("dropped", vertex, FRAGMENT)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap();

    assert!(!processed.attribute_locations.contains_key("vertex_texCoord9"));
    assert_eq!(processed.warnings.len(), 1);
    assert!(processed.warnings[0].contains("vertex_texCoord9"));
    // The body may still reference the name.
    assert!(stages(&processed).0.contains("var<private> vertex_texCoord9: vec2f;"));
}

#[test]
fn two_attributes_on_one_location_fail() {
    let vertex = VERTEX.replace(
        "attribute vec3 vertex_position;",
        "attribute vec3 vertex_position;\nattribute vec3 vertex_offset;",
    );
    let err = process(
        &ShaderDefinition::render("dup", vertex, FRAGMENT)
            .with_attribute("vertex_position", Semantic::Position)
            .with_attribute("vertex_offset", Semantic::Attr0),
    )
    .unwrap_err();
    assert!(matches!(err, ShaderProcessError::DuplicateAttributeLocation { location: 0, .. }));
}

#[test]
fn fragment_varying_without_vertex_output_fails() {
    let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying vec4 vColor;\nvarying vec2 vUv0;");
    let err = process(
        &ShaderDefinition::render("missing", VERTEX, fragment)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ShaderProcessError::MissingVarying {
            name: "vUv0".to_string()
        }
    );
}

// ============================================================================
// External Formats
// ============================================================================

#[test]
fn external_uniforms_stay_in_their_buffer() {
    let mut keys = KeyInterner::new();
    let view_uniforms = UniformBufferFormat::new([(
        "matrix_viewProjection".to_string(),
        ValueType::parse("mat4x4f").unwrap(),
        0,
    )])
    .unwrap();
    let view_group = BindGroupFormat::new(
        &mut keys,
        vec![BindUniformBufferFormat::new(
            "ub_view",
            wgpu::ShaderStages::VERTEX_FRAGMENT,
        )],
        Vec::new(),
        Vec::new(),
    );
    let mut options = ProcessingOptions::default();
    options.uniform_formats[VIEW_GROUP] = Some(Arc::new(view_uniforms));
    options.bind_group_formats[VIEW_GROUP] = Some(Arc::new(view_group));

    let vertex = VERTEX
        .replace(
            "uniform vec4 color;",
            "uniform vec4 color;\nuniform mat4 matrix_viewProjection;",
        )
        .replace(
            "vec4f(vertex_position, 1.0)",
            "uniform.matrix_viewProjection * vec4f(vertex_position, 1.0)",
        );
    let definition = ShaderDefinition::render("viewed", vertex, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position)
        .with_options(options);
    let processed = processor().process(&definition, &mut keys).unwrap();

    assert!(processed.mesh_uniform_format.get("matrix_viewProjection").is_none());
    assert!(processed.mesh_uniform_format.get("color").is_some());
    let (vertex, _) = stages(&processed);
    assert!(vertex.contains("ub_view.matrix_viewProjection * vec4f"));
    assert!(vertex.contains("@group(0) @binding(0) var<uniform> ub_view: struct_ub_view;"));
}

#[test]
fn external_uniform_type_mismatch_fails() {
    let view_uniforms =
        UniformBufferFormat::new([("color".to_string(), ValueType::parse("vec3f").unwrap(), 0)])
            .unwrap();
    let mut options = ProcessingOptions::default();
    options.uniform_formats[VIEW_GROUP] = Some(Arc::new(view_uniforms));

    let err = process(
        &ShaderDefinition::render("mismatch", VERTEX, FRAGMENT)
            .with_attribute("vertex_position", Semantic::Position)
            .with_options(options),
    )
    .unwrap_err();
    assert!(matches!(err, ShaderProcessError::ConflictingUniformType { .. }));
}

#[test]
fn material_textures_are_not_duplicated_in_the_mesh_group() {
    let mut keys = KeyInterner::new();
    let material = BindGroupFormat::new(
        &mut keys,
        Vec::new(),
        vec![BindTextureFormat::new("diffuseMap", wgpu::ShaderStages::FRAGMENT)],
        Vec::new(),
    );
    let mut options = ProcessingOptions::default();
    options.bind_group_formats[MATERIAL_GROUP] = Some(Arc::new(material));

    let fragment = FRAGMENT.replace(
        "varying vec4 vColor;",
        "varying vec4 vColor;\nvar diffuseMap: texture_2d<f32>;\nvar diffuseMap_sampler: sampler;",
    );
    let definition = ShaderDefinition::render("textured", VERTEX, fragment)
        .with_attribute("vertex_position", Semantic::Position)
        .with_options(options);
    let processed = processor().process(&definition, &mut keys).unwrap();

    assert_eq!(processed.mesh_bind_group_format.texture_count(), 0);
    assert!(stages(&processed).1.contains("@group(1) @binding(0) var diffuseMap"));
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn textures_pair_with_following_samplers() {
    let fragment = FRAGMENT.replace(
        "varying vec4 vColor;",
        "varying vec4 vColor;\nvar shadowMap: texture_depth_2d;\nvar shadowMap_sampler: sampler_comparison;\nvar lut: texture_3d<u32>;",
    );
    let processed = process(
        &ShaderDefinition::render("lit", VERTEX, fragment)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap();

    let format = &processed.mesh_bind_group_format;
    let slots: Vec<(&str, u32)> = format
        .entries()
        .iter()
        .map(|entry| (entry.name.as_str(), entry.slot))
        .collect();
    assert_eq!(
        slots,
        vec![
            ("ub_mesh", 0),
            ("shadowMap", 1),
            ("shadowMap_sampler", 2),
            ("lut", 3)
        ]
    );
    assert!(matches!(
        format.entries()[3].kind,
        BindingKind::Texture {
            sample: TextureSampleKind::Uint,
            dimension: ViewDimension::D3,
            multisampled: false
        }
    ));
}

#[test]
fn external_textures_are_rejected() {
    let fragment = FRAGMENT.replace(
        "varying vec4 vColor;",
        "varying vec4 vColor;\nvar video: texture_external;",
    );
    let err = process(
        &ShaderDefinition::render("video", VERTEX, fragment)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap_err();
    assert!(matches!(err, ShaderProcessError::UnsupportedResource { ref name, .. } if name == "video"));
}

#[test]
fn sampler_without_texture_fails() {
    let fragment = FRAGMENT.replace(
        "varying vec4 vColor;",
        "varying vec4 vColor;\nvar lonely: sampler;",
    );
    let err = process(
        &ShaderDefinition::render("orphan", VERTEX, fragment)
            .with_attribute("vertex_position", Semantic::Position),
    )
    .unwrap_err();
    assert!(matches!(err, ShaderProcessError::OrphanSampler { .. }));
}

#[test]
fn compute_storage_resources_follow_uniforms() {
    let compute = "\
uniform uint count;
var<storage, read_write> particles: array<vec4f>;
var heightField: texture_storage_2d<rgba8unorm, write>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3u) {
    if (id.x >= uniform.count) {
        return;
    }
    particles[id.x] = particles[id.x] * 0.5;
}
";
    let processed = process(&ShaderDefinition::compute("particles", compute)).unwrap();
    assert!(processed.is_compute());

    let format = &processed.mesh_bind_group_format;
    assert_eq!(format.buffer_count(), 1);
    assert_eq!(format.storage_count(), 2);
    assert!(matches!(
        format.entry("particles").map(|e| &e.kind),
        Some(BindingKind::StorageBuffer { read_only: false, .. })
    ));
    assert_eq!(format.entry("heightField").map(|e| e.slot), Some(2));

    let ProcessedStages::Compute { compute } = &processed.stages else {
        panic!("expected a compute shader");
    };
    assert!(compute.contains("id.x >= ub_mesh.count"));
}

// ============================================================================
// Shader Objects
// ============================================================================

#[test]
fn failed_shaders_keep_their_error() {
    let mut keys = KeyInterner::new();
    let fragment = FRAGMENT.replace("varying vec4 vColor;", "varying vec4 vNormal;");
    let definition = ShaderDefinition::render("broken", VERTEX, fragment)
        .with_attribute("vertex_position", Semantic::Position);

    let shader = Shader::new(&definition, &processor(), &mut keys);
    assert!(shader.is_failed());
    assert!(matches!(
        shader.error(),
        Some(ShaderProcessError::MissingVarying { .. })
    ));
    assert!(matches!(
        shader.processed(),
        Err(BinderyError::ShaderUnavailable { ref name }) if name == "broken"
    ));
}

#[test]
fn identical_definitions_share_content_keys() {
    let mut keys = KeyInterner::new();
    let definition = ShaderDefinition::render("unlit", VERTEX, FRAGMENT)
        .with_attribute("vertex_position", Semantic::Position);
    let a = Shader::new(&definition, &processor(), &mut keys);
    let b = Shader::new(&definition, &processor(), &mut keys);
    assert_eq!(
        a.processed().unwrap().content_key(),
        b.processed().unwrap().content_key()
    );
}
