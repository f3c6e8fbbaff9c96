//! Shader Processor
//!
//! Rewrites portable shader source into slot-addressed source and reports
//! what the shader needs from the binding layer.
//!
//! # Pipeline
//!
//! 1. Each stage is scanned independently; declarations are removed and the
//!    first one marks the insertion point for generated code.
//! 2. Uniforms from all stages are merged. Names owned by an external
//!    uniform format (view, material) stay there; the rest form the generated
//!    mesh uniform buffer. A dummy member keeps the buffer non-empty.
//! 3. Attributes get the fixed location of their semantic. Attributes bound to
//!    integer vertex data are retyped to integer vectors.
//! 4. Varyings get sequential locations in vertex declaration order; the
//!    fragment stage may only read varyings the vertex stage writes.
//! 5. Resources are paired (texture + following sampler), merged across
//!    stages, and laid out in the mesh bind group.
//! 6. `uniform.<name>` references are rewritten to the owning buffer and the
//!    generated block is spliced into each stage.
//!
//! # Bind Groups
//!
//! | Index | Name       | Owner                      |
//! |-------|------------|----------------------------|
//! | 0     | `view`     | external format (optional) |
//! | 1     | `material` | external format (optional) |
//! | 2     | `mesh`     | generated                  |

use std::sync::Arc;

use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use super::codegen::{
    self, GeneratedAttribute, GeneratedVarying, uniform_buffer_name, uniform_block,
};
use super::declarations::{
    ResourceDeclaration, ResourceKind, ValueDeclaration, parse_resource, parse_value,
};
use super::definition::{ProcessingOptions, ShaderDefinition, ShaderSource};
use super::error::ShaderProcessError;
use super::scanner::{ExtractedStage, RawStatement, extract};
use super::types::{ScalarKind, ValueType};
use super::uniform_format::UniformBufferFormat;
use crate::binding::format::{
    BindGroupFormat, BindSamplerFormat, BindStorageBufferFormat, BindStorageFormat,
    BindStorageTextureFormat, BindTextureFormat, BindUniformBufferFormat, TextureSampleKind,
};
use crate::settings::DeviceCaps;
use crate::utils::KeyInterner;

pub const VIEW_GROUP: usize = 0;
pub const MATERIAL_GROUP: usize = 1;
pub const MESH_GROUP: usize = 2;
pub const BIND_GROUP_COUNT: usize = 3;

/// Member emitted when a shader declares no local uniforms.
pub const UNUSED_UNIFORM: &str = "_unused_float_uniform";

type ProcessResult<T> = Result<T, ShaderProcessError>;

/// Final text of each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedStages {
    Render { vertex: String, fragment: String },
    Compute { compute: String },
}

/// Output of [`ShaderProcessor::process`].
#[derive(Debug, Clone)]
pub struct ProcessedShader {
    pub stages: ProcessedStages,
    /// Attribute name → shader location, for attributes with a semantic.
    pub attribute_locations: FxHashMap<String, u32>,
    pub mesh_uniform_format: Arc<UniformBufferFormat>,
    pub mesh_bind_group_format: Arc<BindGroupFormat>,
    /// Non-fatal findings (dropped attributes, missing device features).
    pub warnings: Vec<String>,
    content_key: u128,
}

impl ProcessedShader {
    /// xxh3-128 over the final stage texts.
    #[inline]
    #[must_use]
    pub fn content_key(&self) -> u128 {
        self.content_key
    }

    #[must_use]
    pub fn is_compute(&self) -> bool {
        matches!(self.stages, ProcessedStages::Compute { .. })
    }
}

/// Rewrites shader definitions against the device capabilities.
#[derive(Debug, Clone, Default)]
pub struct ShaderProcessor {
    caps: DeviceCaps,
}

impl ShaderProcessor {
    #[must_use]
    pub fn new(caps: DeviceCaps) -> Self {
        Self { caps }
    }

    #[inline]
    #[must_use]
    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    pub fn process(
        &self,
        definition: &ShaderDefinition,
        keys: &mut KeyInterner,
    ) -> ProcessResult<ProcessedShader> {
        match &definition.source {
            ShaderSource::Render { vertex, fragment } => {
                self.process_render(definition, vertex, fragment, keys)
            }
            ShaderSource::Compute { compute } => self.process_compute(definition, compute, keys),
        }
    }

    fn process_render(
        &self,
        definition: &ShaderDefinition,
        vertex: &str,
        fragment: &str,
        keys: &mut KeyInterner,
    ) -> ProcessResult<ProcessedShader> {
        let options = &definition.options;
        let mut vs = extract(vertex)?;
        let mut fs = extract(fragment)?;
        reject_statements(&fs.attributes)?;

        let bindings = resolve_bindings(
            &[&vs, &fs],
            options,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            keys,
        )?;

        let mut warnings = Vec::new();
        let (attributes, attribute_locations) =
            resolve_attributes(&vs.attributes, definition, &mut warnings)?;
        let (vertex_varyings, fragment_varyings) = resolve_varyings(&vs.varyings, &fs.varyings)?;

        vs.rewrite(|text| rewrite_uniform_refs(text, &bindings.owners));
        fs.rewrite(|text| rewrite_uniform_refs(text, &bindings.owners));

        if !inject_vertex_input_copy(&mut vs) && !attribute_locations.is_empty() {
            return Err(ShaderProcessError::MissingVertexInput);
        }

        let primitive_index = fs.body_contains(|text| text.contains(".primitiveIndex"));
        let frag_depth = fs.body_contains(|text| assigns_member(text, "fragDepth"));
        if primitive_index && !self.caps.supports_primitive_index {
            warnings.push(
                "fragment stage reads primitiveIndex but the device lacks primitive index support"
                    .to_string(),
            );
        }

        let common = binding_block(options, &bindings);

        let mut vertex_block = common.clone();
        vertex_block.push_str(&codegen::vertex_input_block(&attributes));
        vertex_block.push_str(&codegen::vertex_output_block(&vertex_varyings));

        let mut fragment_block = common;
        fragment_block.push_str(&codegen::fragment_input_block(
            &fragment_varyings,
            primitive_index,
        ));
        fragment_block.push_str(&codegen::fragment_output_block(
            self.caps.max_color_attachments,
            frag_depth,
        ));

        let vertex = vs.assemble(&vertex_block);
        let mut fragment = fs.assemble(&fragment_block);
        if primitive_index {
            fragment.insert_str(0, "enable primitive_index;\n");
        }

        let content_key = xxh3_128(format!("{vertex}\0{fragment}").as_bytes());
        Ok(ProcessedShader {
            stages: ProcessedStages::Render { vertex, fragment },
            attribute_locations,
            mesh_uniform_format: bindings.mesh_uniform_format,
            mesh_bind_group_format: bindings.mesh_bind_group_format,
            warnings,
            content_key,
        })
    }

    #[allow(clippy::unused_self)]
    fn process_compute(
        &self,
        definition: &ShaderDefinition,
        compute: &str,
        keys: &mut KeyInterner,
    ) -> ProcessResult<ProcessedShader> {
        let options = &definition.options;
        let mut cs = extract(compute)?;
        reject_statements(&cs.attributes)?;
        reject_statements(&cs.varyings)?;

        let bindings = resolve_bindings(&[&cs], options, wgpu::ShaderStages::COMPUTE, keys)?;
        cs.rewrite(|text| rewrite_uniform_refs(text, &bindings.owners));

        let compute = cs.assemble(&binding_block(options, &bindings));
        let content_key = xxh3_128(compute.as_bytes());
        Ok(ProcessedShader {
            stages: ProcessedStages::Compute { compute },
            attribute_locations: FxHashMap::default(),
            mesh_uniform_format: bindings.mesh_uniform_format,
            mesh_bind_group_format: bindings.mesh_bind_group_format,
            warnings: Vec::new(),
            content_key,
        })
    }
}

fn reject_statements(statements: &[RawStatement]) -> ProcessResult<()> {
    match statements.first() {
        Some(statement) => Err(ShaderProcessError::InvalidDeclaration {
            text: statement.text.clone(),
            line: statement.line,
        }),
        None => Ok(()),
    }
}

// ─── Uniforms & Resources ────────────────────────────────────────────────────

struct ResolvedBindings {
    /// Uniform name → owning bind group index.
    owners: FxHashMap<String, usize>,
    mesh_uniform_format: Arc<UniformBufferFormat>,
    mesh_bind_group_format: Arc<BindGroupFormat>,
}

fn resolve_bindings(
    stages: &[&ExtractedStage],
    options: &ProcessingOptions,
    visibility: wgpu::ShaderStages,
    keys: &mut KeyInterner,
) -> ProcessResult<ResolvedBindings> {
    let uniforms = merge_uniforms(stages)?;

    let mut owners = FxHashMap::default();
    for (group, format) in options.uniform_formats.iter().enumerate() {
        for uniform in format.iter().flat_map(|f| f.uniforms()) {
            owners.entry(uniform.name.clone()).or_insert(group);
        }
    }

    let mut locals = Vec::new();
    for decl in uniforms {
        let count = decl.array_len.unwrap_or(0);
        let external = options
            .uniform_formats
            .iter()
            .enumerate()
            .find_map(|(group, format)| format.as_ref()?.get(&decl.name).map(|u| (group, u)));

        match external {
            Some((group, uniform)) => {
                if uniform.ty != decl.ty || uniform.count != count {
                    return Err(ShaderProcessError::ConflictingUniformType {
                        name: decl.name,
                        first: uniform.declared_type(),
                        second: declared_type(decl.ty, decl.array_len),
                    });
                }
                log::debug!(
                    "Uniform '{}' resolved to external buffer '{}'",
                    decl.name,
                    uniform_buffer_name(group)
                );
            }
            None => {
                owners.insert(decl.name.clone(), MESH_GROUP);
                locals.push((decl.name, decl.ty, count));
            }
        }
    }

    if locals.is_empty() {
        locals.push((UNUSED_UNIFORM.to_string(), ValueType::F32, 0));
    }
    let mesh_uniform_format = Arc::new(UniformBufferFormat::new(locals)?);

    let resources = merge_resources(stages)?;
    let mesh_bind_group_format = Arc::new(mesh_bind_group_format(
        resources,
        options,
        visibility,
        keys,
    ));

    Ok(ResolvedBindings {
        owners,
        mesh_uniform_format,
        mesh_bind_group_format,
    })
}

fn declared_type(ty: ValueType, array_len: Option<u32>) -> String {
    match array_len {
        Some(n) => format!("array<{ty}, {n}>"),
        None => ty.to_string(),
    }
}

/// Deduplicated uniforms in first-declaration order.
fn merge_uniforms(stages: &[&ExtractedStage]) -> ProcessResult<Vec<ValueDeclaration>> {
    let mut merged: Vec<ValueDeclaration> = Vec::new();
    for stage in stages {
        for statement in &stage.uniforms {
            let decl = parse_value(statement, true)?;
            match merged.iter().find(|m| m.name == decl.name) {
                Some(existing) => {
                    if existing.ty != decl.ty || existing.array_len != decl.array_len {
                        return Err(ShaderProcessError::ConflictingUniformType {
                            name: decl.name,
                            first: declared_type(existing.ty, existing.array_len),
                            second: declared_type(decl.ty, decl.array_len),
                        });
                    }
                }
                None => merged.push(decl),
            }
        }
    }
    Ok(merged)
}

/// A texture with its optional sampler, or a storage resource.
#[derive(Debug, Clone)]
enum ResourceSlot {
    Texture {
        texture: ResourceDeclaration,
        sampler: Option<ResourceDeclaration>,
    },
    Storage(ResourceDeclaration),
}

impl ResourceSlot {
    fn name(&self) -> &str {
        match self {
            Self::Texture { texture, .. } => &texture.name,
            Self::Storage(decl) => &decl.name,
        }
    }

    /// Same declaration, ignoring source lines.
    fn matches(&self, other: &Self) -> bool {
        fn same(a: &ResourceDeclaration, b: &ResourceDeclaration) -> bool {
            a.name == b.name && a.kind == b.kind
        }
        match (self, other) {
            (
                Self::Texture { texture, sampler },
                Self::Texture {
                    texture: other_texture,
                    sampler: other_sampler,
                },
            ) => {
                same(texture, other_texture)
                    && match (sampler, other_sampler) {
                        (Some(a), Some(b)) => same(a, b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Self::Storage(a), Self::Storage(b)) => same(a, b),
            _ => false,
        }
    }
}

fn merge_resources(stages: &[&ExtractedStage]) -> ProcessResult<Vec<ResourceSlot>> {
    let mut merged: Vec<ResourceSlot> = Vec::new();

    for stage in stages {
        let mut slots: Vec<ResourceSlot> = Vec::new();
        for statement in &stage.resources {
            let decl = parse_resource(statement)?;
            match decl.kind {
                ResourceKind::Sampler { comparison } => {
                    let Some(ResourceSlot::Texture { texture, sampler }) = slots.last_mut() else {
                        return Err(ShaderProcessError::OrphanSampler { name: decl.name });
                    };
                    if sampler.is_some() {
                        return Err(ShaderProcessError::OrphanSampler { name: decl.name });
                    }
                    let depth = matches!(
                        texture.kind,
                        ResourceKind::Texture {
                            sample: TextureSampleKind::Depth,
                            ..
                        }
                    );
                    if comparison && !depth {
                        return Err(ShaderProcessError::UnsupportedResource {
                            name: decl.name,
                            kind: "comparison sampler on a non-depth texture".to_string(),
                        });
                    }
                    *sampler = Some(decl);
                }
                ResourceKind::Texture { .. } => slots.push(ResourceSlot::Texture {
                    texture: decl,
                    sampler: None,
                }),
                ResourceKind::StorageBuffer { .. } | ResourceKind::StorageTexture { .. } => {
                    slots.push(ResourceSlot::Storage(decl));
                }
            }
        }

        for slot in slots {
            match merged.iter().find(|m| m.name() == slot.name()) {
                Some(existing) if !existing.matches(&slot) => {
                    return Err(ShaderProcessError::ConflictingResource {
                        name: slot.name().to_string(),
                    });
                }
                Some(_) => {}
                None => merged.push(slot),
            }
        }
    }
    Ok(merged)
}

fn mesh_bind_group_format(
    resources: Vec<ResourceSlot>,
    options: &ProcessingOptions,
    visibility: wgpu::ShaderStages,
    keys: &mut KeyInterner,
) -> BindGroupFormat {
    let external = |name: &str| {
        options
            .bind_group_formats
            .iter()
            .flatten()
            .any(|format| format.entry(name).is_some())
    };

    let mut textures = Vec::new();
    let mut storage = Vec::new();
    for slot in resources {
        if external(slot.name()) {
            log::debug!("Resource '{}' is provided by an external bind group", slot.name());
            continue;
        }
        match slot {
            ResourceSlot::Texture { texture, sampler } => {
                let ResourceKind::Texture {
                    dimension,
                    sample,
                    multisampled,
                } = texture.kind
                else {
                    continue;
                };
                textures.push(BindTextureFormat {
                    name: texture.name,
                    visibility,
                    dimension,
                    sample,
                    multisampled,
                    sampler: sampler.map(|s| BindSamplerFormat {
                        comparison: matches!(s.kind, ResourceKind::Sampler { comparison: true }),
                        name: s.name,
                    }),
                });
            }
            ResourceSlot::Storage(decl) => match decl.kind {
                ResourceKind::StorageBuffer {
                    read_only,
                    type_name,
                } => storage.push(BindStorageFormat::Buffer(BindStorageBufferFormat {
                    name: decl.name,
                    visibility,
                    read_only,
                    type_name,
                })),
                ResourceKind::StorageTexture {
                    dimension,
                    format,
                    access,
                } => storage.push(BindStorageFormat::Texture(BindStorageTextureFormat {
                    name: decl.name,
                    visibility,
                    dimension,
                    format,
                    access,
                })),
                ResourceKind::Texture { .. } | ResourceKind::Sampler { .. } => {}
            },
        }
    }

    BindGroupFormat::new(
        keys,
        vec![BindUniformBufferFormat::new(
            uniform_buffer_name(MESH_GROUP),
            visibility,
        )],
        textures,
        storage,
    )
}

/// Uniform and resource declarations for every bind group.
fn binding_block(options: &ProcessingOptions, bindings: &ResolvedBindings) -> String {
    let mut out = String::new();
    for group in 0..MESH_GROUP {
        let bind_group = options.bind_group_formats[group].as_deref();
        if let Some(uniforms) = &options.uniform_formats[group] {
            let slot = bind_group
                .and_then(|format| format.entry(&uniform_buffer_name(group)))
                .map_or(0, |entry| entry.slot);
            out.push_str(&uniform_block(group, slot, uniforms));
        }
        if let Some(format) = bind_group {
            out.push_str(&codegen::resource_block(group, format));
        }
    }
    out.push_str(&uniform_block(MESH_GROUP, 0, &bindings.mesh_uniform_format));
    out.push_str(&codegen::resource_block(
        MESH_GROUP,
        &bindings.mesh_bind_group_format,
    ));
    out
}

// ─── Attributes & Varyings ───────────────────────────────────────────────────

fn resolve_attributes(
    statements: &[RawStatement],
    definition: &ShaderDefinition,
    warnings: &mut Vec<String>,
) -> ProcessResult<(Vec<GeneratedAttribute>, FxHashMap<String, u32>)> {
    let mut attributes: Vec<GeneratedAttribute> = Vec::with_capacity(statements.len());
    let mut locations = FxHashMap::default();
    let mut by_location: FxHashMap<u32, String> = FxHashMap::default();

    for statement in statements {
        let decl = parse_value(statement, false)?;
        if attributes.iter().any(|a| a.name == decl.name) {
            continue;
        }

        let Some(&semantic) = definition.attributes.get(&decl.name) else {
            let warning = format!(
                "attribute '{}' has no vertex semantic and was dropped",
                decl.name
            );
            warnings.push(warning);
            attributes.push(GeneratedAttribute {
                name: decl.name,
                ty: decl.ty,
                location: None,
            });
            continue;
        };

        let location = semantic.location();
        if let Some(first) = by_location.get(&location) {
            return Err(ShaderProcessError::DuplicateAttributeLocation {
                location,
                first: first.clone(),
                second: decl.name,
            });
        }
        by_location.insert(location, decl.name.clone());

        let mut ty = decl.ty;
        if ty.scalar() == ScalarKind::F32
            && let Some(element) = definition
                .options
                .vertex_formats
                .iter()
                .find_map(|format| format.element(semantic))
            && element.reads_as_integer()
        {
            let kind = if element.data_type.is_signed() {
                ScalarKind::I32
            } else {
                ScalarKind::U32
            };
            ty = ty.with_scalar(kind);
        }

        locations.insert(decl.name.clone(), location);
        attributes.push(GeneratedAttribute {
            name: decl.name,
            ty,
            location: Some(location),
        });
    }

    Ok((attributes, locations))
}

fn resolve_varyings(
    vertex: &[RawStatement],
    fragment: &[RawStatement],
) -> ProcessResult<(Vec<GeneratedVarying>, Vec<GeneratedVarying>)> {
    let mut outputs: Vec<GeneratedVarying> = Vec::with_capacity(vertex.len());
    for statement in vertex {
        let decl = parse_value(statement, false)?;
        if outputs.iter().any(|v| v.name == decl.name) {
            continue;
        }
        let interpolation = decl.interpolation.or_else(|| {
            decl.ty
                .scalar()
                .is_integer()
                .then(|| "@interpolate(flat)".to_string())
        });
        outputs.push(GeneratedVarying {
            location: outputs.len() as u32,
            name: decl.name,
            ty: decl.ty,
            interpolation,
        });
    }

    let mut inputs: Vec<GeneratedVarying> = Vec::with_capacity(fragment.len());
    for statement in fragment {
        let decl = parse_value(statement, false)?;
        let Some(output) = outputs.iter().find(|v| v.name == decl.name) else {
            return Err(ShaderProcessError::MissingVarying { name: decl.name });
        };
        if !inputs.iter().any(|v| v.name == decl.name) {
            inputs.push(output.clone());
        }
    }

    Ok((outputs, inputs))
}

// ─── Text Rewrites ───────────────────────────────────────────────────────────

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrites `uniform.<name>` to `<buffer>.<name>` for every known name.
fn rewrite_uniform_refs(text: &str, owners: &FxHashMap<String, usize>) -> String {
    const PREFIX: &str = "uniform.";

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut from = 0;
    while let Some(rel) = text[from..].find(PREFIX) {
        let at = from + rel;
        from = at + PREFIX.len();

        let standalone = text[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !is_ident_char(c) && c != '.');
        if !standalone {
            continue;
        }
        let name_len = text[from..]
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(text.len() - from);
        let Some(&group) = owners.get(&text[from..from + name_len]) else {
            continue;
        };

        out.push_str(&text[copied..at]);
        out.push_str(&uniform_buffer_name(group));
        out.push('.');
        copied = from;
    }
    out.push_str(&text[copied..]);
    out
}

/// Whether `text` assigns to `.member` (`=`, not `==`).
fn assigns_member(text: &str, member: &str) -> bool {
    let needle = format!(".{member}");
    text.match_indices(&needle).any(|(at, _)| {
        let rest = &text[at + needle.len()..];
        if rest.starts_with(is_ident_char) {
            return false;
        }
        let rest = rest.trim_start();
        rest.starts_with('=') && !rest.starts_with("==")
    })
}

/// Inserts `_copy_vertex_input(<param>);` at the top of the function taking
/// a `VertexInput` parameter.
fn inject_vertex_input_copy(stage: &mut ExtractedStage) -> bool {
    if let Some(tail) = inject_copy_call(&stage.tail) {
        stage.tail = tail;
        return true;
    }
    if let Some(head) = inject_copy_call(&stage.head) {
        stage.head = head;
        return true;
    }
    false
}

fn inject_copy_call(text: &str) -> Option<String> {
    const TYPE: &str = "VertexInput";

    let mut from = 0;
    while let Some(rel) = text[from..].find(TYPE) {
        let at = from + rel;
        from = at + TYPE.len();
        if text[from..].starts_with(is_ident_char) {
            continue;
        }
        let Some(before) = text[..at].trim_end().strip_suffix(':') else {
            continue;
        };
        let before = before.trim_end();
        let param_start = before
            .char_indices()
            .rev()
            .find(|&(_, c)| !is_ident_char(c))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let param = &before[param_start..];
        if param.is_empty() {
            continue;
        }

        let brace = from + text[from..].find('{')?;
        let mut out = String::with_capacity(text.len() + 48);
        out.push_str(&text[..=brace]);
        out.push_str("\n    _copy_vertex_input(");
        out.push_str(param);
        out.push_str(");");
        out.push_str(&text[brace + 1..]);
        return Some(out);
    }
    None
}
