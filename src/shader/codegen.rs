//! Generated Shader Code
//!
//! Builders for the declaration block spliced into each processed stage:
//! uniform structs and bindings, resource bindings, vertex input and
//! inter-stage structs, and the fragment output struct.

use std::fmt::Write;

use super::types::ValueType;
use super::uniform_format::UniformBufferFormat;
use crate::binding::format::{BindGroupFormat, BindingKind, SamplerBinding, TextureSampleKind};

/// Names of the bind groups, by index. Uniform buffers and structs derive
/// their names from these (`ub_view`, `struct_ub_view`).
pub const BIND_GROUP_NAMES: [&str; 3] = ["view", "material", "mesh"];

/// Name of the uniform buffer variable of a bind group.
#[must_use]
pub fn uniform_buffer_name(group: usize) -> String {
    format!("ub_{}", BIND_GROUP_NAMES[group])
}

/// `struct struct_ub_{name} { ... };` followed by its binding.
#[must_use]
pub fn uniform_block(group: usize, slot: u32, format: &UniformBufferFormat) -> String {
    let name = BIND_GROUP_NAMES[group];
    let mut out = format!("struct struct_ub_{name} {{\n");
    for uniform in format.uniforms() {
        let _ = writeln!(out, "    {}: {},", uniform.name, uniform.declared_type());
    }
    out.push_str("};\n");
    let _ = writeln!(
        out,
        "@group({group}) @binding({slot}) var<uniform> ub_{name}: struct_ub_{name};"
    );
    out
}

/// Bindings for every non-uniform-buffer entry of `format`.
#[must_use]
pub fn resource_block(group: usize, format: &BindGroupFormat) -> String {
    let mut out = String::new();
    for entry in format.entries() {
        let ty = match &entry.kind {
            BindingKind::UniformBuffer { .. } => continue,
            BindingKind::Texture {
                sample: TextureSampleKind::Depth,
                dimension,
                multisampled,
            } => {
                if *multisampled {
                    "texture_depth_multisampled_2d".to_string()
                } else {
                    format!("texture_depth_{}", dimension.shader_suffix())
                }
            }
            BindingKind::Texture {
                sample,
                dimension,
                multisampled,
            } => {
                if *multisampled {
                    format!("texture_multisampled_2d<{}>", sample.shader_element())
                } else {
                    format!(
                        "texture_{}<{}>",
                        dimension.shader_suffix(),
                        sample.shader_element()
                    )
                }
            }
            BindingKind::Sampler(SamplerBinding::Comparison) => "sampler_comparison".to_string(),
            BindingKind::Sampler(_) => "sampler".to_string(),
            BindingKind::StorageBuffer {
                read_only,
                type_name,
            } => {
                let access = if *read_only { "read" } else { "read_write" };
                let _ = writeln!(
                    out,
                    "@group({group}) @binding({}) var<storage, {access}> {}: {type_name};",
                    entry.slot, entry.name
                );
                continue;
            }
            BindingKind::StorageTexture {
                dimension,
                format,
                access,
            } => format!(
                "texture_storage_{}<{}, {}>",
                dimension.shader_suffix(),
                format.shader_name(),
                access.shader_name()
            ),
        };
        let _ = writeln!(
            out,
            "@group({group}) @binding({}) var {}: {ty};",
            entry.slot, entry.name
        );
    }
    out
}

// ─── Stage Interfaces ────────────────────────────────────────────────────────

/// An attribute as it appears in the generated vertex input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAttribute {
    pub name: String,
    pub ty: ValueType,
    /// `None` for attributes without a vertex semantic; they only get a
    /// zero-initialised mirror.
    pub location: Option<u32>,
}

/// `VertexInput` struct, private mirrors and the `_copy_vertex_input` helper.
#[must_use]
pub fn vertex_input_block(attributes: &[GeneratedAttribute]) -> String {
    let mut out = String::from("struct VertexInput {\n");
    for attribute in attributes {
        if let Some(location) = attribute.location {
            let _ = writeln!(
                out,
                "    @location({location}) {}: {},",
                attribute.name, attribute.ty
            );
        }
    }
    out.push_str("    @builtin(vertex_index) vertexIndex: u32,\n");
    out.push_str("    @builtin(instance_index) instanceIndex: u32,\n");
    out.push_str("};\n");

    for attribute in attributes {
        let _ = writeln!(out, "var<private> {}: {};", attribute.name, attribute.ty);
    }
    out.push_str("var<private> pcVertexIndex: u32;\n");
    out.push_str("var<private> pcInstanceIndex: u32;\n");

    out.push_str("fn _copy_vertex_input(input: VertexInput) {\n");
    for attribute in attributes.iter().filter(|a| a.location.is_some()) {
        let _ = writeln!(out, "    {0} = input.{0};", attribute.name);
    }
    out.push_str("    pcVertexIndex = input.vertexIndex;\n");
    out.push_str("    pcInstanceIndex = input.instanceIndex;\n");
    out.push_str("}\n");
    out
}

/// An inter-stage value with its assigned location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVarying {
    pub name: String,
    pub ty: ValueType,
    pub location: u32,
    pub interpolation: Option<String>,
}

fn varying_field(out: &mut String, varying: &GeneratedVarying) {
    let interpolation = varying
        .interpolation
        .as_deref()
        .map(|i| format!("{i} "))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "    @location({}) {interpolation}{}: {},",
        varying.location, varying.name, varying.ty
    );
}

/// `VertexOutput` with user varyings followed by the clip position.
#[must_use]
pub fn vertex_output_block(varyings: &[GeneratedVarying]) -> String {
    let mut out = String::from("struct VertexOutput {\n");
    for varying in varyings {
        varying_field(&mut out, varying);
    }
    out.push_str("    @builtin(position) position: vec4f,\n");
    out.push_str("};\n");
    out
}

/// `FragmentInput` with user varyings followed by the fragment built-ins.
#[must_use]
pub fn fragment_input_block(varyings: &[GeneratedVarying], primitive_index: bool) -> String {
    let mut out = String::from("struct FragmentInput {\n");
    for varying in varyings {
        varying_field(&mut out, varying);
    }
    out.push_str("    @builtin(position) position: vec4f,\n");
    out.push_str("    @builtin(front_facing) frontFacing: bool,\n");
    out.push_str("    @builtin(sample_index) sampleIndex: u32,\n");
    if primitive_index {
        out.push_str("    @builtin(primitive_index) primitiveIndex: u32,\n");
    }
    out.push_str("};\n");
    out
}

/// `FragmentOutput` with `color`, `color1`, ... and an optional depth output.
#[must_use]
pub fn fragment_output_block(color_count: u32, frag_depth: bool) -> String {
    let mut out = String::from("struct FragmentOutput {\n");
    for i in 0..color_count {
        let suffix = if i == 0 { String::new() } else { i.to_string() };
        let _ = writeln!(out, "    @location({i}) color{suffix}: vec4f,");
    }
    if frag_depth {
        out.push_str("    @builtin(frag_depth) fragDepth: f32,\n");
    }
    out.push_str("};\n");
    out
}
