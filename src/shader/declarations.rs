//! Declaration Parsing
//!
//! Turns the raw statements collected by the scanner into typed declarations.
//!
//! Value statements (`attribute`, `varying`, `uniform`) accept two spellings:
//!
//! | Form     | Example                                   |
//! |----------|-------------------------------------------|
//! | target   | `lights: array<vec4f, 8>`, `@interpolate(flat) vId: u32` |
//! | portable | `highp vec4 lights[8]`, `flat uint vId`   |
//!
//! Resource statements are `var` declarations of textures, samplers, storage
//! textures and storage buffers.

use super::error::ShaderProcessError;
use super::scanner::RawStatement;
use super::types::ValueType;
use crate::binding::format::{StorageAccess, StorageFormat, TextureSampleKind, ViewDimension};

const PRECISION_QUALIFIERS: [&str; 3] = ["highp", "mediump", "lowp"];

/// A parsed `attribute`, `varying` or `uniform` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDeclaration {
    pub name: String,
    pub ty: ValueType,
    /// `Some(n)` for array uniforms.
    pub array_len: Option<u32>,
    /// Explicit interpolation attribute, as written in the target form
    /// (`@interpolate(flat)`).
    pub interpolation: Option<String>,
    pub line: usize,
}

/// Parses a value statement. Arrays are only legal when `allow_array` is set.
pub fn parse_value(
    statement: &RawStatement,
    allow_array: bool,
) -> Result<ValueDeclaration, ShaderProcessError> {
    let parsed = if statement.text.contains(':') {
        parse_target_form(statement)?
    } else {
        parse_portable_form(statement)?
    };

    if parsed.array_len.is_some() && !allow_array {
        return Err(invalid(statement));
    }
    Ok(parsed)
}

// `[@attr ...] name: type` / `name: array<type, N>`
fn parse_target_form(statement: &RawStatement) -> Result<ValueDeclaration, ShaderProcessError> {
    let Some((lhs, rhs)) = statement.text.split_once(':') else {
        return Err(invalid(statement));
    };

    let (attributes, name) = split_attributes(lhs);
    let name = name.trim();
    if !is_identifier(name) {
        return Err(invalid(statement));
    }
    let interpolation = attributes
        .into_iter()
        .find(|attribute| attribute.starts_with("@interpolate"));

    let ty_text = rhs.trim();
    let (element, array_len) = match ty_text
        .strip_prefix("array<")
        .and_then(|inner| inner.strip_suffix('>'))
    {
        Some(inner) => {
            let Some((element, size)) = inner.rsplit_once(',') else {
                return Err(invalid(statement));
            };
            (element.trim(), Some(parse_array_size(name, size.trim())?))
        }
        None => (ty_text, None),
    };

    Ok(ValueDeclaration {
        ty: parse_type(name, element, statement.line)?,
        name: name.to_string(),
        array_len,
        interpolation,
        line: statement.line,
    })
}

// `[qualifiers] type name[N]`
fn parse_portable_form(statement: &RawStatement) -> Result<ValueDeclaration, ShaderProcessError> {
    let mut interpolation = None;
    let mut words = Vec::new();
    for word in statement.text.split(' ') {
        match word {
            "flat" => interpolation = Some("@interpolate(flat)".to_string()),
            "noperspective" => interpolation = Some("@interpolate(linear)".to_string()),
            "smooth" => interpolation = Some("@interpolate(perspective)".to_string()),
            _ if PRECISION_QUALIFIERS.contains(&word) => {}
            _ => words.push(word),
        }
    }

    let [ty_text, rest @ ..] = words.as_slice() else {
        return Err(invalid(statement));
    };
    // `weights [4]` and `weights[4]` are equivalent
    let declarator = rest.concat();
    let (name, array_len) = match declarator.split_once('[') {
        Some((name, size)) => {
            let Some(size) = size.strip_suffix(']') else {
                return Err(invalid(statement));
            };
            (name, Some(parse_array_size(name, size.trim())?))
        }
        None => (declarator.as_str(), None),
    };
    if !is_identifier(name) {
        return Err(invalid(statement));
    }

    Ok(ValueDeclaration {
        ty: parse_type(name, ty_text, statement.line)?,
        name: name.to_string(),
        array_len,
        interpolation,
        line: statement.line,
    })
}

fn parse_type(name: &str, ty: &str, line: usize) -> Result<ValueType, ShaderProcessError> {
    ValueType::parse(ty).ok_or_else(|| ShaderProcessError::UnknownType {
        name: name.to_string(),
        ty: ty.to_string(),
        line,
    })
}

fn parse_array_size(name: &str, size: &str) -> Result<u32, ShaderProcessError> {
    match size.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ShaderProcessError::InvalidArraySize {
            name: name.to_string(),
            size: size.to_string(),
        }),
    }
}

/// Splits leading `@attr` / `@attr(...)` items off `text`.
fn split_attributes(text: &str) -> (Vec<String>, &str) {
    let mut attributes = Vec::new();
    let mut rest = text.trim_start();
    while rest.starts_with('@') {
        let word_end = rest.find([' ', '(']).unwrap_or(rest.len());
        let end = if rest[word_end..].starts_with('(') {
            rest[word_end..].find(')').map_or(rest.len(), |i| word_end + i + 1)
        } else {
            word_end
        };
        attributes.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
    }
    (attributes, rest)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn invalid(statement: &RawStatement) -> ShaderProcessError {
    ShaderProcessError::InvalidDeclaration {
        text: statement.text.clone(),
        line: statement.line,
    }
}

// ─── Resources ───────────────────────────────────────────────────────────────

/// Type of a resource declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Texture {
        dimension: ViewDimension,
        sample: TextureSampleKind,
        multisampled: bool,
    },
    Sampler {
        comparison: bool,
    },
    StorageBuffer {
        read_only: bool,
        type_name: String,
    },
    StorageTexture {
        dimension: ViewDimension,
        format: StorageFormat,
        access: StorageAccess,
    },
}

/// A parsed resource `var` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDeclaration {
    pub name: String,
    pub kind: ResourceKind,
    pub line: usize,
}

/// Parses a `var` statement recognized by the scanner as a resource.
pub fn parse_resource(statement: &RawStatement) -> Result<ResourceDeclaration, ShaderProcessError> {
    let text = statement
        .text
        .strip_prefix("var")
        .ok_or_else(|| invalid(statement))?
        .trim_start();

    let (address_space, rest) = match text.strip_prefix('<') {
        Some(inner) => {
            let (space, rest) = inner.split_once('>').ok_or_else(|| invalid(statement))?;
            (Some(space), rest)
        }
        None => (None, text),
    };

    let (name, ty) = rest.split_once(':').ok_or_else(|| invalid(statement))?;
    let name = name.trim();
    let ty = ty.trim();
    if !is_identifier(name) {
        return Err(invalid(statement));
    }

    let kind = match address_space {
        Some(space) => parse_storage_buffer(space, ty).ok_or_else(|| invalid(statement))?,
        None => parse_handle_type(name, ty, statement)?,
    };

    Ok(ResourceDeclaration {
        name: name.to_string(),
        kind,
        line: statement.line,
    })
}

// `storage` / `storage, read` / `storage, read_write`
fn parse_storage_buffer(space: &str, ty: &str) -> Option<ResourceKind> {
    let mut parts = space.split(',').map(str::trim);
    if parts.next() != Some("storage") {
        return None;
    }
    let read_only = match parts.next() {
        None | Some("read") => true,
        Some("read_write") => false,
        Some(_) => return None,
    };
    Some(ResourceKind::StorageBuffer {
        read_only,
        type_name: ty.to_string(),
    })
}

fn parse_handle_type(
    name: &str,
    ty: &str,
    statement: &RawStatement,
) -> Result<ResourceKind, ShaderProcessError> {
    let unsupported = |kind: &str| ShaderProcessError::UnsupportedResource {
        name: name.to_string(),
        kind: kind.to_string(),
    };

    match ty {
        "sampler" => return Ok(ResourceKind::Sampler { comparison: false }),
        "sampler_comparison" => return Ok(ResourceKind::Sampler { comparison: true }),
        "texture_external" => return Err(unsupported("external texture")),
        _ => {}
    }
    if ty.starts_with("array<") || ty.starts_with("binding_array<") {
        return Err(unsupported("texture array binding"));
    }

    let Some(texture) = ty.strip_prefix("texture_") else {
        return Err(invalid(statement));
    };

    if let Some(storage) = texture.strip_prefix("storage_") {
        return parse_storage_texture(storage).ok_or_else(|| invalid(statement));
    }

    if let Some(depth) = texture.strip_prefix("depth_") {
        let (dimension, multisampled) = match depth {
            "multisampled_2d" => (ViewDimension::D2, true),
            shape => (
                ViewDimension::from_shader_suffix(shape).ok_or_else(|| invalid(statement))?,
                false,
            ),
        };
        if matches!(dimension, ViewDimension::D1 | ViewDimension::D3) {
            return Err(invalid(statement));
        }
        return Ok(ResourceKind::Texture {
            dimension,
            sample: TextureSampleKind::Depth,
            multisampled,
        });
    }

    // `2d<f32>`, `multisampled_2d<i32>`, `cube<uff>`
    let (shape, element) = texture
        .strip_suffix('>')
        .and_then(|t| t.split_once('<'))
        .ok_or_else(|| invalid(statement))?;
    let (dimension, multisampled) = match shape {
        "multisampled_2d" => (ViewDimension::D2, true),
        shape => (
            ViewDimension::from_shader_suffix(shape).ok_or_else(|| invalid(statement))?,
            false,
        ),
    };
    let sample = match element.trim() {
        // multisampled float textures cannot be filtered
        "f32" if multisampled => TextureSampleKind::UnfilterableFloat,
        "f32" => TextureSampleKind::Float,
        "uff" => TextureSampleKind::UnfilterableFloat,
        "i32" => TextureSampleKind::Sint,
        "u32" => TextureSampleKind::Uint,
        _ => return Err(invalid(statement)),
    };

    Ok(ResourceKind::Texture {
        dimension,
        sample,
        multisampled,
    })
}

// `2d<rgba8unorm, write>`
fn parse_storage_texture(storage: &str) -> Option<ResourceKind> {
    let (shape, params) = storage.strip_suffix('>')?.split_once('<')?;
    let dimension = ViewDimension::from_shader_suffix(shape)?;
    if matches!(dimension, ViewDimension::Cube | ViewDimension::CubeArray) {
        return None;
    }
    let (format, access) = params.split_once(',')?;
    Some(ResourceKind::StorageTexture {
        dimension,
        format: StorageFormat::from_shader_name(format.trim())?,
        access: StorageAccess::from_shader_name(access.trim())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::types::ScalarKind;

    fn raw(text: &str) -> RawStatement {
        RawStatement {
            text: text.to_string(),
            line: 7,
        }
    }

    #[test]
    fn both_forms_agree() {
        let portable = parse_value(&raw("highp vec4 lights[8]"), true).unwrap();
        let target = parse_value(&raw("lights: array<vec4f, 8>"), true).unwrap();
        assert_eq!(portable, target);
        assert_eq!(portable.array_len, Some(8));
    }

    #[test]
    fn interpolation_qualifiers_are_kept() {
        let flat = parse_value(&raw("flat uint vId"), false).unwrap();
        assert_eq!(flat.interpolation.as_deref(), Some("@interpolate(flat)"));
        assert_eq!(flat.ty.scalar(), ScalarKind::U32);

        let target = parse_value(&raw("@interpolate(perspective, centroid) vUv: vec2f"), false)
            .unwrap();
        assert_eq!(
            target.interpolation.as_deref(),
            Some("@interpolate(perspective, centroid)")
        );
        assert_eq!(target.name, "vUv");
    }

    #[test]
    fn non_numeric_array_size_fails() {
        assert_eq!(
            parse_value(&raw("vec4 bones[MAX_BONES]"), true),
            Err(ShaderProcessError::InvalidArraySize {
                name: "bones".into(),
                size: "MAX_BONES".into()
            })
        );
        assert!(matches!(
            parse_value(&raw("bones: array<mat4x4f, N>"), true),
            Err(ShaderProcessError::InvalidArraySize { .. })
        ));
    }

    #[test]
    fn arrays_rejected_where_not_allowed() {
        assert!(matches!(
            parse_value(&raw("vec4 weights[2]"), false),
            Err(ShaderProcessError::InvalidDeclaration { line: 7, .. })
        ));
    }

    #[test]
    fn unknown_type_reports_line() {
        assert_eq!(
            parse_value(&raw("color: vec5f"), false),
            Err(ShaderProcessError::UnknownType {
                name: "color".into(),
                ty: "vec5f".into(),
                line: 7
            })
        );
    }

    #[test]
    fn texture_parameters() {
        let tex = parse_resource(&raw("var envMap: texture_cube<f32>")).unwrap();
        assert_eq!(
            tex.kind,
            ResourceKind::Texture {
                dimension: ViewDimension::Cube,
                sample: TextureSampleKind::Float,
                multisampled: false
            }
        );

        let ms = parse_resource(&raw("var scene: texture_multisampled_2d<f32>")).unwrap();
        assert!(matches!(
            ms.kind,
            ResourceKind::Texture {
                sample: TextureSampleKind::UnfilterableFloat,
                multisampled: true,
                ..
            }
        ));

        let depth = parse_resource(&raw("var shadow: texture_depth_2d_array")).unwrap();
        assert!(matches!(
            depth.kind,
            ResourceKind::Texture {
                dimension: ViewDimension::D2Array,
                sample: TextureSampleKind::Depth,
                ..
            }
        ));
    }

    #[test]
    fn storage_resources() {
        let buffer = parse_resource(&raw("var<storage, read_write> particles: array<vec4f>")).unwrap();
        assert_eq!(
            buffer.kind,
            ResourceKind::StorageBuffer {
                read_only: false,
                type_name: "array<vec4f>".into()
            }
        );
        let default_access = parse_resource(&raw("var<storage> data: array<u32>")).unwrap();
        assert!(matches!(
            default_access.kind,
            ResourceKind::StorageBuffer { read_only: true, .. }
        ));

        let image = parse_resource(&raw("var outImage: texture_storage_2d<rgba8unorm, write>")).unwrap();
        assert_eq!(
            image.kind,
            ResourceKind::StorageTexture {
                dimension: ViewDimension::D2,
                format: StorageFormat::Rgba8Unorm,
                access: StorageAccess::Write
            }
        );
    }

    #[test]
    fn external_texture_is_rejected() {
        assert_eq!(
            parse_resource(&raw("var video: texture_external")),
            Err(ShaderProcessError::UnsupportedResource {
                name: "video".into(),
                kind: "external texture".into()
            })
        );
    }
}
