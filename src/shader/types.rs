//! Shader Value Types
//!
//! Closed description of the scalar, vector and matrix types that may appear
//! in `attribute`, `varying` and `uniform` declarations.
//!
//! Declarations are accepted in two spellings: the target form (`vec4f`,
//! `vec3<u32>`, `mat4x4f`) and the portable C-like form (`vec4`, `uvec3`,
//! `mat4`, `float`). Both parse to the same [`ValueType`], which always prints
//! back in the canonical target spelling.

use std::fmt;

/// Scalar component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    F32,
    I32,
    U32,
    Bool,
}

impl ScalarKind {
    #[inline]
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::I32 | Self::U32)
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::F32 => "f",
            Self::I32 => "i",
            Self::U32 => "u",
            Self::Bool => "",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::Bool => "bool",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "f32" | "float" => Some(Self::F32),
            "i32" | "int" => Some(Self::I32),
            "u32" | "uint" => Some(Self::U32),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "f" => Some(Self::F32),
            "i" => Some(Self::I32),
            "u" => Some(Self::U32),
            _ => None,
        }
    }
}

/// A declared value type.
///
/// Vector sizes and matrix dimensions are always within `2..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar(ScalarKind),
    Vector { size: u8, kind: ScalarKind },
    /// Float matrix with `columns` column vectors of `rows` components.
    Matrix { columns: u8, rows: u8 },
}

impl ValueType {
    pub const F32: Self = Self::Scalar(ScalarKind::F32);

    /// Parses either spelling. Returns `None` for anything unknown.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(kind) = ScalarKind::parse(text) {
            return Some(Self::Scalar(kind));
        }

        if let Some(rest) = text.strip_prefix("vec") {
            return parse_vector(rest, ScalarKind::F32);
        }
        if let Some(rest) = text.strip_prefix("ivec") {
            return parse_portable_vector(rest, ScalarKind::I32);
        }
        if let Some(rest) = text.strip_prefix("uvec") {
            return parse_portable_vector(rest, ScalarKind::U32);
        }
        if let Some(rest) = text.strip_prefix("bvec") {
            return parse_portable_vector(rest, ScalarKind::Bool);
        }
        if let Some(rest) = text.strip_prefix("mat") {
            return parse_matrix(rest);
        }
        None
    }

    /// Scalar kind of the components.
    #[must_use]
    pub fn scalar(self) -> ScalarKind {
        match self {
            Self::Scalar(kind) | Self::Vector { kind, .. } => kind,
            Self::Matrix { .. } => ScalarKind::F32,
        }
    }

    /// Number of scalar components (1 for scalars).
    #[must_use]
    pub fn components(self) -> u32 {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector { size, .. } => u32::from(size),
            Self::Matrix { columns, rows } => u32::from(columns) * u32::from(rows),
        }
    }

    /// Same shape with a different scalar kind. Matrices are returned as is.
    #[must_use]
    pub fn with_scalar(self, kind: ScalarKind) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(kind),
            Self::Vector { size, .. } => Self::Vector { size, kind },
            matrix @ Self::Matrix { .. } => matrix,
        }
    }

    /// Whether the type may live in a uniform buffer.
    #[must_use]
    pub fn is_host_shareable(self) -> bool {
        self.scalar() != ScalarKind::Bool
    }

    /// Alignment in the uniform address space.
    #[must_use]
    pub fn align(self) -> u32 {
        match self {
            Self::Scalar(_) => 4,
            Self::Vector { size: 2, .. } => 8,
            Self::Vector { .. } => 16,
            Self::Matrix { rows, .. } => Self::Vector { size: rows, kind: ScalarKind::F32 }.align(),
        }
    }

    /// Size in bytes in the uniform address space.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::Scalar(_) => 4,
            Self::Vector { size, .. } => 4 * u32::from(size),
            Self::Matrix { columns, rows } => {
                let column = Self::Vector { size: rows, kind: ScalarKind::F32 };
                u32::from(columns) * round_up(column.align(), column.size())
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Scalar(kind) => f.write_str(kind.name()),
            Self::Vector { size, kind: ScalarKind::Bool } => write!(f, "vec{size}<bool>"),
            Self::Vector { size, kind } => write!(f, "vec{size}{}", kind.suffix()),
            Self::Matrix { columns, rows } => write!(f, "mat{columns}x{rows}f"),
        }
    }
}

/// Rounds `value` up to a multiple of `align`.
#[inline]
#[must_use]
pub fn round_up(align: u32, value: u32) -> u32 {
    value.div_ceil(align) * align
}

fn parse_dimension(text: &str) -> Option<u8> {
    match text {
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        _ => None,
    }
}

// `vec4`, `vec4f`, `vec4<f32>`
fn parse_vector(rest: &str, default: ScalarKind) -> Option<ValueType> {
    let (size, tail) = rest.split_at_checked(1)?;
    let size = parse_dimension(size)?;
    let kind = match tail {
        "" => default,
        generic if generic.starts_with('<') => {
            ScalarKind::parse(generic.strip_prefix('<')?.strip_suffix('>')?.trim())?
        }
        suffix => ScalarKind::from_suffix(suffix)?,
    };
    Some(ValueType::Vector { size, kind })
}

// `ivec3`, `uvec2`, `bvec4`
fn parse_portable_vector(rest: &str, kind: ScalarKind) -> Option<ValueType> {
    Some(ValueType::Vector {
        size: parse_dimension(rest)?,
        kind,
    })
}

// `mat4`, `mat3x3`, `mat4x4f`, `mat2x2<f32>`
fn parse_matrix(rest: &str) -> Option<ValueType> {
    let rest = rest
        .strip_suffix("<f32>")
        .or_else(|| rest.strip_suffix('f'))
        .unwrap_or(rest);
    let (columns, rows) = match rest.split_once('x') {
        Some((c, r)) => (parse_dimension(c)?, parse_dimension(r)?),
        None => {
            let n = parse_dimension(rest)?;
            (n, n)
        }
    };
    Some(ValueType::Matrix { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_spellings_parse_to_same_type() {
        assert_eq!(ValueType::parse("vec4"), ValueType::parse("vec4f"));
        assert_eq!(ValueType::parse("vec4<f32>"), ValueType::parse("vec4f"));
        assert_eq!(ValueType::parse("uvec3"), ValueType::parse("vec3u"));
        assert_eq!(ValueType::parse("mat4"), ValueType::parse("mat4x4f"));
        assert_eq!(ValueType::parse("float"), Some(ValueType::F32));
        assert_eq!(ValueType::parse("texture_2d<f32>"), None);
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(ValueType::parse("vec2<i32>").unwrap().to_string(), "vec2i");
        assert_eq!(ValueType::parse("mat3").unwrap().to_string(), "mat3x3f");
        assert_eq!(ValueType::parse("bvec2").unwrap().to_string(), "vec2<bool>");
    }

    #[test]
    fn uniform_layout_sizes() {
        let vec3 = ValueType::parse("vec3f").unwrap();
        assert_eq!((vec3.align(), vec3.size()), (16, 12));
        let mat3 = ValueType::parse("mat3x3f").unwrap();
        assert_eq!((mat3.align(), mat3.size()), (16, 48));
        let mat2 = ValueType::parse("mat2x2f").unwrap();
        assert_eq!((mat2.align(), mat2.size()), (8, 16));
    }

    #[test]
    fn scalar_swap_keeps_shape() {
        let v = ValueType::parse("vec4f").unwrap();
        assert_eq!(v.with_scalar(ScalarKind::U32).to_string(), "vec4u");
        assert_eq!(ValueType::F32.with_scalar(ScalarKind::I32).to_string(), "i32");
    }
}
