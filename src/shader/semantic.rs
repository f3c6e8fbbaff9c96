//! Vertex Attribute Semantics
//!
//! Every semantic owns a fixed shader location, so vertex buffers and shaders
//! built independently agree on `@location` numbers without negotiation.
//! Generic `Attr*` semantics alias the low locations and are meant for shaders
//! that do not use the named ones.

use std::fmt;
use std::str::FromStr;

/// Semantic meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Position,
    Normal,
    BlendWeight,
    BlendIndices,
    Color,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
    Tangent,
    Attr0,
    Attr1,
    Attr2,
    Attr3,
    Attr4,
    Attr5,
    Attr6,
    Attr7,
    Attr8,
    Attr9,
    Attr10,
    Attr11,
    Attr12,
    Attr13,
    Attr14,
    Attr15,
}

impl Semantic {
    /// The shader location reserved for this semantic.
    #[must_use]
    pub fn location(self) -> u32 {
        match self {
            Self::Position | Self::Attr0 => 0,
            Self::Normal | Self::Attr1 => 1,
            Self::BlendWeight | Self::Attr2 => 2,
            Self::BlendIndices | Self::Attr3 => 3,
            Self::Color | Self::Attr4 => 4,
            Self::TexCoord0 | Self::Attr5 => 5,
            Self::TexCoord1 | Self::Attr6 => 6,
            Self::TexCoord2 | Self::Attr7 => 7,
            Self::TexCoord3 | Self::Attr8 => 8,
            Self::TexCoord4 | Self::Attr9 => 9,
            Self::TexCoord5 | Self::Attr10 => 10,
            Self::TexCoord6 | Self::Attr11 => 11,
            Self::TexCoord7 | Self::Attr12 => 12,
            Self::Tangent | Self::Attr13 => 13,
            Self::Attr14 => 14,
            Self::Attr15 => 15,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Normal => "NORMAL",
            Self::BlendWeight => "BLENDWEIGHT",
            Self::BlendIndices => "BLENDINDICES",
            Self::Color => "COLOR",
            Self::TexCoord0 => "TEXCOORD0",
            Self::TexCoord1 => "TEXCOORD1",
            Self::TexCoord2 => "TEXCOORD2",
            Self::TexCoord3 => "TEXCOORD3",
            Self::TexCoord4 => "TEXCOORD4",
            Self::TexCoord5 => "TEXCOORD5",
            Self::TexCoord6 => "TEXCOORD6",
            Self::TexCoord7 => "TEXCOORD7",
            Self::Tangent => "TANGENT",
            Self::Attr0 => "ATTR0",
            Self::Attr1 => "ATTR1",
            Self::Attr2 => "ATTR2",
            Self::Attr3 => "ATTR3",
            Self::Attr4 => "ATTR4",
            Self::Attr5 => "ATTR5",
            Self::Attr6 => "ATTR6",
            Self::Attr7 => "ATTR7",
            Self::Attr8 => "ATTR8",
            Self::Attr9 => "ATTR9",
            Self::Attr10 => "ATTR10",
            Self::Attr11 => "ATTR11",
            Self::Attr12 => "ATTR12",
            Self::Attr13 => "ATTR13",
            Self::Attr14 => "ATTR14",
            Self::Attr15 => "ATTR15",
        }
    }

    /// All semantics, in declaration order.
    pub const ALL: [Self; 30] = [
        Self::Position,
        Self::Normal,
        Self::BlendWeight,
        Self::BlendIndices,
        Self::Color,
        Self::TexCoord0,
        Self::TexCoord1,
        Self::TexCoord2,
        Self::TexCoord3,
        Self::TexCoord4,
        Self::TexCoord5,
        Self::TexCoord6,
        Self::TexCoord7,
        Self::Tangent,
        Self::Attr0,
        Self::Attr1,
        Self::Attr2,
        Self::Attr3,
        Self::Attr4,
        Self::Attr5,
        Self::Attr6,
        Self::Attr7,
        Self::Attr8,
        Self::Attr9,
        Self::Attr10,
        Self::Attr11,
        Self::Attr12,
        Self::Attr13,
        Self::Attr14,
        Self::Attr15,
    ];
}

impl fmt::Display for Semantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a semantic name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSemantic(pub String);

impl fmt::Display for UnknownSemantic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown vertex semantic '{}'", self.0)
    }
}

impl std::error::Error for UnknownSemantic {}

impl FromStr for Semantic {
    type Err = UnknownSemantic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|semantic| semantic.name() == s)
            .ok_or_else(|| UnknownSemantic(s.to_string()))
    }
}
