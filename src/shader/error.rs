use thiserror::Error;

/// Shader-contract violations detected while processing shader source.
///
/// A shader that fails processing is kept as a failed shader object carrying
/// this diagnostic; the device refuses to draw with it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderProcessError {
    /// The fragment stage reads a varying the vertex stage never writes.
    #[error(
        "Fragment shader requires varying '{name}' but the vertex shader does not generate it"
    )]
    MissingVarying { name: String },

    /// The same uniform name resolves to different types.
    #[error("Uniform '{name}' is declared with conflicting types: '{first}' and '{second}'")]
    ConflictingUniformType {
        name: String,
        first: String,
        second: String,
    },

    /// Array length is not a statically known integer.
    #[error("Uniform '{name}' has an invalid array size '{size}'")]
    InvalidArraySize { name: String, size: String },

    /// Array element type cannot be laid out with a 16-byte stride.
    #[error(
        "Uniform array '{name}' of '{element}' is not 16-byte aligned; use a vec4-sized element type"
    )]
    UnalignedUniformArray { name: String, element: String },

    /// Type name not recognized.
    #[error("Declaration '{name}' (line {line}) uses unknown type '{ty}'")]
    UnknownType { name: String, ty: String, line: usize },

    /// Statement could not be parsed.
    #[error("Invalid declaration at line {line}: '{text}'")]
    InvalidDeclaration { text: String, line: usize },

    /// Resource declared with different parameters in two places.
    #[error("Resource '{name}' is declared with conflicting parameters")]
    ConflictingResource { name: String },

    /// A sampler declaration that does not directly follow a texture.
    #[error("Sampler '{name}' must immediately follow the texture it samples")]
    OrphanSampler { name: String },

    /// Resource kind not supported by this layer.
    #[error("Resource '{name}' of kind '{kind}' is not supported")]
    UnsupportedResource { name: String, kind: String },

    /// Two attributes resolve to the same shader location.
    #[error("Attributes '{first}' and '{second}' are both mapped to location {location}")]
    DuplicateAttributeLocation {
        location: u32,
        first: String,
        second: String,
    },

    /// Attributes are declared but the vertex entry takes no `VertexInput`.
    #[error("Vertex shader declares attributes but no entry function takes a 'VertexInput' parameter")]
    MissingVertexInput,
}
