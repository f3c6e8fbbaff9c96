//! Shader Processing
//!
//! Turns portable shader source (implicit `uniform` / `attribute` / `varying`
//! declarations and slot-less resource declarations) into slot-addressed
//! source plus the metadata the binding layer needs.
//!
//! - [`scanner`]: line-oriented statement extraction
//! - [`declarations`]: typed parsing of extracted statements
//! - [`processor`]: the rewrite itself, producing a [`ProcessedShader`]
//! - [`definition`]: processor input and the [`Shader`] object
//! - [`uniform_format`]: uniform buffer layout and CPU staging
//! - [`diagnostics`]: compiler message formatting

pub mod codegen;
pub mod declarations;
pub mod definition;
pub mod diagnostics;
pub mod error;
pub mod processor;
pub mod scanner;
pub mod semantic;
pub mod types;
pub mod uniform_format;

pub use definition::{ProcessingOptions, Shader, ShaderDefinition, ShaderSource, ShaderState};
pub use diagnostics::{CompilerMessage, MessageKind};
pub use error::ShaderProcessError;
pub use processor::{
    BIND_GROUP_COUNT, MATERIAL_GROUP, MESH_GROUP, ProcessedShader, ProcessedStages,
    ShaderProcessor, VIEW_GROUP,
};
pub use semantic::Semantic;
pub use types::{ScalarKind, ValueType};
pub use uniform_format::{UniformBufferFormat, UniformFormat, UniformStaging};
