//! Shader Definitions
//!
//! A [`ShaderDefinition`] is everything the processor needs: source text, the
//! attribute semantic map and the externally owned formats. Processing it
//! yields a [`Shader`], which is either ready for pipeline creation or failed
//! with a structured diagnostic. Failed shaders are kept (so the caller can
//! inspect the error) but can never be drawn with.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::error::ShaderProcessError;
use super::processor::{MESH_GROUP, ProcessedShader, ShaderProcessor};
use super::semantic::Semantic;
use super::uniform_format::UniformBufferFormat;
use crate::binding::format::BindGroupFormat;
use crate::errors::{BinderyError, Result};
use crate::pipeline::vertex::VertexFormat;
use crate::utils::KeyInterner;

/// Portable shader source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Render { vertex: String, fragment: String },
    Compute { compute: String },
}

/// Externally owned formats the processor resolves declarations against.
///
/// Index `0` is the view group and index `1` the material group; the mesh
/// group is always generated.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOptions {
    pub uniform_formats: [Option<Arc<UniformBufferFormat>>; MESH_GROUP],
    pub bind_group_formats: [Option<Arc<BindGroupFormat>>; MESH_GROUP],
    /// Formats of the vertex buffers the shader will be drawn with. Used to
    /// retype float attributes bound to integer data.
    pub vertex_formats: SmallVec<[Arc<VertexFormat>; 2]>,
}

/// Input to [`ShaderProcessor::process`].
#[derive(Debug, Clone)]
pub struct ShaderDefinition {
    pub name: String,
    pub source: ShaderSource,
    /// Attribute name → vertex semantic.
    pub attributes: FxHashMap<String, Semantic>,
    pub options: ProcessingOptions,
}

impl ShaderDefinition {
    #[must_use]
    pub fn render(
        name: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: ShaderSource::Render {
                vertex: vertex.into(),
                fragment: fragment.into(),
            },
            attributes: FxHashMap::default(),
            options: ProcessingOptions::default(),
        }
    }

    #[must_use]
    pub fn compute(name: impl Into<String>, compute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ShaderSource::Compute {
                compute: compute.into(),
            },
            attributes: FxHashMap::default(),
            options: ProcessingOptions::default(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, semantic: Semantic) -> Self {
        self.attributes.insert(name.into(), semantic);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }
}

// ─── Shader ──────────────────────────────────────────────────────────────────

/// Processing outcome of a shader.
#[derive(Debug, Clone)]
pub enum ShaderState {
    Ready(Arc<ProcessedShader>),
    Failed(ShaderProcessError),
}

/// A processed shader, ready or failed.
#[derive(Debug, Clone)]
pub struct Shader {
    name: String,
    state: ShaderState,
}

impl Shader {
    /// Processes `definition`. Failures are logged and kept on the shader.
    pub fn new(
        definition: &ShaderDefinition,
        processor: &ShaderProcessor,
        keys: &mut KeyInterner,
    ) -> Self {
        let state = match processor.process(definition, keys) {
            Ok(processed) => {
                for warning in &processed.warnings {
                    log::warn!("Shader '{}': {warning}", definition.name);
                }
                ShaderState::Ready(Arc::new(processed))
            }
            Err(err) => {
                log::error!("Shader '{}' failed processing: {err}", definition.name);
                ShaderState::Failed(err)
            }
        };
        Self {
            name: definition.name.clone(),
            state,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> &ShaderState {
        &self.state
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ShaderState::Failed(_))
    }

    #[must_use]
    pub fn error(&self) -> Option<&ShaderProcessError> {
        match &self.state {
            ShaderState::Failed(err) => Some(err),
            ShaderState::Ready(_) => None,
        }
    }

    /// The processed output, or [`BinderyError::ShaderUnavailable`] for a
    /// failed shader.
    pub fn processed(&self) -> Result<&Arc<ProcessedShader>> {
        match &self.state {
            ShaderState::Ready(processed) => Ok(processed),
            ShaderState::Failed(_) => Err(BinderyError::ShaderUnavailable {
                name: self.name.clone(),
            }),
        }
    }
}
