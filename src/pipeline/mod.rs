//! Pipelines
//!
//! - [`vertex`]: vertex formats and vertex buffer layouts
//! - [`state`]: blend / depth / stencil / rasterizer state and their keys
//! - [`hash`]: FNV-1a reduction with exact-match collision buckets
//! - [`shader_module`]: content-hashed shader modules and programs
//! - [`render`] / [`compute`]: the pipeline caches

pub mod compute;
pub mod hash;
pub mod pipeline_id;
pub mod render;
pub mod render_target;
pub mod shader_module;
pub mod state;
pub mod vertex;

pub use compute::{ComputePipelineCache, ComputePipelineRequest};
pub use pipeline_id::{ComputePipelineId, RenderPipelineId};
pub use render::{EntryPoints, RenderPipelineCache, RenderPipelineRequest};
pub use render_target::{RenderTarget, RenderTargetFormat};
pub use shader_module::{ShaderModuleCache, ShaderProgram};
pub use state::{
    BlendEquation, BlendFactor, BlendState, CompareFunc, CullMode, DepthState, FrontFace,
    PrimitiveType, RenderState, StencilOp, StencilParameters,
};
pub use vertex::{VertexDataType, VertexElementDesc, VertexFormat, VertexLayoutCache};
