//! # Bindery
//!
//! The resource binding and pipeline layer of a WebGPU renderer.
//!
//! - [`shader`]: rewrites portable shader source into slot-addressed WGSL and
//!   derives the mesh bind group and uniform buffer formats from it
//! - [`binding`]: bind group formats, bind groups and the buffers and
//!   textures they reference
//! - [`pipeline`]: vertex formats, render state and the render / compute
//!   pipeline caches
//! - [`device`]: the backend seam, frame state machine, indirect draw slots,
//!   uniform ring and read-back
//!
//! ```rust,ignore
//! use bindery::{DeviceSettings, GpuDevice, RenderPassDesc, WgpuBackend};
//!
//! let settings = DeviceSettings::default();
//! let backend = pollster::block_on(WgpuBackend::request_headless(&settings, 640, 480))?;
//! let mut device = GpuDevice::new(backend, settings);
//!
//! device.frame_start()?;
//! device.start_render_pass(&RenderPassDesc::new("Main"))?;
//! device.draw(&draw_call)?;
//! device.end_render_pass();
//! device.present();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod binding;
pub mod device;
pub mod errors;
pub mod pipeline;
pub mod settings;
pub mod shader;
pub mod utils;

pub use binding::{
    BindBuffer, BindGroup, BindGroupFormat, BindStorage, BindTexture, GpuBuffer, GpuTexture,
    TextureDesc,
};
pub use device::{
    DrawCall, DrawRange, GpuBackend, GpuDevice, RecordingBackend, RenderPassDesc, WgpuBackend,
};
pub use errors::{BinderyError, Result};
pub use pipeline::{RenderState, RenderTarget, VertexFormat};
pub use settings::{DeviceCaps, DeviceSettings};
pub use shader::{Shader, ShaderDefinition, ShaderProcessor};
pub use utils::KeyInterner;
