//! Device
//!
//! - [`backend`]: the [`GpuBackend`] seam and its pass encoder traits
//! - [`wgpu_backend`]: the wgpu implementation
//! - [`recording`]: a headless backend that logs every call
//! - [`frame`]: encoder / pass state machine and the pending submit queue
//! - [`tracked_pass`]: redundant state filtering inside a render pass
//! - [`indirect`]: per-frame indirect draw slots
//! - [`uniform_ring`]: per-frame dynamic uniform ring
//! - [`readback`]: asynchronous buffer read-back
//! - [`gpu_device`]: the device tying all of the above together

pub mod backend;
mod blit;
pub mod frame;
pub mod gpu_device;
pub mod indirect;
pub mod readback;
pub mod recording;
pub mod tracked_pass;
pub mod uniform_ring;
pub mod wgpu_backend;

pub use backend::{BackBuffer, ComputePassEncoder, GpuBackend, RenderPassEncoder};
pub use frame::{FrameController, FrameState};
pub use gpu_device::{
    DEFAULT_DEPTH_FORMAT, DispatchCall, DrawCall, DrawRange, GpuDevice, IndexBufferBinding,
    RenderPassDesc, VertexBufferBinding, Workgroups,
};
pub use indirect::{IndirectDrawBuffer, IndirectSlots};
pub use readback::ReadbackReceiver;
pub use recording::{Command, RecordedHandle, RecordingBackend};
pub use tracked_pass::TrackedRenderPass;
pub use uniform_ring::UniformRing;
pub use wgpu_backend::WgpuBackend;
