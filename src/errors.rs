//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`BinderyError`] covers the recoverable failure modes:
//! - GPU adapter and device creation failures
//! - Shader-contract violations found while processing shader source
//! - Per-frame budget exhaustion (indirect draw slots, dynamic uniforms)
//! - Device loss
//!
//! Usage-protocol violations (nested passes, submitting inside a pass,
//! bind group slot gaps) are programming errors and panic instead.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, BinderyError>`.

use thiserror::Error;

use crate::shader::ShaderProcessError;

/// The main error type for the crate.
#[derive(Error, Debug)]
pub enum BinderyError {
    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The device was lost; every GPU object must be recreated.
    #[error("GPU device lost")]
    DeviceLost,

    /// No back buffer was acquired for this frame (surface outdated or
    /// minimized, or `frame_start` not called).
    #[error("No back buffer available for this frame")]
    BackBufferUnavailable,

    /// Mapping a buffer for read-back failed.
    #[error("Buffer map failed: {0}")]
    BufferMapFailed(String),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// Shader source violated the declaration contract.
    #[error("Shader processing failed: {0}")]
    ShaderProcessing(#[from] ShaderProcessError),

    /// The shader failed processing earlier and cannot be used for drawing.
    #[error("Shader '{name}' failed processing and cannot be used")]
    ShaderUnavailable {
        /// Shader name
        name: String,
    },

    // ========================================================================
    // Budget Errors
    // ========================================================================
    /// More indirect draw slots were requested in one frame than configured.
    #[error(
        "Indirect draw slots exhausted: requested {requested}, {used} of {capacity} already used this frame"
    )]
    IndirectSlotsExhausted {
        /// Slots requested by the failing call
        requested: u32,
        /// Slots already handed out this frame
        used: u32,
        /// Configured capacity
        capacity: u32,
    },

    /// The per-frame dynamic uniform ring ran out of space.
    #[error(
        "Dynamic uniform ring exhausted: requested {requested} bytes, {used} of {capacity} already used"
    )]
    UniformRingExhausted {
        /// Bytes requested by the failing call
        requested: u64,
        /// Bytes already allocated this frame
        used: u64,
        /// Ring capacity in bytes
        capacity: u64,
    },

    /// A vertex element cannot be expressed as a GPU vertex format.
    #[error("Vertex element '{name}' ({data_type} x{components}) is not supported by the GPU")]
    UnsupportedVertexElement {
        /// Element semantic name
        name: String,
        /// Component data type
        data_type: String,
        /// Number of components
        components: u32,
    },
}

/// Alias for `Result<T, BinderyError>`.
pub type Result<T> = std::result::Result<T, BinderyError>;
