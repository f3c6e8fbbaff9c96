//! Device Settings & Capabilities
//!
//! [`DeviceSettings`] is the configuration consumed once when a
//! [`GpuDevice`](crate::device::GpuDevice) is constructed. It is plain data,
//! serializable with `serde`, so applications can keep it in their own
//! configuration files.
//!
//! [`DeviceCaps`] describes the limits reported by the backend. Shader
//! processing reads it (for example to size the fragment output struct) and it
//! is refreshed whenever the device is recreated.
//!
//! # Example
//!
//! ```rust,ignore
//! use bindery::settings::DeviceSettings;
//!
//! let settings = DeviceSettings {
//!     indirect_draw_capacity: 4096,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AdapterPreference
// ---------------------------------------------------------------------------

/// GPU adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdapterPreference {
    /// Prefer an integrated GPU.
    LowPower,
    /// Prefer a discrete GPU.
    #[default]
    HighPerformance,
}

impl AdapterPreference {
    #[inline]
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            Self::LowPower => wgpu::PowerPreference::LowPower,
            Self::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceSettings
// ---------------------------------------------------------------------------

/// Configuration for device initialization.
///
/// # Fields
///
/// | Field                      | Description                                   | Default           |
/// |----------------------------|-----------------------------------------------|-------------------|
/// | `indirect_draw_capacity`   | Indirect draw slots available per frame       | `1024`            |
/// | `uniform_ring_size`        | Initial dynamic uniform ring size (bytes)     | `1 MiB`           |
/// | `vertex_entry_point`       | Vertex stage entry function                   | `"vertexMain"`    |
/// | `fragment_entry_point`     | Fragment stage entry function                 | `"fragmentMain"`  |
/// | `compute_entry_point`      | Compute stage entry function                  | `"main"`          |
/// | `diagnostic_context_lines` | Source lines shown around compiler messages   | `3`               |
/// | `adapter_preference`       | GPU adapter selection strategy                | `HighPerformance` |
/// | `downlevel_limits`         | Request WebGL2-compatible limits              | `false`           |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Number of `DrawIndexedIndirectArgs` slots in the per-frame indirect buffer.
    ///
    /// The buffer is never grown mid-frame; requesting more slots than this
    /// fails with [`BinderyError::IndirectSlotsExhausted`](crate::errors::BinderyError).
    pub indirect_draw_capacity: u32,

    /// Initial size in bytes of the dynamic uniform ring used for mesh uniforms.
    pub uniform_ring_size: u64,

    /// Name of the vertex entry function in processed shaders.
    pub vertex_entry_point: String,

    /// Name of the fragment entry function in processed shaders.
    pub fragment_entry_point: String,

    /// Name of the compute entry function in processed shaders.
    pub compute_entry_point: String,

    /// Lines of source printed before and after a compiler diagnostic.
    pub diagnostic_context_lines: usize,

    /// GPU adapter selection preference.
    pub adapter_preference: AdapterPreference,

    /// Request downlevel (WebGL2-compatible) limits instead of the defaults.
    pub downlevel_limits: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            indirect_draw_capacity: 1024,
            uniform_ring_size: 1 << 20,
            vertex_entry_point: "vertexMain".to_string(),
            fragment_entry_point: "fragmentMain".to_string(),
            compute_entry_point: "main".to_string(),
            diagnostic_context_lines: 3,
            adapter_preference: AdapterPreference::default(),
            downlevel_limits: false,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceCaps
// ---------------------------------------------------------------------------

/// Device limits relevant to binding and pipeline creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Maximum simultaneous color attachments in a render pass.
    pub max_color_attachments: u32,
    /// Maximum sampler anisotropy.
    pub max_anisotropy: u16,
    /// Maximum bind groups in a pipeline layout.
    pub max_bind_groups: u32,
    /// Required alignment of dynamic uniform buffer offsets.
    pub min_uniform_buffer_offset_alignment: u32,
    /// Maximum width/height of a 2D texture.
    pub max_texture_dimension_2d: u32,
    /// Whether `@builtin(primitive_index)` is available to fragment shaders.
    pub supports_primitive_index: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self::from_limits(&wgpu::Limits::default(), wgpu::Features::empty())
    }
}

impl DeviceCaps {
    #[must_use]
    pub fn from_limits(limits: &wgpu::Limits, features: wgpu::Features) -> Self {
        Self {
            max_color_attachments: limits.max_color_attachments,
            max_anisotropy: 16,
            max_bind_groups: limits.max_bind_groups,
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
            supports_primitive_index: features.contains(wgpu::Features::PRIMITIVE_INDEX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: DeviceSettings =
            serde_json::from_str(r#"{ "indirect_draw_capacity": 16 }"#).unwrap();
        assert_eq!(settings.indirect_draw_capacity, 16);
        assert_eq!(settings.vertex_entry_point, "vertexMain");
        assert_eq!(settings.adapter_preference, AdapterPreference::HighPerformance);
    }

    #[test]
    fn default_caps_follow_wgpu_limits() {
        let caps = DeviceCaps::default();
        assert_eq!(
            caps.max_color_attachments,
            wgpu::Limits::default().max_color_attachments
        );
        assert!(!caps.supports_primitive_index);
    }
}
