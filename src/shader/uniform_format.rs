//! Uniform Buffer Layout
//!
//! [`UniformBufferFormat`] lays out a list of uniform declarations with the
//! uniform address space rules, so the generated struct and the CPU-side byte
//! image agree on every offset:
//!
//! - scalars align to 4, `vec2` to 8, `vec3`/`vec4` to 16
//! - matrices are arrays of column vectors (`mat3x3f` is three padded `vec3f`)
//! - array elements use a stride that is a multiple of 16; element types with
//!   a smaller stride are rejected
//! - the total size is rounded up to 16
//!
//! [`UniformStaging`] is a CPU byte image of one buffer that typed values are
//! written into before upload.

use std::sync::Arc;

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use super::error::ShaderProcessError;
use super::types::{ValueType, round_up};

/// One member of a uniform buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformFormat {
    pub name: String,
    pub ty: ValueType,
    /// Array length; `0` when the member is not an array.
    pub count: u32,
    pub offset: u32,
    pub byte_size: u32,
}

impl UniformFormat {
    /// Distance between array elements, or the member size for non-arrays.
    #[must_use]
    pub fn stride(&self) -> u32 {
        if self.count == 0 {
            self.byte_size
        } else {
            self.byte_size / self.count
        }
    }

    /// Type as written in a struct member (`array<vec4f, 8>` for arrays).
    #[must_use]
    pub fn declared_type(&self) -> String {
        if self.count == 0 {
            self.ty.to_string()
        } else {
            format!("array<{}, {}>", self.ty, self.count)
        }
    }
}

/// Ordered members and total size of a uniform buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBufferFormat {
    uniforms: Vec<UniformFormat>,
    byte_size: u32,
}

impl UniformBufferFormat {
    /// Lays out `(name, type, count)` triples in order. `count == 0` marks a
    /// non-array member.
    pub fn new(
        members: impl IntoIterator<Item = (String, ValueType, u32)>,
    ) -> Result<Self, ShaderProcessError> {
        let mut uniforms = Vec::new();
        let mut cursor = 0u32;

        for (name, ty, count) in members {
            let element = round_up(ty.align(), ty.size());
            let (align, byte_size) = if count == 0 {
                (ty.align(), ty.size())
            } else {
                if element % 16 != 0 {
                    return Err(ShaderProcessError::UnalignedUniformArray {
                        name,
                        element: ty.to_string(),
                    });
                }
                (round_up(16, ty.align()), element * count)
            };

            let offset = round_up(align, cursor);
            cursor = offset + byte_size;
            uniforms.push(UniformFormat {
                name,
                ty,
                count,
                offset,
                byte_size,
            });
        }

        Ok(Self {
            uniforms,
            byte_size: round_up(16, cursor),
        })
    }

    #[inline]
    #[must_use]
    pub fn uniforms(&self) -> &[UniformFormat] {
        &self.uniforms
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UniformFormat> {
        self.uniforms.iter().find(|uniform| uniform.name == name)
    }

    /// Total size in bytes, a multiple of 16.
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }
}

// ─── Staging ─────────────────────────────────────────────────────────────────

/// CPU byte image of one uniform buffer.
#[derive(Debug, Clone)]
pub struct UniformStaging {
    format: Arc<UniformBufferFormat>,
    data: Vec<u8>,
}

impl UniformStaging {
    #[must_use]
    pub fn new(format: Arc<UniformBufferFormat>) -> Self {
        let data = vec![0; format.byte_size() as usize];
        Self { format, data }
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> &Arc<UniformBufferFormat> {
        &self.format
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Writes raw plain-old-data at the member's offset.
    ///
    /// Returns `false` (and leaves the image untouched) when the member does
    /// not exist or `value` does not fit it.
    pub fn set<T: Pod>(&mut self, name: &str, value: &T) -> bool {
        self.write(name, 0, bytemuck::bytes_of(value))
    }

    /// Writes one element of an array member.
    pub fn set_element<T: Pod>(&mut self, name: &str, index: u32, value: &T) -> bool {
        let Some(uniform) = self.format.get(name) else {
            log::warn!("Uniform '{name}' does not exist in this buffer");
            return false;
        };
        if index >= uniform.count.max(1) {
            log::warn!(
                "Uniform '{name}' index {index} out of range (count {})",
                uniform.count
            );
            return false;
        }
        let offset = index * uniform.stride();
        self.write(name, offset, bytemuck::bytes_of(value))
    }

    pub fn set_f32(&mut self, name: &str, value: f32) -> bool {
        self.set(name, &value)
    }

    pub fn set_u32(&mut self, name: &str, value: u32) -> bool {
        self.set(name, &value)
    }

    pub fn set_i32(&mut self, name: &str, value: i32) -> bool {
        self.set(name, &value)
    }

    pub fn set_vec2(&mut self, name: &str, value: Vec2) -> bool {
        self.set(name, &value)
    }

    pub fn set_vec3(&mut self, name: &str, value: Vec3) -> bool {
        self.set(name, &value)
    }

    pub fn set_vec4(&mut self, name: &str, value: Vec4) -> bool {
        self.set(name, &value)
    }

    pub fn set_mat4(&mut self, name: &str, value: &Mat4) -> bool {
        self.set(name, value)
    }

    /// Writes a 3x3 matrix with each column padded to 16 bytes.
    pub fn set_mat3(&mut self, name: &str, value: &Mat3) -> bool {
        let padded: [[f32; 4]; 3] = [
            value.x_axis.extend(0.0).to_array(),
            value.y_axis.extend(0.0).to_array(),
            value.z_axis.extend(0.0).to_array(),
        ];
        self.set(name, &padded)
    }

    fn write(&mut self, name: &str, relative: u32, bytes: &[u8]) -> bool {
        let Some(uniform) = self.format.get(name) else {
            log::warn!("Uniform '{name}' does not exist in this buffer");
            return false;
        };
        if relative as usize + bytes.len() > uniform.byte_size as usize {
            log::warn!(
                "Value of {} bytes does not fit uniform '{name}' ({} bytes)",
                bytes.len(),
                uniform.byte_size
            );
            return false;
        }
        let start = (uniform.offset + relative) as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(text: &str) -> ValueType {
        ValueType::parse(text).unwrap()
    }

    #[test]
    fn offsets_follow_uniform_alignment() {
        let format = UniformBufferFormat::new([
            ("a".to_string(), ty("f32"), 0),
            ("b".to_string(), ty("vec3f"), 0),
            ("c".to_string(), ty("f32"), 0),
            ("d".to_string(), ty("vec2f"), 0),
            ("e".to_string(), ty("mat3x3f"), 0),
        ])
        .unwrap();

        let offsets: Vec<u32> = format.uniforms().iter().map(|u| u.offset).collect();
        // vec3 packs with a trailing scalar
        assert_eq!(offsets, vec![0, 16, 28, 32, 48]);
        assert_eq!(format.byte_size(), 96);
    }

    #[test]
    fn arrays_use_sixteen_byte_stride() {
        let format = UniformBufferFormat::new([
            ("scale".to_string(), ty("f32"), 0),
            ("lights".to_string(), ty("vec4f"), 4),
            ("bones".to_string(), ty("mat4x4f"), 2),
        ])
        .unwrap();
        let lights = format.get("lights").unwrap();
        assert_eq!((lights.offset, lights.byte_size, lights.stride()), (16, 64, 16));
        assert_eq!(lights.declared_type(), "array<vec4f, 4>");
        assert_eq!(format.get("bones").unwrap().offset, 80);
        assert_eq!(format.byte_size(), 208);
    }

    #[test]
    fn small_array_elements_are_rejected() {
        let err = UniformBufferFormat::new([("weights".to_string(), ty("f32"), 4)]).unwrap_err();
        assert_eq!(
            err,
            ShaderProcessError::UnalignedUniformArray {
                name: "weights".into(),
                element: "f32".into()
            }
        );
    }

    #[test]
    fn staging_writes_at_offsets() {
        let format = Arc::new(
            UniformBufferFormat::new([
                ("opacity".to_string(), ty("f32"), 0),
                ("color".to_string(), ty("vec4f"), 0),
                ("normal".to_string(), ty("mat3x3f"), 0),
            ])
            .unwrap(),
        );
        let mut staging = UniformStaging::new(format);
        assert!(staging.set_f32("opacity", 0.5));
        assert!(staging.set_vec4("color", Vec4::new(1.0, 2.0, 3.0, 4.0)));
        assert!(staging.set_mat3("normal", &Mat3::IDENTITY));

        let floats: Vec<f32> = staging
            .as_bytes()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(floats[0], 0.5);
        assert_eq!(&floats[4..8], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&floats[8..12], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[12..16], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn staging_rejects_oversized_and_unknown() {
        let format =
            Arc::new(UniformBufferFormat::new([("x".to_string(), ty("f32"), 0)]).unwrap());
        let mut staging = UniformStaging::new(format);
        assert!(!staging.set_vec4("x", Vec4::ONE));
        assert!(!staging.set_f32("missing", 1.0));
        assert!(staging.as_bytes().iter().all(|&b| b == 0));
    }
}
