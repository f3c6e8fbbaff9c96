//! Vertex Formats
//!
//! [`VertexFormat`] describes how vertex elements are laid out in one vertex
//! buffer, either interleaved (one stride for all elements) or planar (each
//! element in its own contiguous block). It carries an interned rendering id
//! that pipeline lookups use in place of the full description.
//!
//! [`VertexLayoutCache`] turns up to two formats into owned
//! `wgpu::VertexBufferLayout` descriptions, keyed by `"{hash0}-{hash1}"`.
//! Attribute shader locations come from each element's [`Semantic`].

use std::fmt::Write;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{BinderyError, Result};
use crate::shader::Semantic;
use crate::utils::KeyInterner;

// ─── Element Types ───────────────────────────────────────────────────────────

/// Stored component type of a vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexDataType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float16,
}

impl VertexDataType {
    const SIZES: [u32; 8] = [1, 1, 2, 2, 4, 4, 4, 2];

    /// Size of one component in bytes.
    #[inline]
    #[must_use]
    pub fn size(self) -> u32 {
        Self::SIZES[self as usize]
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::Float32 | Self::Float16)
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Float32 => "float32",
            Self::Float16 => "float16",
        }
    }
}

/// Caller description of one vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElementDesc {
    pub semantic: Semantic,
    pub components: u32,
    pub data_type: VertexDataType,
    /// Integer data is read as normalized floats.
    pub normalize: bool,
    /// Explicit byte offset, for externally laid out buffers.
    pub offset: Option<u32>,
    /// Explicit byte stride, for externally laid out buffers.
    pub stride: Option<u32>,
}

impl VertexElementDesc {
    #[must_use]
    pub fn new(semantic: Semantic, components: u32, data_type: VertexDataType) -> Self {
        Self {
            semantic,
            components,
            data_type,
            normalize: false,
            offset: None,
            stride: None,
        }
    }

    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    #[must_use]
    pub fn with_layout(mut self, offset: u32, stride: u32) -> Self {
        self.offset = Some(offset);
        self.stride = Some(stride);
        self
    }
}

/// A laid-out vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElement {
    pub semantic: Semantic,
    pub components: u32,
    pub data_type: VertexDataType,
    pub normalize: bool,
    pub offset: u32,
    pub stride: u32,
    /// Unpadded size in bytes.
    pub size: u32,
    pub format: wgpu::VertexFormat,
}

impl VertexElement {
    /// Whether shaders read this element as integers.
    #[must_use]
    pub fn reads_as_integer(&self) -> bool {
        self.data_type.is_integer() && !self.normalize
    }
}

// ─── VertexFormat ────────────────────────────────────────────────────────────

/// Layout of the elements in one vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
    interleaved: bool,
    instancing: bool,
    vertex_size: u32,
    rendering_hash_string: String,
    rendering_id: u32,
}

impl VertexFormat {
    /// Lays out `descs` in order.
    ///
    /// With `vertex_count` set, elements are planar: each occupies its own
    /// block of `vertex_count` entries. Otherwise they are interleaved. Element
    /// sizes are padded to 4 bytes in both layouts. Explicit offsets and
    /// strides on a desc override the computed ones.
    pub fn new(
        keys: &mut KeyInterner,
        descs: &[VertexElementDesc],
        vertex_count: Option<u32>,
        instancing: bool,
    ) -> Result<Self> {
        let mut elements = Vec::with_capacity(descs.len());
        let mut cursor = 0u32;

        for desc in descs {
            let format = wgpu_vertex_format(desc.data_type, desc.components, desc.normalize)
                .ok_or_else(|| BinderyError::UnsupportedVertexElement {
                    name: desc.semantic.name().to_string(),
                    data_type: desc.data_type.name().to_string(),
                    components: desc.components,
                })?;

            let size = desc.components * desc.data_type.size();
            let padded = size.next_multiple_of(4);
            let (offset, stride) = match vertex_count {
                Some(count) => {
                    let offset = cursor;
                    cursor += padded * count;
                    (offset, padded)
                }
                None => {
                    let offset = cursor;
                    cursor += padded;
                    (offset, 0)
                }
            };

            elements.push(VertexElement {
                semantic: desc.semantic,
                components: desc.components,
                data_type: desc.data_type,
                normalize: desc.normalize,
                offset: desc.offset.unwrap_or(offset),
                stride: desc.stride.unwrap_or(stride),
                size,
                format,
            });
        }

        let interleaved = vertex_count.is_none();
        let vertex_size = if interleaved {
            cursor
        } else {
            elements.iter().map(|e| e.stride).sum()
        };
        if interleaved {
            for element in &mut elements {
                if element.stride == 0 {
                    element.stride = vertex_size;
                }
            }
        }

        let mut rendering_hash_string = String::new();
        for element in &elements {
            let _ = write!(
                rendering_hash_string,
                "{}:{:?}:{}:{}|",
                element.semantic, element.format, element.offset, element.stride
            );
        }
        rendering_hash_string.push(if instancing { 'i' } else { 'v' });
        rendering_hash_string.push(if interleaved { 'I' } else { 'P' });
        let rendering_id = keys.intern(&rendering_hash_string);

        Ok(Self {
            elements,
            interleaved,
            instancing,
            vertex_size,
            rendering_hash_string,
            rendering_id,
        })
    }

    #[inline]
    #[must_use]
    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    #[must_use]
    pub fn element(&self, semantic: Semantic) -> Option<&VertexElement> {
        self.elements.iter().find(|e| e.semantic == semantic)
    }

    #[inline]
    #[must_use]
    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    #[inline]
    #[must_use]
    pub fn instancing(&self) -> bool {
        self.instancing
    }

    /// Bytes per vertex.
    #[inline]
    #[must_use]
    pub fn vertex_size(&self) -> u32 {
        self.vertex_size
    }

    /// The string the rendering id is interned from.
    #[inline]
    #[must_use]
    pub fn rendering_hash_string(&self) -> &str {
        &self.rendering_hash_string
    }

    /// Interned id shared by all formats with identical rendering layout.
    #[inline]
    #[must_use]
    pub fn rendering_id(&self) -> u32 {
        self.rendering_id
    }

    /// One buffer layout for interleaved formats, one per element for planar.
    #[must_use]
    pub fn buffer_layouts(&self) -> Vec<OwnedVertexBufferDesc> {
        let step_mode = if self.instancing {
            wgpu::VertexStepMode::Instance
        } else {
            wgpu::VertexStepMode::Vertex
        };

        if self.interleaved {
            let attributes = self
                .elements
                .iter()
                .map(|e| wgpu::VertexAttribute {
                    format: e.format,
                    offset: u64::from(e.offset),
                    shader_location: e.semantic.location(),
                })
                .collect();
            vec![OwnedVertexBufferDesc {
                array_stride: u64::from(self.vertex_size),
                step_mode,
                attributes,
            }]
        } else {
            self.elements
                .iter()
                .map(|e| OwnedVertexBufferDesc {
                    array_stride: u64::from(e.stride),
                    step_mode,
                    attributes: vec![wgpu::VertexAttribute {
                        format: e.format,
                        offset: 0,
                        shader_location: e.semantic.location(),
                    }],
                })
                .collect()
        }
    }

    /// Byte offsets at which the vertex buffer is bound, one per layout
    /// returned by [`buffer_layouts`](Self::buffer_layouts).
    #[must_use]
    pub fn binding_offsets(&self) -> Vec<u64> {
        if self.interleaved {
            vec![0]
        } else {
            self.elements.iter().map(|e| u64::from(e.offset)).collect()
        }
    }
}

/// Maps an element to its GPU vertex format.
///
/// `None` for combinations the GPU cannot read: three-component 8/16-bit
/// data, single 8-bit components, and normalized 32-bit integers.
#[must_use]
pub fn wgpu_vertex_format(
    data_type: VertexDataType,
    components: u32,
    normalize: bool,
) -> Option<wgpu::VertexFormat> {
    use VertexDataType as T;
    use wgpu::VertexFormat as F;

    let format = match (data_type, normalize, components) {
        (T::Float32, _, 1) => F::Float32,
        (T::Float32, _, 2) => F::Float32x2,
        (T::Float32, _, 3) => F::Float32x3,
        (T::Float32, _, 4) => F::Float32x4,
        (T::Float16, _, 1) => F::Float16,
        (T::Float16, _, 2) => F::Float16x2,
        (T::Float16, _, 4) => F::Float16x4,
        (T::Uint8, false, 2) => F::Uint8x2,
        (T::Uint8, false, 4) => F::Uint8x4,
        (T::Uint8, true, 2) => F::Unorm8x2,
        (T::Uint8, true, 4) => F::Unorm8x4,
        (T::Int8, false, 2) => F::Sint8x2,
        (T::Int8, false, 4) => F::Sint8x4,
        (T::Int8, true, 2) => F::Snorm8x2,
        (T::Int8, true, 4) => F::Snorm8x4,
        (T::Uint16, false, 1) => F::Uint16,
        (T::Uint16, false, 2) => F::Uint16x2,
        (T::Uint16, false, 4) => F::Uint16x4,
        (T::Uint16, true, 1) => F::Unorm16,
        (T::Uint16, true, 2) => F::Unorm16x2,
        (T::Uint16, true, 4) => F::Unorm16x4,
        (T::Int16, false, 1) => F::Sint16,
        (T::Int16, false, 2) => F::Sint16x2,
        (T::Int16, false, 4) => F::Sint16x4,
        (T::Int16, true, 1) => F::Snorm16,
        (T::Int16, true, 2) => F::Snorm16x2,
        (T::Int16, true, 4) => F::Snorm16x4,
        (T::Uint32, false, 1) => F::Uint32,
        (T::Uint32, false, 2) => F::Uint32x2,
        (T::Uint32, false, 3) => F::Uint32x3,
        (T::Uint32, false, 4) => F::Uint32x4,
        (T::Int32, false, 1) => F::Sint32,
        (T::Int32, false, 2) => F::Sint32x2,
        (T::Int32, false, 3) => F::Sint32x3,
        (T::Int32, false, 4) => F::Sint32x4,
        _ => return None,
    };
    Some(format)
}

// ─── Vertex Buffer Layouts ───────────────────────────────────────────────────

/// Owned counterpart of `wgpu::VertexBufferLayout`.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedVertexBufferDesc {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl OwnedVertexBufferDesc {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

/// Buffer layouts for pairs of vertex formats.
#[derive(Debug, Default)]
pub struct VertexLayoutCache {
    layouts: FxHashMap<String, Arc<[OwnedVertexBufferDesc]>>,
}

impl VertexLayoutCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of a format pair; `0` stands for an absent format.
    #[must_use]
    pub fn key(formats: [Option<&VertexFormat>; 2]) -> String {
        let [h0, h1] = formats.map(|f| f.map_or(0, |f| u64::from(f.rendering_id()) + 1));
        format!("{h0}-{h1}")
    }

    pub fn get_or_create(&mut self, formats: [Option<&VertexFormat>; 2]) -> Arc<[OwnedVertexBufferDesc]> {
        let key = Self::key(formats);
        if let Some(layouts) = self.layouts.get(&key) {
            return layouts.clone();
        }

        log::debug!("Vertex layout cache miss: {key}");
        let layouts: Arc<[OwnedVertexBufferDesc]> = formats
            .into_iter()
            .flatten()
            .flat_map(VertexFormat::buffer_layouts)
            .collect();
        self.layouts.insert(key, layouts.clone());
        layouts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
