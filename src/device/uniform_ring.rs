//! Uniform Ring
//!
//! Per-draw mesh uniform data is appended to one shared uniform buffer and
//! bound with a dynamic offset. Bytes are staged on the CPU and written to the
//! GPU before each submit.
//!
//! The GPU buffer keeps its identity for the whole frame. An allocation that
//! does not fit fails, and the ring grows to fit the whole frame's demand at
//! the next [`UniformRing::frame_start`]. Growing issues a new buffer id, so
//! mesh bind groups built against the old buffer must be rebuilt.

use super::backend::GpuBackend;
use crate::binding::resources::GpuBuffer;
use crate::errors::{BinderyError, Result};

pub struct UniformRing<B: GpuBackend> {
    buffer: GpuBuffer<B>,
    staging: Vec<u8>,
    capacity: u64,
    cursor: u64,
    /// Bytes of `staging` already written to the GPU.
    flushed: u64,
    alignment: u64,
    /// Capacity to switch to at the next frame start.
    grow_to: Option<u64>,
    reported: bool,
}

impl<B: GpuBackend> UniformRing<B> {
    #[must_use]
    pub fn new(backend: &B, capacity: u64) -> Self {
        let alignment = u64::from(backend.caps().min_uniform_buffer_offset_alignment).max(4);
        let capacity = capacity.max(alignment);
        Self {
            buffer: create_buffer(backend, capacity),
            staging: Vec::with_capacity(capacity as usize),
            capacity,
            cursor: 0,
            flushed: 0,
            alignment,
            grow_to: None,
            reported: false,
        }
    }

    /// Appends `data` and returns its dynamic offset.
    pub fn allocate(&mut self, data: &[u8]) -> Result<u32> {
        let offset = self.cursor.next_multiple_of(self.alignment);
        let end = offset + data.len() as u64;
        if end > self.capacity {
            let mut grown = self.grow_to.unwrap_or(self.capacity);
            while grown < end {
                grown *= 2;
            }
            self.grow_to = Some(grown);
            if !self.reported {
                log::error!(
                    "Uniform ring exhausted: requested {} bytes, {} of {} used; growing to {grown} bytes next frame",
                    data.len(),
                    self.cursor,
                    self.capacity
                );
                self.reported = true;
            }
            return Err(BinderyError::UniformRingExhausted {
                requested: data.len() as u64,
                used: self.cursor,
                capacity: self.capacity,
            });
        }

        self.staging.resize(offset as usize, 0);
        self.staging.extend_from_slice(data);
        self.cursor = end;
        // Fits in u32: capacity is bounded by the uniform buffer size limit.
        Ok(offset as u32)
    }

    /// Writes the bytes staged since the last flush.
    pub fn flush(&mut self, backend: &B) {
        if self.cursor <= self.flushed {
            return;
        }
        let start = self.flushed as usize;
        let end = (self.cursor.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT) as usize)
            .min(self.capacity as usize);
        self.staging.resize(end.max(self.staging.len()), 0);
        backend.write_buffer(self.buffer.raw(), self.flushed, &self.staging[start..end]);
        self.flushed = end as u64;
    }

    /// Applies pending growth and rewinds the cursor.
    pub fn frame_start(&mut self, backend: &B) {
        if let Some(capacity) = self.grow_to.take() {
            log::info!("Uniform ring growing: {} -> {capacity} bytes", self.capacity);
            self.capacity = capacity;
            self.buffer = create_buffer(backend, capacity);
        }
        self.cursor = 0;
        self.flushed = 0;
        self.staging.clear();
        self.reported = false;
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &GpuBuffer<B> {
        &self.buffer
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn used(&self) -> u64 {
        self.cursor
    }

    #[inline]
    #[must_use]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Whether an overflow this frame scheduled a resize.
    #[inline]
    #[must_use]
    pub fn growth_pending(&self) -> bool {
        self.grow_to.is_some()
    }
}

fn create_buffer<B: GpuBackend>(backend: &B, capacity: u64) -> GpuBuffer<B> {
    GpuBuffer::new(
        backend,
        "Uniform Ring",
        capacity,
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    )
}
