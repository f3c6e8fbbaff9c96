//! Indirect Draw Slots
//!
//! A fixed-capacity GPU buffer of `DrawIndexedIndirectArgs` with an
//! append-only per-frame cursor. The buffer is never grown mid-frame since
//! recorded commands may already reference it; running out is a budget error
//! the caller fixes by raising `indirect_draw_capacity`.

use wgpu::util::DrawIndexedIndirectArgs;

use super::backend::GpuBackend;
use crate::binding::resources::GpuBuffer;
use crate::errors::{BinderyError, Result};

/// Byte size of one indirect slot.
pub const INDIRECT_SLOT_SIZE: u64 = std::mem::size_of::<DrawIndexedIndirectArgs>() as u64;

/// A contiguous run of slots handed out by [`SlotCursor::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectSlots {
    pub first: u32,
    pub count: u32,
}

impl IndirectSlots {
    /// Byte offset of slot `index` within this run.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the run.
    #[inline]
    #[must_use]
    pub fn byte_offset(&self, index: u32) -> u64 {
        assert!(
            index < self.count,
            "indirect slot index {index} out of range: allocation holds {} slots",
            self.count
        );
        u64::from(self.first + index) * INDIRECT_SLOT_SIZE
    }
}

/// Per-frame slot cursor.
#[derive(Debug, Clone)]
pub struct SlotCursor {
    capacity: u32,
    next: u32,
    reported: bool,
}

impl SlotCursor {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next: 0,
            reported: false,
        }
    }

    /// Reserves `count` consecutive slots.
    pub fn allocate(&mut self, count: u32) -> Result<IndirectSlots> {
        let fits = self
            .next
            .checked_add(count)
            .is_some_and(|end| end <= self.capacity);
        if !fits {
            if !self.reported {
                log::error!(
                    "Indirect draw slots exhausted: requested {count}, {} of {} used; raise indirect_draw_capacity",
                    self.next,
                    self.capacity
                );
                self.reported = true;
            }
            return Err(BinderyError::IndirectSlotsExhausted {
                requested: count,
                used: self.next,
                capacity: self.capacity,
            });
        }
        let slots = IndirectSlots {
            first: self.next,
            count,
        };
        self.next += count;
        Ok(slots)
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    #[inline]
    #[must_use]
    pub fn used(&self) -> u32 {
        self.next
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Indirect argument buffer plus its cursor.
pub struct IndirectDrawBuffer<B: GpuBackend> {
    buffer: GpuBuffer<B>,
    cursor: SlotCursor,
}

impl<B: GpuBackend> IndirectDrawBuffer<B> {
    #[must_use]
    pub fn new(backend: &B, capacity: u32) -> Self {
        let buffer = GpuBuffer::new(
            backend,
            "Indirect Draw Args",
            u64::from(capacity.max(1)) * INDIRECT_SLOT_SIZE,
            wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        Self {
            buffer,
            cursor: SlotCursor::new(capacity),
        }
    }

    pub fn frame_start(&mut self) {
        self.cursor.reset();
    }

    pub fn allocate(&mut self, count: u32) -> Result<IndirectSlots> {
        self.cursor.allocate(count)
    }

    /// Writes draw arguments into the first slots of `slots`.
    ///
    /// # Panics
    ///
    /// Panics if `args` holds more entries than `slots`.
    pub fn write(&self, backend: &B, slots: IndirectSlots, args: &[DrawIndexedIndirectArgs]) {
        assert!(
            args.len() <= slots.count as usize,
            "indirect args overflow: {} args for an allocation of {} slots",
            args.len(),
            slots.count
        );
        if args.is_empty() {
            return;
        }
        let bytes: Vec<u8> = args.iter().flat_map(|a| a.as_bytes().iter().copied()).collect();
        backend.write_buffer(self.buffer.raw(), slots.byte_offset(0), &bytes);
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &GpuBuffer<B> {
        &self.buffer
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> &SlotCursor {
        &self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_increasing_and_disjoint() {
        let mut cursor = SlotCursor::new(16);
        let a = cursor.allocate(3).unwrap();
        let b = cursor.allocate(1).unwrap();
        let c = cursor.allocate(5).unwrap();
        assert_eq!((a.first, b.first, c.first), (0, 3, 4));
        assert_eq!(c.byte_offset(1), 5 * INDIRECT_SLOT_SIZE);
        assert_eq!(cursor.used(), 9);
    }

    #[test]
    fn reset_returns_to_start() {
        let mut cursor = SlotCursor::new(4);
        let first = cursor.allocate(2).unwrap();
        cursor.reset();
        assert_eq!(cursor.allocate(2).unwrap(), first);
    }

    #[test]
    fn overflow_reports_budget() {
        let mut cursor = SlotCursor::new(4);
        cursor.allocate(3).unwrap();
        match cursor.allocate(2) {
            Err(BinderyError::IndirectSlotsExhausted {
                requested,
                used,
                capacity,
            }) => assert_eq!((requested, used, capacity), (2, 3, 4)),
            other => panic!("unexpected {other:?}"),
        }
        // A failed request consumes nothing.
        assert_eq!(cursor.allocate(1).unwrap().first, 3);
    }

    #[test]
    fn byte_offset_covers_the_whole_run() {
        let slots = IndirectSlots { first: 2, count: 3 };
        assert_eq!(slots.byte_offset(0), 2 * INDIRECT_SLOT_SIZE);
        assert_eq!(slots.byte_offset(2), 4 * INDIRECT_SLOT_SIZE);
    }

    #[test]
    #[should_panic(expected = "indirect slot index 3 out of range")]
    fn byte_offset_past_the_run_panics() {
        let slots = IndirectSlots { first: 0, count: 3 };
        let _ = slots.byte_offset(3);
    }

    #[test]
    fn slot_size_matches_indexed_args() {
        assert_eq!(INDIRECT_SLOT_SIZE, 20);
    }
}
