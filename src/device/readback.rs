//! Buffer Read-back
//!
//! A read copies the source range into a `MAP_READ` staging buffer inside the
//! frame's command stream. Once that copy has been submitted the map is
//! started and its completion is driven on the device's local executor; the
//! caller holds the receiving end of a oneshot channel.

use futures::channel::oneshot;
use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;

use super::backend::GpuBackend;
use crate::binding::resources::{GpuBuffer, pad_to_copy_alignment};
use crate::errors::Result;

pub type ReadbackReceiver = oneshot::Receiver<Result<Vec<u8>>>;

struct PendingRead<B: GpuBackend> {
    staging: GpuBuffer<B>,
    size: u64,
    sender: oneshot::Sender<Result<Vec<u8>>>,
}

/// Reads recorded but not yet submitted.
pub struct ReadbackQueue<B: GpuBackend> {
    recorded: Vec<PendingRead<B>>,
}

impl<B: GpuBackend> Default for ReadbackQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> ReadbackQueue<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            recorded: Vec::new(),
        }
    }

    /// Records the copy of `size` bytes at `offset` of `source` into a fresh
    /// staging buffer.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not 4-byte aligned or the range exceeds the
    /// source buffer.
    pub fn request(
        &mut self,
        backend: &B,
        encoder: &mut B::CommandEncoder,
        source: &GpuBuffer<B>,
        offset: u64,
        size: u64,
    ) -> ReadbackReceiver {
        assert!(
            offset % wgpu::COPY_BUFFER_ALIGNMENT == 0,
            "read-back offset {offset} of '{}' is not 4-byte aligned",
            source.label()
        );
        assert!(
            offset + size <= source.size(),
            "read-back range {offset}..{} exceeds '{}' ({} bytes)",
            offset + size,
            source.label(),
            source.size()
        );

        let copy_size = pad_to_copy_alignment(size).min(source.size() - offset);
        let staging = GpuBuffer::new(
            backend,
            "Readback Staging",
            pad_to_copy_alignment(size).max(wgpu::COPY_BUFFER_ALIGNMENT),
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        backend.copy_buffer_to_buffer(encoder, source.raw(), offset, staging.raw(), 0, copy_size);

        let (sender, receiver) = oneshot::channel();
        self.recorded.push(PendingRead {
            staging,
            size,
            sender,
        });
        receiver
    }

    /// Starts mapping every recorded read. Call right after the submit that
    /// carried the copies.
    pub fn start(&mut self, backend: &B, spawner: &LocalSpawner) {
        for read in self.recorded.drain(..) {
            let mapped = backend.map_read(read.staging.raw(), 0, read.staging.size());
            let size = read.size as usize;
            let sender = read.sender;
            // The staging buffer must live until the map resolves.
            let staging = read.staging;
            let task = async move {
                let result = mapped.await.map(|mut bytes| {
                    bytes.truncate(size);
                    bytes
                });
                drop(staging);
                // The receiver may have been dropped; nothing to report then.
                let _ = sender.send(result);
            };
            if let Err(err) = spawner.spawn_local(task) {
                log::error!("Failed to schedule buffer read-back: {err}");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Drops recorded reads; their receivers resolve as cancelled.
    pub fn clear(&mut self) {
        self.recorded.clear();
    }
}
