//! Frame Controller
//!
//! The command-recording state machine:
//!
//! ```text
//! Idle ──encoder()──▶ Encoding ──begin_*_pass()──▶ InRenderPass / InComputePass
//!  ▲                    │  ▲                                 │
//!  └──── submit() ──────┘  └────────── end_*_pass() ─────────┘
//! ```
//!
//! Exactly one pass can be open at a time, and nothing can be submitted while
//! it is. Both are usage errors and panic. Finished command buffers wait in a
//! pending queue until [`FrameController::submit`] sends all of them in one
//! call; upload work can jump to the front of that queue.

use std::collections::VecDeque;

use super::backend::{GpuBackend, RenderPassBegin};
use super::tracked_pass::TrackedRenderPass;

/// Observable state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Encoding,
    InRenderPass,
    InComputePass,
}

enum ActivePass<B: GpuBackend> {
    None,
    Render(TrackedRenderPass<B>),
    Compute(B::ComputePass),
}

pub struct FrameController<B: GpuBackend> {
    encoder: Option<B::CommandEncoder>,
    pass: ActivePass<B>,
    pending: VecDeque<B::CommandBuffer>,
}

impl<B: GpuBackend> Default for FrameController<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GpuBackend> FrameController<B> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            encoder: None,
            pass: ActivePass::None,
            pending: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> FrameState {
        match (&self.pass, &self.encoder) {
            (ActivePass::Render(_), _) => FrameState::InRenderPass,
            (ActivePass::Compute(_), _) => FrameState::InComputePass,
            (ActivePass::None, Some(_)) => FrameState::Encoding,
            (ActivePass::None, None) => FrameState::Idle,
        }
    }

    #[inline]
    #[must_use]
    pub fn in_pass(&self) -> bool {
        !matches!(self.pass, ActivePass::None)
    }

    /// The open command encoder, created on first use.
    ///
    /// # Panics
    ///
    /// Panics while a pass is open; the encoder is locked by the pass.
    pub fn encoder(&mut self, backend: &B) -> &mut B::CommandEncoder {
        assert!(
            !self.in_pass(),
            "pass already open: the command encoder cannot be used until the pass ends"
        );
        self.encoder
            .get_or_insert_with(|| backend.create_command_encoder("Frame Encoder"))
    }

    // ─── Render Pass ─────────────────────────────────────────────────────────

    /// # Panics
    ///
    /// Panics with "pass already open" if any pass is open.
    pub fn begin_render_pass(&mut self, backend: &B, desc: &RenderPassBegin<'_, B>) {
        assert!(!self.in_pass(), "pass already open: cannot begin render pass '{}'", desc.label);
        let encoder = self.encoder(backend);
        let pass = backend.begin_render_pass(encoder, desc);
        self.pass = ActivePass::Render(TrackedRenderPass::new(pass));
    }

    /// The open render pass.
    ///
    /// # Panics
    ///
    /// Panics if no render pass is open.
    pub fn render_pass(&mut self) -> &mut TrackedRenderPass<B> {
        match &mut self.pass {
            ActivePass::Render(pass) => pass,
            _ => panic!("no matching pass: no render pass is open"),
        }
    }

    /// # Panics
    ///
    /// Panics with "no matching pass" unless a render pass is open.
    pub fn end_render_pass(&mut self, backend: &B) {
        match std::mem::replace(&mut self.pass, ActivePass::None) {
            ActivePass::Render(pass) => backend.end_render_pass(pass.into_inner()),
            other => {
                self.pass = other;
                panic!("no matching pass: end_render_pass without an open render pass");
            }
        }
    }

    // ─── Compute Pass ────────────────────────────────────────────────────────

    /// # Panics
    ///
    /// Panics with "pass already open" if any pass is open.
    pub fn begin_compute_pass(&mut self, backend: &B, label: &str) {
        assert!(!self.in_pass(), "pass already open: cannot begin compute pass '{label}'");
        let encoder = self.encoder(backend);
        let pass = backend.begin_compute_pass(encoder, label);
        self.pass = ActivePass::Compute(pass);
    }

    /// The open compute pass.
    ///
    /// # Panics
    ///
    /// Panics if no compute pass is open.
    pub fn compute_pass(&mut self) -> &mut B::ComputePass {
        match &mut self.pass {
            ActivePass::Compute(pass) => pass,
            _ => panic!("no matching pass: no compute pass is open"),
        }
    }

    /// # Panics
    ///
    /// Panics with "no matching pass" unless a compute pass is open.
    pub fn end_compute_pass(&mut self, backend: &B) {
        match std::mem::replace(&mut self.pass, ActivePass::None) {
            ActivePass::Compute(pass) => backend.end_compute_pass(pass),
            other => {
                self.pass = other;
                panic!("no matching pass: end_compute_pass without an open compute pass");
            }
        }
    }

    // ─── Submission ──────────────────────────────────────────────────────────

    /// Appends a finished command buffer to the pending queue.
    pub fn enqueue(&mut self, command_buffer: B::CommandBuffer) {
        self.pending.push_back(command_buffer);
    }

    /// Puts a command buffer ahead of everything pending. Each call goes in
    /// front of the previous ones.
    pub fn enqueue_front(&mut self, command_buffer: B::CommandBuffer) {
        self.pending.push_front(command_buffer);
    }

    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Finishes the open encoder, if any, into the pending queue.
    ///
    /// # Panics
    ///
    /// Panics while a pass is open.
    pub fn flush_encoder(&mut self, backend: &B) {
        assert!(
            !self.in_pass(),
            "submit while a pass is open: end the pass before finishing the encoder"
        );
        if let Some(encoder) = self.encoder.take() {
            self.pending.push_back(backend.finish(encoder));
        }
    }

    /// Finishes the open encoder and submits every pending command buffer in
    /// queue order. Returns the number of command buffers submitted.
    ///
    /// # Panics
    ///
    /// Panics while a pass is open.
    pub fn submit(&mut self, backend: &B) -> usize {
        self.flush_encoder(backend);
        if self.pending.is_empty() {
            return 0;
        }
        let count = self.pending.len();
        backend.submit(self.pending.drain(..).collect());
        count
    }

    /// Drops every encoder, pass and pending command buffer without
    /// submitting. Used after device loss.
    pub fn reset(&mut self) {
        self.pass = ActivePass::None;
        self.encoder = None;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Command, RecordingBackend};

    fn begin(label: &str) -> RenderPassBegin<'_, RecordingBackend> {
        RenderPassBegin {
            label,
            color_attachments: Vec::new(),
            depth_stencil: None,
        }
    }

    #[test]
    fn lifecycle_states() {
        let backend = RecordingBackend::new();
        let mut frame = FrameController::<RecordingBackend>::new();
        assert_eq!(frame.state(), FrameState::Idle);

        frame.begin_render_pass(&backend, &begin("main"));
        assert_eq!(frame.state(), FrameState::InRenderPass);
        frame.end_render_pass(&backend);
        assert_eq!(frame.state(), FrameState::Encoding);

        frame.begin_compute_pass(&backend, "cull");
        assert_eq!(frame.state(), FrameState::InComputePass);
        frame.end_compute_pass(&backend);

        assert_eq!(frame.submit(&backend), 1);
        assert_eq!(frame.state(), FrameState::Idle);
    }

    #[test]
    #[should_panic(expected = "pass already open")]
    fn nested_pass_panics() {
        let backend = RecordingBackend::new();
        let mut frame = FrameController::<RecordingBackend>::new();
        frame.begin_render_pass(&backend, &begin("a"));
        frame.begin_compute_pass(&backend, "b");
    }

    #[test]
    #[should_panic(expected = "no matching pass")]
    fn mismatched_end_panics() {
        let backend = RecordingBackend::new();
        let mut frame = FrameController::<RecordingBackend>::new();
        frame.begin_compute_pass(&backend, "a");
        frame.end_render_pass(&backend);
    }

    #[test]
    #[should_panic(expected = "submit while a pass is open")]
    fn submit_in_pass_panics() {
        let backend = RecordingBackend::new();
        let mut frame = FrameController::<RecordingBackend>::new();
        frame.begin_render_pass(&backend, &begin("a"));
        frame.submit(&backend);
    }

    #[test]
    fn front_insertion_precedes_pending() {
        let backend = RecordingBackend::new();
        let mut frame = FrameController::<RecordingBackend>::new();

        let draw = backend.finish(backend.create_command_encoder("draw"));
        let upload = backend.finish(backend.create_command_encoder("upload"));
        let (draw_id, upload_id) = (draw.id(), upload.id());

        frame.enqueue(draw);
        frame.enqueue_front(upload);
        frame.submit(&backend);

        let submitted = backend
            .commands()
            .into_iter()
            .find_map(|c| match c {
                Command::Submit { command_buffers } => Some(command_buffers),
                _ => None,
            })
            .unwrap();
        assert_eq!(submitted, vec![upload_id, draw_id]);
    }
}
