//! Render collaborator seam
//!
//! A render instance owns its own tick thread (see [`scheduler`]) and runs
//! render → capture → deliver synchronously on every tick. Captured frames
//! are handed to a [`FrameSink`] on that same thread.

pub mod pattern;
pub mod scheduler;

pub use pattern::{PatternRenderer, PatternRendererConfig};
pub use scheduler::RealtimeScheduler;

use crate::error::Result;

/// Receiver of captured frames, called on the render thread
pub trait FrameSink: Send + Sync {
    /// `data` holds `height` rows of `row_pitch` bytes each
    fn on_frame(&self, data: &[u8], width: u32, height: u32, row_pitch: u32);
}

/// One render/capture pipeline bound to a peer session
pub trait RenderInstance: Send {
    /// Begin ticking and delivering frames
    fn start(&mut self) -> Result<()>;

    /// Stop ticking; returns once the tick thread has exited
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}
