use std::sync::Arc;

use crate::models::audio_models::AudioSource;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;

/// One burst of interleaved float samples handed from capture to the writer.
///
/// Moved on emission; the producer never touches it afterwards.
pub type Chunk = Vec<f32>;

/// Receiver of emitted chunks. Must be cheap: it runs on the capture thread.
pub type ChunkCallback = Arc<dyn Fn(Chunk) + Send + Sync + 'static>;

/// Platform-specific capture of system loopback and microphone.
///
/// Driven by [`CaptureThread`](crate::session::capture_thread::CaptureThread):
/// `initialize` once per session, `iterate` repeatedly while the session is
/// active, then `cleanup` exactly once after a successful `initialize`.
///
/// Backends are constructed on the capture thread and never leave it, so
/// native handles held here need not be `Send`.
pub trait CaptureBackend {
    /// Open both native endpoints, negotiate their formats and set up buffering.
    ///
    /// On error, no native handle may be left open.
    fn initialize(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError>;

    /// Pull available native audio and emit due output through `emit`.
    ///
    /// Must return within a bounded time (polling backends sleep briefly to
    /// yield). An error ends the session.
    fn iterate(&mut self, emit: &mut dyn FnMut(Chunk)) -> Result<(), CaptureError>;

    /// Optionally drain remaining audio through `emit`, then release native handles.
    fn cleanup(&mut self, emit: &mut dyn FnMut(Chunk));

    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Endpoints opened by the last successful `initialize`.
    fn sources(&self) -> Vec<AudioSource> {
        Vec::new()
    }
}
