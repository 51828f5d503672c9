use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{CaptureState, WriterState};
use crate::traits::capture_backend::CaptureBackend;
use crate::traits::capture_delegate::CaptureDelegate;

use super::capture_thread::CaptureThread;
use super::writer_thread::WavWriterThread;

/// Forwards capture events to the caller and ends the writer session when capture ends.
struct SessionChain {
    writer: Arc<WavWriterThread>,
    user: Option<Arc<dyn CaptureDelegate>>,
}

impl CaptureDelegate for SessionChain {
    fn on_state_changed(&self, state: CaptureState) {
        if let Some(ref user) = self.user {
            user.on_state_changed(state);
        }
    }

    fn on_capture_started(&self) {
        if let Some(ref user) = self.user {
            user.on_capture_started();
        }
    }

    fn on_capture_stopped(&self) {
        if let Some(ref user) = self.user {
            user.on_capture_stopped();
        }
        self.writer.stop_writing();
    }

    fn on_capture_failed(&self, error: &CaptureError) {
        if let Some(ref user) = self.user {
            user.on_capture_failed(error);
        }
        self.writer.stop_writing();
    }

    fn on_error(&self, error: &CaptureError) {
        if let Some(ref user) = self.user {
            user.on_error(error);
        }
    }
}

/// One capture thread and one writer thread wired together.
///
/// ```text
/// [CaptureBackend] → CaptureThread ──chunks──→ WavWriterThread → HQ.wav + ASR.wav
///                          └─ stopped/failed ──→ stop_writing
/// ```
///
/// The writer is armed before capture starts so no chunk is lost, and it is
/// told to finalize only after capture cleanup has emitted its last chunk.
pub struct Recorder {
    capture: CaptureThread,
    writer: Arc<WavWriterThread>,
}

impl Recorder {
    pub fn new<B, F>(make_backend: F, delegate: Option<Arc<dyn CaptureDelegate>>) -> Result<Self, CaptureError>
    where
        B: CaptureBackend,
        F: FnOnce() -> B + Send + 'static,
    {
        let writer = Arc::new(WavWriterThread::spawn(delegate.clone())?);
        let chain: Arc<dyn CaptureDelegate> = Arc::new(SessionChain {
            writer: Arc::clone(&writer),
            user: delegate,
        });
        let capture = CaptureThread::spawn(make_backend, writer.chunk_sink(), Some(chain))?;
        Ok(Self { capture, writer })
    }

    /// Open both output files and start capturing into them.
    pub fn start_session(
        &self,
        hq_path: impl AsRef<Path>,
        asr_path: impl AsRef<Path>,
        config: CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        if !self.capture.state().is_idle() {
            return Err(CaptureError::ConfigurationFailed("capture session already running".into()));
        }
        self.writer.start_writing(hq_path, asr_path, &config)?;
        log::info!(
            "session starting (system gain {}, mic gain {})",
            config.system_gain,
            config.mic_gain
        );
        self.capture.start_capture(config);
        Ok(())
    }

    /// Ask capture to stop; the writer finalizes once cleanup completes. Does not wait.
    pub fn stop_session(&self) {
        self.capture.stop_capture();
    }

    /// Block until the session's files are finalized. `None` on timeout.
    pub fn wait_finished(&self, timeout: Duration) -> Option<Result<RecordingResult, CaptureError>> {
        self.writer.wait_finished(timeout)
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn writer_state(&self) -> WriterState {
        self.writer.state()
    }

    /// Stop both threads, capture first so its last chunks reach the writer.
    pub fn shutdown(&self) {
        self.capture.shutdown();
        self.writer.shutdown();
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
