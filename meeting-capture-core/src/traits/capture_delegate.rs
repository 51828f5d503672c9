use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::CaptureState;

/// Event delegate for capture and writer notifications.
///
/// Methods are called from the capture thread or the writer thread, never
/// from the caller's thread. Implementations should marshal elsewhere if
/// needed and must not block for long. All methods default to no-ops.
pub trait CaptureDelegate: Send + Sync {
    /// Called on every capture state transition.
    fn on_state_changed(&self, _state: CaptureState) {}

    /// Initialization succeeded and the capture loop is running.
    fn on_capture_started(&self) {}

    /// The capture loop exited and cleanup has released all native handles.
    fn on_capture_stopped(&self) {}

    /// Initialization failed; the session never reached `Capturing`.
    fn on_capture_failed(&self, _error: &CaptureError) {}

    /// A non-fatal error occurred (mid-session read failure, write failure).
    fn on_error(&self, _error: &CaptureError) {}

    /// Both WAV files are finalized. Fires once per writer session.
    fn on_writing_finished(&self, _result: &RecordingResult) {}
}
