use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::CaptureSessionDiagnostics;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::traits::capture_backend::{CaptureBackend, Chunk, ChunkCallback};
use crate::traits::capture_delegate::CaptureDelegate;

/// Requests from the controlling thread, guarded by one mutex.
struct Control {
    /// Latched start request, consumed by the loop.
    request: Option<CaptureConfiguration>,
    /// The latched request was stopped before the loop picked it up.
    cancelled: bool,
    /// The running session should keep iterating.
    active: bool,
    /// The loop is between taking a request and finishing its cleanup.
    running: bool,
    shutdown: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    state: Mutex<CaptureState>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl Shared {
    fn set_state(&self, state: CaptureState) {
        *self.state.lock() = state;
        log::debug!("capture state -> {:?}", state);
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(state);
        }
    }

    fn is_active(&self) -> bool {
        let control = self.control.lock();
        control.active && !control.shutdown
    }

    fn notify_stopped(&self) {
        if let Some(ref delegate) = self.delegate {
            delegate.on_capture_stopped();
        }
    }
}

/// What the loop took from `Control` after waking.
enum Request {
    Run(CaptureConfiguration),
    Cancelled,
    Exit,
}

/// Long-lived capture worker driving one [`CaptureBackend`].
///
/// ```text
/// Idle → Initializing → Capturing → CleaningUp → Idle
///             ↓
///            Idle            (initialize failed)
///
/// any → ShuttingDown         (thread exits)
/// ```
///
/// While idle the thread blocks on a condition variable and wakes only for
/// `start_capture`, `stop_capture` or `shutdown`. A start is latched until
/// the loop consumes it, so a stop that arrives first still ends that
/// request with `on_capture_stopped`, and a start issued while the previous
/// session is cleaning up runs right after it. `shutdown` blocks until the
/// thread has exited and the backend has released its handles.
pub struct CaptureThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureThread {
    /// Spawn the capture thread.
    ///
    /// `make_backend` runs on the new thread, so the backend itself need not be `Send`.
    pub fn spawn<B, F>(
        make_backend: F,
        sink: ChunkCallback,
        delegate: Option<Arc<dyn CaptureDelegate>>,
    ) -> Result<Self, CaptureError>
    where
        B: CaptureBackend,
        F: FnOnce() -> B + Send + 'static,
    {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                request: None,
                cancelled: false,
                active: false,
                running: false,
                shutdown: false,
            }),
            wake: Condvar::new(),
            state: Mutex::new(CaptureState::Idle),
            delegate,
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let backend = make_backend();
                run(backend, &thread_shared, &sink);
                thread_shared.set_state(CaptureState::ShuttingDown);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Request a capture session with `config`.
    ///
    /// Ignored while a session is running or already requested, and after
    /// shutdown. A request stopped before it began is replaced.
    pub fn start_capture(&self, config: CaptureConfiguration) {
        let mut control = self.shared.control.lock();
        if control.shutdown {
            log::warn!("start_capture after shutdown ignored");
            return;
        }
        if control.running && control.active {
            log::warn!("start_capture while a session is active ignored");
            return;
        }
        if control.request.is_some() && !control.cancelled {
            log::warn!("start_capture while a session is pending ignored");
            return;
        }
        control.request = Some(config);
        control.cancelled = false;
        self.shared.wake.notify_all();
    }

    /// Ask the running or pending session to stop. Does not wait.
    pub fn stop_capture(&self) {
        let mut control = self.shared.control.lock();
        control.active = false;
        if control.request.is_some() {
            control.cancelled = true;
        }
        self.shared.wake.notify_all();
    }

    /// Stop any session, wait for cleanup and end the thread.
    pub fn shutdown(&self) {
        {
            let mut control = self.shared.control.lock();
            control.shutdown = true;
            control.active = false;
            self.shared.wake.notify_all();
        }

        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Called from a delegate on the capture thread itself; the loop exits on return.
            return;
        }
        if handle.join().is_err() {
            log::error!("capture thread panicked");
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.shared.state.lock()
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn next_request(shared: &Shared) -> Request {
    let mut control = shared.control.lock();
    while control.request.is_none() && !control.shutdown {
        shared.wake.wait(&mut control);
    }
    match control.request.take() {
        Some(_) if control.cancelled || control.shutdown => {
            control.cancelled = false;
            Request::Cancelled
        }
        Some(config) => {
            control.active = true;
            control.running = true;
            Request::Run(config)
        }
        None => Request::Exit,
    }
}

fn run<B: CaptureBackend>(mut backend: B, shared: &Shared, sink: &ChunkCallback) {
    loop {
        let config = match next_request(shared) {
            Request::Run(config) => config,
            Request::Cancelled => {
                log::info!("{}: session stopped before it started", backend.name());
                shared.notify_stopped();
                continue;
            }
            Request::Exit => return,
        };

        shared.set_state(CaptureState::Initializing);
        if let Err(e) = backend.initialize(&config) {
            log::warn!("{}: initialization failed: {}", backend.name(), e);
            {
                let mut control = shared.control.lock();
                control.active = false;
                control.running = false;
            }
            shared.set_state(CaptureState::Idle);
            if let Some(ref delegate) = shared.delegate {
                delegate.on_capture_failed(&e);
            }
            continue;
        }

        for source in backend.sources() {
            log::info!(
                "{}: {:?} source '{}' at {} Hz x {}",
                backend.name(),
                source.kind,
                source.name,
                source.format.sample_rate,
                source.format.channels
            );
        }

        shared.set_state(CaptureState::Capturing);
        if let Some(ref delegate) = shared.delegate {
            delegate.on_capture_started();
        }

        let mut diagnostics = CaptureSessionDiagnostics::default();
        let mut iterations = 0u64;
        {
            let mut emit = |chunk: Chunk| {
                if chunk.is_empty() {
                    return;
                }
                diagnostics.record_chunk(chunk.len(), config.hq_channels);
                sink(chunk);
            };

            while shared.is_active() {
                if let Err(e) = backend.iterate(&mut emit) {
                    log::error!("{}: capture read failed: {}", backend.name(), e);
                    shared.control.lock().active = false;
                    if let Some(ref delegate) = shared.delegate {
                        delegate.on_error(&e);
                    }
                    break;
                }
                iterations += 1;
            }

            shared.set_state(CaptureState::CleaningUp);
            backend.cleanup(&mut emit);
        }
        diagnostics.iterations = iterations;

        log::info!(
            "{}: session ended after {} iterations, {} chunks, {} frames",
            backend.name(),
            diagnostics.iterations,
            diagnostics.chunks_emitted,
            diagnostics.frames_emitted
        );
        shared.control.lock().running = false;
        shared.set_state(CaptureState::Idle);
        shared.notify_stopped();
    }
}
