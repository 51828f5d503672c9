use std::collections::VecDeque;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::WriterState;
use crate::processing::asr_downsampler::AsrDownsampler;
use crate::processing::wav_format::WavSpec;
use crate::storage::metadata::write_metadata;
use crate::storage::wav_stream::WavStream;
use crate::traits::capture_backend::{Chunk, ChunkCallback};
use crate::traits::capture_delegate::CaptureDelegate;

/// Both output streams plus the per-session settings read at start.
struct WriterSession {
    hq: WavStream,
    asr: WavStream,
    downsampler: AsrDownsampler,
    channels: usize,
    flush_threshold_bytes: usize,
    write_metadata: bool,
}

impl WriterSession {
    /// Write the buffered HQ samples verbatim and their decimated mono PCM to the ASR stream.
    fn flush(&mut self, buffer: &mut Vec<f32>) -> Result<(), CaptureError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let result = self.hq.write_f32(buffer).and_then(|_| {
            let pcm = self.downsampler.process_to_pcm16(buffer, self.channels);
            self.asr.write(&pcm)
        });
        log::trace!("flushed {} samples", buffer.len());
        buffer.clear();
        result
    }

    fn finish(self) -> Result<RecordingResult, CaptureError> {
        let write_metadata_sidecar = self.write_metadata;
        let hq = self.hq.finalize()?;
        let asr = self.asr.finalize()?;
        let result = RecordingResult::new(hq, asr);
        if write_metadata_sidecar {
            write_metadata(&result.metadata, &result.hq.path)?;
        }
        Ok(result)
    }
}

struct Control {
    active: bool,
    shutdown: bool,
    state: WriterState,
    pending: VecDeque<Chunk>,
    session: Option<WriterSession>,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    outcome: Mutex<Option<Result<RecordingResult, CaptureError>>>,
    finished: Condvar,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl Shared {
    fn set_state(&self, control: &mut Control, state: WriterState) {
        control.state = state;
        log::debug!("writer state -> {:?}", state);
    }

    fn push(&self, chunk: Chunk) {
        let mut control = self.control.lock();
        if !control.active {
            log::debug!("dropping {} samples: no writer session active", chunk.len());
            return;
        }
        control.pending.push_back(chunk);
        self.wake.notify_one();
    }
}

/// Single consumer of capture chunks, writing the HQ and ASR WAV files.
///
/// The thread has two wait points: an outer wait for a session (or
/// shutdown), and an inner wait for chunks while the session is active.
/// Chunks accumulate in memory until `flush_threshold_bytes` of HQ samples are
/// buffered, then go to both streams. `stop_writing` drains what is left,
/// finalizes both headers and reports the outcome once.
pub struct WavWriterThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WavWriterThread {
    pub fn spawn(delegate: Option<Arc<dyn CaptureDelegate>>) -> Result<Self, CaptureError> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                active: false,
                shutdown: false,
                state: WriterState::Idle,
                pending: VecDeque::new(),
                session: None,
            }),
            wake: Condvar::new(),
            outcome: Mutex::new(None),
            finished: Condvar::new(),
            delegate,
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("wav-writer".into())
            .spawn(move || {
                run(&thread_shared);
                let mut control = thread_shared.control.lock();
                thread_shared.set_state(&mut control, WriterState::ShuttingDown);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn writer thread: {}", e)))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Open both output files and arm a session.
    ///
    /// Files are created on the caller's thread, so an open failure is
    /// returned here and no chunk is ever accepted for the session.
    pub fn start_writing(
        &self,
        hq_path: impl AsRef<Path>,
        asr_path: impl AsRef<Path>,
        config: &CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        {
            let control = self.shared.control.lock();
            if control.shutdown {
                return Err(CaptureError::ConfigurationFailed("writer is shut down".into()));
            }
            if control.active || control.session.is_some() || !control.state.is_idle() {
                return Err(CaptureError::ConfigurationFailed("writer session already running".into()));
            }
        }

        let hq_path: PathBuf = hq_path.as_ref().into();
        let asr_path: PathBuf = asr_path.as_ref().into();
        let hq = WavStream::open(&hq_path, WavSpec::hq_float(config.target_sample_rate, config.hq_channels))?;
        let asr = WavStream::open(&asr_path, WavSpec::asr_pcm16(config.asr_sample_rate))?;
        log::info!("writing {} and {}", hq_path.display(), asr_path.display());

        let session = WriterSession {
            hq,
            asr,
            downsampler: AsrDownsampler::new(config.decimation_factor()),
            channels: config.hq_channels as usize,
            flush_threshold_bytes: config.flush_threshold_bytes,
            write_metadata: config.write_metadata,
        };

        let mut control = self.shared.control.lock();
        if control.shutdown || control.active || control.session.is_some() || !control.state.is_idle() {
            drop(control);
            discard(session);
            return Err(CaptureError::ConfigurationFailed("writer session already running".into()));
        }
        *self.shared.outcome.lock() = None;
        control.pending.clear();
        control.session = Some(session);
        control.active = true;
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Queue one chunk. Dropped when no session is active.
    pub fn write_chunk(&self, chunk: Chunk) {
        self.shared.push(chunk);
    }

    /// Callback suitable as a capture sink, feeding `write_chunk`.
    pub fn chunk_sink(&self) -> ChunkCallback {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |chunk: Chunk| shared.push(chunk))
    }

    /// End the session: remaining chunks are flushed and headers finalized. Does not wait.
    pub fn stop_writing(&self) {
        let mut control = self.shared.control.lock();
        control.active = false;
        self.shared.wake.notify_all();
    }

    /// Block until the current session's files are finalized, up to `timeout`.
    ///
    /// Returns `None` on timeout. The outcome is handed out once.
    pub fn wait_finished(&self, timeout: Duration) -> Option<Result<RecordingResult, CaptureError>> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.shared.outcome.lock();
        while outcome.is_none() {
            if self.shared.finished.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        outcome.take()
    }

    /// Finish any session and end the thread. Blocks until it has exited.
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
            return;
        }
        if handle.join().is_err() {
            log::error!("writer thread panicked");
        }
    }

    pub fn state(&self) -> WriterState {
        self.shared.control.lock().state
    }
}

impl Drop for WavWriterThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &Shared) {
    loop {
        let mut session = {
            let mut control = shared.control.lock();
            while control.session.is_none() && !control.shutdown {
                shared.wake.wait(&mut control);
            }
            match control.session.take() {
                Some(session) => {
                    shared.set_state(&mut control, WriterState::Writing);
                    session
                }
                None => return,
            }
        };

        let mut buffer: Vec<f32> = Vec::new();
        let mut failure: Option<CaptureError> = None;
        loop {
            let (batch, active) = {
                let mut control = shared.control.lock();
                while control.pending.is_empty() && control.active && !control.shutdown {
                    shared.wake.wait(&mut control);
                }
                let active = control.active && !control.shutdown;
                if !active {
                    shared.set_state(&mut control, WriterState::Finalizing);
                }
                (mem::take(&mut control.pending), active)
            };

            for chunk in batch {
                buffer.extend(chunk);
            }

            if failure.is_none() && buffer.len() * mem::size_of::<f32>() >= session.flush_threshold_bytes {
                if let Err(e) = session.flush(&mut buffer) {
                    report_error(shared, &e);
                    failure = Some(e);
                }
            }
            if failure.is_some() {
                buffer.clear();
            }

            if !active {
                break;
            }
        }

        if failure.is_none() {
            if let Err(e) = session.flush(&mut buffer) {
                report_error(shared, &e);
                failure = Some(e);
            }
        }

        // Headers are finalized even after a write error so the files stay readable.
        let outcome = session.finish();
        match &outcome {
            Ok(result) => {
                log::info!(
                    "finished writing {:.2}s: HQ {} bytes, ASR {} bytes",
                    result.duration_secs,
                    result.hq.data_bytes,
                    result.asr.data_bytes
                );
                if failure.is_none() {
                    if let Some(ref delegate) = shared.delegate {
                        delegate.on_writing_finished(result);
                    }
                }
            }
            Err(e) if failure.is_none() => report_error(shared, e),
            Err(e) => log::error!("wav writer: finalize after write error failed: {}", e),
        }
        let outcome = match (failure, outcome) {
            (Some(e), _) => Err(e),
            (None, outcome) => outcome,
        };

        // Idle and the outcome are published under the control lock.
        let mut control = shared.control.lock();
        shared.set_state(&mut control, WriterState::Idle);
        *shared.outcome.lock() = Some(outcome);
        shared.finished.notify_all();
    }
}

/// Close and delete the files of a session that lost the race to arm.
fn discard(session: WriterSession) {
    let paths = [session.hq.path().to_path_buf(), session.asr.path().to_path_buf()];
    drop(session);
    for path in paths {
        if let Err(e) = fs::remove_file(&path) {
            log::warn!("could not remove {}: {}", path.display(), e);
        }
    }
}

fn report_error(shared: &Shared, error: &CaptureError) {
    log::error!("wav writer: {}", error);
    if let Some(ref delegate) = shared.delegate {
        delegate.on_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;
    use std::fs;

    use crate::processing::wav_format::{parse_wav_header, WAV_HEADER_SIZE};
    use crate::session::capture_thread::tests::ChannelDelegate;

    fn temp_pair(name: &str) -> (PathBuf, PathBuf) {
        let base = format!("meeting_capture_test_{}_{}", name, std::process::id());
        (
            temp_dir().join(format!("{}_hq.wav", base)),
            temp_dir().join(format!("{}_asr.wav", base)),
        )
    }

    fn stereo_chunk(frames: usize, value: f32) -> Chunk {
        vec![value; frames * 2]
    }

    #[test]
    fn three_chunks_produce_expected_file_sizes() {
        let (hq, asr) = temp_pair("three_chunks");
        let writer = WavWriterThread::spawn(None).unwrap();

        writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
        for _ in 0..3 {
            writer.write_chunk(stereo_chunk(1024, 0.25));
        }
        writer.stop_writing();
        let result = writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();

        assert_eq!(fs::metadata(&hq).unwrap().len(), 44 + 3 * 1024 * 2 * 4);
        assert_eq!(fs::metadata(&asr).unwrap().len(), 44 + (3 * 1024 / 3) * 2);
        assert_eq!(result.hq.data_bytes, 3 * 1024 * 2 * 4);
        assert_eq!(result.asr.data_bytes, 1024 * 2);

        let hq_header = parse_wav_header(&fs::read(&hq).unwrap()).unwrap();
        assert_eq!(hq_header.format_code, 3);
        assert_eq!(hq_header.data_size, 24576);
        assert_eq!(hq_header.riff_size, 36 + 24576);

        let asr_bytes = fs::read(&asr).unwrap();
        let asr_header = parse_wav_header(&asr_bytes).unwrap();
        assert_eq!(asr_header.format_code, 1);
        assert_eq!(asr_header.channels, 1);
        assert_eq!(asr_header.sample_rate, 16000);
        assert_eq!(asr_header.data_size as usize, asr_bytes.len() - WAV_HEADER_SIZE);

        writer.shutdown();
        fs::remove_file(&hq).ok();
        fs::remove_file(&asr).ok();
    }

    #[test]
    fn small_threshold_flushes_match_single_flush() {
        let (hq_a, asr_a) = temp_pair("flush_small");
        let (hq_b, asr_b) = temp_pair("flush_large");
        let writer = WavWriterThread::spawn(None).unwrap();
        let chunks: Vec<Chunk> = (0..7)
            .map(|i| (0..(100 + i * 37) * 2).map(|s| ((s % 11) as f32 - 5.0) / 10.0).collect())
            .collect();

        let small = CaptureConfiguration {
            flush_threshold_bytes: 8 * 10,
            ..Default::default()
        };
        writer.start_writing(&hq_a, &asr_a, &small).unwrap();
        for chunk in &chunks {
            writer.write_chunk(chunk.clone());
        }
        writer.stop_writing();
        writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();

        writer.start_writing(&hq_b, &asr_b, &CaptureConfiguration::default()).unwrap();
        for chunk in &chunks {
            writer.write_chunk(chunk.clone());
        }
        writer.stop_writing();
        writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();

        assert_eq!(fs::read(&hq_a).unwrap(), fs::read(&hq_b).unwrap());
        assert_eq!(fs::read(&asr_a).unwrap(), fs::read(&asr_b).unwrap());

        writer.shutdown();
        for path in [hq_a, asr_a, hq_b, asr_b] {
            fs::remove_file(path).ok();
        }
    }

    #[test]
    fn chunks_without_session_are_dropped() {
        let (hq, asr) = temp_pair("dropped");
        let writer = WavWriterThread::spawn(None).unwrap();

        writer.write_chunk(stereo_chunk(512, 0.5));
        writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
        writer.stop_writing();
        let result = writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();

        assert_eq!(result.hq.data_bytes, 0);
        assert_eq!(result.asr.data_bytes, 0);

        writer.shutdown();
        fs::remove_file(&hq).ok();
        fs::remove_file(&asr).ok();
    }

    #[test]
    fn open_failure_is_reported_synchronously() {
        let writer = WavWriterThread::spawn(None).unwrap();
        let blocker = temp_dir().join(format!("meeting_capture_test_blocker_{}", std::process::id()));
        fs::write(&blocker, b"file, not a directory").unwrap();

        let err = writer
            .start_writing(blocker.join("hq.wav"), blocker.join("asr.wav"), &CaptureConfiguration::default())
            .unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
        assert_eq!(writer.state(), WriterState::Idle);

        writer.write_chunk(stereo_chunk(16, 0.1));
        assert!(writer.wait_finished(Duration::from_millis(50)).is_none());

        writer.shutdown();
        fs::remove_file(&blocker).ok();
    }

    #[test]
    fn finished_is_reported_once_to_delegate() {
        let (hq, asr) = temp_pair("delegate");
        let (delegate, rx) = ChannelDelegate::new();
        let writer = WavWriterThread::spawn(Some(delegate)).unwrap();

        writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
        writer.write_chunk(stereo_chunk(300, 0.1));
        writer.stop_writing();
        writer.stop_writing();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "finished");
        writer.shutdown();
        assert!(rx.try_recv().is_err());
        assert_eq!(writer.state(), WriterState::ShuttingDown);

        fs::remove_file(&hq).ok();
        fs::remove_file(&asr).ok();
    }

    #[test]
    fn shutdown_finalizes_active_session() {
        let (hq, asr) = temp_pair("shutdown");
        let writer = WavWriterThread::spawn(None).unwrap();

        writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
        writer.write_chunk(stereo_chunk(600, 0.1));
        writer.shutdown();

        let header = parse_wav_header(&fs::read(&hq).unwrap()).unwrap();
        assert_eq!(header.data_size, 600 * 8);

        fs::remove_file(&hq).ok();
        fs::remove_file(&asr).ok();
    }

    #[test]
    fn second_start_while_running_is_rejected() {
        let (hq, asr) = temp_pair("double_start");
        let writer = WavWriterThread::spawn(None).unwrap();

        writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
        let err = writer
            .start_writing(&hq, &asr, &CaptureConfiguration::default())
            .unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationFailed(_)));

        writer.stop_writing();
        writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();
        writer.shutdown();
        fs::remove_file(&hq).ok();
        fs::remove_file(&asr).ok();
    }

    #[test]
    fn writer_is_idle_once_outcome_is_available() {
        let writer = WavWriterThread::spawn(None).unwrap();
        let mut paths = Vec::new();

        for round in 0..10usize {
            let (hq, asr) = temp_pair(&format!("back_to_back_{}", round));
            writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).unwrap();
            writer.write_chunk(stereo_chunk(100 + round, 0.2));
            writer.stop_writing();

            let result = writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();
            assert_eq!(result.hq.path, hq);
            assert_eq!(result.hq.data_bytes, ((100 + round) * 8) as u64);
            assert_eq!(writer.state(), WriterState::Idle);
            paths.push(hq);
            paths.push(asr);
        }

        writer.shutdown();
        for path in paths {
            fs::remove_file(path).ok();
        }
    }

    #[test]
    fn concurrent_starts_arm_exactly_one_session() {
        let writer = Arc::new(WavWriterThread::spawn(None).unwrap());
        let pairs: Vec<(PathBuf, PathBuf)> = (0..8).map(|i| temp_pair(&format!("concurrent_{}", i))).collect();

        let handles: Vec<_> = pairs
            .iter()
            .cloned()
            .map(|(hq, asr)| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || writer.start_writing(&hq, &asr, &CaptureConfiguration::default()).is_ok())
            })
            .collect();
        let started: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(started.iter().filter(|ok| **ok).count(), 1);

        writer.stop_writing();
        let result = writer.wait_finished(Duration::from_secs(5)).unwrap().unwrap();
        for ((hq, asr), ok) in pairs.iter().zip(&started) {
            if *ok {
                assert_eq!(&result.hq.path, hq);
            } else {
                assert!(!hq.exists());
            }
            fs::remove_file(hq).ok();
            fs::remove_file(asr).ok();
        }
        writer.shutdown();
    }
}
