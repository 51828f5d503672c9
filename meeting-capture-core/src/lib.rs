//! # meeting-capture-core
//!
//! Platform-agnostic core of the dual-source meeting recorder.
//!
//! Provides ring buffering, clock-paced resampling and mixing, ASR
//! decimation, WAV I/O, and the capture/writer thread pair. Platform backends
//! (WASAPI, PulseAudio, cpal) implement the `CaptureBackend` trait and are
//! driven by the generic `CaptureThread`.
//!
//! ## Architecture
//!
//! ```text
//! meeting-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, CaptureDelegate
//! ├── models/       ← CaptureError, CaptureState, WriterState, CaptureConfiguration, results
//! ├── processing/   ← RingBuffer, FramePacer, SourceResampler, StereoMixer, AsrDownsampler, WAV headers
//! ├── session/      ← CaptureThread, WavWriterThread, Recorder
//! └── storage/      ← WavStream, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioSource, CaptureSessionDiagnostics, NativeFormat, SourceKind};
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::{RecordingMetadata, RecordingResult, WavFileSummary};
pub use models::state::{CaptureState, WriterState};
pub use processing::asr_downsampler::AsrDownsampler;
pub use processing::frame_pacer::FramePacer;
pub use processing::ring_buffer::RingBuffer;
pub use processing::source_resampler::SourceResampler;
pub use processing::stereo_mixer::StereoMixer;
pub use processing::wav_format::{parse_wav_header, WavHeader, WavSpec};
pub use session::capture_thread::CaptureThread;
pub use session::recorder::Recorder;
pub use session::writer_thread::WavWriterThread;
pub use storage::wav_stream::WavStream;
pub use traits::capture_backend::{CaptureBackend, Chunk, ChunkCallback};
pub use traits::capture_delegate::CaptureDelegate;
