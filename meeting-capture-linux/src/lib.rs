//! # meeting-capture-linux
//!
//! Linux PulseAudio backend for meeting-capture.
//!
//! Provides:
//! - `PulseBackend` — blocking reads from the default sink monitor and from a
//!   private null sink the default microphone is looped into
//! - `pactl` — default device discovery and RAII module loading via the
//!   `pactl` command-line tool (works against PipeWire's Pulse server too)
//!
//! ## Usage
//! ```ignore
//! use meeting_capture_core::Recorder;
//! use meeting_capture_linux::PulseBackend;
//!
//! let recorder = Recorder::new(PulseBackend::new, None)?;
//! ```

pub mod pactl;
#[cfg(target_os = "linux")]
pub mod pulse_backend;

#[cfg(target_os = "linux")]
pub use pulse_backend::PulseBackend;
