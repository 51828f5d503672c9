//! # meeting-capture-macos
//!
//! macOS backend for meeting-capture built on cpal (CoreAudio).
//!
//! macOS has no public loopback API that works without a signed system
//! extension, so system audio is read from a virtual loopback input device
//! (BlackHole, Loopback, Soundflower) that the user routes output through.
//!
//! Provides:
//! - `CpalBackend` — callback-driven capture of the microphone and the
//!   loopback device, mixed on the capture thread by `StereoMixer`
//! - `device_match` — device name selection shared by both inputs

pub mod device_match;
#[cfg(target_os = "macos")]
pub mod cpal_backend;

#[cfg(target_os = "macos")]
pub use cpal_backend::CpalBackend;
