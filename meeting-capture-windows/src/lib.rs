//! # meeting-capture-windows
//!
//! Windows WASAPI backend for meeting-capture.
//!
//! Provides:
//! - `WasapiBackend` — loopback on a render endpoint plus a capture endpoint,
//!   polled and mixed on the capture thread
//! - `DeviceEnumerator` — endpoint lookup by friendly name via the MMDevice API
//!
//! ## Usage
//! ```ignore
//! use meeting_capture_core::Recorder;
//! use meeting_capture_windows::WasapiBackend;
//!
//! let recorder = Recorder::new(WasapiBackend::new, None)?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod wasapi_backend;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use wasapi_backend::WasapiBackend;
