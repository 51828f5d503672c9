//! Compile-time backend selection.

#[cfg(target_os = "windows")]
pub use meeting_capture_windows::WasapiBackend as PlatformBackend;

#[cfg(target_os = "linux")]
pub use meeting_capture_linux::PulseBackend as PlatformBackend;

#[cfg(target_os = "macos")]
pub use meeting_capture_macos::CpalBackend as PlatformBackend;

/// Constructs the backend on the capture thread.
pub fn make_backend() -> PlatformBackend {
    PlatformBackend::new()
}

#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
compile_error!("meeting-recorder supports Windows, Linux and macOS only");
