//! WASAPI polling backend: system loopback plus microphone.
//!
//! Both endpoints run in shared mode with their own mix formats. Each
//! iteration drains every pending packet from both capture clients into the
//! per-source ring buffers, then renders as many 48 kHz frames as wall-clock
//! time says are due. Silence from either side therefore never stalls the
//! other.
//!
//! ## Platform notes
//! - Loopback reads from a render endpoint (`AUDCLNT_STREAMFLAGS_LOOPBACK`);
//!   no permission is required, DRM-protected audio is silenced.
//! - Microphone access can be blocked in Settings > Privacy > Microphone;
//!   activation then fails with `E_ACCESSDENIED`.

use std::thread;
use std::time::{Duration, Instant};

use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Media::Audio::*;
use windows::Win32::Media::Multimedia::KSDATAFORMAT_SUBTYPE_IEEE_FLOAT;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use meeting_capture_core::models::audio_models::{AudioSource, NativeFormat, SourceKind};
use meeting_capture_core::models::config::CaptureConfiguration;
use meeting_capture_core::models::error::CaptureError;
use meeting_capture_core::processing::stereo_mixer::StereoMixer;
use meeting_capture_core::traits::capture_backend::{CaptureBackend, Chunk};

use crate::device_enumerator::DeviceEnumerator;

const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// 100 ms in 100-nanosecond units.
const BUFFER_DURATION: i64 = 1_000_000;

const E_ACCESSDENIED: i32 = -2147024891;
const AUDCLNT_E_DEVICE_IN_USE: i32 = -2004287478;

/// WASAPI implementation of [`CaptureBackend`].
///
/// Lives entirely on the capture thread. COM is entered on the first
/// `initialize` and left when the backend is dropped.
pub struct WasapiBackend {
    // Field order matters: COM objects must be released before CoUninitialize.
    session: Option<WasapiSession>,
    sources: Vec<AudioSource>,
    com: Option<ComApartment>,
}

impl WasapiBackend {
    pub fn new() -> Self {
        Self {
            session: None,
            sources: Vec::new(),
            com: None,
        }
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for WasapiBackend {
    fn initialize(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        self.session = None;
        self.sources.clear();
        if self.com.is_none() {
            self.com = Some(ComApartment::enter()?);
        }

        let enumerator = DeviceEnumerator::new()?;
        let system = WasapiEndpoint::open(&enumerator, SourceKind::System, config.loopback_device.as_deref())?;
        let mic = WasapiEndpoint::open(&enumerator, SourceKind::Mic, config.mic_device.as_deref())?;

        let mut mixer = StereoMixer::new(system.format, mic.format, config);
        system.start()?;
        mic.start()?;
        mixer.start(Instant::now());

        self.sources = vec![system.source(), mic.source()];
        self.session = Some(WasapiSession {
            system,
            mic,
            mixer,
            poll_interval: config.poll_interval(),
            drain_grace: Duration::from_secs_f64(config.drain_grace_secs),
            mmcss: register_pro_audio(),
        });
        Ok(())
    }

    fn iterate(&mut self, emit: &mut dyn FnMut(Chunk)) -> Result<(), CaptureError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CaptureError::ReadFailed("backend not initialized".into()))?;

        session.system.pull(&mut session.mixer)?;
        session.mic.pull(&mut session.mixer)?;

        match session.mixer.render_due(Instant::now()) {
            Some(chunk) => {
                log::trace!("wasapi: emitting {} samples", chunk.len());
                emit(chunk);
                thread::sleep(session.poll_interval);
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
        Ok(())
    }

    fn cleanup(&mut self, emit: &mut dyn FnMut(Chunk)) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        for endpoint in [&session.system, &session.mic] {
            if let Err(e) = endpoint.pull(&mut session.mixer) {
                log::warn!("wasapi: final read of {:?} failed: {}", endpoint.kind, e);
            }
        }
        if let Some(chunk) = session.mixer.drain(session.drain_grace) {
            log::debug!("wasapi: drained {} samples", chunk.len());
            emit(chunk);
        }

        log::info!(
            "wasapi: pulled {} system frames, {} mic frames",
            session.mixer.source(SourceKind::System).frames_pulled(),
            session.mixer.source(SourceKind::Mic).frames_pulled()
        );
        // Dropping the session stops both clients and releases them.
    }

    fn name(&self) -> &str {
        "wasapi"
    }

    fn sources(&self) -> Vec<AudioSource> {
        self.sources.clone()
    }
}

struct WasapiSession {
    system: WasapiEndpoint,
    mic: WasapiEndpoint,
    mixer: StereoMixer,
    poll_interval: Duration,
    drain_grace: Duration,
    mmcss: Option<HANDLE>,
}

impl Drop for WasapiSession {
    fn drop(&mut self) {
        if let Some(handle) = self.mmcss.take() {
            unsafe {
                let _ = AvRevertMmThreadCharacteristics(handle);
            }
        }
    }
}

/// One shared-mode audio client with its capture service.
struct WasapiEndpoint {
    kind: SourceKind,
    name: String,
    format: NativeFormat,
    client: IAudioClient,
    capture: IAudioCaptureClient,
}

impl WasapiEndpoint {
    fn open(enumerator: &DeviceEnumerator, kind: SourceKind, name_fragment: Option<&str>) -> Result<Self, CaptureError> {
        let (device, name) = enumerator.endpoint(kind, name_fragment)?;

        unsafe {
            let client: IAudioClient = device.Activate(CLSCTX_ALL, None).map_err(|e| activation_error(kind, e))?;

            let mix_format = MixFormat(
                client
                    .GetMixFormat()
                    .map_err(|e| CaptureError::ConfigurationFailed(format!("GetMixFormat failed: {}", e)))?,
            );
            let format = mix_format.native_float_format()?;

            let flags = match kind {
                SourceKind::System => AUDCLNT_STREAMFLAGS_LOOPBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                SourceKind::Mic => AUDCLNT_STREAMFLAGS_NOPERSIST,
            };
            client
                .Initialize(AUDCLNT_SHAREMODE_SHARED, flags, BUFFER_DURATION, 0, mix_format.0, None)
                .map_err(|e| {
                    CaptureError::ConfigurationFailed(format!("IAudioClient::Initialize ({:?}) failed: {}", kind, e))
                })?;

            let capture: IAudioCaptureClient = client
                .GetService()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

            log::info!("wasapi: opened {:?} endpoint '{}'", kind, name);
            Ok(Self {
                kind,
                name,
                format,
                client,
                capture,
            })
        }
    }

    fn start(&self) -> Result<(), CaptureError> {
        unsafe {
            self.client
                .Start()
                .map_err(|e| CaptureError::ConfigurationFailed(format!("IAudioClient::Start ({:?}) failed: {}", self.kind, e)))
        }
    }

    fn source(&self) -> AudioSource {
        AudioSource {
            name: self.name.clone(),
            kind: self.kind,
            format: self.format,
        }
    }

    /// Move every pending packet into the mixer. Returns the native frames read.
    fn pull(&self, mixer: &mut StereoMixer) -> Result<usize, CaptureError> {
        let channels = self.format.channels as usize;
        let mut pulled = 0usize;
        unsafe {
            loop {
                let packet = self
                    .capture
                    .GetNextPacketSize()
                    .map_err(|e| CaptureError::ReadFailed(format!("GetNextPacketSize failed: {}", e)))?;
                if packet == 0 {
                    break;
                }

                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;
                self.capture
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| CaptureError::ReadFailed(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 {
                    let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
                    if silent || buffer_ptr.is_null() {
                        mixer.push_silence(self.kind, num_frames as usize);
                    } else {
                        let samples =
                            std::slice::from_raw_parts(buffer_ptr as *const f32, num_frames as usize * channels);
                        mixer.push(self.kind, samples);
                    }
                }

                self.capture
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| CaptureError::ReadFailed(format!("ReleaseBuffer failed: {}", e)))?;
                pulled += num_frames as usize;
            }
        }
        Ok(pulled)
    }
}

impl Drop for WasapiEndpoint {
    fn drop(&mut self) {
        unsafe {
            let _ = self.client.Stop();
        }
    }
}

/// Mix format returned by `GetMixFormat`, freed with `CoTaskMemFree`.
struct MixFormat(*mut WAVEFORMATEX);

impl MixFormat {
    /// Rate and channel count, provided the shared-mode format is 32-bit float.
    fn native_float_format(&self) -> Result<NativeFormat, CaptureError> {
        // SAFETY: the pointer came from a successful GetMixFormat and lives until drop.
        let format = unsafe { std::ptr::read_unaligned(self.0) };
        let tag = format.wFormatTag;
        let bits = format.wBitsPerSample;
        let rate = format.nSamplesPerSec;
        let channels = format.nChannels;

        let sub_format = if tag == WAVE_FORMAT_EXTENSIBLE {
            // SAFETY: the extensible tag guarantees the pointee is a WAVEFORMATEXTENSIBLE.
            let ext = unsafe { std::ptr::read_unaligned(self.0 as *const WAVEFORMATEXTENSIBLE) };
            Some(ext.SubFormat)
        } else {
            None
        };

        if !is_float32_format(tag, bits, sub_format) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported mix format: tag {:#06x}, {} bits, sub-format {:?}",
                tag, bits, sub_format
            )));
        }
        if channels == 0 || rate == 0 {
            return Err(CaptureError::ConfigurationFailed("mix format reports no audio".into()));
        }
        Ok(NativeFormat::new(rate, channels))
    }
}

/// 32-bit IEEE float, either tagged directly or through the extensible sub-format.
fn is_float32_format(tag: u16, bits: u16, sub_format: Option<GUID>) -> bool {
    if bits != 32 {
        return false;
    }
    match tag {
        WAVE_FORMAT_IEEE_FLOAT => true,
        WAVE_FORMAT_EXTENSIBLE => sub_format == Some(KSDATAFORMAT_SUBTYPE_IEEE_FLOAT),
        _ => false,
    }
}

impl Drop for MixFormat {
    fn drop(&mut self) {
        unsafe {
            CoTaskMemFree(Some(self.0 as *const _ as *const _));
        }
    }
}

/// COM initialized (MTA) on the current thread until drop.
struct ComApartment;

impl ComApartment {
    fn enter() -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self)
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// MMCSS registration for real-time priority. Failure only costs scheduling priority.
fn register_pro_audio() -> Option<HANDLE> {
    let mut task_index: u32 = 0;
    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    unsafe {
        match AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::debug!("wasapi: MMCSS registration failed: {}", e);
                None
            }
        }
    }
}

fn activation_error(kind: SourceKind, error: windows::core::Error) -> CaptureError {
    match error.code().0 {
        E_ACCESSDENIED if kind == SourceKind::Mic => CaptureError::DeviceNotAvailable(
            "microphone access is disabled in Windows privacy settings".into(),
        ),
        AUDCLNT_E_DEVICE_IN_USE => {
            CaptureError::DeviceNotAvailable(format!("{:?} endpoint is in exclusive use", kind))
        }
        _ => CaptureError::ConfigurationFailed(format!("Activate ({:?}) failed: {}", kind, error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KSDATAFORMAT_SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);

    #[test]
    fn plain_float_tag_is_accepted() {
        assert!(is_float32_format(WAVE_FORMAT_IEEE_FLOAT, 32, None));
        assert!(!is_float32_format(WAVE_FORMAT_IEEE_FLOAT, 64, None));
    }

    #[test]
    fn extensible_needs_float_sub_format() {
        assert!(is_float32_format(WAVE_FORMAT_EXTENSIBLE, 32, Some(KSDATAFORMAT_SUBTYPE_IEEE_FLOAT)));
        assert!(!is_float32_format(WAVE_FORMAT_EXTENSIBLE, 32, Some(KSDATAFORMAT_SUBTYPE_PCM)));
        assert!(!is_float32_format(WAVE_FORMAT_EXTENSIBLE, 32, None));
    }

    #[test]
    fn integer_pcm_is_rejected() {
        assert!(!is_float32_format(0x0001, 32, None));
        assert!(!is_float32_format(0x0001, 16, None));
    }
}
