//! cpal backend: microphone plus a loopback virtual input device.
//!
//! CoreAudio delivers samples on its own callback threads. The callbacks only
//! append to a shared pending buffer; the capture thread drains both buffers
//! into the mixer's per-source rings on every iteration and renders whatever
//! wall-clock time says is due, exactly like the WASAPI backend.
//!
//! ## Platform notes
//! - Microphone access needs the TCC grant (`NSMicrophoneUsageDescription`).
//!   Without it CoreAudio delivers silence instead of failing.
//! - The loopback device only carries audio while system output is routed
//!   through it (usually via a Multi-Output Device in Audio MIDI Setup).

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;

use meeting_capture_core::models::audio_models::{AudioSource, NativeFormat, SourceKind};
use meeting_capture_core::models::config::CaptureConfiguration;
use meeting_capture_core::models::error::CaptureError;
use meeting_capture_core::processing::stereo_mixer::StereoMixer;
use meeting_capture_core::traits::capture_backend::{CaptureBackend, Chunk};

use crate::device_match::{self, DEFAULT_LOOPBACK_FRAGMENT};

/// cpal implementation of [`CaptureBackend`].
///
/// `config.mic_device` and `config.loopback_device` are case-insensitive
/// name fragments. The microphone defaults to the system default input and
/// the loopback device to the first input whose name contains "BlackHole".
#[derive(Default)]
pub struct CpalBackend {
    session: Option<CpalSession>,
    sources: Vec<AudioSource>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

struct CpalSession {
    system: CpalInput,
    mic: CpalInput,
    mixer: StereoMixer,
    poll_interval: Duration,
    drain_grace: Duration,
}

impl CaptureBackend for CpalBackend {
    fn initialize(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        self.session = None;
        self.sources.clear();

        let host = cpal::default_host();
        let (mic_device, mic_name) = select_mic(&host, config.mic_device.as_deref())?;
        let fragment = config
            .loopback_device
            .as_deref()
            .unwrap_or(DEFAULT_LOOPBACK_FRAGMENT);
        let (system_device, system_name) = select_loopback(&host, fragment, &mic_name)?;

        let system = CpalInput::open(&system_device, system_name, SourceKind::System)?;
        let mic = CpalInput::open(&mic_device, mic_name, SourceKind::Mic)?;

        let mut mixer = StereoMixer::new(system.format, mic.format, config);
        system.play()?;
        mic.play()?;
        mixer.start(Instant::now());

        self.sources = vec![system.source(), mic.source()];
        self.session = Some(CpalSession {
            system,
            mic,
            mixer,
            poll_interval: config.poll_interval(),
            drain_grace: Duration::from_secs_f64(config.drain_grace_secs),
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
                log::trace!("cpal: emitting {} samples", chunk.len());
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

        // Stop the callbacks first so the final pull sees everything.
        for input in [&session.system, &session.mic] {
            if let Err(e) = input.stream.pause() {
                log::debug!("cpal: pausing {} failed: {}", input.name, e);
            }
        }
        for input in [&session.system, &session.mic] {
            if let Err(e) = input.pull(&mut session.mixer) {
                log::warn!("cpal: final read of {:?} failed: {}", input.kind, e);
            }
        }
        if let Some(chunk) = session.mixer.drain(session.drain_grace) {
            log::debug!("cpal: drained {} samples", chunk.len());
            emit(chunk);
        }

        log::info!(
            "cpal: pulled {} system frames, {} mic frames",
            session.mixer.source(SourceKind::System).frames_pulled(),
            session.mixer.source(SourceKind::Mic).frames_pulled()
        );
    }

    fn name(&self) -> &str {
        "cpal"
    }

    fn sources(&self) -> Vec<AudioSource> {
        self.sources.clone()
    }
}

/// One running input stream and the buffer its callback fills.
struct CpalInput {
    kind: SourceKind,
    name: String,
    format: NativeFormat,
    stream: Stream,
    pending: Arc<Mutex<Vec<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl CpalInput {
    fn open(device: &Device, name: String, kind: SourceKind) -> Result<Self, CaptureError> {
        let supported = device.default_input_config().map_err(|e| {
            CaptureError::ConfigurationFailed(format!("{}: no input config: {}", name, e))
        })?;
        let format = NativeFormat::new(supported.sample_rate().0, supported.channels());
        let config: StreamConfig = supported.config();

        let pending = Arc::new(Mutex::new(Vec::new()));
        let failure = Arc::new(Mutex::new(None));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(device, &config, &pending, &failure, |s| s)?,
            SampleFormat::I16 => {
                build_stream::<i16>(device, &config, &pending, &failure, |s| s as f32 / 32768.0)?
            }
            SampleFormat::I32 => build_stream::<i32>(device, &config, &pending, &failure, |s| {
                s as f32 / 2_147_483_648.0
            })?,
            other => {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "{}: unsupported sample format {:?}",
                    name, other
                )))
            }
        };

        log::info!(
            "cpal: {:?} source {:?} at {} Hz, {} channel(s)",
            kind,
            name,
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            kind,
            name,
            format,
            stream,
            pending,
            failure,
        })
    }

    fn play(&self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::ConfigurationFailed(format!("{}: start failed: {}", self.name, e)))
    }

    fn source(&self) -> AudioSource {
        AudioSource {
            name: self.name.clone(),
            kind: self.kind,
            format: self.format,
        }
    }

    /// Moves everything the callback has delivered into the mixer.
    fn pull(&self, mixer: &mut StereoMixer) -> Result<(), CaptureError> {
        if let Some(message) = self.failure.lock().take() {
            return Err(CaptureError::ReadFailed(format!("{}: {}", self.name, message)));
        }
        let samples = std::mem::take(&mut *self.pending.lock());
        if !samples.is_empty() {
            mixer.push(self.kind, &samples);
        }
        Ok(())
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    pending: &Arc<Mutex<Vec<f32>>>,
    failure: &Arc<Mutex<Option<String>>>,
    convert: fn(T) -> f32,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
{
    let pending = Arc::clone(pending);
    let failure = Arc::clone(failure);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                pending.lock().extend(data.iter().map(|&s| convert(s)));
            },
            move |err| {
                log::error!("cpal: stream error: {}", err);
                *failure.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to build stream: {}", e)))
}

fn input_devices(host: &Host) -> Result<Vec<(Device, String)>, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceNotAvailable(format!("cannot list input devices: {}", e)))?;
    Ok(devices
        .filter_map(|device| device.name().ok().map(|name| (device, name)))
        .collect())
}

fn pick(
    host: &Host,
    fragment: &str,
    exclude: Option<&str>,
    what: &str,
) -> Result<(Device, String), CaptureError> {
    let mut devices = input_devices(host)?;
    let names: Vec<String> = devices.iter().map(|(_, name)| name.clone()).collect();
    match device_match::find_device(&names, fragment, exclude) {
        Some(index) => Ok(devices.swap_remove(index)),
        None => Err(CaptureError::DeviceNotAvailable(format!(
            "no {} matching {:?} (found: {})",
            what,
            fragment,
            device_match::describe(&names)
        ))),
    }
}

fn select_mic(host: &Host, fragment: Option<&str>) -> Result<(Device, String), CaptureError> {
    match fragment {
        Some(fragment) => pick(host, fragment, None, "microphone"),
        None => {
            let device = host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceNotAvailable("no default input device".into()))?;
            let name = device
                .name()
                .map_err(|e| CaptureError::DeviceNotAvailable(format!("default input: {}", e)))?;
            Ok((device, name))
        }
    }
}

fn select_loopback(host: &Host, fragment: &str, mic_name: &str) -> Result<(Device, String), CaptureError> {
    pick(host, fragment, Some(mic_name), "loopback device")
}
