//! PulseAudio backend: blocking reads from two sink monitors.
//!
//! The sound server paces delivery, so there is no clock-driven resampling
//! here: both streams are opened at the target rate in stereo float, each
//! iteration blocks for one block of frames from each, and the two blocks are
//! mixed sample by sample.

use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

use meeting_capture_core::models::audio_models::{AudioSource, NativeFormat, SourceKind};
use meeting_capture_core::models::config::CaptureConfiguration;
use meeting_capture_core::models::error::CaptureError;
use meeting_capture_core::processing::stereo_mixer::{downmix_to_mono, mix_blocks};
use meeting_capture_core::traits::capture_backend::{CaptureBackend, Chunk};

use crate::pactl::{self, VirtualMicRoute};

const APP_NAME: &str = "meeting-capture";

/// Frames read from each stream per iteration.
pub const FRAMES_PER_READ: usize = 1024;

/// Channels requested from the server for both streams.
const STREAM_CHANNELS: u8 = 2;

/// PulseAudio implementation of [`CaptureBackend`].
///
/// `config.loopback_device` overrides the sink whose monitor is recorded and
/// `config.mic_device` the source looped into the private mic sink; both take
/// exact server names. Unset, the server defaults from `pactl info` are used.
#[derive(Default)]
pub struct PulseBackend {
    session: Option<PulseSession>,
    sources: Vec<AudioSource>,
}

impl PulseBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

struct PulseSession {
    // Streams close before the route's modules are unloaded.
    system: Stream,
    mic: Stream,
    _route: VirtualMicRoute,
    system_gain: f32,
    mic_gain: f32,
    out_channels: u16,
    drain_frames: usize,
}

impl PulseSession {
    fn read_mixed(&mut self) -> Result<Chunk, CaptureError> {
        let system = self.system.read_block()?;
        let mic = self.mic.read_block()?;
        let mixed = mix_blocks(&system, &mic, self.system_gain, self.mic_gain);
        Ok(if self.out_channels == 1 {
            downmix_to_mono(&mixed, STREAM_CHANNELS as usize)
        } else {
            mixed
        })
    }
}

impl CaptureBackend for PulseBackend {
    fn initialize(&mut self, config: &CaptureConfiguration) -> Result<(), CaptureError> {
        self.session = None;
        self.sources.clear();

        let defaults = match (&config.loopback_device, &config.mic_device) {
            (Some(sink), Some(source)) => pactl::DefaultDevices {
                sink: sink.clone(),
                source: source.clone(),
            },
            _ => {
                let mut defaults = pactl::query_default_devices()?;
                if let Some(ref sink) = config.loopback_device {
                    defaults.sink = sink.clone();
                }
                if let Some(ref source) = config.mic_device {
                    defaults.source = source.clone();
                }
                defaults
            }
        };
        log::info!("pulse: default sink '{}', default source '{}'", defaults.sink, defaults.source);

        let route = VirtualMicRoute::create(&defaults.source)?;
        let rate = config.target_sample_rate;
        let system = Stream::open(SourceKind::System, &pactl::monitor_of(&defaults.sink), rate)?;
        let mic = Stream::open(SourceKind::Mic, &route.monitor(), rate)?;

        self.sources = vec![system.source(), mic.source()];
        self.session = Some(PulseSession {
            system,
            mic,
            _route: route,
            system_gain: config.system_gain,
            mic_gain: config.mic_gain,
            out_channels: config.hq_channels,
            drain_frames: (config.drain_grace_secs * rate as f64) as usize,
        });
        Ok(())
    }

    fn iterate(&mut self, emit: &mut dyn FnMut(Chunk)) -> Result<(), CaptureError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CaptureError::ReadFailed("backend not initialized".into()))?;
        let chunk = session.read_mixed()?;
        emit(chunk);
        Ok(())
    }

    fn cleanup(&mut self, emit: &mut dyn FnMut(Chunk)) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let mut remaining = session.drain_frames;
        while remaining > 0 {
            match session.read_mixed() {
                Ok(chunk) => emit(chunk),
                Err(e) => {
                    log::warn!("pulse: stopping drain: {}", e);
                    break;
                }
            }
            remaining = remaining.saturating_sub(FRAMES_PER_READ);
        }

        log::info!(
            "pulse: read {} system frames, {} mic frames",
            session.system.frames_read,
            session.mic.frames_read
        );
        // Dropping the session frees both streams, then unloads the modules.
    }

    fn name(&self) -> &str {
        "pulse"
    }

    fn sources(&self) -> Vec<AudioSource> {
        self.sources.clone()
    }
}

/// One blocking record stream.
struct Stream {
    kind: SourceKind,
    device: String,
    rate: u32,
    simple: Simple,
    bytes: Vec<u8>,
    frames_read: u64,
}

impl Stream {
    fn open(kind: SourceKind, device: &str, rate: u32) -> Result<Self, CaptureError> {
        let spec = Spec {
            format: Format::F32le,
            channels: STREAM_CHANNELS,
            rate,
        };
        if !spec.is_valid() {
            return Err(CaptureError::ConfigurationFailed(format!("invalid sample spec: {} Hz", rate)));
        }

        let stream_name = match kind {
            SourceKind::System => "system",
            SourceKind::Mic => "mic",
        };
        let simple = Simple::new(None, APP_NAME, Direction::Record, Some(device), stream_name, &spec, None, None)
            .map_err(|e| CaptureError::DeviceNotAvailable(format!("cannot record from {}: {}", device, e)))?;
        log::info!("pulse: recording {:?} from '{}'", kind, device);

        Ok(Self {
            kind,
            device: device.to_string(),
            rate,
            simple,
            bytes: vec![0u8; FRAMES_PER_READ * STREAM_CHANNELS as usize * std::mem::size_of::<f32>()],
            frames_read: 0,
        })
    }

    fn source(&self) -> AudioSource {
        AudioSource {
            name: self.device.clone(),
            kind: self.kind,
            format: NativeFormat::new(self.rate, STREAM_CHANNELS as u16),
        }
    }

    /// Block until one full block of interleaved frames has arrived.
    fn read_block(&mut self) -> Result<Vec<f32>, CaptureError> {
        self.simple
            .read(&mut self.bytes)
            .map_err(|e| CaptureError::ReadFailed(format!("{:?} read failed: {}", self.kind, e)))?;
        self.frames_read += FRAMES_PER_READ as u64;
        Ok(decode_f32le(&self.bytes))
    }
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_floats() {
        let mut bytes = Vec::new();
        for v in [0.5f32, -1.0, 0.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.push(0xff);
        assert_eq!(decode_f32le(&bytes), vec![0.5, -1.0, 0.25]);
    }
}
