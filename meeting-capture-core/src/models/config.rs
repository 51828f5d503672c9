use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Per-session capture configuration.
///
/// Read once when a session starts; changing it mid-session has no effect
/// until the next start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Multiplier applied to system-output (loopback) samples (default: 0.5).
    pub system_gain: f32,

    /// Multiplier applied to microphone samples (default: 6.0).
    pub mic_gain: f32,

    /// Bytes of HQ float samples buffered by the writer before a flush (default: 384 KiB).
    pub flush_threshold_bytes: usize,

    /// Output rate of the mixed HQ stream in Hz (default: 48000).
    pub target_sample_rate: u32,

    /// Channels of the HQ stream (default: 2).
    pub hq_channels: u16,

    /// Rate of the mono ASR stream in Hz (default: 16000).
    pub asr_sample_rate: u32,

    /// Seconds of native-rate audio each ring buffer holds (default: 5).
    pub ring_buffer_secs: f64,

    /// Maximum seconds of buffered audio drained when a session stops (default: 0.5).
    pub drain_grace_secs: f64,

    /// Sleep between polling iterations in milliseconds (default: 5).
    pub poll_interval_ms: u64,

    /// Name fragment of the loopback input device, where the platform needs one.
    pub loopback_device: Option<String>,

    /// Name fragment of the microphone, or None for the system default.
    pub mic_device: Option<String>,

    /// Write a JSON metadata sidecar next to the HQ file on finalize.
    pub write_metadata: bool,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !self.system_gain.is_finite() || self.system_gain < 0.0 {
            return Err(format!("invalid system gain: {}", self.system_gain));
        }
        if !self.mic_gain.is_finite() || self.mic_gain < 0.0 {
            return Err(format!("invalid mic gain: {}", self.mic_gain));
        }
        if ![1, 2].contains(&self.hq_channels) {
            return Err(format!("unsupported channel count: {}", self.hq_channels));
        }
        if self.target_sample_rate == 0 || self.asr_sample_rate == 0 {
            return Err("sample rates must be positive".into());
        }
        if self.target_sample_rate % self.asr_sample_rate != 0 {
            return Err(format!(
                "target rate {} is not an integer multiple of ASR rate {}",
                self.target_sample_rate, self.asr_sample_rate
            ));
        }
        let frame_bytes = self.hq_frame_bytes();
        if self.flush_threshold_bytes == 0 || self.flush_threshold_bytes % frame_bytes != 0 {
            return Err(format!(
                "flush threshold {} must be a positive multiple of {} bytes",
                self.flush_threshold_bytes, frame_bytes
            ));
        }
        if !(self.ring_buffer_secs > 0.0) {
            return Err("ring buffer length must be positive".into());
        }
        if !(self.drain_grace_secs >= 0.0) {
            return Err("drain grace must not be negative".into());
        }
        Ok(())
    }

    /// Integer ratio between the HQ and ASR sample rates.
    pub fn decimation_factor(&self) -> usize {
        (self.target_sample_rate / self.asr_sample_rate.max(1)) as usize
    }

    /// Size of one interleaved HQ frame in bytes (float32 samples).
    pub fn hq_frame_bytes(&self) -> usize {
        self.hq_channels as usize * std::mem::size_of::<f32>()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Ring buffer capacity in samples for one channel at `native_rate`.
    pub fn ring_capacity(&self, native_rate: u32) -> usize {
        ((native_rate as f64 * self.ring_buffer_secs) as usize).max(1)
    }

    /// Load a configuration from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            system_gain: 0.5,
            mic_gain: 6.0,
            flush_threshold_bytes: 384 * 1024,
            target_sample_rate: 48000,
            hq_channels: 2,
            asr_sample_rate: 16000,
            ring_buffer_secs: 5.0,
            drain_grace_secs: 0.5,
            poll_interval_ms: 5,
            loopback_device: None,
            mic_device: None,
            write_metadata: false,
        }
    }
}
