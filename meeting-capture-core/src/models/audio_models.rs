use serde::{Deserialize, Serialize};

/// One of the two simultaneous capture sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Audio the machine is sending to its output device (loopback).
    System,
    Mic,
}

/// Sample rate and channel count negotiated with a native endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl NativeFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }
}

/// A native endpoint opened by a backend for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub name: String,
    pub kind: SourceKind,
    pub format: NativeFormat,
}

/// Per-session counters kept by the capture thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSessionDiagnostics {
    pub iterations: u64,
    pub chunks_emitted: u64,
    pub frames_emitted: u64,
}

impl CaptureSessionDiagnostics {
    pub fn record_chunk(&mut self, samples: usize, channels: u16) {
        self.chunks_emitted += 1;
        self.frames_emitted += (samples / channels.max(1) as usize) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_count_frames_not_samples() {
        let mut diag = CaptureSessionDiagnostics::default();
        diag.record_chunk(2048, 2);
        diag.record_chunk(100, 1);
        assert_eq!(diag.chunks_emitted, 2);
        assert_eq!(diag.frames_emitted, 1124);
    }

    #[test]
    fn source_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SourceKind::System).unwrap(), "\"system\"");
    }
}
