use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::processing::wav_format::WavSpec;

/// A finalized WAV file written by one session.
#[derive(Debug, Clone, PartialEq)]
pub struct WavFileSummary {
    pub path: PathBuf,
    pub spec: WavSpec,
    /// Bytes of sample data after the 44-byte header.
    pub data_bytes: u64,
    /// SHA-256 hex digest of the finalized file.
    pub checksum: String,
}

impl WavFileSummary {
    pub fn duration_secs(&self) -> f64 {
        let byte_rate = self.spec.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        self.data_bytes as f64 / byte_rate as f64
    }
}

/// Result reported when a writer session finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub hq: WavFileSummary,
    pub asr: WavFileSummary,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
}

/// Metadata describing a finished session.
///
/// Serializable for the JSON sidecar written next to the HQ file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub hq_path: String,
    pub hq_checksum: String,
    pub hq_data_bytes: u64,
    pub asr_path: String,
    pub asr_checksum: String,
    pub asr_data_bytes: u64,
}

impl RecordingMetadata {
    pub fn new(hq: &WavFileSummary, asr: &WavFileSummary, duration_secs: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs,
            hq_path: hq.path.to_string_lossy().to_string(),
            hq_checksum: hq.checksum.clone(),
            hq_data_bytes: hq.data_bytes,
            asr_path: asr.path.to_string_lossy().to_string(),
            asr_checksum: asr.checksum.clone(),
            asr_data_bytes: asr.data_bytes,
        }
    }
}

impl RecordingResult {
    pub fn new(hq: WavFileSummary, asr: WavFileSummary) -> Self {
        let duration_secs = hq.duration_secs();
        let metadata = RecordingMetadata::new(&hq, &asr, duration_secs);
        Self {
            hq,
            asr,
            duration_secs,
            metadata,
        }
    }
}
