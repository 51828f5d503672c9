use std::fs;
use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingMetadata;

/// Sidecar location for a recording: `{recording}.metadata.json` without the audio extension.
pub fn metadata_path(recording_path: &Path) -> PathBuf {
    recording_path.with_extension("metadata.json")
}

/// Write recording metadata as a JSON sidecar file.
pub fn write_metadata(metadata: &RecordingMetadata, recording_path: &Path) -> Result<(), CaptureError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(recording_path), json)
        .map_err(|e| CaptureError::StorageError(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read recording metadata from a JSON sidecar file.
pub fn read_metadata(recording_path: &Path) -> Result<RecordingMetadata, CaptureError> {
    let json = fs::read_to_string(metadata_path(recording_path))
        .map_err(|e| CaptureError::StorageError(format!("failed to read metadata: {}", e)))?;
    let metadata: RecordingMetadata = serde_json::from_str(&json)
        .map_err(|e| CaptureError::StorageError(format!("failed to parse metadata: {}", e)))?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    use crate::models::recording_result::WavFileSummary;
    use crate::processing::wav_format::WavSpec;

    #[test]
    fn sidecar_round_trip() {
        let hq_path = temp_dir().join(format!("meeting_capture_test_meta_{}.wav", std::process::id()));
        let hq = WavFileSummary {
            path: hq_path.clone(),
            spec: WavSpec::hq_float(48000, 2),
            data_bytes: 768_000,
            checksum: "ab".repeat(32),
        };
        let asr = WavFileSummary {
            path: hq_path.with_file_name("asr.wav"),
            spec: WavSpec::asr_pcm16(16000),
            data_bytes: 64_000,
            checksum: "cd".repeat(32),
        };
        let metadata = RecordingMetadata::new(&hq, &asr, 2.0);

        write_metadata(&metadata, &hq_path).unwrap();
        let loaded = read_metadata(&hq_path).unwrap();

        assert_eq!(loaded, metadata);
        assert!(metadata_path(&hq_path).to_string_lossy().ends_with(".metadata.json"));

        fs::remove_file(metadata_path(&hq_path)).ok();
    }

    #[test]
    fn missing_sidecar_is_storage_error() {
        let err = read_metadata(Path::new("/nonexistent/meeting.wav")).unwrap_err();
        assert!(matches!(err, CaptureError::StorageError(_)));
    }
}
