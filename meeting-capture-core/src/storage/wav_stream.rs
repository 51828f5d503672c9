use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::CaptureError;
use crate::models::recording_result::WavFileSummary;
use crate::processing::wav_format::{self, WavSpec, WAV_HEADER_SIZE};

/// Streaming WAV file writer.
///
/// The header is written twice: a zeroed 44-byte placeholder on `open`, and
/// the real header with the final sizes at offset 0 on `finalize`.
///
/// ```text
/// [44-byte WAV header]
/// [raw sample data...]
/// ```
pub struct WavStream {
    path: PathBuf,
    spec: WavSpec,
    file: Option<BufWriter<File>>,
    data_bytes: u64,
}

impl WavStream {
    /// Create the file (and its parent directory) and reserve the header.
    pub fn open(path: impl Into<PathBuf>, spec: WavSpec) -> Result<Self, CaptureError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::StorageError(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&path)
            .map_err(|e| CaptureError::StorageError(format!("failed to create {}: {}", path.display(), e)))?;
        let mut file = BufWriter::new(file);
        file.write_all(&[0u8; WAV_HEADER_SIZE])
            .map_err(|e| CaptureError::StorageError(format!("failed to reserve header: {}", e)))?;

        Ok(Self {
            path,
            spec,
            file: Some(file),
            data_bytes: 0,
        })
    }

    /// Append encoded sample bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;
        self.data_bytes += data.len() as u64;
        Ok(())
    }

    /// Append float samples as little-endian IEEE float bytes.
    pub fn write_f32(&mut self, samples: &[f32]) -> Result<(), CaptureError> {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.write(&bytes)
    }

    /// Write the final header, close the file and compute its checksum.
    pub fn finalize(mut self) -> Result<WavFileSummary, CaptureError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CaptureError::StorageError("file is not open".into()))?;

        let data_size = u32::try_from(self.data_bytes).map_err(|_| {
            CaptureError::StorageError(format!("{} bytes exceed the WAV size limit", self.data_bytes))
        })?;
        let header = wav_format::generate_wav_header(&self.spec, data_size);

        file.seek(SeekFrom::Start(0))
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.write_all(&header)
            .map_err(|e| CaptureError::StorageError(e.to_string()))?;
        file.flush().map_err(|e| CaptureError::StorageError(e.to_string()))?;
        drop(file);

        let checksum = sha256_file(&self.path)?;
        log::debug!(
            "finalized {} ({} data bytes, {} Hz x {})",
            self.path.display(),
            self.data_bytes,
            self.spec.sample_rate,
            self.spec.channels
        );

        Ok(WavFileSummary {
            path: self.path.clone(),
            spec: self.spec,
            data_bytes: self.data_bytes,
            checksum,
        })
    }

    /// Sample bytes written so far (excluding the header).
    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn spec(&self) -> &WavSpec {
        &self.spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let data =
        fs::read(path).map_err(|e| CaptureError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    use crate::processing::wav_format::parse_wav_header;

    fn temp_path(name: &str) -> PathBuf {
        temp_dir().join(format!("meeting_capture_test_{}_{}.wav", name, std::process::id()))
    }

    #[test]
    fn open_reserves_zeroed_header() {
        let path = temp_path("placeholder");
        let stream = WavStream::open(&path, WavSpec::asr_pcm16(16000)).unwrap();
        drop(stream);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes, vec![0u8; WAV_HEADER_SIZE]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn finalize_writes_byte_accurate_header() {
        let path = temp_path("finalize");
        let mut stream = WavStream::open(&path, WavSpec::hq_float(48000, 2)).unwrap();
        stream.write_f32(&[0.5; 2 * 100]).unwrap();
        stream.write_f32(&[-0.25; 2 * 28]).unwrap();
        let summary = stream.finalize().unwrap();

        let bytes = fs::read(&path).unwrap();
        let header = parse_wav_header(&bytes).unwrap();
        assert_eq!(summary.data_bytes, 128 * 8);
        assert_eq!(header.data_size as u64, summary.data_bytes);
        assert_eq!(header.riff_size, 36 + header.data_size);
        assert_eq!(header.format_code, 3);
        assert_eq!(bytes.len(), WAV_HEADER_SIZE + 128 * 8);

        let first = f32::from_le_bytes([bytes[44], bytes[45], bytes[46], bytes[47]]);
        assert_eq!(first, 0.5);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn checksum_is_sha256_of_final_file() {
        let path = temp_path("checksum");
        let mut stream = WavStream::open(&path, WavSpec::asr_pcm16(16000)).unwrap();
        stream.write(&[1, 2, 3, 4]).unwrap();
        let summary = stream.finalize().unwrap();

        assert_eq!(summary.checksum.len(), 64);
        assert_eq!(summary.checksum, sha256_file(&path).unwrap());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = temp_dir().join(format!("meeting_capture_test_dir_{}", std::process::id()));
        let path = dir.join("nested").join("out.wav");
        let stream = WavStream::open(&path, WavSpec::asr_pcm16(16000)).unwrap();
        let summary = stream.finalize().unwrap();

        assert_eq!(summary.data_bytes, 0);
        assert!(path.exists());

        fs::remove_dir_all(&dir).ok();
    }
}
