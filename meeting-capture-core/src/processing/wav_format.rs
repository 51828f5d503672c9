/// WAV file format utilities.
///
/// Generates and parses standard 44-byte RIFF WAV headers for the two
/// stream encodings this crate writes: IEEE float32 and 16-bit PCM.
use crate::models::error::CaptureError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

pub const FORMAT_PCM: u16 = 1;
pub const FORMAT_IEEE_FLOAT: u16 = 3;

/// Sample encoding of a WAV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    Float32,
    Pcm16,
}

impl SampleEncoding {
    pub fn format_code(&self) -> u16 {
        match self {
            Self::Float32 => FORMAT_IEEE_FLOAT,
            Self::Pcm16 => FORMAT_PCM,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::Float32 => 32,
            Self::Pcm16 => 16,
        }
    }
}

/// Fixed format parameters of one WAV stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl WavSpec {
    /// High-quality float stream.
    pub fn hq_float(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Float32,
        }
    }

    /// Mono 16-bit stream for speech recognition.
    pub fn asr_pcm16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            encoding: SampleEncoding::Pcm16,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.encoding.bits_per_sample()
    }

    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample() / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Header fields read back from a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (format chunk size)
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bits / 8
/// [32-33]  block_align = channels * bits / 8
/// [34-35]  bits_per_sample
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(spec: &WavSpec, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let riff_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    // RIFF chunk descriptor
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    // fmt sub-chunk
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&spec.encoding.format_code().to_le_bytes());
    header[22..24].copy_from_slice(&spec.channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&spec.byte_rate().to_le_bytes());
    header[32..34].copy_from_slice(&spec.block_align().to_le_bytes());
    header[34..36].copy_from_slice(&spec.bits_per_sample().to_le_bytes());

    // data sub-chunk
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Parse the leading 44-byte header of a WAV file.
pub fn parse_wav_header(bytes: &[u8]) -> Result<WavHeader, CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::InvalidWav(format!(
            "header needs {} bytes, got {}",
            WAV_HEADER_SIZE,
            bytes.len()
        )));
    }

    let tag = |offset: usize, expected: &[u8; 4]| -> Result<(), CaptureError> {
        if &bytes[offset..offset + 4] == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidWav(format!(
                "expected {:?} at offset {}",
                String::from_utf8_lossy(expected),
                offset
            )))
        }
    };
    tag(0, b"RIFF")?;
    tag(8, b"WAVE")?;
    tag(12, b"fmt ")?;
    tag(36, b"data")?;

    let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
    let u32_at = |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);

    let fmt_size = u32_at(16);
    if fmt_size != 16 {
        return Err(CaptureError::InvalidWav(format!("unsupported fmt chunk size {}", fmt_size)));
    }

    Ok(WavHeader {
        riff_size: u32_at(4),
        format_code: u16_at(20),
        channels: u16_at(22),
        sample_rate: u32_at(24),
        byte_rate: u32_at(28),
        block_align: u16_at(32),
        bits_per_sample: u16_at(34),
        data_size: u32_at(40),
    })
}
