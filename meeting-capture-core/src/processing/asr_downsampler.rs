use super::stereo_mixer::frame_mean;

/// Mono-mixing integer decimator for the speech-recognition stream.
///
/// Each interleaved frame is averaged to mono. Out of every complete group of
/// `factor` consecutive frames, the first one is kept. Group position and the
/// held sample carry over between calls, so splitting the input into chunks
/// at arbitrary frame boundaries yields the same output as one pass over the
/// concatenation: `floor(total_frames / factor)` samples.
#[derive(Debug, Clone)]
pub struct AsrDownsampler {
    factor: usize,
    phase: usize,
    pending: f32,
}

impl AsrDownsampler {
    pub fn new(factor: usize) -> Self {
        Self {
            factor: factor.max(1),
            phase: 0,
            pending: 0.0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn reset(&mut self) {
        self.phase = 0;
        self.pending = 0.0;
    }

    /// Decimate interleaved float frames to mono float samples.
    pub fn process(&mut self, samples: &[f32], channels: usize) -> Vec<f32> {
        let channels = channels.max(1);
        let mut out = Vec::with_capacity(samples.len() / channels / self.factor + 1);
        for frame in samples.chunks_exact(channels) {
            if self.phase == 0 {
                self.pending = frame_mean(frame);
            }
            self.phase += 1;
            if self.phase == self.factor {
                out.push(self.pending);
                self.phase = 0;
            }
        }
        out
    }

    /// Decimate and quantize to little-endian 16-bit PCM bytes.
    pub fn process_to_pcm16(&mut self, samples: &[f32], channels: usize) -> Vec<u8> {
        convert_to_int16_pcm(&self.process(samples, channels))
    }
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit PCM (little-endian bytes).
///
/// Clamps out-of-range values. Output length = `samples.len() * 2` bytes.
pub fn convert_to_int16_pcm(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let int16_value = (clamped * i16::MAX as f32) as i16;
        data.extend_from_slice(&int16_value.to_le_bytes());
    }
    data
}
