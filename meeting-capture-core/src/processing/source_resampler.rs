use crate::models::audio_models::{NativeFormat, SourceKind};

use super::ring_buffer::RingBuffer;

/// Buffers one native source and reads it back at the target rate.
///
/// Holds one ring buffer per channel (at most two; extra native channels are
/// dropped) and a fractional resample cursor advanced by
/// `native_rate / target_rate` per output frame.
#[derive(Debug, Clone)]
pub struct SourceResampler {
    kind: SourceKind,
    format: NativeFormat,
    rings: Vec<RingBuffer>,
    cursor: f64,
    ratio: f64,
    frames_pulled: u64,
}

impl SourceResampler {
    pub fn new(kind: SourceKind, format: NativeFormat, target_rate: u32, ring_capacity: usize) -> Self {
        let ring_count = format.channels.clamp(1, 2) as usize;
        Self {
            kind,
            format,
            rings: (0..ring_count).map(|_| RingBuffer::new(ring_capacity)).collect(),
            cursor: 0.0,
            ratio: format.sample_rate as f64 / target_rate.max(1) as f64,
            frames_pulled: 0,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn format(&self) -> NativeFormat {
        self.format
    }

    /// Native frames advanced per output frame.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Native frames pushed since construction or the last `reset`.
    pub fn frames_pulled(&self) -> u64 {
        self.frames_pulled
    }

    /// Native frames currently buffered.
    pub fn buffered_frames(&self) -> usize {
        self.rings.iter().map(RingBuffer::len).min().unwrap_or(0)
    }

    /// Append interleaved native frames. A trailing partial frame is ignored.
    pub fn push_interleaved(&mut self, samples: &[f32]) {
        let channels = self.format.channels.max(1) as usize;
        let frames = samples.len() / channels;
        if frames == 0 {
            return;
        }

        let mut plane = Vec::with_capacity(frames);
        for (ch, ring) in self.rings.iter_mut().enumerate() {
            plane.clear();
            plane.extend(samples.chunks_exact(channels).map(|frame| frame[ch]));
            ring.write(&plane);
        }
        self.frames_pulled += frames as u64;
    }

    /// Append `frames` native frames of silence.
    pub fn push_silence(&mut self, frames: usize) {
        if frames == 0 {
            return;
        }
        let zeros = vec![0.0f32; frames];
        for ring in &mut self.rings {
            ring.write(&zeros);
        }
        self.frames_pulled += frames as u64;
    }

    /// Whether the sample one step past the cursor is already buffered.
    pub fn has_frame(&self) -> bool {
        self.cursor + self.ratio < self.buffered_frames() as f64
    }

    /// Output frames that can still be read before the buffered data runs out.
    pub fn frames_available(&self) -> usize {
        let ahead = self.buffered_frames() as f64 - self.cursor - self.ratio;
        if ahead <= 0.0 || self.ratio <= 0.0 {
            return 0;
        }
        (ahead / self.ratio).ceil() as usize
    }

    /// Read the (left, right) pair at the cursor and advance it.
    ///
    /// Yields silence while the source has not delivered enough data; a mono
    /// source is duplicated onto both sides.
    pub fn next_frame(&mut self) -> (f32, f32) {
        let frame = if self.has_frame() {
            let left = self.rings[0].sample_at(self.cursor);
            let right = match self.rings.get(1) {
                Some(ring) => ring.sample_at(self.cursor),
                None => left,
            };
            (left, right)
        } else {
            (0.0, 0.0)
        };
        self.cursor += self.ratio;
        frame
    }

    /// Drop the whole native frames the cursor has moved past.
    pub fn consume_read(&mut self) {
        let whole = self.cursor.floor();
        if whole >= 1.0 {
            for ring in &mut self.rings {
                ring.consume(whole as usize);
            }
            self.cursor -= whole;
        }
    }

    /// Empty the rings and rewind the cursor for a new session.
    pub fn reset(&mut self) {
        for ring in &mut self.rings {
            ring.clear();
        }
        self.cursor = 0.0;
        self.frames_pulled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stereo_48k() -> SourceResampler {
        SourceResampler::new(SourceKind::System, NativeFormat::new(48000, 2), 48000, 4800)
    }

    #[test]
    fn deinterleaves_stereo() {
        let mut src = stereo_48k();
        src.push_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);

        assert_eq!(src.buffered_frames(), 3);
        assert_eq!(src.next_frame(), (0.1, -0.1));
        assert_eq!(src.next_frame(), (0.2, -0.2));
    }

    #[test]
    fn mono_source_is_duplicated() {
        let mut src = SourceResampler::new(SourceKind::Mic, NativeFormat::new(48000, 1), 48000, 100);
        src.push_interleaved(&[0.5, 0.25, 0.0]);

        assert_eq!(src.next_frame(), (0.5, 0.5));
    }

    #[test]
    fn extra_native_channels_are_dropped() {
        let mut src = SourceResampler::new(SourceKind::System, NativeFormat::new(48000, 4), 48000, 100);
        src.push_interleaved(&[0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9, 0.5, 0.6, 0.9, 0.9]);

        assert_eq!(src.buffered_frames(), 3);
        assert_eq!(src.next_frame(), (0.1, 0.2));
    }

    #[test]
    fn empty_source_yields_silence_and_keeps_pace() {
        let mut src = stereo_48k();
        for _ in 0..10 {
            assert_eq!(src.next_frame(), (0.0, 0.0));
        }
        src.consume_read();
        assert_eq!(src.cursor(), 0.0);
    }

    #[test]
    fn upsampling_interpolates() {
        // 24 kHz native read at 48 kHz: every other output frame is a midpoint.
        let mut src = SourceResampler::new(SourceKind::Mic, NativeFormat::new(24000, 1), 48000, 100);
        src.push_interleaved(&[0.0, 1.0, 2.0, 3.0]);

        let left: Vec<f32> = (0..4).map(|_| src.next_frame().0).collect();
        assert_abs_diff_eq!(left[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(left[1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(left[2], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(left[3], 1.5, epsilon = 1e-6);
    }

    #[test]
    fn consume_keeps_fractional_cursor() {
        let mut src = SourceResampler::new(SourceKind::System, NativeFormat::new(44100, 2), 48000, 44100);
        src.push_interleaved(&vec![0.0; 2 * 1000]);

        for _ in 0..100 {
            src.next_frame();
        }
        let before = src.cursor();
        src.consume_read();

        assert_abs_diff_eq!(src.cursor(), before.fract(), epsilon = 1e-9);
        assert_eq!(src.buffered_frames(), 1000 - before.floor() as usize);
    }

    #[test]
    fn frames_available_matches_readable_frames() {
        let mut src = stereo_48k();
        src.push_interleaved(&vec![0.25; 2 * 10]);

        let available = src.frames_available();
        let readable = (0..20).take_while(|_| {
            let ok = src.has_frame();
            src.next_frame();
            ok
        });
        assert_eq!(readable.count(), available);
    }

    #[test]
    fn reset_clears_everything() {
        let mut src = stereo_48k();
        src.push_interleaved(&[0.1, 0.1, 0.2, 0.2]);
        src.next_frame();
        src.reset();

        assert_eq!(src.buffered_frames(), 0);
        assert_eq!(src.cursor(), 0.0);
        assert_eq!(src.frames_pulled(), 0);
    }
}
