use std::time::{Duration, Instant};

use crate::models::audio_models::{NativeFormat, SourceKind};
use crate::models::config::CaptureConfiguration;

use super::frame_pacer::FramePacer;
use super::source_resampler::SourceResampler;

/// Gain-scale, sum and clip one output sample.
#[inline]
pub fn mix_sample(system: f32, mic: f32, system_gain: f32, mic_gain: f32) -> f32 {
    (system * system_gain + mic * mic_gain).clamp(-1.0, 1.0)
}

/// Mix two equally long interleaved blocks that already share rate and channel count.
///
/// If one block is shorter, its missing samples are treated as silence.
pub fn mix_blocks(system: &[f32], mic: &[f32], system_gain: f32, mic_gain: f32) -> Vec<f32> {
    let len = system.len().max(mic.len());
    (0..len)
        .map(|i| {
            let sys = system.get(i).copied().unwrap_or(0.0);
            let mic = mic.get(i).copied().unwrap_or(0.0);
            mix_sample(sys, mic, system_gain, mic_gain)
        })
        .collect()
}

/// Average of the channels of one interleaved frame.
#[inline]
pub fn frame_mean(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<f32>() / frame.len() as f32
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples.chunks_exact(channels).map(frame_mean).collect()
}

/// Clock-paced mixer for the two capture sources.
///
/// Native frames from each source are pushed as they arrive. On each
/// `render_due` the wall-clock time since the previous call is converted into
/// target-rate frames; each frame reads both sources at their resample cursors,
/// applies gains, sums per channel and clips to [-1, 1]. A source that has not
/// delivered data contributes silence, so both stay aligned on the clock.
///
/// Output is interleaved with `hq_channels` channels (stereo: L, R; mono: the
/// average of L and R).
#[derive(Debug, Clone)]
pub struct StereoMixer {
    system: SourceResampler,
    mic: SourceResampler,
    system_gain: f32,
    mic_gain: f32,
    out_channels: u16,
    target_rate: u32,
    pacer: FramePacer,
}

impl StereoMixer {
    pub fn new(system: NativeFormat, mic: NativeFormat, config: &CaptureConfiguration) -> Self {
        let rate = config.target_sample_rate;
        Self {
            system: SourceResampler::new(SourceKind::System, system, rate, config.ring_capacity(system.sample_rate)),
            mic: SourceResampler::new(SourceKind::Mic, mic, rate, config.ring_capacity(mic.sample_rate)),
            system_gain: config.system_gain,
            mic_gain: config.mic_gain,
            out_channels: config.hq_channels,
            target_rate: rate,
            pacer: FramePacer::new(rate),
        }
    }

    pub fn source(&self, kind: SourceKind) -> &SourceResampler {
        match kind {
            SourceKind::System => &self.system,
            SourceKind::Mic => &self.mic,
        }
    }

    fn source_mut(&mut self, kind: SourceKind) -> &mut SourceResampler {
        match kind {
            SourceKind::System => &mut self.system,
            SourceKind::Mic => &mut self.mic,
        }
    }

    pub fn push(&mut self, kind: SourceKind, samples: &[f32]) {
        self.source_mut(kind).push_interleaved(samples);
    }

    pub fn push_silence(&mut self, kind: SourceKind, frames: usize) {
        self.source_mut(kind).push_silence(frames);
    }

    /// Begin pacing at `now`.
    pub fn start(&mut self, now: Instant) {
        self.pacer.reset(now);
    }

    /// Render exactly `frames` output frames.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut chunk = Vec::with_capacity(frames * self.out_channels as usize);
        for _ in 0..frames {
            let (sys_l, sys_r) = self.system.next_frame();
            let (mic_l, mic_r) = self.mic.next_frame();
            let left = mix_sample(sys_l, mic_l, self.system_gain, self.mic_gain);
            let right = mix_sample(sys_r, mic_r, self.system_gain, self.mic_gain);
            if self.out_channels == 1 {
                chunk.push(frame_mean(&[left, right]));
            } else {
                chunk.push(left);
                chunk.push(right);
            }
        }
        self.system.consume_read();
        self.mic.consume_read();
        chunk
    }

    /// Render the frames due since the previous call, or `None` if none are due.
    pub fn render_due(&mut self, now: Instant) -> Option<Vec<f32>> {
        let frames = self.pacer.frames_due(now);
        if frames == 0 {
            return None;
        }
        Some(self.render(frames))
    }

    /// Render whatever the sources still hold, bounded by `grace` of output audio.
    pub fn drain(&mut self, grace: Duration) -> Option<Vec<f32>> {
        let limit = (grace.as_secs_f64() * self.target_rate as f64) as usize;
        let frames = self
            .system
            .frames_available()
            .max(self.mic.frames_available())
            .min(limit);
        if frames == 0 {
            return None;
        }
        Some(self.render(frames))
    }

    pub fn out_channels(&self) -> u16 {
        self.out_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn downmix_stereo_to_mono() {
        let mono = downmix_to_mono(&[0.2, 0.8, 0.4, 0.6, 1.0], 2);
        assert_eq!(mono.len(), 2);
        assert_abs_diff_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn frame_mean_of_empty_frame_is_silence() {
        assert_eq!(frame_mean(&[]), 0.0);
        assert_abs_diff_eq!(frame_mean(&[0.3, -0.1, 0.4]), 0.2, epsilon = 1e-6);
    }

    fn unity_config() -> CaptureConfiguration {
        CaptureConfiguration {
            system_gain: 1.0,
            mic_gain: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn mix_sample_applies_gain_and_clamps() {
        assert_abs_diff_eq!(mix_sample(0.2, 0.1, 0.5, 2.0), 0.3, epsilon = 1e-6);
        assert_eq!(mix_sample(0.9, 0.9, 1.0, 1.0), 1.0);
        assert_eq!(mix_sample(-0.9, -0.9, 1.0, 1.0), -1.0);
    }

    #[test]
    fn mix_blocks_pads_shorter_input() {
        let mixed = mix_blocks(&[0.1, 0.2, 0.3, 0.4], &[0.5, 0.5], 1.0, 1.0);
        assert_eq!(mixed.len(), 4);
        assert_abs_diff_eq!(mixed[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(mixed[3], 0.4, epsilon = 1e-6);
    }

    #[test]
    fn mixes_system_and_mic_per_channel() {
        let mut mixer = StereoMixer::new(NativeFormat::new(48000, 2), NativeFormat::new(48000, 1), &unity_config());
        mixer.push(SourceKind::System, &[0.1, 0.2, 0.1, 0.2, 0.1, 0.2]);
        mixer.push(SourceKind::Mic, &[0.5, 0.5, 0.5]);

        let chunk = mixer.render(2);
        assert_eq!(chunk.len(), 4);
        assert_abs_diff_eq!(chunk[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(chunk[1], 0.7, epsilon = 1e-6);
        assert_abs_diff_eq!(chunk[2], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(chunk[3], 0.7, epsilon = 1e-6);
    }

    #[test]
    fn silent_sources_still_produce_paced_frames() {
        let mut mixer = StereoMixer::new(NativeFormat::new(44100, 2), NativeFormat::new(16000, 1), &unity_config());
        let start = Instant::now();
        mixer.start(start);

        // Ten seconds of 5 ms iterations with neither source delivering.
        let mut frames = 0usize;
        for i in 1..=2000u64 {
            if let Some(chunk) = mixer.render_due(start + Duration::from_millis(5 * i)) {
                assert!(chunk.iter().all(|&s| s == 0.0));
                frames += chunk.len() / 2;
            }
        }
        assert!((frames as i64 - 480_000).abs() <= 1, "frames={frames}");
    }

    #[test]
    fn mono_output_averages_channels() {
        let config = CaptureConfiguration {
            hq_channels: 1,
            ..unity_config()
        };
        let mut mixer = StereoMixer::new(NativeFormat::new(48000, 2), NativeFormat::new(48000, 1), &config);
        mixer.push(SourceKind::System, &[0.2, 0.4, 0.2, 0.4]);

        let chunk = mixer.render(1);
        assert_eq!(chunk.len(), 1);
        assert_abs_diff_eq!(chunk[0], 0.3, epsilon = 1e-6);
    }

    #[test]
    fn drain_is_bounded_by_grace() {
        let mut mixer = StereoMixer::new(NativeFormat::new(48000, 2), NativeFormat::new(48000, 1), &unity_config());
        mixer.push(SourceKind::System, &vec![0.1; 2 * 48000]);

        let chunk = mixer.drain(Duration::from_millis(100)).unwrap();
        assert_eq!(chunk.len(), 2 * 4800);
    }

    #[test]
    fn drain_stops_when_sources_run_dry() {
        let mut mixer = StereoMixer::new(NativeFormat::new(48000, 2), NativeFormat::new(48000, 1), &unity_config());
        mixer.push(SourceKind::Mic, &[0.1; 11]);

        let chunk = mixer.drain(Duration::from_secs(1)).unwrap();
        assert_eq!(chunk.len(), 2 * 10);
        assert!(mixer.drain(Duration::from_secs(1)).is_none());
    }
}
