use std::time::{Duration, Instant};

/// Converts elapsed wall-clock time into a whole number of output frames.
///
/// The fractional remainder is carried between calls, so the total number of
/// frames produced over any run stays within one frame of `elapsed * rate`.
#[derive(Debug, Clone)]
pub struct FramePacer {
    rate: f64,
    accumulator: f64,
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new(rate: u32) -> Self {
        Self {
            rate: rate as f64,
            accumulator: 0.0,
            last: None,
        }
    }

    /// Start a new timeline at `now`, discarding any carried fraction.
    pub fn reset(&mut self, now: Instant) {
        self.accumulator = 0.0;
        self.last = Some(now);
    }

    pub fn frames_for_elapsed(&mut self, elapsed: Duration) -> usize {
        self.accumulator += elapsed.as_secs_f64() * self.rate;
        let frames = self.accumulator.floor();
        self.accumulator -= frames;
        frames as usize
    }

    /// Frames due since the previous call (or since `reset`).
    ///
    /// The first call without a prior `reset` only starts the timeline.
    pub fn frames_due(&mut self, now: Instant) -> usize {
        match self.last.replace(now) {
            Some(last) => self.frames_for_elapsed(now.saturating_duration_since(last)),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_yields_rate_frames() {
        let mut pacer = FramePacer::new(48000);
        assert_eq!(pacer.frames_for_elapsed(Duration::from_secs(1)), 48000);
    }

    #[test]
    fn fractional_frames_carry_over() {
        let mut pacer = FramePacer::new(48000);
        // 1/96000 s is half a frame.
        let half = Duration::from_nanos(10_417);
        let total: usize = (0..10).map(|_| pacer.frames_for_elapsed(half)).sum();
        assert!((4..=5).contains(&total), "total={total}");
    }

    #[test]
    fn long_run_does_not_drift() {
        let mut pacer = FramePacer::new(48000);
        // 600 s of irregular 1..=7 ms iterations.
        let mut elapsed = Duration::ZERO;
        let mut frames = 0usize;
        let mut step = 0u64;
        while elapsed < Duration::from_secs(600) {
            let dt = Duration::from_micros(1_000 + (step % 7) * 1_013);
            elapsed += dt;
            frames += pacer.frames_for_elapsed(dt);
            step += 1;
        }
        let expected = (elapsed.as_secs_f64() * 48000.0).round() as i64;
        assert!((frames as i64 - expected).abs() <= 1, "{frames} vs {expected}");
    }

    #[test]
    fn frames_due_measures_from_reset() {
        let mut pacer = FramePacer::new(1000);
        let start = Instant::now();
        pacer.reset(start);
        assert_eq!(pacer.frames_due(start + Duration::from_millis(10)), 10);
        assert_eq!(pacer.frames_due(start + Duration::from_millis(25)), 15);
    }

    #[test]
    fn first_frames_due_without_reset_starts_timeline() {
        let mut pacer = FramePacer::new(1000);
        let start = Instant::now();
        assert_eq!(pacer.frames_due(start), 0);
        assert_eq!(pacer.frames_due(start + Duration::from_millis(3)), 3);
    }
}
