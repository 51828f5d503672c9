/// Fixed-capacity circular store for one channel of float samples.
///
/// Overflow behavior: drops oldest samples. The buffer never grows past
/// the capacity given at construction (or the last `resize`).
///
/// Not synchronized: a backend owns its ring buffers and both writes and
/// reads them from the capture thread. Wrap in `parking_lot::Mutex` if a
/// native callback needs to write from another thread.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_index: usize,
    read_index: usize,
    available: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
        }
    }

    /// Change the capacity and discard all content.
    pub fn resize(&mut self, capacity: usize) {
        self.buffer = vec![0.0; capacity];
        self.clear();
    }

    /// Reset the buffer to empty state.
    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    /// Append samples.
    ///
    /// If the buffer overflows, the read cursor advances past the oldest
    /// samples. If `samples` is larger than capacity, only the last
    /// `capacity` samples are kept.
    pub fn write(&mut self, samples: &[f32]) {
        let capacity = self.capacity();
        if samples.is_empty() || capacity == 0 {
            return;
        }

        let samples = if samples.len() > capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.available -= overflow;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available += samples.len();
    }

    /// Linearly interpolated sample at a fractional position relative to the
    /// oldest retained sample.
    ///
    /// Returns 0.0 when empty and the only sample when one is held. Positions
    /// whose upper neighbour lies past the available data return the newest
    /// sample instead of extrapolating.
    pub fn sample_at(&self, position: f64) -> f32 {
        if self.available < 2 {
            return if self.available == 1 {
                self.buffer[self.read_index]
            } else {
                0.0
            };
        }

        let position = position.max(0.0);
        let index0 = position as usize;
        let index1 = index0 + 1;
        if index1 >= self.available {
            return self.at(self.available - 1);
        }

        let fraction = (position - index0 as f64) as f32;
        let s0 = self.at(index0);
        let s1 = self.at(index1);
        s0 + fraction * (s1 - s0)
    }

    /// Drop up to `count` of the oldest samples.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.available);
        if count == 0 {
            return;
        }
        self.read_index = (self.read_index + count) % self.capacity();
        self.available -= count;
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn at(&self, offset: usize) -> f32 {
        self.buffer[(self.read_index + offset) % self.capacity()]
    }
}
