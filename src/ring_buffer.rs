//! The shared circular store of recent samples, one lane per channel.
//!
//! There is exactly one writer, the pipeline's producer thread. Readers run
//! concurrently with it and take no locks: every sample is an atomic cell
//! accessed with relaxed ordering, so a reader that overlaps a write may see
//! some lanes (or some samples of a lane) already updated and others not.
//! Only the cursor is published with release/acquire ordering. Keep the
//! buffer long enough that a scan pass never reaches samples that the next
//! batch overwrites.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// A fixed-length, multi-channel ring of `f32` samples.
#[derive(Debug)]
pub struct CircularSampleStore {
    channels: usize,
    length: usize,
    // channel-major: `channel * length + index`
    data: Vec<AtomicU32>,
    // next index to be written
    cursor: AtomicUsize,
    cycles: AtomicU64,
}

impl CircularSampleStore {
    /// Allocates a zeroed store of `channels` lanes of `length` samples.
    pub fn new(channels: usize, length: usize) -> Self {
        assert!(length > 0, "a sample store needs a non-zero length");
        let data = (0..channels * length)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect();

        Self {
            channels,
            length,
            data,
            cursor: AtomicUsize::new(0),
            cycles: AtomicU64::new(0),
        }
    }

    /// Number of channels (lanes).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of samples kept per channel.
    pub fn len(&self) -> usize {
        self.length
    }

    /// True if the store keeps no samples (never, see [`Self::new`]).
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Index the next batch will start at.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of batches written so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Appends one batch: `batch[c]` holds the new samples of channel `c`,
    /// all channels the same length. Producer only.
    pub fn write<S: AsRef<[f32]>>(&self, batch: &[S]) {
        assert_eq!(batch.len(), self.channels);
        let batch_len = batch.first().map(|s| s.as_ref().len()).unwrap_or(0);
        assert!(batch_len <= self.length);

        let start = self.cursor.load(Ordering::Relaxed);
        for (channel, samples) in batch.iter().enumerate() {
            let samples = samples.as_ref();
            assert_eq!(samples.len(), batch_len);
            let lane = &self.data[channel * self.length..(channel + 1) * self.length];
            for (k, sample) in samples.iter().enumerate() {
                lane[(start + k) % self.length].store(sample.to_bits(), Ordering::Relaxed);
            }
        }

        self.cursor
            .store((start + batch_len) % self.length, Ordering::Release);
        self.cycles.fetch_add(1, Ordering::AcqRel);
    }

    /// The sample `offset` samples before the newest one on `channel`.
    /// Offset zero is the newest sample; offsets wrap modulo the length.
    pub fn read(&self, channel: usize, offset: usize) -> f32 {
        self.read_at(channel, self.cursor(), offset)
    }

    /// Like [`Self::read`] but with a fractional offset, linearly
    /// interpolated between the two neighbouring samples. Negative offsets
    /// read as the newest sample.
    pub fn read_interpolated(&self, channel: usize, offset: f32) -> f32 {
        self.read_interpolated_at(channel, self.cursor(), offset)
    }

    /// Fills `window` with the `window.len()` samples ending `offset`
    /// samples in the past, oldest first, adding them onto what is already
    /// there. The cursor is sampled once for the whole window.
    pub fn accumulate_window(&self, channel: usize, offset: f32, window: &mut [f32]) {
        let cursor = self.cursor();
        let n = window.len();
        for (j, out) in window.iter_mut().enumerate() {
            let past = offset + (n - 1 - j) as f32;
            *out += self.read_interpolated_at(channel, cursor, past);
        }
    }

    /// A copy of the raw contents, channel-major, in storage order.
    pub fn snapshot(&self) -> Vec<f32> {
        self.data
            .iter()
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
            .collect()
    }

    fn read_at(&self, channel: usize, cursor: usize, offset: usize) -> f32 {
        let offset = offset % self.length;
        let index = (cursor + 2 * self.length - 1 - offset) % self.length;
        f32::from_bits(self.data[channel * self.length + index].load(Ordering::Relaxed))
    }

    fn read_interpolated_at(&self, channel: usize, cursor: usize, offset: f32) -> f32 {
        let offset = offset.max(0.0);
        let whole = offset.floor();
        let frac = offset - whole;
        let whole = whole as usize;

        let near = self.read_at(channel, cursor, whole);
        if frac == 0.0 {
            return near;
        }
        let far = self.read_at(channel, cursor, whole + 1);
        near + (far - near) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|v| v as f32).collect()
    }

    #[test]
    fn starts_zeroed() {
        let store = CircularSampleStore::new(3, 16);
        assert!(store.snapshot().iter().all(|s| *s == 0.0));
        assert_eq!(store.read(2, 5), 0.0);
        assert_eq!(store.cycles(), 0);
    }

    #[test]
    fn newest_sample_is_offset_zero() {
        let store = CircularSampleStore::new(2, 8);
        store.write(&[ramp(0, 3), ramp(100, 3)]);

        assert_eq!(store.read(0, 0), 2.0);
        assert_eq!(store.read(0, 2), 0.0);
        assert_eq!(store.read(1, 1), 101.0);
        assert_eq!(store.cursor(), 3);
        assert_eq!(store.cycles(), 1);
    }

    #[test]
    fn wraps_after_many_batches() {
        let length = 10;
        let batch = 4;
        let store = CircularSampleStore::new(1, length);

        // 7 batches of 4 = 28 samples, so the ring has wrapped twice
        for b in 0..7 {
            store.write(&[ramp(b * batch, batch)]);
        }

        // the newest sample is 27, and the ring holds 18..=27
        for offset in 0..length {
            assert_eq!(store.read(0, offset), (27 - offset) as f32);
        }
        assert_eq!(store.read(0, length), store.read(0, 0));
        assert_eq!(store.read(0, length + 3), 24.0);
        assert_eq!(store.cursor(), 28 % length);
    }

    #[test]
    fn interpolates_between_neighbours() {
        let store = CircularSampleStore::new(1, 16);
        store.write(&[ramp(0, 8)]);

        assert_eq!(store.read_interpolated(0, 2.0), 5.0);
        assert!((store.read_interpolated(0, 2.25) - 4.75).abs() < 1e-6);
        assert_eq!(store.read_interpolated(0, -1.0), 7.0);
    }

    #[test]
    fn window_is_oldest_first() {
        let store = CircularSampleStore::new(1, 16);
        store.write(&[ramp(0, 10)]);

        let mut window = [1.0; 4];
        store.accumulate_window(0, 2.0, &mut window);
        // samples 4, 5, 6, 7 plus the existing ones
        assert_eq!(window, [5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    #[should_panic]
    fn rejects_wrong_channel_count() {
        let store = CircularSampleStore::new(2, 8);
        store.write(&[ramp(0, 2)]);
    }

    #[test]
    fn readers_run_alongside_the_writer() {
        let store = Arc::new(CircularSampleStore::new(4, 64));
        let writer_store = store.clone();

        let writer = thread::spawn(move || {
            for b in 0..500 {
                let batch: Vec<Vec<f32>> = (0..4).map(|_| vec![b as f32; 16]).collect();
                writer_store.write(&batch);
            }
        });

        let mut seen = 0.0f32;
        while !writer.is_finished() {
            seen = seen.max(store.read(3, 0));
        }
        writer.join().unwrap();

        assert_eq!(store.read(3, 0), 499.0);
        assert!(seen <= 499.0);
        assert_eq!(store.cycles(), 500);
    }
}
