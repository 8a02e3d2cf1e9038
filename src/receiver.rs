//! The interface to whatever produces raw array samples.

use crate::hardware_message_decoder::DecodeError;
use crate::ring_buffer::CircularSampleStore;
use crate::snapshot::SnapshotError;
use std::{
    error::Error,
    fmt, io,
    time::{Duration, Instant},
};

/// A source of multi-channel sample batches, driven by the pipeline's
/// producer thread. Implementations own whatever connection they need and
/// must be movable onto that thread.
pub trait Receiver: Send {
    /// Opens the source. Called once per [`connect`](crate::pipeline::Pipeline::connect).
    fn init(&mut self) -> Result<(), ReceiverError>;

    /// Blocks until one batch per channel is available and writes it into
    /// `store`.
    fn pull_batch(&mut self, store: &CircularSampleStore) -> Result<(), ReceiverError>;

    /// Closes the source. The receiver may be `init`ed again afterwards.
    fn stop(&mut self);
}

impl<R: Receiver + ?Sized> Receiver for Box<R> {
    fn init(&mut self) -> Result<(), ReceiverError> {
        (**self).init()
    }

    fn pull_batch(&mut self, store: &CircularSampleStore) -> Result<(), ReceiverError> {
        (**self).pull_batch(store)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Everything that can go wrong while talking to a receiver.
#[derive(Debug)]
pub enum ReceiverError {
    /// The device or file could not be opened or read
    IoError(io::Error),
    /// Incoming bytes did not form a valid frame
    Decode(DecodeError),
    /// A snapshot to replay could not be loaded
    Snapshot(SnapshotError),
    /// The source delivered a batch that does not fit the store
    ChannelMismatch {
        /// Channels the store holds
        expected: usize,
        /// Channels the source delivered
        found: usize,
    },
    /// The source delivered more samples per channel than the store holds
    BatchTooLong {
        /// Samples per channel in the batch
        samples: usize,
        /// Samples per channel in the store
        capacity: usize,
    },
    /// `pull_batch` was called before `init`
    NotInitialized,
    /// The source has nothing (more) to give
    Exhausted,
}

impl fmt::Display for ReceiverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(error) => write!(f, "io error: {}", error),
            Self::Decode(error) => write!(f, "decode error: {}", error),
            Self::Snapshot(error) => write!(f, "snapshot error: {}", error),
            Self::ChannelMismatch { expected, found } => {
                write!(f, "expected {} channels, received {}", expected, found)
            }
            Self::BatchTooLong { samples, capacity } => write!(
                f,
                "batch of {} samples does not fit a ring of {}",
                samples, capacity
            ),
            Self::NotInitialized => write!(f, "receiver used before init"),
            Self::Exhausted => write!(f, "receiver has no more samples"),
        }
    }
}

impl Error for ReceiverError {}

impl From<io::Error> for ReceiverError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<DecodeError> for ReceiverError {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<SnapshotError> for ReceiverError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

/// Paces a software source to the real-time rate of the array: one batch
/// of `window` samples every `window / sample_rate` seconds.
#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    next: Option<Instant>,
}

impl Pacer {
    /// A pacer for batches of `window` samples at `sample_rate`.
    pub fn new(window: usize, sample_rate: f32) -> Self {
        Self {
            period: Duration::from_secs_f64(window as f64 / sample_rate as f64),
            next: None,
        }
    }

    /// Time between two batches.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Forgets the schedule; the next [`Self::wait`] returns at once.
    pub fn reset(&mut self) {
        self.next = None;
    }

    /// Sleeps until the next batch is due. Falls back onto the schedule
    /// instead of bursting when the caller ran late.
    pub fn wait(&mut self) {
        let now = Instant::now();
        let due = self.next.unwrap_or(now);
        if due > now {
            spin_sleep::sleep(due - now);
        }
        self.next = Some(due.max(now) + self.period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_period_matches_rate() {
        let pacer = Pacer::new(480, 48_000.0);
        assert_eq!(pacer.period(), Duration::from_millis(10));
    }

    #[test]
    fn pacer_spaces_out_batches() {
        let mut pacer = Pacer::new(48, 48_000.0);
        let start = Instant::now();
        for _ in 0..6 {
            pacer.wait();
        }
        // the first wait is free, the next five are one millisecond each
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn errors_read_well() {
        let error = ReceiverError::ChannelMismatch {
            expected: 256,
            found: 64,
        };
        assert_eq!(error.to_string(), "expected 256 channels, received 64");
    }
}
