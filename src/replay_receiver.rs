//! Plays a store dump back through the pipeline, looping forever.

use crate::receiver::{Pacer, Receiver, ReceiverError};
use crate::ring_buffer::CircularSampleStore;
use crate::snapshot::load_snapshot;

use log::info;
use std::path::{Path, PathBuf};

/// Feeds the lanes of a dump written by
/// [`save_snapshot`](crate::snapshot::save_snapshot) back into a store,
/// `batch_length` samples at a time, wrapping around at the end.
#[derive(Debug)]
pub struct ReplayReceiver {
    path: PathBuf,
    channels: usize,
    batch_length: usize,
    pacer: Option<Pacer>,
    lanes: Vec<Vec<f32>>,
    position: usize,
}

impl ReplayReceiver {
    /// A replay of the dump at `path`, read as `channels` lanes. With a
    /// `sample_rate`, batches are paced to real time.
    pub fn new(
        path: impl AsRef<Path>,
        channels: usize,
        batch_length: usize,
        sample_rate: Option<f32>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            channels,
            batch_length,
            pacer: sample_rate.map(|rate| Pacer::new(batch_length, rate)),
            lanes: Vec::new(),
            position: 0,
        }
    }

    fn lane_length(&self) -> usize {
        self.lanes.first().map_or(0, Vec::len)
    }
}

impl Receiver for ReplayReceiver {
    fn init(&mut self) -> Result<(), ReceiverError> {
        self.lanes = load_snapshot(&self.path, self.channels)?;
        self.position = 0;
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.reset();
        }
        info!(
            "replaying {} samples of {} channels from {}",
            self.lane_length(),
            self.channels,
            self.path.display()
        );
        Ok(())
    }

    fn pull_batch(&mut self, store: &CircularSampleStore) -> Result<(), ReceiverError> {
        if self.lanes.is_empty() {
            return Err(ReceiverError::NotInitialized);
        }
        let length = self.lane_length();
        if length == 0 {
            return Err(ReceiverError::Exhausted);
        }
        if store.channels() != self.channels {
            return Err(ReceiverError::ChannelMismatch {
                expected: store.channels(),
                found: self.channels,
            });
        }
        if self.batch_length > store.len() {
            return Err(ReceiverError::BatchTooLong {
                samples: self.batch_length,
                capacity: store.len(),
            });
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        let start = self.position;
        let batch: Vec<Vec<f32>> = self
            .lanes
            .iter()
            .map(|lane| {
                (0..self.batch_length)
                    .map(|k| lane[(start + k) % length])
                    .collect()
            })
            .collect();
        store.write(&batch);
        self.position = (start + self.batch_length) % length;
        Ok(())
    }

    fn stop(&mut self) {
        self.lanes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::save_snapshot;

    fn dump(lanes: &[Vec<f32>]) -> tempfile::NamedTempFile {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let store = CircularSampleStore::new(lanes.len(), lanes[0].len());
        store.write(lanes);
        save_snapshot(&store, tempfile.path()).unwrap();
        tempfile
    }

    #[test]
    fn replays_in_order_and_wraps() {
        let file = dump(&[vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![10.0, 20.0, 30.0, 40.0, 50.0]]);
        let mut replay = ReplayReceiver::new(file.path(), 2, 2, None);
        let store = CircularSampleStore::new(2, 8);

        replay.init().unwrap();
        replay.pull_batch(&store).unwrap();
        assert_eq!(store.read(0, 1), 1.0);
        assert_eq!(store.read(0, 0), 2.0);

        replay.pull_batch(&store).unwrap();
        replay.pull_batch(&store).unwrap();
        // samples 5, then wrap to 1
        assert_eq!(store.read(0, 1), 5.0);
        assert_eq!(store.read(0, 0), 1.0);
        assert_eq!(store.read(1, 0), 10.0);
    }

    #[test]
    fn uninitialised_replay_fails() {
        let file = dump(&[vec![1.0, 2.0]]);
        let mut replay = ReplayReceiver::new(file.path(), 1, 1, None);
        let store = CircularSampleStore::new(1, 4);
        assert!(matches!(
            replay.pull_batch(&store),
            Err(ReceiverError::NotInitialized)
        ));
    }

    #[test]
    fn missing_dump_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut replay = ReplayReceiver::new(dir.path().join("none.bin"), 1, 1, None);
        assert!(matches!(replay.init(), Err(ReceiverError::Snapshot(_))));
    }

    #[test]
    fn wrong_store_width_is_refused() {
        let file = dump(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut replay = ReplayReceiver::new(file.path(), 2, 2, None);
        replay.init().unwrap();
        let store = CircularSampleStore::new(3, 4);
        assert!(matches!(
            replay.pull_batch(&store),
            Err(ReceiverError::ChannelMismatch { expected: 3, found: 2 })
        ));
    }
}
