//! A second consumer of the sample store: streams one channel out as audio.

use crate::config::BeamConfig;
use crate::pipeline::Pipeline;
use crate::receiver::Receiver;
use crate::ring_buffer::CircularSampleStore;

use log::{debug, info};
use std::sync::mpsc::Sender;

/// Copies the newest samples of a single channel out of the store once per
/// producer cycle.
#[derive(Debug, Clone)]
pub struct AudioMonitor {
    channel: usize,
    block: usize,
    delay: f32,
    scratch: Vec<f32>,
}

impl AudioMonitor {
    /// Monitors `channel`, `block` samples per cycle. `block` should match
    /// the receiver's batch length or audio is repeated or skipped.
    pub fn new(channel: usize, block: usize) -> Self {
        Self {
            channel,
            block,
            delay: 0.0,
            scratch: vec![0.0; block],
        }
    }

    /// Monitors the configured channel, one window per cycle.
    pub fn from_config(config: &BeamConfig) -> Self {
        Self::new(config.audio.channel, config.window)
    }

    /// Reads the channel this many samples in the past, fractional delays
    /// interpolated. Zero (the default) follows the newest samples.
    pub fn with_delay(mut self, delay: f32) -> Self {
        self.delay = delay.max(0.0);
        self
    }

    /// The channel being monitored.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Samples per block.
    pub fn block(&self) -> usize {
        self.block
    }

    /// Copies the current block, oldest sample first.
    pub fn extract(&mut self, store: &CircularSampleStore) -> Vec<f32> {
        self.scratch.fill(0.0);
        store.accumulate_window(self.channel, self.delay, &mut self.scratch);
        self.scratch.clone()
    }

    /// Sends one block per producer cycle to `output` until the pipeline
    /// disconnects or `output` closes.
    pub fn run<R: Receiver>(&mut self, pipeline: &Pipeline<R>, output: Sender<Vec<f32>>) {
        info!("monitoring channel {}", self.channel);
        let mut blocks = 0usize;
        while pipeline.is_running() {
            pipeline.barrier();
            if !pipeline.is_running() {
                break;
            }
            let block = self.extract(pipeline.store());
            if output.send(block).is_err() {
                debug!("audio output closed");
                break;
            }
            blocks += 1;
        }
        info!("audio monitor stopped after {} blocks", blocks);
    }
}
