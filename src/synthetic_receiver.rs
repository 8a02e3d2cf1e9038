//! A software stand-in for the array: a single plane-wave tone arriving
//! from a chosen direction, buried in uniform noise.
//!
//! Useful for running the whole pipeline without hardware, and for checking
//! that the image lights up where the source is.

use crate::config::BeamConfig;
use crate::geometry::Position;
use crate::receiver::{Pacer, Receiver, ReceiverError};
use crate::ring_buffer::CircularSampleStore;

use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// Generates batches of a plane wave seen by the configured array.
pub struct SyntheticReceiver {
    channels: usize,
    first_channel: usize,
    // arrival lead of each element, in samples
    leads: Vec<f32>,
    batch_length: usize,
    sample_rate: f32,
    frequency: f32,
    amplitude: f32,
    noise: f32,
    seed: Option<u64>,
    rng: StdRng,
    pacer: Option<Pacer>,
    sample_index: u64,
    initialised: bool,
}

/// Builder for [`SyntheticReceiver`].
#[derive(Debug, Clone)]
pub struct SyntheticReceiverBuilder {
    config: BeamConfig,
    direction: Position,
    frequency: f32,
    amplitude: f32,
    noise: f32,
    seed: Option<u64>,
    realtime: bool,
}

impl SyntheticReceiverBuilder {
    /// Unit vector pointing at the source. Defaults to broadside.
    pub fn direction(mut self, direction: Position) -> Self {
        self.direction = direction;
        self
    }

    /// Tone frequency in Hz.
    pub fn frequency(mut self, frequency: f32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Peak amplitude of the tone.
    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Half-width of the uniform noise added to every channel.
    pub fn noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Fixes the noise sequence.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Whether batches are paced to the sample rate. On by default.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Finishes the receiver.
    pub fn build(self) -> SyntheticReceiver {
        let model = self.config.steering_model();
        let leads = model.steering_delays(&self.config.geometry(), &self.direction);
        let pacer = self
            .realtime
            .then(|| Pacer::new(self.config.window, self.config.sample_rate));

        SyntheticReceiver {
            channels: self.config.channels,
            first_channel: self.config.first_channel,
            leads,
            batch_length: self.config.window,
            sample_rate: self.config.sample_rate,
            frequency: self.frequency,
            amplitude: self.amplitude,
            noise: self.noise,
            seed: self.seed,
            rng: fresh_rng(self.seed),
            pacer,
            sample_index: 0,
            initialised: false,
        }
    }
}

fn fresh_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl SyntheticReceiver {
    /// Starts a builder for the array described by `config`. Batches are one
    /// processing window long.
    pub fn builder(config: &BeamConfig) -> SyntheticReceiverBuilder {
        SyntheticReceiverBuilder {
            config: config.clone(),
            direction: Position::new(0.0, 0.0, 1.0),
            frequency: 2000.0,
            amplitude: 0.01,
            noise: 0.0005,
            seed: None,
            realtime: true,
        }
    }

    /// The clean tone at element `e`, sample `n`.
    fn tone(&self, element: usize, n: u64) -> f32 {
        let t = (n as f64 - self.leads[element] as f64) / self.sample_rate as f64;
        self.amplitude * (2.0 * PI * self.frequency as f64 * t).sin() as f32
    }

    fn next_batch(&mut self) -> Vec<Vec<f32>> {
        let start = self.sample_index;
        let wired = self.first_channel..self.first_channel + self.leads.len();

        let mut batch = Vec::with_capacity(self.channels);
        for channel in 0..self.channels {
            let lane = (0..self.batch_length as u64)
                .map(|k| {
                    let clean = if wired.contains(&channel) {
                        self.tone(channel - self.first_channel, start + k)
                    } else {
                        0.0
                    };
                    clean + self.noise_sample()
                })
                .collect();
            batch.push(lane);
        }

        self.sample_index += self.batch_length as u64;
        batch
    }

    fn noise_sample(&mut self) -> f32 {
        if self.noise > 0.0 {
            self.rng.gen_range(-self.noise..self.noise)
        } else {
            0.0
        }
    }
}

impl Receiver for SyntheticReceiver {
    fn init(&mut self) -> Result<(), ReceiverError> {
        info!(
            "synthetic source: {} Hz, amplitude {}, noise {}",
            self.frequency, self.amplitude, self.noise
        );
        self.sample_index = 0;
        self.rng = fresh_rng(self.seed);
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.reset();
        }
        self.initialised = true;
        Ok(())
    }

    fn pull_batch(&mut self, store: &CircularSampleStore) -> Result<(), ReceiverError> {
        if !self.initialised {
            return Err(ReceiverError::NotInitialized);
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
        let batch = self.next_batch();
        store.write(&batch);
        Ok(())
    }

    fn stop(&mut self) {
        debug!("synthetic source stopped after {} samples", self.sample_index);
        self.initialised = false;
    }
}
