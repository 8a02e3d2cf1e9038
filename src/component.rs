//! Stages of the audio monitoring chain.
//!
//! Each stage consumes blocks from the stage before it over a channel,
//! processes them on its own thread, and passes the result on. The chain
//! shuts down from the front: once the input sender is dropped, every stage
//! drains, finalizes and exits in turn.

use log::{info, warn};
use std::{
    error::Error,
    fmt,
    sync::mpsc::{Receiver, Sender},
    thread::{self, JoinHandle},
};

/// Things a stage can fail at while shutting down.
#[derive(Debug)]
pub enum ComponentError {
    /// The WAV file could not be written or closed
    WavError(hound::Error),
    /// The stage was finalized twice
    AlreadyFinalized,
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WavError(error) => write!(f, "wav error: {}", error),
            Self::AlreadyFinalized => write!(f, "component already finalized"),
        }
    }
}

impl Error for ComponentError {}

impl From<hound::Error> for ComponentError {
    fn from(value: hound::Error) -> Self {
        Self::WavError(value)
    }
}

/// One stage of a processing chain.
pub trait Component {
    /// What the stage consumes
    type InData;
    /// What the stage produces
    type OutData;

    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Processes one block.
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up once the input has closed.
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs `component` on its own thread until `input` closes. Every block
/// received is converted and sent to `output`; a closed output is logged and
/// otherwise ignored so the stage still drains and finalizes.
pub fn run_component<C>(
    mut component: C,
    input: Receiver<C::InData>,
    output: Sender<C::OutData>,
) -> JoinHandle<Result<(), ComponentError>>
where
    C: Component + Send + 'static,
    C::InData: Send + 'static,
    C::OutData: Send + 'static,
{
    thread::spawn(move || {
        let mut output_open = true;
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            if output_open && output.send(out_data).is_err() {
                warn!("{}: output closed, dropping results", component.name());
                output_open = false;
            }
        }

        let result = component.finalize();
        if let Err(error) = &result {
            warn!("{}: error while terminating: {}", component.name(), error);
        }
        info!("{}: terminated", component.name());
        result
    })
}

/// Applies a fixed gain to audio blocks and clips them to [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    gain: f32,
}

impl GainStage {
    /// A stage multiplying every sample by `gain`.
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Component for GainStage {
    type InData = Vec<f32>;
    type OutData = Vec<f32>;

    fn name(&self) -> &'static str {
        "GainStage"
    }

    fn convert(&mut self, mut input: Vec<f32>) -> Vec<f32> {
        for sample in input.iter_mut() {
            *sample = (*sample * self.gain).clamp(-1.0, 1.0);
        }
        input
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    struct Counter {
        seen: usize,
    }

    impl Component for Counter {
        type InData = Vec<f32>;
        type OutData = usize;

        fn name(&self) -> &'static str {
            "Counter"
        }

        fn convert(&mut self, input: Vec<f32>) -> usize {
            self.seen += input.len();
            self.seen
        }

        fn finalize(&mut self) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    #[test]
    fn gain_is_applied_and_clipped() {
        let mut stage = GainStage::new(4.0);
        assert_eq!(stage.convert(vec![0.1, -0.2, 0.5, -1.0]), vec![0.4, -0.8, 1.0, -1.0]);
    }

    #[test]
    fn single_stage() {
        let (test_tx, stage_rx) = channel();
        let (stage_tx, test_rx) = channel();
        let handle = run_component(GainStage::new(2.0), stage_rx, stage_tx);

        test_tx.send(vec![0.25]).unwrap();
        assert_eq!(test_rx.recv(), Ok(vec![0.5]));

        drop(test_tx);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn chained_stages() {
        let (test_tx, gain_rx) = channel();
        let (gain_tx, count_rx) = channel();
        let (count_tx, test_rx) = channel();

        let gain = run_component(GainStage::new(0.5), gain_rx, gain_tx);
        let count = run_component(Counter { seen: 0 }, count_rx, count_tx);

        test_tx.send(vec![1.0; 3]).unwrap();
        test_tx.send(vec![1.0; 4]).unwrap();
        assert_eq!(test_rx.recv(), Ok(3));
        assert_eq!(test_rx.recv(), Ok(7));

        drop(test_tx);
        assert!(gain.join().unwrap().is_ok());
        assert!(count.join().unwrap().is_ok());
    }

    #[test]
    fn closed_output_still_drains() {
        let (test_tx, stage_rx) = channel();
        let (stage_tx, test_rx) = channel::<Vec<f32>>();
        drop(test_rx);

        let handle = run_component(GainStage::new(1.0), stage_rx, stage_tx);
        test_tx.send(vec![0.0]).unwrap();
        test_tx.send(vec![0.0]).unwrap();
        drop(test_tx);
        assert!(handle.join().unwrap().is_ok());
    }
}
