//! The last stage of the audio monitoring chain: a mono WAV file.

use crate::component::{Component, ComponentError};
use hound::{Error as HoundError, SampleFormat, WavSpec, WavWriter};

use std::{fs::File, io::BufWriter, path::Path};

/// Appends every block it receives to a 32-bit float mono WAV file.
pub struct HoundWriter {
    writer: Option<WavWriter<BufWriter<File>>>,
    written: usize,
}

impl HoundWriter {
    /// Creates (or truncates) the WAV file at `path`.
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, HoundError> {
        let writer = WavWriter::create(path, mono_spec(sample_rate))?;
        Ok(Self {
            writer: Some(writer),
            written: 0,
        })
    }

    /// Samples written so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

/// The format of the monitor output.
pub fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

impl Component for HoundWriter {
    type InData = Vec<f32>;
    type OutData = Result<(), HoundError>;

    fn name(&self) -> &'static str {
        "HoundWriter"
    }

    fn convert(&mut self, input: Vec<f32>) -> Result<(), HoundError> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return Err(HoundError::Unsupported),
        };
        for sample in &input {
            writer.write_sample(*sample)?;
        }
        self.written += input.len();

        // keep the header current so an interrupted run leaves a valid file
        writer.flush()
    }

    /// Patches the header and closes the file. Dropping the writer would do
    /// the same, but silently.
    fn finalize(&mut self) -> Result<(), ComponentError> {
        let writer = self.writer.take().ok_or(ComponentError::AlreadyFinalized)?;
        writer.finalize()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::run_component;
    use hound::WavReader;

    use std::f32::consts::PI;
    use std::sync::mpsc::channel;

    const SAMPLE_RATE: u32 = 48828;

    fn sine(n: usize, freq: f32) -> Vec<f32> {
        (0..n)
            .map(|k| (2.0 * PI * freq * k as f32 / SAMPLE_RATE as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn writes_mono_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.wav");

        let mut writer = HoundWriter::new(&path, SAMPLE_RATE).unwrap();
        let block = sine(256, 440.0);
        writer.convert(block.clone()).unwrap();
        writer.convert(block.clone()).unwrap();
        assert_eq!(writer.written(), 512);
        writer.finalize().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), mono_spec(SAMPLE_RATE));
        let samples = reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()
            .unwrap();
        assert_eq!(samples.len(), 512);
        assert_eq!(&samples[256..], &block[..]);
    }

    #[test]
    fn finalize_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = HoundWriter::new(dir.path().join("twice.wav"), SAMPLE_RATE).unwrap();
        writer.finalize().unwrap();
        assert!(matches!(
            writer.finalize(),
            Err(ComponentError::AlreadyFinalized)
        ));
        assert!(writer.convert(vec![0.0]).is_err());
    }

    /// Blocks sent to the writer running as a component end up in the file,
    /// in order, once the chain has shut down.
    #[test]
    fn runs_as_a_component() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.wav");
        let writer = HoundWriter::new(&path, SAMPLE_RATE).unwrap();

        let (block_tx, block_rx) = channel::<Vec<f32>>();
        let (result_tx, result_rx) = channel::<Result<(), HoundError>>();
        let handle = run_component(writer, block_rx, result_tx);

        block_tx.send(vec![0.25; 10]).unwrap();
        block_tx.send(vec![-0.25; 10]).unwrap();
        assert!(result_rx.recv().unwrap().is_ok());
        assert!(result_rx.recv().unwrap().is_ok());
        drop(block_tx);
        handle.join().unwrap().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let samples = reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()
            .unwrap();
        assert_eq!(samples.len(), 20);
        assert_eq!(samples[0], 0.25);
        assert_eq!(samples[19], -0.25);
    }
}
