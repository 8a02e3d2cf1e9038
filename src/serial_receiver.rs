//! Samples streamed from the acquisition board over a serial link.

use crate::hardware_message_decoder::{decode_frame, resync_offset, DecodeError, SampleFrame};
use crate::receiver::{Receiver, ReceiverError};
use crate::ring_buffer::CircularSampleStore;

use log::{debug, info, warn};
use serial2::SerialPort;
use std::{
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

/// Default line rate of the acquisition board.
pub const DEFAULT_BAUD_RATE: u32 = 921_600;

const READ_CHUNK: usize = 4096;

/// Reads `SMPL` frames (see [`crate::hardware_message_decoder`]) from a
/// serial device and writes each one into the store as a batch.
pub struct SerialReceiver {
    path: PathBuf,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<SerialPort>,
    reader: FrameReader,
}

impl SerialReceiver {
    /// A receiver for the device at `path`. Nothing is opened until
    /// [`Receiver::init`].
    pub fn new(path: impl AsRef<Path>, baud_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            baud_rate,
            read_timeout: Duration::from_millis(500),
            port: None,
            reader: FrameReader::default(),
        }
    }

    /// How long a single read may block before the batch is given up.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Lists the serial devices present on this machine.
    pub fn available_ports() -> Result<Vec<PathBuf>, ReceiverError> {
        Ok(SerialPort::available_ports()?)
    }
}

impl Receiver for SerialReceiver {
    fn init(&mut self) -> Result<(), ReceiverError> {
        let mut port = SerialPort::open(&self.path, self.baud_rate)?;
        port.set_read_timeout(self.read_timeout)?;
        info!("opened {} at {} baud", self.path.display(), self.baud_rate);

        self.port = Some(port);
        self.reader = FrameReader::default();
        Ok(())
    }

    fn pull_batch(&mut self, store: &CircularSampleStore) -> Result<(), ReceiverError> {
        let port = self.port.as_mut().ok_or(ReceiverError::NotInitialized)?;
        let frame = self.reader.next_frame(port)?;
        write_frame(&frame, store)
    }

    fn stop(&mut self) {
        if self.port.take().is_some() {
            info!("closed {}", self.path.display());
        }
    }
}

/// Checks a frame against the store and writes it as one batch.
pub fn write_frame(frame: &SampleFrame, store: &CircularSampleStore) -> Result<(), ReceiverError> {
    if frame.channels != store.channels() {
        return Err(ReceiverError::ChannelMismatch {
            expected: store.channels(),
            found: frame.channels,
        });
    }
    if frame.samples_per_channel > store.len() {
        return Err(ReceiverError::BatchTooLong {
            samples: frame.samples_per_channel,
            capacity: store.len(),
        });
    }
    store.write(&frame.lanes());
    Ok(())
}

/// Accumulates bytes from a stream until a whole frame is available,
/// skipping over anything that is not a frame.
#[derive(Debug, Default)]
pub struct FrameReader {
    pending: Vec<u8>,
    last_sequence: Option<u32>,
    skipped: usize,
}

impl FrameReader {
    /// Reads from `source` until one frame decodes. Fails if the source
    /// errors or reaches its end.
    pub fn next_frame(&mut self, source: &mut impl Read) -> Result<SampleFrame, ReceiverError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match decode_frame(&self.pending) {
                Ok((frame, used)) => {
                    self.pending.drain(..used);
                    self.check_sequence(frame.sequence);
                    return Ok(frame);
                }
                Err(DecodeError::Incomplete) => {
                    let n = source.read(&mut chunk)?;
                    if n == 0 {
                        return Err(ReceiverError::Exhausted);
                    }
                    self.pending.extend_from_slice(&chunk[..n]);
                }
                // Often happens right after opening the port, when the
                // device buffer still holds the tail of an older frame
                Err(error) => {
                    let drop = resync_offset(&self.pending).max(1);
                    debug!("{}, skipping {} bytes", error, drop);
                    self.skipped += drop;
                    self.pending.drain(..drop.min(self.pending.len()));
                }
            }
        }
    }

    /// Bytes thrown away while looking for frames.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn check_sequence(&mut self, sequence: u32) {
        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                warn!(
                    "frame sequence jumped from {} to {}, {} frames lost",
                    last,
                    sequence,
                    sequence.wrapping_sub(expected)
                );
            }
        }
        self.last_sequence = Some(sequence);
    }
}
