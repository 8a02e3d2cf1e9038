//! Framing of sample batches arriving over a byte stream.
//!
//! Each frame is laid out little-endian as
//!
//! ```text
//! "SMPL" | sequence: u32 | channels: u16 | samples: u16 | f32 * channels * samples
//! ```
//!
//! with the samples channel-major. The parsers are streaming: a short buffer
//! yields [`DecodeError::Incomplete`] rather than a failure.

use nom::{
    bytes::streaming::tag,
    error::{Error as NomError, ErrorKind},
    multi::count,
    number::streaming::{le_f32, le_u16, le_u32},
    sequence::tuple,
    IResult,
};
use std::{error::Error, fmt};

/// Marks the start of every frame.
pub const FRAME_MAGIC: &[u8; 4] = b"SMPL";

const HEADER_BYTES: usize = 12;

/// Largest payload accepted in one frame, in samples.
pub const MAX_FRAME_SAMPLES: usize = 1 << 20;

/// One decoded batch of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFrame {
    /// Counter set by the sender, used to spot dropped frames
    pub sequence: u32,
    /// Number of channels in the frame
    pub channels: usize,
    /// Samples per channel
    pub samples_per_channel: usize,
    /// Channel-major samples
    pub samples: Vec<f32>,
}

impl SampleFrame {
    /// Builds a frame from equal-length lanes.
    pub fn from_lanes(sequence: u32, lanes: &[Vec<f32>]) -> Self {
        let samples_per_channel = lanes.first().map_or(0, |l| l.len());
        Self {
            sequence,
            channels: lanes.len(),
            samples_per_channel,
            samples: lanes.iter().flatten().copied().collect(),
        }
    }

    /// The samples of one channel.
    pub fn channel(&self, c: usize) -> &[f32] {
        let start = c * self.samples_per_channel;
        &self.samples[start..start + self.samples_per_channel]
    }

    /// All channels, in order.
    pub fn lanes(&self) -> Vec<&[f32]> {
        (0..self.channels).map(|c| self.channel(c)).collect()
    }

    /// Serialises the frame in wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + self.samples.len() * 4);
        out.extend_from_slice(FRAME_MAGIC);
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.extend_from_slice(&(self.channels as u16).to_le_bytes());
        out.extend_from_slice(&(self.samples_per_channel as u16).to_le_bytes());
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}

/// Why a buffer did not yield a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// More bytes are needed before a frame can be decoded
    Incomplete,
    /// The buffer does not start with a valid frame
    Invalid(ErrorKind),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "incomplete frame"),
            Self::Invalid(kind) => write!(f, "invalid frame ({:?})", kind),
        }
    }
}

impl Error for DecodeError {}

fn parse_header(input: &[u8]) -> IResult<&[u8], (u32, u16, u16)> {
    let (input, _) = tag(&FRAME_MAGIC[..])(input)?;
    tuple((le_u32, le_u16, le_u16))(input)
}

fn parse_frame(input: &[u8]) -> IResult<&[u8], SampleFrame> {
    let (rest, (sequence, channels, per_channel)) = parse_header(input)?;
    let channels = channels as usize;
    let samples_per_channel = per_channel as usize;
    let total = channels * samples_per_channel;

    if total == 0 || total > MAX_FRAME_SAMPLES {
        return Err(nom::Err::Error(NomError::new(input, ErrorKind::TooLarge)));
    }

    let (rest, samples) = count(le_f32, total)(rest)?;
    Ok((
        rest,
        SampleFrame {
            sequence,
            channels,
            samples_per_channel,
            samples,
        },
    ))
}

/// Decodes the frame at the start of `input`, returning it together with
/// the number of bytes it took up.
pub fn decode_frame(input: &[u8]) -> Result<(SampleFrame, usize), DecodeError> {
    match parse_frame(input) {
        Ok((rest, frame)) => Ok((frame, input.len() - rest.len())),
        Err(nom::Err::Incomplete(_)) => Err(DecodeError::Incomplete),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(DecodeError::Invalid(e.code)),
    }
}

/// Number of leading bytes to throw away so that `buf` starts at the next
/// candidate frame. A trailing partial magic is kept.
pub fn resync_offset(buf: &[u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    for start in 1..buf.len() {
        let tail = &buf[start..];
        let n = tail.len().min(FRAME_MAGIC.len());
        if tail[..n] == FRAME_MAGIC[..n] {
            return start;
        }
    }
    buf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_three() -> SampleFrame {
        SampleFrame::from_lanes(7, &[vec![0.5, -0.5, 1.0], vec![2.0, 3.0, 4.0]])
    }

    #[test]
    fn decode_wire_bytes() {
        let mut bytes = b"SMPL".to_vec();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());

        let (frame, used) = decode_frame(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.channels, 1);
        assert_eq!(frame.channel(0), &[1.5f32, -2.0]);
    }

    #[test]
    fn channels_are_split() {
        let frame = two_by_three();
        let (decoded, _) = decode_frame(&frame.encode()).unwrap();
        assert_eq!(decoded.channel(0), &[0.5f32, -0.5, 1.0]);
        assert_eq!(decoded.channel(1), &[2.0f32, 3.0, 4.0]);
        assert_eq!(decoded.lanes().len(), 2);
    }

    #[test]
    fn trailing_bytes_are_left_alone() {
        let frame = two_by_three();
        let mut bytes = frame.encode();
        let len = bytes.len();
        bytes.extend_from_slice(b"SMP");

        let (_, used) = decode_frame(&bytes).unwrap();
        assert_eq!(used, len);
    }

    #[test]
    fn short_buffers_are_incomplete() {
        let bytes = two_by_three().encode();
        for cut in [0, 2, 4, 11, 12, bytes.len() - 1] {
            assert_eq!(decode_frame(&bytes[..cut]), Err(DecodeError::Incomplete), "cut at {}", cut);
        }
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(decode_frame(b"JUNKJUNKJUNKJUNK"), Err(DecodeError::Invalid(_))));
    }

    #[test]
    fn empty_and_oversized_frames_are_invalid() {
        let empty = SampleFrame::from_lanes(0, &[]);
        assert!(matches!(decode_frame(&empty.encode()), Err(DecodeError::Invalid(_))));

        let mut huge = b"SMPL".to_vec();
        huge.extend_from_slice(&0u32.to_le_bytes());
        huge.extend_from_slice(&u16::MAX.to_le_bytes());
        huge.extend_from_slice(&u16::MAX.to_le_bytes());
        assert_eq!(
            decode_frame(&huge),
            Err(DecodeError::Invalid(ErrorKind::TooLarge))
        );
    }

    #[test]
    fn resync_finds_next_magic() {
        let mut bytes = b"xxSM".to_vec();
        bytes.extend(two_by_three().encode());
        // a stray "SM" is not a frame; skip to the real one
        assert_eq!(resync_offset(&bytes), 4);

        let (frame, _) = decode_frame(&bytes[4..]).unwrap();
        assert_eq!(frame, two_by_three());
    }

    #[test]
    fn resync_keeps_partial_magic() {
        assert_eq!(resync_offset(b"abcSMP"), 3);
        assert_eq!(resync_offset(b"abcdef"), 6);
        assert_eq!(resync_offset(b""), 0);
    }
}
