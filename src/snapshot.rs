//! Raw dumps of the sample store, for offline inspection.
//!
//! A dump is the store contents verbatim: `channels * buffer_length`
//! native-endian `f32`s, channel-major, in storage order, with no header.
//! Reading one back therefore needs the channel count from elsewhere.

use crate::ring_buffer::CircularSampleStore;

use nom::{
    combinator::all_consuming,
    multi::count,
    number::{complete::f32 as native_f32, Endianness},
    Finish, IResult,
};
use std::{
    borrow::Cow,
    error::Error,
    fmt,
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Things that go wrong while writing or reading a dump.
#[derive(Debug)]
pub enum SnapshotError {
    /// Returned when io fails when reading or writing the dump.
    IoError(std::io::Error),
    /// The byte count is not a whole number of samples per channel.
    UnevenLength {
        /// Size of the dump in bytes
        bytes: usize,
        /// Channel count the dump was read with
        channels: usize,
    },
    /// The samples could not be parsed.
    Malformed(String),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            Self::IoError(error) => Cow::from(format!("io error: {}", error)),
            Self::UnevenLength { bytes, channels } => Cow::from(format!(
                "{} bytes do not split into {} channels of f32 samples",
                bytes, channels
            )),
            Self::Malformed(reason) => Cow::from(format!("malformed dump: {}", reason)),
        };

        write!(f, "{}", msg)
    }
}

impl Error for SnapshotError {}

impl From<std::io::Error> for SnapshotError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Writes the raw contents of `store` to `path`.
pub fn save_snapshot(store: &CircularSampleStore, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let mut file = BufWriter::new(File::create(path)?);
    write_snapshot(store, &mut file)?;
    file.flush()?;
    Ok(())
}

/// Writes the raw contents of `store` to any [Write]able object.
pub fn write_snapshot(store: &CircularSampleStore, out: &mut impl Write) -> Result<(), SnapshotError> {
    let bytes: Vec<u8> = store
        .snapshot()
        .iter()
        .flat_map(|s| s.to_ne_bytes())
        .collect();
    out.write_all(&bytes)?;
    Ok(())
}

/// Reads a dump written by [save_snapshot], split into `channels` lanes.
pub fn load_snapshot(path: impl AsRef<Path>, channels: usize) -> Result<Vec<Vec<f32>>, SnapshotError> {
    let mut handle = File::open(path)?;
    read_snapshot(&mut handle, channels)
}

/// Reads a dump from any [Read]able object, split into `channels` lanes.
pub fn read_snapshot(input: &mut impl Read, channels: usize) -> Result<Vec<Vec<f32>>, SnapshotError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;

    if channels == 0 || raw.len() % (channels * SAMPLE_BYTES) != 0 {
        return Err(SnapshotError::UnevenLength {
            bytes: raw.len(),
            channels,
        });
    }

    let n_samples = raw.len() / SAMPLE_BYTES;
    let (_, samples) = parse_samples(&raw, n_samples)
        .finish()
        .map_err(|e| SnapshotError::Malformed(format!("{:?} at byte {}", e.code, raw.len() - e.input.len())))?;

    let length = n_samples / channels;
    if length == 0 {
        return Ok(vec![Vec::new(); channels]);
    }
    Ok(samples.chunks(length).map(|c| c.to_vec()).collect())
}

/// Signal level of one lane of a dump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelLevel {
    /// Root mean square of the samples
    pub rms: f32,
    /// Largest absolute sample
    pub peak: f32,
}

/// The level of every lane, for a quick look at which channels are live.
pub fn channel_levels(lanes: &[Vec<f32>]) -> Vec<ChannelLevel> {
    lanes
        .iter()
        .map(|lane| {
            let peak = lane.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            let rms = if lane.is_empty() {
                0.0
            } else {
                (lane.iter().map(|s| s * s).sum::<f32>() / lane.len() as f32).sqrt()
            };
            ChannelLevel { rms, peak }
        })
        .collect()
}

fn parse_samples(input: &[u8], n: usize) -> IResult<&[u8], Vec<f32>> {
    all_consuming(count(native_f32(Endianness::Native), n))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn filled_store() -> CircularSampleStore {
        let store = CircularSampleStore::new(3, 5);
        store.write(&[
            vec![1.0, 2.0, 3.0],
            vec![-1.0, -2.0, -3.0],
            vec![0.25, 0.5, 0.75],
        ]);
        store
    }

    #[test]
    fn dump_is_headerless_and_sized() {
        let store = filled_store();
        let mut buf = Vec::new();
        write_snapshot(&store, &mut buf).unwrap();

        assert_eq!(buf.len(), 3 * 5 * 4);
        assert_eq!(&buf[0..4], &1.0f32.to_ne_bytes());
        // channel 1 starts after the 5 samples of channel 0
        assert_eq!(&buf[20..24], &(-1.0f32).to_ne_bytes());
    }

    #[test]
    fn write_and_read_path() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let store = filled_store();

        save_snapshot(&store, tempfile.path()).unwrap();
        let lanes = load_snapshot(tempfile.path(), 3).unwrap();

        assert_eq!(lanes.len(), 3);
        assert_eq!(lanes[0], vec![1.0, 2.0, 3.0, 0.0, 0.0]);
        assert_eq!(lanes[2], vec![0.25, 0.5, 0.75, 0.0, 0.0]);
    }

    #[test]
    fn rejects_uneven_dumps() {
        let mut buf = Cursor::new(vec![0u8; 4 * 7]);
        assert!(matches!(
            read_snapshot(&mut buf, 2),
            Err(SnapshotError::UnevenLength { bytes: 28, channels: 2 })
        ));
    }

    #[test]
    fn levels_per_lane() {
        let levels = channel_levels(&[vec![3.0, -4.0], vec![0.0, 0.0], vec![]]);
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].peak, 4.0);
        assert!((levels[0].rms - 12.5f32.sqrt()).abs() < 1e-6);
        assert_eq!(levels[1], ChannelLevel { rms: 0.0, peak: 0.0 });
        assert_eq!(levels[2].rms, 0.0);
    }

    #[test]
    fn empty_dump_has_empty_lanes() {
        let mut buf = Cursor::new(Vec::new());
        let lanes = read_snapshot(&mut buf, 4).unwrap();
        assert_eq!(lanes.len(), 4);
        assert!(lanes.iter().all(|l| l.is_empty()));
    }
}
