//! Runtime configuration of the beamformer, stored as [ron].
//!
//! Every size the system runs with lives here and is checked once by
//! [`BeamConfig::validate`] before any thread is started. A file only
//! needs the fields it changes, e.g.
//!
//! ```text
//! (array: (columns: 4, rows: 4, spacing: 0.042), resolution_x: 48)
//! ```

use crate::agc::AgcParams;
use crate::geometry::{ArrayGeometry, Position};
use crate::scan_grid::{GridSpec, HemispherePolicy, Projection};
use crate::steering::{SteeringModel, SPEED_OF_SOUND};

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    error::Error,
    fmt,
    fs::File,
    io::{Read, Write},
    path::Path,
};

// Scan tables beyond this many delays (1 GiB of f32) are refused
const MAX_SCAN_TABLE: usize = 1 << 28;

/// The physical array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Centre of the array in the array frame
    pub origin: Position,
    /// Elements per row
    pub columns: usize,
    /// Number of rows
    pub rows: usize,
    /// Distance between neighbouring elements, meters
    pub spacing: f32,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            origin: Position::default(),
            columns: 8,
            rows: 8,
            spacing: 0.02,
        }
    }
}

/// The optional audio monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Store channel to listen to
    pub channel: usize,
    /// Multiplier applied before clipping to [-1, 1]
    pub gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            channel: 140,
            gain: 100.0 / 64.0,
        }
    }
}

/// Everything the beamformer needs to know at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    /// Array layout
    pub array: ArrayConfig,
    /// Channels delivered by the receiver, wired or not
    pub channels: usize,
    /// Store channel of array element 0; elements occupy consecutive channels
    pub first_channel: usize,
    /// Samples per second per channel
    pub sample_rate: f32,
    /// Wave propagation speed, meters per second
    pub propagation_speed: f32,
    /// Samples kept per channel in the ring
    pub buffer_length: usize,
    /// Samples per producer batch, and per beamformed output window
    pub window: usize,
    /// Image width
    pub resolution_x: usize,
    /// Image height
    pub resolution_y: usize,
    /// Pixel to direction mapping
    pub projection: Projection,
    /// Field of view scale
    pub fov_scale: f32,
    /// Below-horizon pixel handling
    pub hemisphere: HemispherePolicy,
    /// Display normalisation constants
    pub agc: AgcParams,
    /// Audio monitor settings
    pub audio: AudioConfig,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            array: ArrayConfig::default(),
            channels: 256,
            first_channel: 128,
            sample_rate: 48_828.0,
            propagation_speed: SPEED_OF_SOUND,
            buffer_length: 2048,
            window: 256,
            resolution_x: 32,
            resolution_y: 32,
            projection: Projection::default(),
            fov_scale: 1.0,
            hemisphere: HemispherePolicy::default(),
            agc: AgcParams::default(),
            audio: AudioConfig::default(),
        }
    }
}

/// A configuration that cannot be run. Always fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The array has no elements.
    EmptyArray,
    /// The image has no pixels.
    EmptyImage,
    /// `resolution_x * resolution_y * elements` does not fit a scan table.
    ScanTableTooLarge,
    /// The array elements do not all map onto store channels.
    WiringOutOfRange {
        /// First wired channel
        first_channel: usize,
        /// Number of array elements
        elements: usize,
        /// Channels in the store
        channels: usize,
    },
    /// The audio channel is not a store channel.
    AudioChannelOutOfRange(usize),
    /// The window is empty or longer than the ring.
    BadWindow {
        /// Requested window
        window: usize,
        /// Ring length
        buffer_length: usize,
    },
    /// The ring cannot hold a window plus the delay span of the scan.
    BufferTooShort {
        /// Smallest usable ring length
        required: usize,
        /// Configured ring length
        buffer_length: usize,
    },
    /// A physical constant is zero, negative or not finite.
    InvalidConstant(&'static str),
    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),
    /// Returned when serialization fails.
    RonError(ron::Error),
    /// Returned when deserialization fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::EmptyArray => Cow::from("the array has no elements"),
            CE::EmptyImage => Cow::from("the image has no pixels"),
            CE::ScanTableTooLarge => Cow::from("resolution and array size overflow the scan table"),
            CE::WiringOutOfRange {
                first_channel,
                elements,
                channels,
            } => Cow::from(format!(
                "{} elements starting at channel {} do not fit in {} channels",
                elements, first_channel, channels
            )),
            CE::AudioChannelOutOfRange(channel) => {
                Cow::from(format!("audio channel {} does not exist", channel))
            }
            CE::BadWindow {
                window,
                buffer_length,
            } => Cow::from(format!(
                "window of {} does not fit a ring of {}",
                window, buffer_length
            )),
            CE::BufferTooShort {
                required,
                buffer_length,
            } => Cow::from(format!(
                "ring of {} samples is too short, the scan needs at least {}",
                buffer_length, required
            )),
            CE::InvalidConstant(name) => Cow::from(format!("invalid value for {}", name)),
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl Error for ConfigError {}

fn positive(value: f32, name: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidConstant(name))
    }
}

impl BeamConfig {
    /// Reads a configuration from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path).map_err(ConfigError::IoError)?;
        Self::from_file(&mut handle)
    }

    /// Reads a configuration from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, ConfigError> {
        let mut raw_text = Vec::new();
        file.read_to_end(&mut raw_text)
            .map_err(ConfigError::IoError)?;
        ron::de::from_bytes(&raw_text).map_err(ConfigError::RonSpannedError)
    }

    /// Writes the configuration to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let mut handle = File::create(path).map_err(ConfigError::IoError)?;
        self.to_file(&mut handle)
    }

    /// Writes the configuration to the [Write]able object provided.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)?;
        file.write_all(text.as_bytes())
            .map_err(ConfigError::IoError)
    }

    /// Number of array elements.
    pub fn n_elements(&self) -> usize {
        self.array.columns * self.array.rows
    }

    /// Checks everything that can be checked without building the scan
    /// grid. See also [`Self::check_capacity`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let elements = self.n_elements();
        if elements == 0 {
            return Err(ConfigError::EmptyArray);
        }
        if self.resolution_x == 0 || self.resolution_y == 0 {
            return Err(ConfigError::EmptyImage);
        }
        self.resolution_x
            .checked_mul(self.resolution_y)
            .and_then(|p| p.checked_mul(elements))
            .filter(|&n| n <= MAX_SCAN_TABLE)
            .ok_or(ConfigError::ScanTableTooLarge)?;

        let wired_end = self.first_channel.checked_add(elements);
        if wired_end.map_or(true, |end| end > self.channels) {
            return Err(ConfigError::WiringOutOfRange {
                first_channel: self.first_channel,
                elements,
                channels: self.channels,
            });
        }
        if self.audio.channel >= self.channels {
            return Err(ConfigError::AudioChannelOutOfRange(self.audio.channel));
        }
        if self.window == 0 || self.window > self.buffer_length {
            return Err(ConfigError::BadWindow {
                window: self.window,
                buffer_length: self.buffer_length,
            });
        }

        positive(self.array.spacing, "array spacing")?;
        positive(self.sample_rate, "sample rate")?;
        positive(self.propagation_speed, "propagation speed")?;
        positive(self.fov_scale, "field of view scale")?;
        self.agc.validate()
    }

    /// Checks that the ring can hold one output window plus the full spread
    /// of delays, `max_delay` samples either side of zero.
    pub fn check_capacity(&self, max_delay: f32) -> Result<(), ConfigError> {
        let required = self.window + 2 * max_delay.ceil() as usize + 1;
        if self.buffer_length < required {
            return Err(ConfigError::BufferTooShort {
                required,
                buffer_length: self.buffer_length,
            });
        }
        Ok(())
    }

    /// The array described by this configuration.
    pub fn geometry(&self) -> ArrayGeometry {
        ArrayGeometry::build_array(
            self.array.origin,
            self.array.columns,
            self.array.rows,
            self.array.spacing,
        )
    }

    /// The delay model described by this configuration.
    pub fn steering_model(&self) -> SteeringModel {
        SteeringModel::new(self.sample_rate, self.propagation_speed)
    }

    /// The scan layout described by this configuration.
    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            resolution_x: self.resolution_x,
            resolution_y: self.resolution_y,
            projection: self.projection,
            fov_scale: self.fov_scale,
            policy: self.hemisphere,
        }
    }
}
