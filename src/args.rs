//! Command line arguments of the `beamscope` binary.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::serial_receiver::DEFAULT_BAUD_RATE;

/// Real-time acoustic camera: beamforms a microphone array into a live
/// heatmap of where sound is coming from.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct BeamArgs {
    /// Where the samples come from
    #[command(subcommand)]
    pub command: SourceCommand,

    /// Configuration file in RON; defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the horizontal image resolution
    #[arg(long = "res-x")]
    pub resolution_x: Option<usize>,

    /// Override the vertical image resolution
    #[arg(long = "res-y")]
    pub resolution_y: Option<usize>,

    /// Dump the raw sample store here on exit
    #[arg(short, long)]
    pub dump: Option<PathBuf>,

    /// Record the monitored channel to this WAV file
    #[arg(short, long)]
    pub audio: Option<PathBuf>,

    /// Write the effective configuration here and exit
    #[arg(long = "write-config")]
    pub write_config: Option<PathBuf>,
}

/// The available sample sources.
#[derive(Debug, Subcommand, Clone)]
pub enum SourceCommand {
    /// A simulated plane-wave tone, no hardware needed
    #[command(about)]
    Synthetic(SyntheticCommand),

    /// Frames streamed from the acquisition board over a serial link
    #[command(about)]
    Serial(SerialCommand),

    /// A sample store dump played back in a loop
    #[command(about)]
    Replay(ReplayCommand),
}

/// Options of the simulated source.
#[derive(Debug, Args, Clone)]
pub struct SyntheticCommand {
    /// Tone frequency in Hz
    #[arg(short, long, default_value_t = 2000.0)]
    pub frequency: f32,

    /// Peak amplitude of the tone
    #[arg(long, default_value_t = 0.01)]
    pub amplitude: f32,

    /// Half-width of the uniform noise on every channel
    #[arg(short, long, default_value_t = 0.0005)]
    pub noise: f32,

    /// x component of the direction the tone arrives from
    #[arg(short = 'x', long = "dir-x", default_value_t = 0.3, allow_negative_numbers = true)]
    pub direction_x: f32,

    /// y component of the direction the tone arrives from
    #[arg(short = 'y', long = "dir-y", default_value_t = -0.2, allow_negative_numbers = true)]
    pub direction_y: f32,
}

/// Options of the serial source.
#[derive(Debug, Args, Clone)]
pub struct SerialCommand {
    /// Serial device; a picker is shown when omitted
    pub device: Option<PathBuf>,

    /// Line rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

/// Options of the replay source.
#[derive(Debug, Args, Clone)]
pub struct ReplayCommand {
    /// A dump written with `--dump`
    pub file: PathBuf,

    /// Replay as fast as possible instead of in real time
    #[arg(long)]
    pub fast: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_defaults() {
        let args = BeamArgs::try_parse_from(["beamscope", "synthetic"]).unwrap();
        assert!(args.config.is_none());
        match args.command {
            SourceCommand::Synthetic(cmd) => {
                assert_eq!(cmd.frequency, 2000.0);
                assert_eq!(cmd.direction_y, -0.2);
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn global_options_and_serial() {
        let args = BeamArgs::try_parse_from([
            "beamscope",
            "--res-x",
            "48",
            "--dump",
            "store.bin",
            "serial",
            "/dev/ttyUSB0",
        ])
        .unwrap();
        assert_eq!(args.resolution_x, Some(48));
        assert_eq!(args.dump, Some(PathBuf::from("store.bin")));
        match args.command {
            SourceCommand::Serial(cmd) => {
                assert_eq!(cmd.device, Some(PathBuf::from("/dev/ttyUSB0")));
                assert_eq!(cmd.baud, DEFAULT_BAUD_RATE);
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn replay_needs_a_file() {
        assert!(BeamArgs::try_parse_from(["beamscope", "replay"]).is_err());
        let args = BeamArgs::try_parse_from(["beamscope", "replay", "store.bin", "--fast"]).unwrap();
        assert!(matches!(args.command, SourceCommand::Replay(ReplayCommand { fast: true, .. })));
    }

    #[test]
    fn negative_directions_parse() {
        let args = BeamArgs::try_parse_from(["beamscope", "synthetic", "-x", "-0.5"]).unwrap();
        match args.command {
            SourceCommand::Synthetic(cmd) => assert_eq!(cmd.direction_x, -0.5),
            other => panic!("parsed {:?}", other),
        }
    }
}
