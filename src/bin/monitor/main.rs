//! Inspects a sample store dump: plots the RMS and peak level of every
//! channel, to check which inputs of the array are alive.

mod gui;

use std::{path::PathBuf, process::ExitCode};

use beamscope::{
    config::BeamConfig,
    snapshot::{channel_levels, load_snapshot},
};
use clap::Parser;
use gui::engage_gui;
use log::{error, info};

/// Plot per-channel levels of a dump written by `beamscope --dump`.
#[derive(Debug, Parser)]
#[clap(version, about)]
struct MonitorArgs {
    /// The dump to inspect
    file: PathBuf,

    /// Configuration the dump was recorded with, for its channel count
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel count, overriding the configuration
    #[arg(short = 'n', long)]
    channels: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = MonitorArgs::parse();

    let config = match &args.config {
        Some(path) => match BeamConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                error!("could not read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => BeamConfig::default(),
    };
    let channels = args.channels.unwrap_or(config.channels);

    let lanes = match load_snapshot(&args.file, channels) {
        Ok(lanes) => lanes,
        Err(e) => {
            error!("could not load {}: {}", args.file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let levels = channel_levels(&lanes);
    info!(
        "{} channels of {} samples",
        levels.len(),
        lanes.first().map_or(0, Vec::len)
    );

    let wired = config.first_channel..config.first_channel + config.n_elements();
    if let Err(e) = engage_gui(&levels, wired) {
        error!("terminal error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
