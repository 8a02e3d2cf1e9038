//! The acoustic camera: connects a sample source, beamforms it into a live
//! heatmap in the terminal, and optionally records one channel to WAV and
//! dumps the sample store on exit.
//!
//! ```text
//! cargo run --bin beamscope -- --res-x 48 --res-y 48 synthetic -x 0.3 -y -0.2
//! cargo run --bin beamscope -- --config array.ron --audio ch140.wav serial /dev/ttyUSB0
//! cargo run --bin beamscope -- replay store.bin
//! ```

use beamscope::{
    args::{BeamArgs, SourceCommand},
    audio_monitor::AudioMonitor,
    component::{run_component, ComponentError, GainStage},
    config::BeamConfig,
    geometry::Position,
    gui::{beam_view, device_selector},
    hound_writer::HoundWriter,
    pipeline::Pipeline,
    receiver::Receiver,
    replay_receiver::ReplayReceiver,
    scanner::{BeamImage, BeamScanner},
    serial_receiver::SerialReceiver,
    signal,
    synthetic_receiver::SyntheticReceiver,
};

use clap::Parser;
use log::{error, info, warn};
use std::{
    error::Error,
    path::Path,
    process::ExitCode,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

type Source = Box<dyn Receiver>;

fn main() -> ExitCode {
    env_logger::init();
    let args = BeamArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("beamscope: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &BeamArgs) -> Result<BeamConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => BeamConfig::from_path(path)?,
        None => BeamConfig::default(),
    };
    if let Some(x) = args.resolution_x {
        config.resolution_x = x;
    }
    if let Some(y) = args.resolution_y {
        config.resolution_y = y;
    }
    config.validate()?;
    Ok(config)
}

/// Builds the receiver named on the command line. `None` when the user
/// backed out of the device picker.
fn open_source(
    command: &SourceCommand,
    config: &BeamConfig,
) -> Result<Option<(Source, String)>, Box<dyn Error>> {
    let source: (Source, String) = match command {
        SourceCommand::Synthetic(cmd) => {
            let z = (1.0 - cmd.direction_x.powi(2) - cmd.direction_y.powi(2))
                .max(0.0)
                .sqrt();
            let receiver = SyntheticReceiver::builder(config)
                .direction(Position::new(cmd.direction_x, cmd.direction_y, z))
                .frequency(cmd.frequency)
                .amplitude(cmd.amplitude)
                .noise(cmd.noise)
                .build();
            (
                Box::new(receiver) as Source,
                format!(
                    "synthetic {} Hz from ({:.2}, {:.2})",
                    cmd.frequency, cmd.direction_x, cmd.direction_y
                ),
            )
        }
        SourceCommand::Serial(cmd) => {
            let device = match &cmd.device {
                Some(device) => device.clone(),
                None => match device_selector(SerialReceiver::available_ports()?)? {
                    Some(device) => device,
                    None => return Ok(None),
                },
            };
            let name = device.display().to_string();
            (Box::new(SerialReceiver::new(device, cmd.baud)) as Source, name)
        }
        SourceCommand::Replay(cmd) => {
            let rate = (!cmd.fast).then_some(config.sample_rate);
            let receiver = ReplayReceiver::new(&cmd.file, config.channels, config.window, rate);
            (
                Box::new(receiver) as Source,
                format!("replay of {}", cmd.file.display()),
            )
        }
    };
    Ok(Some(source))
}

/// The audio tap: monitor thread, gain stage, WAV writer.
struct AudioChain {
    monitor: JoinHandle<()>,
    gain: JoinHandle<Result<(), ComponentError>>,
    writer: JoinHandle<Result<(), ComponentError>>,
    results: mpsc::Receiver<Result<(), hound::Error>>,
}

impl AudioChain {
    fn start(
        pipeline: &Arc<Pipeline<Source>>,
        config: &BeamConfig,
        path: &Path,
    ) -> Result<Self, Box<dyn Error>> {
        let writer = HoundWriter::new(path, config.sample_rate.round() as u32)?;
        let mut monitor = AudioMonitor::from_config(config);
        info!(
            "recording channel {} to {}",
            monitor.channel(),
            path.display()
        );

        let (block_tx, block_rx) = mpsc::channel::<Vec<f32>>();
        let (gained_tx, gained_rx) = mpsc::channel();
        let (result_tx, results) = mpsc::channel();

        let gain = run_component(GainStage::new(config.audio.gain), block_rx, gained_tx);
        let writer = run_component(writer, gained_rx, result_tx);
        let monitor_pipeline = Arc::clone(pipeline);
        let monitor = thread::spawn(move || monitor.run(&monitor_pipeline, block_tx));

        Ok(Self {
            monitor,
            gain,
            writer,
            results,
        })
    }

    /// Waits for the chain to drain. Only call once the pipeline is
    /// disconnected, or this blocks forever.
    fn finish(self) -> Result<(), Box<dyn Error>> {
        self.monitor
            .join()
            .map_err(|_| "audio monitor thread panicked")?;
        self.gain.join().map_err(|_| "gain stage panicked")??;
        self.writer.join().map_err(|_| "wav writer panicked")??;

        let failed = self.results.try_iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("{} audio blocks could not be written", failed);
        }
        Ok(())
    }
}

fn run(args: BeamArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    if let Some(path) = &args.write_config {
        config.to_path(path)?;
        info!("wrote configuration to {}", path.display());
        return Ok(());
    }

    let Some((receiver, source_name)) = open_source(&args.command, &config)? else {
        info!("no device selected");
        return Ok(());
    };

    let mut scanner = BeamScanner::from_config(&config)?;
    info!(
        "{} pixels, {} elements, max delay {:.2} samples",
        scanner.grid().pixel_count(),
        scanner.grid().n_elements(),
        scanner.grid().max_delay()
    );

    let pipeline: Arc<Pipeline<Source>> = Arc::new(Pipeline::new(
        receiver,
        config.channels,
        config.buffer_length,
    ));
    signal::install_interrupt_handler()?;
    pipeline.connect()?;

    let (frame_tx, frame_rx) = mpsc::channel::<BeamImage>();
    let scan_pipeline = Arc::clone(&pipeline);
    let scan_thread = thread::spawn(move || {
        let mut frame_tx = frame_tx;
        scanner.run(&scan_pipeline, &mut frame_tx);
    });

    let audio = match &args.audio {
        Some(path) => match AudioChain::start(&pipeline, &config, path) {
            Ok(chain) => Some(chain),
            Err(e) => {
                warn!("audio recording disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let exit = beam_view(&pipeline, &frame_rx, &source_name);
    match &exit {
        Ok(reason) => info!("leaving: {:?}", reason),
        Err(e) => error!("display failed: {}", e),
    }

    if pipeline.is_running() {
        pipeline.disconnect()?;
    }
    scan_thread
        .join()
        .map_err(|_| "scanner thread panicked")?;
    if let Some(audio) = audio {
        audio.finish()?;
    }

    if let Some(path) = &args.dump {
        pipeline.save_snapshot(path)?;
        info!("dumped the sample store to {}", path.display());
    }

    exit?;
    Ok(())
}
