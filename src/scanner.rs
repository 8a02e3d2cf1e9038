//! The delay-and-sum scan loop.
//!
//! Once per generation the scanner sweeps scan pixels in raster order until
//! either the whole image is done or the producer publishes the next
//! generation, whichever comes first. The pixel cursor carries over between
//! frames, so a slow machine refreshes the image in bands instead of
//! restarting at the top every time.
//!
//! Pixel reads race the producer on purpose (see [`crate::ring_buffer`]): a
//! pass that outlives one producer cycle mixes samples of two batches.

use crate::agc::{to_u8, Agc, AgcParams};
use crate::config::{BeamConfig, ConfigError};
use crate::pipeline::Pipeline;
use crate::receiver::Receiver;
use crate::ring_buffer::CircularSampleStore;
use crate::scan_grid::ScanGrid;

use log::{debug, trace};
use std::sync::mpsc::Sender;

/// One 8-bit intensity map, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamImage {
    /// Pixels per row
    pub width: usize,
    /// Number of rows
    pub height: usize,
    /// `y * width + x`
    pub pixels: Vec<u8>,
    /// Generation the frame was finished in
    pub generation: u64,
}

impl BeamImage {
    /// An all-black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
            generation: 0,
        }
    }

    /// The intensity at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

/// Where finished frames go. Called once per frame from the scan thread.
pub trait FrameSink {
    /// Hands over a finished frame.
    fn publish(&mut self, image: &BeamImage);
}

impl FrameSink for Sender<BeamImage> {
    fn publish(&mut self, image: &BeamImage) {
        if self.send(image.clone()).is_err() {
            trace!("no renderer is listening, dropping frame {}", image.generation);
        }
    }
}

impl FrameSink for Vec<BeamImage> {
    fn publish(&mut self, image: &BeamImage) {
        self.push(image.clone());
    }
}

/// The per-pixel beamformer plus its display normalisation.
pub struct BeamScanner {
    grid: ScanGrid,
    first_channel: usize,
    // read offset that keeps every delayed read in the past
    margin: f32,
    window: Vec<f32>,
    sweep: Vec<usize>,
    cursor: usize,
    agc: Agc,
    image: BeamImage,
}

impl BeamScanner {
    /// Validates `config`, builds its scan grid and checks that the ring is
    /// long enough for it. Every error here is fatal.
    pub fn from_config(config: &BeamConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let grid = ScanGrid::build(
            &config.geometry(),
            &config.steering_model(),
            &config.grid_spec(),
        );
        config.check_capacity(grid.max_delay())?;

        Ok(Self::new(
            grid,
            config.first_channel,
            config.window,
            config.agc.clone(),
        ))
    }

    /// A scanner over `grid` whose element `e` lives in store channel
    /// `first_channel + e`, beamforming `window` samples per pixel.
    pub fn new(grid: ScanGrid, first_channel: usize, window: usize, params: AgcParams) -> Self {
        let sweep = grid.valid_pixels();
        let image = BeamImage::new(grid.resolution_x(), grid.resolution_y());
        Self {
            margin: grid.max_delay().ceil(),
            first_channel,
            window: vec![0.0; window],
            sweep,
            cursor: 0,
            agc: Agc::new(params),
            image,
            grid,
        }
    }

    /// Normalised beam power towards `pixel`: the mean square of the
    /// delayed-and-averaged element signals over one window.
    pub fn pixel_power(&mut self, store: &CircularSampleStore, pixel: usize) -> f32 {
        self.window.fill(0.0);

        let delays = self.grid.pixel_delays(pixel);
        for (element, delay) in delays.iter().enumerate() {
            store.accumulate_window(
                self.first_channel + element,
                self.margin - delay,
                &mut self.window,
            );
        }

        let n = delays.len() as f32;
        let energy: f32 = self
            .window
            .iter()
            .map(|s| {
                let v = s / n;
                v * v
            })
            .sum();

        energy / self.window.len() as f32
    }

    /// Beamforms one pixel, runs it through the AGC and stores the result
    /// in the image.
    pub fn process_pixel(&mut self, store: &CircularSampleStore, pixel: usize) -> u8 {
        let power = self.pixel_power(store, pixel);
        let value = to_u8(self.agc.apply(power));
        self.image.pixels[pixel] = value;
        value
    }

    /// Sweeps at most one image's worth of pixels, continuing from where
    /// the previous frame stopped, while `keep_going` holds. At least one
    /// pixel is processed per call. Ends with the AGC epilogue and returns
    /// the number of pixels done.
    pub fn scan_frame(
        &mut self,
        store: &CircularSampleStore,
        mut keep_going: impl FnMut() -> bool,
    ) -> usize {
        self.agc.begin_frame();

        let mut done = 0;
        while done < self.sweep.len() && (done == 0 || keep_going()) {
            let pixel = self.sweep[self.cursor];
            self.process_pixel(store, pixel);
            self.cursor = (self.cursor + 1) % self.sweep.len();
            done += 1;
        }

        self.agc.end_frame();
        done
    }

    /// The scan loop: wait for a generation, sweep until the next one,
    /// publish, repeat until the pipeline disconnects.
    pub fn run<R: Receiver>(&mut self, pipeline: &Pipeline<R>, sink: &mut impl FrameSink) {
        debug!("scanner started over {} pixels", self.sweep.len());

        while pipeline.is_running() {
            pipeline.barrier();
            if !pipeline.is_running() {
                break;
            }

            let frame_id = pipeline.current_generation();
            let done = self.scan_frame(pipeline.store(), || {
                pipeline.current_generation() == frame_id
            });

            self.image.generation = frame_id;
            sink.publish(&self.image);
            trace!(
                "frame {}: {} pixels, ceiling {:.3}, squelch tracker {:.3e}",
                frame_id,
                done,
                self.agc.max_decay(),
                self.agc.power()
            );
        }

        debug!("scanner stopped");
    }

    /// The image as it currently stands.
    pub fn image(&self) -> &BeamImage {
        &self.image
    }

    /// The AGC state.
    pub fn agc(&self) -> &Agc {
        &self.agc
    }

    /// The scan grid in use.
    pub fn grid(&self) -> &ScanGrid {
        &self.grid
    }
}
