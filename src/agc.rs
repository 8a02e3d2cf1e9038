//! Adaptive normalisation of beam power for display.
//!
//! Raw beam powers span many decades. Each pixel is log-compressed, divided
//! by an adaptive ceiling and raised to a steep exponent, so only values near
//! the recent peak stand out. Two trackers adapt once per frame, both rising
//! instantly and falling through an exponential moving average:
//!
//! - `max_decay`, the ceiling, follows the frame's largest log power;
//! - `power`, the squelch tracker, follows the frame's largest raw power.
//!
//! While `power` sits below the squelch threshold the whole frame is blanked,
//! so a quiet scene shows black instead of amplified noise.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};

// The ceiling divides every pixel; keep it away from zero
const MIN_CEILING: f32 = f32::MIN_POSITIVE;

/// Constants of the display transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcParams {
    /// Multiplier applied to the raw power before taking the log
    pub scale: f32,
    /// Contrast exponent applied after normalisation
    pub exponent: f32,
    /// Smoothing factor of both trackers on the way down
    pub alpha: f32,
    /// Frames are blanked while the power tracker is below this
    pub squelch_threshold: f32,
    /// Starting value of the ceiling
    pub initial_ceiling: f32,
}

impl Default for AgcParams {
    fn default() -> Self {
        Self {
            scale: 1e9,
            exponent: 13.0,
            alpha: 0.3,
            squelch_threshold: 3e-8,
            initial_ceiling: 0.01,
        }
    }
}

impl AgcParams {
    /// Refuses constants the transform cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.scale, "agc scale"),
            (self.exponent, "agc exponent"),
            (self.squelch_threshold, "agc squelch threshold"),
            (self.initial_ceiling, "agc initial ceiling"),
        ];
        for (value, name) in checks {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidConstant(name));
            }
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidConstant("agc alpha"));
        }
        Ok(())
    }
}

/// The state of the control loop. One per scanner.
#[derive(Debug, Clone)]
pub struct Agc {
    params: AgcParams,
    max_decay: f32,
    power: f32,
    // per frame
    max_val: f32,
    avg_power: f32,
}

impl Agc {
    /// Starts with the initial ceiling and the tracker just under the
    /// squelch threshold, so the first frame is blank.
    pub fn new(params: AgcParams) -> Self {
        Self {
            max_decay: params.initial_ceiling,
            power: params.squelch_threshold * 0.9,
            max_val: 0.0,
            avg_power: 0.0,
            params,
        }
    }

    /// Resets the per-frame peaks.
    pub fn begin_frame(&mut self) {
        self.max_val = 0.0;
        self.avg_power = 0.0;
    }

    /// Records one pixel's raw power in the frame peaks and returns its
    /// display intensity in [0, 1].
    pub fn apply(&mut self, power: f32) -> f32 {
        if power > self.avg_power {
            self.avg_power = power;
        }

        let log_power = (power * self.params.scale).ln();
        if log_power > self.max_val {
            self.max_val = log_power;
        }

        self.intensity_of_log(log_power)
    }

    /// The display intensity of a raw power under the current state,
    /// without touching the frame peaks.
    pub fn intensity(&self, power: f32) -> f32 {
        self.intensity_of_log((power * self.params.scale).ln())
    }

    fn intensity_of_log(&self, log_power: f32) -> f32 {
        if self.is_squelched() {
            return 0.0;
        }
        let v = (log_power / self.max_decay).powf(self.params.exponent);
        if v.is_nan() {
            0.0
        } else {
            v.clamp(0.0, 1.0)
        }
    }

    /// Frame epilogue: move both trackers towards this frame's peaks.
    pub fn end_frame(&mut self) {
        self.max_decay = self.follow(self.max_decay, self.max_val).max(MIN_CEILING);
        self.power = self.follow(self.power, self.avg_power);
    }

    // instant rise, smoothed fall
    fn follow(&self, tracker: f32, peak: f32) -> f32 {
        if peak > tracker {
            peak
        } else {
            self.params.alpha * peak + (1.0 - self.params.alpha) * tracker
        }
    }

    /// True while frames are blanked.
    pub fn is_squelched(&self) -> bool {
        self.power < self.params.squelch_threshold
    }

    /// The adaptive ceiling.
    pub fn max_decay(&self) -> f32 {
        self.max_decay
    }

    /// The squelch tracker.
    pub fn power(&self) -> f32 {
        self.power
    }

    /// Largest log power seen so far this frame.
    pub fn frame_max(&self) -> f32 {
        self.max_val
    }

    /// Largest raw power seen so far this frame.
    pub fn frame_peak_power(&self) -> f32 {
        self.avg_power
    }

    /// The constants in use.
    pub fn params(&self) -> &AgcParams {
        &self.params
    }
}

/// Scales a [0, 1] intensity to a display byte.
pub fn to_u8(intensity: f32) -> u8 {
    (intensity.clamp(0.0, 1.0) * 255.0) as u8
}
