//! Far-field steering delays.
//!
//! For a plane wave arriving from unit direction `u`, an element at `p`
//! hears the wavefront `p·u / c` seconds before the array origin does. The
//! steering delay cancels that lead: element `i` is read at `t + d_i` with
//! `d_i = -(p_i·u) * fs / c`, so elements ahead of the wavefront get a
//! negative delay and the aligned signals add up in phase.

use crate::geometry::{ArrayGeometry, Position};

/// Speed of sound in air at roughly 20 degrees C, in meters per second.
pub const SPEED_OF_SOUND: f32 = 343.0;

/// The constants that turn a projected distance into a delay in samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringModel {
    /// Samples per second of every channel
    pub sample_rate: f32,
    /// Propagation speed of the wave, meters per second
    pub propagation_speed: f32,
}

impl SteeringModel {
    /// A model for the given sample rate and propagation speed.
    pub fn new(sample_rate: f32, propagation_speed: f32) -> Self {
        Self {
            sample_rate,
            propagation_speed,
        }
    }

    /// Delay, in samples, for one element towards `direction`.
    pub fn delay(&self, element: &Position, direction: &Position) -> f32 {
        -element.dot(direction) * self.sample_rate / self.propagation_speed
    }

    /// One delay per element of `geometry`, in array order.
    pub fn steering_delays(&self, geometry: &ArrayGeometry, direction: &Position) -> Vec<f32> {
        geometry
            .positions()
            .iter()
            .map(|p| self.delay(p, direction))
            .collect()
    }
}

/// Direction cosines for an azimuth (rotation about the y axis, away from
/// the zenith towards +x) and an elevation (towards +y), both in radians.
pub fn direction_from_angles(azimuth: f32, elevation: f32) -> Position {
    Position::new(
        azimuth.sin() * elevation.cos(),
        elevation.sin(),
        azimuth.cos() * elevation.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48_000.0;

    #[test]
    fn broadside_has_no_delay() {
        let array = ArrayGeometry::build_array(Position::default(), 8, 8, 0.02);
        let model = SteeringModel::new(FS, SPEED_OF_SOUND);
        let delays = model.steering_delays(&array, &Position::new(0.0, 0.0, 1.0));

        assert_eq!(delays.len(), 64);
        assert!(delays.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn delay_is_linear_in_projection() {
        let array = ArrayGeometry::from_positions(vec![
            Position::new(0.1, 0.0, 0.0),
            Position::new(0.3, 0.0, 0.0),
        ]);
        let model = SteeringModel::new(FS, SPEED_OF_SOUND);
        let direction = direction_from_angles(0.4, 0.0);
        let delays = model.steering_delays(&array, &direction);

        // three times as far along the same line, three times the delay
        assert!((delays[1] - 3.0 * delays[0]).abs() < 1e-4);

        let expected = -0.1 * direction.x * FS / SPEED_OF_SOUND;
        assert!((delays[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn element_ahead_of_wavefront_is_negative() {
        let model = SteeringModel::new(FS, SPEED_OF_SOUND);
        let ahead = Position::new(0.05, 0.0, 0.0);
        let behind = Position::new(-0.05, 0.0, 0.0);
        let towards_x = direction_from_angles(std::f32::consts::FRAC_PI_4, 0.0);

        assert!(model.delay(&ahead, &towards_x) < 0.0);
        assert!(model.delay(&behind, &towards_x) > 0.0);
    }

    #[test]
    fn delays_are_reproducible() {
        let array = ArrayGeometry::build_array(Position::default(), 4, 4, 0.03);
        let model = SteeringModel::new(FS, SPEED_OF_SOUND);
        let direction = Position::new(0.2, -0.1, (1.0f32 - 0.05).sqrt());

        let a = model.steering_delays(&array, &direction);
        let b = model.steering_delays(&array, &direction);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}
