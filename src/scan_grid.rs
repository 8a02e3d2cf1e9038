//! The precomputed table of steering delays for every scan pixel.
//!
//! The table is built once at startup and is read-only afterwards. Pixels are
//! stored in row-major raster order (`y * resolution_x + x`) and each pixel
//! owns `n_elements` contiguous delays.

use crate::geometry::{ArrayGeometry, Position};
use crate::steering::SteeringModel;
use log::debug;
use serde::{Deserialize, Serialize};

/// How an image pixel becomes a look direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// Image centre is the zenith, the image edge approaches the horizon.
    /// Pixel offsets from the centre are used directly as direction cosines.
    #[default]
    Fisheye,
    /// Columns and rows are mapped to azimuth and elevation angles through
    /// `atan`, spanning +/-45 degrees at a field of view scale of one.
    Angular,
}

/// What to do with pixels whose look direction falls below the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HemispherePolicy {
    /// Pull the direction back onto the horizon (zero elevation).
    #[default]
    Clamp,
    /// Drop the pixel from the sweep; it always renders as zero.
    Exclude,
}

/// Everything needed to lay out the scan besides the array itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Image width in pixels
    pub resolution_x: usize,
    /// Image height in pixels
    pub resolution_y: usize,
    /// Pixel to direction mapping
    pub projection: Projection,
    /// Widens (> 1) or narrows (< 1) the field of view
    pub fov_scale: f32,
    /// Below-horizon handling
    pub policy: HemispherePolicy,
}

impl GridSpec {
    /// The look direction of pixel (`x`, `y`), or `None` if the pixel is
    /// excluded by the hemisphere policy.
    pub fn pixel_direction(&self, x: usize, y: usize) -> Option<Position> {
        match self.projection {
            Projection::Fisheye => self.fisheye_direction(x, y),
            Projection::Angular => self.angular_direction(x, y),
        }
    }

    fn fisheye_direction(&self, x: usize, y: usize) -> Option<Position> {
        let half_x = self.resolution_x as f32 / 2.0 - 0.5;
        let half_y = self.resolution_y as f32 / 2.0 - 0.5;
        let xo = (x as f32 - half_x) / self.resolution_x as f32 * self.fov_scale;
        let yo = (y as f32 - half_y) / self.resolution_y as f32 * self.fov_scale;

        let radicand = 1.0 - xo * xo - yo * yo;
        if radicand >= 0.0 {
            return Some(Position::new(xo, yo, radicand.sqrt()));
        }

        match self.policy {
            HemispherePolicy::Clamp => {
                let r = (xo * xo + yo * yo).sqrt();
                Some(Position::new(xo / r, yo / r, 0.0))
            }
            HemispherePolicy::Exclude => None,
        }
    }

    fn angular_direction(&self, x: usize, y: usize) -> Option<Position> {
        fn angle(i: usize, resolution: usize, scale: f32) -> f32 {
            if resolution < 2 {
                return 0.0;
            }
            let t = 2.0 * i as f64 / (resolution - 1) as f64 - 1.0;
            t.atan() as f32 * scale
        }

        let azimuth = angle(x, self.resolution_x, self.fov_scale);
        let elevation = angle(y, self.resolution_y, self.fov_scale);
        let direction = crate::steering::direction_from_angles(azimuth, elevation);

        if direction.z >= 0.0 {
            return Some(direction);
        }

        match self.policy {
            HemispherePolicy::Clamp => {
                let r = (direction.x * direction.x + direction.y * direction.y).sqrt();
                Some(Position::new(direction.x / r, direction.y / r, 0.0))
            }
            HemispherePolicy::Exclude => None,
        }
    }
}

/// The flat `(pixel, element)` delay table.
#[derive(Debug, Clone)]
pub struct ScanGrid {
    delays: Vec<f32>,
    valid: Vec<bool>,
    n_elements: usize,
    resolution_x: usize,
    resolution_y: usize,
    max_delay: f32,
}

impl ScanGrid {
    /// Steers `geometry` towards every pixel of `spec` and stores the
    /// resulting delays contiguously per pixel.
    pub fn build(geometry: &ArrayGeometry, model: &SteeringModel, spec: &GridSpec) -> Self {
        let n_elements = geometry.len();
        let n_pixels = spec.resolution_x * spec.resolution_y;

        let mut delays = Vec::with_capacity(n_pixels * n_elements);
        let mut valid = Vec::with_capacity(n_pixels);

        for y in 0..spec.resolution_y {
            for x in 0..spec.resolution_x {
                match spec.pixel_direction(x, y) {
                    Some(direction) => {
                        delays.extend(model.steering_delays(geometry, &direction));
                        valid.push(true);
                    }
                    None => {
                        delays.extend(std::iter::repeat(0.0).take(n_elements));
                        valid.push(false);
                    }
                }
            }
        }

        let max_delay = delays.iter().fold(0.0f32, |m, d| m.max(d.abs()));
        debug!(
            "scan grid {}x{} over {} elements, largest delay {:.2} samples, {} pixels excluded",
            spec.resolution_x,
            spec.resolution_y,
            n_elements,
            max_delay,
            valid.iter().filter(|v| !**v).count()
        );

        Self {
            delays,
            valid,
            n_elements,
            resolution_x: spec.resolution_x,
            resolution_y: spec.resolution_y,
            max_delay,
        }
    }

    /// The `n_elements` delays of one pixel.
    pub fn pixel_delays(&self, pixel: usize) -> &[f32] {
        let start = pixel * self.n_elements;
        &self.delays[start..start + self.n_elements]
    }

    /// Whether the pixel takes part in the sweep.
    pub fn is_valid(&self, pixel: usize) -> bool {
        self.valid[pixel]
    }

    /// Raster indices of every pixel that takes part in the sweep.
    pub fn valid_pixels(&self) -> Vec<usize> {
        (0..self.pixel_count()).filter(|&p| self.valid[p]).collect()
    }

    /// The whole table, `pixel * n_elements + element`.
    pub fn as_slice(&self) -> &[f32] {
        &self.delays
    }

    /// Largest absolute delay anywhere in the table, in samples.
    pub fn max_delay(&self) -> f32 {
        self.max_delay
    }

    /// Number of pixels in the image.
    pub fn pixel_count(&self) -> usize {
        self.resolution_x * self.resolution_y
    }

    /// Number of delays stored per pixel.
    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    /// Image width.
    pub fn resolution_x(&self) -> usize {
        self.resolution_x
    }

    /// Image height.
    pub fn resolution_y(&self) -> usize {
        self.resolution_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steering::SPEED_OF_SOUND;

    fn spec(resolution_x: usize, resolution_y: usize) -> GridSpec {
        GridSpec {
            resolution_x,
            resolution_y,
            projection: Projection::Fisheye,
            fov_scale: 1.0,
            policy: HemispherePolicy::Clamp,
        }
    }

    fn model() -> SteeringModel {
        SteeringModel::new(48_000.0, SPEED_OF_SOUND)
    }

    #[test]
    fn table_size_matches_resolution_and_elements() {
        let array = ArrayGeometry::build_array(Position::default(), 4, 2, 0.02);
        let grid = ScanGrid::build(&array, &model(), &spec(7, 5));

        assert_eq!(grid.as_slice().len(), 7 * 5 * 8);
        assert_eq!(grid.pixel_count(), 35);
        assert_eq!(grid.pixel_delays(34).len(), 8);
    }

    #[test]
    fn centre_pixel_is_broadside() {
        let array = ArrayGeometry::build_array(Position::default(), 8, 8, 0.02);
        let grid = ScanGrid::build(&array, &model(), &spec(9, 9));
        let centre = 4 * 9 + 4;

        assert!(grid.pixel_delays(centre).iter().all(|d| d.abs() < 1e-5));
    }

    #[test]
    fn fisheye_directions_are_unit_vectors() {
        let s = spec(16, 12);
        for y in 0..12 {
            for x in 0..16 {
                let d = s.pixel_direction(x, y).unwrap();
                assert!((d.norm() - 1.0).abs() < 1e-5);
                assert!(d.z > 0.0);
            }
        }
    }

    #[test]
    fn raster_order_is_row_major() {
        let s = spec(4, 2);
        let array = ArrayGeometry::from_positions(vec![Position::new(1.0, 0.0, 0.0)]);
        let m = SteeringModel::new(1.0, 1.0);
        let grid = ScanGrid::build(&array, &m, &s);

        // pixel 1 is x = 1 on the first row, so only x changes
        let d0 = s.pixel_direction(0, 0).unwrap();
        let d1 = s.pixel_direction(1, 0).unwrap();
        assert_eq!(grid.pixel_delays(0)[0], -d0.x);
        assert_eq!(grid.pixel_delays(1)[0], -d1.x);
        assert_eq!(d0.y, d1.y);
    }

    #[test]
    fn wide_field_clamps_corners_to_horizon() {
        let s = GridSpec {
            fov_scale: 2.0,
            ..spec(8, 8)
        };
        let corner = s.pixel_direction(0, 0).unwrap();

        assert_eq!(corner.z, 0.0);
        assert!((corner.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn wide_field_can_exclude_corners() {
        let s = GridSpec {
            fov_scale: 2.0,
            policy: HemispherePolicy::Exclude,
            ..spec(8, 8)
        };
        let array = ArrayGeometry::build_array(Position::default(), 2, 2, 0.02);
        let grid = ScanGrid::build(&array, &model(), &s);

        assert!(!grid.is_valid(0));
        assert!(grid.is_valid(4 * 8 + 4));
        assert!(grid.pixel_delays(0).iter().all(|d| *d == 0.0));
        assert!(grid.valid_pixels().len() < 64);
    }

    #[test]
    fn angular_projection_spans_the_row() {
        let s = GridSpec {
            projection: Projection::Angular,
            ..spec(5, 1)
        };
        let left = s.pixel_direction(0, 0).unwrap();
        let middle = s.pixel_direction(2, 0).unwrap();
        let right = s.pixel_direction(4, 0).unwrap();

        assert!(middle.x.abs() < 1e-6);
        assert!((left.x + right.x).abs() < 1e-6);
        // atan(1) is 45 degrees
        assert!((right.x - std::f32::consts::FRAC_PI_4.sin()).abs() < 1e-5);
    }

    #[test]
    fn max_delay_bounds_the_table() {
        let array = ArrayGeometry::build_array(Position::default(), 8, 8, 0.02);
        let grid = ScanGrid::build(&array, &model(), &spec(10, 10));

        assert!(grid.max_delay() > 0.0);
        assert!(grid
            .as_slice()
            .iter()
            .all(|d| d.abs() <= grid.max_delay()));
    }
}
