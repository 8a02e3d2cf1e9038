//! The physical layout of the sensor array.
//!
//! Elements sit on a planar grid in the z = 0 plane of the array frame,
//! centred on an origin, ordered row-major. The layout is generated once and
//! never changes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::{Add, Sub};

/// A point (or direction) in the three-dimensional array frame, in meters.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Across the columns of the array
    pub x: f32,
    /// Across the rows of the array
    pub y: f32,
    /// Away from the array face, towards the zenith
    pub z: f32,
}

impl Position {
    /// Builds a position from its three components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The dot product of two positions.
    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length of the vector from the origin.
    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Straight-line distance to another position.
    pub fn abs_dist(&self, other: &Self) -> f32 {
        (*self - *other).norm()
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Self) -> Self::Output {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// The ordered element positions of a planar array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayGeometry {
    elements: Vec<Position>,
    columns: usize,
    rows: usize,
}

impl ArrayGeometry {
    /// Lays out `columns * rows` elements on a grid centred at `origin`,
    /// `spacing` meters apart along both axes. Element `r * columns + c` sits
    /// in row `r`, column `c`.
    pub fn build_array(origin: Position, columns: usize, rows: usize, spacing: f32) -> Self {
        let half_x = (columns as f32 - 1.0) / 2.0;
        let half_y = (rows as f32 - 1.0) / 2.0;

        let elements = (0..rows)
            .flat_map(|r| (0..columns).map(move |c| (r, c)))
            .map(|(r, c)| {
                origin
                    + Position::new(
                        (c as f32 - half_x) * spacing,
                        (r as f32 - half_y) * spacing,
                        0.0,
                    )
            })
            .collect();

        Self {
            elements,
            columns,
            rows,
        }
    }

    /// Wraps an arbitrary list of element positions, e.g. a linear or
    /// irregular array. Reported as a single row.
    pub fn from_positions(elements: Vec<Position>) -> Self {
        let columns = elements.len();
        Self {
            elements,
            columns,
            rows: 1,
        }
    }

    /// The element positions in array order.
    pub fn positions(&self) -> &[Position] {
        &self.elements
    }

    /// Number of elements in the array.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the array has no elements at all.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of grid columns.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_element_sits_at_origin() {
        let origin = Position::new(0.5, -1.0, 2.0);
        let array = ArrayGeometry::build_array(origin, 1, 1, 0.02);

        assert_eq!(array.len(), 1);
        assert_eq!(array.positions()[0], origin);
    }

    #[test]
    fn grid_is_evenly_spaced_and_distinct() {
        let spacing = 0.02;
        let array = ArrayGeometry::build_array(Position::default(), 4, 3, spacing);
        let elements = array.positions();

        assert_eq!(elements.len(), 12);

        for (i, a) in elements.iter().enumerate() {
            for b in elements.iter().skip(i + 1) {
                assert!(a.abs_dist(b) > spacing * 0.5);
            }
        }

        // neighbours along a row
        for r in 0..3 {
            for c in 0..3 {
                let a = elements[r * 4 + c];
                let b = elements[r * 4 + c + 1];
                assert!((b.x - a.x - spacing).abs() < 1e-6);
                assert_eq!(a.y, b.y);
            }
        }

        // neighbours along a column
        for r in 0..2 {
            let a = elements[r * 4];
            let b = elements[(r + 1) * 4];
            assert!((b.y - a.y - spacing).abs() < 1e-6);
            assert_eq!(a.x, b.x);
        }
    }

    #[test]
    fn grid_is_centred() {
        let array = ArrayGeometry::build_array(Position::default(), 8, 8, 0.02);
        let sum = array
            .positions()
            .iter()
            .fold(Position::default(), |acc, &p| acc + p);

        assert!(sum.norm() < 1e-5);
    }
}
