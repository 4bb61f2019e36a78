//! Model placement transform.
//!
//! Applies the configured rotation matrix, positions the model on the
//! build plate and clips the bottom. The output of the transform is a
//! micrometer-space vertex, ready for welding.

use crate::geometry::{Point, Point3F};
use crate::{Coord, CoordF};

/// Affine placement of a model: a 3x3 rotation/scale matrix, an XY
/// placement target, optional centering, and a bottom clip.
#[derive(Clone, Debug)]
pub struct Transform {
    /// Row-major 3x3 matrix applied to every vertex (in mm space).
    pub matrix: [[CoordF; 3]; 3],
    /// Where to place the object, in micrometers.
    pub position: Point,
    /// When set, the object's XY bounding-box center lands on
    /// `position`; otherwise the object keeps its own XY origin offset
    /// by `position`.
    pub center_in_xy: bool,
    /// Amount cut off the bottom of the model, in micrometers.
    pub bottom_clip: Coord,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            position: Point::new(102_500, 102_500),
            center_in_xy: true,
            bottom_clip: 0,
        }
    }
}

impl Transform {
    /// Apply the rotation matrix to a vertex (still in mm space).
    pub fn apply_matrix(&self, v: &Point3F) -> Point3F {
        Point3F::new(
            self.matrix[0][0] * v.x + self.matrix[0][1] * v.y + self.matrix[0][2] * v.z,
            self.matrix[1][0] * v.x + self.matrix[1][1] * v.y + self.matrix[1][2] * v.z,
            self.matrix[2][0] * v.x + self.matrix[2][1] * v.y + self.matrix[2][2] * v.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = Transform::default();
        let v = Point3F::new(1.0, 2.0, 3.0);
        let r = t.apply_matrix(&v);
        assert!((r.x - 1.0).abs() < 1e-12);
        assert!((r.y - 2.0).abs() < 1e-12);
        assert!((r.z - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_z_90() {
        let t = Transform {
            matrix: [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            ..Transform::default()
        };
        let r = t.apply_matrix(&Point3F::new(1.0, 0.0, 0.0));
        assert!((r.x).abs() < 1e-12);
        assert!((r.y - 1.0).abs() < 1e-12);
    }
}
