//! Line segment type.

use super::Point;
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A line segment between two points.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Line {
    pub a: Point,
    pub b: Point,
}

impl Line {
    /// Create a new line segment.
    #[inline]
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Length of the segment in micrometers.
    #[inline]
    pub fn length(&self) -> CoordF {
        self.a.distance(&self.b)
    }

    /// The direction vector of the segment.
    #[inline]
    pub fn vector(&self) -> Point {
        self.b - self.a
    }

    /// Project a point onto this segment, clamped to the endpoints.
    pub fn project_point(&self, p: &Point) -> Point {
        let ab = self.b - self.a;
        let ap = *p - self.a;

        let ab_len_sq = ab.length_squared();
        if ab_len_sq == 0 {
            return self.a;
        }

        let t = (ap.dot(&ab) as CoordF / ab_len_sq as CoordF).clamp(0.0, 1.0);
        Point::new(
            (self.a.x as CoordF + t * ab.x as CoordF).round() as Coord,
            (self.a.y as CoordF + t * ab.y as CoordF).round() as Coord,
        )
    }

    /// Distance from a point to this segment.
    pub fn distance_to_point(&self, p: &Point) -> CoordF {
        p.distance(&self.project_point(p))
    }

    /// Check if a point lies on this segment within a tolerance.
    pub fn contains_point(&self, p: &Point, tolerance: Coord) -> bool {
        self.distance_to_point(p) <= tolerance as CoordF
    }

    /// Intersect with another segment.
    ///
    /// Returns the intersection point and the parameter along `self`
    /// (0.0 at `a`, 1.0 at `b`), or `None` when the segments do not
    /// properly cross.
    pub fn intersect(&self, other: &Line) -> Option<(Point, CoordF)> {
        let r = self.vector();
        let s = other.vector();
        let denom = r.cross(&s);
        if denom == 0 {
            return None; // parallel or collinear
        }

        let qp = other.a - self.a;
        let t = qp.cross(&s) as CoordF / denom as CoordF;
        let u = qp.cross(&r) as CoordF / denom as CoordF;

        if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
            return None;
        }

        let p = Point::new(
            (self.a.x as CoordF + t * r.x as CoordF).round() as Coord,
            (self.a.y as CoordF + t * r.y as CoordF).round() as Coord,
        );
        Some((p, t))
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?} -> {:?})", self.a, self.b)
    }
}
