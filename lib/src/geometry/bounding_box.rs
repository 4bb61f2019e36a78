//! Axis-aligned bounding boxes in 2D and 3D.

use super::{Point, Point3};
use crate::Coord;
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box in micrometers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

impl BoundingBox {
    /// Create an empty (inverted) bounding box.
    pub fn new() -> Self {
        Self {
            min: Point::new(Coord::MAX, Coord::MAX),
            max: Point::new(Coord::MIN, Coord::MIN),
        }
    }

    /// Build a bounding box covering the given points.
    pub fn from_points(points: &[Point]) -> Self {
        let mut bb = Self::new();
        for p in points {
            bb.merge_point(*p);
        }
        bb
    }

    /// Check if the box covers no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Expand the box to include a point.
    pub fn merge_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    /// Expand the box to include another box.
    pub fn merge(&mut self, other: &BoundingBox) {
        if !other.is_empty() {
            self.merge_point(other.min);
            self.merge_point(other.max);
        }
    }

    /// Check if two boxes overlap.
    pub fn hit(&self, other: &BoundingBox) -> bool {
        !(self.max.x < other.min.x
            || self.min.x > other.max.x
            || self.max.y < other.min.y
            || self.min.y > other.max.y)
    }

    /// Check if a point lies inside the box (inclusive).
    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Box size as a point (width, height).
    pub fn size(&self) -> Point {
        Point::new(self.max.x - self.min.x, self.max.y - self.min.y)
    }

    /// Box center.
    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2, (self.min.y + self.max.y) / 2)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

/// A 3D axis-aligned bounding box in micrometers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox3 {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox3 {
    /// Create an empty (inverted) bounding box.
    pub fn new() -> Self {
        Self {
            min: Point3::new(Coord::MAX, Coord::MAX, Coord::MAX),
            max: Point3::new(Coord::MIN, Coord::MIN, Coord::MIN),
        }
    }

    /// Check if the box covers no volume.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand the box to include a point.
    pub fn merge_point(&mut self, p: Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Box size as a point (width, depth, height).
    pub fn size(&self) -> Point3 {
        Point3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }
}

impl Default for BoundingBox3 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_merge() {
        let mut bb = BoundingBox::new();
        assert!(bb.is_empty());

        bb.merge_point(Point::new(10, 20));
        bb.merge_point(Point::new(-5, 40));

        assert!(!bb.is_empty());
        assert_eq!(bb.min, Point::new(-5, 20));
        assert_eq!(bb.max, Point::new(10, 40));
    }

    #[test]
    fn test_bounding_box_hit() {
        let a = BoundingBox::from_points(&[Point::new(0, 0), Point::new(100, 100)]);
        let b = BoundingBox::from_points(&[Point::new(50, 50), Point::new(150, 150)]);
        let c = BoundingBox::from_points(&[Point::new(200, 200), Point::new(300, 300)]);

        assert!(a.hit(&b));
        assert!(!a.hit(&c));
    }

    #[test]
    fn test_bounding_box3_size() {
        let mut bb = BoundingBox3::new();
        bb.merge_point(Point3::new(0, 0, 0));
        bb.merge_point(Point3::new(10, 20, 30));
        let size = bb.size();
        assert_eq!(size.x, 10);
        assert_eq!(size.y, 20);
        assert_eq!(size.z, 30);
    }
}
