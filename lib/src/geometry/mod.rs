//! Geometry primitives.
//!
//! All printable geometry lives on an integer micrometer grid
//! ([`Point`], [`Polygon`], [`ExPolygon`]); floating-point twins exist
//! only at the mesh-loading boundary and inside geometric kernels.

mod bounding_box;
mod expolygon;
mod line;
mod point;
mod polygon;
mod polyline;

pub use bounding_box::{BoundingBox, BoundingBox3};
pub use expolygon::{total_area, ExPolygon, ExPolygons};
pub use line::Line;
pub use point::{Point, Point3, Point3F, PointF};
pub use polygon::{Polygon, Polygons};
pub use polyline::Polyline;
