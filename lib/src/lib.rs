//! # fff-slicer
//!
//! An FFF (fused filament fabrication) slicing pipeline: it turns a
//! triangle mesh into layered 2D regions and emits the G-code that
//! reproduces them on a 3-axis filament printer.
//!
//! The pipeline stages:
//! - STL loading and mesh indexing (vertex welding, face adjacency)
//! - Plane-sweep slicing of triangles into closed layer contours
//! - Per-layer polygon processing: insets, skins, sparse infill,
//!   support, skirt/raft and wipe structures
//! - Path ordering and combing within a layer
//! - A per-layer G-code planner handling travel, retraction, cooling
//!   and minimum-layer-time speed scaling
//!
//! ## Example
//!
//! ```rust,ignore
//! use fff_slicer::config::Settings;
//! use fff_slicer::pipeline::Session;
//!
//! let settings = Settings::default();
//! let mut session = Session::new(settings, "output.gcode")?;
//! session.process_files(&["model.stl"], true)?;
//! session.finalize()?;
//! ```

pub mod adhesion;
pub mod bridge;
pub mod clipper;
pub mod config;
pub mod gcode;
pub mod geometry;
pub mod infill;
pub mod mesh;
pub mod perimeter;
pub mod pipeline;
pub mod skin;
pub mod slice;
pub mod support;
pub mod travel;
pub mod wipe;

pub use config::{GCodeFlavor, InfillType, Settings, SupportType};
pub use gcode::{GCodePlanner, GCodeWriter, PathConfig, PathRole};
pub use geometry::{
    BoundingBox, BoundingBox3, ExPolygon, ExPolygons, Line, Point, Point3, PointF, Polygon,
    Polygons, Polyline,
};
pub use mesh::{load_stl, IndexedMesh, Transform, TriangleMesh};
pub use pipeline::Session;
pub use slice::{Layer, LayerPart, SliceStorage, VolumeStorage};

/// Coordinate type used throughout the slicer: integer micrometers.
pub type Coord = i64;

/// Floating-point coordinate type for unscaled values, in millimeters.
pub type CoordF = f64;

/// Scaling factor between millimeters and internal integer coordinates.
/// 1 unit = 1 micrometer, so 1 mm = 1000 units.
pub const SCALING_FACTOR: f64 = 1000.0;

/// Scale a millimeter value to integer micrometers.
#[inline]
pub fn scale(v: CoordF) -> Coord {
    (v * SCALING_FACTOR).round() as Coord
}

/// Unscale integer micrometers to millimeters.
#[inline]
pub fn unscale(v: Coord) -> CoordF {
    v as CoordF / SCALING_FACTOR
}

/// Result type used throughout the slicer.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for slicer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mesh error: {0}")]
    Mesh(String),

    #[error("Slicing error: {0}")]
    Slicing(String),

    #[error("G-code error: {0}")]
    GCode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),
}

/// Version string emitted in the G-code header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling() {
        // 1mm should scale to 1000 micrometers
        assert_eq!(scale(1.0), 1000);

        // And back
        assert!((unscale(1000) - 1.0).abs() < 1e-10);

        // Sub-millimeter precision
        assert_eq!(scale(0.001), 1); // 1 micron
        assert_eq!(scale(0.2), 200);
        assert_eq!(scale(-0.4), -400);
    }
}
