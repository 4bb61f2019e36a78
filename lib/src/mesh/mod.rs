//! Mesh loading and indexing.
//!
//! This module provides the path from an STL file to sliceable
//! geometry:
//! - [`TriangleMesh`] - raw triangle soup as loaded from disk
//! - [`Transform`] - rotation, placement and bottom clipping
//! - [`IndexedMesh`] - welded micrometer vertices with face adjacency,
//!   the structure the slicer walks

mod indexed;
mod stl;
mod transform;
mod triangle_mesh;

pub use indexed::{place_volumes, IndexedFace, IndexedMesh, NO_INDEX};
pub use stl::load_stl;
pub use transform::Transform;
pub use triangle_mesh::{Triangle, TriangleMesh};
