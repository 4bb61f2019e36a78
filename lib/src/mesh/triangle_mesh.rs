//! Triangle mesh data structure.

use crate::geometry::Point3F;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single triangle defined by three vertex indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triangle {
    /// Indices into the vertex array for the three corners.
    pub indices: [u32; 3],
}

impl Triangle {
    /// Create a new triangle from vertex indices.
    #[inline]
    pub const fn new(v0: u32, v1: u32, v2: u32) -> Self {
        Self {
            indices: [v0, v1, v2],
        }
    }
}

impl fmt::Debug for Triangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Triangle({}, {}, {})",
            self.indices[0], self.indices[1], self.indices[2]
        )
    }
}

/// A 3D triangle mesh as loaded from disk: a vertex table in
/// floating-point millimeters plus index triples. Vertices are not
/// deduplicated here; welding happens when the mesh is indexed.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TriangleMesh {
    vertices: Vec<Point3F>,
    indices: Vec<Triangle>,
}

impl TriangleMesh {
    /// Create a new empty mesh.
    #[inline]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Create a mesh with preallocated capacity.
    pub fn with_capacity(vertex_count: usize, triangle_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            indices: Vec::with_capacity(triangle_count),
        }
    }

    /// Get the vertices of the mesh.
    #[inline]
    pub fn vertices(&self) -> &[Point3F] {
        &self.vertices
    }

    /// Get the triangle indices.
    #[inline]
    pub fn indices(&self) -> &[Triangle] {
        &self.indices
    }

    /// Get the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Check if the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Add a vertex and return its index.
    pub fn add_vertex(&mut self, v: Point3F) -> u32 {
        let idx = self.vertices.len() as u32;
        self.vertices.push(v);
        idx
    }

    /// Add a triangle.
    pub fn add_triangle(&mut self, tri: Triangle) {
        self.indices.push(tri);
    }

    /// Add a facet as three fresh vertices (STL style).
    pub fn add_facet(&mut self, v0: Point3F, v1: Point3F, v2: Point3F) {
        let base = self.vertices.len() as u32;
        self.vertices.push(v0);
        self.vertices.push(v1);
        self.vertices.push(v2);
        self.indices.push(Triangle::new(base, base + 1, base + 2));
    }

    /// Get the three vertices of a triangle.
    #[inline]
    pub fn triangle_vertices(&self, tri_idx: usize) -> [Point3F; 3] {
        let tri = &self.indices[tri_idx];
        [
            self.vertices[tri.indices[0] as usize],
            self.vertices[tri.indices[1] as usize],
            self.vertices[tri.indices[2] as usize],
        ]
    }

    /// Compute the min/max corner of the mesh, in millimeters.
    pub fn bounds(&self) -> (Point3F, Point3F) {
        let mut min = Point3F::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3F::new(f64::MIN, f64::MIN, f64::MIN);
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }
        (min, max)
    }

    /// Build an axis-aligned box mesh, used by tests.
    pub fn cube(size: f64) -> Self {
        Self::cuboid(size, size, size)
    }

    /// Build an axis-aligned cuboid spanning (0,0,0)..(x,y,z).
    pub fn cuboid(x: f64, y: f64, z: f64) -> Self {
        let corners = [
            Point3F::new(0.0, 0.0, 0.0),
            Point3F::new(x, 0.0, 0.0),
            Point3F::new(x, y, 0.0),
            Point3F::new(0.0, y, 0.0),
            Point3F::new(0.0, 0.0, z),
            Point3F::new(x, 0.0, z),
            Point3F::new(x, y, z),
            Point3F::new(0.0, y, z),
        ];
        // Two triangles per face, outward-facing winding
        const FACES: [[usize; 3]; 12] = [
            [0, 2, 1],
            [0, 3, 2], // bottom
            [4, 5, 6],
            [4, 6, 7], // top
            [0, 1, 5],
            [0, 5, 4], // front
            [1, 2, 6],
            [1, 6, 5], // right
            [2, 3, 7],
            [2, 7, 6], // back
            [3, 0, 4],
            [3, 4, 7], // left
        ];

        let mut mesh = Self::with_capacity(36, 12);
        for face in FACES {
            mesh.add_facet(corners[face[0]], corners[face[1]], corners[face[2]]);
        }
        mesh
    }
}

impl fmt::Debug for TriangleMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TriangleMesh({} vertices, {} triangles)",
            self.vertices.len(),
            self.indices.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let mesh = TriangleMesh::cube(10.0);
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.vertex_count(), 36);
    }

    #[test]
    fn test_cube_bounds() {
        let mesh = TriangleMesh::cube(10.0);
        let (min, max) = mesh.bounds();
        assert!((min.x).abs() < 1e-9);
        assert!((max.z - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_facet() {
        let mut mesh = TriangleMesh::new();
        mesh.add_facet(
            Point3F::new(0.0, 0.0, 0.0),
            Point3F::new(1.0, 0.0, 0.0),
            Point3F::new(0.0, 1.0, 0.0),
        );
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
    }
}
