//! Indexed mesh: welded vertices and face adjacency.
//!
//! Welding collapses duplicate vertices onto a micrometer grid so that
//! faces sharing an edge reference the same two vertex indices. The
//! per-edge adjacency built here is what lets the slicer chain plane
//! intersection segments into closed polygons without searching.
//!
//! Placement happens after indexing: all volumes of one model are
//! translated together (see the pipeline), so multi-volume prints stay
//! aligned.

use super::{Transform, TriangleMesh};
use crate::geometry::Point3;
use crate::{scale, Error, Result};
use std::collections::HashMap;

/// Sentinel for "no neighboring face on this edge".
pub const NO_INDEX: i32 = -1;

/// A face of an indexed mesh.
#[derive(Clone, Copy, Debug)]
pub struct IndexedFace {
    /// Indices into the welded vertex table.
    pub vertices: [u32; 3],
    /// For each edge `(vertices[i], vertices[i+1])`, the index of the
    /// face sharing that edge, or [`NO_INDEX`] for an open edge.
    pub connected: [i32; 3],
}

/// A welded mesh in integer micrometers.
#[derive(Clone, Debug, Default)]
pub struct IndexedMesh {
    vertices: Vec<Point3>,
    faces: Vec<IndexedFace>,
    min: Point3,
    max: Point3,
}

impl IndexedMesh {
    /// Build an indexed mesh from a raw triangle soup.
    ///
    /// Applies the transform's rotation matrix, quantizes every vertex
    /// to micrometers, collapses duplicates through a position hash,
    /// and records which face continues across each edge. Two faces
    /// share an edge iff their vertex-index pairs match in either
    /// direction.
    pub fn build(mesh: &TriangleMesh, transform: &Transform) -> Result<IndexedMesh> {
        if mesh.is_empty() {
            return Err(Error::Mesh("cannot index an empty mesh".into()));
        }

        let mut vertices: Vec<Point3> = Vec::new();
        let mut vertex_map: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut faces: Vec<IndexedFace> = Vec::with_capacity(mesh.triangle_count());

        for tri_idx in 0..mesh.triangle_count() {
            let mut ids = [0u32; 3];
            for (i, v) in mesh.triangle_vertices(tri_idx).iter().enumerate() {
                let r = transform.apply_matrix(v);
                let p = Point3::new(scale(r.x), scale(r.y), scale(r.z));
                let key = (p.x, p.y, p.z);
                let next_id = vertices.len() as u32;
                ids[i] = *vertex_map.entry(key).or_insert_with(|| {
                    vertices.push(p);
                    next_id
                });
            }

            // Welding can collapse a sliver triangle to a degenerate one
            if ids[0] == ids[1] || ids[1] == ids[2] || ids[2] == ids[0] {
                continue;
            }

            faces.push(IndexedFace {
                vertices: ids,
                connected: [NO_INDEX; 3],
            });
        }

        if faces.is_empty() {
            return Err(Error::Mesh("mesh has no non-degenerate faces".into()));
        }

        // Edge key -> faces carrying that edge (in either direction)
        let mut edge_map: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (face_idx, face) in faces.iter().enumerate() {
            for i in 0..3 {
                let a = face.vertices[i];
                let b = face.vertices[(i + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                edge_map.entry(key).or_default().push(face_idx);
            }
        }

        for face_idx in 0..faces.len() {
            for i in 0..3 {
                let a = faces[face_idx].vertices[i];
                let b = faces[face_idx].vertices[(i + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                if let Some(carriers) = edge_map.get(&key) {
                    // First other face on the edge; lowest index keeps
                    // the choice deterministic on non-manifold meshes.
                    if let Some(&other) = carriers.iter().find(|&&f| f != face_idx) {
                        faces[face_idx].connected[i] = other as i32;
                    }
                }
            }
        }

        let mut result = IndexedMesh {
            vertices,
            faces,
            min: Point3::zero(),
            max: Point3::zero(),
        };
        result.recompute_bounds();
        Ok(result)
    }

    fn recompute_bounds(&mut self) {
        let mut min = Point3::new(i64::MAX, i64::MAX, i64::MAX);
        let mut max = Point3::new(i64::MIN, i64::MIN, i64::MIN);
        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }
        self.min = min;
        self.max = max;
    }

    /// Translate the whole mesh by a delta, in micrometers.
    pub fn translate(&mut self, delta: Point3) {
        for v in &mut self.vertices {
            *v = *v + delta;
        }
        self.min = self.min + delta;
        self.max = self.max + delta;
    }

    /// The welded vertex table.
    #[inline]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// The indexed faces.
    #[inline]
    pub fn faces(&self) -> &[IndexedFace] {
        &self.faces
    }

    /// Number of faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The three vertex positions of a face.
    #[inline]
    pub fn face_vertices(&self, face_idx: usize) -> [Point3; 3] {
        let f = &self.faces[face_idx];
        [
            self.vertices[f.vertices[0] as usize],
            self.vertices[f.vertices[1] as usize],
            self.vertices[f.vertices[2] as usize],
        ]
    }

    /// Minimum corner of the mesh, in micrometers.
    #[inline]
    pub fn min(&self) -> Point3 {
        self.min
    }

    /// Maximum corner of the mesh, in micrometers.
    #[inline]
    pub fn max(&self) -> Point3 {
        self.max
    }

    /// Size of the mesh, in micrometers.
    #[inline]
    pub fn size(&self) -> Point3 {
        self.max - self.min
    }
}

/// Place all volumes of one model on the build plate as a unit: the
/// combined bottom lands at z = -bottom_clip and the combined XY
/// either centers on the transform position or is offset by it.
pub fn place_volumes(volumes: &mut [IndexedMesh], transform: &Transform) {
    if volumes.is_empty() {
        return;
    }

    let mut min = Point3::new(i64::MAX, i64::MAX, i64::MAX);
    let mut max = Point3::new(i64::MIN, i64::MIN, i64::MIN);
    for volume in volumes.iter() {
        min.x = min.x.min(volume.min().x);
        min.y = min.y.min(volume.min().y);
        min.z = min.z.min(volume.min().z);
        max.x = max.x.max(volume.max().x);
        max.y = max.y.max(volume.max().y);
        max.z = max.z.max(volume.max().z);
    }

    let (dx, dy) = if transform.center_in_xy {
        (
            transform.position.x - (min.x + max.x) / 2,
            transform.position.y - (min.y + max.y) / 2,
        )
    } else {
        (transform.position.x, transform.position.y)
    };
    let delta = Point3::new(dx, dy, -min.z - transform.bottom_clip);

    for volume in volumes.iter_mut() {
        volume.translate(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed_cube(size: f64) -> IndexedMesh {
        let mesh = TriangleMesh::cube(size);
        let transform = Transform::default();
        let mut volume = IndexedMesh::build(&mesh, &transform).unwrap();
        place_volumes(std::slice::from_mut(&mut volume), &transform);
        volume
    }

    #[test]
    fn test_welding_collapses_duplicates() {
        // The STL-style cube has 36 raw vertices, 8 unique corners
        let indexed = indexed_cube(10.0);
        assert_eq!(indexed.vertices().len(), 8);
        assert_eq!(indexed.face_count(), 12);
    }

    #[test]
    fn test_watertight_adjacency() {
        let indexed = indexed_cube(10.0);
        for face in indexed.faces() {
            for n in face.connected {
                assert_ne!(n, NO_INDEX, "cube must have no open edges");
            }
        }
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let indexed = indexed_cube(10.0);
        for (face_idx, face) in indexed.faces().iter().enumerate() {
            for n in face.connected {
                let neighbor = &indexed.faces()[n as usize];
                assert!(
                    neighbor.connected.contains(&(face_idx as i32)),
                    "face {} links to {} but not back",
                    face_idx,
                    n
                );
            }
        }
    }

    #[test]
    fn test_placement_bottom_at_zero() {
        let indexed = indexed_cube(10.0);
        assert_eq!(indexed.min().z, 0);
        assert_eq!(indexed.max().z, 10_000);
        assert_eq!(indexed.size().x, 10_000);
    }

    #[test]
    fn test_placement_centered() {
        let indexed = indexed_cube(10.0);
        let center_x = (indexed.min().x + indexed.max().x) / 2;
        assert_eq!(center_x, 102_500);
    }

    #[test]
    fn test_bottom_clip() {
        let mesh = TriangleMesh::cube(10.0);
        let transform = Transform {
            bottom_clip: 2_000,
            ..Transform::default()
        };
        let mut volume = IndexedMesh::build(&mesh, &transform).unwrap();
        place_volumes(std::slice::from_mut(&mut volume), &transform);
        assert_eq!(volume.min().z, -2_000);
        assert_eq!(volume.max().z, 8_000);
    }

    #[test]
    fn test_volumes_placed_together() {
        // Two cubes side by side keep their relative offset
        let a = TriangleMesh::cube(10.0);
        let mut b = TriangleMesh::new();
        for i in 0..a.triangle_count() {
            let [v0, v1, v2] = a.triangle_vertices(i);
            let shift = crate::geometry::Point3F::new(20.0, 0.0, 0.0);
            b.add_facet(v0 + shift, v1 + shift, v2 + shift);
        }

        let transform = Transform::default();
        let mut volumes = vec![
            IndexedMesh::build(&a, &transform).unwrap(),
            IndexedMesh::build(&b, &transform).unwrap(),
        ];
        place_volumes(&mut volumes, &transform);

        // Combined span is 30mm centered at 102.5mm
        assert_eq!(volumes[0].min().x, 102_500 - 15_000);
        assert_eq!(volumes[1].max().x, 102_500 + 15_000);
        // The gap between them is preserved
        assert_eq!(volumes[1].min().x - volumes[0].max().x, 10_000);
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mesh = TriangleMesh::new();
        assert!(IndexedMesh::build(&mesh, &Transform::default()).is_err());
    }
}
