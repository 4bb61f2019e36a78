//! Shared helpers for the pipeline integration tests: mesh builders
//! and a binary STL writer.

use fff_slicer::geometry::Point3F;
use fff_slicer::mesh::TriangleMesh;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Write a mesh as binary STL.
pub fn write_binary_stl(path: &Path, mesh: &TriangleMesh) {
    let mut file = File::create(path).unwrap();
    file.write_all(&[0u8; 80]).unwrap();
    file.write_all(&(mesh.triangle_count() as u32).to_le_bytes())
        .unwrap();

    for i in 0..mesh.triangle_count() {
        let [v0, v1, v2] = mesh.triangle_vertices(i);
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let n = e1.cross(&e2).normalize();

        for p in [n, v0, v1, v2] {
            file.write_all(&(p.x as f32).to_le_bytes()).unwrap();
            file.write_all(&(p.y as f32).to_le_bytes()).unwrap();
            file.write_all(&(p.z as f32).to_le_bytes()).unwrap();
        }
        file.write_all(&[0u8, 0u8]).unwrap();
    }
}

/// The same mesh with every facet's winding flipped.
pub fn flip_winding(mesh: &TriangleMesh) -> TriangleMesh {
    let mut flipped = TriangleMesh::new();
    for i in 0..mesh.triangle_count() {
        let [v0, v1, v2] = mesh.triangle_vertices(i);
        flipped.add_facet(v0, v2, v1);
    }
    flipped
}

/// A square tube: outer footprint `outer` mm, square hole `inner` mm
/// centered in it, running top to bottom, `height` mm tall. All face
/// normals point out of the solid.
pub fn square_tube(outer: f64, inner: f64, height: f64) -> TriangleMesh {
    let margin = (outer - inner) / 2.0;
    let (i0, i1) = (margin, outer - margin);

    // Bottom and top rings, both counter-clockwise seen from above
    let ob = [
        Point3F::new(0.0, 0.0, 0.0),
        Point3F::new(outer, 0.0, 0.0),
        Point3F::new(outer, outer, 0.0),
        Point3F::new(0.0, outer, 0.0),
    ];
    let ot: Vec<Point3F> = ob
        .iter()
        .map(|p| Point3F::new(p.x, p.y, height))
        .collect();
    let ib = [
        Point3F::new(i0, i0, 0.0),
        Point3F::new(i1, i0, 0.0),
        Point3F::new(i1, i1, 0.0),
        Point3F::new(i0, i1, 0.0),
    ];
    let it: Vec<Point3F> = ib
        .iter()
        .map(|p| Point3F::new(p.x, p.y, height))
        .collect();

    let mut mesh = TriangleMesh::new();
    for k in 0..4 {
        let k1 = (k + 1) % 4;

        // Outer wall, facing away from the tube
        mesh.add_facet(ob[k], ob[k1], ot[k1]);
        mesh.add_facet(ob[k], ot[k1], ot[k]);

        // Inner wall, facing into the hole
        mesh.add_facet(ib[k], it[k1], ib[k1]);
        mesh.add_facet(ib[k], it[k], it[k1]);

        // Bottom annulus, facing down
        mesh.add_facet(ob[k], ib[k], ib[k1]);
        mesh.add_facet(ob[k], ib[k1], ob[k1]);

        // Top annulus, facing up
        mesh.add_facet(ot[k], it[k1], it[k]);
        mesh.add_facet(ot[k], ot[k1], it[k1]);
    }
    mesh
}
