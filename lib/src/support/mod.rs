//! Support structure generation.
//!
//! The mesh is rasterized once into an XY grid; every grid column
//! records, sorted by height, where model surfaces cross it and how
//! flat they are. The grid is immutable after generation: per-layer
//! support polygons are derived from it on demand by collecting the
//! columns that need support at that height and unioning their cells.

use crate::clipper;
use crate::config::Settings;
use crate::geometry::{ExPolygons, Point, Polygon, Polygons};
use crate::mesh::IndexedMesh;
use crate::Coord;

/// XY resolution of the support grid.
const GRID_SCALE: Coord = 200;

/// One surface crossing of a grid column.
#[derive(Clone, Copy, Debug)]
struct SupportPoint {
    /// Height of the surface at this column.
    z: Coord,
    /// Cosine of the angle between the surface normal and vertical:
    /// 1.0 for a horizontal face, 0.0 for a wall.
    cos_angle: f64,
}

/// The support voxel grid, generated once per model.
#[derive(Debug, Default)]
pub struct SupportGrid {
    offset: Point,
    width: usize,
    height: usize,
    columns: Vec<Vec<SupportPoint>>,
    cos_threshold: f64,
    everywhere: bool,
    z_distance: Coord,
}

impl SupportGrid {
    /// Rasterize all volumes of a model into one support grid.
    pub fn generate(meshes: &[IndexedMesh], settings: &Settings) -> SupportGrid {
        let mut min = Point::new(i64::MAX, i64::MAX);
        let mut max = Point::new(i64::MIN, i64::MIN);
        for mesh in meshes {
            min.x = min.x.min(mesh.min().x);
            min.y = min.y.min(mesh.min().y);
            max.x = max.x.max(mesh.max().x);
            max.y = max.y.max(mesh.max().y);
        }
        if min.x > max.x {
            return SupportGrid::default();
        }

        let width = ((max.x - min.x) / GRID_SCALE) as usize + 1;
        let height = ((max.y - min.y) / GRID_SCALE) as usize + 1;

        let mut grid = SupportGrid {
            offset: min,
            width,
            height,
            columns: vec![Vec::new(); width * height],
            // Faces flatter than the overhang threshold need support
            cos_threshold: ((90 - settings.support_angle_degrees) as f64)
                .to_radians()
                .cos()
                - 0.01,
            everywhere: settings.support_everywhere,
            z_distance: settings.support_z_distance,
        };

        for mesh in meshes {
            for face_idx in 0..mesh.face_count() {
                grid.rasterize_face(&mesh.face_vertices(face_idx));
            }
        }

        for column in &mut grid.columns {
            column.sort_by(|a, b| a.z.cmp(&b.z));
        }

        grid
    }

    fn rasterize_face(&mut self, verts: &[crate::geometry::Point3; 3]) {
        let (nx, ny, nz) = (verts[1] - verts[0]).cross_f(&(verts[2] - verts[0]));
        let normal_len = (nx * nx + ny * ny + nz * nz).sqrt();
        if normal_len < 1.0 {
            return;
        }
        let cos_angle = (nz / normal_len).abs();

        let (ax, ay) = (verts[0].x as f64, verts[0].y as f64);
        let (bx, by) = (verts[1].x as f64, verts[1].y as f64);
        let (cx, cy) = (verts[2].x as f64, verts[2].y as f64);
        let det = (bx - ax) * (cy - ay) - (cx - ax) * (by - ay);
        if det.abs() < 1.0 {
            // Vertical face: covers no cell centers
            return;
        }

        let min_x = verts.iter().map(|v| v.x).min().unwrap();
        let max_x = verts.iter().map(|v| v.x).max().unwrap();
        let min_y = verts.iter().map(|v| v.y).min().unwrap();
        let max_y = verts.iter().map(|v| v.y).max().unwrap();

        let gx0 = ((min_x - self.offset.x) / GRID_SCALE).max(0);
        let gx1 = ((max_x - self.offset.x) / GRID_SCALE + 1).min(self.width as Coord - 1);
        let gy0 = ((min_y - self.offset.y) / GRID_SCALE).max(0);
        let gy1 = ((max_y - self.offset.y) / GRID_SCALE + 1).min(self.height as Coord - 1);

        for gy in gy0..=gy1 {
            for gx in gx0..=gx1 {
                let px = (self.offset.x + gx * GRID_SCALE) as f64;
                let py = (self.offset.y + gy * GRID_SCALE) as f64;

                // Barycentric containment
                let u = ((px - ax) * (cy - ay) - (cx - ax) * (py - ay)) / det;
                let v = ((bx - ax) * (py - ay) - (px - ax) * (by - ay)) / det;
                if u < 0.0 || v < 0.0 || u + v > 1.0 {
                    continue;
                }

                let z = verts[0].z as f64
                    + u * (verts[1].z - verts[0].z) as f64
                    + v * (verts[2].z - verts[0].z) as f64;

                self.columns[gy as usize * self.width + gx as usize].push(SupportPoint {
                    z: z.round() as Coord,
                    cos_angle,
                });
            }
        }
    }

    /// Does the column at grid position (gx, gy) need support at z?
    fn needs_support_at(&self, gx: usize, gy: usize, z: Coord) -> bool {
        let column = &self.columns[gy * self.width + gx];
        if column.is_empty() {
            return false;
        }

        // First surface above the layer, keeping the configured air gap
        let probe_z = z + self.z_distance;
        let idx = column.partition_point(|p| p.z < probe_z);
        if idx >= column.len() {
            return false;
        }
        if !self.everywhere && idx > 0 {
            // The model itself carries this column
            return false;
        }
        column[idx].cos_angle >= self.cos_threshold
    }

    /// Raw support region at height z: the union of all grid cells
    /// whose column needs support there.
    pub fn polygons_at(&self, z: Coord) -> ExPolygons {
        let half = GRID_SCALE / 2;
        let mut cells: Polygons = Vec::new();

        for gy in 0..self.height {
            for gx in 0..self.width {
                if !self.needs_support_at(gx, gy, z) {
                    continue;
                }
                let cx = self.offset.x + gx as Coord * GRID_SCALE;
                let cy = self.offset.y + gy as Coord * GRID_SCALE;
                cells.push(Polygon::rectangle(
                    Point::new(cx - half, cy - half),
                    Point::new(cx + half, cy + half),
                ));
            }
        }

        clipper::union_rings(&cells)
    }
}

/// Support polygons for one layer: the raw grid region, cleared of the
/// model by the XY distance, with slivers dropped by a 3-width
/// erode/dilate. Each resulting ExPolygon is one island.
pub fn layer_support_polygons(
    grid: &SupportGrid,
    z: Coord,
    model_outlines: &ExPolygons,
    settings: &Settings,
) -> ExPolygons {
    let raw = grid.polygons_at(z);
    if raw.is_empty() {
        return raw;
    }

    let clearance = clipper::offset_miter(model_outlines, settings.support_xy_distance);
    let cleared = clipper::difference(&raw, &clearance);
    clipper::open(&cleared, 3 * settings.extrusion_width)
}
