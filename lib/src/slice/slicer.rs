//! Plane-sweep slicing.
//!
//! Every face that straddles a slicing plane contributes one line
//! segment; segments are chained into closed polygons by walking the
//! face adjacency of the indexed mesh. A vertex exactly on the plane
//! counts as above it, so each face is counted once per plane.

use crate::clipper;
use crate::config::Settings;
use crate::geometry::{Point, Point3, Polygon, Polygons};
use crate::mesh::{IndexedMesh, NO_INDEX};
use crate::slice::{Layer, LayerPart, VolumeStorage};
use crate::{Coord, Error, Result};
use log::{debug, warn};
use std::collections::HashMap;

/// Matching tolerance when chaining segment endpoints, in micrometers.
/// Endpoints on a shared mesh edge agree exactly; the slack covers
/// meshes with near-duplicate vertices that survived welding.
const CHAIN_TOLERANCE: Coord = 10;

/// One slicing plane's raw result: closed contours with outers CCW and
/// holes CW, before the boolean union canonicalizes them.
#[derive(Clone, Debug)]
pub struct RawLayer {
    pub index: usize,
    /// Print height of the top of this layer.
    pub print_z: Coord,
    pub thickness: Coord,
    pub polygons: Polygons,
}

/// A segment produced by intersecting one face with one plane.
#[derive(Clone, Copy, Debug)]
struct SliceSegment {
    start: Point,
    end: Point,
    face_idx: usize,
    added: bool,
}

/// Intersect an edge (p0 strictly on one side, p1 on the other or on
/// the plane) with the plane at height z.
fn interpolate(z: Coord, p0: Point3, p1: Point3) -> Point {
    let dz = (p1.z - p0.z) as i128;
    let t = (z - p0.z) as i128;
    Point::new(
        (p0.x as i128 + (p1.x - p0.x) as i128 * t / dz) as Coord,
        (p0.y as i128 + (p1.y - p0.y) as i128 * t / dz) as Coord,
    )
}

/// Produce the intersection segment of a face with the plane at z, if
/// the face straddles it. The segment direction follows the face
/// winding so that consistently wound meshes chain head-to-tail.
fn slice_face(z: Coord, p: &[Point3; 3]) -> Option<(Point, Point)> {
    let [p0, p1, p2] = *p;

    // One vertex strictly below, the other two at or above (or the
    // mirrored case). z-equal counts as above.
    let (a, b, c) = if p0.z < z && p1.z >= z && p2.z >= z {
        (p0, p2, p1)
    } else if p0.z >= z && p1.z < z && p2.z < z {
        (p0, p1, p2)
    } else if p1.z < z && p0.z >= z && p2.z >= z {
        (p1, p0, p2)
    } else if p1.z >= z && p0.z < z && p2.z < z {
        (p1, p2, p0)
    } else if p2.z < z && p1.z >= z && p0.z >= z {
        (p2, p1, p0)
    } else if p2.z >= z && p1.z < z && p0.z < z {
        (p2, p0, p1)
    } else {
        return None;
    };

    let start = interpolate(z, a, b);
    let end = interpolate(z, a, c);
    if start == end {
        // The plane grazes a vertex
        return None;
    }
    Some((start, end))
}

/// Slice one volume into raw layers.
///
/// Layer i tops out at `first + i * thickness` and is sliced through
/// its middle; the layer count is `floor((H - first) / thickness) + 1`.
/// `model_height` is the height of the whole model, so every volume of
/// a multi-volume print gets the same layer count.
pub fn slice_volume(
    mesh: &IndexedMesh,
    settings: &Settings,
    model_height: Coord,
) -> Result<Vec<RawLayer>> {
    let height = model_height;
    let first = settings.first_layer_thickness;
    let step = settings.layer_thickness;

    if height < first {
        return Err(Error::Slicing(format!(
            "model height {}um is less than the first layer thickness {}um",
            height, first
        )));
    }
    let layer_count = ((height - first) / step + 1) as usize;

    let mut layers: Vec<RawLayer> = Vec::with_capacity(layer_count);
    let mut slice_zs: Vec<Coord> = Vec::with_capacity(layer_count);
    for i in 0..layer_count {
        let print_z = first + i as Coord * step;
        let thickness = if i == 0 { first } else { step };
        slice_zs.push(print_z - thickness / 2);
        layers.push(RawLayer {
            index: i,
            print_z,
            thickness,
            polygons: Vec::new(),
        });
    }

    // Gather intersection segments per layer
    let mut segments: Vec<Vec<SliceSegment>> = vec![Vec::new(); layer_count];
    for face_idx in 0..mesh.face_count() {
        let verts = mesh.face_vertices(face_idx);
        let min_z = verts[0].z.min(verts[1].z).min(verts[2].z);
        let max_z = verts[0].z.max(verts[1].z).max(verts[2].z);

        // Planes with min_z < z <= max_z can intersect this face
        let lo = slice_zs.partition_point(|&z| z <= min_z);
        let hi = slice_zs.partition_point(|&z| z <= max_z);
        for layer_idx in lo..hi {
            if let Some((start, end)) = slice_face(slice_zs[layer_idx], &verts) {
                segments[layer_idx].push(SliceSegment {
                    start,
                    end,
                    face_idx,
                    added: false,
                });
            }
        }
    }

    // Chain segments into polygons, layer by layer
    let mut dropped_chains = 0usize;
    for (layer_idx, layer_segments) in segments.iter_mut().enumerate() {
        let (closed, open) = chain_segments(mesh, layer_segments);
        let mut polygons = closed;

        if !open.is_empty() {
            if settings.repair_outlines {
                polygons.extend(stitch_open_chains(open, settings.extrusion_width));
            } else {
                dropped_chains += open.len();
            }
        }

        normalize_winding(&mut polygons);
        layers[layer_idx].polygons = polygons;
    }

    if dropped_chains > 0 {
        warn!(
            "dropped {} open contours; enable repairOutlines to stitch them",
            dropped_chains
        );
    }

    Ok(layers)
}

/// Chain segments into closed polygons by following face adjacency.
/// Returns (closed polygons, open chains).
fn chain_segments(
    mesh: &IndexedMesh,
    segments: &mut [SliceSegment],
) -> (Polygons, Vec<Vec<Point>>) {
    // Each face cuts the plane in at most one segment
    let mut face_to_segment: HashMap<usize, usize> = HashMap::with_capacity(segments.len());
    for (idx, seg) in segments.iter().enumerate() {
        face_to_segment.insert(seg.face_idx, idx);
    }

    let mut closed: Polygons = Vec::new();
    let mut open: Vec<Vec<Point>> = Vec::new();

    for start_idx in 0..segments.len() {
        if segments[start_idx].added {
            continue;
        }

        let chain_start = segments[start_idx].start;
        let mut points: Vec<Point> = vec![chain_start];
        let mut current = start_idx;
        let mut is_closed = false;

        loop {
            segments[current].added = true;
            let end = segments[current].end;

            if end.coincides_with(&chain_start, CHAIN_TOLERANCE) && points.len() >= 3 {
                is_closed = true;
                break;
            }
            points.push(end);

            // The continuing segment lives on a face touching this one
            let face = &mesh.faces()[segments[current].face_idx];
            let mut next = None;
            for neighbor in face.connected {
                if neighbor == NO_INDEX {
                    continue;
                }
                if let Some(&cand) = face_to_segment.get(&(neighbor as usize)) {
                    if !segments[cand].added
                        && segments[cand].start.coincides_with(&end, CHAIN_TOLERANCE)
                    {
                        next = Some(cand);
                        break;
                    }
                }
            }

            match next {
                Some(idx) => current = idx,
                None => break, // dead end; non-manifold or damaged mesh
            }
        }

        if is_closed {
            closed.push(Polygon::from_points(points));
        } else if points.len() >= 2 {
            open.push(points);
        }
    }

    (closed, open)
}

/// Stitch open chains together by greedily connecting nearest endpoints
/// within the given tolerance. Chains that cannot be closed are dropped.
fn stitch_open_chains(mut chains: Vec<Vec<Point>>, tolerance: Coord) -> Polygons {
    let tol_sq = (tolerance as i128) * (tolerance as i128);
    let mut polygons: Polygons = Vec::new();

    while let Some(mut chain) = chains.pop() {
        loop {
            let head = chain[0];
            let tail = *chain.last().unwrap();

            // Close the loop when the ends meet; the closing point is
            // implicit in a polygon
            if chain.len() >= 3 && tail.distance_squared(&head) <= tol_sq {
                if chain.len() > 3 && tail == head {
                    chain.pop();
                }
                polygons.push(Polygon::from_points(chain));
                break;
            }

            // Find the chain whose endpoint is nearest to our tail
            let mut best: Option<(usize, bool, i128)> = None;
            for (j, other) in chains.iter().enumerate() {
                let d_start = tail.distance_squared(&other[0]);
                let d_end = tail.distance_squared(other.last().unwrap());
                let (reversed, d) = if d_start <= d_end {
                    (false, d_start)
                } else {
                    (true, d_end)
                };
                if best.map(|(_, _, bd)| d < bd).unwrap_or(true) {
                    best = Some((j, reversed, d));
                }
            }

            match best {
                Some((j, reversed, d)) if d <= tol_sq => {
                    let mut other = chains.remove(j);
                    if reversed {
                        other.reverse();
                    }
                    chain.extend(other.into_iter().skip(1));
                }
                _ => {
                    debug!("dropping unclosable chain of {} points", chain.len());
                    break;
                }
            }
        }
    }

    polygons
}

/// Orient contours by containment depth: even depth (outers) CCW, odd
/// depth (holes) CW. This makes the result independent of the winding
/// of the input mesh faces.
fn normalize_winding(polygons: &mut Polygons) {
    polygons.retain(|p| p.len() >= 3 && p.signed_area().abs() > 0.0);

    let probes: Vec<Point> = polygons.iter().map(|p| p[0]).collect();
    let mut depth = vec![0usize; polygons.len()];
    for (i, probe) in probes.iter().enumerate() {
        for (j, other) in polygons.iter().enumerate() {
            if i != j && other.contains_point(probe) {
                depth[i] += 1;
            }
        }
    }

    for (i, poly) in polygons.iter_mut().enumerate() {
        if depth[i] % 2 == 0 {
            poly.make_counter_clockwise();
        } else {
            poly.make_clockwise();
        }
    }
}

/// Union each raw layer into canonical parts with holes, and give every
/// part its comb boundary (the outline inset by one extrusion width).
///
/// With `repairOverlaps` off, overlapping contours are kept as separate
/// parts (holes assigned by containment only) instead of being unioned.
pub fn create_layer_parts(raw_layers: Vec<RawLayer>, settings: &Settings) -> VolumeStorage {
    let mut layers = Vec::with_capacity(raw_layers.len());

    for raw in raw_layers {
        let expolygons = if settings.repair_overlaps {
            clipper::union_rings(&raw.polygons)
        } else {
            assemble_expolygons(&raw.polygons)
        };

        let mut parts: Vec<LayerPart> = Vec::with_capacity(expolygons.len());
        for outline in expolygons {
            let mut part = LayerPart::new(outline);
            part.comb_boundary =
                clipper::offset_miter(&[part.outline.clone()], -settings.extrusion_width);
            parts.push(part);
        }

        if parts.is_empty() {
            debug!("layer {} has no printable area", raw.index);
        }

        layers.push(Layer {
            index: raw.index,
            print_z: raw.print_z,
            thickness: raw.thickness,
            parts,
        });
    }

    VolumeStorage { layers }
}

/// Group oriented rings into ExPolygons by containment alone, without
/// merging overlaps: every CCW ring becomes an outer, every CW ring
/// attaches to the smallest outer containing it.
fn assemble_expolygons(rings: &Polygons) -> crate::geometry::ExPolygons {
    let mut outers: Vec<Polygon> = Vec::new();
    let mut holes: Vec<Polygon> = Vec::new();
    for ring in rings {
        if ring.len() < 3 {
            continue;
        }
        if ring.is_counter_clockwise() {
            outers.push(ring.clone());
        } else {
            holes.push(ring.clone());
        }
    }

    // Smallest containing outer wins, so nested structures resolve
    // correctly; sort is stable, ties stay in slicing order
    outers.sort_by(|a, b| a.area().total_cmp(&b.area()));

    let mut expolygons: Vec<crate::geometry::ExPolygon> = outers
        .into_iter()
        .map(crate::geometry::ExPolygon::new)
        .collect();

    for hole in holes {
        let probe = hole[0];
        if let Some(owner) = expolygons
            .iter_mut()
            .find(|ex| ex.contour.contains_point(&probe))
        {
            owner.add_hole(hole);
        }
        // An orphaned hole has no outer to cut into and is dropped
    }

    expolygons
}

/// Carve multiple volumes so that they overlap at their interfaces by
/// the configured amount without growing beyond the combined outline.
pub fn apply_multi_volume_overlap(volumes: &mut [Vec<RawLayer>], overlap: Coord) {
    if volumes.len() < 2 || overlap <= 0 {
        return;
    }

    let layer_count = volumes.iter().map(|v| v.len()).max().unwrap_or(0);
    for layer_idx in 0..layer_count {
        let mut all_rings: Polygons = Vec::new();
        for volume in volumes.iter() {
            if let Some(layer) = volume.get(layer_idx) {
                all_rings.extend(layer.polygons.iter().cloned());
            }
        }
        let combined = clipper::union_rings(&all_rings);

        for volume in volumes.iter_mut() {
            let Some(layer) = volume.get_mut(layer_idx) else {
                continue;
            };
            let own = clipper::union_rings(&layer.polygons);
            let grown = clipper::offset_miter(&own, overlap / 2);
            let carved = clipper::intersection(&grown, &combined);

            layer.polygons = carved
                .iter()
                .flat_map(|ex| ex.all_rings().cloned())
                .collect();
        }
    }
}
