//! Infill pattern generation.
//!
//! Fill lines are produced by rotating the region into scanline frame,
//! collecting the crossings of every region edge with vertical
//! scanlines spaced at the line distance, pairing the sorted crossings
//! and rotating the resulting segments back. Scanline positions are
//! anchored at multiples of the spacing so lines of consecutive layers
//! land on top of each other.

use crate::clipper;
use crate::config::InfillType;
use crate::geometry::{ExPolygons, Point, Polyline};
use crate::{Coord, CoordF};

/// Generate fill lines for a region using the given pattern.
///
/// `spacing` is the line distance, `angle_degrees` the line direction,
/// and `extend` grows the region outward first so line ends reach into
/// the surrounding perimeter.
pub fn generate_infill(
    pattern: InfillType,
    region: &ExPolygons,
    spacing: Coord,
    angle_degrees: i32,
    extend: Coord,
) -> Vec<Polyline> {
    match pattern {
        InfillType::Lines => generate_line_infill(region, spacing, angle_degrees, extend),
        InfillType::Grid => generate_grid_infill(region, spacing, angle_degrees, extend),
    }
}

/// Parallel lines at `angle_degrees`, clipped to the region.
pub fn generate_line_infill(
    region: &ExPolygons,
    spacing: Coord,
    angle_degrees: i32,
    extend: Coord,
) -> Vec<Polyline> {
    if region.is_empty() || spacing <= 0 {
        return Vec::new();
    }

    let grown = if extend != 0 {
        clipper::offset_miter(region, extend)
    } else {
        region.to_vec()
    };

    let angle = (angle_degrees as CoordF).to_radians();
    let (sin_a, cos_a) = angle.sin_cos();

    // Rotate the region so the fill direction becomes vertical
    let rotated: Vec<Vec<Point>> = grown
        .iter()
        .flat_map(|ex| ex.all_rings())
        .map(|ring| {
            ring.points()
                .iter()
                .map(|p| p.rotate_by_cos_sin(cos_a, -sin_a))
                .collect()
        })
        .collect();

    let mut min_x = Coord::MAX;
    let mut max_x = Coord::MIN;
    for ring in &rotated {
        for p in ring {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
        }
    }
    if min_x > max_x {
        return Vec::new();
    }

    // Scanlines at global multiples of the spacing
    let first_line = min_x.div_euclid(spacing);
    let last_line = max_x.div_euclid(spacing);
    let line_count = (last_line - first_line + 1) as usize;
    let mut cut_lists: Vec<Vec<Coord>> = vec![Vec::new(); line_count];

    for ring in &rotated {
        if ring.len() < 3 {
            continue;
        }
        for i in 0..ring.len() {
            let p0 = ring[i];
            let p1 = ring[(i + 1) % ring.len()];
            if p0.x == p1.x {
                continue;
            }

            let (lo, hi) = if p0.x < p1.x { (p0.x, p1.x) } else { (p1.x, p0.x) };
            // Strictly interior crossings only: a vertex exactly on a
            // scanline contributes no cut from its edges
            let k_start = lo.div_euclid(spacing) + 1;
            let k_end = hi.div_euclid(spacing);
            for k in k_start..=k_end {
                let x = k * spacing;
                if x >= hi || x <= lo {
                    continue;
                }
                let y = p0.y as i128
                    + (p1.y - p0.y) as i128 * (x - p0.x) as i128 / (p1.x - p0.x) as i128;
                cut_lists[(k - first_line) as usize].push(y as Coord);
            }
        }
    }

    let mut result = Vec::new();
    for (idx, cuts) in cut_lists.iter_mut().enumerate() {
        cuts.sort_unstable();
        let x = (first_line + idx as Coord) * spacing;

        for pair in cuts.chunks_exact(2) {
            let (y0, y1) = (pair[0], pair[1]);
            if y1 <= y0 {
                continue;
            }
            let a = Point::new(x, y0).rotate_by_cos_sin(cos_a, sin_a);
            let b = Point::new(x, y1).rotate_by_cos_sin(cos_a, sin_a);
            result.push(Polyline::from_points(vec![a, b]));
        }
    }

    result
}

/// Lines in both directions at doubled spacing, forming a grid of the
/// same material density as plain lines.
pub fn generate_grid_infill(
    region: &ExPolygons,
    spacing: Coord,
    angle_degrees: i32,
    extend: Coord,
) -> Vec<Polyline> {
    let mut result = generate_line_infill(region, spacing * 2, angle_degrees, extend);
    result.extend(generate_line_infill(
        region,
        spacing * 2,
        angle_degrees + 90,
        extend,
    ));
    result
}
