//! Adhesion structures: skirt and raft.
//!
//! The skirt primes the nozzle with loops around everything printed on
//! the first layer; the raft puts sacrificial base layers under the
//! model. Both are generated from the union of the first layer's
//! outlines (plus wipe tower and first-layer support, when present).

use crate::clipper;
use crate::config::Settings;
use crate::geometry::{ExPolygons, Polygons};
use crate::unscale;

/// Generate skirt loops around the first-layer base region.
///
/// Loop i sits at `skirtDistance + i * extrusionWidth` plus half a
/// width, so the innermost loop keeps the configured clearance. Loops
/// are added past the configured count until the total extruded length
/// reaches `skirtMinLength`.
pub fn generate_skirt(base: &ExPolygons, settings: &Settings) -> Polygons {
    let mut skirt: Polygons = Vec::new();
    if base.is_empty() {
        return skirt;
    }

    let mut total_length_mm = 0.0;
    let min_length_mm = unscale(settings.skirt_min_length);
    let mut count = settings.skirt_loop_count;
    let mut loop_nr = 0;

    while loop_nr < count {
        let distance = settings.skirt_distance
            + settings.extrusion_width * loop_nr as i64
            + settings.extrusion_width / 2;
        let ring = clipper::offset_miter(base, distance);

        let mut loop_length_mm = 0.0;
        for ex in &ring {
            for poly in ex.all_rings() {
                loop_length_mm += unscale(poly.perimeter() as i64);
                skirt.push(poly.clone());
            }
        }
        total_length_mm += loop_length_mm;

        // Top up with extra loops until the nozzle is properly primed
        if loop_nr + 1 >= count && loop_length_mm > 0.0 && total_length_mm < min_length_mm {
            count += 1;
        }
        loop_nr += 1;
    }

    skirt
}

/// The raft outline: the first-layer base region grown by the
/// configured margin.
pub fn generate_raft_outline(base: &ExPolygons, settings: &Settings) -> ExPolygons {
    if !settings.enable_raft || base.is_empty() {
        return Vec::new();
    }
    clipper::offset_miter(base, settings.raft_extra_distance)
}
