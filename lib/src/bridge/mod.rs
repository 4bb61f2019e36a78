//! Bridge direction analysis.
//!
//! A skin region that rests on separate islands of the layer below is
//! a bridge: it must be extruded along the span between its supports
//! so the filament can anchor on both sides. The direction is taken
//! from the centers of mass of the two largest islands the region
//! rests on.

use crate::clipper;
use crate::geometry::{ExPolygon, ExPolygons};
use crate::slice::{Layer, VolumeStorage};

/// Compute the bridge direction of a region against the layer below,
/// in integer degrees. Returns `None` when the region is not a bridge:
/// resting on fewer than two islands, or on so many that no single
/// span direction exists.
pub fn bridge_angle(region: &ExPolygons, prev_layer: &Layer) -> Option<i32> {
    if region.is_empty() {
        return None;
    }

    let region_box = region
        .iter()
        .fold(crate::geometry::BoundingBox::new(), |mut bb, ex| {
            bb.merge(&ex.bounding_box());
            bb
        });

    // The islands this region rests on
    let mut islands: ExPolygons = Vec::new();
    for part in &prev_layer.parts {
        if !region_box.hit(&part.boundary_box) {
            continue;
        }
        islands.extend(clipper::intersection(region, &[part.outline.clone()]));
    }

    if islands.len() < 2 || islands.len() > 5 {
        return None;
    }

    // Span between the two largest islands
    let (first, second) = two_largest(&islands);
    let c1 = first.contour.centroid();
    let c2 = second.contour.centroid();

    let mut angle = ((c2.x - c1.x) as f64)
        .atan2((c2.y - c1.y) as f64)
        .to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    Some(angle.round() as i32)
}

fn two_largest(islands: &ExPolygons) -> (&ExPolygon, &ExPolygon) {
    let mut idx1 = 0;
    let mut idx2 = 1;
    if islands[idx2].area() > islands[idx1].area() {
        std::mem::swap(&mut idx1, &mut idx2);
    }
    for (i, island) in islands.iter().enumerate().skip(2) {
        if island.area() > islands[idx1].area() {
            idx2 = idx1;
            idx1 = i;
        } else if island.area() > islands[idx2].area() {
            idx2 = i;
        }
    }
    (&islands[idx1], &islands[idx2])
}

/// Assign bridge angles to every part of every layer above the first.
/// Runs after skin generation; only parts with skin can bridge.
pub fn assign_bridge_angles(volume: &mut VolumeStorage) {
    for layer_idx in 1..volume.layers.len() {
        let (below, rest) = volume.layers.split_at_mut(layer_idx);
        let prev_layer = &below[layer_idx - 1];

        for part in &mut rest[0].parts {
            if part.skin_outline.is_empty() {
                continue;
            }
            part.bridge_angle = bridge_angle(&part.skin_outline, prev_layer);
        }
    }
}
