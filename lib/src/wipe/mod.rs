//! Wipe structures for multi-extruder prints.
//!
//! The wipe tower is a fixed square printed once per layer whenever the
//! extruder changed, giving the incoming nozzle somewhere to purge and
//! stabilize. The wipe shield is a thin wall around the whole model
//! that catches ooze from the idle nozzle.

use crate::clipper;
use crate::config::Settings;
use crate::geometry::{ExPolygons, Point, Polygon};
use crate::slice::SliceStorage;
use crate::{scale, Coord};

/// Place the wipe tower square and wipe point next to the model's
/// min-X / max-Y corner. A tower size of one micrometer or less means
/// disabled.
pub fn generate_wipe_tower(storage: &mut SliceStorage, settings: &Settings) {
    if !settings.wipe_tower_enabled() {
        return;
    }

    let size = settings.wipe_tower_size;
    let corner = Point::new(storage.model_min.x - 3000, storage.model_max.y + 3000);

    storage.wipe_tower = Some(Polygon::from_points(vec![
        corner,
        Point::new(corner.x, corner.y + size),
        Point::new(corner.x - size, corner.y + size),
        Point::new(corner.x - size, corner.y),
    ]));
    storage.wipe_point = Point::new(corner.x - size / 2, corner.y + size / 2);
}

/// Generate the per-layer wipe shield.
///
/// Each layer's shield is the layer outline grown by the configured
/// distance, stabilized by a 1mm erode/dilate so small gaps between
/// parts close. The shield is then propagated both up and down the
/// stack by unioning each layer with its neighbor eroded by
/// `tan(60 deg) * layerThickness`, so the wall never overhangs more
/// than 60 degrees from either end.
pub fn generate_wipe_shield(storage: &mut SliceStorage, settings: &Settings) {
    if settings.wipe_shield_distance <= 0 {
        return;
    }

    let layer_count = storage.layer_count();
    let mut shield: Vec<ExPolygons> = Vec::with_capacity(layer_count);
    for layer_idx in 0..layer_count {
        let outlines = storage.layer_outlines(layer_idx);
        let grown = clipper::offset_miter(&outlines, settings.wipe_shield_distance);
        shield.push(clipper::open(&grown, scale(1.0)));
    }

    // 60 degree draft angle per layer step
    let draft: Coord = ((60f64).to_radians().tan() * settings.layer_thickness as f64) as Coord;

    for layer_idx in 1..layer_count {
        let below = clipper::offset_miter(&shield[layer_idx - 1], -draft);
        shield[layer_idx] = clipper::union(&shield[layer_idx], &below);
    }
    for layer_idx in (0..layer_count.saturating_sub(1)).rev() {
        let above = clipper::offset_miter(&shield[layer_idx + 1], -draft);
        shield[layer_idx] = clipper::union(&shield[layer_idx], &above);
    }

    storage.wipe_shield = shield;
}
