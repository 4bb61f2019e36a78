//! Top/bottom skin and sparse-region derivation.
//!
//! A part's innermost inset is split into densely filled skin and
//! sparse interior by comparing it against the innermost insets of the
//! neighboring layers: whatever is not backed through the full
//! top/bottom layer count becomes skin. Layers close enough to the
//! build plate or the model top are solid through.

use crate::clipper;
use crate::config::Settings;
use crate::geometry::ExPolygons;
use crate::slice::VolumeStorage;

/// Compute `skin_outline` and `sparse_outline` for every part of every
/// layer of a volume.
pub fn generate_skins(volume: &mut VolumeStorage, settings: &Settings) {
    let layer_count = volume.layers.len();
    let top_count = settings.top_layer_count as usize;
    let bottom_count = settings.bottom_layer_count as usize;

    // Snapshot of each layer's innermost insets; borrowing them live
    // while mutating parts would not get past the borrow checker, and
    // the skins of one layer must not see the skins of another anyway.
    let innermost: Vec<ExPolygons> = volume
        .layers
        .iter()
        .map(|layer| {
            layer
                .parts
                .iter()
                .filter_map(|p| p.innermost_inset())
                .flat_map(|inset| inset.iter().cloned())
                .collect()
        })
        .collect();

    for layer_idx in 0..layer_count {
        for part_idx in 0..volume.layers[layer_idx].parts.len() {
            let Some(base) = volume.layers[layer_idx].parts[part_idx]
                .innermost_inset()
                .cloned()
            else {
                continue;
            };

            let top = solid_region(&base, &innermost, layer_idx, top_count, layer_count, true);
            let bottom =
                solid_region(&base, &innermost, layer_idx, bottom_count, layer_count, false);

            let skin = clipper::union(&top, &bottom);
            let sparse = clipper::difference(&base, &skin);

            let part = &mut volume.layers[layer_idx].parts[part_idx];
            part.skin_outline = skin;
            part.sparse_outline = sparse;
        }
    }
}

/// The part of `base` that is not backed by all of the `count` layers
/// above (or below). A range running off the model means the whole
/// base is exposed and stays solid.
fn solid_region(
    base: &ExPolygons,
    innermost: &[ExPolygons],
    layer_idx: usize,
    count: usize,
    layer_count: usize,
    upwards: bool,
) -> ExPolygons {
    if count == 0 {
        return Vec::new();
    }

    if upwards {
        if layer_idx + count >= layer_count {
            return base.clone();
        }
    } else if layer_idx < count {
        return base.clone();
    }

    let mut result = base.clone();
    for k in 1..=count {
        let neighbor = if upwards {
            layer_idx + k
        } else {
            layer_idx - k
        };
        result = clipper::difference(&result, &innermost[neighbor]);
        if result.is_empty() {
            break;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{total_area, Point, Polygon};
    use crate::perimeter::generate_insets;
    use crate::slice::{Layer, LayerPart};

    fn square_layer(index: usize, size_mm: f64, settings: &Settings) -> Layer {
        let mut part = LayerPart::new(
            Polygon::rectangle(Point::zero(), Point::new_scale(size_mm, size_mm)).into(),
        );
        generate_insets(&mut part, settings.extrusion_width, settings.perimeter_count);
        Layer {
            index,
            print_z: 300 + index as i64 * 100,
            thickness: if index == 0 { 300 } else { 100 },
            parts: vec![part],
        }
    }

    fn cube_volume(layers: usize, settings: &Settings) -> VolumeStorage {
        VolumeStorage {
            layers: (0..layers)
                .map(|i| square_layer(i, 20.0, settings))
                .collect(),
        }
    }

    #[test]
    fn test_bottom_and_top_layers_are_solid() {
        let settings = Settings {
            top_layer_count: 3,
            bottom_layer_count: 3,
            ..Settings::default()
        };
        let mut volume = cube_volume(20, &settings);
        generate_skins(&mut volume, &settings);

        for idx in [0, 1, 2, 17, 18, 19] {
            let part = &volume.layers[idx].parts[0];
            let base_area = total_area(part.innermost_inset().unwrap());
            let skin_area = total_area(&part.skin_outline);
            assert!(
                (skin_area - base_area).abs() / base_area < 0.01,
                "layer {} should be fully skinned",
                idx
            );
            assert!(total_area(&part.sparse_outline) < base_area * 0.01);
        }
    }

    #[test]
    fn test_interior_layers_are_sparse() {
        let settings = Settings {
            top_layer_count: 3,
            bottom_layer_count: 3,
            ..Settings::default()
        };
        let mut volume = cube_volume(20, &settings);
        generate_skins(&mut volume, &settings);

        for idx in 5..15 {
            let part = &volume.layers[idx].parts[0];
            let base_area = total_area(part.innermost_inset().unwrap());
            assert!(
                total_area(&part.skin_outline) < base_area * 0.01,
                "layer {} should have no skin",
                idx
            );
            let sparse_area = total_area(&part.sparse_outline);
            assert!((sparse_area - base_area).abs() / base_area < 0.01);
        }
    }

    #[test]
    fn test_skin_plus_sparse_covers_innermost() {
        let settings = Settings::default();
        let mut volume = cube_volume(12, &settings);
        generate_skins(&mut volume, &settings);

        for layer in &volume.layers {
            let part = &layer.parts[0];
            let base_area = total_area(part.innermost_inset().unwrap());
            let sum = total_area(&part.skin_outline) + total_area(&part.sparse_outline);
            assert!(
                (sum - base_area).abs() / base_area < 0.02,
                "layer {}: skin+sparse {} vs base {}",
                layer.index,
                sum,
                base_area
            );
        }
    }

    #[test]
    fn test_zero_counts_disable_skin() {
        let settings = Settings {
            top_layer_count: 0,
            bottom_layer_count: 0,
            ..Settings::default()
        };
        let mut volume = cube_volume(8, &settings);
        generate_skins(&mut volume, &settings);

        for layer in &volume.layers {
            assert!(layer.parts[0].skin_outline.is_empty());
            assert!(!layer.parts[0].sparse_outline.is_empty());
        }
    }
}
