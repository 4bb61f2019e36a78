//! Perimeter (inset) generation.
//!
//! Each part gets a stack of concentric inward offsets: inset 0 sits
//! half an extrusion width inside the outline so the extruded bead
//! lands exactly on the outline, and every further inset steps inward
//! by a full extrusion width.

use crate::clipper;
use crate::slice::LayerPart;
use crate::Coord;

/// Generate up to `count` insets for a part.
///
/// Offsets that vanish (the region is too small) end the stack early,
/// so a part may carry fewer insets than requested.
pub fn generate_insets(part: &mut LayerPart, extrusion_width: Coord, count: u32) {
    part.insets.clear();

    for i in 0..count {
        let inset = if i == 0 {
            clipper::offset_miter(&[part.outline.clone()], -extrusion_width / 2)
        } else {
            clipper::offset_miter(&part.insets[i as usize - 1], -extrusion_width)
        };

        if inset.is_empty() {
            break;
        }
        part.insets.push(inset);
    }
}

/// The number of insets to generate on one layer, accounting for the
/// spiralize bottom boost: below the bottom-layer threshold, odd layers
/// get extra walls so the spiral sits on a watertight base.
pub fn inset_count_for_layer(
    base_count: u32,
    layer_index: usize,
    spiralize: bool,
    bottom_layer_count: u32,
) -> u32 {
    if spiralize && (layer_index as u32) < bottom_layer_count && layer_index % 2 == 1 {
        base_count + 5
    } else {
        base_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{total_area, Point, Polygon};
    use crate::slice::LayerPart;

    fn square_part(size_mm: f64) -> LayerPart {
        LayerPart::new(
            Polygon::rectangle(Point::zero(), Point::new_scale(size_mm, size_mm)).into(),
        )
    }

    #[test]
    fn test_insets_are_nested() {
        let mut part = square_part(20.0);
        generate_insets(&mut part, 400, 3);

        assert_eq!(part.insets.len(), 3);
        let mut last_area = part.outline.area();
        for inset in &part.insets {
            let area = total_area(inset);
            assert!(area < last_area, "insets must shrink monotonically");
            last_area = area;
        }
    }

    #[test]
    fn test_small_part_gets_fewer_insets() {
        // 1mm square cannot fit 3 insets of 0.4mm
        let mut part = square_part(1.0);
        generate_insets(&mut part, 400, 3);
        assert!(part.insets.len() < 3);
    }

    #[test]
    fn test_inset0_half_width() {
        let mut part = square_part(10.0);
        generate_insets(&mut part, 400, 1);

        // 10mm square inset by 0.2mm -> 9.6mm square
        let area_mm2 =
            total_area(&part.insets[0]) / (crate::SCALING_FACTOR * crate::SCALING_FACTOR);
        assert!((area_mm2 - 9.6 * 9.6).abs() < 0.1);
    }

    #[test]
    fn test_spiralize_bottom_boost() {
        assert_eq!(inset_count_for_layer(2, 0, true, 3), 2);
        assert_eq!(inset_count_for_layer(2, 1, true, 3), 7);
        assert_eq!(inset_count_for_layer(2, 2, true, 3), 2);
        assert_eq!(inset_count_for_layer(2, 5, true, 3), 2);
        assert_eq!(inset_count_for_layer(2, 1, false, 3), 2);
    }
}
