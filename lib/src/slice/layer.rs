//! Layer data structures.
//!
//! A [`LayerPart`] is one simply-connected region on one layer: the
//! outer outline with its holes, plus everything derived from it as the
//! pipeline progresses (insets, skin, sparse regions, comb boundary,
//! bridge direction).

use crate::geometry::{BoundingBox, ExPolygon, ExPolygons, Point, Point3, Polygon, Polygons};
use crate::support::SupportGrid;
use crate::Coord;

/// One simply-connected region of a layer.
#[derive(Clone, Debug, Default)]
pub struct LayerPart {
    /// Outer outline plus holes; outer CCW, holes CW.
    pub outline: ExPolygon,
    /// Cached bounding box of the outline.
    pub boundary_box: BoundingBox,
    /// Concentric inward offsets; index 0 is the outermost wall.
    /// Each inset level may split into several regions.
    pub insets: Vec<ExPolygons>,
    /// Solid (densely filled) top/bottom regions.
    pub skin_outline: ExPolygons,
    /// Sparse interior regions between the skins.
    pub sparse_outline: ExPolygons,
    /// Boundary used to route travel moves without crossing walls.
    pub comb_boundary: ExPolygons,
    /// Direction to extrude the skin when it spans unsupported space,
    /// in integer degrees.
    pub bridge_angle: Option<i32>,
}

impl LayerPart {
    /// Create a part from its outline.
    pub fn new(outline: ExPolygon) -> Self {
        let boundary_box = outline.bounding_box();
        Self {
            outline,
            boundary_box,
            ..Default::default()
        }
    }

    /// The innermost inset region, if any inset survived.
    pub fn innermost_inset(&self) -> Option<&ExPolygons> {
        self.insets.last()
    }
}

/// One horizontal slice of one volume.
#[derive(Clone, Debug, Default)]
pub struct Layer {
    /// Layer index, 0 at the build plate.
    pub index: usize,
    /// Print height of the top of this layer, in micrometers.
    pub print_z: Coord,
    /// Thickness of this layer, in micrometers.
    pub thickness: Coord,
    /// The parts of this layer.
    pub parts: Vec<LayerPart>,
}

impl Layer {
    /// All part outlines of this layer.
    pub fn outlines(&self) -> ExPolygons {
        self.parts.iter().map(|p| p.outline.clone()).collect()
    }

    /// Check if the layer has no printable geometry.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Bottom-up layers of one input volume. The volume index doubles as
/// the extruder index.
#[derive(Clone, Debug, Default)]
pub struct VolumeStorage {
    pub layers: Vec<Layer>,
}

/// Everything derived from one input file, alive until its G-code has
/// been written.
#[derive(Debug, Default)]
pub struct SliceStorage {
    /// Sliced volumes, one per input mesh.
    pub volumes: Vec<VolumeStorage>,
    /// Support grid, immutable once generated.
    pub support: Option<SupportGrid>,
    /// Skirt loops around the first layer.
    pub skirt: Polygons,
    /// Raft outline under the model.
    pub raft_outline: ExPolygons,
    /// Wipe tower outline, when multi-material purging is enabled.
    pub wipe_tower: Option<Polygon>,
    /// Where to park the nozzle after wiping.
    pub wipe_point: Point,
    /// Per-layer wipe shield outlines.
    pub wipe_shield: Vec<ExPolygons>,
    /// Minimum corner of the placed model, in micrometers.
    pub model_min: Point3,
    /// Maximum corner of the placed model, in micrometers.
    pub model_max: Point3,
}

impl SliceStorage {
    /// Number of layers; identical across volumes of one model.
    pub fn layer_count(&self) -> usize {
        self.volumes.iter().map(|v| v.layers.len()).max().unwrap_or(0)
    }

    /// All part outlines on one layer across all volumes.
    pub fn layer_outlines(&self, layer_idx: usize) -> ExPolygons {
        let mut result = Vec::new();
        for volume in &self.volumes {
            if let Some(layer) = volume.layers.get(layer_idx) {
                result.extend(layer.outlines());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn square_part(size: Coord) -> LayerPart {
        LayerPart::new(
            Polygon::rectangle(Point::new(0, 0), Point::new(size, size)).into(),
        )
    }

    #[test]
    fn test_part_bounding_box() {
        let part = square_part(1_000);
        assert_eq!(part.boundary_box.min, Point::new(0, 0));
        assert_eq!(part.boundary_box.max, Point::new(1_000, 1_000));
    }

    #[test]
    fn test_layer_outlines() {
        let layer = Layer {
            index: 0,
            print_z: 300,
            thickness: 300,
            parts: vec![square_part(1_000), square_part(2_000)],
        };
        assert_eq!(layer.outlines().len(), 2);
        assert!(!layer.is_empty());
    }

    #[test]
    fn test_storage_layer_count() {
        let mut storage = SliceStorage::default();
        storage.volumes.push(VolumeStorage {
            layers: vec![Layer::default(), Layer::default()],
        });
        storage.volumes.push(VolumeStorage {
            layers: vec![Layer::default(), Layer::default()],
        });
        assert_eq!(storage.layer_count(), 2);
    }
}
