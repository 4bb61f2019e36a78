//! Slicing: from an indexed mesh to per-layer parts.
//!
//! [`slicer`] runs the plane sweep and chains intersection segments
//! into closed contours; [`layer`] holds the resulting storage:
//! [`LayerPart`]s grouped into [`Layer`]s, stacked into
//! [`VolumeStorage`], gathered with the auxiliary structures in
//! [`SliceStorage`].

mod layer;
mod slicer;

pub use layer::{Layer, LayerPart, SliceStorage, VolumeStorage};
pub use slicer::{apply_multi_volume_overlap, create_layer_parts, slice_volume, RawLayer};
