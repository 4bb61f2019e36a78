//! Polygon boolean and offset operations.
//!
//! This module is the only boundary with the external Clipper-style
//! polygon kernel (geo-clipper). Everything crosses it as integer
//! micrometer geometry; conversion to the kernel's floating-point
//! millimeter types happens here and nowhere else.
//!
//! The operations cover what the slicing pipeline needs:
//! - union of raw slice contours into canonical outlines
//! - intersection/difference for skin and support set algebra
//! - inward/outward offsets for insets, clearances and shields

use crate::geometry::{ExPolygon, ExPolygons, Point, Polygon};
use crate::{scale, unscale, Coord};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Precision passed to the kernel: 1000 f64-mm units per integer step,
/// i.e. the kernel works on the same micrometer grid we do.
const CLIPPER_PRECISION: f64 = 1000.0;

/// Join type for offset corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoinType {
    /// Mitered corners (the default for print outlines).
    #[default]
    Miter,
    /// Square corners.
    Square,
    /// Round corners.
    Round,
}

impl From<OffsetJoinType> for JoinType {
    fn from(jt: OffsetJoinType) -> Self {
        match jt {
            OffsetJoinType::Miter => JoinType::Miter(2.0),
            OffsetJoinType::Square => JoinType::Square,
            OffsetJoinType::Round => JoinType::Round(0.25),
        }
    }
}

fn ring_to_linestring(poly: &Polygon) -> LineString<f64> {
    let mut coords: Vec<GeoCoord<f64>> = poly
        .points()
        .iter()
        .map(|p| GeoCoord {
            x: unscale(p.x),
            y: unscale(p.y),
        })
        .collect();

    // The kernel expects explicitly closed rings
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

fn expolygon_to_geo(expoly: &ExPolygon) -> GeoPolygon<f64> {
    GeoPolygon::new(
        ring_to_linestring(&expoly.contour),
        expoly.holes.iter().map(ring_to_linestring).collect(),
    )
}

fn expolygons_to_geo(expolys: &[ExPolygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(expolys.iter().map(expolygon_to_geo).collect())
}

fn linestring_to_ring(ls: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ls
        .coords()
        .map(|c| Point::new(scale(c.x), scale(c.y)))
        .collect();

    // Our rings are implicitly closed
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::from_points(points)
}

fn geo_to_expolygons(multi: &MultiPolygon<f64>) -> ExPolygons {
    multi
        .0
        .iter()
        .map(|gp| {
            let mut ex = ExPolygon::with_holes(
                linestring_to_ring(gp.exterior()),
                gp.interiors().iter().map(linestring_to_ring).collect(),
            );
            ex.make_canonical();
            ex
        })
        .filter(|ex| ex.contour.len() >= 3)
        .collect()
}

/// Union a set of pre-oriented rings (outers CCW, holes CW) into
/// canonical ExPolygons. Overlapping outers merge; nested holes attach
/// to the outer that contains them.
pub fn union_rings(rings: &[Polygon]) -> ExPolygons {
    if rings.is_empty() {
        return Vec::new();
    }

    let subject = MultiPolygon::new(
        rings
            .iter()
            .filter(|r| r.len() >= 3)
            .map(|r| GeoPolygon::new(ring_to_linestring(r), vec![]))
            .collect(),
    );
    let clip: MultiPolygon<f64> = MultiPolygon::new(vec![]);

    let result = subject.union(&clip, CLIPPER_PRECISION);
    geo_to_expolygons(&result)
}

/// Union of two sets of ExPolygons.
pub fn union(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return clip.to_vec();
    }
    if clip.is_empty() {
        return subject.to_vec();
    }

    let result = expolygons_to_geo(subject).union(&expolygons_to_geo(clip), CLIPPER_PRECISION);
    geo_to_expolygons(&result)
}

/// Union of a single, possibly overlapping set of ExPolygons.
pub fn union_ex(polygons: &[ExPolygon]) -> ExPolygons {
    if polygons.len() <= 1 {
        return polygons.to_vec();
    }
    let empty: MultiPolygon<f64> = MultiPolygon::new(vec![]);
    let result = expolygons_to_geo(polygons).union(&empty, CLIPPER_PRECISION);
    geo_to_expolygons(&result)
}

/// Intersection of two sets of ExPolygons.
pub fn intersection(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() || clip.is_empty() {
        return Vec::new();
    }

    let result =
        expolygons_to_geo(subject).intersection(&expolygons_to_geo(clip), CLIPPER_PRECISION);
    geo_to_expolygons(&result)
}

/// Difference of two sets of ExPolygons (subject minus clip).
pub fn difference(subject: &[ExPolygon], clip: &[ExPolygon]) -> ExPolygons {
    if subject.is_empty() {
        return Vec::new();
    }
    if clip.is_empty() {
        return subject.to_vec();
    }

    let result = expolygons_to_geo(subject).difference(&expolygons_to_geo(clip), CLIPPER_PRECISION);
    geo_to_expolygons(&result)
}

/// Offset a set of ExPolygons by `delta` micrometers.
///
/// Positive grows, negative shrinks. Shrinking past the local feature
/// size yields an empty result.
pub fn offset(expolygons: &[ExPolygon], delta: Coord, join_type: OffsetJoinType) -> ExPolygons {
    if expolygons.is_empty() {
        return Vec::new();
    }

    let result = expolygons_to_geo(expolygons).offset(
        unscale(delta),
        join_type.into(),
        EndType::ClosedPolygon,
        CLIPPER_PRECISION,
    );
    geo_to_expolygons(&result)
}

/// Offset with mitered joins, the default for print outlines.
pub fn offset_miter(expolygons: &[ExPolygon], delta: Coord) -> ExPolygons {
    offset(expolygons, delta, OffsetJoinType::Miter)
}

/// Erode then dilate by the same distance, dropping features narrower
/// than `2 * distance` while leaving larger regions unchanged.
pub fn open(expolygons: &[ExPolygon], distance: Coord) -> ExPolygons {
    offset_miter(&offset_miter(expolygons, -distance), distance)
}
