//! Combed travel routing.
//!
//! When a travel move would cross the comb boundary of the current
//! part, the move is rerouted along the boundary instead of retracting:
//! entry and exit crossings are found for every ring the straight line
//! passes through, the shorter way around each ring is taken, and the
//! result is simplified back to the fewest waypoints that still avoid
//! crossing.
//!
//! The boundary rings keep the canonical winding (outer CCW, holes
//! CW), so the travel region is always to the left of a ring edge and
//! waypoints are nudged leftward to stay clear of the wall.

use crate::geometry::{ExPolygons, Line, Point, Polygon};
use crate::{Coord, CoordF};

/// How far waypoints are pushed off the boundary, in micrometers.
const WAYPOINT_OFFSET: Coord = 50;

/// Give up on combing when the detour grows beyond this factor of the
/// direct distance; a retracted straight travel is cheaper then.
const MAX_DETOUR_FACTOR: CoordF = 3.0;

/// Travel router over one comb boundary.
#[derive(Clone, Debug, Default)]
pub struct Comb {
    rings: Vec<Polygon>,
}

/// Entry/exit crossing of the direct line with one ring.
#[derive(Clone, Copy, Debug)]
struct RingCrossing {
    ring_idx: usize,
    t_enter: CoordF,
    edge_enter: usize,
    point_enter: Point,
    edge_exit: usize,
    point_exit: Point,
}

impl Comb {
    /// Build a comb over a boundary region.
    pub fn new(boundary: &ExPolygons) -> Self {
        let rings = boundary
            .iter()
            .flat_map(|ex| ex.all_rings())
            .filter(|r| r.len() >= 3)
            .cloned()
            .collect();
        Self { rings }
    }

    /// True when there is no boundary to comb within.
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Even-odd containment over all rings.
    pub fn inside(&self, p: &Point) -> bool {
        let mut count = 0;
        for ring in &self.rings {
            if ring.contains_point(p) {
                count += 1;
            }
        }
        count % 2 == 1
    }

    /// Nudge a point into the boundary region. Returns the moved point,
    /// or `None` when there is no boundary.
    pub fn move_inside(&self, p: &Point) -> Option<Point> {
        if self.rings.is_empty() {
            return None;
        }
        if self.inside(p) {
            return Some(*p);
        }

        let mut best: Option<(i128, Point)> = None;
        for ring in &self.rings {
            for i in 0..ring.len() {
                let edge = ring.edge(i);
                let proj = edge.project_point(p);
                let moved = offset_left(&edge, &proj, WAYPOINT_OFFSET * 4);
                let dist = p.distance_squared(&moved);
                if best.map(|(d, _)| dist < d).unwrap_or(true) {
                    best = Some((dist, moved));
                }
            }
        }
        best.map(|(_, p)| p)
    }

    /// Compute combed waypoints for a travel from `start` to `end`.
    ///
    /// Endpoints sitting just outside the boundary (the head parks on
    /// the outer wall, which is half a bead outside) are nudged in
    /// first; the nudge point becomes part of the path.
    ///
    /// Returns `Some(waypoints)` (possibly empty, meaning the straight
    /// line is fine) or `None` when combing cannot route this move and
    /// the caller should retract instead.
    pub fn calc(&self, start: Point, end: Point) -> Option<Vec<Point>> {
        if self.rings.is_empty() {
            return None;
        }

        let mut waypoints: Vec<Point> = Vec::new();

        let from = if self.inside(&start) {
            start
        } else {
            let moved = self.move_inside(&start)?;
            if !self.inside(&moved) || !moved.shorter_than(&start, 2_000) {
                return None;
            }
            waypoints.push(moved);
            moved
        };
        let (to, exit) = if self.inside(&end) {
            (end, None)
        } else {
            let moved = self.move_inside(&end)?;
            if !self.inside(&moved) || !moved.shorter_than(&end, 2_000) {
                return None;
            }
            (moved, Some(moved))
        };

        let crossings = self.collect_crossings(from, to);
        if crossings.is_empty() {
            if let Some(exit) = exit {
                waypoints.push(exit);
            }
            return Some(waypoints);
        }

        // Walk around every crossed ring, in the order the direct line
        // meets them
        let mut path: Vec<Point> = vec![from];
        for crossing in &crossings {
            self.walk_around(crossing, &mut path);
        }
        path.push(to);

        let path = self.simplify(&path);

        let direct = start.distance(&end);
        let mut length = 0.0;
        for w in path.windows(2) {
            length += w[0].distance(&w[1]);
        }
        if length > direct * MAX_DETOUR_FACTOR + 5_000.0 {
            return None;
        }

        waypoints.extend(path[1..].iter().copied());
        if exit.is_none() {
            waypoints.pop();
        }
        Some(waypoints)
    }

    /// Find the entry/exit crossing per ring along the direct line.
    fn collect_crossings(&self, start: Point, end: Point) -> Vec<RingCrossing> {
        let line = Line::new(start, end);
        let mut crossings: Vec<RingCrossing> = Vec::new();

        for (ring_idx, ring) in self.rings.iter().enumerate() {
            let mut entry: Option<(CoordF, usize, Point)> = None;
            let mut exit: Option<(CoordF, usize, Point)> = None;

            for i in 0..ring.len() {
                if let Some((p, t)) = line.intersect(&ring.edge(i)) {
                    if entry.map(|(te, _, _)| t < te).unwrap_or(true) {
                        entry = Some((t, i, p));
                    }
                    if exit.map(|(tx, _, _)| t > tx).unwrap_or(true) {
                        exit = Some((t, i, p));
                    }
                }
            }

            if let (Some((t_enter, edge_enter, point_enter)), Some((t_exit, edge_exit, point_exit))) =
                (entry, exit)
            {
                if t_exit > t_enter {
                    crossings.push(RingCrossing {
                        ring_idx,
                        t_enter,
                        edge_enter,
                        point_enter,
                        edge_exit,
                        point_exit,
                    });
                }
            }
        }

        crossings.sort_by(|a, b| a.t_enter.total_cmp(&b.t_enter));
        crossings
    }

    /// Append waypoints that walk around a crossed ring, taking the
    /// shorter direction between the entry and exit edges.
    fn walk_around(&self, crossing: &RingCrossing, path: &mut Vec<Point>) {
        let ring = &self.rings[crossing.ring_idx];
        let n = ring.len();

        // Forward: vertices edge_enter+1 ..= edge_exit
        let mut forward: Vec<usize> = Vec::new();
        let mut i = (crossing.edge_enter + 1) % n;
        loop {
            forward.push(i);
            if i == crossing.edge_exit {
                break;
            }
            i = (i + 1) % n;
            if forward.len() > n {
                break;
            }
        }

        // Backward: vertices edge_enter, edge_enter-1, ..., edge_exit+1
        let mut backward: Vec<usize> = Vec::new();
        let mut i = crossing.edge_enter;
        loop {
            backward.push(i);
            if i == (crossing.edge_exit + 1) % n {
                break;
            }
            i = if i == 0 { n - 1 } else { i - 1 };
            if backward.len() > n {
                break;
            }
        }

        let walk_length = |indices: &[usize], from: Point, to: Point| -> CoordF {
            let mut len = 0.0;
            let mut prev = from;
            for &idx in indices {
                len += prev.distance(&ring[idx]);
                prev = ring[idx];
            }
            len + prev.distance(&to)
        };

        let forward_len = walk_length(&forward, crossing.point_enter, crossing.point_exit);
        let backward_len = walk_length(&backward, crossing.point_enter, crossing.point_exit);
        let chosen = if forward_len <= backward_len {
            forward
        } else {
            backward
        };

        path.push(offset_left(
            &ring.edge(crossing.edge_enter),
            &crossing.point_enter,
            WAYPOINT_OFFSET,
        ));
        for idx in chosen {
            path.push(offset_vertex_left(ring, idx, WAYPOINT_OFFSET));
        }
        path.push(offset_left(
            &ring.edge(crossing.edge_exit),
            &crossing.point_exit,
            WAYPOINT_OFFSET,
        ));
    }

    /// Drop every waypoint that a straight shot can skip without
    /// crossing the boundary.
    fn simplify(&self, path: &[Point]) -> Vec<Point> {
        if path.len() <= 2 {
            return path.to_vec();
        }

        let mut result = vec![path[0]];
        let mut current = 0;

        while current < path.len() - 1 {
            let mut next = current + 1;
            for try_idx in (current + 2)..path.len() {
                if !self.crosses(&path[current], &path[try_idx]) {
                    next = try_idx;
                }
            }
            result.push(path[next]);
            current = next;
        }

        result
    }

    /// Does the open segment between two interior points cross any ring?
    fn crosses(&self, a: &Point, b: &Point) -> bool {
        let line = Line::new(*a, *b);
        for ring in &self.rings {
            for i in 0..ring.len() {
                if let Some((_, t)) = line.intersect(&ring.edge(i)) {
                    if t > 0.001 && t < 0.999 {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Offset a point on an edge to the left of the edge direction (into
/// the travel region, given canonical winding).
fn offset_left(edge: &Line, p: &Point, amount: Coord) -> Point {
    let v = edge.vector();
    let len = v.length();
    if len < 1.0 {
        return *p;
    }
    let nx = -(v.y as CoordF) / len;
    let ny = v.x as CoordF / len;
    Point::new(
        (p.x as CoordF + nx * amount as CoordF).round() as Coord,
        (p.y as CoordF + ny * amount as CoordF).round() as Coord,
    )
}

/// Offset a ring vertex along the average of its edges' left normals.
fn offset_vertex_left(ring: &Polygon, idx: usize, amount: Coord) -> Point {
    let n = ring.len();
    let prev = ring[(idx + n - 1) % n];
    let curr = ring[idx];
    let next = ring[(idx + 1) % n];

    let v1 = curr - prev;
    let v2 = next - curr;
    let l1 = v1.length();
    let l2 = v2.length();
    if l1 < 1.0 || l2 < 1.0 {
        return curr;
    }

    let nx = -(v1.y as CoordF) / l1 - (v2.y as CoordF) / l2;
    let ny = v1.x as CoordF / l1 + v2.x as CoordF / l2;
    let nl = (nx * nx + ny * ny).sqrt();
    if nl < 0.01 {
        return curr;
    }

    Point::new(
        (curr.x as CoordF + nx / nl * amount as CoordF).round() as Coord,
        (curr.y as CoordF + ny / nl * amount as CoordF).round() as Coord,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ExPolygon;

    /// A 20mm square boundary with a 4mm square hole in the middle.
    fn boundary_with_hole() -> ExPolygons {
        let outer = Polygon::rectangle(Point::zero(), Point::new_scale(20.0, 20.0));
        let mut hole =
            Polygon::rectangle(Point::new_scale(8.0, 8.0), Point::new_scale(12.0, 12.0));
        hole.make_clockwise();
        vec![ExPolygon::with_holes(outer, vec![hole])]
    }

    #[test]
    fn test_inside() {
        let comb = Comb::new(&boundary_with_hole());
        assert!(comb.inside(&Point::new_scale(2.0, 2.0)));
        assert!(!comb.inside(&Point::new_scale(10.0, 10.0))); // in the hole
        assert!(!comb.inside(&Point::new_scale(30.0, 30.0))); // outside
    }

    #[test]
    fn test_direct_travel_needs_no_waypoints() {
        let comb = Comb::new(&boundary_with_hole());
        let waypoints = comb
            .calc(Point::new_scale(1.0, 1.0), Point::new_scale(5.0, 1.0))
            .unwrap();
        assert!(waypoints.is_empty());
    }

    #[test]
    fn test_travel_routes_around_hole() {
        let comb = Comb::new(&boundary_with_hole());
        let start = Point::new_scale(2.0, 10.0);
        let end = Point::new_scale(18.0, 10.0);

        let waypoints = comb.calc(start, end).unwrap();
        assert!(!waypoints.is_empty(), "path through the hole must detour");

        // The full path must avoid the hole interior
        let hole = Polygon::rectangle(Point::new_scale(8.0, 8.0), Point::new_scale(12.0, 12.0));
        let mut path = vec![start];
        path.extend(waypoints.iter().copied());
        path.push(end);
        for w in path.windows(2) {
            let mid = Point::new((w[0].x + w[1].x) / 2, (w[0].y + w[1].y) / 2);
            assert!(
                !hole.contains_point(&mid),
                "midpoint {:?} dips into the hole",
                mid
            );
        }
        for p in &path {
            assert!(!hole.contains_point(p), "waypoint {:?} inside hole", p);
        }
    }

    #[test]
    fn test_travel_from_outside_fails() {
        let comb = Comb::new(&boundary_with_hole());
        assert!(comb
            .calc(Point::new_scale(-5.0, 10.0), Point::new_scale(5.0, 10.0))
            .is_none());
    }

    #[test]
    fn test_move_inside() {
        let comb = Comb::new(&boundary_with_hole());
        let outside = Point::new_scale(-1.0, 10.0);
        let moved = comb.move_inside(&outside).unwrap();
        assert!(comb.inside(&moved));

        let already_in = Point::new_scale(3.0, 3.0);
        assert_eq!(comb.move_inside(&already_in), Some(already_in));
    }

    #[test]
    fn test_empty_comb() {
        let comb = Comb::new(&Vec::new());
        assert!(comb.is_empty());
        assert!(comb.calc(Point::zero(), Point::new(1000, 1000)).is_none());
    }
}
