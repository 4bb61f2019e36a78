//! Per-layer path planning.
//!
//! A planner lives for exactly one layer: features are queued as
//! travel/extrude paths, then the whole layer is flushed to the writer
//! at once. Queuing first is what makes the layer-wide decisions
//! possible: combing against the current part, the retraction policy,
//! and minimum-layer-time speed scaling over the full set of paths.

use crate::gcode::{GCodeWriter, PathOrderOptimizer};
use crate::geometry::{ExPolygons, Point, Polygon, Polyline};
use crate::travel::Comb;
use crate::{Coord, CoordF, Result};
use std::io::Write;

/// What a path extrudes; selects the `;TYPE:` marker and groups paths
/// for comment emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathRole {
    WallOuter,
    WallInner,
    Fill,
    Support,
    Skirt,
    Travel,
}

impl PathRole {
    /// Feature marker emitted into the G-code.
    pub fn marker(&self) -> &'static str {
        match self {
            PathRole::WallOuter => "WALL-OUTER",
            PathRole::WallInner => "WALL-INNER",
            PathRole::Fill => "FILL",
            PathRole::Support => "SUPPORT",
            PathRole::Skirt => "SKIRT",
            PathRole::Travel => "TRAVEL",
        }
    }
}

/// Speed and bead width for one feature class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathConfig {
    /// Print speed in mm/s.
    pub speed: i32,
    /// Bead width in micrometers; zero marks a travel config.
    pub line_width: Coord,
    pub role: PathRole,
    /// Distribute Z over the path (vase mode outer wall).
    pub spiralize: bool,
}

impl PathConfig {
    /// Create an extrusion config.
    pub fn new(speed: i32, line_width: Coord, role: PathRole) -> Self {
        Self {
            speed,
            line_width,
            role,
            spiralize: false,
        }
    }

    fn travel(speed: i32) -> Self {
        Self {
            speed,
            line_width: 0,
            role: PathRole::Travel,
            spiralize: false,
        }
    }

    fn is_travel(&self) -> bool {
        self.line_width == 0
    }
}

/// One queued path: consecutive moves sharing a config and extruder.
#[derive(Clone, Debug)]
struct PlannedPath {
    config: PathConfig,
    extruder: usize,
    retract: bool,
    points: Vec<Point>,
}

/// Plans and flushes the paths of a single layer.
pub struct GCodePlanner {
    paths: Vec<PlannedPath>,
    start_position: Point,
    last_position: Point,
    comb: Option<Comb>,
    travel_config: PathConfig,
    retraction_min_travel: Coord,
    always_retract: bool,
    force_retraction: bool,
    extruder: usize,
    extrude_speed_factor: CoordF,
    extra_time: CoordF,
    estimated_time: CoordF,
}

impl GCodePlanner {
    /// Create a planner starting at the writer's current position.
    pub fn new(
        start_position: Point,
        extruder: usize,
        travel_speed: i32,
        retraction_min_travel: Coord,
    ) -> Self {
        Self {
            paths: Vec::new(),
            start_position,
            last_position: start_position,
            comb: None,
            travel_config: PathConfig::travel(travel_speed),
            retraction_min_travel,
            always_retract: false,
            force_retraction: false,
            extruder,
            extrude_speed_factor: 1.0,
            extra_time: 0.0,
            estimated_time: 0.0,
        }
    }

    /// Current planning position.
    pub fn position(&self) -> Point {
        self.last_position
    }

    /// Current extruder.
    pub fn extruder(&self) -> usize {
        self.extruder
    }

    /// Switch extruders. Returns true when the extruder actually
    /// changed, so the caller can interpose a wipe-tower pass.
    pub fn set_extruder(&mut self, extruder: usize) -> bool {
        if extruder == self.extruder {
            return false;
        }
        self.extruder = extruder;
        true
    }

    /// Set (or clear) the comb boundary used for travel routing.
    pub fn set_comb_boundary(&mut self, boundary: Option<&ExPolygons>) {
        self.comb = match boundary {
            Some(b) if !b.is_empty() => Some(Comb::new(b)),
            _ => None,
        };
    }

    /// Retract on every travel, regardless of the comb boundary.
    pub fn set_always_retract(&mut self, always: bool) {
        self.always_retract = always;
    }

    /// Force a retraction on the next travel move.
    pub fn force_retract(&mut self) {
        self.force_retraction = true;
    }

    /// The extrusion speed factor after minimum-layer-time scaling,
    /// in percent (100 = unscaled).
    pub fn extrude_factor_percent(&self) -> i32 {
        (self.extrude_speed_factor * 100.0).round() as i32
    }

    /// Estimated layer time after scaling, in seconds.
    pub fn estimated_time(&self) -> CoordF {
        self.estimated_time
    }

    fn latest_path(&mut self, config: PathConfig) -> &mut PlannedPath {
        let reuse = matches!(self.paths.last(), Some(last)
            if last.config == config && last.extruder == self.extruder);
        if !reuse {
            self.paths.push(PlannedPath {
                config,
                extruder: self.extruder,
                retract: false,
                points: Vec::new(),
            });
        }
        self.paths.last_mut().unwrap()
    }

    /// Queue a travel move, combed or retracted per policy.
    pub fn add_travel(&mut self, p: Point) {
        let mut waypoints: Vec<Point> = Vec::new();
        let mut retract = false;

        if self.force_retraction {
            retract = !self.last_position.shorter_than(&p, self.retraction_min_travel);
            self.force_retraction = false;
        } else if let Some(comb) = &self.comb {
            match comb.calc(self.last_position, p) {
                Some(path) => waypoints = path,
                None => {
                    retract =
                        !self.last_position.shorter_than(&p, self.retraction_min_travel);
                }
            }
        } else if self.always_retract {
            retract = !self.last_position.shorter_than(&p, self.retraction_min_travel);
        }

        // A retraction belongs at the start of its own path
        let config = self.travel_config;
        let reusable = !retract
            && matches!(self.paths.last(), Some(last)
                if last.config == config && last.extruder == self.extruder);
        if !reusable {
            self.paths.push(PlannedPath {
                config,
                extruder: self.extruder,
                retract,
                points: Vec::new(),
            });
        }
        let path = self.paths.last_mut().unwrap();
        path.points.extend(waypoints);
        path.points.push(p);
        self.last_position = p;
    }

    /// If the head is outside the comb boundary, travel to just inside
    /// it so the next combed travel has a valid start.
    pub fn move_inside_comb_boundary(&mut self) {
        let moved = match &self.comb {
            Some(comb) if !comb.inside(&self.last_position) => {
                comb.move_inside(&self.last_position)
            }
            _ => None,
        };
        if let Some(p) = moved {
            if p != self.last_position {
                self.add_travel(p);
            }
        }
    }

    /// Queue one extrusion move.
    pub fn add_extrusion_move(&mut self, p: Point, config: PathConfig) {
        self.latest_path(config).points.push(p);
        self.last_position = p;
    }

    /// Queue a closed polygon starting at the given vertex.
    pub fn add_polygon(&mut self, polygon: &[Point], start_idx: usize, config: PathConfig) {
        if polygon.is_empty() {
            return;
        }
        let p0 = polygon[start_idx % polygon.len()];
        self.add_travel(p0);
        for i in 1..polygon.len() {
            self.add_extrusion_move(polygon[(start_idx + i) % polygon.len()], config);
        }
        if polygon.len() > 2 {
            self.add_extrusion_move(p0, config);
        }
    }

    /// Queue a set of closed polygons in nearest-neighbor order.
    pub fn add_polygons_by_optimizer(&mut self, polygons: &[Polygon], config: PathConfig) {
        let mut optimizer = PathOrderOptimizer::new(self.last_position);
        for polygon in polygons {
            optimizer.add_polygon(polygon.points());
        }
        optimizer.optimize();

        for &idx in optimizer.poly_order.iter() {
            self.add_polygon(polygons[idx].points(), optimizer.poly_start[idx], config);
        }
    }

    /// Queue a set of open lines (infill) in nearest-neighbor order,
    /// entering each line from its nearer end.
    pub fn add_lines_by_optimizer(&mut self, lines: &[Polyline], config: PathConfig) {
        let mut optimizer = PathOrderOptimizer::new(self.last_position);
        for line in lines {
            optimizer.add_polygon(line.points());
        }
        optimizer.optimize();

        for &idx in optimizer.poly_order.iter() {
            let points = lines[idx].points();
            let start = optimizer.poly_start[idx];
            self.add_travel(points[start]);
            for i in 1..points.len() {
                self.add_extrusion_move(points[(start + i) % points.len()], config);
            }
        }
    }

    /// Scale extrusion speeds down until the layer takes at least
    /// `min_time` seconds, but never below `min_speed`. Whatever time
    /// still cannot be reached is remembered for a cool-head-lift
    /// dwell at flush time.
    pub fn force_minimum_layer_time(&mut self, min_time: CoordF, min_speed: i32) {
        let mut travel_time = 0.0;
        let mut extrude_time = 0.0;
        let mut p0 = self.start_position;
        for path in &self.paths {
            for point in &path.points {
                let dist_mm = crate::unscale(p0.distance(point).round() as Coord);
                let time = dist_mm / path.config.speed.max(1) as CoordF;
                if path.config.is_travel() {
                    travel_time += time;
                } else {
                    extrude_time += time;
                }
                p0 = *point;
            }
        }

        let total = travel_time + extrude_time;
        self.estimated_time = total;
        if total >= min_time || extrude_time <= 0.0 {
            return;
        }

        let min_extrude_time = (min_time - travel_time).max(1.0);
        let mut factor = extrude_time / min_extrude_time;
        for path in &self.paths {
            if path.config.is_travel() {
                continue;
            }
            let path_min = min_speed as CoordF / path.config.speed as CoordF;
            if factor < path_min {
                factor = path_min;
            }
        }
        factor = factor.min(1.0);

        self.extrude_speed_factor = factor;
        let scaled_total = travel_time + extrude_time / factor;
        if scaled_total < min_time {
            self.extra_time = min_time - scaled_total;
        }
        self.estimated_time = scaled_total + self.extra_time;
    }

    /// Flush the layer to the writer. `layer_thickness` drives the
    /// spiralize Z ramp; `cool_head_lift` turns leftover minimum-layer
    /// time into a lifted dwell.
    pub fn write_gcode<W: Write>(
        self,
        gcode: &mut GCodeWriter<W>,
        layer_thickness: Coord,
        cool_head_lift: bool,
    ) -> Result<()> {
        let base_z = gcode.z();
        let mut last_role: Option<PathRole> = None;
        let travel_speed = self.travel_config.speed;

        for path in &self.paths {
            if path.extruder != gcode.extruder() {
                gcode.switch_extruder(path.extruder)?;
            }
            if path.retract {
                gcode.write_retraction(false)?;
            }

            if path.config.is_travel() {
                for point in &path.points {
                    gcode.write_move(*point, path.config.speed, 0)?;
                }
                continue;
            }

            if last_role != Some(path.config.role) {
                gcode.write_comment(&format!("TYPE:{}", path.config.role.marker()))?;
                last_role = Some(path.config.role);
            }

            let speed = ((path.config.speed as CoordF * self.extrude_speed_factor).round()
                as i32)
                .max(1);

            if path.config.spiralize {
                // Ramp Z along the path so the seam disappears
                let mut total_length = 0.0;
                let mut prev = gcode.position();
                for point in &path.points {
                    total_length += prev.distance(point);
                    prev = *point;
                }

                let mut length = 0.0;
                let mut prev = gcode.position();
                for point in &path.points {
                    length += prev.distance(point);
                    prev = *point;
                    let ramp = if total_length > 0.0 {
                        (layer_thickness as CoordF * length / total_length).round() as Coord
                    } else {
                        0
                    };
                    gcode.set_z(base_z + ramp);
                    gcode.write_move(*point, speed, path.config.line_width)?;
                }
            } else {
                for point in &path.points {
                    gcode.write_move(*point, speed, path.config.line_width)?;
                }
            }
        }

        if self.extra_time > 0.0 && cool_head_lift {
            gcode.write_comment("cool head lift")?;
            gcode.write_retraction(true)?;
            gcode.set_z(base_z + 3_000);
            gcode.write_move(gcode.position(), travel_speed, 0)?;
            gcode.write_delay(self.extra_time)?;
            gcode.set_z(base_z);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GCodeFlavor;
    use crate::geometry::{ExPolygon, Point, Polygon};

    fn fill_config() -> PathConfig {
        PathConfig::new(50, 400, PathRole::Fill)
    }

    fn flush(planner: GCodePlanner) -> String {
        let mut writer = GCodeWriter::from_sink(Vec::new(), GCodeFlavor::RepRap);
        writer.set_extrusion(200, 2890, 1.0);
        writer.set_z(200);
        planner.write_gcode(&mut writer, 200, false).unwrap();
        String::from_utf8(writer.into_sink()).unwrap()
    }

    #[test]
    fn test_type_marker_once_per_feature() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        let square = Polygon::rectangle(Point::zero(), Point::new(10_000, 10_000));
        planner.add_polygons_by_optimizer(&[square.clone()], fill_config());
        planner.add_polygons_by_optimizer(&[square], fill_config());

        let out = flush(planner);
        assert_eq!(out.matches(";TYPE:FILL").count(), 1);
    }

    #[test]
    fn test_long_travel_retracts_when_always_retract() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        planner.set_always_retract(true);
        planner.add_extrusion_move(Point::new(500, 0), fill_config());
        planner.add_travel(Point::new(100_000, 0));
        planner.add_extrusion_move(Point::new(101_000, 0), fill_config());

        let out = flush(planner);
        // Retraction dips E with the retraction feedrate
        assert!(out.contains("F2700 E"));
    }

    #[test]
    fn test_short_travel_does_not_retract() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        planner.set_always_retract(true);
        planner.add_extrusion_move(Point::new(500, 0), fill_config());
        planner.add_travel(Point::new(1_000, 0));
        planner.add_extrusion_move(Point::new(2_000, 0), fill_config());

        let out = flush(planner);
        assert!(!out.contains("F2700 E"));
    }

    #[test]
    fn test_combing_avoids_retraction() {
        let boundary: ExPolygons = vec![ExPolygon::new(Polygon::rectangle(
            Point::zero(),
            Point::new_scale(50.0, 50.0),
        ))];
        let mut planner = GCodePlanner::new(Point::new_scale(1.0, 1.0), 0, 150, 1500);
        planner.set_comb_boundary(Some(&boundary));
        planner.add_travel(Point::new_scale(40.0, 40.0));

        let out = flush(planner);
        assert!(!out.contains("F2700 E"), "combed travel must not retract");
    }

    #[test]
    fn test_set_extruder_reports_change() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        assert!(!planner.set_extruder(0));
        assert!(planner.set_extruder(1));
        assert_eq!(planner.extruder(), 1);
    }

    #[test]
    fn test_minimum_layer_time_scales_speed() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        // 50mm at 50mm/s = 1 second
        planner.add_extrusion_move(Point::new_scale(50.0, 0.0), fill_config());
        planner.force_minimum_layer_time(5.0, 10);

        assert_eq!(planner.extrude_factor_percent(), 20);
        assert!((planner.estimated_time() - 5.0).abs() < 0.05);
    }

    #[test]
    fn test_minimum_layer_time_clamps_at_minimum_speed() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        // 10mm at 50mm/s = 0.2s; reaching 60s would need 0.3% speed
        planner.add_extrusion_move(Point::new_scale(10.0, 0.0), fill_config());
        planner.force_minimum_layer_time(60.0, 25);

        // Clamped at 25mm/s -> factor 50%
        assert_eq!(planner.extrude_factor_percent(), 50);
        // The rest becomes dwell time
        assert!((planner.estimated_time() - 60.0).abs() < 0.05);
    }

    #[test]
    fn test_cool_head_lift_emits_dwell() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        planner.add_extrusion_move(Point::new_scale(10.0, 0.0), fill_config());
        planner.force_minimum_layer_time(30.0, 25);

        let mut writer = GCodeWriter::from_sink(Vec::new(), GCodeFlavor::RepRap);
        writer.set_extrusion(200, 2890, 1.0);
        writer.set_z(200);
        planner.write_gcode(&mut writer, 200, true).unwrap();
        let out = String::from_utf8(writer.into_sink()).unwrap();

        assert!(out.contains("G4 P"));
        assert!(out.contains("Z3.200")); // lifted 3mm above the 0.2mm layer
    }

    #[test]
    fn test_fast_layer_unchanged() {
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        planner.add_extrusion_move(Point::new_scale(500.0, 0.0), fill_config());
        planner.force_minimum_layer_time(5.0, 10);
        assert_eq!(planner.extrude_factor_percent(), 100);
    }

    #[test]
    fn test_spiralize_ramps_z() {
        let mut config = fill_config();
        config.spiralize = true;
        let mut planner = GCodePlanner::new(Point::zero(), 0, 150, 1500);
        let square = Polygon::rectangle(Point::zero(), Point::new_scale(10.0, 10.0));
        planner.add_polygon(square.points(), 0, config);

        let mut writer = GCodeWriter::from_sink(Vec::new(), GCodeFlavor::RepRap);
        writer.set_extrusion(200, 2890, 1.0);
        writer.set_z(400);
        planner.write_gcode(&mut writer, 200, false).unwrap();
        let out = String::from_utf8(writer.into_sink()).unwrap();

        // Z climbs monotonically through the loop up to the next layer
        let zs: Vec<f64> = out
            .lines()
            .filter_map(|l| {
                l.split_whitespace()
                    .find(|w| w.starts_with('Z'))
                    .and_then(|w| w[1..].parse().ok())
            })
            .collect();
        assert!(zs.len() >= 4);
        for w in zs.windows(2) {
            assert!(w[1] >= w[0], "Z must not decrease: {:?}", zs);
        }
        assert!((zs.last().unwrap() - 0.6).abs() < 1e-6);
    }
}
