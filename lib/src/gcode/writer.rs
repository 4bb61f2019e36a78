//! Low-level G-code formatting.
//!
//! Tracks the machine state (position, feedrate, extrusion, fan,
//! extruder) and emits only deltas. The dialect differences live here
//! and nowhere else:
//! - RepRap: absolute E in millimeters of filament
//! - UltiGCode: volumetric E in mm^3, G10/G11 firmware retraction,
//!   no start/end code
//! - BFB: extruder motor RPM (M108/M101/M103), speeds in mm/min,
//!   M227 auto-retraction
//! - MakerBot: M126/M127 fan, M135 tool change
//! - Mach3: the extruder axis is addressed as A

use crate::config::GCodeFlavor;
use crate::geometry::Point;
use crate::{unscale, Coord, CoordF, Result};
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// G-code emitter over any byte sink.
pub struct GCodeWriter<W: Write> {
    out: W,
    flavor: GCodeFlavor,

    position: Point,
    z: Coord,
    /// Z value last written to the output; Z words are emitted only on
    /// change.
    emitted_z: Coord,
    current_speed: i32,
    fan_percent: i32,

    extruder: usize,
    /// Accumulated E value: mm of filament, or mm^3 for UltiGCode.
    extrusion_amount: CoordF,
    /// E units extruded per (mm of XY travel x mm of line width).
    e_per_mm2: CoordF,
    extrusion_amount_at_previous_retraction: CoordF,
    is_retracted: bool,
    /// True while the BFB extruder motor is spinning.
    bfb_extruding: bool,

    retraction_amount: CoordF,
    retraction_speed: i32,
    retraction_z_hop: Coord,
    extruder_switch_retraction: CoordF,
    minimum_extrusion_before_retraction: CoordF,

    total_filament: CoordF,
}

impl GCodeWriter<BufWriter<File>> {
    /// Create a writer appending to a fresh file.
    pub fn create<P: AsRef<Path>>(path: P, flavor: GCodeFlavor) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_sink(BufWriter::new(file), flavor))
    }

    /// Flush buffered output and sync the file to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}

impl<W: Write> GCodeWriter<W> {
    /// Create a writer over an arbitrary sink.
    pub fn from_sink(out: W, flavor: GCodeFlavor) -> Self {
        Self {
            out,
            flavor,
            position: Point::zero(),
            z: 0,
            emitted_z: Coord::MIN,
            current_speed: -1,
            fan_percent: -1,
            extruder: 0,
            extrusion_amount: 0.0,
            e_per_mm2: 0.0,
            extrusion_amount_at_previous_retraction: -10_000.0,
            is_retracted: false,
            bfb_extruding: false,
            retraction_amount: 4.5,
            retraction_speed: 45,
            retraction_z_hop: 0,
            extruder_switch_retraction: 14.5,
            minimum_extrusion_before_retraction: 0.1,
            total_filament: 0.0,
        }
    }

    /// The configured dialect.
    pub fn flavor(&self) -> GCodeFlavor {
        self.flavor
    }

    /// Current XY position, in micrometers.
    pub fn position(&self) -> Point {
        self.position
    }

    /// Current layer height target, in micrometers.
    pub fn z(&self) -> Coord {
        self.z
    }

    /// Current extruder index.
    pub fn extruder(&self) -> usize {
        self.extruder
    }

    /// Total extruded filament so far (mm, or mm^3 for UltiGCode).
    pub fn total_filament(&self) -> CoordF {
        self.total_filament + self.extrusion_amount
    }

    /// Set the retraction behavior. For BFB this emits the M227
    /// auto-retraction preamble instead.
    pub fn set_retraction_settings(
        &mut self,
        amount: Coord,
        speed: i32,
        extruder_switch_amount: Coord,
        minimum_extrusion: Coord,
        z_hop: Coord,
    ) -> Result<()> {
        self.retraction_amount = unscale(amount);
        self.retraction_speed = speed;
        self.extruder_switch_retraction = unscale(extruder_switch_amount);
        self.minimum_extrusion_before_retraction = unscale(minimum_extrusion);
        self.retraction_z_hop = z_hop;

        if self.flavor == GCodeFlavor::Bfb {
            let steps = (self.retraction_amount * 2560.0) as i32;
            self.write_line(&format!("M227 S{} P{}", steps, steps))?;
        }
        Ok(())
    }

    /// Configure the E-per-distance factor for the coming layer.
    pub fn set_extrusion(
        &mut self,
        layer_thickness: Coord,
        filament_diameter: Coord,
        extrusion_multiplier: f64,
    ) {
        let layer_thickness_mm = unscale(layer_thickness);
        if self.flavor == GCodeFlavor::UltiGCode {
            // Volumetric: E = width * thickness * length
            self.e_per_mm2 = layer_thickness_mm;
        } else {
            let radius = unscale(filament_diameter) / 2.0;
            let filament_area = PI * radius * radius;
            self.e_per_mm2 = layer_thickness_mm / filament_area * extrusion_multiplier;
        }
    }

    /// Target height for the next moves, in micrometers.
    pub fn set_z(&mut self, z: Coord) {
        self.z = z;
    }

    /// Write a raw line verbatim.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line)?;
        Ok(())
    }

    /// Write a `;comment` line.
    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        writeln!(self.out, ";{}", comment)?;
        Ok(())
    }

    /// Write a multi-line user code block (start/end code).
    pub fn write_code(&mut self, code: &str) -> Result<()> {
        for line in code.lines() {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    /// Write a dwell for the given number of seconds.
    pub fn write_delay(&mut self, seconds: CoordF) -> Result<()> {
        writeln!(self.out, "G4 P{}", (seconds * 1000.0) as i64)?;
        Ok(())
    }

    /// Letter used for the extrusion axis.
    fn e_letter(&self) -> char {
        if self.flavor == GCodeFlavor::Mach3 {
            'A'
        } else {
            'E'
        }
    }

    /// Move to a point at the given speed (mm/s). A non-zero
    /// `line_width` makes this an extrusion move of that bead width.
    pub fn write_move(&mut self, p: Point, speed: i32, line_width: Coord) -> Result<()> {
        if self.flavor == GCodeFlavor::Bfb {
            return self.write_move_bfb(p, speed, line_width);
        }

        let mut line = String::new();

        if line_width != 0 {
            if self.is_retracted {
                if self.retraction_z_hop > 0 {
                    writeln!(self.out, "G1 Z{:.3}", unscale(self.z))?;
                    self.emitted_z = self.z;
                }
                if self.flavor == GCodeFlavor::UltiGCode {
                    writeln!(self.out, "G11")?;
                } else {
                    writeln!(
                        self.out,
                        "G1 F{} {}{:.5}",
                        self.retraction_speed * 60,
                        self.e_letter(),
                        self.extrusion_amount
                    )?;
                    self.current_speed = self.retraction_speed;
                }
                self.is_retracted = false;
            }

            let dist = unscale(self.position.distance(&p).round() as Coord);
            self.extrusion_amount += self.e_per_mm2 * unscale(line_width) * dist;
            line.push_str("G1");
        } else {
            line.push_str("G0");
        }

        if speed != self.current_speed {
            write!(line, " F{}", speed * 60).unwrap();
            self.current_speed = speed;
        }
        write!(line, " X{:.3} Y{:.3}", unscale(p.x), unscale(p.y)).unwrap();
        if self.z != self.emitted_z {
            write!(line, " Z{:.3}", unscale(self.z)).unwrap();
            self.emitted_z = self.z;
        }
        if line_width != 0 {
            write!(line, " {}{:.5}", self.e_letter(), self.extrusion_amount).unwrap();
        }
        writeln!(self.out, "{}", line)?;

        self.position = p;
        Ok(())
    }

    /// BFB drives the extruder motor by RPM instead of E values.
    fn write_move_bfb(&mut self, p: Point, speed: i32, line_width: Coord) -> Result<()> {
        let speed_mm_min = speed * 60;
        if line_width != 0 {
            let dist = unscale(self.position.distance(&p).round() as Coord);
            self.extrusion_amount += self.e_per_mm2 * unscale(line_width) * dist;

            // Filament feed rate for this bead, scaled to motor RPM
            let rpm = self.e_per_mm2 * unscale(line_width) * speed as CoordF * 60.0;
            if !self.bfb_extruding {
                writeln!(self.out, "M108 S{:.1}", rpm)?;
                writeln!(self.out, "M101")?;
                self.bfb_extruding = true;
            } else {
                writeln!(self.out, "M108 S{:.1}", rpm)?;
            }
        } else if self.bfb_extruding {
            writeln!(self.out, "M103")?;
            self.bfb_extruding = false;
        }
        let mut line = format!("G1 X{:.3} Y{:.3}", unscale(p.x), unscale(p.y));
        if self.z != self.emitted_z {
            write!(line, " Z{:.3}", unscale(self.z)).unwrap();
            self.emitted_z = self.z;
        }
        write!(line, " F{}", speed_mm_min).unwrap();
        writeln!(self.out, "{}", line)?;
        self.position = p;
        self.current_speed = speed;
        Ok(())
    }

    /// Retract, unless already retracted or too little was extruded
    /// since the last retraction. `force` skips the minimum-extrusion
    /// check.
    pub fn write_retraction(&mut self, force: bool) -> Result<()> {
        if self.flavor == GCodeFlavor::Bfb {
            // Auto-retraction was armed with M227
            return Ok(());
        }
        if self.retraction_amount <= 0.0 || self.is_retracted {
            return Ok(());
        }
        if !force
            && self.extrusion_amount_at_previous_retraction
                + self.minimum_extrusion_before_retraction
                > self.extrusion_amount
        {
            return Ok(());
        }

        if self.flavor == GCodeFlavor::UltiGCode {
            writeln!(self.out, "G10")?;
        } else {
            writeln!(
                self.out,
                "G1 F{} {}{:.5}",
                self.retraction_speed * 60,
                self.e_letter(),
                self.extrusion_amount - self.retraction_amount
            )?;
            self.current_speed = self.retraction_speed;
        }
        if self.retraction_z_hop > 0 {
            writeln!(self.out, "G1 Z{:.3}", unscale(self.z + self.retraction_z_hop))?;
            self.emitted_z = self.z + self.retraction_z_hop;
        }

        self.extrusion_amount_at_previous_retraction = self.extrusion_amount;
        self.is_retracted = true;
        Ok(())
    }

    /// Reset the E axis to zero, folding the spent filament into the
    /// running total. BFB has no E axis and MakerBot firmware manages
    /// its own counters.
    pub fn reset_extrusion_value(&mut self) -> Result<()> {
        if self.extrusion_amount != 0.0
            && self.flavor != GCodeFlavor::Bfb
            && self.flavor != GCodeFlavor::MakerBot
        {
            writeln!(self.out, "G92 {}0", self.e_letter())?;
            self.total_filament += self.extrusion_amount;
            self.extrusion_amount_at_previous_retraction -= self.extrusion_amount;
            self.extrusion_amount = 0.0;
        }
        Ok(())
    }

    /// Switch to another extruder, retracting the outgoing filament.
    pub fn switch_extruder(&mut self, extruder: usize) -> Result<()> {
        if self.extruder == extruder {
            return Ok(());
        }

        self.reset_extrusion_value()?;
        self.extruder = extruder;

        if self.flavor == GCodeFlavor::UltiGCode {
            writeln!(self.out, "G10 S1")?;
        } else if self.flavor != GCodeFlavor::Bfb {
            writeln!(
                self.out,
                "G1 F{} {}{:.5}",
                self.retraction_speed * 60,
                self.e_letter(),
                self.extrusion_amount - self.extruder_switch_retraction
            )?;
            self.current_speed = self.retraction_speed;
        }
        self.extrusion_amount_at_previous_retraction = self.extrusion_amount;
        self.is_retracted = true;

        if self.flavor == GCodeFlavor::MakerBot {
            writeln!(self.out, "M135 T{}", extruder)?;
        } else {
            writeln!(self.out, "T{}", extruder)?;
        }
        Ok(())
    }

    /// Set the part-cooling fan, 0..=100 percent.
    pub fn write_fan_command(&mut self, percent: i32) -> Result<()> {
        if self.fan_percent == percent {
            return Ok(());
        }
        if percent > 0 {
            match self.flavor {
                GCodeFlavor::MakerBot => writeln!(self.out, "M126 T0")?,
                GCodeFlavor::Bfb => writeln!(self.out, "M106 S{}", percent * 21 / 100)?,
                _ => writeln!(self.out, "M106 S{}", percent * 255 / 100)?,
            }
        } else {
            match self.flavor {
                GCodeFlavor::MakerBot => writeln!(self.out, "M127 T0")?,
                _ => writeln!(self.out, "M107")?,
            }
        }
        self.fan_percent = percent;
        Ok(())
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Consume the writer and return the underlying sink.
    pub fn into_sink(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale;

    fn writer(flavor: GCodeFlavor) -> GCodeWriter<Vec<u8>> {
        let mut w = GCodeWriter::from_sink(Vec::new(), flavor);
        w.set_extrusion(200, 2890, 1.0);
        w.set_z(200);
        w
    }

    fn output(w: GCodeWriter<Vec<u8>>) -> String {
        String::from_utf8(w.out).unwrap()
    }

    #[test]
    fn test_travel_and_extrude() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new_scale(10.0, 10.0), 150, 0).unwrap();
        w.write_move(Point::new_scale(20.0, 10.0), 50, 400).unwrap();

        let out = output(w);
        assert!(out.contains("G0 F9000 X10.000 Y10.000 Z0.200"));
        // Z is unchanged on the second move and not repeated
        assert!(out.contains("G1 F3000 X20.000 Y10.000 E"));
    }

    #[test]
    fn test_feedrate_emitted_once() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new(1000, 0), 150, 0).unwrap();
        w.write_move(Point::new(2000, 0), 150, 0).unwrap();

        let out = output(w);
        assert_eq!(out.matches("F9000").count(), 1);
    }

    #[test]
    fn test_extrusion_accumulates() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        let after_first = w.extrusion_amount;
        assert!(after_first > 0.0);

        w.write_move(Point::new_scale(20.0, 0.0), 50, 400).unwrap();
        assert!(w.extrusion_amount > after_first);

        // 10mm at 0.4mm width and 0.2mm layer: volume 0.8mm^3;
        // filament area ~6.56mm^2 -> E ~0.122mm per segment
        assert!((after_first - 0.122).abs() < 0.01);
    }

    #[test]
    fn test_retraction_roundtrip() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.write_retraction(false).unwrap();
        let retracted_at = w.extrusion_amount;
        w.write_move(Point::new_scale(20.0, 0.0), 50, 400).unwrap();

        let out = output(w);
        // The retraction dips E below the running value, the unretract
        // restores it before the next extrusion
        assert!(out.contains(&format!("G1 F2700 E{:.5}", retracted_at - 4.5)));
        assert!(out.contains(&format!("G1 F2700 E{:.5}", retracted_at)));
    }

    #[test]
    fn test_minimum_extrusion_suppresses_retraction() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.write_retraction(false).unwrap();
        w.write_move(Point::new_scale(10.1, 0.0), 50, 400).unwrap();
        // Almost nothing extruded since the last retraction
        w.write_retraction(false).unwrap();

        let out = output(w);
        assert_eq!(out.matches("G1 F2700 E").count(), 2); // retract + unretract only
    }

    #[test]
    fn test_ultigcode_retraction() {
        let mut w = writer(GCodeFlavor::UltiGCode);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.write_retraction(false).unwrap();
        w.write_move(Point::new_scale(20.0, 0.0), 50, 400).unwrap();

        let out = output(w);
        assert!(out.contains("G10\n"));
        assert!(out.contains("G11\n"));
        assert!(!out.contains(" F2700 E"));
    }

    #[test]
    fn test_ultigcode_volumetric_e() {
        let mut w = writer(GCodeFlavor::UltiGCode);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        // 10mm x 0.4mm x 0.2mm = 0.8 mm^3
        assert!((w.extrusion_amount - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_mach3_uses_a_axis() {
        let mut w = writer(GCodeFlavor::Mach3);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        let out = output(w);
        assert!(out.contains(" A0."));
        assert!(!out.contains(" E0."));
    }

    #[test]
    fn test_bfb_motor_commands() {
        let mut w = writer(GCodeFlavor::Bfb);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.write_move(Point::new_scale(20.0, 0.0), 150, 0).unwrap();

        let out = output(w);
        assert!(out.contains("M108 S"));
        assert!(out.contains("M101"));
        assert!(out.contains("M103"));
        assert!(!out.contains(" E"));
    }

    #[test]
    fn test_z_hop() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.set_retraction_settings(scale(4.5), 45, scale(14.5), 100, 500)
            .unwrap();
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.write_retraction(false).unwrap();
        let out_before = w.z;
        assert_eq!(out_before, 200);
        w.write_move(Point::new_scale(20.0, 0.0), 50, 400).unwrap();

        let out = output(w);
        assert!(out.contains("G1 Z0.700")); // hop
        assert!(out.contains("G1 Z0.200")); // restore
    }

    #[test]
    fn test_extruder_switch() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_move(Point::new_scale(10.0, 0.0), 50, 400).unwrap();
        w.switch_extruder(1).unwrap();
        let extruder = w.extruder();

        let out = output(w);
        assert!(out.contains("G92 E0"));
        assert!(out.contains("E-14.5"));
        assert!(out.ends_with("T1\n"));
        assert_eq!(extruder, 1);
    }

    #[test]
    fn test_makerbot_switch_and_fan() {
        let mut w = writer(GCodeFlavor::MakerBot);
        w.write_fan_command(100).unwrap();
        w.write_fan_command(0).unwrap();
        w.switch_extruder(1).unwrap();

        let out = output(w);
        assert!(out.contains("M126 T0"));
        assert!(out.contains("M127 T0"));
        assert!(out.contains("M135 T1"));
    }

    #[test]
    fn test_fan_deduplicated() {
        let mut w = writer(GCodeFlavor::RepRap);
        w.write_fan_command(50).unwrap();
        w.write_fan_command(50).unwrap();
        let out = output(w);
        assert_eq!(out.matches("M106").count(), 1);
    }
}
