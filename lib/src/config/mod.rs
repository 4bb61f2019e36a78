//! Slicing configuration.
//!
//! All recognized options, their defaults, `-s key=value` parsing and
//! pre-flight validation. Lengths are integer micrometers, angles are
//! integer degrees, speeds are mm/s; only `extrusionMultiplier` and the
//! rotation matrix are floating point.

use crate::geometry::Point;
use crate::{Coord, Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Infill pattern for sparse regions and support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InfillType {
    /// Parallel lines; alternate layers rotate by 90 degrees.
    #[default]
    Lines,
    /// Superimposed lines in both directions at doubled spacing.
    Grid,
}

impl FromStr for InfillType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LINES" => Ok(InfillType::Lines),
            "GRID" => Ok(InfillType::Grid),
            _ => Err(Error::Config(format!("unsupported infill type: {}", s))),
        }
    }
}

/// Fill pattern for support islands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SupportType {
    #[default]
    Grid,
    Lines,
}

impl FromStr for SupportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GRID" => Ok(SupportType::Grid),
            "LINES" => Ok(SupportType::Lines),
            _ => Err(Error::Config(format!("unsupported support type: {}", s))),
        }
    }
}

/// Output G-code dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GCodeFlavor {
    /// RepRap-style absolute E values.
    #[default]
    RepRap,
    /// Ultimaker volumetric G-code: no start/end code, E in mm^3,
    /// G10/G11 retraction.
    UltiGCode,
    /// Bits-from-Bytes: extruder motor RPM commands, no E values.
    Bfb,
    /// MakerBot: M126/M127 fan, M135 tool change.
    MakerBot,
    /// Mach3 CNC: E is addressed as the A axis.
    Mach3,
}

impl FromStr for GCodeFlavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "REPRAP" => Ok(GCodeFlavor::RepRap),
            "ULTIGCODE" => Ok(GCodeFlavor::UltiGCode),
            "BFB" => Ok(GCodeFlavor::Bfb),
            "MAKERBOT" => Ok(GCodeFlavor::MakerBot),
            "MACH3" => Ok(GCodeFlavor::Mach3),
            _ => Err(Error::Config(format!("unsupported output type: {}", s))),
        }
    }
}

/// The full slicing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    // Layers
    pub layer_thickness: Coord,
    pub first_layer_thickness: Coord,
    pub extrusion_width: Coord,
    pub first_layer_extrusion_width: Coord,

    // Shells
    pub perimeter_count: u32,
    pub top_layer_count: u32,
    pub bottom_layer_count: u32,

    // Sparse infill
    pub infill_percent: u32,
    pub infill_type: InfillType,
    pub infill_starting_angle: i32,
    pub infill_extend_into_perimeter: Coord,

    // Support
    pub support_extruder: i32,
    pub support_angle_degrees: i32,
    pub support_everywhere: bool,
    pub support_xy_distance: Coord,
    pub support_z_distance: Coord,
    pub support_line_spacing: Coord,
    pub support_type: SupportType,

    // Raft
    pub enable_raft: bool,
    pub raft_base_thickness: Coord,
    pub raft_interface_thickness: Coord,
    pub raft_surface_layers: u32,
    pub raft_surface_thickness: Coord,
    pub raft_air_gap: Coord,
    pub raft_extra_distance: Coord,
    pub raft_line_spacing: Coord,

    // Skirt
    pub skirt_loop_count: u32,
    pub skirt_distance: Coord,
    pub skirt_min_length: Coord,

    // Multi-material
    pub wipe_tower_size: Coord,
    pub wipe_shield_distance: Coord,
    pub multi_volume_overlap_percent: u32,

    // Retraction
    pub retraction_amount: Coord,
    pub retraction_speed: i32,
    pub retraction_z_hop: Coord,
    pub retraction_amount_extruder_switch: Coord,
    pub minimum_extrusion_before_retraction: Coord,
    pub minimum_travel_for_retraction: Coord,

    // Speeds (mm/s)
    pub travel_speed: i32,
    pub infill_speed: i32,
    pub outer_perimeter_speed: i32,
    pub inner_perimeter_speed: i32,
    pub support_speed: i32,
    pub first_layer_speed: i32,
    pub minimum_print_speed: i32,

    // Cooling
    pub minimum_layer_time_seconds: i32,
    pub cool_head_lift: bool,
    pub fan_speed_min_percent: i32,
    pub fan_speed_max_percent: i32,
    pub first_layer_to_allow_fan: u32,

    // Modes
    pub spiralize: bool,
    pub avoid_crossing_perimeters: bool,
    pub repair_outlines: bool,
    pub repair_overlaps: bool,

    // Output
    pub flavor: GCodeFlavor,
    pub filament_diameter: Coord,
    pub extrusion_multiplier: f64,

    // Placement
    pub model_rotation_matrix: [[f64; 3]; 3],
    pub object_position: Point,
    pub center_object_in_xy: bool,
    pub bottom_clip_amount: Coord,

    // User code
    pub start_code: String,
    pub end_code: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layer_thickness: 100,
            first_layer_thickness: 300,
            extrusion_width: 400,
            first_layer_extrusion_width: 400,

            perimeter_count: 2,
            top_layer_count: 6,
            bottom_layer_count: 6,

            infill_percent: 20,
            infill_type: InfillType::Lines,
            infill_starting_angle: 45,
            infill_extend_into_perimeter: 60,

            support_extruder: -1,
            support_angle_degrees: 60,
            support_everywhere: false,
            support_xy_distance: 700,
            support_z_distance: 150,
            support_line_spacing: 2500,
            support_type: SupportType::Grid,

            enable_raft: false,
            raft_base_thickness: 300,
            raft_interface_thickness: 270,
            raft_surface_layers: 2,
            raft_surface_thickness: 270,
            raft_air_gap: 220,
            raft_extra_distance: 5000,
            raft_line_spacing: 1000,

            skirt_loop_count: 1,
            skirt_distance: 6000,
            skirt_min_length: 0,

            wipe_tower_size: 0,
            wipe_shield_distance: 0,
            multi_volume_overlap_percent: 0,

            retraction_amount: 4500,
            retraction_speed: 45,
            retraction_z_hop: 0,
            retraction_amount_extruder_switch: 14500,
            minimum_extrusion_before_retraction: 100,
            minimum_travel_for_retraction: 1500,

            travel_speed: 150,
            infill_speed: 50,
            outer_perimeter_speed: 50,
            inner_perimeter_speed: 50,
            support_speed: 60,
            first_layer_speed: 20,
            minimum_print_speed: 10,

            minimum_layer_time_seconds: 5,
            cool_head_lift: false,
            fan_speed_min_percent: 100,
            fan_speed_max_percent: 100,
            first_layer_to_allow_fan: 2,

            spiralize: false,
            avoid_crossing_perimeters: true,
            repair_outlines: false,
            repair_overlaps: true,

            flavor: GCodeFlavor::RepRap,
            filament_diameter: 2890,
            extrusion_multiplier: 1.0,

            model_rotation_matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            object_position: Point::new(102_500, 102_500),
            center_object_in_xy: true,
            bottom_clip_amount: 0,

            start_code: String::from(
                "M109 S210     ;Heatup to 210C\nG21           ;metric values\nG90           ;absolute positioning\nG28           ;Home\nG1 Z15.0 F300 ;move the platform down 15mm\nG92 E0        ;zero the extruded length\nG1 F200 E5    ;extrude 5mm of feed stock\nG92 E0        ;zero the extruded length again\n",
            ),
            end_code: String::from(
                "M104 S0                     ;extruder heater off\nM140 S0                     ;heated bed heater off (if you have it)\nG91                            ;relative positioning\nG1 E-1 F300                    ;retract the filament a bit before lifting the nozzle, to release some of the pressure\nG1 Z+0.5 E-5 X-20 Y-20 F9000   ;move Z up a bit and retract filament even more\nG28 X0 Y0                      ;move X/Y to min endstops, so the head is out of the way\nM84                         ;steppers off\nG90                         ;absolute positioning\n",
            ),
        }
    }
}

impl Settings {
    /// The sparse infill line distance derived from the fill percent,
    /// or `None` when infill is disabled.
    pub fn infill_line_distance(&self) -> Option<Coord> {
        if self.infill_percent == 0 {
            return None;
        }
        Some(self.extrusion_width * 100 / self.infill_percent as Coord)
    }

    /// True when support generation is enabled.
    #[inline]
    pub fn support_enabled(&self) -> bool {
        self.support_extruder >= 0
    }

    /// True when the wipe tower is enabled. A size of one micrometer or
    /// less is the disable sentinel.
    #[inline]
    pub fn wipe_tower_enabled(&self) -> bool {
        self.wipe_tower_size > 1
    }

    /// Total thickness of the raft under the first layer.
    pub fn raft_total_thickness(&self) -> Coord {
        if !self.enable_raft {
            return 0;
        }
        self.raft_base_thickness
            + self.raft_interface_thickness
            + self.raft_surface_layers as Coord * self.raft_surface_thickness
            + self.raft_air_gap
    }

    /// Apply one `-s key=value` option.
    ///
    /// Unknown keys are tolerated (a warning, not an error); malformed
    /// values and unsupported enum names are configuration errors.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn int(key: &str, value: &str) -> Result<i64> {
            value
                .parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid integer for {}: {}", key, value)))
        }
        fn uint(key: &str, value: &str) -> Result<u32> {
            value
                .parse::<u32>()
                .map_err(|_| Error::Config(format!("invalid count for {}: {}", key, value)))
        }
        fn boolean(key: &str, value: &str) -> Result<bool> {
            match value {
                "1" | "true" | "True" => Ok(true),
                "0" | "false" | "False" => Ok(false),
                _ => Err(Error::Config(format!(
                    "invalid boolean for {}: {}",
                    key, value
                ))),
            }
        }
        fn float(key: &str, value: &str) -> Result<f64> {
            value
                .parse::<f64>()
                .map_err(|_| Error::Config(format!("invalid number for {}: {}", key, value)))
        }

        match key {
            "layerThickness_um" => self.layer_thickness = int(key, value)?,
            "firstLayerThickness_um" => self.first_layer_thickness = int(key, value)?,
            "extrusionWidth_um" => self.extrusion_width = int(key, value)?,
            "firstLayerExtrusionWidth_um" => self.first_layer_extrusion_width = int(key, value)?,

            "numberOfPerimeters" => self.perimeter_count = uint(key, value)?,
            "numberOfTopLayers" => self.top_layer_count = uint(key, value)?,
            "numberOfBottomLayers" => self.bottom_layer_count = uint(key, value)?,

            "infillPercent" => self.infill_percent = uint(key, value)?,
            "infillType" => self.infill_type = value.parse()?,
            "infillStartingAngle" => self.infill_starting_angle = int(key, value)? as i32,
            "infillExtendIntoPerimeter_um" => {
                self.infill_extend_into_perimeter = int(key, value)?
            }

            "supportExtruder" => self.support_extruder = int(key, value)? as i32,
            "supportAngleDegrees" => self.support_angle_degrees = int(key, value)? as i32,
            "supportEverywhere" => self.support_everywhere = boolean(key, value)?,
            "supportXYDistance_um" => self.support_xy_distance = int(key, value)?,
            "supportZDistance_um" => self.support_z_distance = int(key, value)?,
            "supportLineSpacing_um" => self.support_line_spacing = int(key, value)?,
            "supportType" => self.support_type = value.parse()?,

            "enableRaft" => self.enable_raft = boolean(key, value)?,
            "raftBaseThickness_um" => self.raft_base_thickness = int(key, value)?,
            "raftInterfaceThicknes_um" => self.raft_interface_thickness = int(key, value)?,
            "raftSurfaceLayers" => self.raft_surface_layers = uint(key, value)?,
            "raftSurfaceThickness_um" => self.raft_surface_thickness = int(key, value)?,
            "raftAirGap_um" => self.raft_air_gap = int(key, value)?,
            "raftExtraDistanceAroundPart_um" => self.raft_extra_distance = int(key, value)?,
            "raftLineSpacing_um" => self.raft_line_spacing = int(key, value)?,

            "numberOfSkirtLoops" => self.skirt_loop_count = uint(key, value)?,
            "skirtDistance_um" => self.skirt_distance = int(key, value)?,
            "skirtMinLength_um" => self.skirt_min_length = int(key, value)?,

            "wipeTowerSize_um" => self.wipe_tower_size = int(key, value)?,
            "wipeShieldDistanceFromShapes_um" => self.wipe_shield_distance = int(key, value)?,
            "multiVolumeOverlapPercent" => {
                self.multi_volume_overlap_percent = uint(key, value)?
            }

            "retractionAmount_um" => self.retraction_amount = int(key, value)?,
            "retractionSpeed" => self.retraction_speed = int(key, value)? as i32,
            "retractionZHop" => self.retraction_z_hop = int(key, value)?,
            "retractionAmountOnExtruderSwitch_um" => {
                self.retraction_amount_extruder_switch = int(key, value)?
            }
            "minimumExtrusionBeforeRetraction_um" => {
                self.minimum_extrusion_before_retraction = int(key, value)?
            }
            "minimumTravelToCauseRetraction_um" => {
                self.minimum_travel_for_retraction = int(key, value)?
            }

            "travelSpeed" => self.travel_speed = int(key, value)? as i32,
            "infillSpeed" => self.infill_speed = int(key, value)? as i32,
            "outsidePerimeterSpeed" => self.outer_perimeter_speed = int(key, value)? as i32,
            "insidePerimetersSpeed" => self.inner_perimeter_speed = int(key, value)? as i32,
            "supportMaterialSpeed" => self.support_speed = int(key, value)? as i32,
            "firstLayerSpeed" => self.first_layer_speed = int(key, value)? as i32,
            "minimumPrintingSpeed" => self.minimum_print_speed = int(key, value)? as i32,

            "minimumLayerTimeSeconds" => {
                self.minimum_layer_time_seconds = int(key, value)? as i32
            }
            "doCoolHeadLift" => self.cool_head_lift = boolean(key, value)?,
            "fanSpeedMinPercent" => self.fan_speed_min_percent = int(key, value)? as i32,
            "fanSpeedMaxPercent" => self.fan_speed_max_percent = int(key, value)? as i32,
            "firstLayerToAllowFan" => self.first_layer_to_allow_fan = uint(key, value)?,

            "continuousSpiralOuterPerimeter" => self.spiralize = boolean(key, value)?,
            "avoidCrossingPerimeters" => self.avoid_crossing_perimeters = boolean(key, value)?,
            "repairOutlines" => self.repair_outlines = boolean(key, value)?,
            "repairOverlaps" => self.repair_overlaps = boolean(key, value)?,

            "outputType" => self.flavor = value.parse()?,
            "filamentDiameter_um" => self.filament_diameter = int(key, value)?,
            "extrusionMultiplier" => self.extrusion_multiplier = float(key, value)?,

            "modelRotationMatrix" => {
                let parts: Vec<f64> = value
                    .split(',')
                    .map(|p| float(key, p.trim()))
                    .collect::<Result<_>>()?;
                if parts.len() != 9 {
                    return Err(Error::Config(format!(
                        "modelRotationMatrix needs 9 values, got {}",
                        parts.len()
                    )));
                }
                for r in 0..3 {
                    for c in 0..3 {
                        self.model_rotation_matrix[r][c] = parts[r * 3 + c];
                    }
                }
            }
            "positionToPlaceObjectCenter_um" => {
                let parts: Vec<i64> = value
                    .split(',')
                    .map(|p| int(key, p.trim()))
                    .collect::<Result<_>>()?;
                if parts.len() != 2 {
                    return Err(Error::Config(format!(
                        "positionToPlaceObjectCenter_um needs X,Y, got {}",
                        value
                    )));
                }
                self.object_position = Point::new(parts[0], parts[1]);
            }
            "centerObjectInXy" => self.center_object_in_xy = boolean(key, value)?,
            "bottomClipAmount_um" => self.bottom_clip_amount = int(key, value)?,

            "startCode" => self.start_code = value.replace("\\n", "\n"),
            "endCode" => self.end_code = value.replace("\\n", "\n"),

            _ => {
                log::warn!("ignoring unknown setting {}", key);
            }
        }
        Ok(())
    }

    /// Pre-flight validation: reject values that make the geometry
    /// impossible before any file is touched.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: Coord) -> Result<()> {
            if v <= 0 {
                return Err(Error::Config(format!("{} must be positive, got {}", name, v)));
            }
            Ok(())
        }
        fn non_negative(name: &str, v: Coord) -> Result<()> {
            if v < 0 {
                return Err(Error::Config(format!(
                    "{} must not be negative, got {}",
                    name, v
                )));
            }
            Ok(())
        }

        positive("layerThickness_um", self.layer_thickness)?;
        positive("firstLayerThickness_um", self.first_layer_thickness)?;
        positive("extrusionWidth_um", self.extrusion_width)?;
        positive("firstLayerExtrusionWidth_um", self.first_layer_extrusion_width)?;
        positive("filamentDiameter_um", self.filament_diameter)?;
        positive("supportLineSpacing_um", self.support_line_spacing)?;
        positive("raftLineSpacing_um", self.raft_line_spacing)?;
        non_negative("retractionAmount_um", self.retraction_amount)?;
        non_negative("skirtDistance_um", self.skirt_distance)?;
        non_negative("bottomClipAmount_um", self.bottom_clip_amount)?;

        if self.infill_percent > 100 {
            return Err(Error::Config(format!(
                "infillPercent must be 0..=100, got {}",
                self.infill_percent
            )));
        }
        if self.extrusion_multiplier <= 0.0 {
            return Err(Error::Config(format!(
                "extrusionMultiplier must be positive, got {}",
                self.extrusion_multiplier
            )));
        }
        for speed in [
            self.travel_speed,
            self.infill_speed,
            self.outer_perimeter_speed,
            self.inner_perimeter_speed,
            self.support_speed,
            self.first_layer_speed,
            self.minimum_print_speed,
        ] {
            if speed <= 0 {
                return Err(Error::Config(format!("speeds must be positive, got {}", speed)));
            }
        }
        Ok(())
    }
}
