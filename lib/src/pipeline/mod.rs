//! Print pipeline orchestration.
//!
//! A [`Session`] owns the G-code writer for one output file and
//! processes objects into it one after another:
//!
//! 1. prepare the model: load, rotate, place, index, slice, partition,
//!    generate the support grid
//! 2. process slice data: insets, wipe structures, skins, sparse
//!    regions, bridge angles, skirt and raft outlines
//! 3. write G-code layer by layer in a fixed order: raft, skirt,
//!    wipe shield, support (possibly first), volumes in round-robin,
//!    wipe tower on every extruder change
//! 4. finalize: end code, flush, sync
//!
//! Subsequent objects are reached by lifting 5mm above everything
//! printed so far and traveling to the new object's origin.

use crate::adhesion;
use crate::bridge;
use crate::clipper;
use crate::config::{GCodeFlavor, InfillType, Settings, SupportType};
use crate::gcode::{cooling, GCodePlanner, GCodeWriter, PathConfig, PathOrderOptimizer, PathRole};
use crate::geometry::{ExPolygons, Point, Polygons};
use crate::infill;
use crate::mesh::{load_stl, place_volumes, IndexedMesh, Transform};
use crate::perimeter;
use crate::skin;
use crate::slice::{self, SliceStorage};
use crate::support::{self, SupportGrid};
use crate::wipe;
use crate::{Coord, CoordF, Error, Result, VERSION};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// One slicing session: a writer plus the state that carries across
/// multiple objects written to the same file.
pub struct Session {
    settings: Settings,
    gcode: GCodeWriter<BufWriter<File>>,
    max_object_height: Coord,
}

impl Session {
    /// Validate the settings and open the output file.
    pub fn new<P: AsRef<Path>>(settings: Settings, output: P) -> Result<Self> {
        settings.validate()?;
        let gcode = GCodeWriter::create(output, settings.flavor)?;
        Ok(Self {
            settings,
            gcode,
            max_object_height: 0,
        })
    }

    /// Process one object into the output file. All `inputs` become
    /// volumes of the same object, one extruder per volume.
    /// `first_file` distinguishes the very first object from
    /// subsequent ones, which need a safe travel move first.
    pub fn process_files<P: AsRef<Path>>(&mut self, inputs: &[P], first_file: bool) -> Result<()> {
        let mut storage = self.prepare_model(inputs)?;
        self.process_slice_data(&mut storage);
        self.write_gcode(&storage, first_file)?;
        Ok(())
    }

    /// Write the end code and sync the file.
    pub fn finalize(&mut self) -> Result<()> {
        self.gcode.write_fan_command(0)?;
        self.gcode.write_retraction(true)?;
        if self.settings.flavor != GCodeFlavor::UltiGCode {
            let end_code = self.settings.end_code.clone();
            self.gcode.write_code(&end_code)?;
        }
        info!("filament used: {:.2}", self.gcode.total_filament());
        self.gcode.sync()
    }

    /// Load, place, slice and partition the input meshes.
    fn prepare_model<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<SliceStorage> {
        if inputs.is_empty() {
            return Err(Error::Config("no input files given".into()));
        }

        let settings = &self.settings;
        let transform = Transform {
            matrix: settings.model_rotation_matrix,
            position: settings.object_position,
            center_in_xy: settings.center_object_in_xy,
            bottom_clip: settings.bottom_clip_amount,
        };

        let mut meshes: Vec<IndexedMesh> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mesh = load_stl(input)?;
            info!(
                "loaded {} ({} triangles)",
                input.as_ref().display(),
                mesh.triangle_count()
            );
            meshes.push(IndexedMesh::build(&mesh, &transform)?);
        }
        place_volumes(&mut meshes, &transform);

        let mut storage = SliceStorage::default();
        storage.model_min = meshes[0].min();
        storage.model_max = meshes[0].max();
        for mesh in &meshes[1..] {
            let (min, max) = (mesh.min(), mesh.max());
            storage.model_min.x = storage.model_min.x.min(min.x);
            storage.model_min.y = storage.model_min.y.min(min.y);
            storage.model_min.z = storage.model_min.z.min(min.z);
            storage.model_max.x = storage.model_max.x.max(max.x);
            storage.model_max.y = storage.model_max.y.max(max.y);
            storage.model_max.z = storage.model_max.z.max(max.z);
        }

        let model_height = storage.model_max.z;
        let mut raw_volumes = Vec::with_capacity(meshes.len());
        for mesh in &meshes {
            raw_volumes.push(slice::slice_volume(mesh, settings, model_height)?);
        }

        if settings.multi_volume_overlap_percent > 0 {
            let overlap =
                settings.extrusion_width * settings.multi_volume_overlap_percent as Coord / 100;
            slice::apply_multi_volume_overlap(&mut raw_volumes, overlap);
        }

        for raw in raw_volumes {
            storage
                .volumes
                .push(slice::create_layer_parts(raw, settings));
        }
        info!(
            "sliced {} volumes into {} layers",
            storage.volumes.len(),
            storage.layer_count()
        );

        if settings.support_enabled() {
            storage.support = Some(SupportGrid::generate(&meshes, settings));
        }

        Ok(storage)
    }

    /// Derive everything printable from the sliced outlines.
    fn process_slice_data(&self, storage: &mut SliceStorage) {
        let settings = &self.settings;

        for volume in &mut storage.volumes {
            for layer in &mut volume.layers {
                let count = perimeter::inset_count_for_layer(
                    settings.perimeter_count,
                    layer.index,
                    settings.spiralize,
                    settings.bottom_layer_count,
                );
                let width = if layer.index == 0 {
                    settings.first_layer_extrusion_width
                } else {
                    settings.extrusion_width
                };
                for part in &mut layer.parts {
                    perimeter::generate_insets(part, width, count);
                }
            }
        }

        wipe::generate_wipe_shield(storage, settings);
        wipe::generate_wipe_tower(storage, settings);

        for volume in &mut storage.volumes {
            skin::generate_skins(volume, settings);
            bridge::assign_bridge_angles(volume);
        }

        // First-layer base region for skirt and raft
        let mut base = storage.layer_outlines(0);
        if let Some(tower) = &storage.wipe_tower {
            base.push(tower.clone().into());
        }
        if let Some(grid) = &storage.support {
            let first_z = settings.first_layer_thickness;
            base.extend(support::layer_support_polygons(
                grid,
                first_z,
                &storage.layer_outlines(0),
                settings,
            ));
        }
        let base = clipper::union_ex(&base);

        if settings.enable_raft {
            storage.raft_outline = adhesion::generate_raft_outline(&base, settings);
        } else {
            storage.skirt = adhesion::generate_skirt(&base, settings);
        }
    }

    /// Emit the object's layers.
    fn write_gcode(&mut self, storage: &SliceStorage, first_file: bool) -> Result<()> {
        let s = self.settings.clone();
        let gcode = &mut self.gcode;
        let total_layers = storage.layer_count();

        if first_file {
            gcode.write_comment(&format!("Generated with fff-slicer {}", VERSION))?;
            if s.flavor == GCodeFlavor::UltiGCode {
                gcode.write_comment("TYPE:UltiGCode")?;
                gcode.write_comment("TIME:<__TIME__>")?;
                gcode.write_comment("MATERIAL:<FILAMENT>")?;
                gcode.write_comment("MATERIAL2:<FILAMEN2>")?;
            } else {
                gcode.write_code(&s.start_code)?;
            }
            gcode.set_retraction_settings(
                s.retraction_amount,
                s.retraction_speed,
                s.retraction_amount_extruder_switch,
                s.minimum_extrusion_before_retraction,
                s.retraction_z_hop,
            )?;
        } else {
            // Clear everything printed so far, then come down on the
            // new object's origin
            gcode.write_fan_command(0)?;
            gcode.write_retraction(true)?;
            gcode.reset_extrusion_value()?;
            gcode.set_z(self.max_object_height + 5_000);
            gcode.write_move(gcode.position(), s.travel_speed, 0)?;
            let origin = Point::new(storage.model_min.x, storage.model_min.y);
            gcode.write_move(origin, s.travel_speed, 0)?;
        }

        let raft_offset = s.raft_total_thickness();
        if s.enable_raft && !storage.raft_outline.is_empty() {
            write_raft(gcode, storage, &s)?;
        }

        gcode.write_comment(&format!("LAYER_COUNT:{}", total_layers))?;

        let mut volume_idx = 0usize;
        for layer_idx in 0..total_layers {
            gcode.write_comment(&format!("LAYER:{}", layer_idx))?;

            let thickness = if layer_idx == 0 {
                s.first_layer_thickness
            } else {
                s.layer_thickness
            };
            let print_z = s.first_layer_thickness + layer_idx as Coord * s.layer_thickness;
            gcode.set_z(print_z + raft_offset);
            gcode.set_extrusion(thickness, s.filament_diameter, s.extrusion_multiplier);

            let mut planner = GCodePlanner::new(
                gcode.position(),
                gcode.extruder(),
                s.travel_speed,
                s.minimum_travel_for_retraction,
            );

            let configs = LayerConfigs::for_layer(&s, layer_idx);

            if layer_idx == 0 && !storage.skirt.is_empty() {
                planner.add_polygons_by_optimizer(&storage.skirt, configs.skirt);
            }

            if let Some(shield) = storage.wipe_shield.get(layer_idx) {
                if !shield.is_empty() {
                    planner.set_always_retract(true);
                    let rings: Polygons =
                        shield.iter().flat_map(|ex| ex.all_rings().cloned()).collect();
                    planner.add_polygons_by_optimizer(&rings, configs.skirt);
                    planner.set_always_retract(false);
                }
            }

            let support_first = storage.support.is_some()
                && s.support_extruder >= 0
                && s.support_extruder as usize == planner.extruder();
            if support_first {
                add_support_layer(&s, storage, &mut planner, layer_idx, &configs);
            }

            for volume_count in 0..storage.volumes.len() {
                if volume_count > 0 {
                    volume_idx = (volume_idx + 1) % storage.volumes.len();
                }
                add_volume_layer(&s, storage, &mut planner, volume_idx, layer_idx, &configs);
            }

            if !support_first {
                add_support_layer(&s, storage, &mut planner, layer_idx, &configs);
            }

            planner
                .force_minimum_layer_time(s.minimum_layer_time_seconds as CoordF, s.minimum_print_speed);
            let fan = cooling::fan_percent(&s, planner.extrude_factor_percent(), layer_idx);
            gcode.write_fan_command(fan)?;
            planner.write_gcode(gcode, thickness, s.cool_head_lift)?;
        }

        let object_top = s.first_layer_thickness
            + (total_layers.saturating_sub(1)) as Coord * s.layer_thickness
            + raft_offset;
        self.max_object_height = self.max_object_height.max(object_top);
        Ok(())
    }
}

/// Per-layer path configs: the first layer overrides speeds and width.
struct LayerConfigs {
    skirt: PathConfig,
    wall_outer: PathConfig,
    wall_inner: PathConfig,
    fill: PathConfig,
    support: PathConfig,
    line_width: Coord,
}

impl LayerConfigs {
    fn for_layer(s: &Settings, layer_idx: usize) -> Self {
        let width = if layer_idx == 0 {
            s.first_layer_extrusion_width
        } else {
            s.extrusion_width
        };
        let speed = |v: i32| if layer_idx == 0 { s.first_layer_speed } else { v };

        Self {
            skirt: PathConfig::new(s.first_layer_speed, width, PathRole::Skirt),
            wall_outer: PathConfig::new(speed(s.outer_perimeter_speed), width, PathRole::WallOuter),
            wall_inner: PathConfig::new(speed(s.inner_perimeter_speed), width, PathRole::WallInner),
            fill: PathConfig::new(speed(s.infill_speed), width, PathRole::Fill),
            support: PathConfig::new(speed(s.support_speed), width, PathRole::Support),
            line_width: width,
        }
    }
}

/// Queue one volume's parts on one layer.
fn add_volume_layer(
    s: &Settings,
    storage: &SliceStorage,
    planner: &mut GCodePlanner,
    volume_idx: usize,
    layer_idx: usize,
    configs: &LayerConfigs,
) {
    let Some(layer) = storage.volumes[volume_idx].layers.get(layer_idx) else {
        return;
    };
    if layer.parts.is_empty() {
        return;
    }

    if planner.set_extruder(volume_idx) {
        add_wipe_tower(s, storage, planner, layer_idx);
    }

    // Nearest part first
    let mut order = PathOrderOptimizer::new(planner.position());
    for part in &layer.parts {
        order.add_polygon(part.outline.contour.points());
    }
    order.optimize();

    let spiral_layer = s.spiralize && (layer_idx as u32) >= s.bottom_layer_count;

    for &part_idx in &order.poly_order {
        let part = &layer.parts[part_idx];

        if s.avoid_crossing_perimeters {
            planner.set_comb_boundary(Some(&part.comb_boundary));
            planner.move_inside_comb_boundary();
        } else {
            planner.set_always_retract(true);
        }

        if spiral_layer {
            // Vase mode: only the outer wall, with a continuous Z rise
            if let Some(inset0) = part.insets.first() {
                let mut config = configs.wall_outer;
                config.spiralize = true;
                let rings: Polygons =
                    inset0.iter().flat_map(|ex| ex.all_rings().cloned()).collect();
                planner.add_polygons_by_optimizer(&rings, config);
            }
        } else {
            // Walls from the inside out, the visible wall last
            for inset_idx in (0..part.insets.len()).rev() {
                let config = if inset_idx == 0 {
                    configs.wall_outer
                } else {
                    configs.wall_inner
                };
                let rings: Polygons = part.insets[inset_idx]
                    .iter()
                    .flat_map(|ex| ex.all_rings().cloned())
                    .collect();
                planner.add_polygons_by_optimizer(&rings, config);
            }

            // Skin, extruded along the bridge direction when present
            if !part.skin_outline.is_empty() {
                let skin_angle = part
                    .bridge_angle
                    .unwrap_or(if layer_idx % 2 == 0 { 45 } else { 135 });
                let skin_lines = infill::generate_line_infill(
                    &part.skin_outline,
                    configs.line_width,
                    skin_angle,
                    s.infill_extend_into_perimeter,
                );
                planner.add_lines_by_optimizer(&skin_lines, configs.fill);
            }

            // Sparse interior
            if let Some(line_distance) = s.infill_line_distance() {
                if !part.sparse_outline.is_empty() {
                    let angle = match s.infill_type {
                        InfillType::Lines => {
                            s.infill_starting_angle + 90 * (layer_idx as i32 % 2)
                        }
                        InfillType::Grid => s.infill_starting_angle,
                    };
                    let lines = infill::generate_infill(
                        s.infill_type,
                        &part.sparse_outline,
                        line_distance,
                        angle,
                        s.infill_extend_into_perimeter,
                    );
                    planner.add_lines_by_optimizer(&lines, configs.fill);
                }
            }
        }

        planner.set_comb_boundary(None);
        planner.set_always_retract(false);
    }
}

/// Queue the support islands of one layer.
fn add_support_layer(
    s: &Settings,
    storage: &SliceStorage,
    planner: &mut GCodePlanner,
    layer_idx: usize,
    configs: &LayerConfigs,
) {
    let Some(grid) = &storage.support else { return };
    if s.support_extruder < 0 {
        return;
    }

    let print_z = s.first_layer_thickness + layer_idx as Coord * s.layer_thickness;
    let islands = support::layer_support_polygons(
        grid,
        print_z,
        &storage.layer_outlines(layer_idx),
        s,
    );
    if islands.is_empty() {
        return;
    }

    if planner.set_extruder(s.support_extruder as usize) {
        add_wipe_tower(s, storage, planner, layer_idx);
    }

    planner.set_comb_boundary(None);
    planner.set_always_retract(true);

    let rings: Polygons = islands.iter().flat_map(|ex| ex.all_rings().cloned()).collect();
    planner.add_polygons_by_optimizer(&rings, configs.support);

    let lines = match s.support_type {
        SupportType::Grid => {
            infill::generate_grid_infill(&islands, s.support_line_spacing, 0, 0)
        }
        SupportType::Lines => {
            let angle = if layer_idx % 2 == 0 { 0 } else { 90 };
            infill::generate_line_infill(&islands, s.support_line_spacing, angle, 0)
        }
    };
    planner.add_lines_by_optimizer(&lines, configs.support);
    planner.set_always_retract(false);
}

/// Queue the wipe tower after an extruder change, ending on the wipe
/// point so the fresh nozzle is cleaned off the print.
fn add_wipe_tower(
    s: &Settings,
    storage: &SliceStorage,
    planner: &mut GCodePlanner,
    layer_idx: usize,
) {
    let Some(tower) = &storage.wipe_tower else { return };

    let config = PathConfig::new(s.support_speed, s.extrusion_width, PathRole::Support);
    planner.set_comb_boundary(None);
    planner.add_polygons_by_optimizer(std::slice::from_ref(tower), config);

    let region: ExPolygons = vec![tower.clone().into()];
    let angle = if layer_idx % 2 == 0 { 45 } else { 135 };
    let lines = infill::generate_line_infill(&region, s.extrusion_width, angle, 0);
    planner.add_lines_by_optimizer(&lines, config);

    planner.add_travel(storage.wipe_point);
}

/// Emit the raft below the first layer: a thick base, an interface
/// layer, and the configured surface layers.
fn write_raft(
    gcode: &mut GCodeWriter<BufWriter<File>>,
    storage: &SliceStorage,
    s: &Settings,
) -> Result<()> {
    let rings: Polygons = storage
        .raft_outline
        .iter()
        .flat_map(|ex| ex.all_rings().cloned())
        .collect();

    let mut z = 0;
    let raft_layers: Vec<(Coord, Coord, i32, Coord)> = {
        // (thickness, line spacing, angle, line width) per raft layer
        let mut layers = vec![
            (
                s.raft_base_thickness,
                s.raft_line_spacing,
                0,
                s.first_layer_extrusion_width,
            ),
            (
                s.raft_interface_thickness,
                s.raft_line_spacing,
                90,
                s.extrusion_width,
            ),
        ];
        for i in 0..s.raft_surface_layers {
            layers.push((
                s.raft_surface_thickness,
                s.extrusion_width,
                if i % 2 == 0 { 0 } else { 90 },
                s.extrusion_width,
            ));
        }
        layers
    };

    for (thickness, spacing, angle, line_width) in raft_layers {
        z += thickness;
        gcode.write_comment("RAFT")?;
        gcode.set_z(z);
        gcode.set_extrusion(thickness, s.filament_diameter, s.extrusion_multiplier);

        let mut planner = GCodePlanner::new(
            gcode.position(),
            gcode.extruder(),
            s.travel_speed,
            s.minimum_travel_for_retraction,
        );
        let config = PathConfig::new(s.support_speed, line_width, PathRole::Support);
        planner.add_polygons_by_optimizer(&rings, config);

        let lines = infill::generate_line_infill(
            &storage.raft_outline,
            spacing,
            angle,
            s.infill_extend_into_perimeter,
        );
        planner.add_lines_by_optimizer(&lines, config);
        planner.write_gcode(gcode, thickness, false)?;
    }

    Ok(())
}
