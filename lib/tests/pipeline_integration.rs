//! End-to-end pipeline tests: STL files in, G-code out.

mod util;

use fff_slicer::config::Settings;
use fff_slicer::mesh::TriangleMesh;
use fff_slicer::pipeline::Session;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use util::{flip_winding, square_tube, write_binary_stl};

/// 200um layers on a 300um first layer, the reference test profile.
fn test_settings() -> Settings {
    Settings {
        layer_thickness: 200,
        first_layer_thickness: 300,
        ..Settings::default()
    }
}

fn slice_to_gcode(dir: &TempDir, meshes: &[(&str, &TriangleMesh)], settings: Settings) -> String {
    let mut inputs: Vec<PathBuf> = Vec::new();
    for (name, mesh) in meshes {
        let path = dir.path().join(name);
        write_binary_stl(&path, mesh);
        inputs.push(path);
    }
    let output = dir.path().join("out.gcode");

    let mut session = Session::new(settings, &output).unwrap();
    session.process_files(&inputs, true).unwrap();
    session.finalize().unwrap();

    fs::read_to_string(&output).unwrap()
}

#[test]
fn test_cube_layer_markers() {
    let dir = TempDir::new().unwrap();
    let cube = TriangleMesh::cube(20.0);
    let gcode = slice_to_gcode(&dir, &[("cube.stl", &cube)], test_settings());

    // floor((20000 - 300) / 200) + 1 = 99 layers
    assert!(gcode.starts_with(";Generated with fff-slicer"));
    assert!(gcode.contains(";LAYER_COUNT:99"));
    assert!(gcode.contains("\n;LAYER:0\n"));
    assert!(gcode.contains("\n;LAYER:98\n"));
    assert!(!gcode.contains("\n;LAYER:99\n"));

    assert!(gcode.contains(";TYPE:SKIRT"));
    assert!(gcode.contains(";TYPE:WALL-OUTER"));
    assert!(gcode.contains(";TYPE:WALL-INNER"));
    assert!(gcode.contains(";TYPE:FILL"));
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    let cube = TriangleMesh::cube(20.0);

    let dir_a = TempDir::new().unwrap();
    let a = slice_to_gcode(&dir_a, &[("cube.stl", &cube)], test_settings());

    let dir_b = TempDir::new().unwrap();
    let b = slice_to_gcode(&dir_b, &[("cube.stl", &cube)], test_settings());

    assert_eq!(a, b);
}

#[test]
fn test_winding_flip_is_bit_identical() {
    let cube = TriangleMesh::cube(20.0);
    let flipped = flip_winding(&cube);

    let dir_a = TempDir::new().unwrap();
    let a = slice_to_gcode(&dir_a, &[("cube.stl", &cube)], test_settings());

    let dir_b = TempDir::new().unwrap();
    let b = slice_to_gcode(&dir_b, &[("flipped.stl", &flipped)], test_settings());

    assert_eq!(a, b);
}

#[test]
fn test_spiralize_only_outer_wall_above_bottom() {
    let dir = TempDir::new().unwrap();
    let cube = TriangleMesh::cube(10.0);
    let settings = Settings {
        spiralize: true,
        bottom_layer_count: 3,
        ..test_settings()
    };
    let gcode = slice_to_gcode(&dir, &[("cube.stl", &cube)], settings);

    // Everything above the bottom layers, minus the end code
    let spiral_part = gcode.split("\n;LAYER:3\n").nth(1).unwrap();
    let spiral_part = spiral_part.split("M104").next().unwrap();

    // Above the bottom layers only the outer wall is extruded
    assert!(spiral_part.contains(";TYPE:WALL-OUTER"));
    assert!(!spiral_part.contains(";TYPE:FILL"));
    assert!(!spiral_part.contains(";TYPE:WALL-INNER"));

    // And Z never goes back down
    let mut last_z = 0.0f64;
    for line in spiral_part.lines() {
        if let Some(word) = line.split_whitespace().find(|w| w.starts_with('Z')) {
            if let Ok(z) = word[1..].parse::<f64>() {
                assert!(z >= last_z, "Z regressed from {} to {}", last_z, z);
                last_z = z;
            }
        }
    }
    assert!(last_z > 9.0);
}

#[test]
fn test_two_volumes_switch_extruders_over_wipe_tower() {
    let dir = TempDir::new().unwrap();
    let a = TriangleMesh::cube(10.0);
    let mut b = TriangleMesh::new();
    for i in 0..a.triangle_count() {
        let [v0, v1, v2] = a.triangle_vertices(i);
        let shift = fff_slicer::geometry::Point3F::new(15.0, 0.0, 0.0);
        b.add_facet(v0 + shift, v1 + shift, v2 + shift);
    }

    let settings = Settings {
        wipe_tower_size: 4_000,
        ..test_settings()
    };
    let gcode = slice_to_gcode(&dir, &[("a.stl", &a), ("b.stl", &b)], settings);

    // The extruder flips between the volumes, every layer
    assert!(gcode.matches("\nT1\n").count() >= 5);
    assert!(gcode.matches("\nT0\n").count() >= 5);
    // Extruder switches retract by the switch amount
    assert!(gcode.contains("E-14.5"));
    // The wipe tower is printed as support-role loops
    assert!(gcode.contains(";TYPE:SUPPORT"));
}

#[test]
fn test_ultigcode_header_and_no_start_code() {
    let dir = TempDir::new().unwrap();
    let cube = TriangleMesh::cube(10.0);
    let settings = Settings {
        flavor: fff_slicer::config::GCodeFlavor::UltiGCode,
        ..test_settings()
    };
    let gcode = slice_to_gcode(&dir, &[("cube.stl", &cube)], settings);

    assert!(gcode.contains(";TYPE:UltiGCode"));
    assert!(gcode.contains(";TIME:<__TIME__>"));
    assert!(gcode.contains(";MATERIAL:<FILAMENT>"));
    assert!(gcode.contains(";MATERIAL2:<FILAMEN2>"));
    // No user start/end code in UltiGCode
    assert!(!gcode.contains("M109"));
    // Firmware retraction
    assert!(gcode.contains("\nG10\n"));
    assert!(gcode.contains("\nG11\n"));
}

#[test]
fn test_second_object_travels_above_the_first() {
    let dir = TempDir::new().unwrap();
    let cube = TriangleMesh::cube(20.0);
    let path = dir.path().join("cube.stl");
    write_binary_stl(&path, &cube);
    let output = dir.path().join("out.gcode");

    let mut session = Session::new(test_settings(), &output).unwrap();
    session.process_files(&[&path], true).unwrap();
    session.process_files(&[&path], false).unwrap();
    session.finalize().unwrap();

    let gcode = fs::read_to_string(&output).unwrap();
    assert_eq!(gcode.matches("\n;LAYER:0\n").count(), 2);
    // Object top is 300 + 98*200 = 19900um; safe travel 5mm above it
    assert!(gcode.contains("Z24.900"));
}

#[test]
fn test_raft_is_emitted_below_the_model() {
    let dir = TempDir::new().unwrap();
    let cube = TriangleMesh::cube(10.0);
    let settings = Settings {
        enable_raft: true,
        ..test_settings()
    };
    let gcode = slice_to_gcode(&dir, &[("cube.stl", &cube)], settings);

    let raft_pos = gcode.find(";RAFT").unwrap();
    let layer0_pos = gcode.find(";LAYER:0").unwrap();
    assert!(raft_pos < layer0_pos);

    // Raft replaces the skirt
    assert!(!gcode.contains(";TYPE:SKIRT"));
}

#[test]
fn test_hollow_box_insets() {
    // Library-level check of the hollow box: one part, one hole,
    // two perimeters -> four wall loops per layer.
    use fff_slicer::mesh::{place_volumes, IndexedMesh, Transform};
    use fff_slicer::perimeter::generate_insets;
    use fff_slicer::slice::{create_layer_parts, slice_volume};

    let settings = test_settings();
    let tube = square_tube(20.0, 10.0, 10.0);
    let transform = Transform::default();
    let mut indexed = IndexedMesh::build(&tube, &transform).unwrap();
    place_volumes(std::slice::from_mut(&mut indexed), &transform);

    let raw = slice_volume(&indexed, &settings, indexed.max().z).unwrap();
    let mut volume = create_layer_parts(raw, &settings);

    for layer in &mut volume.layers {
        assert_eq!(layer.parts.len(), 1, "layer {}", layer.index);
        let part = &mut layer.parts[0];
        assert_eq!(part.outline.holes.len(), 1, "layer {}", layer.index);

        generate_insets(part, settings.extrusion_width, 2);
        assert_eq!(part.insets.len(), 2);
        let loops: usize = part
            .insets
            .iter()
            .flat_map(|level| level.iter())
            .map(|ex| 1 + ex.holes.len())
            .sum();
        assert_eq!(loops, 4, "layer {}", layer.index);
    }
}

#[test]
fn test_support_appears_under_overhang_only() {
    // A 10mm cube floating 5mm in the air next to a grounded pillar:
    // the layers below the cube need support, the layers through it
    // do not.
    use fff_slicer::geometry::Point3F;

    let cube = TriangleMesh::cube(10.0);
    let mut mesh = TriangleMesh::new();
    for i in 0..cube.triangle_count() {
        let [v0, v1, v2] = cube.triangle_vertices(i);
        let lift = Point3F::new(0.0, 0.0, 5.0);
        mesh.add_facet(v0 + lift, v1 + lift, v2 + lift);
    }
    // A grounded 2mm pillar so the model starts at the plate
    let pillar = TriangleMesh::cuboid(2.0, 2.0, 15.0);
    for i in 0..pillar.triangle_count() {
        let [v0, v1, v2] = pillar.triangle_vertices(i);
        let shift = Point3F::new(20.0, 0.0, 0.0);
        mesh.add_facet(v0 + shift, v1 + shift, v2 + shift);
    }

    let dir = TempDir::new().unwrap();
    let settings = Settings {
        support_extruder: 0,
        support_angle_degrees: 45,
        ..test_settings()
    };
    let gcode = slice_to_gcode(&dir, &[("overhang.stl", &mesh)], settings);

    let layer = |n: usize| -> &str {
        let marker = format!("\n;LAYER:{}\n", n);
        let rest = gcode.split(&marker).nth(1).unwrap();
        rest.split("\n;LAYER:").next().unwrap()
    };

    // Below the cube: support, and only the pillar's walls
    assert!(layer(5).contains(";TYPE:SUPPORT"));
    // Through the cube: walls but no support
    assert!(layer(40).contains(";TYPE:WALL-OUTER"));
    assert!(!layer(40).contains(";TYPE:SUPPORT"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.gcode");
    let mut session = Session::new(test_settings(), &output).unwrap();
    let missing = dir.path().join("missing.stl");
    assert!(session.process_files(&[&missing], true).is_err());
}
