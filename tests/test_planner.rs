// Planner behavior through the command dispatcher: coordinate modes,
// relative extrusion accumulation, and combined XYZE move sequences.

use gantry::axis::Axis;
use gantry::error::{ConfigError, MoveError};
use gantry::gcode::{CommandError, GCodeDispatch};
use gantry::Configfile;

const ABC_CONFIG: &str = "\
[printer]
kinematics: cartesian_abc
max_velocity: 300
max_accel: 3000

[stepper_x]
position_min: 0
position_max: 200

[stepper_y]
position_min: 0
position_max: 200

[stepper_z]
position_min: -2
position_max: 180

[stepper_a]
position_min: 0
position_max: 100

[stepper_b]
position_min: 0
position_max: 100

[extruder]
nozzle_diameter: 0.4
filament_diameter: 1.75
max_extrude_cross_section: 50
";

const PLAIN_CONFIG: &str = "\
[printer]
kinematics: cartesian
max_velocity: 300
max_accel: 3000

[stepper_x]
position_min: 0
position_max: 200

[stepper_y]
position_min: 0
position_max: 200

[stepper_z]
position_min: -2
position_max: 180
";

fn machine(config: &str) -> GCodeDispatch {
    let cfg = Configfile::parse(config).unwrap();
    GCodeDispatch::from_config(&cfg).unwrap()
}

fn kin_position(dispatch: &GCodeDispatch) -> [f64; 7] {
    let th = dispatch.toolhead();
    let mut th = th.lock();
    th.wait_moves();
    th.kin_state().position
}

#[test]
fn combined_xyze_sequence_tracks_state() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0 E=0").unwrap();
    gd.run_line("G1 X20 Y20 F3000").unwrap();
    gd.run_line("G1 X25 Y25").unwrap();
    gd.run_line("G1 X20 Y20 Z1").unwrap();
    gd.run_line("G1 X25 Y25 E7.5").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[0] - 25.0).abs() < 1e-9);
    assert!((pos[1] - 25.0).abs() < 1e-9);
    assert!((pos[2] - 1.0).abs() < 1e-9);
    assert!((pos[Axis::E.index()] - 7.5).abs() < 1e-9);
}

#[test]
fn relative_extrusion_accumulates() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION E=0").unwrap();
    gd.run_line("G1 E5").unwrap();
    gd.run_line("G1 E-2").unwrap();
    gd.run_line("G1 E7").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[Axis::E.index()] - 10.0).abs() < 1e-9);
}

#[test]
fn absolute_extrude_mode_overrides_accumulation() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION E=0").unwrap();
    gd.run_line("M82").unwrap();
    gd.run_line("G1 E5").unwrap();
    gd.run_line("G1 E7").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[Axis::E.index()] - 7.0).abs() < 1e-9);
}

#[test]
fn relative_coordinates_accumulate() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    gd.run_line("G91").unwrap();
    gd.run_line("G1 X5").unwrap();
    gd.run_line("G1 X5 Y2").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[0] - 10.0).abs() < 1e-9);
    assert!((pos[1] - 2.0).abs() < 1e-9);
}

#[test]
fn g92_rebases_without_motion() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    gd.run_line("G1 X50").unwrap();
    gd.run_line("G92 X0").unwrap();
    // No motion happened at G92; the next absolute X is offset by 50
    gd.run_line("G1 X10").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[0] - 60.0).abs() < 1e-9);
}

#[test]
fn auxiliary_axis_moves_under_cartesian_abc() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION A=0 B=0").unwrap();
    gd.run_line("G1 A50 B25 F6000").unwrap();
    let pos = kin_position(&gd);
    assert!((pos[Axis::A.index()] - 50.0).abs() < 1e-9);
    assert!((pos[Axis::B.index()] - 25.0).abs() < 1e-9);
}

#[test]
fn undeclared_axis_word_is_config_error() {
    let mut gd = machine(PLAIN_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    match gd.run_line("G1 A10") {
        Err(CommandError::Config(ConfigError::UnknownAxis(Axis::A))) => {}
        other => panic!("expected UnknownAxis, got {:?}", other.err()),
    }
}

#[test]
fn unhomed_move_fails_and_leaves_no_state() {
    let mut gd = machine(ABC_CONFIG);
    match gd.run_line("G1 X10") {
        Err(CommandError::Move(MoveError::AxisNotHomed(Axis::X))) => {}
        other => panic!("expected AxisNotHomed, got {:?}", other.err()),
    }
    let pos = kin_position(&gd);
    assert_eq!(pos[0], 0.0);
}

#[test]
fn out_of_range_move_is_rejected_whole() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    gd.run_line("G1 X10").unwrap();
    match gd.run_line("G1 X250 Y10") {
        Err(CommandError::Move(MoveError::Rejected { axis: Axis::X, .. })) => {}
        other => panic!("expected Rejected, got {:?}", other.err()),
    }
    // The failed command changed nothing; the earlier move still lands
    let pos = kin_position(&gd);
    assert!((pos[0] - 10.0).abs() < 1e-9);
    assert_eq!(pos[1], 0.0);
}

#[test]
fn extrude_only_distance_limit_surfaces() {
    let mut gd = machine(ABC_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION E=0").unwrap();
    match gd.run_line("G1 E60") {
        Err(CommandError::Move(MoveError::ExtrudeLimit { .. })) => {}
        other => panic!("expected ExtrudeLimit, got {:?}", other.err()),
    }
}

#[test]
fn extrude_without_extruder_is_rejected() {
    let mut gd = machine(PLAIN_CONFIG);
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    match gd.run_line("G1 E5") {
        Err(CommandError::Move(MoveError::NoExtruder)) => {}
        other => panic!("expected NoExtruder, got {:?}", other.err()),
    }
}

#[test]
fn kinematic_round_trip_for_abc_model() {
    let gd = machine(ABC_CONFIG);
    let th = gd.toolhead();
    let th = th.lock();
    let kin = th.kinematics();
    let mut pos = [0.0; 7];
    pos[0] = 12.5;
    pos[1] = 180.0;
    pos[2] = 7.25;
    pos[Axis::A.index()] = 33.0;
    pos[Axis::B.index()] = 66.0;
    let actuators = kin.inverse(&pos).unwrap();
    assert_eq!(actuators.len(), 5);
    let back = kin.forward(&actuators);
    for i in 0..7 {
        assert!((back[i] - pos[i]).abs() < 1e-12);
    }
}

#[test]
fn unknown_command_is_reported() {
    let mut gd = machine(PLAIN_CONFIG);
    assert!(matches!(
        gd.run_line("M999"),
        Err(CommandError::UnknownCommand(_))
    ));
}
