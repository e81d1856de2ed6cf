// Probing flows through the command dispatcher: MULTIPROBE2 vector
// probing, miss handling, and the kinematic-state handoff after a report.

use gantry::axis::Axis;
use gantry::endstop::{AxisTrigger, StaticPin};
use gantry::error::{ConfigError, ProbeError};
use gantry::gcode::{CommandError, GCodeDispatch};
use gantry::Configfile;

const CONFIG: &str = "\
[printer]
kinematics: cartesian
max_velocity: 300
max_accel: 3000

[stepper_x]
position_min: 0
position_max: 200
endstop_pin: ^PC2
position_endstop: 0

[stepper_y]
position_min: 0
position_max: 200
endstop_pin: ^PC3
position_endstop: 0

[stepper_z]
position_min: -2
position_max: 180
endstop_pin: ^PC4
position_endstop: 0

[extruder]
nozzle_diameter: 0.4
filament_diameter: 1.75
max_extrude_cross_section: 50

[probe p200]
pin: !PB1
z_offset: 0.5
recovery_time: 0.4

[probe bed]
pin: PB2
z_offset: 1.0
";

fn machine() -> GCodeDispatch {
    let cfg = Configfile::parse(CONFIG).unwrap();
    GCodeDispatch::from_config(&cfg).unwrap()
}

#[test]
fn multiprobe_vector_reports_partway_trigger() {
    let mut gd = machine();
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=0").unwrap();
    // Surface contact asserts once Z drops to -0.4
    gd.probe_mut("p200").unwrap().set_pin(Box::new(AxisTrigger {
        axis: Axis::Z,
        trigger_at: -0.4,
        positive_dir: false,
    }));
    gd.run_line("MULTIPROBE2 PROBE_NAME=p200 Z=-1 X=1 F=5000")
        .unwrap();

    let result = gd.last_probe().unwrap().clone();
    // Trigger strictly between start and start+vector on both axes
    assert!(result.trigger[2] < 0.0 && result.trigger[2] > -1.0);
    assert!(result.trigger[0] > 0.0 && result.trigger[0] < 1.0);
    assert!((result.trigger[2] - (-0.4)).abs() < 0.1);
    // Reported Z subtracts the probe's z_offset
    assert!((result.position[2] - (result.trigger[2] - 0.5)).abs() < 1e-9);

    let th = gd.toolhead();
    let th = th.lock();
    assert!(th.is_trusted(Axis::Z));
    assert!((th.kin_state().position[2] - result.position[2]).abs() < 1e-9);
}

#[test]
fn probe_miss_surfaces_as_error() {
    let mut gd = machine();
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=5").unwrap();
    // The bed probe's pin is never attached, so it cannot assert
    match gd.run_line("MULTIPROBE2 PROBE_NAME=bed Z=-1") {
        Err(CommandError::Probe(ProbeError::Miss { probe })) => assert_eq!(probe, "bed"),
        other => panic!("expected Miss, got {:?}", other.err()),
    }
    assert!(gd.last_probe().is_none());
}

#[test]
fn unknown_probe_is_config_error() {
    let mut gd = machine();
    match gd.run_line("MULTIPROBE2 PROBE_NAME=ghost Z=-1") {
        Err(CommandError::Config(ConfigError::UnknownProbe(name))) => assert_eq!(name, "ghost"),
        other => panic!("expected UnknownProbe, got {:?}", other.err()),
    }
}

#[test]
fn asserted_probe_fails_before_motion() {
    let mut gd = machine();
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=5").unwrap();
    gd.probe_mut("bed").unwrap().set_pin(Box::new(StaticPin(true)));
    match gd.run_line("MULTIPROBE2 PROBE_NAME=bed Z=-1") {
        Err(CommandError::Probe(ProbeError::TriggeredPriorToMovement { probe })) => {
            assert_eq!(probe, "bed")
        }
        other => panic!("expected TriggeredPriorToMovement, got {:?}", other.err()),
    }
    let th = gd.toolhead();
    let th = th.lock();
    assert_eq!(th.kin_state().position[2], 5.0);
}

#[test]
fn probe_result_feeds_status_and_follow_up_moves() {
    let mut gd = machine();
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=2").unwrap();
    gd.probe_mut("bed").unwrap().set_pin(Box::new(AxisTrigger {
        axis: Axis::Z,
        trigger_at: 0.2,
        positive_dir: false,
    }));
    gd.run_line("MULTIPROBE2 PROBE_NAME=bed Z=-3").unwrap();
    let reported_z = gd.last_probe().unwrap().position[2];
    assert!((reported_z - (0.2 - 1.0)).abs() < 0.1);

    let status = gd.get_status();
    assert_eq!(status["last_probe"]["probe"], "bed");

    // Z is trusted at the reported value; an ordinary move works from there
    gd.run_line("G1 Z10 F600").unwrap();
    let th = gd.toolhead();
    let mut th = th.lock();
    th.wait_moves();
    assert!((th.kin_state().position[2] - 10.0).abs() < 1e-9);
}

#[test]
fn probes_keep_distinct_identities() {
    let mut gd = machine();
    gd.run_line("SET_KINEMATIC_POSITION X=0 Y=0 Z=2").unwrap();
    gd.probe_mut("p200").unwrap().set_pin(Box::new(AxisTrigger {
        axis: Axis::Z,
        trigger_at: 0.5,
        positive_dir: false,
    }));
    gd.probe_mut("bed").unwrap().set_pin(Box::new(AxisTrigger {
        axis: Axis::X,
        trigger_at: 3.0,
        positive_dir: true,
    }));
    gd.run_line("MULTIPROBE2 PROBE_NAME=p200 Z=-3").unwrap();
    let first_z = gd.last_probe().unwrap().position[2];
    gd.run_line("MULTIPROBE2 PROBE_NAME=bed X=5").unwrap();
    let second = gd.last_probe().unwrap().clone();
    assert_eq!(second.probe, "bed");
    assert!(second.trigger[0] >= 3.0 && second.trigger[0] < 5.0);
    // The earlier Z measurement is untouched by the X probe
    let th = gd.toolhead();
    let th = th.lock();
    assert!((th.kin_state().position[2] - first_z).abs() < 1e-9);
}
