// Multi-axis motion control host core.
//
// The crate resolves logical axis moves (X/Y/Z, auxiliary A/B/C, extruder)
// into validated, velocity-profiled queued moves under a pluggable
// kinematic model, sequences two-speed endstop homing per axis, and runs
// the multi-stage vector probing protocol. Transport, step generation and
// heater control live outside this crate.

pub mod axis;
pub mod configfile;
pub mod endstop;
pub mod error;
pub mod extruder;
pub mod gcode;
pub mod homing;
pub mod kinematics;
pub mod probe;
pub mod toolhead;

pub use axis::{Axis, AxisSpace, Pos};
pub use configfile::Configfile;
pub use error::{ConfigError, HomingError, MoveError, ProbeError};
pub use gcode::{Command, CommandError, GCodeDispatch};
pub use kinematics::KinematicModel;
pub use probe::{Probe, ProbeResult};
pub use toolhead::{MoveRequest, ToolHead};
