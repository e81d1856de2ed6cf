// Error taxonomy for the motion core. Every failure is scoped to the
// offending command; nothing here is fatal to the process.

use crate::axis::Axis;
use thiserror::Error;

/// Raised while building the machine from its configuration, or when a
/// command references an axis/probe/extruder that was never declared.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("section [{0}] not found in config")]
    SectionNotFound(String),
    #[error("option '{option}' in section [{section}] must be specified")]
    OptionNotFound { section: String, option: String },
    #[error("option '{option}' in section [{section}]: {reason}")]
    InvalidValue {
        section: String,
        option: String,
        reason: String,
    },
    #[error("axis {0} is not configured")]
    UnknownAxis(Axis),
    #[error("axis {0} is not homeable (no endstop configured)")]
    NotHomeable(Axis),
    #[error("unknown probe '{0}'")]
    UnknownProbe(String),
    #[error("'{0}' is not a valid extruder")]
    UnknownExtruder(String),
}

/// Rejections surfaced by `submit_move`. Queue state from prior successful
/// moves is unaffected; nothing is clamped or partially executed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MoveError {
    #[error("move out of range: {axis} {target:.3} (limits {min:.3} to {max:.3})")]
    Rejected {
        axis: Axis,
        target: f64,
        min: f64,
        max: f64,
    },
    #[error("actuator for {axis} out of range: {target:.3} (limits {min:.3} to {max:.3})")]
    KinematicLimit {
        axis: Axis,
        target: f64,
        min: f64,
        max: f64,
    },
    #[error("extrude only move too long ({distance:.3}mm vs {max:.3}mm)")]
    ExtrudeLimit { distance: f64, max: f64 },
    #[error("move exceeds maximum extrusion ({area:.3}mm^2 vs {max:.3}mm^2)")]
    ExtrudeCrossSection { area: f64, max: f64 },
    #[error("must home axis {0} first")]
    AxisNotHomed(Axis),
    #[error("axis {0} is owned by an active homing/probing session")]
    AxisBusy(Axis),
    #[error("extrude requested but no extruder is configured")]
    NoExtruder,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HomingError {
    #[error("no trigger on {axis} endstop after full movement")]
    Timeout { axis: Axis },
    #[error("endstop on {axis} still triggered after retract")]
    EndstopStillTriggered { axis: Axis },
    #[error("axis {0} is owned by an active homing/probing session")]
    AxisBusy(Axis),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("probe '{probe}' ended without trigger after full movement")]
    Miss { probe: String },
    #[error("probe '{probe}' triggered prior to movement")]
    TriggeredPriorToMovement { probe: String },
    #[error("probe move has no displacement")]
    EmptyVector,
    #[error("axis {0} is owned by an active homing/probing session")]
    AxisBusy(Axis),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
