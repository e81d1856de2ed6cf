// Logical axis space: the seven degrees of freedom this host can drive
// (X/Y/Z, auxiliary A/B/C linear axes, and the extruder axis E), with their
// travel limits and homing metadata.

use crate::error::ConfigError;
use std::fmt;

pub const AXIS_COUNT: usize = 7;

/// Position vector covering every logical axis. Indexed via `Axis::index`.
pub type Pos = [f64; AXIS_COUNT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
    A,
    B,
    C,
    E,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::A,
        Axis::B,
        Axis::C,
        Axis::E,
    ];

    /// Kinematic axes in toolhead order, excluding the extruder.
    pub const KINEMATIC: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::A => 3,
            Axis::B => 4,
            Axis::C => 5,
            Axis::E => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::A => "A",
            Axis::B => "B",
            Axis::C => "C",
            Axis::E => "E",
        }
    }

    pub fn from_name(name: &str) -> Option<Axis> {
        match name.to_ascii_uppercase().as_str() {
            "X" => Some(Axis::X),
            "Y" => Some(Axis::Y),
            "Z" => Some(Axis::Z),
            "A" => Some(Axis::A),
            "B" => Some(Axis::B),
            "C" => Some(Axis::C),
            "E" => Some(Axis::E),
            _ => None,
        }
    }

    pub fn is_extruder(self) -> bool {
        self == Axis::E
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Homing metadata for one axis, read from its config section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingParams {
    /// Machine coordinate assigned to the axis once the endstop triggers.
    pub position_endstop: f64,
    /// Coarse approach speed (mm/s).
    pub speed: f64,
    /// Fine re-approach speed (mm/s).
    pub second_homing_speed: f64,
    /// Distance backed off between the two passes; zero skips the fine pass.
    pub retract_dist: f64,
    /// Whether homing drives toward positive travel.
    pub positive_dir: bool,
}

/// Travel range and homing declaration for one axis.
///
/// The endstop position is allowed to sit outside [position_min,
/// position_max]; extruder-style axes rely on that. position_min <=
/// position_max always holds (enforced at config time).
#[derive(Debug, Clone, PartialEq)]
pub struct AxisParams {
    pub position_min: f64,
    pub position_max: f64,
    pub endstop_pin: Option<String>,
    pub homing: Option<HomingParams>,
}

impl AxisParams {
    pub fn range(&self) -> (f64, f64) {
        (self.position_min, self.position_max)
    }
}

/// Read-only registry of declared axes. Built once from the config and
/// consumed by the kinematics, the planner and both sequencers.
#[derive(Debug, Default)]
pub struct AxisSpace {
    axes: [Option<AxisParams>; AXIS_COUNT],
}

impl AxisSpace {
    pub fn new() -> Self {
        AxisSpace {
            axes: Default::default(),
        }
    }

    pub fn declare(&mut self, axis: Axis, params: AxisParams) {
        self.axes[axis.index()] = Some(params);
    }

    pub fn is_declared(&self, axis: Axis) -> bool {
        self.axes[axis.index()].is_some()
    }

    pub fn params(&self, axis: Axis) -> Result<&AxisParams, ConfigError> {
        self.axes[axis.index()]
            .as_ref()
            .ok_or(ConfigError::UnknownAxis(axis))
    }

    pub fn axis_limits(&self, axis: Axis) -> Result<(f64, f64), ConfigError> {
        self.params(axis).map(AxisParams::range)
    }

    pub fn homing_params(&self, axis: Axis) -> Result<&HomingParams, ConfigError> {
        self.params(axis)?
            .homing
            .as_ref()
            .ok_or(ConfigError::NotHomeable(axis))
    }

    pub fn is_homeable(&self, axis: Axis) -> bool {
        self.axes[axis.index()]
            .as_ref()
            .map_or(false, |p| p.homing.is_some())
    }

    /// Declared axes in toolhead order.
    pub fn declared(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.iter().copied().filter(|a| self.is_declared(*a))
    }
}
