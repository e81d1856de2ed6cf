// Pluggable kinematic models. The variant set is closed and dispatched by
// exhaustive matching; adding a geometry (corexy, delta) means adding a
// variant and the compiler points at every site that must learn about it.

pub mod cartesian;

pub use cartesian::{CartRails, Rail};

use crate::axis::{Axis, AxisSpace, Pos, AXIS_COUNT};
use crate::configfile::Configfile;
use crate::error::{ConfigError, MoveError};
use crate::toolhead::Move;

pub enum KinematicModel {
    /// Plain cartesian: one rail per X/Y/Z axis, identity actuator
    /// transform.
    Cartesian(CartRails),
    /// Cartesian plus independently driven A/B/C linear rails
    /// (the `cartesian_abc` geometry).
    CartesianAbc(CartRails),
}

impl KinematicModel {
    /// Build the model selected by the `[printer]` section. `cartesian_abc`
    /// picks up whichever of A/B/C carry a `[stepper_*]` section.
    pub fn from_config(
        cfg: &Configfile,
        space: &AxisSpace,
        max_velocity: f64,
        max_accel: f64,
    ) -> Result<Self, ConfigError> {
        let kind = cfg.getchoice(
            "printer",
            "kinematics",
            &["cartesian", "cartesian_abc"],
            None,
        )?;
        let max_z_velocity = cfg.getfloat(
            "printer",
            "max_z_velocity",
            Some(max_velocity),
            None,
            Some(max_velocity),
            Some(0.0),
        )?;
        let max_z_accel = cfg.getfloat(
            "printer",
            "max_z_accel",
            Some(max_accel),
            None,
            Some(max_accel),
            Some(0.0),
        )?;

        let mut axes = vec![Axis::X, Axis::Y, Axis::Z];
        match kind.as_str() {
            "cartesian" => {}
            "cartesian_abc" => {
                for axis in [Axis::A, Axis::B, Axis::C] {
                    if space.is_declared(axis) {
                        axes.push(axis);
                    }
                }
            }
            _ => unreachable!("getchoice validated the variant"),
        }
        let rails = axes
            .iter()
            .map(|axis| Rail::from_space(space, *axis))
            .collect::<Result<Vec<_>, _>>()?;
        let cart = CartRails::new(rails, max_z_velocity, max_z_accel);
        Ok(match kind.as_str() {
            "cartesian" => KinematicModel::Cartesian(cart),
            _ => KinematicModel::CartesianAbc(cart),
        })
    }

    fn cart(&self) -> &CartRails {
        match self {
            KinematicModel::Cartesian(k) | KinematicModel::CartesianAbc(k) => k,
        }
    }

    pub fn rails(&self) -> &[Rail] {
        self.cart().rails()
    }

    /// Axes this model drives, in rail order.
    pub fn axes(&self) -> Vec<Axis> {
        self.cart().rails().iter().map(|r| r.axis).collect()
    }

    /// Map per-actuator positions (rail order) to a logical position.
    pub fn forward(&self, actuators: &[f64]) -> Pos {
        self.cart().forward(actuators)
    }

    /// Map a logical position to per-actuator targets (rail order). Fails
    /// when an actuator would leave its declared travel.
    pub fn inverse(&self, pos: &Pos) -> Result<Vec<f64>, MoveError> {
        self.cart().inverse(pos)
    }

    /// Validate a planned move's touched axes against trusted state and rail
    /// ranges, and apply the slow-Z velocity/acceleration ceiling.
    pub fn check_move(
        &self,
        m: &mut Move,
        trusted: &[bool; AXIS_COUNT],
    ) -> Result<(), MoveError> {
        self.cart().check_move(m, trusted)
    }
}
