// Cartesian rail set shared by the plain and ABC-augmented geometries.
// Each rail drives exactly one logical axis, so forward/inverse are the
// identity transform with travel checks on the actuator side.

use crate::axis::{Axis, AxisSpace, Pos, AXIS_COUNT};
use crate::error::{ConfigError, MoveError};
use crate::toolhead::Move;

#[derive(Debug, Clone, PartialEq)]
pub struct Rail {
    pub axis: Axis,
    pub name: String,
    pub position_min: f64,
    pub position_max: f64,
}

impl Rail {
    pub fn from_space(space: &AxisSpace, axis: Axis) -> Result<Rail, ConfigError> {
        let params = space.params(axis)?;
        Ok(Rail {
            axis,
            name: format!("stepper_{}", axis.name().to_lowercase()),
            position_min: params.position_min,
            position_max: params.position_max,
        })
    }

    pub fn range(&self) -> (f64, f64) {
        (self.position_min, self.position_max)
    }

    fn contains(&self, pos: f64) -> bool {
        pos >= self.position_min && pos <= self.position_max
    }
}

pub struct CartRails {
    rails: Vec<Rail>,
    max_z_velocity: f64,
    max_z_accel: f64,
}

impl CartRails {
    pub fn new(rails: Vec<Rail>, max_z_velocity: f64, max_z_accel: f64) -> Self {
        CartRails {
            rails,
            max_z_velocity,
            max_z_accel,
        }
    }

    pub fn rails(&self) -> &[Rail] {
        &self.rails
    }

    pub fn forward(&self, actuators: &[f64]) -> Pos {
        debug_assert_eq!(actuators.len(), self.rails.len());
        let mut pos = [0.0; AXIS_COUNT];
        for (rail, value) in self.rails.iter().zip(actuators) {
            pos[rail.axis.index()] = *value;
        }
        pos
    }

    pub fn inverse(&self, pos: &Pos) -> Result<Vec<f64>, MoveError> {
        let mut actuators = Vec::with_capacity(self.rails.len());
        for rail in &self.rails {
            let target = pos[rail.axis.index()];
            if !rail.contains(target) {
                return Err(MoveError::KinematicLimit {
                    axis: rail.axis,
                    target,
                    min: rail.position_min,
                    max: rail.position_max,
                });
            }
            actuators.push(target);
        }
        Ok(actuators)
    }

    pub fn check_move(&self, m: &mut Move, trusted: &[bool; AXIS_COUNT]) -> Result<(), MoveError> {
        for rail in &self.rails {
            let idx = rail.axis.index();
            if m.axes_d[idx] == 0.0 {
                continue;
            }
            if !trusted[idx] {
                return Err(MoveError::AxisNotHomed(rail.axis));
            }
            let end = m.end_pos[idx];
            if !rail.contains(end) {
                return Err(MoveError::Rejected {
                    axis: rail.axis,
                    target: end,
                    min: rail.position_min,
                    max: rail.position_max,
                });
            }
        }

        // Moves with a Z component are capped to the slow axis: scale the
        // per-move ceiling by total distance over Z distance.
        let dz = m.axes_d[Axis::Z.index()];
        if dz != 0.0 {
            let z_ratio = m.move_d / dz.abs();
            m.limit_speed(self.max_z_velocity * z_ratio, self.max_z_accel * z_ratio);
        }
        Ok(())
    }
}
