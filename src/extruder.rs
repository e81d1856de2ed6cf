// Extruder axis handling: filament geometry derived extrusion ceilings,
// extrude-only limits, the junction contribution of the E axis, and the
// optional endstop declaration that makes the extruder homeable.

use crate::axis::{Axis, AxisParams, HomingParams};
use crate::configfile::Configfile;
use crate::error::{ConfigError, MoveError};
use crate::toolhead::{read_homing_params, Move};
use serde_json::{json, Value};

pub struct Extruder {
    pub name: String,
    nozzle_diameter: f64,
    filament_area: f64,
    max_extrude_ratio: f64,
    max_e_velocity: f64,
    max_e_accel: f64,
    max_e_dist: f64,
    instant_corner_v: f64,
    pressure_advance: f64,
    pressure_advance_smooth_time: f64,
    pub can_home: bool,
    endstop_pin: Option<String>,
    homing: Option<HomingParams>,
    position_min: f64,
    position_max: f64,
}

impl Extruder {
    pub fn from_config(
        cfg: &Configfile,
        section: &str,
        max_velocity: f64,
        max_accel: f64,
    ) -> Result<Self, ConfigError> {
        let nozzle_diameter = cfg.getfloat(section, "nozzle_diameter", None, None, None, Some(0.0))?;
        let filament_diameter = cfg.getfloat(
            section,
            "filament_diameter",
            None,
            Some(nozzle_diameter),
            None,
            None,
        )?;
        let filament_area = std::f64::consts::PI * (filament_diameter * 0.5).powi(2);
        let def_max_cross_section = 4.0 * nozzle_diameter.powi(2);
        let def_max_extrude_ratio = def_max_cross_section / filament_area;
        let max_cross_section = cfg.getfloat(
            section,
            "max_extrude_cross_section",
            Some(def_max_cross_section),
            None,
            None,
            Some(0.0),
        )?;
        let max_extrude_ratio = max_cross_section / filament_area;
        log::info!("Extruder max_extrude_ratio={:.6}", max_extrude_ratio);

        let max_e_velocity = cfg.getfloat(
            section,
            "max_extrude_only_velocity",
            Some(max_velocity * def_max_extrude_ratio),
            None,
            None,
            Some(0.0),
        )?;
        let max_e_accel = cfg.getfloat(
            section,
            "max_extrude_only_accel",
            Some(max_accel * def_max_extrude_ratio),
            None,
            None,
            Some(0.0),
        )?;
        let max_e_dist = cfg.getfloat(
            section,
            "max_extrude_only_distance",
            Some(50.0),
            Some(0.0),
            None,
            None,
        )?;
        let instant_corner_v = cfg.getfloat(
            section,
            "instantaneous_corner_velocity",
            Some(1.0),
            Some(0.0),
            None,
            None,
        )?;
        let pressure_advance =
            cfg.getfloat(section, "pressure_advance", Some(0.0), Some(0.0), None, None)?;
        let pressure_advance_smooth_time = cfg.getfloat(
            section,
            "pressure_advance_smooth_time",
            Some(0.040),
            None,
            Some(0.200),
            Some(0.0),
        )?;

        // An endstop declaration turns the extruder into a homeable rail
        // with software travel limits.
        let endstop_pin = cfg.get_opt(section, "endstop_pin");
        let (can_home, position_min, position_max, homing) = match &endstop_pin {
            Some(_) => {
                let position_min =
                    cfg.getfloat(section, "position_min", Some(0.0), None, None, None)?;
                let position_max = cfg.getfloat(
                    section,
                    "position_max",
                    None,
                    Some(position_min),
                    None,
                    None,
                )?;
                let homing = read_homing_params(cfg, section, position_min, position_max)?;
                (true, position_min, position_max, Some(homing))
            }
            None => (false, 0.0, 0.0, None),
        };

        Ok(Extruder {
            name: section.to_string(),
            nozzle_diameter,
            filament_area,
            max_extrude_ratio,
            max_e_velocity,
            max_e_accel,
            max_e_dist,
            instant_corner_v,
            pressure_advance,
            pressure_advance_smooth_time,
            can_home,
            endstop_pin,
            homing,
            position_min,
            position_max,
        })
    }

    /// The E axis declaration for the axis space, when homeable.
    pub fn axis_params(&self) -> Option<AxisParams> {
        self.homing.map(|homing| AxisParams {
            position_min: self.position_min,
            position_max: self.position_max,
            endstop_pin: self.endstop_pin.clone(),
            homing: Some(homing),
        })
    }

    pub fn check_move(&self, m: &mut Move, trusted_e: bool) -> Result<(), MoveError> {
        let e = Axis::E.index();
        let axis_r = m.axes_r[e];
        let de = m.axes_d[e];

        if (m.axes_d[0] == 0.0 && m.axes_d[1] == 0.0) || axis_r < 0.0 {
            // Extrude only move (or retraction) - limit accel and velocity
            if de.abs() > self.max_e_dist {
                return Err(MoveError::ExtrudeLimit {
                    distance: de.abs(),
                    max: self.max_e_dist,
                });
            }
            let inv_extrude_r = 1.0 / axis_r.abs();
            m.limit_speed(
                self.max_e_velocity * inv_extrude_r,
                self.max_e_accel * inv_extrude_r,
            );
        } else if axis_r > self.max_extrude_ratio {
            if de > self.nozzle_diameter * self.max_extrude_ratio {
                let area = axis_r * self.filament_area;
                log::debug!(
                    "Overextrude: {} vs {} (area={:.3} dist={:.3})",
                    axis_r,
                    self.max_extrude_ratio,
                    area,
                    m.move_d
                );
                return Err(MoveError::ExtrudeCrossSection {
                    area,
                    max: self.max_extrude_ratio * self.filament_area,
                });
            }
            // Amount extruded is tiny; permit the move
        }

        if self.can_home {
            if !trusted_e {
                return Err(MoveError::AxisNotHomed(Axis::E));
            }
            let end = m.end_pos[e];
            if end < self.position_min || end > self.position_max {
                return Err(MoveError::Rejected {
                    axis: Axis::E,
                    target: end,
                    min: self.position_min,
                    max: self.position_max,
                });
            }
        }
        Ok(())
    }

    /// Junction velocity ceiling contributed by the change of extrusion
    /// ratio across two consecutive moves.
    pub fn calc_junction(&self, prev: &Move, m: &Move) -> f64 {
        let e = Axis::E.index();
        let diff_r = m.axes_r[e] - prev.axes_r[e];
        if diff_r != 0.0 {
            (self.instant_corner_v / diff_r.abs()).powi(2)
        } else {
            m.max_cruise_v2
        }
    }

    pub fn get_status(&self) -> Value {
        json!({
            "pressure_advance": self.pressure_advance,
            "smooth_time": self.pressure_advance_smooth_time,
            "can_home": self.can_home,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{Pos, AXIS_COUNT};

    const EXTRUDER_CFG: &str = "\
[extruder]
nozzle_diameter: 0.4
filament_diameter: 1.75
max_extrude_only_distance: 50
max_extrude_only_velocity: 80
max_extrude_only_accel: 2000
";

    const HOMEABLE_CFG: &str = "\
[extruder]
nozzle_diameter: 0.4
filament_diameter: 1.75
endstop_pin: ^PA0
position_min: 0
position_max: 30
position_endstop: 0
homing_speed: 10
";

    fn extruder(content: &str) -> Extruder {
        let cfg = Configfile::parse(content).unwrap();
        Extruder::from_config(&cfg, "extruder", 300.0, 3000.0).unwrap()
    }

    fn e_move(start_e: f64, end_e: f64, speed: f64) -> Move {
        let mut start = [0.0; AXIS_COUNT];
        let mut end: Pos = [0.0; AXIS_COUNT];
        start[Axis::E.index()] = start_e;
        end[Axis::E.index()] = end_e;
        Move::new(3000.0, 0.013, 500.0, 1500.0, start, end, speed)
    }

    #[test]
    fn extrude_only_distance_limit() {
        let ex = extruder(EXTRUDER_CFG);
        let mut m = e_move(0.0, 60.0, 20.0);
        match ex.check_move(&mut m, false) {
            Err(MoveError::ExtrudeLimit { distance, max }) => {
                assert_eq!(distance, 60.0);
                assert_eq!(max, 50.0);
            }
            other => panic!("expected ExtrudeLimit, got {:?}", other),
        }
    }

    #[test]
    fn extrude_only_speed_ceiling() {
        let ex = extruder(EXTRUDER_CFG);
        let mut m = e_move(0.0, 5.0, 200.0);
        ex.check_move(&mut m, false).unwrap();
        // axis_r is 1 for a pure E move, so the ceiling is the configured one
        assert!((m.max_cruise_v2 - 80.0f64.powi(2)).abs() < 1e-9);
        assert!((m.accel - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn overextrusion_rejected_but_tiny_amount_permitted() {
        let ex = extruder(EXTRUDER_CFG);
        // 10mm XY travel with 8mm of filament is far past any ratio limit
        let start = [0.0; AXIS_COUNT];
        let mut end = [0.0; AXIS_COUNT];
        end[0] = 10.0;
        end[Axis::E.index()] = 8.0;
        let mut m = Move::new(3000.0, 0.013, 500.0, 1500.0, start, end, 100.0);
        assert!(matches!(
            ex.check_move(&mut m, false),
            Err(MoveError::ExtrudeCrossSection { .. })
        ));

        // A microscopic extrusion over the same travel is allowed
        let mut end_tiny = [0.0; AXIS_COUNT];
        end_tiny[0] = 10.0;
        end_tiny[Axis::E.index()] = 0.01;
        let mut m = Move::new(3000.0, 0.013, 500.0, 1500.0, start, end_tiny, 100.0);
        ex.check_move(&mut m, false).unwrap();
    }

    #[test]
    fn homeable_extruder_enforces_trust_and_range() {
        let ex = extruder(HOMEABLE_CFG);
        assert!(ex.can_home);
        let mut m = e_move(0.0, 5.0, 10.0);
        assert_eq!(
            ex.check_move(&mut m, false),
            Err(MoveError::AxisNotHomed(Axis::E))
        );
        let mut m = e_move(0.0, 5.0, 10.0);
        ex.check_move(&mut m, true).unwrap();
        let mut m = e_move(0.0, 31.0, 10.0);
        assert!(matches!(
            ex.check_move(&mut m, true),
            Err(MoveError::Rejected { axis: Axis::E, .. })
        ));
    }

    #[test]
    fn junction_from_extrusion_ratio_change() {
        let ex = extruder(EXTRUDER_CFG);
        let start = [0.0; AXIS_COUNT];
        let mut mid = [0.0; AXIS_COUNT];
        mid[0] = 10.0;
        mid[Axis::E.index()] = 1.0;
        let m1 = Move::new(3000.0, 0.013, 500.0, 1500.0, start, mid, 100.0);
        let mut end = mid;
        end[1] = 10.0;
        end[Axis::E.index()] = 1.05;
        let m2 = Move::new(3000.0, 0.013, 500.0, 1500.0, mid, end, 100.0);
        let v2 = ex.calc_junction(&m1, &m2);
        assert!(v2 > 0.0 && v2 < m2.max_cruise_v2);
    }

    #[test]
    fn axis_params_only_when_homeable() {
        assert!(extruder(EXTRUDER_CFG).axis_params().is_none());
        let params = extruder(HOMEABLE_CFG).axis_params().unwrap();
        assert_eq!(params.range(), (0.0, 30.0));
        let homing = params.homing.unwrap();
        assert_eq!(homing.position_endstop, 0.0);
        assert!(!homing.positive_dir);
        assert_eq!(homing.second_homing_speed, 5.0);
    }
}
