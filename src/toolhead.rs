// The toolhead: resolves move requests into a lookahead queue of
// trapezoidal moves, owns the kinematic state, and hands axes over to
// homing/probing sessions through the per-axis ownership arena.
//
// Common suffixes: _d is distance (in mm), _v is velocity (in mm/second),
// _v2 is velocity squared (mm^2/s^2), _t is time (in seconds), _r is ratio
// (scalar between 0.0 and 1.0).

use crate::axis::{Axis, AxisParams, AxisSpace, HomingParams, Pos, AXIS_COUNT};
use crate::configfile::Configfile;
use crate::endstop::{PinSpec, TriggerPin};
use crate::error::{ConfigError, MoveError};
use crate::extruder::Extruder;
use crate::kinematics::KinematicModel;

const LOOKAHEAD_FLUSH_TIME: f64 = 0.250;
/// Feed rate used when a request carries none (25 mm/s).
const DEFAULT_SPEED: f64 = 25.0;
/// Spacing of trigger polls along a homing/probing drive.
const TRIGGER_SCAN_DIST: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Move {
    pub start_pos: Pos,
    pub end_pos: Pos,
    pub accel: f64,
    pub junction_deviation: f64,
    pub is_kinematic_move: bool,
    /// Requested per-axis displacements (the E component survives even for
    /// extrude-only moves).
    pub axes_d: Pos,
    pub move_d: f64,
    pub axes_r: Pos,
    pub min_move_t: f64,
    pub max_start_v2: f64,
    pub max_cruise_v2: f64,
    pub delta_v2: f64,
    pub max_smoothed_v2: f64,
    pub smooth_delta_v2: f64,
    pub start_v: f64,
    pub cruise_v: f64,
    pub end_v: f64,
    pub accel_t: f64,
    pub cruise_t: f64,
    pub decel_t: f64,
}

impl Move {
    pub fn new(
        max_accel: f64,
        junction_deviation: f64,
        max_velocity: f64,
        max_accel_to_decel: f64,
        start_pos: Pos,
        end_pos: Pos,
        speed: f64,
    ) -> Self {
        let mut axes_d = [0.0; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            axes_d[i] = end_pos[i] - start_pos[i];
        }
        let kin_d2: f64 = axes_d[..Axis::E.index()].iter().map(|d| d * d).sum();
        let mut move_d = kin_d2.sqrt();

        let mut is_kinematic_move = true;
        let mut velocity = speed.min(max_velocity);
        let mut accel = max_accel;
        let mut end_pos = end_pos;
        let mut effective_d = axes_d;

        if move_d < 0.000000001 {
            // Extrude only move
            for i in 0..Axis::E.index() {
                end_pos[i] = start_pos[i];
                effective_d[i] = 0.0;
            }
            move_d = effective_d[Axis::E.index()].abs();
            velocity = speed;
            accel = 99999999.9;
            is_kinematic_move = false;
        }

        let inv_move_d = if move_d > 0.0 { 1.0 / move_d } else { 0.0 };
        let mut axes_r = [0.0; AXIS_COUNT];
        for i in 0..AXIS_COUNT {
            axes_r[i] = effective_d[i] * inv_move_d;
        }
        let min_move_t = if velocity > 0.0 {
            move_d / velocity
        } else {
            f64::INFINITY
        };

        Move {
            start_pos,
            end_pos,
            accel,
            junction_deviation,
            is_kinematic_move,
            axes_d,
            move_d,
            axes_r,
            min_move_t,
            max_start_v2: 0.0,
            max_cruise_v2: velocity * velocity,
            delta_v2: 2.0 * move_d * accel,
            max_smoothed_v2: 0.0,
            smooth_delta_v2: 2.0 * move_d * max_accel_to_decel,
            start_v: 0.0,
            cruise_v: 0.0,
            end_v: 0.0,
            accel_t: 0.0,
            cruise_t: 0.0,
            decel_t: 0.0,
        }
    }

    /// Tighten this move's velocity/acceleration ceiling.
    pub fn limit_speed(&mut self, speed: f64, accel: f64) {
        let speed2 = speed * speed;
        if speed2 < self.max_cruise_v2 {
            self.max_cruise_v2 = speed2;
            self.min_move_t = if speed > 0.0 {
                self.move_d / speed
            } else {
                f64::INFINITY
            };
        }
        self.accel = self.accel.min(accel);
        self.delta_v2 = 2.0 * self.move_d * self.accel;
        self.smooth_delta_v2 = self.smooth_delta_v2.min(self.delta_v2);
    }

    /// Find the maximum junction velocity between this move and the
    /// previous one ("approximated centripetal velocity" over the X/Y/Z
    /// direction change); `extra_axes_v2` is the extruder's contribution.
    pub fn calc_junction(&mut self, prev_move: &Move, extra_axes_v2: f64) {
        if !self.is_kinematic_move || !prev_move.is_kinematic_move {
            return;
        }
        let mut max_start_v2 = self
            .max_cruise_v2
            .min(prev_move.max_cruise_v2)
            .min(prev_move.max_start_v2 + prev_move.delta_v2)
            .min(extra_axes_v2);

        let axes_r = &self.axes_r;
        let prev_axes_r = &prev_move.axes_r;
        let junction_cos_theta = -(axes_r[0] * prev_axes_r[0]
            + axes_r[1] * prev_axes_r[1]
            + axes_r[2] * prev_axes_r[2]);
        let junction_cos_theta = junction_cos_theta.clamp(-1.0, 1.0);

        let sin_theta_d2 = (0.5 * (1.0 - junction_cos_theta)).max(0.0).sqrt();
        let cos_theta_d2 = (0.5 * (1.0 + junction_cos_theta)).max(0.0).sqrt();
        let one_minus_sin_theta_d2 = 1.0 - sin_theta_d2;

        if one_minus_sin_theta_d2 > 1e-9 && cos_theta_d2 > 1e-9 {
            let r_jd = sin_theta_d2 / one_minus_sin_theta_d2;
            let move_jd_v2 = r_jd * self.junction_deviation * self.accel;
            let pmove_jd_v2 = r_jd * prev_move.junction_deviation * prev_move.accel;

            let quarter_tan_theta_d2 = 0.25 * sin_theta_d2 / cos_theta_d2;
            let move_centripetal_v2 = self.delta_v2 * quarter_tan_theta_d2;
            let pmove_centripetal_v2 = prev_move.delta_v2 * quarter_tan_theta_d2;

            max_start_v2 = max_start_v2
                .min(move_jd_v2)
                .min(pmove_jd_v2)
                .min(move_centripetal_v2)
                .min(pmove_centripetal_v2);
        }

        self.max_start_v2 = max_start_v2;
        self.max_smoothed_v2 =
            max_start_v2.min(prev_move.max_smoothed_v2 + prev_move.smooth_delta_v2);
    }

    /// Fix the trapezoid once the lookahead pass has settled the junction
    /// velocities.
    pub fn set_junction(&mut self, start_v2: f64, cruise_v2: f64, end_v2: f64) {
        let half_inv_accel = if self.accel > 0.0 { 0.5 / self.accel } else { 0.0 };
        let accel_d = (cruise_v2 - start_v2) * half_inv_accel;
        let decel_d = (cruise_v2 - end_v2) * half_inv_accel;
        let cruise_d = self.move_d - accel_d - decel_d;

        self.start_v = start_v2.sqrt();
        self.cruise_v = cruise_v2.sqrt();
        self.end_v = end_v2.sqrt();

        self.accel_t = if self.start_v + self.cruise_v > 0.0 {
            accel_d / ((self.start_v + self.cruise_v) * 0.5)
        } else {
            0.0
        };
        self.cruise_t = if self.cruise_v > 0.0 {
            cruise_d / self.cruise_v
        } else {
            0.0
        };
        self.decel_t = if self.end_v + self.cruise_v > 0.0 {
            decel_d / ((self.end_v + self.cruise_v) * 0.5)
        } else {
            0.0
        };
    }

    pub fn total_time(&self) -> f64 {
        self.accel_t + self.cruise_t + self.decel_t
    }
}

pub struct LookAheadQueue {
    queue: Vec<Move>,
    junction_flush: f64,
}

impl LookAheadQueue {
    pub fn new() -> Self {
        LookAheadQueue {
            queue: Vec::new(),
            junction_flush: LOOKAHEAD_FLUSH_TIME,
        }
    }

    pub fn reset(&mut self) {
        self.queue.clear();
        self.junction_flush = LOOKAHEAD_FLUSH_TIME;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Move> {
        self.queue.iter()
    }

    /// Queue a move; returns true once enough time is buffered that the
    /// caller should flush.
    pub fn add_move(&mut self, mut m: Move, extruder: Option<&Extruder>) -> bool {
        if let Some(prev) = self.queue.last() {
            let ea_v2 = extruder.map_or(f64::INFINITY, |ex| ex.calc_junction(prev, &m));
            m.calc_junction(prev, ea_v2);
        }
        self.junction_flush -= m.min_move_t;
        self.queue.push(m);
        self.junction_flush <= 0.0
    }

    /// Backward pass settling junction velocities, then hand out the moves
    /// whose profiles can no longer change. A lazy flush keeps the tail
    /// that a future move could still speed up.
    pub fn flush(&mut self, lazy: bool) -> Vec<Move> {
        self.junction_flush = LOOKAHEAD_FLUSH_TIME;
        let mut update_flush_count = lazy;
        let queue_len = self.queue.len();
        let mut flush_count = queue_len;

        // (index, start_v2, next_end_v2) of moves awaiting a peak cruise
        let mut delayed: Vec<(usize, f64, f64)> = Vec::new();
        let mut next_end_v2 = 0.0;
        let mut next_smoothed_v2 = 0.0;
        let mut peak_cruise_v2 = 0.0;

        for i in (0..queue_len).rev() {
            let (m_max_start_v2, m_max_smoothed_v2, m_delta_v2, m_smooth_delta_v2, m_max_cruise_v2) = {
                let m = &self.queue[i];
                (
                    m.max_start_v2,
                    m.max_smoothed_v2,
                    m.delta_v2,
                    m.smooth_delta_v2,
                    m.max_cruise_v2,
                )
            };
            let reachable_start_v2 = next_end_v2 + m_delta_v2;
            let start_v2 = m_max_start_v2.min(reachable_start_v2);
            let reachable_smoothed_v2 = next_smoothed_v2 + m_smooth_delta_v2;
            let smoothed_v2 = m_max_smoothed_v2.min(reachable_smoothed_v2);

            if smoothed_v2 < reachable_smoothed_v2 {
                if smoothed_v2 + m_smooth_delta_v2 > next_smoothed_v2 || !delayed.is_empty() {
                    if update_flush_count && peak_cruise_v2 != 0.0 {
                        flush_count = i;
                        update_flush_count = false;
                    }
                    peak_cruise_v2 =
                        m_max_cruise_v2.min((smoothed_v2 + reachable_smoothed_v2) * 0.5);
                    if !delayed.is_empty() {
                        if !update_flush_count && i < flush_count {
                            let mut mc_v2 = peak_cruise_v2;
                            for &(idx, ms_v2, me_v2) in delayed.iter().rev() {
                                mc_v2 = mc_v2.min(ms_v2);
                                self.queue[idx].set_junction(
                                    ms_v2.min(mc_v2),
                                    mc_v2,
                                    me_v2.min(mc_v2),
                                );
                            }
                        }
                        delayed.clear();
                    }
                }
                if !update_flush_count && i < flush_count {
                    let cruise_v2 = ((start_v2 + reachable_start_v2) * 0.5)
                        .min(m_max_cruise_v2)
                        .min(peak_cruise_v2);
                    self.queue[i].set_junction(
                        start_v2.min(cruise_v2),
                        cruise_v2,
                        next_end_v2.min(cruise_v2),
                    );
                }
            } else {
                delayed.push((i, start_v2, next_end_v2));
            }
            next_end_v2 = start_v2;
            next_smoothed_v2 = smoothed_v2;
        }

        if update_flush_count || flush_count == 0 {
            return Vec::new();
        }
        self.queue.drain(..flush_count).collect()
    }
}

impl Default for LookAheadQueue {
    fn default() -> Self {
        LookAheadQueue::new()
    }
}

/// Absolute per-axis targets for one requested move. Relative/absolute
/// resolution is the command layer's job; by the time a request reaches
/// the planner its targets are absolute.
#[derive(Debug, Clone, Default)]
pub struct MoveRequest {
    pub targets: Vec<(Axis, f64)>,
    pub speed: Option<f64>,
}

impl MoveRequest {
    pub fn new() -> Self {
        MoveRequest::default()
    }

    pub fn target(mut self, axis: Axis, value: f64) -> Self {
        self.targets.push((axis, value));
        self
    }

    pub fn at_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Commanded position per axis plus whether that position is known
/// (endstop-referenced or explicitly overridden).
#[derive(Debug, Clone)]
pub struct KinematicState {
    pub position: Pos,
    pub trusted: [bool; AXIS_COUNT],
}

impl KinematicState {
    fn new() -> Self {
        KinematicState {
            position: [0.0; AXIS_COUNT],
            trusted: [false; AXIS_COUNT],
        }
    }

    /// Lowercase names of trusted axes, e.g. "xyz".
    pub fn homed_axes(&self) -> String {
        Axis::ALL
            .iter()
            .filter(|a| self.trusted[a.index()])
            .map(|a| a.name().to_ascii_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

/// Owner slot of one axis. `Free` axes belong to the ordinary move queue;
/// a session holds its axes exclusively until it completes or aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOwner {
    Free,
    Session(SessionId),
}

/// Outcome of a trigger-watched drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekResult {
    Triggered(Pos),
    Exhausted,
}

/// Trigger source for a drive: one of the toolhead's own axis endstops, or
/// an externally owned pin (a probe).
pub enum TriggerRef<'a> {
    Endstop(Axis),
    Pin(&'a dyn TriggerPin),
}

pub struct ToolHead {
    pub space: AxisSpace,
    kin: KinematicModel,
    pub extruder: Option<Extruder>,
    lookahead: LookAheadQueue,
    commanded_pos: Pos,
    kin_state: KinematicState,
    owners: [AxisOwner; AXIS_COUNT],
    next_session_id: u64,
    endstops: [Option<Box<dyn TriggerPin>>; AXIS_COUNT],

    pub max_velocity: f64,
    pub max_accel: f64,
    min_cruise_ratio: f64,
    square_corner_velocity: f64,
    junction_deviation: f64,
    max_accel_to_decel: f64,

    print_time: f64,
}

impl ToolHead {
    pub fn new(cfg: &Configfile) -> Result<Self, ConfigError> {
        if !cfg.has_section("printer") {
            return Err(ConfigError::SectionNotFound("printer".to_string()));
        }
        let max_velocity = cfg.getfloat("printer", "max_velocity", None, None, None, Some(0.0))?;
        let max_accel = cfg.getfloat("printer", "max_accel", None, None, None, Some(0.0))?;
        let square_corner_velocity = cfg.getfloat(
            "printer",
            "square_corner_velocity",
            Some(5.0),
            Some(0.0),
            None,
            None,
        )?;
        let min_cruise_ratio = cfg.getfloat(
            "printer",
            "minimum_cruise_ratio",
            Some(0.5),
            Some(0.0),
            Some(1.0),
            None,
        )?;

        let mut space = AxisSpace::new();
        for axis in Axis::KINEMATIC {
            let section = format!("stepper_{}", axis.name().to_ascii_lowercase());
            if !cfg.has_section(&section) {
                continue;
            }
            let position_min = cfg.getfloat(&section, "position_min", Some(0.0), None, None, None)?;
            let position_max = cfg.getfloat(
                &section,
                "position_max",
                None,
                Some(position_min),
                None,
                None,
            )?;
            let endstop_pin = cfg.get_opt(&section, "endstop_pin");
            let homing = match &endstop_pin {
                Some(pin) => {
                    let spec = PinSpec::parse(pin);
                    log::debug!(
                        "{}: endstop pin {} (invert={} pullup={})",
                        section,
                        spec.name,
                        spec.invert,
                        spec.pullup
                    );
                    Some(read_homing_params(cfg, &section, position_min, position_max)?)
                }
                None => None,
            };
            space.declare(
                axis,
                AxisParams {
                    position_min,
                    position_max,
                    endstop_pin,
                    homing,
                },
            );
        }

        let extruder = if cfg.has_section("extruder") {
            Some(Extruder::from_config(cfg, "extruder", max_velocity, max_accel)?)
        } else {
            None
        };
        if let Some(params) = extruder.as_ref().and_then(Extruder::axis_params) {
            space.declare(Axis::E, params);
        }

        let kin = KinematicModel::from_config(cfg, &space, max_velocity, max_accel)?;

        let mut toolhead = ToolHead {
            space,
            kin,
            extruder,
            lookahead: LookAheadQueue::new(),
            commanded_pos: [0.0; AXIS_COUNT],
            kin_state: KinematicState::new(),
            owners: [AxisOwner::Free; AXIS_COUNT],
            next_session_id: 1,
            endstops: std::array::from_fn(|_| None),
            max_velocity,
            max_accel,
            min_cruise_ratio,
            square_corner_velocity,
            junction_deviation: 0.0,
            max_accel_to_decel: 0.0,
            print_time: 0.0,
        };
        toolhead.calc_junction_deviation();
        Ok(toolhead)
    }

    fn calc_junction_deviation(&mut self) {
        let scv2 = self.square_corner_velocity * self.square_corner_velocity;
        self.junction_deviation = scv2 * (2.0_f64.sqrt() - 1.0) / self.max_accel;
        self.max_accel_to_decel = self.max_accel * (1.0 - self.min_cruise_ratio);
    }

    pub fn kinematics(&self) -> &KinematicModel {
        &self.kin
    }

    pub fn get_position(&self) -> Pos {
        self.commanded_pos
    }

    pub fn kin_state(&self) -> &KinematicState {
        &self.kin_state
    }

    pub fn is_trusted(&self, axis: Axis) -> bool {
        self.kin_state.trusted[axis.index()]
    }

    pub fn print_time(&self) -> f64 {
        self.print_time
    }

    pub fn axis_owner(&self, axis: Axis) -> AxisOwner {
        self.owners[axis.index()]
    }

    /// Attach a trigger pin as the endstop of an axis. Without one, homing
    /// that axis runs its full travel and times out.
    pub fn set_endstop(&mut self, axis: Axis, pin: Box<dyn TriggerPin>) {
        self.endstops[axis.index()] = Some(pin);
    }

    /// Resolve a request against the current commanded position and queue
    /// the resulting move.
    pub fn submit_move(&mut self, req: &MoveRequest) -> Result<(), MoveError> {
        let mut newpos = self.commanded_pos;
        for (axis, value) in &req.targets {
            newpos[axis.index()] = *value;
        }
        self.move_to(newpos, req.speed.unwrap_or(DEFAULT_SPEED))
    }

    /// Queue a move to an absolute position. A move with no displacement on
    /// any axis is a no-op success.
    pub fn move_to(&mut self, newpos: Pos, speed: f64) -> Result<(), MoveError> {
        let mut m = Move::new(
            self.max_accel,
            self.junction_deviation,
            self.max_velocity,
            self.max_accel_to_decel,
            self.commanded_pos,
            newpos,
            speed,
        );
        if m.move_d == 0.0 {
            return Ok(());
        }
        for axis in Axis::ALL {
            if m.axes_d[axis.index()] != 0.0 {
                if let AxisOwner::Session(_) = self.owners[axis.index()] {
                    return Err(MoveError::AxisBusy(axis));
                }
            }
        }
        if m.is_kinematic_move {
            self.kin.check_move(&mut m, &self.kin_state.trusted)?;
        }
        if m.axes_d[Axis::E.index()] != 0.0 {
            match &self.extruder {
                Some(extruder) => {
                    extruder.check_move(&mut m, self.kin_state.trusted[Axis::E.index()])?
                }
                None => return Err(MoveError::NoExtruder),
            }
        }
        self.commanded_pos = m.end_pos;
        let want_flush = self.lookahead.add_move(m, self.extruder.as_ref());
        if want_flush {
            self.process_lookahead(true);
        }
        Ok(())
    }

    fn process_lookahead(&mut self, lazy: bool) {
        let moves = self.lookahead.flush(lazy);
        if moves.is_empty() {
            return;
        }
        for m in &moves {
            // Execution point: the commanded state becomes the known state.
            self.kin_state.position = m.end_pos;
            self.print_time += m.total_time();
        }
        log::debug!(
            "executed {} moves, print_time now {:.4}",
            moves.len(),
            self.print_time
        );
    }

    /// Drain the queue; on return the kinematic state matches the last
    /// commanded position.
    pub fn wait_moves(&mut self) {
        self.process_lookahead(false);
    }

    pub fn queued_moves(&self) -> usize {
        self.lookahead.len()
    }

    pub fn dwell(&mut self, delay: f64) {
        self.print_time += delay.max(0.0);
    }

    /// Set named axes to the given positions without motion and mark them
    /// trusted. Used to zero the origin after manual positioning.
    pub fn override_position(&mut self, targets: &[(Axis, f64)]) {
        self.wait_moves();
        for (axis, value) in targets {
            let idx = axis.index();
            self.commanded_pos[idx] = *value;
            self.kin_state.position[idx] = *value;
            self.kin_state.trusted[idx] = true;
        }
        log::info!(
            "kinematic position override: {:?}, homed axes now '{}'",
            targets,
            self.kin_state.homed_axes()
        );
    }

    /// Emergency stop: discard the pending queue and distrust every axis
    /// that had unfinished or session-owned motion. Motion that already
    /// executed stays in the kinematic state.
    pub fn abort(&mut self) {
        for m in self.lookahead.iter() {
            for axis in Axis::ALL {
                if m.axes_d[axis.index()] != 0.0 {
                    self.kin_state.trusted[axis.index()] = false;
                }
            }
        }
        for axis in Axis::ALL {
            if self.owners[axis.index()] != AxisOwner::Free {
                self.kin_state.trusted[axis.index()] = false;
                self.owners[axis.index()] = AxisOwner::Free;
            }
        }
        self.lookahead.reset();
        self.commanded_pos = self.kin_state.position;
        log::warn!("motion aborted; pending move queue discarded");
    }

    // Session support -------------------------------------------------

    /// Claim exclusive ownership of a set of axes. All-or-nothing over the
    /// sorted axis list, so no circular acquisition order exists.
    pub(crate) fn claim_axes(&mut self, axes: &[Axis]) -> Result<SessionId, Axis> {
        let mut sorted: Vec<Axis> = axes.to_vec();
        sorted.sort();
        sorted.dedup();
        for axis in &sorted {
            if self.owners[axis.index()] != AxisOwner::Free {
                return Err(*axis);
            }
        }
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        for axis in &sorted {
            self.owners[axis.index()] = AxisOwner::Session(id);
        }
        Ok(id)
    }

    pub(crate) fn release_session(&mut self, id: SessionId) {
        for owner in self.owners.iter_mut() {
            if *owner == AxisOwner::Session(id) {
                *owner = AxisOwner::Free;
            }
        }
    }

    pub(crate) fn poll_trigger(&self, src: &TriggerRef<'_>) -> bool {
        match src {
            TriggerRef::Endstop(axis) => self.endstops[axis.index()]
                .as_deref()
                .map_or(false, |pin| pin.query(&self.kin_state.position)),
            TriggerRef::Pin(pin) => pin.query(&self.kin_state.position),
        }
    }

    /// Drive toward `target`, polling the trigger at each scan step. Stops
    /// (and reports the halt position) on assertion; otherwise runs the
    /// vector to exhaustion.
    pub(crate) fn drive_until_trigger(
        &mut self,
        src: &TriggerRef<'_>,
        target: &Pos,
        speed: f64,
    ) -> SeekResult {
        let start = self.kin_state.position;
        let mut delta = [0.0; AXIS_COUNT];
        let mut dist2 = 0.0;
        for i in 0..AXIS_COUNT {
            delta[i] = target[i] - start[i];
            dist2 += delta[i] * delta[i];
        }
        let dist = dist2.sqrt();
        if dist == 0.0 {
            return SeekResult::Exhausted;
        }
        let steps = (dist / TRIGGER_SCAN_DIST).ceil().max(1.0) as u64;
        let step_t = dist / steps as f64 / speed;
        for k in 1..=steps {
            let frac = k as f64 / steps as f64;
            let mut pos = start;
            for i in 0..AXIS_COUNT {
                pos[i] = start[i] + delta[i] * frac;
            }
            self.kin_state.position = pos;
            self.commanded_pos = pos;
            self.print_time += step_t;
            if self.poll_trigger(src) {
                return SeekResult::Triggered(pos);
            }
        }
        SeekResult::Exhausted
    }

    /// Unwatched session drive (retract legs).
    pub(crate) fn drive_direct(&mut self, target: &Pos, speed: f64) {
        let start = self.kin_state.position;
        let dist2: f64 = (0..AXIS_COUNT)
            .map(|i| (target[i] - start[i]) * (target[i] - start[i]))
            .sum();
        self.kin_state.position = *target;
        self.commanded_pos = *target;
        self.print_time += dist2.sqrt() / speed;
    }

    /// Session-scoped position fixup; does not change trust.
    pub(crate) fn force_position(&mut self, axis: Axis, value: f64) {
        let idx = axis.index();
        self.commanded_pos[idx] = value;
        self.kin_state.position[idx] = value;
    }

    pub(crate) fn commit_homed(&mut self, axis: Axis, value: f64) {
        self.force_position(axis, value);
        self.kin_state.trusted[axis.index()] = true;
    }

    pub(crate) fn set_untrusted(&mut self, axis: Axis) {
        self.kin_state.trusted[axis.index()] = false;
    }

    pub fn get_status(&self) -> serde_json::Value {
        let mut status = serde_json::json!({
            "homed_axes": self.kin_state.homed_axes(),
            "position": self.kin_state.position.to_vec(),
            "print_time": self.print_time,
        });
        if let Some(extruder) = &self.extruder {
            status["extruder"] = extruder.get_status();
        }
        status
    }
}

pub(crate) fn read_homing_params(
    cfg: &Configfile,
    section: &str,
    position_min: f64,
    position_max: f64,
) -> Result<HomingParams, ConfigError> {
    let position_endstop = cfg.getfloat(section, "position_endstop", None, None, None, None)?;
    let speed = cfg.getfloat(section, "homing_speed", Some(5.0), None, None, Some(0.0))?;
    let second_homing_speed = cfg.getfloat(
        section,
        "second_homing_speed",
        Some(speed / 2.0),
        None,
        None,
        Some(0.0),
    )?;
    let retract_dist = cfg.getfloat(
        section,
        "homing_retract_dist",
        Some(5.0),
        Some(0.0),
        None,
        None,
    )?;
    // Default direction points at whichever travel end the endstop sits on.
    let inferred = position_endstop > (position_min + position_max) * 0.5;
    let positive_dir = cfg.getboolean(section, "homing_positive_dir", Some(inferred))?;
    Ok(HomingParams {
        position_endstop,
        speed,
        second_homing_speed,
        retract_dist,
        positive_dir,
    })
}
