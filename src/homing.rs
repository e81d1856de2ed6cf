// Homing sequencer: drives one axis from an unknown position to its
// endstop-referenced position with a coarse approach, a retract, and a fine
// re-approach. The staged trigger-seek below is shared with the probe
// sequencer; the two differ only in trigger source, speeds and phase
// bookkeeping.

use crate::axis::{Axis, HomingParams, Pos, AXIS_COUNT};
use crate::error::{ConfigError, HomingError};
use crate::toolhead::{SeekResult, ToolHead, TriggerRef};

/// Stage callbacks from `staged_trigger_seek`, mapped by each sequencer
/// onto its own phase enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeekStage {
    Coarse,
    Retract,
    Fine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeekError {
    /// The vector was exhausted without the trigger asserting.
    NoTrigger,
    /// The trigger stayed asserted after the retract leg.
    StillTriggered,
}

pub(crate) struct SeekPlan<'a> {
    pub src: TriggerRef<'a>,
    pub target: Pos,
    pub coarse_speed: f64,
    pub fine_speed: f64,
    /// Back-off between passes; zero runs a single coarse pass.
    pub retract_dist: f64,
    /// Dwell after the retract, before re-approaching.
    pub recovery_time: f64,
    /// Fail if the trigger is still asserted once retracted.
    pub check_retract_release: bool,
}

/// Two-speed trigger seek: approach until the trigger fires, back off along
/// the negated approach vector, then re-approach slowly for a precise
/// trigger position. Returns the final trigger position.
pub(crate) fn staged_trigger_seek(
    th: &mut ToolHead,
    plan: &SeekPlan<'_>,
    mut on_stage: impl FnMut(SeekStage),
) -> Result<Pos, SeekError> {
    let start = th.kin_state().position;

    on_stage(SeekStage::Coarse);
    let trig = match th.drive_until_trigger(&plan.src, &plan.target, plan.coarse_speed) {
        SeekResult::Triggered(pos) => pos,
        SeekResult::Exhausted => return Err(SeekError::NoTrigger),
    };
    if plan.retract_dist <= 0.0 {
        return Ok(trig);
    }

    on_stage(SeekStage::Retract);
    let mut approach_d2 = 0.0;
    let mut traveled_d2 = 0.0;
    for i in 0..AXIS_COUNT {
        let ad = plan.target[i] - start[i];
        let td = trig[i] - start[i];
        approach_d2 += ad * ad;
        traveled_d2 += td * td;
    }
    let approach_d = approach_d2.sqrt();
    // Never retract past the original start position
    let retract_d = plan.retract_dist.min(traveled_d2.sqrt());
    let mut retract_pos = trig;
    for i in 0..AXIS_COUNT {
        let unit = (plan.target[i] - start[i]) / approach_d;
        retract_pos[i] = trig[i] - unit * retract_d;
    }
    th.drive_direct(&retract_pos, plan.coarse_speed);
    if plan.recovery_time > 0.0 {
        th.dwell(plan.recovery_time);
    }
    if plan.check_retract_release && th.poll_trigger(&plan.src) {
        return Err(SeekError::StillTriggered);
    }

    on_stage(SeekStage::Fine);
    match th.drive_until_trigger(&plan.src, &plan.target, plan.fine_speed) {
        SeekResult::Triggered(pos) => Ok(pos),
        SeekResult::Exhausted => Err(SeekError::NoTrigger),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    Idle,
    Approaching,
    Backoff,
    FinalApproach,
    Done,
}

/// One axis-homing invocation. Created when homing starts, dropped when the
/// phase reaches `Done` or the session fails.
pub struct HomingSession {
    pub axis: Axis,
    pub phase: HomingPhase,
}

impl HomingSession {
    pub fn new(axis: Axis) -> Self {
        HomingSession {
            axis,
            phase: HomingPhase::Idle,
        }
    }

    fn run(
        &mut self,
        th: &mut ToolHead,
        hp: HomingParams,
        position_min: f64,
        position_max: f64,
    ) -> Result<(), HomingError> {
        let axis = self.axis;
        log::info!(
            "homing move begin on {}: coarse {:.1} mm/s, fine {:.1} mm/s",
            axis,
            hp.speed,
            hp.second_homing_speed
        );

        // Force the start of travel so the approach always spans the whole
        // axis, whatever position the machine actually sits at.
        let travel = if hp.positive_dir {
            hp.position_endstop - position_min
        } else {
            position_max - hp.position_endstop
        };
        let forced_start = if hp.positive_dir {
            hp.position_endstop - 1.5 * travel
        } else {
            hp.position_endstop + 1.5 * travel
        };
        th.force_position(axis, forced_start);

        let mut target = th.kin_state().position;
        target[axis.index()] = hp.position_endstop;

        let plan = SeekPlan {
            src: TriggerRef::Endstop(axis),
            target,
            coarse_speed: hp.speed,
            fine_speed: hp.second_homing_speed,
            retract_dist: hp.retract_dist,
            recovery_time: 0.0,
            check_retract_release: true,
        };
        let phase = &mut self.phase;
        let outcome = staged_trigger_seek(th, &plan, |stage| {
            *phase = match stage {
                SeekStage::Coarse => HomingPhase::Approaching,
                SeekStage::Retract => HomingPhase::Backoff,
                SeekStage::Fine => HomingPhase::FinalApproach,
            };
        });
        match outcome {
            Ok(trig) => {
                self.phase = HomingPhase::Done;
                th.commit_homed(axis, hp.position_endstop);
                log::info!(
                    "homing move end on {}: trigger at {:.3}, position set to {:.3}",
                    axis,
                    trig[axis.index()],
                    hp.position_endstop
                );
                Ok(())
            }
            Err(SeekError::NoTrigger) => Err(HomingError::Timeout { axis }),
            Err(SeekError::StillTriggered) => Err(HomingError::EndstopStillTriggered { axis }),
        }
    }
}

/// Home one axis. The move queue drains first; the axis is session-owned
/// for the whole operation and left untrusted on any failure.
pub fn home_axis(th: &mut ToolHead, axis: Axis) -> Result<(), HomingError> {
    let hp = *th.space.homing_params(axis)?;
    let (position_min, position_max) = th.space.axis_limits(axis)?;

    th.wait_moves();
    let session_id = th.claim_axes(&[axis]).map_err(HomingError::AxisBusy)?;
    let mut session = HomingSession::new(axis);
    let result = session.run(th, hp, position_min, position_max);
    th.release_session(session_id);
    if result.is_err() {
        th.set_untrusted(axis);
        log::warn!("homing failed on {}: axis left untrusted", axis);
    }
    result
}

/// Home the named extruder's stepper via its own endstop.
pub fn home_extruder(th: &mut ToolHead, extruder_name: &str) -> Result<(), HomingError> {
    match &th.extruder {
        Some(extruder) if extruder.name == extruder_name => {
            if !extruder.can_home {
                return Err(ConfigError::NotHomeable(Axis::E).into());
            }
            home_axis(th, Axis::E)
        }
        _ => Err(ConfigError::UnknownExtruder(extruder_name.to_string()).into()),
    }
}
