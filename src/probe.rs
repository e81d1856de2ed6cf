// Multi-stage probing (MULTIPROBE2 style): drive along a displacement
// vector until the probe pin asserts, retract and dwell, re-approach at
// reduced speed, then report the trigger position adjusted by the probe's
// z_offset. Probes may be bound to any body, including the extruder nozzle.

use crate::axis::{Axis, Pos};
use crate::configfile::Configfile;
use crate::endstop::{PinSpec, StaticPin, TriggerPin};
use crate::error::{ConfigError, ProbeError};
use crate::homing::{staged_trigger_seek, SeekError, SeekPlan, SeekStage};
use crate::toolhead::{ToolHead, TriggerRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeParams {
    pub name: String,
    pub pin: PinSpec,
    /// Trigger-to-surface distance subtracted from the reported Z.
    pub z_offset: f64,
    /// Default probing speed when a command carries no feed rate.
    pub speed: f64,
    /// Back-off between the seek and the recheck pass.
    pub sample_retract_dist: f64,
    /// Dwell after the retract, before re-approaching.
    pub recovery_time: f64,
}

pub struct Probe {
    pub params: ProbeParams,
    pin: Box<dyn TriggerPin>,
}

impl Probe {
    /// Build a probe from a `[probe <name>]` section.
    pub fn from_config(cfg: &Configfile, section: &str) -> Result<Probe, ConfigError> {
        let name = section
            .strip_prefix("probe ")
            .unwrap_or(section)
            .to_string();
        let pin = PinSpec::parse(&cfg.get(section, "pin")?);
        let z_offset = cfg.getfloat(section, "z_offset", None, None, None, None)?;
        let speed = cfg.getfloat(section, "speed", Some(5.0), None, None, Some(0.0))?;
        let sample_retract_dist = cfg.getfloat(
            section,
            "sample_retract_dist",
            Some(2.0),
            None,
            None,
            Some(0.0),
        )?;
        let recovery_time =
            cfg.getfloat(section, "recovery_time", Some(0.4), Some(0.0), None, None)?;
        Ok(Probe {
            params: ProbeParams {
                name,
                pin,
                z_offset,
                speed,
                sample_retract_dist,
                recovery_time,
            },
            // The physical pin is attached by the embedding host
            pin: Box::new(StaticPin(false)),
        })
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn set_pin(&mut self, pin: Box<dyn TriggerPin>) {
        self.pin = pin;
    }
}

/// Every probe declared in the config, in section order.
pub fn load_probes(cfg: &Configfile) -> Result<Vec<Probe>, ConfigError> {
    cfg.sections_with_prefix("probe ")
        .iter()
        .map(|section| Probe::from_config(cfg, section))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    Idle,
    Seek,
    Retract,
    Recheck,
    Reported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub probe: String,
    /// Raw position at the final trigger.
    pub trigger: Pos,
    /// Trigger position with z_offset applied on the probe axis.
    pub position: Pos,
}

/// One probe invocation. Created per command, dropped once the result is
/// reported or the session fails.
pub struct ProbeSession {
    pub probe: String,
    pub phase: ProbePhase,
}

impl ProbeSession {
    pub fn new(probe: &str) -> Self {
        ProbeSession {
            probe: probe.to_string(),
            phase: ProbePhase::Idle,
        }
    }

    fn run(
        &mut self,
        th: &mut ToolHead,
        probe: &Probe,
        vector: &[(Axis, f64)],
        speed: f64,
    ) -> Result<ProbeResult, ProbeError> {
        let start = th.kin_state().position;
        let mut target = start;
        let mut touches_z = false;
        for (axis, delta) in vector {
            target[axis.index()] += delta;
            if *axis == Axis::Z && *delta != 0.0 {
                touches_z = true;
            }
        }
        log::info!(
            "probe '{}' seek from {:?} by {:?} at {:.1} mm/s",
            self.probe,
            &start[..3],
            vector,
            speed
        );

        let src = TriggerRef::Pin(probe.pin.as_ref());
        if th.poll_trigger(&src) {
            return Err(ProbeError::TriggeredPriorToMovement {
                probe: self.probe.clone(),
            });
        }

        let plan = SeekPlan {
            src,
            target,
            coarse_speed: speed,
            // Recheck mirrors homing's fine pass at half the requested rate
            fine_speed: speed * 0.5,
            retract_dist: probe.params.sample_retract_dist,
            recovery_time: probe.params.recovery_time,
            check_retract_release: false,
        };
        let phase = &mut self.phase;
        let outcome = staged_trigger_seek(th, &plan, |stage| {
            *phase = match stage {
                SeekStage::Coarse => ProbePhase::Seek,
                SeekStage::Retract => ProbePhase::Retract,
                SeekStage::Fine => ProbePhase::Recheck,
            };
        });
        let trigger = match outcome {
            Ok(pos) => pos,
            Err(SeekError::NoTrigger) => {
                return Err(ProbeError::Miss {
                    probe: self.probe.clone(),
                })
            }
            // Probes re-arm without a release check
            Err(SeekError::StillTriggered) => unreachable!(),
        };

        self.phase = ProbePhase::Reported;
        let mut position = trigger;
        if touches_z {
            let z = Axis::Z.index();
            position[z] = trigger[z] - probe.params.z_offset;
            th.commit_homed(Axis::Z, position[z]);
        }
        log::info!(
            "probe '{}' trigger at x={:.3} y={:.3} z={:.3} (reported z={:.3})",
            self.probe,
            trigger[0],
            trigger[1],
            trigger[2],
            position[2]
        );
        Ok(ProbeResult {
            probe: self.probe.clone(),
            trigger,
            position,
        })
    }
}

/// Run a probe along a displacement vector. The move queue drains first;
/// every axis the vector touches is session-owned until completion.
pub fn run_probe(
    th: &mut ToolHead,
    probe: &Probe,
    vector: &[(Axis, f64)],
    speed: Option<f64>,
) -> Result<ProbeResult, ProbeError> {
    let speed = speed.unwrap_or(probe.params.speed);
    let axes: Vec<Axis> = vector
        .iter()
        .filter(|(_, delta)| *delta != 0.0)
        .map(|(axis, _)| *axis)
        .collect();
    if axes.is_empty() {
        return Err(ProbeError::EmptyVector);
    }

    th.wait_moves();
    let session_id = th.claim_axes(&axes).map_err(ProbeError::AxisBusy)?;
    let mut session = ProbeSession::new(probe.name());
    let result = session.run(th, probe, vector, speed);
    th.release_session(session_id);
    result
}
