// Structured command surface. The text tokenizer lives outside this core;
// a `Command` is a name plus keyword=value words. The dispatcher keeps the
// persistent coordinate/extrusion modes around G1 and routes the special
// commands to the homing and probing sequencers.

use crate::axis::{Axis, Pos, AXIS_COUNT};
use crate::configfile::Configfile;
use crate::error::{ConfigError, HomingError, MoveError, ProbeError};
use crate::homing;
use crate::probe::{self, Probe, ProbeResult};
use crate::toolhead::{MoveRequest, ToolHead};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("missing parameter '{param}' in '{command}'")]
    MissingParameter { command: String, param: String },
    #[error("unable to parse '{param}' in '{command}'")]
    InvalidParameter { command: String, param: String },
    #[error("invalid speed in '{0}'")]
    InvalidSpeed(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error(transparent)]
    Homing(#[from] HomingError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// A parsed command: uppercase name plus keyword=value argument map.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: HashMap<String, String>,
}

impl Command {
    pub fn new(name: &str, args: &[(&str, &str)]) -> Command {
        Command {
            name: name.to_ascii_uppercase(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v.to_string()))
                .collect(),
        }
    }

    /// Split one command line into words: `G1 X20 F3000` and
    /// `MULTIPROBE2 PROBE_NAME=nozzle Z=-1` both parse. Convenience for
    /// hosts (and tests) feeding plain fixture lines.
    pub fn from_line(line: &str) -> Command {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or("").to_ascii_uppercase();
        let mut args = HashMap::new();
        for word in parts {
            if let Some((key, value)) = word.split_once('=') {
                args.insert(key.to_ascii_uppercase(), value.to_string());
            } else {
                let mut chars = word.chars();
                if let Some(letter) = chars.next() {
                    args.insert(letter.to_ascii_uppercase().to_string(), chars.as_str().to_string());
                }
            }
        }
        Command { name, args }
    }

    pub fn has(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&str, CommandError> {
        self.args
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CommandError::MissingParameter {
                command: self.name.clone(),
                param: key.to_string(),
            })
    }

    pub fn get_float(&self, key: &str) -> Result<f64, CommandError> {
        self.get(key)?
            .parse::<f64>()
            .map_err(|_| CommandError::InvalidParameter {
                command: self.name.clone(),
                param: key.to_string(),
            })
    }

    pub fn get_float_opt(&self, key: &str) -> Result<Option<f64>, CommandError> {
        match self.args.get(key) {
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| CommandError::InvalidParameter {
                    command: self.name.clone(),
                    param: key.to_string(),
                }),
            None => Ok(None),
        }
    }
}

/// Command dispatcher and persistent G-code motion state.
///
/// Coordinates default to absolute (G90) and extrusion to relative (M83):
/// plain `G1 E<v>` words accumulate onto the current filament position.
pub struct GCodeDispatch {
    toolhead: Arc<Mutex<ToolHead>>,
    probes: HashMap<String, Probe>,
    pub absolute_coord: bool,
    pub absolute_extrude: bool,
    base_position: Pos,
    speed: f64,
    speed_factor: f64,
    last_probe: Option<ProbeResult>,
}

impl GCodeDispatch {
    pub fn new(toolhead: Arc<Mutex<ToolHead>>) -> Self {
        GCodeDispatch {
            toolhead,
            probes: HashMap::new(),
            absolute_coord: true,
            absolute_extrude: false,
            base_position: [0.0; AXIS_COUNT],
            speed: 25.0,
            speed_factor: 1.0 / 60.0,
            last_probe: None,
        }
    }

    /// Build the whole machine: toolhead plus declared probes.
    pub fn from_config(cfg: &Configfile) -> Result<Self, ConfigError> {
        let toolhead = ToolHead::new(cfg)?;
        let mut dispatch = GCodeDispatch::new(Arc::new(Mutex::new(toolhead)));
        for probe in probe::load_probes(cfg)? {
            dispatch.register_probe(probe);
        }
        Ok(dispatch)
    }

    pub fn toolhead(&self) -> Arc<Mutex<ToolHead>> {
        Arc::clone(&self.toolhead)
    }

    pub fn register_probe(&mut self, probe: Probe) {
        self.probes.insert(probe.name().to_string(), probe);
    }

    pub fn probe_mut(&mut self, name: &str) -> Option<&mut Probe> {
        self.probes.get_mut(name)
    }

    pub fn last_probe(&self) -> Option<&ProbeResult> {
        self.last_probe.as_ref()
    }

    pub fn execute(&mut self, cmd: &Command) -> Result<(), CommandError> {
        match cmd.name.as_str() {
            "G0" | "G1" => self.cmd_g1(cmd),
            "G28" => self.cmd_g28(cmd),
            "G90" => {
                self.absolute_coord = true;
                Ok(())
            }
            "G91" => {
                self.absolute_coord = false;
                Ok(())
            }
            "M82" => {
                self.absolute_extrude = true;
                Ok(())
            }
            "M83" => {
                self.absolute_extrude = false;
                Ok(())
            }
            "G92" => self.cmd_g92(cmd),
            "SET_KINEMATIC_POSITION" => self.cmd_set_kinematic_position(cmd),
            "HOME_EXTRUDER" => self.cmd_home_extruder(cmd),
            "MULTIPROBE2" => self.cmd_multiprobe2(cmd),
            other => Err(CommandError::UnknownCommand(other.to_string())),
        }
    }

    /// Run a raw line through `Command::from_line` and execute it.
    pub fn run_line(&mut self, line: &str) -> Result<(), CommandError> {
        self.execute(&Command::from_line(line))
    }

    fn cmd_g1(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let mut req = MoveRequest::new();
        {
            let th = self.toolhead.lock();
            let current = th.get_position();
            for axis in Axis::KINEMATIC {
                if let Some(value) = cmd.get_float_opt(axis.name())? {
                    if !th.space.is_declared(axis) {
                        return Err(ConfigError::UnknownAxis(axis).into());
                    }
                    let idx = axis.index();
                    let target = if self.absolute_coord {
                        value + self.base_position[idx]
                    } else {
                        current[idx] + value
                    };
                    req.targets.push((axis, target));
                }
            }
            if let Some(value) = cmd.get_float_opt("E")? {
                let idx = Axis::E.index();
                let target = if !self.absolute_coord || !self.absolute_extrude {
                    current[idx] + value
                } else {
                    value + self.base_position[idx]
                };
                req.targets.push((Axis::E, target));
            }
        }
        if let Some(feed) = cmd.get_float_opt("F")? {
            if feed <= 0.0 {
                return Err(CommandError::InvalidSpeed(cmd.name.clone()));
            }
            self.speed = feed * self.speed_factor;
        }
        req.speed = Some(self.speed);
        self.toolhead.lock().submit_move(&req)?;
        Ok(())
    }

    fn cmd_g28(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let mut th = self.toolhead.lock();
        let mut axes: Vec<Axis> = Axis::KINEMATIC
            .iter()
            .copied()
            .filter(|axis| cmd.has(axis.name()))
            .collect();
        if axes.is_empty() {
            // Home everything configured; the extruder joins only when it
            // was declared homeable.
            axes = th
                .space
                .declared()
                .filter(|axis| !axis.is_extruder())
                .collect();
            if th.space.is_homeable(Axis::E) {
                axes.push(Axis::E);
            }
        }
        for axis in axes {
            homing::home_axis(&mut th, axis)?;
        }
        Ok(())
    }

    fn cmd_g92(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let current = self.toolhead.lock().get_position();
        let mut any = false;
        for axis in Axis::ALL {
            if let Some(offset) = cmd.get_float_opt(axis.name())? {
                let idx = axis.index();
                self.base_position[idx] = current[idx] - offset;
                any = true;
            }
        }
        if !any {
            self.base_position = current;
        }
        Ok(())
    }

    fn cmd_set_kinematic_position(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let mut targets: Vec<(Axis, f64)> = Vec::new();
        for axis in Axis::ALL {
            if let Some(value) = cmd.get_float_opt(axis.name())? {
                targets.push((axis, value));
            }
        }
        self.toolhead.lock().override_position(&targets);
        Ok(())
    }

    fn cmd_home_extruder(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let name = cmd.get("EXTRUDER")?.to_string();
        let mut th = self.toolhead.lock();
        homing::home_extruder(&mut th, &name)?;
        Ok(())
    }

    fn cmd_multiprobe2(&mut self, cmd: &Command) -> Result<(), CommandError> {
        let name = cmd.get("PROBE_NAME")?.to_string();
        let mut vector: Vec<(Axis, f64)> = Vec::new();
        for axis in Axis::ALL {
            if let Some(delta) = cmd.get_float_opt(axis.name())? {
                vector.push((axis, delta));
            }
        }
        let speed = match cmd.get_float_opt("F")? {
            Some(feed) if feed <= 0.0 => return Err(CommandError::InvalidSpeed(cmd.name.clone())),
            Some(feed) => Some(feed * self.speed_factor),
            None => None,
        };
        let probe = self
            .probes
            .get(&name)
            .ok_or_else(|| ConfigError::UnknownProbe(name.clone()))?;
        let mut th = self.toolhead.lock();
        let result = probe::run_probe(&mut th, probe, &vector, speed)?;
        drop(th);
        self.last_probe = Some(result);
        Ok(())
    }

    pub fn get_status(&self) -> serde_json::Value {
        let th = self.toolhead.lock();
        let mut status = serde_json::json!({
            "toolhead": th.get_status(),
            "absolute_coordinates": self.absolute_coord,
            "absolute_extrude": self.absolute_extrude,
            "speed": self.speed,
        });
        if let Some(result) = &self.last_probe {
            status["last_probe"] = serde_json::json!({
                "probe": result.probe,
                "z": result.position[Axis::Z.index()],
            });
        }
        status
    }
}
