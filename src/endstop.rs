// Trigger pin abstraction for endstops and probes. The MCU-side pin driver
// is out of scope; the host polls a `TriggerPin` at each step of a
// homing/probing drive. Position-threshold simulations stand in for real
// switches in host-side testing.

use crate::axis::{Axis, Pos};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pin description as written in the config: optional `!` (invert) and `^`
/// (pullup) prefixes ahead of the chip pin name. The name itself stays
/// opaque to this core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSpec {
    pub name: String,
    pub invert: bool,
    pub pullup: bool,
}

impl PinSpec {
    pub fn parse(pin: &str) -> PinSpec {
        let mut rest = pin.trim();
        let mut invert = false;
        let mut pullup = false;
        loop {
            if let Some(stripped) = rest.strip_prefix('!') {
                invert = true;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('^') {
                pullup = true;
                rest = stripped;
            } else {
                break;
            }
        }
        PinSpec {
            name: rest.to_string(),
            invert,
            pullup,
        }
    }
}

/// A queryable trigger source. `query` returns true while the switch is
/// asserted at the given toolhead position.
pub trait TriggerPin: Send {
    fn query(&self, pos: &Pos) -> bool;
}

/// Fixed-level pin; a `StaticPin(false)` never triggers, so homing against
/// it runs the full travel and times out.
#[derive(Debug, Clone, Copy)]
pub struct StaticPin(pub bool);

impl TriggerPin for StaticPin {
    fn query(&self, _pos: &Pos) -> bool {
        self.0
    }
}

/// Asserts once an axis coordinate crosses a threshold, on the side the
/// switch physically sits: `positive_dir` endstops trigger at-or-above the
/// threshold, the rest at-or-below.
#[derive(Debug, Clone, Copy)]
pub struct AxisTrigger {
    pub axis: Axis,
    pub trigger_at: f64,
    pub positive_dir: bool,
}

impl TriggerPin for AxisTrigger {
    fn query(&self, pos: &Pos) -> bool {
        let p = pos[self.axis.index()];
        if self.positive_dir {
            p >= self.trigger_at
        } else {
            p <= self.trigger_at
        }
    }
}

/// Externally controlled pin, for driving trigger state from a test or a
/// transport callback.
#[derive(Debug, Clone, Default)]
pub struct SharedPin {
    state: Arc<AtomicBool>,
}

impl SharedPin {
    pub fn new(asserted: bool) -> Self {
        SharedPin {
            state: Arc::new(AtomicBool::new(asserted)),
        }
    }

    pub fn handle(&self) -> SharedPin {
        SharedPin {
            state: Arc::clone(&self.state),
        }
    }

    pub fn set(&self, asserted: bool) {
        self.state.store(asserted, Ordering::SeqCst);
    }
}

impl TriggerPin for SharedPin {
    fn query(&self, _pos: &Pos) -> bool {
        self.state.load(Ordering::SeqCst)
    }
}
