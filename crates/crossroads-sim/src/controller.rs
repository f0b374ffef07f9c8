//! Signal state machine for a four-lane intersection.
//!
//! The controller is time-free: the link layer owns the clock and calls
//! [`SignalController::advance`] when the current phase's duration runs
//! out. That keeps the cycle logic testable without a runtime.
//!
//! Automatic cycle, per lane:
//!
//! ```text
//! Green(n) --green--> Yellow(n) --yellow--> AllRed --all_red--> Green(n+1)
//! ```
//!
//! A manual override freezes the cycle. Resuming clears every lane to red
//! and restarts the cycle at the lane that was interrupted.

use std::time::Duration;

use crossroads_types::intersection::LANE_COUNT;
use crossroads_types::{IntersectionReport, ManualDirective, SignalColor};

#[allow(clippy::cast_lossless)]
const LANES: usize = LANE_COUNT as usize;

/// How long each automatic phase lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Active lane green.
    pub green: Duration,
    /// Active lane yellow.
    pub yellow: Duration,
    /// Every lane red between two lanes.
    pub all_red: Duration,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            green: Duration::from_secs(5),
            yellow: Duration::from_secs(2),
            all_red: Duration::from_secs(1),
        }
    }
}

/// Position within the automatic cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `lane` is green.
    Green,
    /// `lane` is yellow.
    Yellow,
    /// Every lane is red; `next` turns green afterwards.
    AllRed {
        /// Lane that turns green when this phase ends.
        next: u8,
    },
}

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Cycling on its own.
    Automatic {
        /// Lane the cycle is serving.
        lane: u8,
        /// Current phase.
        phase: Phase,
    },
    /// Held by an operator.
    Manual {
        /// Lane that was being served when the override arrived.
        interrupted: u8,
    },
}

/// Result of applying a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The lights changed and a report should go out.
    Changed,
    /// Nothing to do.
    Ignored,
    /// The command was unusable; carries the reason.
    Rejected(String),
}

/// Four-lane signal controller.
#[derive(Debug, Clone)]
pub struct SignalController {
    timings: PhaseTimings,
    mode: Mode,
    lights: [SignalColor; LANES],
}

impl SignalController {
    /// Start the automatic cycle with lane 1 green.
    pub fn new(timings: PhaseTimings) -> Self {
        let mut controller = Self {
            timings,
            mode: Mode::Automatic {
                lane: 1,
                phase: Phase::Green,
            },
            lights: [SignalColor::Red; LANES],
        };
        controller.show(1, SignalColor::Green);
        controller
    }

    /// Current color of every lane, lane 1 first.
    pub const fn lights(&self) -> &[SignalColor] {
        &self.lights
    }

    /// Whether an operator override is in effect.
    pub const fn is_manual(&self) -> bool {
        matches!(self.mode, Mode::Manual { .. })
    }

    /// Duration of the current phase, or `None` while held manually.
    pub const fn phase_duration(&self) -> Option<Duration> {
        match self.mode {
            Mode::Automatic { phase, .. } => Some(match phase {
                Phase::Green => self.timings.green,
                Phase::Yellow => self.timings.yellow,
                Phase::AllRed { .. } => self.timings.all_red,
            }),
            Mode::Manual { .. } => None,
        }
    }

    /// Report the current lights, stamped with the local time.
    pub fn report(&self) -> IntersectionReport {
        IntersectionReport::now(self.lights())
    }

    /// Move to the next automatic phase. Does nothing while manual.
    pub fn advance(&mut self) {
        let Mode::Automatic { lane, phase } = self.mode else {
            return;
        };

        self.mode = match phase {
            Phase::Green => {
                self.show(lane, SignalColor::Yellow);
                Mode::Automatic {
                    lane,
                    phase: Phase::Yellow,
                }
            }
            Phase::Yellow => {
                self.all_red();
                Mode::Automatic {
                    lane,
                    phase: Phase::AllRed {
                        next: next_lane(lane),
                    },
                }
            }
            Phase::AllRed { next } => {
                self.show(next, SignalColor::Green);
                Mode::Automatic {
                    lane: next,
                    phase: Phase::Green,
                }
            }
        };
    }

    /// Apply an operator directive.
    pub fn apply(&mut self, directive: &ManualDirective) -> Applied {
        match directive {
            ManualDirective::Override { lane, color } => {
                let interrupted = match self.mode {
                    Mode::Automatic { lane, .. } => lane,
                    Mode::Manual { interrupted } => interrupted,
                };
                self.mode = Mode::Manual { interrupted };
                self.show(*lane, *color);
                Applied::Changed
            }
            ManualDirective::Resume => match self.mode {
                Mode::Manual { interrupted } => {
                    self.all_red();
                    self.mode = Mode::Automatic {
                        lane: interrupted,
                        phase: Phase::AllRed { next: interrupted },
                    };
                    Applied::Changed
                }
                Mode::Automatic { .. } => Applied::Ignored,
            },
            ManualDirective::Invalid(reason) => Applied::Rejected(reason.clone()),
        }
    }

    /// Set `lane` to `color` and every other lane to red.
    fn show(&mut self, lane: u8, color: SignalColor) {
        self.all_red();
        let slot = usize::from(lane)
            .checked_sub(1)
            .and_then(|index| self.lights.get_mut(index));
        if let Some(light) = slot {
            *light = color;
        }
    }

    fn all_red(&mut self) {
        self.lights = [SignalColor::Red; LANES];
    }
}

const fn next_lane(lane: u8) -> u8 {
    if lane >= LANE_COUNT { 1 } else { lane.saturating_add(1) }
}
