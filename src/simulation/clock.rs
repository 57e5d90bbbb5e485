//! Simulation clock: drives the four loops from one time source
//!
//! The movement tick runs at most once per `min_frame_delta_ms`. The step,
//! major-decision and greeting loops each fire on their own fixed interval.
//! Timers keep their cadence while the modal is open; the loops themselves
//! no-op.

use crate::core::config::ClockConfig;
use crate::core::types::Millis;
use crate::simulation::decision::{run_major_loop, run_step_loop};
use crate::simulation::events::SimulationEvent;
use crate::simulation::greeting::run_greeter;
use crate::simulation::state::SimState;
use crate::simulation::tick::run_movement_tick;

/// Fixed-interval timer
///
/// Missed fires are coalesced: after a long stall the timer fires once and
/// re-aligns to its original cadence.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    interval: Millis,
    next_due: Millis,
}

impl IntervalTimer {
    pub fn new(interval: Millis, now: Millis) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// Whether the timer fired at `now`
    pub fn poll(&mut self, now: Millis) -> bool {
        if now < self.next_due {
            return false;
        }
        let missed = (now - self.next_due) / self.interval;
        self.next_due += (missed + 1) * self.interval;
        true
    }

    pub fn next_due(&self) -> Millis {
        self.next_due
    }
}

pub struct SimulationClock {
    min_frame_delta: Millis,
    last_frame: Option<Millis>,
    step: IntervalTimer,
    major: IntervalTimer,
    greeter: IntervalTimer,
}

impl SimulationClock {
    pub fn new(config: &ClockConfig, now: Millis) -> Self {
        Self {
            min_frame_delta: config.min_frame_delta_ms,
            last_frame: None,
            step: IntervalTimer::new(config.step_interval_ms, now),
            major: IntervalTimer::new(config.major_interval_ms, now),
            greeter: IntervalTimer::new(config.greeter_interval_ms, now),
        }
    }

    fn frame_due(&mut self, now: Millis) -> bool {
        match self.last_frame {
            Some(last) if now.saturating_sub(last) < self.min_frame_delta => false,
            _ => {
                self.last_frame = Some(now);
                true
            }
        }
    }

    /// Run every loop that is due at `now`, returning their events in order
    pub fn advance(&mut self, state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
        let mut events = Vec::new();

        if self.frame_due(now) {
            events.extend(run_movement_tick(state, now));
        }
        if self.step.poll(now) {
            events.extend(run_step_loop(state, now));
        }
        if self.major.poll(now) {
            tracing::trace!("major decision cycle at {}", now);
            events.extend(run_major_loop(state, now));
        }
        if self.greeter.poll(now) {
            events.extend(run_greeter(state, now));
        }

        events
    }
}
