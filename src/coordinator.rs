//! Outer tick loop: clock interface, session sequencing, and run
//! termination.

use tracing::{error, info};

use crate::control::SetpointEngine;
use crate::occupancy::OccupancyTimeline;
use crate::session::SimulationSession;

use std::io::{BufRead, Write};

/// Source of granted logical time.
///
/// The federation handshake that actually arbitrates time lives outside
/// this crate; the coordinator only consumes the granted tick time, the
/// step size, and a blocking wait for the next grant.
pub trait ClockSource {
    /// Logical duration of one tick.
    fn step_size(&self) -> f64;
    /// Registers the next time the coordinator wants to advance to.
    fn request_advance(&mut self, time: f64);
    /// Blocks until the requested time is granted and returns it.
    fn await_grant(&mut self) -> f64;
}

/// A clock that grants every requested advance immediately.
///
/// Stands in for the federation when the simulators are the only pacing
/// constraint (they block on the socket exchange anyway).
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: f64,
    granted: f64,
    requested: f64,
}

impl FixedStepClock {
    pub fn new(step: f64) -> Self {
        Self {
            step,
            granted: 0.0,
            requested: 0.0,
        }
    }
}

impl ClockSource for FixedStepClock {
    fn step_size(&self) -> f64 {
        self.step
    }

    fn request_advance(&mut self, time: f64) {
        self.requested = time;
    }

    fn await_grant(&mut self) -> f64 {
        self.granted = self.requested;
        self.granted
    }
}

/// Drives the per-tick pass over all sessions.
///
/// Sessions are visited sequentially in a fixed order. Ordering has no
/// semantic effect (sessions are fully independent) but every session must
/// complete its exchange before the shared clock advances, and a
/// termination signal from any one of them ends the run only after the
/// current full pass — aborting mid-pass would leave simulators blocked on
/// sends that never arrive.
pub struct TickCoordinator<R, W, C> {
    sessions: Vec<SimulationSession<R, W>>,
    timeline: OccupancyTimeline,
    occupied_counts: Vec<usize>,
    engine: SetpointEngine,
    clock: C,
    timesteps_per_hour: usize,
}

impl<R: BufRead, W: Write, C: ClockSource> TickCoordinator<R, W, C> {
    /// Creates a coordinator over the given sessions.
    ///
    /// # Panics
    ///
    /// Panics if the occupancy timeline is empty; the wraparound contract
    /// needs at least one sample.
    pub fn new(
        sessions: Vec<SimulationSession<R, W>>,
        timeline: OccupancyTimeline,
        engine: SetpointEngine,
        clock: C,
        timesteps_per_hour: usize,
    ) -> Self {
        assert!(!timeline.is_empty(), "occupancy timeline must not be empty");
        assert!(timesteps_per_hour > 0, "timesteps_per_hour must be > 0");
        let occupied_counts = timeline.daily_occupied_counts(timesteps_per_hour * 24);
        Self {
            sessions,
            timeline,
            occupied_counts,
            engine,
            clock,
            timesteps_per_hour,
        }
    }

    /// Runs ticks until a simulator requests termination or a session's
    /// protocol breaks.
    ///
    /// Returns the sessions so callers can inspect final state.
    pub fn run(mut self) -> Vec<SimulationSession<R, W>> {
        let mut cursor = 0usize;
        let mut current_time = 0.0;
        self.clock.request_advance(current_time);

        loop {
            let time = self.clock.await_grant();

            // Advance the occupancy cursor, wrapping when the loaded
            // horizon is exhausted. A wrap re-anchors every scheduler's
            // day bookkeeping at the reset point.
            let scheduler_lookup = self.timeline.sample_at(cursor);
            if scheduler_lookup.wrapped {
                cursor = 0;
                for session in &mut self.sessions {
                    session.resync_appliance(cursor, &self.occupied_counts);
                }
            }
            let scheduler_sample = if scheduler_lookup.wrapped {
                self.timeline.sample_at(0).sample
            } else {
                scheduler_lookup.sample
            };
            let hour = cursor / self.timesteps_per_hour;
            let engine_sample = self.timeline.sample_at(hour).sample;

            info!(time, cursor, hour, "tick start");

            let mut terminate = false;
            for session in &mut self.sessions {
                match session.run_tick(
                    &self.engine,
                    cursor,
                    &engine_sample,
                    &scheduler_sample,
                    &self.occupied_counts,
                ) {
                    Ok(outcome) => terminate |= outcome.terminate,
                    Err(e) => {
                        // A broken session ends the run, but only after
                        // the remaining sessions finish this tick.
                        error!(
                            building = %session.profile().name,
                            error = %e,
                            "protocol failure, terminating after this pass"
                        );
                        terminate = true;
                    }
                }
            }

            if terminate {
                info!(time, "run terminating");
                return self.sessions;
            }

            cursor += 1;
            current_time = time + self.clock.step_size();
            self.clock.request_advance(current_time);
        }
    }
}
