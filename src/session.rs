//! One simulator connection: per-tick receive/decide/send and the
//! building's mutable control state.

use std::io::{BufRead, Write};

use tracing::{info, warn};

use crate::backend;
use crate::config::BuildingProfile;
use crate::control::{ApplianceScheduler, HysteresisState, SetpointEngine, Setpoints};
use crate::occupancy::OccupancySample;
use crate::protocol::{self, ProtocolError};

/// Mutable per-building control state, owned by its session.
///
/// Temperatures persist across ticks: a block that omits a reading keeps
/// the last received value. Setpoints are reset to the unset sentinels at
/// the start of every decide phase.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub setpoints: Setpoints,
    pub hysteresis: HysteresisState,
    pub indoor_temp: f64,
    pub outdoor_temp: f64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            setpoints: Setpoints::unset(),
            hysteresis: HysteresisState::default(),
            indoor_temp: 0.0,
            outdoor_temp: 0.0,
        }
    }
}

/// Result of one completed protocol round.
#[derive(Debug, Clone, Copy)]
pub struct TickOutcome {
    /// The simulator asked for global run termination. Combined by the
    /// coordinator after the full tick pass; never acted on mid-pass.
    pub terminate: bool,
}

/// Owns one simulator connection and that building's control state.
///
/// Generic over the stream halves so tests can run the full protocol round
/// against in-memory buffers.
pub struct SimulationSession<R, W> {
    profile: BuildingProfile,
    reader: R,
    writer: W,
    state: SessionState,
    appliance: Option<ApplianceScheduler>,
}

impl<R: BufRead, W: Write> SimulationSession<R, W> {
    pub fn new(
        profile: BuildingProfile,
        reader: R,
        writer: W,
        appliance: Option<ApplianceScheduler>,
    ) -> Self {
        Self {
            profile,
            reader,
            writer,
            state: SessionState::default(),
            appliance,
        }
    }

    pub fn profile(&self) -> &BuildingProfile {
        &self.profile
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Re-anchors the appliance scheduler after an occupancy-cursor reset.
    pub fn resync_appliance(&mut self, cursor: usize, occupied_counts: &[usize]) {
        if let Some(scheduler) = &mut self.appliance {
            scheduler.resync(cursor, occupied_counts);
        }
    }

    /// Executes one full protocol round: receive sensor block, decide
    /// setpoints and appliance command, send the command block.
    ///
    /// `engine_sample` is the occupancy sample the setpoint engine sees
    /// (hour-indexed); `scheduler_sample` is the tick-indexed one, used by
    /// the appliance scheduler and the external backend.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the exchange breaks mid-block; the
    /// coordinator treats that as run termination after the current pass.
    pub fn run_tick(
        &mut self,
        engine: &SetpointEngine,
        cursor: usize,
        engine_sample: &OccupancySample,
        scheduler_sample: &OccupancySample,
        occupied_counts: &[usize],
    ) -> Result<TickOutcome, ProtocolError> {
        let block = protocol::read_sensor_block(&mut self.reader)?;
        if let Some(outdoor) = block.outdoor_temp {
            self.state.outdoor_temp = outdoor;
        }
        if let Some(indoor) = block.indoor_temp {
            self.state.indoor_temp = indoor;
        }

        self.decide(engine, engine_sample, scheduler_sample.status);

        let dishwasher = match &mut self.appliance {
            Some(scheduler) => scheduler.command(cursor, scheduler_sample, occupied_counts),
            None => 0,
        };

        protocol::write_command_block(
            &mut self.writer,
            &block.time,
            &self.state.setpoints.cool_str,
            &self.state.setpoints.heat_str,
            dishwasher,
        )?;

        info!(
            building = %self.profile.name,
            time = %block.time,
            cool = %self.state.setpoints.cool_str,
            heat = %self.state.setpoints.heat_str,
            dishwasher,
            "command block sent"
        );

        Ok(TickOutcome {
            terminate: block.terminate,
        })
    }

    /// Computes this tick's setpoints, via the external backend when the
    /// profile names one, otherwise via the built-in engine.
    ///
    /// The backend gets the tick-indexed `backend_status`, not the engine's
    /// hour-indexed sample.
    fn decide(&mut self, engine: &SetpointEngine, sample: &OccupancySample, backend_status: u8) {
        // Reset first so a failed exchange is detectable downstream.
        self.state.setpoints = Setpoints::unset();

        match &self.profile.backend_command {
            Some(command_line) => {
                match backend::run_backend(
                    &self.profile,
                    command_line,
                    self.state.indoor_temp,
                    self.state.outdoor_temp,
                    backend_status,
                ) {
                    Ok(result) if result.usable() => {
                        // The backend speaks in strings; the numeric side
                        // stays at the sentinels, marking the values as
                        // externally produced.
                        if let Some(heat) = result.heat_str {
                            self.state.setpoints.heat_str = heat;
                        }
                        if let Some(cool) = result.cool_str {
                            self.state.setpoints.cool_str = cool;
                        }
                    }
                    Ok(_) => {
                        warn!(
                            building = %self.profile.name,
                            "backend produced no setpoints, sending unset sentinels"
                        );
                    }
                    Err(e) => {
                        warn!(
                            building = %self.profile.name,
                            error = %e,
                            "backend failed to run, sending unset sentinels"
                        );
                    }
                }
            }
            None => {
                self.state.setpoints = engine.compute(
                    &self.profile,
                    self.state.indoor_temp,
                    self.state.outdoor_temp,
                    sample,
                    &mut self.state.hysteresis,
                );
            }
        }
    }
}
