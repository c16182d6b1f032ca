//! Multi-building HVAC supervisory controller.
//!
//! Coordinates N building-energy simulators over a tick-synchronous text
//! protocol: each tick it receives a sensor block per simulator, computes
//! heating/cooling setpoints (fixed, adaptive-comfort, or
//! occupancy-expanded, with hysteresis) and a stochastic dishwasher
//! command, and sends the command block back.

pub mod backend;
pub mod config;
pub mod control;
pub mod coordinator;
pub mod occupancy;
pub mod protocol;
pub mod session;
