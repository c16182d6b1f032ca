//! Setpoint and appliance decision logic.

pub mod appliance;
pub mod comfort;
pub mod setpoint;

pub use appliance::ApplianceScheduler;
pub use setpoint::{HysteresisState, SetpointEngine, Setpoints};
