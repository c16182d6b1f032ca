//! External setpoint backend: a per-building process whose stdout carries
//! the setpoint strings for the current tick.
//!
//! The contract is line-oriented: the keystrings `thermostat_set_heat` and
//! `thermostat_set_cool` switch which setpoint the following data lines
//! apply to; any other line is stored as that setpoint string. A Python
//! traceback sentinel marks a crash, in which case the tick's setpoints
//! must stay unset rather than pass stale values off as fresh.

use std::process::Command;

use thiserror::Error;
use tracing::warn;

use crate::config::{BuildingProfile, ControlMode, HeatOrCool};

pub const KEY_SET_HEAT: &str = "thermostat_set_heat";
pub const KEY_SET_COOL: &str = "thermostat_set_cool";
const CRASH_SENTINEL: &str = "Traceback (most recent call last):";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend command is empty")]
    EmptyCommand,
    #[error("failed to spawn backend: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Which setpoint the next data line applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    None,
    Heat,
    Cool,
}

/// Parsed backend output for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendSetpoints {
    pub heat_str: Option<String>,
    pub cool_str: Option<String>,
    pub crashed: bool,
}

impl BackendSetpoints {
    /// True when this tick produced at least one usable setpoint.
    pub fn usable(&self) -> bool {
        !self.crashed && (self.heat_str.is_some() || self.cool_str.is_some())
    }
}

/// Consumes backend output lines through the keystring state machine.
///
/// Lines arriving before any keystring are ignored (they are typically
/// banner or debug output). On a crash sentinel everything already parsed
/// is discarded.
pub fn parse_backend_output<I, S>(lines: I) -> BackendSetpoints
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut expect = Expect::None;
    let mut saw_keystring = false;
    let mut result = BackendSetpoints::default();

    for line in lines {
        let line = line.as_ref();
        match line {
            KEY_SET_HEAT => {
                expect = Expect::Heat;
                saw_keystring = true;
            }
            KEY_SET_COOL => {
                expect = Expect::Cool;
                saw_keystring = true;
            }
            _ if line == CRASH_SENTINEL => {
                warn!("backend crash detected in output, discarding its setpoints");
                return BackendSetpoints {
                    crashed: true,
                    ..BackendSetpoints::default()
                };
            }
            data => match expect {
                Expect::Heat => result.heat_str = Some(data.to_string()),
                Expect::Cool => result.cool_str = Some(data.to_string()),
                Expect::None => {}
            },
        }
    }

    if !saw_keystring {
        warn!("no keystrings in backend output, setpoints stay unset");
    }
    result
}

fn mode_str(mode: ControlMode) -> &'static str {
    match mode {
        ControlMode::Fixed => "fixed",
        ControlMode::Adaptive => "adaptive",
        ControlMode::Occupancy => "occupancy",
    }
}

fn heat_or_cool_char(restriction: HeatOrCool) -> char {
    match restriction {
        HeatOrCool::Heat => 'h',
        HeatOrCool::Cool => 'c',
        HeatOrCool::Auto => 'a',
    }
}

/// Builds the backend argument vector for one tick.
///
/// `-s` suppresses the backend's human-readable output; the pricing
/// arguments are appended only when configured, so an absent value leaves
/// the backend's own defaults in force.
fn backend_args(
    profile: &BuildingProfile,
    indoor_temp: f64,
    outdoor_temp: f64,
    occupancy_status: u8,
) -> Vec<String> {
    let mut args = vec![
        "-s".to_string(),
        format!("indoorTemp={indoor_temp}"),
        format!("outdoorTemp={outdoor_temp}"),
        format!("occupancyStatus={occupancy_status}"),
        format!("heatOrCool={}", heat_or_cool_char(profile.heat_or_cool)),
        format!("MODE={}", mode_str(profile.mode)),
    ];
    let pricing = &profile.pricing;
    if !pricing.date_range.is_empty() {
        args.push(format!("date={}", pricing.date_range));
    }
    if !pricing.location.is_empty() {
        args.push(format!("loc={}", pricing.location));
    }
    if !pricing.price_type.is_empty() {
        args.push(format!("price={}", pricing.price_type));
    }
    args
}

/// Runs the building's backend once and parses its output.
///
/// The argument set is fixed by the contract: indoor and outdoor
/// temperature, tick-indexed occupancy status, the heat/cool restriction,
/// the control mode, and any configured pricing metadata.
///
/// # Errors
///
/// Returns [`BackendError`] when the command line is empty or the process
/// cannot be spawned. A backend that runs but crashes is not an error at
/// this level; it is reported through [`BackendSetpoints::crashed`].
pub fn run_backend(
    profile: &BuildingProfile,
    command_line: &str,
    indoor_temp: f64,
    outdoor_temp: f64,
    occupancy_status: u8,
) -> Result<BackendSetpoints, BackendError> {
    let mut parts = command_line.split_whitespace();
    let program = parts.next().ok_or(BackendError::EmptyCommand)?;

    let output = Command::new(program)
        .args(parts)
        .args(backend_args(
            profile,
            indoor_temp,
            outdoor_temp,
            occupancy_status,
        ))
        .output()
        .map_err(BackendError::Spawn)?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut result = parse_backend_output(stdout.lines());

    // Python tracebacks land on stderr; treat them the same as an inline
    // crash sentinel.
    if !result.crashed && String::from_utf8_lossy(&output.stderr).contains(CRASH_SENTINEL) {
        warn!(building = %profile.name, "backend crash detected on stderr");
        result = BackendSetpoints {
            crashed: true,
            ..BackendSetpoints::default()
        };
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;

    fn profile(pricing: PricingConfig) -> BuildingProfile {
        BuildingProfile {
            name: "house1".to_string(),
            mode: ControlMode::Occupancy,
            heat_or_cool: HeatOrCool::Cool,
            fixed_min: 20.0,
            fixed_max: 23.0,
            dishwasher: false,
            backend_command: Some("python3 thermostat.py".to_string()),
            pricing,
        }
    }

    #[test]
    fn args_carry_the_tick_state_and_pricing() {
        let pricing = PricingConfig {
            date_range: "2020-08-01_2020-08-31".to_string(),
            location: "Default".to_string(),
            price_type: "n".to_string(),
        };
        let args = backend_args(&profile(pricing), 24.5, 31.0, 1);
        assert_eq!(
            args,
            vec![
                "-s",
                "indoorTemp=24.5",
                "outdoorTemp=31",
                "occupancyStatus=1",
                "heatOrCool=c",
                "MODE=occupancy",
                "date=2020-08-01_2020-08-31",
                "loc=Default",
                "price=n",
            ]
        );
    }

    #[test]
    fn empty_pricing_fields_are_not_forwarded() {
        let args = backend_args(&profile(PricingConfig::default()), 24.5, 31.0, 0);
        assert!(!args.iter().any(|a| a.starts_with("date=")));
        assert!(!args.iter().any(|a| a.starts_with("loc=")));
        assert!(!args.iter().any(|a| a.starts_with("price=")));
        assert!(args.contains(&"occupancyStatus=0".to_string()));
    }

    #[test]
    fn parses_both_setpoints() {
        let result = parse_backend_output([
            "thermostat_set_heat",
            "20.1",
            "thermostat_set_cool",
            "25.9",
        ]);
        assert_eq!(result.heat_str.as_deref(), Some("20.1"));
        assert_eq!(result.cool_str.as_deref(), Some("25.9"));
        assert!(result.usable());
    }

    #[test]
    fn banner_lines_before_keystrings_are_ignored() {
        let result = parse_backend_output([
            "thermostat backend v2.0",
            "thermostat_set_cool",
            "25.9",
        ]);
        assert_eq!(result.heat_str, None);
        assert_eq!(result.cool_str.as_deref(), Some("25.9"));
    }

    #[test]
    fn last_data_line_wins() {
        let result = parse_backend_output(["thermostat_set_heat", "20.1", "20.5"]);
        assert_eq!(result.heat_str.as_deref(), Some("20.5"));
    }

    #[test]
    fn crash_discards_already_parsed_setpoints() {
        let result = parse_backend_output([
            "thermostat_set_heat",
            "20.1",
            "Traceback (most recent call last):",
            "  File \"thermostat.py\", line 1",
        ]);
        assert!(result.crashed);
        assert_eq!(result.heat_str, None);
        assert_eq!(result.cool_str, None);
        assert!(!result.usable());
    }

    #[test]
    fn no_keystrings_is_unusable() {
        let result = parse_backend_output(["hello", "world"]);
        assert!(!result.usable());
        assert!(!result.crashed);
    }

    #[test]
    fn empty_output_is_unusable() {
        let result = parse_backend_output(Vec::<String>::new());
        assert!(!result.usable());
    }
}
