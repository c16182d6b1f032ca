//! TOML-based supervisor configuration and building profiles.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

/// Top-level supervisor configuration parsed from TOML.
///
/// All global sections have defaults matching the reference deployment.
/// Load from TOML with [`SupervisorConfig::from_toml_file`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Simulation timing parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Socket binding parameters.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Hysteresis (fuzzy) control tunables.
    #[serde(default)]
    pub control: FuzzyConfig,
    /// Appliance scheduler tunables.
    #[serde(default)]
    pub appliance: ApplianceConfig,
    /// Pricing and location metadata, consumed only by external backends.
    #[serde(default)]
    pub pricing: PricingConfig,
    /// One entry per connected building simulator.
    #[serde(default, rename = "building")]
    pub buildings: Vec<BuildingConfig>,
}

/// Simulation timing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of timesteps per hour (must be > 0).
    pub timesteps_per_hour: usize,
    /// Number of days to simulate (must be > 0).
    pub days: usize,
    /// Master random seed for the appliance schedulers.
    pub seed: u64,
    /// Path to the occupancy data CSV.
    pub occupancy_file: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timesteps_per_hour: 12,
            days: 7,
            seed: 42,
            occupancy_file: "OccupancyAnnualHourly.csv".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Timesteps in one simulated day.
    pub fn ticks_per_day(&self) -> usize {
        self.timesteps_per_hour * 24
    }
}

/// Socket binding parameters. Each session listens on
/// `base_port + session index`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub ip_address: String,
    pub base_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            base_port: 6789,
        }
    }
}

/// Hysteresis (fuzzy) control tunables.
///
/// `offset` is the extra setpoint push once the boost toggles on, `margin`
/// the standing safety distance, and `fudge` the tolerance that keeps a
/// simulator hovering just under the threshold from defeating the toggle.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuzzyConfig {
    pub offset: f64,
    pub margin: f64,
    pub fudge: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            offset: 1.0,
            margin: 0.1,
            fudge: 0.1,
        }
    }
}

/// Appliance scheduler tunables.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplianceConfig {
    /// Ticks one dishwasher cycle runs once started.
    pub run_time: usize,
    /// Expected activations per day, realized via per-tick Bernoulli trials.
    pub daily_budget: f64,
    /// Hard cap on completed activations per day.
    pub daily_limit: usize,
    /// Hour of day the household wakes (activation window opens).
    pub wake_hour: usize,
    /// Hour of day the household sleeps (activation window closes).
    pub sleep_hour: usize,
}

impl Default for ApplianceConfig {
    fn default() -> Self {
        Self {
            run_time: 12,
            daily_budget: 0.59,
            daily_limit: 1,
            wake_hour: 6,
            sleep_hour: 22,
        }
    }
}

/// Pricing and location metadata. The supervisor itself never reads these;
/// they exist for external setpoint backends that price-optimize.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    pub date_range: String,
    pub location: String,
    pub price_type: String,
}

/// Thermostat control mode for one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Fixed heating/cooling band from the profile.
    Fixed,
    /// Adaptive comfort band around the outdoor-driven comfort temperature.
    Adaptive,
    /// Adaptive band, widened when occupancy is merely probable.
    Occupancy,
}

/// Heating/cooling equipment restriction for one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeatOrCool {
    Heat,
    Cool,
    Auto,
}

/// Per-building configuration as written in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildingConfig {
    pub name: String,
    pub mode: ControlMode,
    #[serde(default = "default_heat_or_cool")]
    pub heat_or_cool: HeatOrCool,
    /// Fixed band, required when `mode = "fixed"`.
    pub fixed_min: Option<f64>,
    pub fixed_max: Option<f64>,
    #[serde(default)]
    pub dishwasher: bool,
    /// Command line of an external setpoint backend; the built-in engine is
    /// used when absent.
    pub backend_command: Option<String>,
}

fn default_heat_or_cool() -> HeatOrCool {
    HeatOrCool::Auto
}

/// Immutable per-building profile, normalized from [`BuildingConfig`].
#[derive(Debug, Clone)]
pub struct BuildingProfile {
    pub name: String,
    pub mode: ControlMode,
    pub heat_or_cool: HeatOrCool,
    pub fixed_min: f64,
    pub fixed_max: f64,
    pub dishwasher: bool,
    pub backend_command: Option<String>,
    /// Pricing metadata forwarded to the external backend, shared by all
    /// buildings.
    pub pricing: PricingConfig,
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.days"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

/// Default fixed band applied when a fixed-mode building omits its band.
const DEFAULT_FIXED_MIN: f64 = 20.0;
const DEFAULT_FIXED_MAX: f64 = 23.0;

impl SupervisorConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates run-fatal constraints and returns a list of errors.
    ///
    /// Per-building field problems are deliberately absent here: those are
    /// recoverable and handled by [`SupervisorConfig::building_profiles`].
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.timesteps_per_hour == 0 {
            errors.push(ConfigError {
                field: "simulation.timesteps_per_hour".into(),
                message: "must be > 0".into(),
            });
        }
        if s.days == 0 {
            errors.push(ConfigError {
                field: "simulation.days".into(),
                message: "must be > 0".into(),
            });
        }
        if self.buildings.is_empty() {
            errors.push(ConfigError {
                field: "building".into(),
                message: "at least one [[building]] entry is required".into(),
            });
        }

        let a = &self.appliance;
        if a.run_time == 0 {
            errors.push(ConfigError {
                field: "appliance.run_time".into(),
                message: "must be > 0".into(),
            });
        }
        if a.wake_hour >= a.sleep_hour {
            errors.push(ConfigError {
                field: "appliance.wake_hour".into(),
                message: "must be < appliance.sleep_hour".into(),
            });
        }
        if a.sleep_hour > 24 {
            errors.push(ConfigError {
                field: "appliance.sleep_hour".into(),
                message: "must be <= 24".into(),
            });
        }

        let f = &self.control;
        if f.offset < 0.0 || f.margin < 0.0 || f.fudge < 0.0 {
            errors.push(ConfigError {
                field: "control".into(),
                message: "offset, margin, and fudge must be >= 0".into(),
            });
        }

        errors
    }

    /// Normalizes building entries into immutable profiles.
    ///
    /// Recoverable per-building faults never abort the run: a reversed fixed
    /// band is swapped, a missing band on a fixed-mode building falls back
    /// to 20/23 °C, and each fallback is logged as an explicit
    /// configuration error.
    pub fn building_profiles(&self) -> Vec<BuildingProfile> {
        self.buildings
            .iter()
            .map(|b| {
                // Names are used as log field tokens; strip whitespace.
                let name: String = b.name.split_whitespace().collect();

                let (mut fixed_min, mut fixed_max) = match (b.fixed_min, b.fixed_max) {
                    (Some(min), Some(max)) => (min, max),
                    _ => {
                        if b.mode == ControlMode::Fixed {
                            warn!(
                                building = %name,
                                "fixed mode without a fixed band, defaulting to \
                                 {DEFAULT_FIXED_MIN}/{DEFAULT_FIXED_MAX} °C"
                            );
                        }
                        (DEFAULT_FIXED_MIN, DEFAULT_FIXED_MAX)
                    }
                };
                if fixed_max < fixed_min {
                    warn!(building = %name, "fixed band reversed, swapping min and max");
                    std::mem::swap(&mut fixed_min, &mut fixed_max);
                }

                BuildingProfile {
                    name,
                    mode: b.mode,
                    heat_or_cool: b.heat_or_cool,
                    fixed_min,
                    fixed_max,
                    dishwasher: b.dishwasher,
                    backend_command: b.backend_command.clone(),
                    pricing: self.pricing.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_building(mode: &str) -> String {
        format!(
            r#"
[[building]]
name = "house1"
mode = "{mode}"
"#
        )
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = SupervisorConfig::from_toml_str(&one_building("adaptive"))
            .expect("minimal config should parse");
        let errors = cfg.validate();
        assert!(errors.is_empty(), "defaults should be valid: {errors:?}");
        assert_eq!(cfg.simulation.timesteps_per_hour, 12);
        assert_eq!(cfg.simulation.ticks_per_day(), 288);
        assert_eq!(cfg.network.base_port, 6789);
    }

    #[test]
    fn full_toml_parses() {
        let toml = r#"
[simulation]
timesteps_per_hour = 12
days = 7
seed = 7
occupancy_file = "occ.csv"

[network]
ip_address = "127.0.0.1"
base_port = 7000

[control]
offset = 1.0
margin = 0.1
fudge = 0.1

[appliance]
run_time = 12
daily_budget = 0.59
daily_limit = 1
wake_hour = 6
sleep_hour = 22

[pricing]
date_range = "2020-08-01_2020-08-31"
location = "Default"
price_type = "n"

[[building]]
name = "house1"
mode = "fixed"
fixed_min = 20.0
fixed_max = 23.0
dishwasher = true

[[building]]
name = "house2"
mode = "occupancy"
heat_or_cool = "cool"
backend_command = "python3 thermostat.py"
"#;
        let cfg = SupervisorConfig::from_toml_str(toml).expect("full config should parse");
        assert!(cfg.validate().is_empty());
        let profiles = cfg.building_profiles();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].mode, ControlMode::Fixed);
        assert!(profiles[0].dishwasher);
        assert_eq!(profiles[1].heat_or_cool, HeatOrCool::Cool);
        assert_eq!(
            profiles[1].backend_command.as_deref(),
            Some("python3 thermostat.py")
        );
        assert_eq!(profiles[1].pricing.date_range, "2020-08-01_2020-08-31");
        assert_eq!(profiles[1].pricing.location, "Default");
        assert_eq!(profiles[1].pricing.price_type, "n");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
[simulation]
bogus = 1
"#;
        assert!(SupervisorConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn no_buildings_is_invalid() {
        let cfg = SupervisorConfig::from_toml_str("").expect("empty config should parse");
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "building"));
    }

    #[test]
    fn zero_timesteps_is_invalid() {
        let toml = format!(
            r#"
[simulation]
timesteps_per_hour = 0
{}"#,
            one_building("adaptive")
        );
        let cfg = SupervisorConfig::from_toml_str(&toml).expect("config should parse");
        let errors = cfg.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.field == "simulation.timesteps_per_hour")
        );
    }

    #[test]
    fn reversed_fixed_band_is_swapped() {
        let toml = r#"
[[building]]
name = "house1"
mode = "fixed"
fixed_min = 23.0
fixed_max = 20.0
"#;
        let cfg = SupervisorConfig::from_toml_str(toml).expect("config should parse");
        let profile = &cfg.building_profiles()[0];
        assert_eq!(profile.fixed_min, 20.0);
        assert_eq!(profile.fixed_max, 23.0);
    }

    #[test]
    fn fixed_mode_without_band_falls_back() {
        let cfg =
            SupervisorConfig::from_toml_str(&one_building("fixed")).expect("config should parse");
        let profile = &cfg.building_profiles()[0];
        assert_eq!(profile.fixed_min, 20.0);
        assert_eq!(profile.fixed_max, 23.0);
    }

    #[test]
    fn building_name_whitespace_is_stripped() {
        let toml = r#"
[[building]]
name = "house 1"
mode = "adaptive"
"#;
        let cfg = SupervisorConfig::from_toml_str(toml).expect("config should parse");
        assert_eq!(cfg.building_profiles()[0].name, "house1");
    }
}
