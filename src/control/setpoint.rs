//! Per-building heating/cooling setpoint computation with hysteresis.

use crate::config::{BuildingProfile, ControlMode, FuzzyConfig, HeatOrCool};
use crate::occupancy::OccupancySample;

use super::comfort::{comfort_temperature, expansion_for};

/// Sentinel setpoints meaning "never computed this tick". A downstream
/// consumer seeing these knows the exchange or backend failed to produce
/// values, rather than mistaking stale numbers for fresh ones.
pub const UNSET_HEAT: f64 = -1.1;
pub const UNSET_COOL: f64 = 111.1;
pub const UNSET_HEAT_STR: &str = "0.0";
pub const UNSET_COOL_STR: &str = "99.9";

/// Clipping sentinels for restricted equipment: a heating setpoint no zone
/// drops to, and a cooling setpoint no zone reaches.
const NO_HEAT: f64 = 0.0;
const NO_COOL: f64 = 50.0;

/// Sticky hysteresis flags, persisted across ticks per building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisState {
    pub cool_boost: bool,
    pub heat_boost: bool,
}

/// Final setpoints for one tick, in numeric and wire-string form.
#[derive(Debug, Clone, PartialEq)]
pub struct Setpoints {
    pub heat: f64,
    pub cool: f64,
    pub heat_str: String,
    pub cool_str: String,
}

impl Setpoints {
    /// The unset sentinel pair, installed at the start of every decide
    /// phase.
    pub fn unset() -> Self {
        Self {
            heat: UNSET_HEAT,
            cool: UNSET_COOL,
            heat_str: UNSET_HEAT_STR.to_string(),
            cool_str: UNSET_COOL_STR.to_string(),
        }
    }
}

/// Formats a setpoint for the wire. Always carries a decimal point so the
/// output matches the decimal convention the simulators were built against.
fn format_setpoint(value: f64) -> String {
    let s = format!("{value}");
    if s.contains('.') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{s}.0")
    }
}

/// Computes heating/cooling setpoints for one building and one tick.
///
/// Stateless apart from the caller-owned [`HysteresisState`]; safe to share
/// across sessions.
#[derive(Debug, Clone, Copy)]
pub struct SetpointEngine {
    fuzzy: FuzzyConfig,
}

impl SetpointEngine {
    pub fn new(fuzzy: FuzzyConfig) -> Self {
        Self { fuzzy }
    }

    /// Produces the setpoint pair for the current tick.
    ///
    /// Mode resolution first (fixed band, adaptive ±2 °C, or
    /// occupancy-expanded band), then hysteresis against the raw band, then
    /// heat/cool-only clipping. The hysteresis toggles read `state` from
    /// the previous tick and update it in place.
    pub fn compute(
        &self,
        profile: &BuildingProfile,
        indoor: f64,
        outdoor: f64,
        sample: &OccupancySample,
        state: &mut HysteresisState,
    ) -> Setpoints {
        let (mut heat, mut cool) = match profile.mode {
            ControlMode::Fixed => (profile.fixed_min, profile.fixed_max),
            ControlMode::Adaptive => {
                let comfort = comfort_temperature(outdoor);
                (comfort - 2.0, comfort + 2.0)
            }
            ControlMode::Occupancy => {
                let comfort = comfort_temperature(outdoor);
                if sample.status == 1 {
                    (comfort - 2.0, comfort + 2.0)
                } else {
                    // Unconfirmed occupancy widens tolerance instead of
                    // tightening it, so the HVAC does not condition an
                    // empty house.
                    let expansion = expansion_for(sample.probability);
                    (comfort - 2.0 - expansion, comfort + 2.0 + expansion)
                }
            }
        };

        let f = self.fuzzy;

        // Cooling boost: toggle on near the raw cooling setpoint, off only
        // once the zone has cooled through the full offset band. Evaluated
        // against the raw band, applied afterwards.
        if indoor >= cool - f.margin - f.fudge {
            state.cool_boost = true;
        } else if indoor <= cool - f.margin - f.offset + f.fudge {
            state.cool_boost = false;
        }
        cool -= if state.cool_boost {
            f.offset + f.margin
        } else {
            f.margin
        };

        // Heating boost, mirror of the above.
        if indoor <= heat + f.margin + f.fudge {
            state.heat_boost = true;
        } else if indoor >= heat + f.margin + f.offset - f.fudge {
            state.heat_boost = false;
        }
        heat += if state.heat_boost {
            f.offset + f.margin
        } else {
            f.margin
        };

        match profile.heat_or_cool {
            HeatOrCool::Cool => heat = NO_HEAT,
            HeatOrCool::Heat => cool = NO_COOL,
            HeatOrCool::Auto => {}
        }

        Setpoints {
            heat,
            cool,
            heat_str: format_setpoint(heat),
            cool_str: format_setpoint(cool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;

    fn profile(mode: ControlMode) -> BuildingProfile {
        BuildingProfile {
            name: "house1".to_string(),
            mode,
            heat_or_cool: HeatOrCool::Auto,
            fixed_min: 20.0,
            fixed_max: 23.0,
            dishwasher: false,
            backend_command: None,
            pricing: PricingConfig::default(),
        }
    }

    fn sample(status: u8, probability: f64) -> OccupancySample {
        OccupancySample {
            status,
            probability,
            comfort_expansion: 0.0,
        }
    }

    fn engine() -> SetpointEngine {
        SetpointEngine::new(FuzzyConfig::default())
    }

    #[test]
    fn fixed_mode_hot_zone_boosts_cooling() {
        let p = profile(ControlMode::Fixed);
        let mut state = HysteresisState::default();
        let sp = engine().compute(&p, 24.0, 30.0, &sample(1, 1.0), &mut state);

        // 24.0 >= 23.0 - 0.1 - 0.1, so the cool boost engages:
        // cool = 23.0 - (1.0 + 0.1). Heat stays unboosted at 20.0 + 0.1.
        assert!(state.cool_boost);
        assert!(!state.heat_boost);
        assert!((sp.cool - 21.9).abs() < 1e-9);
        assert!((sp.heat - 20.1).abs() < 1e-9);
        assert_eq!(sp.cool_str, "21.9");
        assert_eq!(sp.heat_str, "20.1");
    }

    #[test]
    fn adaptive_band_is_two_degrees_around_comfort() {
        let p = profile(ControlMode::Adaptive);
        let mut state = HysteresisState::default();
        // Outdoor 20 -> comfort 17.9 + 0.31*20 = 24.1. Indoor well inside
        // the band, no boosts.
        let sp = engine().compute(&p, 24.0, 20.0, &sample(1, 1.0), &mut state);
        assert!(!state.cool_boost);
        assert!(!state.heat_boost);
        assert!((sp.cool - (26.1 - 0.1)).abs() < 1e-9);
        assert!((sp.heat - (22.1 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn occupancy_mode_expands_band_when_unconfirmed() {
        let p = profile(ControlMode::Occupancy);
        let mut occupied = HysteresisState::default();
        let mut vacant = HysteresisState::default();
        let e = engine();

        let occ = e.compute(&p, 24.0, 20.0, &sample(1, 1.0), &mut occupied);
        let vac = e.compute(&p, 24.0, 20.0, &sample(0, 0.5), &mut vacant);

        // Probability 0.5 widens the band by 2.655 °C on both sides.
        assert!((vac.cool - occ.cool - 2.655).abs() < 1e-9);
        assert!((occ.heat - vac.heat - 2.655).abs() < 1e-9);
    }

    #[test]
    fn cool_only_forces_heat_sentinel() {
        let mut p = profile(ControlMode::Fixed);
        p.heat_or_cool = HeatOrCool::Cool;
        let mut state = HysteresisState::default();
        let sp = engine().compute(&p, 24.0, 30.0, &sample(1, 1.0), &mut state);
        assert_eq!(sp.heat, 0.0);
        assert_eq!(sp.heat_str, "0.0");
    }

    #[test]
    fn heat_only_forces_cool_sentinel() {
        let mut p = profile(ControlMode::Fixed);
        p.heat_or_cool = HeatOrCool::Heat;
        let mut state = HysteresisState::default();
        let sp = engine().compute(&p, 18.0, 5.0, &sample(1, 1.0), &mut state);
        assert_eq!(sp.cool, 50.0);
        assert_eq!(sp.cool_str, "50.0");
    }

    #[test]
    fn cool_boost_does_not_chatter_inside_fudge_band() {
        // Oscillate within ±fudge of the raw threshold without ever cooling
        // through the full margin+offset band: once on, the boost must stay
        // on.
        let p = profile(ControlMode::Fixed);
        let mut state = HysteresisState::default();
        let e = engine();

        e.compute(&p, 23.0, 30.0, &sample(1, 1.0), &mut state);
        assert!(state.cool_boost);

        for indoor in [22.75, 22.85, 22.7, 22.9, 22.75] {
            e.compute(&p, indoor, 30.0, &sample(1, 1.0), &mut state);
            assert!(state.cool_boost, "boost dropped at indoor={indoor}");
        }

        // Only a full crossing releases it: 23.0 - 0.1 - 1.0 + 0.1 = 22.0.
        e.compute(&p, 21.9, 30.0, &sample(1, 1.0), &mut state);
        assert!(!state.cool_boost);
    }

    #[test]
    fn heat_boost_toggles_symmetrically() {
        let p = profile(ControlMode::Fixed);
        let mut state = HysteresisState::default();
        let e = engine();

        // 19.9 <= 20.0 + 0.1 + 0.1 engages the heat boost.
        let sp = e.compute(&p, 19.9, 5.0, &sample(1, 1.0), &mut state);
        assert!(state.heat_boost);
        assert!((sp.heat - 21.1).abs() < 1e-9);

        // Release only at 20.0 + 0.1 + 1.0 - 0.1 = 21.0 or above.
        e.compute(&p, 20.9, 5.0, &sample(1, 1.0), &mut state);
        assert!(state.heat_boost);
        e.compute(&p, 21.0, 5.0, &sample(1, 1.0), &mut state);
        assert!(!state.heat_boost);
    }

    #[test]
    fn unset_sentinels() {
        let sp = Setpoints::unset();
        assert_eq!(sp.heat, UNSET_HEAT);
        assert_eq!(sp.cool, UNSET_COOL);
        assert_eq!(sp.heat_str, "0.0");
        assert_eq!(sp.cool_str, "99.9");
    }

    #[test]
    fn format_setpoint_always_carries_a_decimal() {
        assert_eq!(format_setpoint(21.0), "21.0");
        assert_eq!(format_setpoint(21.9), "21.9");
        assert_eq!(format_setpoint(-1.1), "-1.1");
    }
}
