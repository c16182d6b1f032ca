//! Adaptive comfort model: base comfort temperature and the
//! occupancy-probability comfort-band expansion table.

/// Comfort-band expansion (°C) indexed by occupancy probability percentile.
///
/// Element 0 is the expansion at probability 0.01, element 98 at 0.99.
/// Values were generated offline from the inverse-normal comfort model;
/// they are constants of the control scheme, not tunables.
const COMFORT_EXPANSION: [f64; 99] = [
    10.141, 9.159, 8.544, 8.086, 7.716, 7.405, 7.133, 6.892, 6.675, 6.476, 6.292, 6.121, 5.961,
    5.81, 5.667, 5.532, 5.402, 5.279, 5.16, 5.045, 4.935, 4.829, 4.726, 4.626, 4.529, 4.435,
    4.343, 4.253, 4.166, 4.08, 3.997, 3.915, 3.835, 3.757, 3.679, 3.604, 3.529, 3.456, 3.384,
    3.313, 3.244, 3.175, 3.107, 3.04, 2.974, 2.909, 2.844, 2.781, 2.718, 2.655, 2.594, 2.533,
    2.472, 2.413, 2.353, 2.295, 2.236, 2.179, 2.121, 2.065, 2.008, 1.952, 1.897, 1.841, 1.786,
    1.732, 1.678, 1.624, 1.57, 1.517, 1.464, 1.411, 1.359, 1.307, 1.254, 1.203, 1.151, 1.1,
    1.048, 0.997, 0.947, 0.896, 0.845, 0.795, 0.745, 0.694, 0.644, 0.594, 0.545, 0.495, 0.445,
    0.395, 0.346, 0.296, 0.247, 0.197, 0.148, 0.099, 0.049,
];

/// Mean comfortable indoor temperature for a given outdoor temperature (°C).
///
/// Three-segment piecewise-linear adaptive comfort rule: flat at 20.9 °C up
/// to 9.6774 °C outdoors, `17.9 + 0.31 * outdoor` in between, flat at
/// 28.2 °C from 33.22 °C outdoors.
pub fn comfort_temperature(outdoor: f64) -> f64 {
    if outdoor <= 9.6774 {
        20.9
    } else if outdoor < 33.22 {
        17.9 + 0.31 * outdoor
    } else {
        28.2
    }
}

/// Comfort-band expansion (°C) for an occupancy probability.
///
/// The probability is clamped to `[0.01, 0.99]` before indexing, so 0.0 and
/// 1.0 are valid inputs and map to the table ends rather than out of bounds.
pub fn expansion_for(probability: f64) -> f64 {
    let p = probability.clamp(0.01, 0.99);
    let idx = ((p * 100.0).round() as usize - 1).min(98);
    COMFORT_EXPANSION[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfort_is_continuous_at_lower_knee() {
        let below = comfort_temperature(9.6774);
        let above = comfort_temperature(9.6775);
        assert!((below - 20.9).abs() < 1e-9);
        assert!((above - below).abs() < 1e-3);
    }

    #[test]
    fn comfort_flattens_at_upper_knee() {
        // The middle segment runs strictly below 33.22; exactly 33.22 sits
        // on the flat upper segment.
        let below = comfort_temperature(33.2199);
        assert!((below - (17.9 + 0.31 * 33.2199)).abs() < 1e-9);
        assert!(below < 28.2);
        assert_eq!(comfort_temperature(33.22), 28.2);
        assert_eq!(comfort_temperature(40.0), 28.2);
    }

    #[test]
    fn comfort_is_non_decreasing() {
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=500 {
            let outdoor = -10.0 + i as f64 * 0.1;
            let c = comfort_temperature(outdoor);
            assert!(c >= prev - 1e-9, "decreased at outdoor={outdoor}");
            prev = c;
        }
    }

    #[test]
    fn expansion_clamps_at_both_ends() {
        assert_eq!(expansion_for(0.0), expansion_for(0.01));
        assert_eq!(expansion_for(1.0), expansion_for(0.99));
        assert_eq!(expansion_for(-3.0), expansion_for(0.01));
        assert_eq!(expansion_for(7.0), expansion_for(0.99));
    }

    #[test]
    fn expansion_table_endpoints() {
        assert_eq!(expansion_for(0.01), 10.141);
        assert_eq!(expansion_for(0.99), 0.049);
        assert_eq!(expansion_for(0.5), 2.655);
    }

    #[test]
    fn expansion_decreases_with_certainty() {
        let mut prev = f64::INFINITY;
        for i in 1..=99 {
            let e = expansion_for(i as f64 / 100.0);
            assert!(e < prev);
            prev = e;
        }
    }
}
