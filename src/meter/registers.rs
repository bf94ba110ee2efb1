//! # Meter Register Map
//!
//! Register addresses of the deployed three-phase energy meter and the typed
//! measurement set decoded from them.
//!
//! Every measurement is an IEEE-754 single stored in two consecutive holding
//! registers, low word first. Phase names follow the R/Y/B convention.

use serde::{Deserialize, Serialize};

use crate::error::SensorError;

/// Registers occupied by one measurement
pub const REGISTERS_PER_VALUE: u16 = 2;

/// Number of measurements read from the meter per poll
pub const MEASUREMENT_COUNT: usize = 32;

/// Measurement name and first register address, in read order
///
/// Both energy totals are read from register 223, as mapped on the deployed meter.
pub const REGISTER_MAP: [(&str, u16); MEASUREMENT_COUNT] = [
    ("r_vtg", 99),
    ("y_vtg", 101),
    ("b_vtg", 103),
    ("r_curr", 113),
    ("y_curr", 115),
    ("b_curr", 117),
    ("r_active_curr", 121),
    ("y_active_curr", 123),
    ("b_active_curr", 125),
    ("r_reactive_curr", 127),
    ("y_reactive_curr", 129),
    ("b_reactive_curr", 131),
    ("r_pf", 133),
    ("y_pf", 135),
    ("b_pf", 137),
    ("r_active_pwr", 141),
    ("y_active_pwr", 143),
    ("b_active_pwr", 145),
    ("r_react_pwr", 149),
    ("y_react_pwr", 151),
    ("b_react_pwr", 153),
    ("r_apparent_pwr", 157),
    ("y_apparent_pwr", 159),
    ("b_apparent_pwr", 161),
    ("r_vtg_thd", 177),
    ("y_vtg_thd", 179),
    ("b_vtg_thd", 181),
    ("r_curr_thd", 183),
    ("y_curr_thd", 185),
    ("b_curr_thd", 187),
    ("abs_active_energy", 223),
    ("total_energy_imp", 223),
];

/// One complete set of meter measurements
///
/// Field names are the payload keys expected by the collection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Phase voltages (V)
    pub r_vtg: f64,
    pub y_vtg: f64,
    pub b_vtg: f64,

    /// Phase currents (A)
    pub r_curr: f64,
    pub y_curr: f64,
    pub b_curr: f64,

    /// Active current components (A)
    pub r_active_curr: f64,
    pub y_active_curr: f64,
    pub b_active_curr: f64,

    /// Reactive current components (A)
    pub r_reactive_curr: f64,
    pub y_reactive_curr: f64,
    pub b_reactive_curr: f64,

    /// Power factors
    pub r_pf: f64,
    pub y_pf: f64,
    pub b_pf: f64,

    /// Active power (W)
    pub r_active_pwr: f64,
    pub y_active_pwr: f64,
    pub b_active_pwr: f64,

    /// Reactive power (VAr)
    pub r_react_pwr: f64,
    pub y_react_pwr: f64,
    pub b_react_pwr: f64,

    /// Apparent power (VA)
    pub r_apparent_pwr: f64,
    pub y_apparent_pwr: f64,
    pub b_apparent_pwr: f64,

    /// Voltage total harmonic distortion (%)
    pub r_vtg_thd: f64,
    pub y_vtg_thd: f64,
    pub b_vtg_thd: f64,

    /// Current total harmonic distortion (%)
    pub r_curr_thd: f64,
    pub y_curr_thd: f64,
    pub b_curr_thd: f64,

    /// Energy totals (kWh)
    pub abs_active_energy: f64,
    pub total_energy_imp: f64,

    /// Peak phase current over mean phase current
    pub phase_imbalance: f64,
}

impl Measurements {
    /// Build measurements from decoded values in [`REGISTER_MAP`] order
    ///
    /// # Errors
    ///
    /// Returns `SensorError::Malformed` unless exactly [`MEASUREMENT_COUNT`]
    /// values are given. A partially populated set is never produced.
    pub fn from_values(values: &[f64]) -> Result<Self, SensorError> {
        let values: &[f64; MEASUREMENT_COUNT] = values.try_into().map_err(|_| {
            SensorError::Malformed(format!(
                "expected {} measurements, got {}",
                MEASUREMENT_COUNT,
                values.len()
            ))
        })?;

        Ok(Self {
            r_vtg: values[0],
            y_vtg: values[1],
            b_vtg: values[2],
            r_curr: values[3],
            y_curr: values[4],
            b_curr: values[5],
            r_active_curr: values[6],
            y_active_curr: values[7],
            b_active_curr: values[8],
            r_reactive_curr: values[9],
            y_reactive_curr: values[10],
            b_reactive_curr: values[11],
            r_pf: values[12],
            y_pf: values[13],
            b_pf: values[14],
            r_active_pwr: values[15],
            y_active_pwr: values[16],
            b_active_pwr: values[17],
            r_react_pwr: values[18],
            y_react_pwr: values[19],
            b_react_pwr: values[20],
            r_apparent_pwr: values[21],
            y_apparent_pwr: values[22],
            b_apparent_pwr: values[23],
            r_vtg_thd: values[24],
            y_vtg_thd: values[25],
            b_vtg_thd: values[26],
            r_curr_thd: values[27],
            y_curr_thd: values[28],
            b_curr_thd: values[29],
            abs_active_energy: values[30],
            total_energy_imp: values[31],
            phase_imbalance: phase_imbalance(values[3], values[4], values[5]),
        })
    }
}

/// Ratio of the highest phase current to the mean phase current
///
/// Returns 0.0 when no current flows on any phase.
pub fn phase_imbalance(r: f64, y: f64, b: f64) -> f64 {
    let mean = (r + y + b) / 3.0;
    if mean == 0.0 {
        return 0.0;
    }
    r.max(y).max(b) / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_map_shape() {
        assert_eq!(REGISTER_MAP.len(), MEASUREMENT_COUNT);
        assert_eq!(REGISTER_MAP[0], ("r_vtg", 99));
        assert_eq!(REGISTER_MAP[29], ("b_curr_thd", 187));
        assert_eq!(REGISTER_MAP[30].1, 223);
        assert_eq!(REGISTER_MAP[31].1, 223);
    }

    #[test]
    fn test_register_map_names_are_unique() {
        let mut names: Vec<&str> = REGISTER_MAP.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MEASUREMENT_COUNT);
    }

    #[test]
    fn test_from_values_maps_in_register_order() {
        let values: Vec<f64> = (0..MEASUREMENT_COUNT).map(|i| i as f64).collect();
        let m = Measurements::from_values(&values).unwrap();

        assert_eq!(m.r_vtg, 0.0);
        assert_eq!(m.b_vtg, 2.0);
        assert_eq!(m.r_curr, 3.0);
        assert_eq!(m.r_pf, 12.0);
        assert_eq!(m.b_curr_thd, 29.0);
        assert_eq!(m.total_energy_imp, 31.0);
    }

    #[test]
    fn test_from_values_rejects_partial_set() {
        let values = vec![1.0; MEASUREMENT_COUNT - 1];
        assert!(matches!(
            Measurements::from_values(&values),
            Err(SensorError::Malformed(_))
        ));
    }

    #[test]
    fn test_serialized_field_names() {
        let m = Measurements::from_values(&[1.0; MEASUREMENT_COUNT]).unwrap();
        let json = serde_json::to_value(m).unwrap();
        for (name, _) in REGISTER_MAP.iter() {
            assert!(json.get(name).is_some(), "missing field {}", name);
        }
        assert!(json.get("phase_imbalance").is_some());
    }

    #[test]
    fn test_phase_imbalance_uses_phase_currents() {
        let mut values = vec![0.0; MEASUREMENT_COUNT];
        values[3] = 10.0;
        values[4] = 10.0;
        values[5] = 16.0;
        let m = Measurements::from_values(&values).unwrap();
        assert!((m.phase_imbalance - 16.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_phase_imbalance_balanced_and_idle() {
        assert_eq!(phase_imbalance(5.0, 5.0, 5.0), 1.0);
        assert_eq!(phase_imbalance(0.0, 0.0, 0.0), 0.0);
    }
}
