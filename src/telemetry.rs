//! Typed results of one successful poll.

use crate::normalize::{energy_wh, round_to};
use crate::warning::{Flags, WarningCode};

#[cfg(feature = "protocol_serde")]
use serde::Serialize;

/// Lowest or highest cell of a pack, `cell` counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct CellExtreme {
    pub voltage: u16,
    pub cell: usize,
}

impl CellExtreme {
    /// First lowest and first highest cell of `cells`, `None` for no cells.
    pub fn of(cells: &[u16]) -> (Option<Self>, Option<Self>) {
        let mut min: Option<Self> = None;
        let mut max: Option<Self> = None;
        for (index, voltage) in cells.iter().copied().enumerate() {
            let candidate = Self {
                voltage,
                cell: index + 1,
            };
            if min.map_or(true, |m| voltage < m.voltage) {
                min = Some(candidate);
            }
            if max.map_or(true, |m| voltage > m.voltage) {
                max = Some(candidate);
            }
        }
        (min, max)
    }
}

/// Energy in Wh, booked by direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct Energy {
    pub charged: f64,
    pub discharged: f64,
}

impl Energy {
    /// Energy moved during one polling interval at a constant `power_kw`,
    /// rounded to 5 decimals.
    pub fn per_interval(power_kw: f64, interval_secs: f64) -> Self {
        let amount = round_to(energy_wh(power_kw, interval_secs), 5);
        if power_kw >= 0.0 {
            Self {
                charged: amount,
                discharged: 0.0,
            }
        } else {
            Self {
                charged: 0.0,
                discharged: amount,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct PackTelemetry {
    /// Pack position, counted from 1.
    pub pack: u8,
    /// Cell voltages in mV.
    pub cell_voltages: Vec<u16>,
    pub cell_min: Option<CellExtreme>,
    pub cell_max: Option<CellExtreme>,
    /// Temperatures in °C.
    pub temperatures: Vec<f64>,
    /// Current in A, negative while discharging.
    pub current: f64,
    pub voltage: f64,
    /// Power in kW, same sign as the current.
    pub power: f64,
    pub remaining_capacity: f64,
    pub full_capacity: f64,
    pub design_capacity: f64,
    pub cycle_count: u32,
    pub soc: f64,
    pub soh: f64,
    pub balance_current: Option<f64>,
    pub energy: Option<Energy>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
}

impl PackTelemetry {
    /// Spread between the highest and the lowest cell in mV.
    pub fn cell_voltage_diff(&self) -> Option<u16> {
        match (self.cell_min, self.cell_max) {
            (Some(min), Some(max)) => Some(max.voltage - min.voltage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct PackWarningState {
    pub pack: u8,
    pub cell_warnings: Vec<WarningCode>,
    pub temperature_warnings: Vec<WarningCode>,
    pub charge_current: WarningCode,
    pub total_voltage: WarningCode,
    pub discharge_current: WarningCode,
    pub protect_state_1: Flags,
    pub protect_state_2: Flags,
    pub instruction_state: Flags,
    pub control_state: Flags,
    pub fault_state: Flags,
    pub balance_state_1: u8,
    pub balance_state_2: u8,
    pub warn_state_1: Flags,
    pub warn_state_2: Flags,
}

impl PackWarningState {
    /// `true` when any protection, fault or warning flag is raised or any
    /// code is not `normal`.
    pub fn has_alarm(&self) -> bool {
        let codes = self
            .cell_warnings
            .iter()
            .chain(&self.temperature_warnings)
            .chain([
                &self.charge_current,
                &self.total_voltage,
                &self.discharge_current,
            ]);
        let flags = [
            &self.protect_state_1,
            &self.protect_state_2,
            &self.fault_state,
            &self.warn_state_1,
            &self.warn_state_2,
        ];
        codes.into_iter().any(|c| *c != WarningCode::Normal)
            || flags.iter().any(|f| !f.active().is_empty())
    }
}

/// Production strings of the BMS board and, when reported, the pack.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct ProductInfo {
    pub bms: String,
    pub pack: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_extreme_test() {
        let (min, max) = CellExtreme::of(&[3301, 3299, 3310, 3299, 3310]);
        assert_eq!(
            min,
            Some(CellExtreme {
                voltage: 3299,
                cell: 2
            })
        );
        assert_eq!(
            max,
            Some(CellExtreme {
                voltage: 3310,
                cell: 3
            })
        );
        assert_eq!(CellExtreme::of(&[]), (None, None));
    }

    #[test]
    fn per_interval_energy_test() {
        assert_eq!(
            Energy::per_interval(1.8, 10.0),
            Energy {
                charged: 5.0,
                discharged: 0.0
            }
        );
        assert_eq!(
            Energy::per_interval(-1.8, 10.0),
            Energy {
                charged: 0.0,
                discharged: 5.0
            }
        );
    }

    #[test]
    fn per_interval_precision_test() {
        assert_eq!(Energy::per_interval(0.0266, 7.0).charged, 0.05172);
        assert_eq!(Energy::per_interval(-0.0266, 10.0).discharged, 0.07389);
    }

    #[test]
    fn cell_voltage_diff_test() {
        let (cell_min, cell_max) = CellExtreme::of(&[3300, 3320]);
        let pack = PackTelemetry {
            cell_min,
            cell_max,
            ..Default::default()
        };
        assert_eq!(pack.cell_voltage_diff(), Some(20));
        assert_eq!(PackTelemetry::default().cell_voltage_diff(), None);
    }
}
