//! Warning codes and status bitfields.
//!
//! Every family keeps its own bit tables. Conceptually identical faults sit
//! on different bits (and carry different names) depending on the firmware,
//! so the tables are never shared between families.

use std::fmt;

#[cfg(feature = "protocol_serde")]
use serde::{ser::SerializeMap, Serialize, Serializer};

/// Severity code reported per cell, per sensor and for the pack totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    Normal,
    BelowLowerLimit,
    AboveUpperLimit,
    UserDefined(u8),
    OtherFault,
    Unknown(u8),
}

impl From<u8> for WarningCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => WarningCode::Normal,
            0x01 => WarningCode::BelowLowerLimit,
            0x02 => WarningCode::AboveUpperLimit,
            0x80..=0xEF => WarningCode::UserDefined(value),
            0xF0 => WarningCode::OtherFault,
            _ => WarningCode::Unknown(value),
        }
    }
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::Normal => "normal",
            WarningCode::BelowLowerLimit => "below lower limit",
            WarningCode::AboveUpperLimit => "above upper limit",
            WarningCode::UserDefined(_) => "user defined",
            WarningCode::OtherFault => "other fault",
            WarningCode::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "protocol_serde")]
impl Serialize for WarningCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Ordered `(mask, name)` pairs for one status register. A zero mask marks a
/// flag the firmware does not report; it always decodes as `false`.
pub type BitTable = &'static [(u32, &'static str)];

/// Named flags of one status register in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Flags(Vec<(&'static str, bool)>);

impl Flags {
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        self.0.iter().copied()
    }

    /// Names of all flags that are set.
    pub fn active(&self) -> Vec<&'static str> {
        self.0.iter().filter(|(_, v)| *v).map(|(n, _)| *n).collect()
    }
}

#[cfg(feature = "protocol_serde")]
impl Serialize for Flags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

pub fn decode_bits(value: u32, table: BitTable) -> Flags {
    Flags(
        table
            .iter()
            .map(|(mask, name)| (*name, value & mask != 0))
            .collect(),
    )
}

/// Bit tables of the status registers of one family.
#[derive(Debug, Clone, Copy)]
pub struct WarningTables {
    pub protect_state_1: BitTable,
    pub protect_state_2: BitTable,
    pub instruction_state: BitTable,
    pub control_state: BitTable,
    pub fault_state: BitTable,
    pub warn_state_1: BitTable,
    pub warn_state_2: BitTable,
}

/// Multi-pack RS485 firmware.
pub const PACE_RS485_TABLES: WarningTables = WarningTables {
    protect_state_1: &[
        (0x40, "short_circuit_protect"),
        (0x20, "discharge_current_protect"),
        (0x10, "charge_current_protect"),
        (0x08, "lower_total_voltage_protect"),
        (0x04, "above_total_voltage_protect"),
        (0x02, "lower_cell_voltage_protect"),
        (0x01, "above_cell_voltage_protect"),
    ],
    protect_state_2: &[
        (0x80, "fully_protect"),
        (0x40, "lower_env_temperature_protect"),
        (0x20, "above_env_temperature_protect"),
        (0x10, "above_MOS_temperature_protect"),
        (0x08, "lower_discharge_temperature_protect"),
        (0x04, "lower_charge_temperature_protect"),
        (0x02, "above_discharge_temperature_protect"),
        (0x01, "above_charge_temperature_protect"),
    ],
    instruction_state: &[
        (0x80, "hert_indicate"),
        (0x20, "acin"),
        (0x10, "reverse_indicate"),
        (0x08, "pack_indicate"),
        (0x04, "dfet_indicate"),
        (0x02, "cfet_indicate"),
        (0x01, "current_limit_indicate"),
    ],
    control_state: &[
        (0x20, "led_warn_function"),
        (0x10, "current_limit_function"),
        (0x08, "current_limit_gear"),
        (0x01, "buzzer_warn_function"),
    ],
    fault_state: &[
        (0x20, "sample_fault"),
        (0x10, "cell_fault"),
        (0x04, "ntc_fault"),
        (0x02, "discharge_mos_fault"),
        (0x01, "charge_mos_fault"),
    ],
    warn_state_1: &[
        (0x20, "discharge_current_warn"),
        (0x10, "charge_current_warn"),
        (0x08, "lower_total_voltage_warn"),
        (0x04, "above_total_voltage_warn"),
        (0x02, "lower_cell_voltage_warn"),
        (0x01, "above_cell_voltage_warn"),
    ],
    warn_state_2: &[
        (0x80, "low_power_warn"),
        (0x40, "high_MOS_temperature_warn"),
        (0x20, "low_env_temperature_warn"),
        (0x10, "high_env_temperature_warn"),
        (0x08, "low_discharge_temperature_warn"),
        (0x04, "low_charge_temperature_warn"),
        (0x02, "above_discharge_temperature_warn"),
        (0x01, "above_charge_temperature_warn"),
    ],
};

/// Single-pack RS232 firmware, both layouts.
pub const PACE_LV_TABLES: WarningTables = WarningTables {
    protect_state_1: &[
        (0x40, "protect_short_circuit"),
        (0x20, "protect_high_discharge_current"),
        (0x10, "protect_high_charge_current"),
        (0x08, "protect_low_total_voltage"),
        (0x04, "protect_high_total_voltage"),
        (0x02, "protect_low_cell_voltage"),
        (0x01, "protect_high_cell_voltage"),
    ],
    protect_state_2: &[
        (0x80, "status_fully_charged"),
        (0x40, "protect_low_env_temp"),
        (0x20, "protect_high_env_temp"),
        (0x10, "protect_high_MOS_temp"),
        (0x08, "protect_low_discharge_temp"),
        (0x04, "protect_low_charge_temp"),
        (0x02, "protect_high_discharge_temp"),
        (0x01, "protect_high_charge_temp"),
    ],
    instruction_state: &[
        (0x20, "status_charger_avaliable"),
        (0x10, "status_reverse_connected"),
        (0x04, "status_discharge_enabled"),
        (0x02, "status_charge_enabled"),
        (0x01, "status_current_limit_enabled"),
    ],
    control_state: &[
        (0x20, "led_warn_function"),
        (0x10, "current_limit_function"),
        (0x08, "current_limit_gear"),
        (0x01, "buzzer_warn_function"),
    ],
    fault_state: &[
        (0x20, "fault_sampling"),
        (0x10, "fault_cell"),
        (0x04, "fault_NTC"),
        (0x02, "fault_discharge_MOS"),
        (0x01, "fault_charge_MOS"),
    ],
    warn_state_1: &[
        (0x20, "warn_high_discharge_current"),
        (0x10, "warn_high_charge_current"),
        (0x08, "warn_low_total_voltage"),
        (0x04, "warn_high_total_voltage"),
        (0x02, "warn_low_cell_voltage"),
        (0x01, "warn_high_cell_voltage"),
    ],
    warn_state_2: &[
        (0x80, "warn_low_SOC"),
        (0x40, "warn_high_MOS_temp"),
        (0x20, "warn_low_env_temp"),
        (0x10, "warn_high_env_temp"),
        (0x08, "warn_low_discharge_temp"),
        (0x04, "warn_low_charge_temp"),
        (0x02, "warn_high_discharge_temp"),
        (0x01, "warn_high_charge_temp"),
    ],
};

pub const TDT_TABLES: WarningTables = WarningTables {
    protect_state_1: &[
        (0x40, "protect_short_circuit"),
        (0x20, "protect_high_discharge_current"),
        (0x10, "protect_high_charge_current"),
        (0x08, "protect_low_total_voltage"),
        (0x04, "protect_high_total_voltage"),
        (0x02, "protect_low_cell_voltage"),
        (0x01, "protect_high_cell_voltage"),
    ],
    protect_state_2: &[
        (0x80, "status_fully_charged"),
        (0x40, "protect_low_env_temp"),
        (0x20, "protect_high_env_temp"),
        (0x10, "protect_high_MOS_temp"),
        (0x08, "protect_low_discharge_temp"),
        (0x04, "protect_low_charge_temp"),
        (0x02, "protect_high_discharge_temp"),
        (0x01, "protect_high_charge_temp"),
    ],
    instruction_state: &[
        (0x20, "status_charger_avaliable"),
        (0x10, "status_reverse_connected"),
        (0x04, "status_discharge_enabled"),
        (0x02, "status_charge_enabled"),
        (0x01, "status_current_limit_enabled"),
    ],
    control_state: &[
        (0x20, "led_warn_function"),
        (0x10, "current_limit_function"),
        (0x08, "current_limit_gear"),
        (0x01, "buzzer_warn_function"),
    ],
    fault_state: &[
        (0x20, "fault_sampling"),
        (0x10, "fault_cell"),
        (0x04, "fault_NTC"),
        (0x02, "fault_discharge_MOS"),
        (0x01, "fault_charge_MOS"),
    ],
    warn_state_1: &[
        (0x20, "warn_high_discharge_current"),
        (0x10, "warn_high_charge_current"),
        (0x08, "warn_low_total_voltage"),
        (0x04, "warn_high_total_voltage"),
        (0x02, "warn_low_cell_voltage"),
        (0x01, "warn_high_cell_voltage"),
    ],
    warn_state_2: &[
        (0x80, "warn_low_SOC"),
        (0x40, "warn_high_MOS_temp"),
        (0x20, "warn_low_env_temp"),
        (0x10, "warn_high_env_temp"),
        (0x08, "warn_low_discharge_temp"),
        (0x04, "warn_low_charge_temp"),
        (0x02, "warn_high_discharge_temp"),
        (0x01, "warn_high_charge_temp"),
    ],
};

/// JK status flags, all taken from the 32 bit `AlarmSta` word.
pub mod jk {
    use super::BitTable;

    pub const PROTECT_STATE_1: BitTable = &[
        (1 << 7, "protect_short_circuit"),
        (1 << 13, "protect_high_discharge_current"),
        (1 << 6, "protect_high_charge_current"),
        (1 << 12, "protect_low_total_voltage"),
        (1 << 5, "protect_high_total_voltage"),
        (1 << 11, "protect_low_cell_voltage"),
        (1 << 4, "protect_high_cell_voltage"),
    ];

    pub const PROTECT_STATE_2: BitTable = &[
        (0, "status_fully_charged"),
        (1 << 9, "protect_low_env_temp"),
        (1 << 8, "protect_high_env_temp"),
        (1 << 1, "protect_high_MOS_temp"),
        (1 << 15, "protect_low_discharge_temp"),
        (1 << 9, "protect_low_charge_temp"),
        (1 << 15, "protect_high_discharge_temp"),
        (1 << 8, "protect_high_charge_temp"),
    ];

    pub const FAULT_STATE: BitTable = &[
        (1 << 3, "fault_sampling"),
        (1 << 2, "fault_cell"),
        (0, "fault_NTC"),
        (1 << 17, "fault_discharge_MOS"),
        (1 << 16, "fault_charge_MOS"),
    ];
}
