//! Publishing side of the bridge.
//!
//! A [`Sink`] receives one call per leaf value. The helpers below walk the
//! telemetry types and name every value `pack_<NN>_<field>[_<NN>]`, fleet
//! values `total_<field>`.

use crate::fleet::FleetTelemetry;
use crate::telemetry::{PackTelemetry, PackWarningState};
use crate::warning::Flags;
use crate::Result;

/// Classification handed along with every value, e.g. for home automation
/// discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
    pub icon: Option<&'static str>,
}

impl Metadata {
    const fn measurement(device_class: Option<&'static str>, icon: &'static str) -> Self {
        Self {
            device_class,
            state_class: Some("measurement"),
            icon: Some(icon),
        }
    }

    pub const VOLTAGE: Self = Self::measurement(Some("voltage"), "mdi:flash-triangle");
    pub const CURRENT: Self = Self::measurement(Some("current"), "mdi:current-dc");
    pub const POWER: Self = Self::measurement(Some("power"), "mdi:battery-charging");
    pub const TEMPERATURE: Self = Self::measurement(Some("temperature"), "mdi:thermometer");
    pub const BATTERY: Self = Self::measurement(Some("battery"), "mdi:battery");
    pub const CAPACITY: Self = Self::measurement(None, "mdi:battery-high");
    pub const COUNTER: Self = Self::measurement(None, "mdi:counter");
    pub const ENERGY: Self = Self {
        device_class: Some("energy"),
        state_class: Some("total_increasing"),
        icon: Some("mdi:lightning-bolt"),
    };
    pub const PROBLEM: Self = Self {
        device_class: Some("problem"),
        state_class: None,
        icon: Some("mdi:alert"),
    };
    pub const INFO: Self = Self {
        device_class: None,
        state_class: None,
        icon: Some("mdi:information-outline"),
    };
}

pub trait Sink {
    fn publish_numeric(&mut self, name: &str, value: f64, unit: &str, metadata: &Metadata)
        -> Result<()>;

    fn publish_boolean(&mut self, name: &str, value: bool, metadata: &Metadata) -> Result<()>;

    /// Enumerated or free text value.
    fn publish_event(&mut self, name: &str, value: &str) -> Result<()>;

    /// Ends one polling cycle. Sinks that batch values emit them here.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub fn pack_field(pack: u8, field: &str) -> String {
    format!("pack_{pack:02}_{field}")
}

/// Name of the `index`-th (counted from 1) entry of a per-cell or
/// per-sensor list.
pub fn pack_indexed_field(pack: u8, field: &str, index: usize) -> String {
    format!("pack_{pack:02}_{field}_{index:02}")
}

pub fn publish_pack(sink: &mut dyn Sink, telemetry: &PackTelemetry) -> Result<()> {
    let pack = telemetry.pack;
    for (index, voltage) in telemetry.cell_voltages.iter().enumerate() {
        sink.publish_numeric(
            &pack_indexed_field(pack, "cell_voltage", index + 1),
            *voltage as f64,
            "mV",
            &Metadata::VOLTAGE,
        )?;
    }
    for (index, temperature) in telemetry.temperatures.iter().enumerate() {
        sink.publish_numeric(
            &pack_indexed_field(pack, "temperature", index + 1),
            *temperature,
            "°C",
            &Metadata::TEMPERATURE,
        )?;
    }
    if let (Some(min), Some(max)) = (telemetry.cell_min, telemetry.cell_max) {
        let extremes = [
            ("cell_voltage_min", min.voltage as f64, "mV", Metadata::VOLTAGE),
            ("cell_voltage_min_index", min.cell as f64, "", Metadata::COUNTER),
            ("cell_voltage_max", max.voltage as f64, "mV", Metadata::VOLTAGE),
            ("cell_voltage_max_index", max.cell as f64, "", Metadata::COUNTER),
            (
                "cell_voltage_diff",
                (max.voltage - min.voltage) as f64,
                "mV",
                Metadata::VOLTAGE,
            ),
        ];
        for (field, value, unit, metadata) in extremes {
            sink.publish_numeric(&pack_field(pack, field), value, unit, &metadata)?;
        }
    }

    let values = [
        ("current", telemetry.current, "A", Metadata::CURRENT),
        ("voltage", telemetry.voltage, "V", Metadata::VOLTAGE),
        ("power", telemetry.power, "kW", Metadata::POWER),
        (
            "remaining_capacity",
            telemetry.remaining_capacity,
            "Ah",
            Metadata::CAPACITY,
        ),
        ("full_capacity", telemetry.full_capacity, "Ah", Metadata::CAPACITY),
        (
            "design_capacity",
            telemetry.design_capacity,
            "Ah",
            Metadata::CAPACITY,
        ),
        ("cycle_count", telemetry.cycle_count as f64, "", Metadata::COUNTER),
        ("soc", telemetry.soc, "%", Metadata::BATTERY),
        ("soh", telemetry.soh, "%", Metadata::BATTERY),
    ];
    for (field, value, unit, metadata) in values {
        sink.publish_numeric(&pack_field(pack, field), value, unit, &metadata)?;
    }

    if let Some(balance_current) = telemetry.balance_current {
        sink.publish_numeric(
            &pack_field(pack, "balance_current"),
            balance_current,
            "A",
            &Metadata::CURRENT,
        )?;
    }
    if let Some(energy) = telemetry.energy {
        sink.publish_numeric(
            &pack_field(pack, "energy_charged"),
            energy.charged,
            "Wh",
            &Metadata::ENERGY,
        )?;
        sink.publish_numeric(
            &pack_field(pack, "energy_discharged"),
            energy.discharged,
            "Wh",
            &Metadata::ENERGY,
        )?;
    }
    if let Some(version) = &telemetry.hardware_version {
        sink.publish_event(&pack_field(pack, "hardware_version"), version)?;
    }
    if let Some(version) = &telemetry.software_version {
        sink.publish_event(&pack_field(pack, "software_version"), version)?;
    }
    Ok(())
}

fn publish_flags(sink: &mut dyn Sink, pack: u8, flags: &Flags) -> Result<()> {
    for (name, value) in flags.iter() {
        sink.publish_boolean(&pack_field(pack, name), value, &Metadata::PROBLEM)?;
    }
    Ok(())
}

pub fn publish_warnings(sink: &mut dyn Sink, state: &PackWarningState) -> Result<()> {
    let pack = state.pack;
    for (index, code) in state.cell_warnings.iter().enumerate() {
        sink.publish_event(
            &pack_indexed_field(pack, "cell_voltage_warning", index + 1),
            code.as_str(),
        )?;
    }
    for (index, code) in state.temperature_warnings.iter().enumerate() {
        sink.publish_event(
            &pack_indexed_field(pack, "temperature_warning", index + 1),
            code.as_str(),
        )?;
    }
    let codes = [
        ("charge_current_warning", &state.charge_current),
        ("total_voltage_warning", &state.total_voltage),
        ("discharge_current_warning", &state.discharge_current),
    ];
    for (field, code) in codes {
        sink.publish_event(&pack_field(pack, field), code.as_str())?;
    }
    for flags in [
        &state.protect_state_1,
        &state.protect_state_2,
        &state.instruction_state,
        &state.control_state,
        &state.fault_state,
        &state.warn_state_1,
        &state.warn_state_2,
    ] {
        publish_flags(sink, pack, flags)?;
    }
    sink.publish_numeric(
        &pack_field(pack, "balance_state_1"),
        state.balance_state_1 as f64,
        "",
        &Metadata::INFO,
    )?;
    sink.publish_numeric(
        &pack_field(pack, "balance_state_2"),
        state.balance_state_2 as f64,
        "",
        &Metadata::INFO,
    )
}

pub fn publish_fleet(sink: &mut dyn Sink, fleet: &FleetTelemetry) -> Result<()> {
    let values = [
        ("total_packs_num", fleet.pack_count as f64, "", Metadata::COUNTER),
        ("total_full_capacity", fleet.full_capacity, "Ah", Metadata::CAPACITY),
        (
            "total_remaining_capacity",
            fleet.remaining_capacity,
            "Ah",
            Metadata::CAPACITY,
        ),
        ("total_current", fleet.current, "A", Metadata::CURRENT),
        ("total_soc", fleet.soc, "%", Metadata::BATTERY),
        ("total_soh", fleet.soh, "%", Metadata::BATTERY),
        ("total_voltage", fleet.voltage, "V", Metadata::VOLTAGE),
        ("total_power", fleet.power, "kW", Metadata::POWER),
        ("total_energy_charged", fleet.energy.charged, "Wh", Metadata::ENERGY),
        (
            "total_energy_discharged",
            fleet.energy.discharged,
            "Wh",
            Metadata::ENERGY,
        ),
    ];
    for (name, value, unit, metadata) in values {
        sink.publish_numeric(name, value, unit, &metadata)?;
    }
    if let Some(min) = fleet.cell_min {
        sink.publish_numeric(
            "total_cell_voltage_min",
            min.voltage as f64,
            "mV",
            &Metadata::VOLTAGE,
        )?;
        sink.publish_event("total_cell_voltage_min_location", &min.to_string())?;
    }
    if let Some(max) = fleet.cell_max {
        sink.publish_numeric(
            "total_cell_voltage_max",
            max.voltage as f64,
            "mV",
            &Metadata::VOLTAGE,
        )?;
        sink.publish_event("total_cell_voltage_max_location", &max.to_string())?;
    }
    Ok(())
}
