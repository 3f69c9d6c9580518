use crate::normalize::{mean, percentage, round_to};
use crate::telemetry::{Energy, PackTelemetry};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "protocol_serde")]
use serde::Serialize;

/// A cell somewhere in the fleet, `pack` and `cell` counted from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct CellLocation {
    pub pack: u8,
    pub cell: usize,
    pub voltage: u16,
}

impl fmt::Display for CellLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pack {:02} cell {:02}", self.pack, self.cell)
    }
}

/// Totals and means over the packs of one polling cycle.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct FleetTelemetry {
    pub pack_count: usize,
    pub full_capacity: f64,
    pub remaining_capacity: f64,
    pub current: f64,
    pub soc: f64,
    pub soh: f64,
    pub voltage: f64,
    pub power: f64,
    pub energy: Energy,
    pub cell_min: Option<CellLocation>,
    pub cell_max: Option<CellLocation>,
}

impl FleetTelemetry {
    /// Recomputes the fleet view from scratch. `interval` is the polling
    /// interval the summed power is assumed to have been held for.
    pub fn aggregate(packs: &[PackTelemetry], interval: Duration) -> Self {
        let full_capacity = round_to(packs.iter().map(|p| p.full_capacity).sum(), 2);
        let remaining_capacity = round_to(packs.iter().map(|p| p.remaining_capacity).sum(), 2);
        // the fleet energy is derived from the rounded power
        let power = round_to(packs.iter().map(|p| p.power).sum(), 1);

        let mut cell_min: Option<CellLocation> = None;
        let mut cell_max: Option<CellLocation> = None;
        let cells = packs.iter().flat_map(|p| {
            p.cell_voltages
                .iter()
                .enumerate()
                .map(move |(index, voltage)| CellLocation {
                    pack: p.pack,
                    cell: index + 1,
                    voltage: *voltage,
                })
        });
        for location in cells {
            if cell_min.map_or(true, |m| location.voltage < m.voltage) {
                cell_min = Some(location);
            }
            if cell_max.map_or(true, |m| location.voltage > m.voltage) {
                cell_max = Some(location);
            }
        }

        Self {
            pack_count: packs.len(),
            full_capacity,
            remaining_capacity,
            current: round_to(packs.iter().map(|p| p.current).sum(), 2),
            soc: percentage(remaining_capacity, full_capacity, 1),
            soh: mean(packs.iter().map(|p| p.soh), 1),
            voltage: mean(packs.iter().map(|p| p.voltage), 2),
            power,
            energy: Energy::per_interval(power, interval.as_secs_f64()),
            cell_min,
            cell_max,
        }
    }
}
