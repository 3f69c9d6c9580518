//! Static field and register tables.
//!
//! The ASCII families are parsed as a sequence of fixed width fields, the JK
//! family as named Modbus holding registers. Both tables carry the width,
//! signedness and unit factor of every value so the decoders never hard-code
//! a conversion.

use crate::normalize::{CENTI, DECI, MICRO, MILLI, UNIT};
use crate::{Error, Result};

/// Order of the 16 bit words of a multi-register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    HighFirst,
    LowFirst,
}

/// One field of an ASCII grammar, `width` in bytes, big-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub width: usize,
    pub signed: bool,
    pub scale: f64,
    pub decimals: u32,
}

const fn field(
    name: &'static str,
    width: usize,
    signed: bool,
    scale: f64,
    decimals: u32,
) -> FieldDescriptor {
    FieldDescriptor {
        name,
        width,
        signed,
        scale,
        decimals,
    }
}

impl FieldDescriptor {
    /// Sign-extended raw value of `bytes`, which must be exactly `width` long.
    pub fn raw(&self, bytes: &[u8]) -> Result<i64> {
        if bytes.len() != self.width {
            return Err(Error::IncompleteData {
                expected: self.width,
                actual: bytes.len(),
            });
        }
        let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
        Ok(sign_extend(value, self.width * 8, self.signed))
    }

    pub fn value(&self, bytes: &[u8]) -> Result<f64> {
        Ok(crate::normalize::scale(
            self.raw(bytes)?,
            self.scale,
            self.decimals,
        ))
    }
}

/// Pack trailer after the temperature list, shared by every ASCII family.
pub const ASCII_TRAILER_BASIC: &[FieldDescriptor] = &[
    field("current", 2, true, CENTI, 2),
    field("total_voltage", 2, false, MILLI, 2),
    field("remaining_capacity", 2, false, CENTI, 2),
    field("reserved", 1, false, UNIT, 0),
    field("full_capacity", 2, false, CENTI, 2),
    field("cycle_count", 2, false, UNIT, 0),
    field("design_capacity", 2, false, CENTI, 2),
];

/// Trailer of firmware that reports SOC and SOH itself.
pub const ASCII_TRAILER_EXTENDED: &[FieldDescriptor] = &[
    field("current", 2, true, CENTI, 2),
    field("total_voltage", 2, false, MILLI, 2),
    field("remaining_capacity", 2, false, CENTI, 2),
    field("reserved", 1, false, UNIT, 0),
    field("full_capacity", 2, false, CENTI, 2),
    field("cycle_count", 2, false, UNIT, 0),
    field("design_capacity", 2, false, CENTI, 2),
    field("soc", 1, false, UNIT, 0),
    field("accumulated_charge", 4, false, UNIT, 0),
    field("accumulated_discharge", 4, false, UNIT, 0),
    field("soh", 1, false, UNIT, 0),
    field("bus_voltage", 2, false, MILLI, 2),
    field("secondary_current", 2, true, CENTI, 2),
];

/// Decoded trailer values in table order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldValues(Vec<(&'static str, f64)>);

impl FieldValues {
    pub fn push(&mut self, name: &'static str, value: f64) {
        self.0.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name)
            .ok_or_else(|| Error::UnsupportedRegister(name.to_string()))
    }
}

/// A named Modbus holding register range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub address: u16,
    pub count: u16,
    pub word_order: WordOrder,
    pub signed: bool,
    pub scale: f64,
    pub decimals: u32,
}

const fn register(
    name: &'static str,
    address: u16,
    count: u16,
    signed: bool,
    scale: f64,
    decimals: u32,
) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        count,
        word_order: WordOrder::HighFirst,
        signed,
        scale,
        decimals,
    }
}

impl RegisterDescriptor {
    /// Assembles one 16 or 32 bit value from `registers`.
    pub fn raw(&self, registers: &[u16]) -> Result<i64> {
        let incomplete = || Error::IncompleteData {
            expected: self.count as usize,
            actual: registers.len(),
        };
        if registers.len() != self.count as usize {
            return Err(incomplete());
        }
        let value = match (registers, self.word_order) {
            ([single], _) => *single as u64,
            ([high, low], WordOrder::HighFirst) | ([low, high], WordOrder::LowFirst) => {
                ((*high as u64) << 16) | *low as u64
            }
            _ => return Err(incomplete()),
        };
        Ok(sign_extend(value, registers.len() * 16, self.signed))
    }

    pub fn value(&self, registers: &[u16]) -> Result<f64> {
        Ok(crate::normalize::scale(
            self.raw(registers)?,
            self.scale,
            self.decimals,
        ))
    }

    /// High and low byte of a single register.
    pub fn split_bytes(&self, registers: &[u16]) -> Result<(u8, u8)> {
        let raw = self.raw(registers)?;
        Ok(((raw >> 8) as u8, raw as u8))
    }

    /// ASCII text spread over the registers, two characters each, high byte
    /// first. Non-printable characters are dropped, an empty result reads
    /// as `"Unknown"`.
    pub fn text(&self, registers: &[u16]) -> Result<String> {
        if registers.len() != self.count as usize {
            return Err(Error::IncompleteData {
                expected: self.count as usize,
                actual: registers.len(),
            });
        }
        let bytes: Vec<u8> = registers.iter().flat_map(|r| r.to_be_bytes()).collect();
        let text = crate::normalize::printable_text(&bytes);
        if text == "Unknown" {
            log::warn!("Empty text in register {}", self.name);
        }
        Ok(text)
    }
}

fn sign_extend(value: u64, bits: usize, signed: bool) -> i64 {
    if signed && bits < 64 && value & (1 << (bits - 1)) != 0 {
        value as i64 - (1i64 << bits)
    } else {
        value as i64
    }
}

/// Number of consecutive cell voltage registers read from `CellVol0`.
pub const JK_CELL_REGISTERS: u16 = 32;

pub const JK_REGISTERS: &[RegisterDescriptor] = &[
    register("CellVol0", 0x1200, JK_CELL_REGISTERS, false, UNIT, 0),
    register("CellSta", 0x1240, 2, false, UNIT, 0),
    register("CellVolAve", 0x1244, 1, false, UNIT, 0),
    register("CellVdifMax", 0x1246, 1, false, UNIT, 0),
    register("MaxMinVolCellNbr", 0x1248, 1, false, UNIT, 0),
    register("TempMos", 0x128A, 1, true, DECI, 1),
    register("BatVol", 0x1290, 2, false, MILLI, 3),
    register("BatWatt", 0x1294, 2, false, MICRO, 4),
    register("BatCurrent", 0x1298, 2, true, MILLI, 3),
    register("TempBat1", 0x129C, 1, true, DECI, 1),
    register("TempBat2", 0x129E, 1, true, DECI, 1),
    register("AlarmSta", 0x12A0, 2, false, UNIT, 0),
    register("BalanCurrent", 0x12A4, 1, true, MILLI, 3),
    register("BalanSOC", 0x12A6, 1, false, UNIT, 0),
    register("SOCCapRemain", 0x12A8, 2, true, MILLI, 3),
    register("SOCFullChargeCap", 0x12AC, 2, false, MILLI, 3),
    register("SOCCycleCount", 0x12B0, 2, false, UNIT, 0),
    register("SOCCycleCap", 0x12B4, 2, false, MILLI, 3),
    register("SOCSOH", 0x12B8, 1, false, UNIT, 0),
    register("UserAlarm", 0x12BA, 1, false, UNIT, 0),
    register("RunTime", 0x12BC, 2, false, UNIT, 0),
    register("ChargeDischarge", 0x12C0, 1, false, UNIT, 0),
    register("TempBat3", 0x12F8, 1, true, DECI, 1),
    register("TempBat4", 0x12FA, 1, true, DECI, 1),
    register("TempBat5", 0x12FC, 1, true, DECI, 1),
    register("HardwareVersion", 0x1410, 4, false, UNIT, 0),
    register("SoftwareVersion", 0x1418, 4, false, UNIT, 0),
];

/// Temperature sensors in publication order.
pub const JK_TEMPERATURE_REGISTERS: &[&str] = &[
    "TempBat1", "TempBat2", "TempBat3", "TempBat4", "TempBat5", "TempMos",
];

pub fn lookup(name: &str) -> Result<&'static RegisterDescriptor> {
    JK_REGISTERS
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::UnsupportedRegister(name.to_string()))
}
