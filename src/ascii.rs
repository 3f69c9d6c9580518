//! ASCII hex framing shared by the Pace and TDT families.
//!
//! ```text
//! ~ VER ADR CID1 CID2 LENGTH INFO CHKSUM \r
//! ```
//!
//! Every byte is transmitted as two uppercase hex characters. LENGTH carries
//! the LCHKSUM nibble followed by the 12 bit LENID, the number of INFO
//! characters. CHKSUM covers everything between `~` and itself. In a response
//! CID2 is replaced by the return code RTN.
//!
//! The families only differ in the data of their [`AsciiProtocol`]
//! descriptor: addressing, the layout of the analog pack trailer and their
//! status bit tables.

use crate::checksum::{frame_checksum, length_checksum, length_field};
use crate::normalize::{decikelvin_to_celsius, percentage, power_kw};
use crate::registers::{FieldDescriptor, FieldValues, ASCII_TRAILER_BASIC, ASCII_TRAILER_EXTENDED};
use crate::telemetry::{CellExtreme, PackTelemetry, PackWarningState, ProductInfo};
use crate::warning::{
    decode_bits, WarningCode, WarningTables, PACE_LV_TABLES, PACE_RS485_TABLES, TDT_TABLES,
};
use crate::{Error, Result};

pub const SOI: u8 = b'~';
pub const EOI: u8 = b'\r';
/// INFO value addressing every pack behind a fixed address.
pub const ALL_PACKS: u8 = 0xFF;

const CID1_BATTERY: u8 = 0x46;
const RTN_NORMAL: u8 = 0x00;
/// SOI, VER, ADR, CID1, RTN, LENGTH and CHKSUM of an empty frame.
const MIN_FRAME_LEN: usize = 1 + 12 + 4;
const HEADER_LEN: usize = 12;
const PRODUCT_STRING_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Analog,
    Warning,
    PackQuantity,
    SoftwareVersion,
    ProductInfo,
    /// Capacity settings, request only.
    Capacity,
    /// Real-time clock, request only.
    DateTime,
}

impl Command {
    pub fn cid2(self) -> u8 {
        match self {
            Command::Analog => 0x42,
            Command::Warning => 0x44,
            Command::PackQuantity => 0x90,
            Command::SoftwareVersion => 0xC1,
            Command::ProductInfo => 0xC2,
            Command::Capacity => 0xA6,
            Command::DateTime => 0xB1,
        }
    }

    /// Commands whose INFO is the addressed pack.
    fn carries_pack(self) -> bool {
        matches!(self, Command::Analog | Command::Warning)
    }
}

/// How the ADR byte of a request is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// One bus address, packs selected through INFO.
    Fixed(u8),
    /// ADR equals the addressed pack.
    PerPack,
}

/// Everything that distinguishes one ASCII family from another.
#[derive(Debug, Clone, Copy)]
pub struct AsciiProtocol {
    pub name: &'static str,
    pub version: u8,
    pub addressing: Addressing,
    /// Fields following the temperature list of every pack.
    pub analog_trailer: &'static [FieldDescriptor],
    pub warning_tables: WarningTables,
    /// Bytes following WARN_STATE_2 of every pack.
    pub warning_padding: usize,
    /// The pack count of a response must equal the addressed pack, and the
    /// frame holds that single pack.
    pub pack_count_is_address: bool,
}

/// Multi-pack RS485 bus, every pack answered in one frame.
pub const PACE_RS485: AsciiProtocol = AsciiProtocol {
    name: "pace-rs485",
    version: 0x25,
    addressing: Addressing::Fixed(0x00),
    analog_trailer: ASCII_TRAILER_BASIC,
    warning_tables: PACE_RS485_TABLES,
    warning_padding: 0,
    pack_count_is_address: false,
};

/// Low-voltage RS232 firmware deriving SOC and SOH from capacities.
pub const PACE_LV_V1: AsciiProtocol = AsciiProtocol {
    name: "pace-lv-v1",
    version: 0x25,
    addressing: Addressing::PerPack,
    analog_trailer: ASCII_TRAILER_BASIC,
    warning_tables: PACE_LV_TABLES,
    warning_padding: 0,
    pack_count_is_address: false,
};

/// Low-voltage RS232 firmware reporting SOC and SOH itself.
pub const PACE_LV_V2: AsciiProtocol = AsciiProtocol {
    name: "pace-lv-v2",
    version: 0x25,
    addressing: Addressing::PerPack,
    analog_trailer: ASCII_TRAILER_EXTENDED,
    warning_tables: PACE_LV_TABLES,
    warning_padding: 1,
    pack_count_is_address: false,
};

pub const TDT_RS232: AsciiProtocol = AsciiProtocol {
    name: "tdt-rs232",
    version: 0x25,
    addressing: Addressing::PerPack,
    analog_trailer: ASCII_TRAILER_BASIC,
    warning_tables: TDT_TABLES,
    warning_padding: 0,
    pack_count_is_address: true,
};

/// A validated response frame with its INFO already hex-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub address: u8,
    pub info: Vec<u8>,
}

impl AsciiProtocol {
    /// Builds the complete request, terminator included.
    pub fn encode_request(&self, command: Command, pack: u8) -> Vec<u8> {
        let address = match self.addressing {
            Addressing::Fixed(address) => address,
            Addressing::PerPack => pack,
        };
        let info = if command.carries_pack() {
            format!("{pack:02X}")
        } else {
            String::new()
        };
        let body = format!(
            "{:02X}{:02X}{:02X}{:02X}{:04X}{info}",
            self.version,
            address,
            CID1_BATTERY,
            command.cid2(),
            length_field(info.len() as u16),
        );
        let checksum = frame_checksum(body.as_bytes());
        let mut request = Vec::with_capacity(body.len() + 6);
        request.push(SOI);
        request.extend_from_slice(body.as_bytes());
        request.extend_from_slice(format!("{checksum:04X}").as_bytes());
        request.push(EOI);
        request
    }

    /// Decodes an analog response into one record per pack.
    ///
    /// `requested` is the pack the request addressed; packs are numbered from
    /// there, or from 1 for [`ALL_PACKS`].
    pub fn decode_analog(&self, frame: &Frame, requested: u8) -> Result<Vec<PackTelemetry>> {
        let mut reader = FieldReader::new(&frame.info);
        let _info_flag = reader.u8()?;
        let pack_count = self.pack_count(reader.u8()?, requested)?;

        let mut packs = Vec::with_capacity(pack_count as usize);
        for index in 0..pack_count {
            let cell_count = reader.u8()?;
            let cell_voltages = (0..cell_count)
                .map(|_| reader.u16())
                .collect::<Result<Vec<_>>>()?;
            let temperature_count = reader.u8()?;
            let temperatures = (0..temperature_count)
                .map(|_| reader.u16().map(decikelvin_to_celsius))
                .collect::<Result<Vec<_>>>()?;

            let mut trailer = FieldValues::default();
            for field in self.analog_trailer {
                trailer.push(field.name, reader.field(field)?);
            }
            let current = trailer.require("current")?;
            let voltage = trailer.require("total_voltage")?;
            let remaining_capacity = trailer.require("remaining_capacity")?;
            let full_capacity = trailer.require("full_capacity")?;
            let design_capacity = trailer.require("design_capacity")?;
            let (cell_min, cell_max) = CellExtreme::of(&cell_voltages);

            packs.push(PackTelemetry {
                pack: pack_number(requested, index),
                cell_voltages,
                cell_min,
                cell_max,
                temperatures,
                current,
                voltage,
                power: power_kw(voltage, current),
                remaining_capacity,
                full_capacity,
                design_capacity,
                cycle_count: trailer.require("cycle_count")? as u32,
                soc: trailer
                    .get("soc")
                    .unwrap_or_else(|| percentage(remaining_capacity, full_capacity, 1)),
                soh: trailer
                    .get("soh")
                    .unwrap_or_else(|| percentage(full_capacity, design_capacity, 0)),
                ..Default::default()
            });
        }
        reader.log_unparsed(self.name);
        Ok(packs)
    }

    pub fn decode_warnings(&self, frame: &Frame, requested: u8) -> Result<Vec<PackWarningState>> {
        let tables = &self.warning_tables;
        let mut reader = FieldReader::new(&frame.info);
        let _info_flag = reader.u8()?;
        let pack_count = self.pack_count(reader.u8()?, requested)?;

        let mut packs = Vec::with_capacity(pack_count as usize);
        for index in 0..pack_count {
            let cell_count = reader.u8()?;
            let cell_warnings = reader.codes(cell_count)?;
            let temperature_count = reader.u8()?;
            let temperature_warnings = reader.codes(temperature_count)?;
            let charge_current = WarningCode::from(reader.u8()?);
            let total_voltage = WarningCode::from(reader.u8()?);
            let discharge_current = WarningCode::from(reader.u8()?);
            let protect_state_1 = decode_bits(reader.u8()? as u32, tables.protect_state_1);
            let protect_state_2 = decode_bits(reader.u8()? as u32, tables.protect_state_2);
            let instruction_state = decode_bits(reader.u8()? as u32, tables.instruction_state);
            let control_state = decode_bits(reader.u8()? as u32, tables.control_state);
            let fault_state = decode_bits(reader.u8()? as u32, tables.fault_state);
            let balance_state_1 = reader.u8()?;
            let balance_state_2 = reader.u8()?;
            let warn_state_1 = decode_bits(reader.u8()? as u32, tables.warn_state_1);
            let warn_state_2 = decode_bits(reader.u8()? as u32, tables.warn_state_2);
            reader.take(self.warning_padding)?;

            packs.push(PackWarningState {
                pack: pack_number(requested, index),
                cell_warnings,
                temperature_warnings,
                charge_current,
                total_voltage,
                discharge_current,
                protect_state_1,
                protect_state_2,
                instruction_state,
                control_state,
                fault_state,
                balance_state_1,
                balance_state_2,
                warn_state_1,
                warn_state_2,
            });
        }
        reader.log_unparsed(self.name);
        Ok(packs)
    }

    fn pack_count(&self, reported: u8, requested: u8) -> Result<u8> {
        if !self.pack_count_is_address {
            return Ok(reported);
        }
        if reported != requested {
            return Err(Error::ProtocolMismatch {
                field: "pack number",
                expected: requested.to_string(),
                actual: reported.to_string(),
            });
        }
        Ok(1)
    }
}

fn pack_number(requested: u8, index: u8) -> u8 {
    if requested == ALL_PACKS {
        index + 1
    } else {
        requested.wrapping_add(index)
    }
}

/// Validates a response and hex-decodes its INFO.
///
/// Checks run in wire trust order: SOI, size, CHKSUM, CID1 and RTN, then
/// LENGTH against the INFO actually received.
pub fn decode_frame(response: &[u8]) -> Result<Frame> {
    let response = response.trim_ascii();
    if response.first() != Some(&SOI) {
        return Err(Error::Frame(format!(
            "Missing SOI - received={:?}",
            String::from_utf8_lossy(&response[..response.len().min(8)])
        )));
    }
    if response.len() < MIN_FRAME_LEN {
        log::warn!(
            "Invalid frame size - required={} received={}",
            MIN_FRAME_LEN,
            response.len()
        );
        return Err(Error::IncompleteData {
            expected: MIN_FRAME_LEN,
            actual: response.len(),
        });
    }

    let (body, received) = response[1..].split_at(response.len() - 5);
    let calculated = frame_checksum(body);
    let received_checksum = hex_digits(received).and_then(|s| u16::from_str_radix(s, 16).ok());
    if received_checksum != Some(calculated) {
        log::warn!(
            "Invalid checksum - calculated={:04X} received={} frame={}",
            calculated,
            String::from_utf8_lossy(received),
            String::from_utf8_lossy(response)
        );
        return Err(Error::Checksum {
            calculated,
            received: String::from_utf8_lossy(received).into_owned(),
        });
    }

    let header = hex_bytes(&body[..HEADER_LEN])?;
    let (version, address, cid1, rtn) = (header[0], header[1], header[2], header[3]);
    if cid1 != CID1_BATTERY {
        return Err(Error::ProtocolMismatch {
            field: "CID1",
            expected: format!("{CID1_BATTERY:02X}"),
            actual: format!("{cid1:02X}"),
        });
    }
    if rtn != RTN_NORMAL {
        return Err(Error::ProtocolMismatch {
            field: "RTN",
            expected: format!("{RTN_NORMAL:02X}"),
            actual: format!("{rtn:02X}"),
        });
    }

    let length = u16::from_be_bytes([header[4], header[5]]);
    let lenid = length & 0x0FFF;
    if length_checksum(lenid) as u16 != length >> 12 {
        return Err(Error::Frame(format!(
            "Invalid LCHKSUM - calculated={:X} received={:X}",
            length_checksum(lenid),
            length >> 12
        )));
    }
    let info = &body[HEADER_LEN..];
    let lenid = lenid as usize;
    if info.len() < lenid {
        return Err(Error::IncompleteData {
            expected: lenid,
            actual: info.len(),
        });
    }
    if info.len() > lenid {
        return Err(Error::Frame(format!(
            "INFO longer than LENID - declared={} received={}",
            lenid,
            info.len()
        )));
    }

    Ok(Frame {
        version,
        address,
        info: hex_bytes(info)?,
    })
}

pub fn decode_pack_quantity(frame: &Frame) -> Result<u8> {
    FieldReader::new(&frame.info).u8()
}

pub fn decode_software_version(frame: &Frame) -> Result<String> {
    Ok(crate::normalize::printable_text(&frame.info))
}

/// BMS production string, followed by the pack production string on
/// firmware that reports one.
pub fn decode_product_info(frame: &Frame) -> Result<ProductInfo> {
    let mut reader = FieldReader::new(&frame.info);
    let bms = reader.take(PRODUCT_STRING_LEN.min(frame.info.len()))?;
    let pack = if reader.remaining() >= PRODUCT_STRING_LEN {
        Some(crate::normalize::printable_text(
            reader.take(PRODUCT_STRING_LEN)?,
        ))
    } else {
        None
    };
    Ok(ProductInfo {
        bms: crate::normalize::printable_text(bms),
        pack,
    })
}

/// `text` as a string when it holds nothing but hex digits. `from_str_radix`
/// alone would take a leading sign.
fn hex_digits(text: &[u8]) -> Option<&str> {
    if text.iter().all(u8::is_ascii_hexdigit) {
        std::str::from_utf8(text).ok()
    } else {
        None
    }
}

fn hex_bytes(text: &[u8]) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(Error::Frame(format!(
            "Odd number of hex characters ({})",
            text.len()
        )));
    }
    text.chunks(2)
        .map(|pair| {
            hex_digits(pair)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| {
                    Error::Frame(format!(
                        "Invalid hex byte {:?}",
                        String::from_utf8_lossy(pair)
                    ))
                })
        })
        .collect()
}

/// Cursor over INFO, failing with `IncompleteData` when it runs short.
struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.offset + count;
        if end > self.data.len() {
            return Err(Error::IncompleteData {
                expected: end,
                actual: self.data.len(),
            });
        }
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn field(&mut self, field: &FieldDescriptor) -> Result<f64> {
        field.value(self.take(field.width)?)
    }

    fn codes(&mut self, count: u8) -> Result<Vec<WarningCode>> {
        Ok(self
            .take(count as usize)?
            .iter()
            .map(|c| WarningCode::from(*c))
            .collect())
    }

    fn log_unparsed(&self, protocol: &str) {
        if self.remaining() > 0 {
            log::trace!(
                "{protocol}: ignoring {} trailing INFO bytes {:02X?}",
                self.remaining(),
                &self.data[self.offset..]
            );
        }
    }
}
