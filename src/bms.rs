//! Family adapters turning transport exchanges into typed telemetry.
//!
//! Every adapter owns its transport exclusively. Within one cycle a failing
//! pack is retried up to [`BmsConfig::retries`] times and then skipped, so a
//! single unresponsive pack never hides the others. Transport failures are
//! never retried here; they end the cycle and the caller reconnects through
//! [`Bms::reconnect`].

use crate::ascii::{
    decode_frame, decode_pack_quantity, decode_product_info, decode_software_version,
    Addressing, AsciiProtocol, Command, Frame, ALL_PACKS,
};
use crate::config::BmsConfig;
use crate::energy::EnergyAccumulator;
use crate::modbus::{build_read_request, decode_read_response, READ_HOLDING_REGISTERS};
use crate::normalize::round_to;
use crate::registers::{self, RegisterDescriptor, JK_TEMPERATURE_REGISTERS};
use crate::telemetry::{CellExtreme, Energy, PackTelemetry, PackWarningState, ProductInfo};
use crate::transport::{ReceiveMode, Transport};
use crate::warning::{decode_bits, jk, Flags, WarningCode};
use crate::{Error, Result};
use std::ops::RangeInclusive;
use std::time::SystemTime;

macro_rules! request_with_retry {
    ($self:ident, $request:expr) => {{
        let attempts = $self.config.retries.max(1);
        'retry_block: {
            for t in 1..attempts {
                match $request {
                    Ok(result) => break 'retry_block Ok(result),
                    Err(err) if err.is_transport() => break 'retry_block Err(err),
                    Err(err) => {
                        log::trace!("Failed try {} of {}, repeating ({err})", t, attempts);
                    }
                }
            }
            $request
        }
    }};
}

/// Uniform polling interface over all BMS families.
pub trait Bms {
    fn name(&self) -> &'static str;

    /// Telemetry of every configured pack that answered.
    fn poll_analog(&mut self) -> Result<Vec<PackTelemetry>>;

    /// Warning state of every configured pack that answered.
    fn poll_warnings(&mut self) -> Result<Vec<PackWarningState>>;

    /// Number of packs the BMS reports.
    fn pack_quantity(&mut self) -> Result<u8>;

    fn software_version(&mut self, pack: u8) -> Result<String>;

    fn product_info(&mut self, pack: u8) -> Result<ProductInfo>;

    /// Replaces a broken transport, keeping all adapter state.
    fn reconnect(&mut self, transport: Box<dyn Transport>);
}

/// Opens the configured transport and wraps it in the adapter of the
/// configured family.
pub fn connect(config: &BmsConfig) -> Result<Box<dyn Bms>> {
    let transport = crate::transport::open(config)?;
    Ok(match config.family.ascii_protocol() {
        Some(protocol) => Box::new(AsciiBms::new(transport, protocol, config.clone())),
        None => Box::new(JkBms::new(transport, config.clone())),
    })
}

/// Adapter for the ASCII families.
pub struct AsciiBms {
    transport: Box<dyn Transport>,
    protocol: &'static AsciiProtocol,
    config: BmsConfig,
}

impl AsciiBms {
    pub fn new(
        transport: Box<dyn Transport>,
        protocol: &'static AsciiProtocol,
        config: BmsConfig,
    ) -> Self {
        Self {
            transport,
            protocol,
            config,
        }
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Frame> {
        log::trace!(
            "{}: request {}",
            self.protocol.name,
            String::from_utf8_lossy(request).trim_end()
        );
        self.transport.send(request)?;
        let response = self
            .transport
            .receive(self.config.timeout, ReceiveMode::Line)?
            .ok_or(Error::NoResponse)?;
        log::trace!(
            "{}: response {}",
            self.protocol.name,
            String::from_utf8_lossy(&response)
        );
        decode_frame(&response)
    }

    fn query<R>(
        &mut self,
        command: Command,
        pack: u8,
        decode: impl Fn(&Frame) -> Result<R>,
    ) -> Result<R> {
        let request = self.protocol.encode_request(command, pack);
        request_with_retry!(self, self.exchange(&request).and_then(|frame| decode(&frame)))
    }

    fn targets(&self) -> Vec<u8> {
        if !self.config.packs.is_empty() {
            return self.config.packs.clone();
        }
        match self.protocol.addressing {
            Addressing::Fixed(_) => vec![ALL_PACKS],
            Addressing::PerPack => vec![1],
        }
    }

    fn first_target(&self) -> u8 {
        self.targets().first().copied().unwrap_or(1)
    }

    /// Runs `poll` for every target pack, skipping packs that fail with
    /// anything but a transport error.
    fn poll_packs<R>(
        &mut self,
        what: &str,
        mut poll: impl FnMut(&mut Self, u8) -> Result<Vec<R>>,
    ) -> Result<Vec<R>> {
        let mut results = Vec::new();
        for target in self.targets() {
            match poll(self, target) {
                Ok(decoded) => results.extend(decoded),
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "{}: no {what} data from pack {target} ({err})",
                        self.protocol.name
                    );
                }
            }
        }
        if results.is_empty() {
            return Err(Error::NoData(format!("{what} of {}", self.protocol.name)));
        }
        Ok(results)
    }
}

impl Bms for AsciiBms {
    fn name(&self) -> &'static str {
        self.protocol.name
    }

    fn poll_analog(&mut self) -> Result<Vec<PackTelemetry>> {
        let protocol = self.protocol;
        let mut packs = self.poll_packs("analog", |bms, target| {
            bms.query(Command::Analog, target, |frame| {
                protocol.decode_analog(frame, target)
            })
        })?;
        let interval = self.config.data_refresh_interval.as_secs_f64();
        for pack in &mut packs {
            pack.energy = Some(Energy::per_interval(pack.power, interval));
        }
        Ok(packs)
    }

    fn poll_warnings(&mut self) -> Result<Vec<PackWarningState>> {
        let protocol = self.protocol;
        self.poll_packs("warning", |bms, target| {
            bms.query(Command::Warning, target, |frame| {
                protocol.decode_warnings(frame, target)
            })
        })
    }

    fn pack_quantity(&mut self) -> Result<u8> {
        let pack = self.first_target();
        self.query(Command::PackQuantity, pack, decode_pack_quantity)
    }

    fn software_version(&mut self, pack: u8) -> Result<String> {
        self.query(Command::SoftwareVersion, pack, decode_software_version)
    }

    fn product_info(&mut self, pack: u8) -> Result<ProductInfo> {
        self.query(Command::ProductInfo, pack, decode_product_info)
    }

    fn reconnect(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }
}

const JK_ADDRESS_CANDIDATES: [u8; 2] = [0x00, 0x01];
const JK_DEFAULT_ADDRESS: u8 = 0x00;
const JK_TEMPERATURE_RANGE: RangeInclusive<f64> = -50.0..=150.0;

/// Adapter for JK BMS boards speaking Modbus RTU.
pub struct JkBms {
    transport: Box<dyn Transport>,
    config: BmsConfig,
    slave_address: u8,
    address_detected: bool,
    accumulator: EnergyAccumulator,
    /// Cell and temperature sensor counts of the last analog poll.
    sensor_counts: Option<(usize, usize)>,
}

impl JkBms {
    pub fn new(transport: Box<dyn Transport>, config: BmsConfig) -> Self {
        let (slave_address, address_detected) = match config.slave_address {
            Some(address) => (address, true),
            None => (JK_DEFAULT_ADDRESS, false),
        };
        Self {
            transport,
            config,
            slave_address,
            address_detected,
            accumulator: EnergyAccumulator::new(),
            sensor_counts: None,
        }
    }

    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    /// Energy booked since construction.
    pub fn energy_totals(&self) -> Energy {
        self.accumulator.totals()
    }

    fn read_once(&mut self, register: &RegisterDescriptor) -> Result<Vec<u16>> {
        let request = build_read_request(self.slave_address, register.address, register.count);
        log::trace!("jk: read {} request={:02X?}", register.name, request);
        self.transport.send(&request)?;
        let response = self
            .transport
            .receive(self.config.timeout, ReceiveMode::Raw)?
            .ok_or(Error::NoResponse)?;
        let mut values = decode_read_response(&response, READ_HOLDING_REGISTERS)?;
        if values.len() < register.count as usize {
            return Err(Error::IncompleteData {
                expected: register.count as usize,
                actual: values.len(),
            });
        }
        values.truncate(register.count as usize);
        Ok(values)
    }

    fn read(&mut self, name: &str) -> Result<(&'static RegisterDescriptor, Vec<u16>)> {
        let register = registers::lookup(name)?;
        let values = request_with_retry!(self, self.read_once(register))?;
        Ok((register, values))
    }

    fn value(&mut self, name: &str) -> Result<f64> {
        let (register, values) = self.read(name)?;
        register.value(&values)
    }

    fn text(&mut self, name: &str) -> Result<String> {
        let (register, values) = self.read(name)?;
        register.text(&values)
    }

    /// Probes the candidate addresses with a voltage read. Without an
    /// answer the default address is kept and detection runs again on the
    /// next poll.
    fn ensure_address(&mut self) -> Result<()> {
        if self.address_detected {
            return Ok(());
        }
        let probe = registers::lookup("BatVol")?;
        for candidate in JK_ADDRESS_CANDIDATES {
            self.slave_address = candidate;
            match self.read_once(probe) {
                Ok(_) => {
                    log::info!("jk: detected slave address {:#04X}", candidate);
                    self.address_detected = true;
                    return Ok(());
                }
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => log::debug!("jk: no answer at address {:#04X} ({err})", candidate),
            }
        }
        log::warn!(
            "jk: slave address detection failed, using {:#04X}",
            JK_DEFAULT_ADDRESS
        );
        self.slave_address = JK_DEFAULT_ADDRESS;
        Ok(())
    }

    fn read_cells(&mut self) -> Result<Vec<u16>> {
        let (_, values) = self.read("CellVol0")?;
        Ok(values.into_iter().filter(|v| *v > 0).collect())
    }

    fn read_temperatures(&mut self) -> Result<Vec<f64>> {
        let mut temperatures = Vec::with_capacity(JK_TEMPERATURE_REGISTERS.len());
        for name in JK_TEMPERATURE_REGISTERS {
            let value = self.value(name)?;
            if JK_TEMPERATURE_RANGE.contains(&value) {
                temperatures.push(value);
            } else {
                log::debug!("jk: ignoring {name}={value}");
            }
        }
        Ok(temperatures)
    }

    fn read_pack(&mut self) -> Result<PackTelemetry> {
        self.ensure_address()?;
        let cell_voltages = self.read_cells()?;
        let temperatures = self.read_temperatures()?;
        let current = self.value("BatCurrent")?;
        let voltage = self.value("BatVol")?;
        // BatWatt carries no sign
        let watt = self.value("BatWatt")?;
        let power = if current < 0.0 { -watt } else { watt };

        let (register, values) = self.read("BalanSOC")?;
        let (_, soc) = register.split_bytes(&values)?;
        let (register, values) = self.read("SOCSOH")?;
        let (soh, _) = register.split_bytes(&values)?;
        let (register, values) = self.read("SOCCycleCount")?;
        let cycle_count = u32::try_from(register.raw(&values)?).unwrap_or(u32::MAX);

        let remaining_capacity = self.value("SOCCapRemain")?;
        let full_capacity = self.value("SOCFullChargeCap")?;
        let balance_current = self.value("BalanCurrent")?;
        let hardware_version = self.text("HardwareVersion")?;
        let software_version = self.text("SoftwareVersion")?;

        let totals = self.accumulator.accumulate(power, SystemTime::now());
        let (cell_min, cell_max) = CellExtreme::of(&cell_voltages);
        self.sensor_counts = Some((cell_voltages.len(), temperatures.len()));

        Ok(PackTelemetry {
            pack: 1,
            cell_voltages,
            cell_min,
            cell_max,
            temperatures,
            current,
            voltage,
            power,
            remaining_capacity,
            full_capacity,
            design_capacity: full_capacity,
            cycle_count,
            soc: soc as f64,
            soh: soh as f64,
            balance_current: Some(balance_current),
            energy: Some(Energy {
                charged: round_to(totals.charged, 2),
                discharged: round_to(totals.discharged, 2),
            }),
            hardware_version: Some(hardware_version),
            software_version: Some(software_version),
        })
    }

    fn sensor_counts(&mut self) -> Result<(usize, usize)> {
        if let Some(counts) = self.sensor_counts {
            return Ok(counts);
        }
        let cells = self.read_cells()?.len();
        let temperatures = self.read_temperatures()?.len();
        self.sensor_counts = Some((cells, temperatures));
        Ok((cells, temperatures))
    }
}

impl Bms for JkBms {
    fn name(&self) -> &'static str {
        "jk"
    }

    fn poll_analog(&mut self) -> Result<Vec<PackTelemetry>> {
        Ok(vec![self.read_pack()?])
    }

    fn poll_warnings(&mut self) -> Result<Vec<PackWarningState>> {
        self.ensure_address()?;
        let (register, values) = self.read("AlarmSta")?;
        let alarm = register.raw(&values)? as u32;
        let (cells, temperatures) = self.sensor_counts()?;
        Ok(vec![PackWarningState {
            pack: 1,
            cell_warnings: vec![WarningCode::Normal; cells],
            temperature_warnings: vec![WarningCode::Normal; temperatures],
            charge_current: WarningCode::Normal,
            total_voltage: WarningCode::Normal,
            discharge_current: WarningCode::Normal,
            protect_state_1: decode_bits(alarm, jk::PROTECT_STATE_1),
            protect_state_2: decode_bits(alarm, jk::PROTECT_STATE_2),
            instruction_state: Flags::default(),
            control_state: Flags::default(),
            fault_state: decode_bits(alarm, jk::FAULT_STATE),
            balance_state_1: 0,
            balance_state_2: 0,
            warn_state_1: Flags::default(),
            warn_state_2: Flags::default(),
        }])
    }

    fn pack_quantity(&mut self) -> Result<u8> {
        Ok(1)
    }

    fn software_version(&mut self, _pack: u8) -> Result<String> {
        self.ensure_address()?;
        self.text("SoftwareVersion")
    }

    fn product_info(&mut self, _pack: u8) -> Result<ProductInfo> {
        self.ensure_address()?;
        Ok(ProductInfo {
            bms: self.text("HardwareVersion")?,
            pack: None,
        })
    }

    fn reconnect(&mut self, transport: Box<dyn Transport>) {
        self.transport = transport;
    }
}
