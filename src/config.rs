use crate::ascii::{AsciiProtocol, PACE_LV_V1, PACE_LV_V2, PACE_RS485, TDT_RS232};
use std::fmt;
use std::time::Duration;

/// Supported BMS protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "bin-dependencies", derive(clap::ValueEnum))]
pub enum Family {
    #[cfg_attr(feature = "bin-dependencies", value(name = "pace-rs485"))]
    PaceRs485,
    #[cfg_attr(feature = "bin-dependencies", value(name = "pace-lv-v1"))]
    PaceLvV1,
    #[cfg_attr(feature = "bin-dependencies", value(name = "pace-lv-v2"))]
    PaceLvV2,
    Tdt,
    Jk,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::PaceRs485 => "pace-rs485",
            Family::PaceLvV1 => "pace-lv-v1",
            Family::PaceLvV2 => "pace-lv-v2",
            Family::Tdt => "tdt",
            Family::Jk => "jk",
        }
    }

    /// Descriptor of the ASCII families, `None` for Modbus based ones.
    pub fn ascii_protocol(&self) -> Option<&'static AsciiProtocol> {
        match self {
            Family::PaceRs485 => Some(&PACE_RS485),
            Family::PaceLvV1 => Some(&PACE_LV_V1),
            Family::PaceLvV2 => Some(&PACE_LV_V2),
            Family::Tdt => Some(&TDT_RS232),
            Family::Jk => None,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Serial { device: String, baud_rate: u32 },
    Tcp { host: String, port: u16 },
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionConfig::Serial { device, baud_rate } => write!(f, "{device}@{baud_rate}"),
            ConnectionConfig::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

/// Everything a BMS adapter needs, handed in at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BmsConfig {
    pub family: Family,
    pub connection: ConnectionConfig,
    /// Packs polled every cycle. Empty means every pack behind a fixed
    /// address, or pack 1 for per-pack addressing.
    pub packs: Vec<u8>,
    /// Modbus slave address, detected when unset.
    pub slave_address: Option<u8>,
    /// Attempts per pack and cycle.
    pub retries: u8,
    pub data_refresh_interval: Duration,
    pub timeout: Duration,
    /// Minimum pause between two requests.
    pub delay: Duration,
}

impl Default for BmsConfig {
    fn default() -> Self {
        Self {
            family: Family::PaceLvV1,
            connection: ConnectionConfig::Serial {
                device: String::from("/dev/ttyUSB0"),
                baud_rate: 9600,
            },
            packs: Vec::new(),
            slave_address: None,
            retries: 3,
            data_refresh_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1),
            delay: Duration::from_millis(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_name_test() {
        assert_eq!(Family::PaceRs485.to_string(), "pace-rs485");
        assert_eq!(Family::Tdt.to_string(), "tdt");
    }

    #[test]
    fn ascii_protocol_test() {
        assert_eq!(
            Family::Tdt.ascii_protocol().map(|p| p.name),
            Some("tdt-rs232")
        );
        assert!(Family::Jk.ascii_protocol().is_none());
    }
}
