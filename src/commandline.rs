use crate::mqtt;
use bmslink_lib::config::{BmsConfig, ConnectionConfig, Family};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::str::FromStr;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show cell voltages, temperatures, current, voltage, capacities and SOC of every pack
    Analog,
    /// Show warning codes and protection, fault and status flags of every pack
    Warnings,
    /// Show the values of all packs combined: capacities, current, SOC, SOH, power and cell extremes
    Fleet,
    /// Show the number of packs the BMS reports
    PackQuantity,
    /// Show the software version of a pack
    SoftwareVersion {
        /// Pack number, counted from 1
        #[clap(long, short, default_value_t = 1)]
        pack: u8,
    },
    /// Show the BMS and pack production strings
    ProductInfo {
        /// Pack number, counted from 1
        #[clap(long, short, default_value_t = 1)]
        pack: u8,
    },
    /// Run in daemon mode, periodically polling the BMS and publishing its values
    Daemon {
        /// Output destination for the values
        #[command(subcommand)]
        output: DaemonOutput,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum MqttFormat {
    Simple,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously poll the BMS and print the values to the standard output (console).
    Console,
    /// Continuously poll the BMS and publish the values to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// Output format for MQTT messages
        #[arg(long, value_enum, default_value_t = MqttFormat::Simple)]
        format: MqttFormat,
    },
}

/// `HOST:PORT` of a serial-to-Ethernet gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for TcpAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("Expected HOST:PORT, got '{s}'"))?;
        if host.is_empty() {
            return Err(format!("Missing host in '{s}'"));
        }
        let port = port
            .parse()
            .map_err(|err| format!("Invalid port '{port}': {err}"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

const fn about_text() -> &'static str {
    "Pace, TDT and JK bms command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// BMS protocol family
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = Family::PaceLvV1)]
    pub family: Family,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    /// Serial-to-Ethernet gateway (e.g., "192.168.1.20:4196"), used instead of the serial device
    #[arg(long)]
    pub tcp: Option<TcpAddress>,

    #[arg(short, long, default_value_t = 9600)]
    pub baud_rate: u32,

    /// Comma-separated list of packs to poll (e.g., "1,2,3"); the family default when omitted
    #[arg(long, use_value_delimiter = true)]
    pub packs: Vec<u8>,

    /// Modbus slave address of JK boards (e.g., "1" or "0x01"); detected when omitted
    #[arg(long, value_parser = clap_num::maybe_hex::<u8>)]
    pub slave_address: Option<u8>,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Print the values as JSON instead of the debug representation
    #[arg(long)]
    pub json: bool,

    /// Timeout for a single response (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub timeout: Duration,

    // Some USB - RS485 dongles requires at least 10ms to switch between TX and RX, so use a save delay between frames
    /// Delay between sending multiple commands to the BMS (e.g., "50ms", "100ms")
    /// (useful for some serial adapters that need time to switch between TX/RX)
    #[arg(value_parser = humantime::parse_duration, long, default_value = "15ms")]
    pub delay: Duration,

    /// Number of attempts per pack and polling cycle
    #[arg(long, default_value = "3")]
    pub retries: u8,

    /// Polling interval, also the period per-interval energy values are computed for (e.g., "10s", "1m")
    #[arg(value_parser = humantime::parse_duration, long, short, default_value = "10s")]
    pub interval: Duration,
}

impl CliArgs {
    pub fn bms_config(&self) -> BmsConfig {
        let connection = match &self.tcp {
            Some(TcpAddress { host, port }) => ConnectionConfig::Tcp {
                host: host.clone(),
                port: *port,
            },
            None => ConnectionConfig::Serial {
                device: self.device.clone(),
                baud_rate: self.baud_rate,
            },
        };
        BmsConfig {
            family: self.family,
            connection,
            packs: self.packs.clone(),
            slave_address: self.slave_address,
            retries: self.retries,
            data_refresh_interval: self.interval,
            timeout: self.timeout,
            delay: self.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp_test() {
        let args = CliArgs::try_parse_from([
            "bmslink",
            "--family",
            "jk",
            "--tcp",
            "10.0.0.5:4196",
            "--slave-address",
            "0x01",
            "analog",
        ])
        .unwrap();
        let config = args.bms_config();
        assert_eq!(config.family, Family::Jk);
        assert_eq!(
            config.connection,
            ConnectionConfig::Tcp {
                host: "10.0.0.5".to_string(),
                port: 4196
            }
        );
        assert_eq!(config.slave_address, Some(1));
        assert_eq!(args.command, CliCommands::Analog);
    }

    #[test]
    fn parse_serial_test() {
        let args = CliArgs::try_parse_from([
            "bmslink",
            "--device",
            "/dev/ttyS1",
            "--packs",
            "1,2,3",
            "--interval",
            "30s",
            "daemon",
            "console",
        ])
        .unwrap();
        let config = args.bms_config();
        assert_eq!(config.family, Family::PaceLvV1);
        assert_eq!(config.packs, vec![1, 2, 3]);
        assert_eq!(config.data_refresh_interval, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert_eq!(
            config.connection,
            ConnectionConfig::Serial {
                device: "/dev/ttyS1".to_string(),
                baud_rate: 9600
            }
        );
        assert!(matches!(
            args.command,
            CliCommands::Daemon {
                output: DaemonOutput::Console
            }
        ));
    }

    #[test]
    fn parse_family_test() {
        let args =
            CliArgs::try_parse_from(["bmslink", "--family", "PACE-LV-V2", "analog"]).unwrap();
        assert_eq!(args.family, Family::PaceLvV2);
        let args = CliArgs::try_parse_from(["bmslink", "-f", "pace-rs485", "analog"]).unwrap();
        assert_eq!(args.family, Family::PaceRs485);
        assert!(CliArgs::try_parse_from(["bmslink", "--family", "daly", "analog"]).is_err());
    }

    #[test]
    fn tcp_address_test() {
        assert!("gateway".parse::<TcpAddress>().is_err());
        assert!(":502".parse::<TcpAddress>().is_err());
        assert!("host:port".parse::<TcpAddress>().is_err());
    }
}
