#![cfg_attr(docsrs, feature(doc_cfg))]
//! # bmslink_lib
//!
//! Wire protocol codecs and polling adapters for Pace, TDT and JK battery
//! management systems.
//!
//! The ASCII families (Pace RS485, Pace low-voltage V1/V2 and TDT) share one
//! hex framed codec parameterized by an [`ascii::AsciiProtocol`] descriptor.
//! JK boards are read as Modbus RTU holding registers. Both end up as
//! [`telemetry::PackTelemetry`] and [`telemetry::PackWarningState`] values,
//! which [`fleet::FleetTelemetry`] aggregates and [`sink`] publishes.
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `bmslink` command-line tool.
//!
//! ### Transport Features
//! - `serialport`: Enables the serial transport using the `serialport` crate. The TCP transport is always available.
//!
//! ### Utility Features
//! - `protocol_serde`: Enables `serde` serialization of the telemetry types.
//! - `bin-dependencies`: Enables all features required by the `bmslink` binary executable.

/// Contains error types for the library.
mod error;

pub mod ascii;
/// Family adapters polling a BMS through a transport.
pub mod bms;
pub mod checksum;
pub mod config;
pub mod energy;
pub mod fleet;
pub mod modbus;
pub mod normalize;
pub mod registers;
pub mod sink;
/// Raw TCP transport.
pub mod tcp;
pub mod telemetry;
pub mod transport;
pub mod warning;

pub use error::{Error, Result};

/// Serial port transport.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
