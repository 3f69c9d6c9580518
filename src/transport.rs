//! Byte links to the BMS.
//!
//! Transports are strictly half-duplex and owned by exactly one adapter.
//! A receive that runs into its timeout without any data yields `Ok(None)`;
//! the adapters treat that as a missing response.

use crate::config::{BmsConfig, ConnectionConfig};
use crate::{Error, Result};
use std::io;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Up to the first CR or LF, terminator stripped.
    Line,
    /// Everything received until the line falls silent, unmodified.
    Raw,
}

pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
    fn receive(&mut self, timeout: Duration, mode: ReceiveMode) -> Result<Option<Vec<u8>>>;
}

/// Opens the link described by `config.connection`.
pub fn open(config: &BmsConfig) -> Result<Box<dyn Transport>> {
    log::info!("Connecting to {} BMS over {}", config.family, config.connection);
    match &config.connection {
        #[cfg(feature = "serialport")]
        ConnectionConfig::Serial { device, baud_rate } => {
            let mut serial = crate::serialport::SerialTransport::new(device, *baud_rate)?;
            serial.set_delay(config.delay);
            Ok(Box::new(serial))
        }
        #[cfg(not(feature = "serialport"))]
        ConnectionConfig::Serial { device, .. } => Err(Error::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("Serial support not compiled in, cannot open '{device}'"),
        ))),
        ConnectionConfig::Tcp { host, port } => Ok(Box::new(crate::tcp::TcpTransport::connect(
            host,
            *port,
            config.timeout,
        )?)),
    }
}

pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Collects received chunks into one response.
#[derive(Debug)]
pub(crate) struct ResponseBuffer {
    mode: ReceiveMode,
    data: Vec<u8>,
}

impl ResponseBuffer {
    pub(crate) fn new(mode: ReceiveMode) -> Self {
        Self {
            mode,
            data: Vec::new(),
        }
    }

    /// Appends a chunk, `true` once a line response is complete.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> bool {
        self.data.extend_from_slice(chunk);
        self.mode == ReceiveMode::Line && self.line_end().is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn line_end(&self) -> Option<usize> {
        let start = self
            .data
            .iter()
            .position(|b| !b.is_ascii_whitespace())?;
        self.data[start..]
            .iter()
            .position(|b| *b == b'\r' || *b == b'\n')
            .map(|end| start + end)
    }

    /// The response, `None` when nothing but whitespace arrived.
    pub(crate) fn finish(self) -> Option<Vec<u8>> {
        match self.mode {
            ReceiveMode::Raw if self.data.is_empty() => None,
            ReceiveMode::Raw => Some(self.data),
            ReceiveMode::Line => {
                let end = self.line_end().unwrap_or(self.data.len());
                let line = self.data[..end].trim_ascii();
                (!line.is_empty()).then(|| line.to_vec())
            }
        }
    }
}
