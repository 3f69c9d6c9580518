/// Errors reported by the codecs, the transports and the BMS adapters.
///
/// Every decode failure aborts the whole response; no partial telemetry is
/// ever handed out together with one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad start marker, malformed length field or undecodable frame content.
    #[error("Frame error: {0}")]
    Frame(String),
    /// ASCII CHKSUM or Modbus CRC mismatch.
    #[error("Checksum mismatch - calculated={calculated:04X} received={received}")]
    Checksum { calculated: u16, received: String },
    /// Unexpected command, return code or function code.
    #[error("Protocol mismatch in {field} - expected={expected} received={actual}")]
    ProtocolMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
    /// Fewer bytes received than the frame declares.
    #[error("Incomplete data - expected={expected} received={actual}")]
    IncompleteData { expected: usize, actual: usize },
    /// A named register or field that the protocol table does not know.
    #[error("Unsupported register '{0}'")]
    UnsupportedRegister(String),
    /// The transport timed out without delivering a response.
    #[error("No response received")]
    NoResponse,
    /// A poll cycle where none of the requested packs answered.
    #[error("No data received for {0}")]
    NoData(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serialport")]
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
    #[error("Sink error: {0}")]
    Sink(String),
}

impl Error {
    /// `true` for failures of the link itself, after which the caller
    /// should reopen the transport before the next cycle.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Io(_) => true,
            #[cfg(feature = "serialport")]
            Error::SerialPort(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
