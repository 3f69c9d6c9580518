#![allow(dead_code)]

use bmslink_lib::checksum::{append_crc16, frame_checksum, length_field};
use bmslink_lib::transport::{ReceiveMode, Transport};
use bmslink_lib::{Error, Result};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::time::Duration;

pub enum Reply {
    Data(Vec<u8>),
    Timeout,
    Broken,
}

#[derive(Default)]
pub struct Script {
    pub sent: Vec<Vec<u8>>,
    pub modes: Vec<ReceiveMode>,
    pub replies: VecDeque<Reply>,
}

/// Answers every receive with the next scripted reply, `None` once the
/// script is exhausted.
#[derive(Clone, Default)]
pub struct ScriptedTransport(pub Rc<RefCell<Script>>);

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let transport = Self::default();
        transport.0.borrow_mut().replies.extend(replies);
        transport
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.borrow().sent.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.0.borrow_mut().sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration, mode: ReceiveMode) -> Result<Option<Vec<u8>>> {
        let mut script = self.0.borrow_mut();
        script.modes.push(mode);
        match script.replies.pop_front() {
            Some(Reply::Data(data)) => Ok(Some(data)),
            Some(Reply::Timeout) | None => Ok(None),
            Some(Reply::Broken) => Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link gone",
            ))),
        }
    }
}

/// An ASCII response frame as a line transport hands it over, without the
/// terminator.
pub fn ascii_response(address: u8, info: &str) -> Vec<u8> {
    let body = format!(
        "25{address:02X}4600{:04X}{info}",
        length_field(info.len() as u16)
    );
    format!("~{body}{:04X}", frame_checksum(body.as_bytes())).into_bytes()
}

/// Holding registers of one simulated Modbus slave.
pub struct ModbusSlave {
    pub address: u8,
    pub registers: HashMap<u16, u16>,
    pub requests: Rc<RefCell<Vec<Vec<u8>>>>,
    pending: Option<Vec<u8>>,
}

impl ModbusSlave {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: HashMap::new(),
            requests: Rc::default(),
            pending: None,
        }
    }

    pub fn set(&mut self, start: u16, values: &[u16]) {
        for (offset, value) in values.iter().enumerate() {
            self.registers.insert(start + offset as u16, *value);
        }
    }
}

impl Transport for ModbusSlave {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.requests.borrow_mut().push(bytes.to_vec());
        self.pending = Some(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration, _mode: ReceiveMode) -> Result<Option<Vec<u8>>> {
        let Some(request) = self.pending.take() else {
            return Ok(None);
        };
        if request[0] != self.address {
            return Ok(None);
        }
        let start = u16::from_be_bytes([request[2], request[3]]);
        let count = u16::from_be_bytes([request[4], request[5]]);
        let mut response = vec![self.address, request[1], (count * 2) as u8];
        for register in start..start + count {
            let value = self.registers.get(&register).copied().unwrap_or(0);
            response.extend_from_slice(&value.to_be_bytes());
        }
        append_crc16(&mut response);
        Ok(Some(response))
    }
}
