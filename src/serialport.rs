use crate::transport::{is_timeout, ReceiveMode, ResponseBuffer, Transport};
use crate::Result;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

// https://minimalmodbus.readthedocs.io/en/stable/serialcommunication.html#timing-of-the-serial-communications
// minimum delay 4ms by baud rate 9600
pub const MINIMUM_DELAY: Duration = Duration::from_millis(4);
/// Silence that ends a raw response once its first bytes arrived.
const FRAME_GAP: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct SerialTransport {
    serial: Box<dyn serialport::SerialPort>,
    last_execution: Instant,
    delay: Duration,
}

impl SerialTransport {
    /// Opens `port` with 8N1 and no flow control.
    pub fn new(port: &str, baud_rate: u32) -> Result<Self> {
        let serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .inspect_err(|err| log::error!("Cannot open serial port '{port}': {err}"))?;
        Ok(Self {
            serial,
            last_execution: Instant::now(),
            delay: MINIMUM_DELAY,
        })
    }

    fn serial_await_delay(&self) {
        let last_exec_diff = Instant::now().duration_since(self.last_execution);
        if let Some(time_until_delay_reached) = self.delay.checked_sub(last_exec_diff) {
            std::thread::sleep(time_until_delay_reached);
        }
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = Duration::max(delay, MINIMUM_DELAY);
    }

    // clear all incoming serial to avoid data collision
    fn drain_pending(&mut self) -> Result<()> {
        loop {
            let pending = self.serial.bytes_to_read()?;
            if pending == 0 {
                return Ok(());
            }
            log::trace!("Got {} pending bytes", pending);
            let mut buf = vec![0; 64];
            let received = self.serial.read(buf.as_mut_slice())?;
            log::trace!("Read {} pending bytes", received);
        }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.drain_pending()?;
        self.serial_await_delay();
        self.serial.write_all(bytes)?;
        log::trace!("send_bytes: {:02X?}", bytes);
        Ok(())
    }

    fn receive(&mut self, timeout: Duration, mode: ReceiveMode) -> Result<Option<Vec<u8>>> {
        let mut response = ResponseBuffer::new(mode);
        let mut chunk = [0u8; 256];
        self.serial.set_timeout(timeout)?;
        loop {
            match self.serial.read(&mut chunk) {
                Ok(0) => break,
                Ok(received) => {
                    if response.push(&chunk[..received]) {
                        break;
                    }
                    if mode == ReceiveMode::Raw {
                        self.serial.set_timeout(FRAME_GAP)?;
                    }
                }
                Err(err) if is_timeout(&err) => break,
                Err(err) => return Err(err.into()),
            }
        }
        self.last_execution = Instant::now();
        if response.is_empty() {
            log::trace!("receive_bytes: timeout after {:?}", timeout);
        }
        let response = response.finish();
        log::trace!("receive_bytes: {:02X?}", response);
        Ok(response)
    }
}
