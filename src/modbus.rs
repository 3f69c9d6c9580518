//! Modbus RTU framing for register based BMS firmware.

use crate::checksum::{append_crc16, crc16_modbus};
use crate::{Error, Result};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
const EXCEPTION_FLAG: u8 = 0x80;
/// Slave address, function code, byte count and CRC.
const MIN_RESPONSE_LEN: usize = 5;

/// `slave fn start(BE) count(BE) crc(LE)`
pub fn build_read_request(slave: u8, start: u16, count: u16) -> Vec<u8> {
    let mut request = Vec::with_capacity(8);
    request.push(slave);
    request.push(READ_HOLDING_REGISTERS);
    request.extend_from_slice(&start.to_be_bytes());
    request.extend_from_slice(&count.to_be_bytes());
    append_crc16(&mut request);
    request
}

/// Validates a read response and returns its registers.
pub fn decode_read_response(buffer: &[u8], function_code: u8) -> Result<Vec<u16>> {
    if buffer.len() < MIN_RESPONSE_LEN {
        log::warn!(
            "Invalid buffer size - required={} received={}",
            MIN_RESPONSE_LEN,
            buffer.len()
        );
        return Err(Error::IncompleteData {
            expected: MIN_RESPONSE_LEN,
            actual: buffer.len(),
        });
    }

    let (payload, received) = buffer.split_at(buffer.len() - 2);
    let calculated = crc16_modbus(payload);
    let received = u16::from_le_bytes([received[0], received[1]]);
    if calculated != received {
        log::warn!(
            "Invalid checksum - calculated={:04X} received={:04X} buffer={:02X?}",
            calculated,
            received,
            buffer
        );
        return Err(Error::Checksum {
            calculated,
            received: format!("{received:04X}"),
        });
    }

    let actual = payload[1];
    if actual != function_code {
        let actual = if actual == function_code | EXCEPTION_FLAG {
            format!("exception {:02X}", payload[2])
        } else {
            format!("{actual:02X}")
        };
        return Err(Error::ProtocolMismatch {
            field: "function code",
            expected: format!("{function_code:02X}"),
            actual,
        });
    }

    let byte_count = payload[2] as usize;
    let data = &payload[3..];
    if data.len() < byte_count {
        return Err(Error::IncompleteData {
            expected: byte_count,
            actual: data.len(),
        });
    }
    if byte_count % 2 != 0 {
        return Err(Error::Frame(format!("Odd register byte count {byte_count}")));
    }
    Ok(data[..byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(slave: u8, function_code: u8, data: &[u8]) -> Vec<u8> {
        let mut buffer = vec![slave, function_code, data.len() as u8];
        buffer.extend_from_slice(data);
        append_crc16(&mut buffer);
        buffer
    }

    #[test]
    fn build_read_request_test() {
        assert_eq!(
            build_read_request(0x01, 0x1202, 1),
            vec![0x01, 0x03, 0x12, 0x02, 0x00, 0x01, 0x20, 0xB2]
        );
        assert_eq!(
            build_read_request(0x00, 0x1290, 2),
            vec![0x00, 0x03, 0x12, 0x90, 0x00, 0x02, 0xC0, 0x8F]
        );
    }

    #[test]
    fn decode_read_response_test() {
        let buffer = response(0x01, 0x03, &[0x00, 0x00, 0xD0, 0x0C]);
        assert_eq!(
            decode_read_response(&buffer, READ_HOLDING_REGISTERS).unwrap(),
            vec![0x0000, 0xD00C]
        );
    }

    #[test]
    fn decode_read_response_errors_test() {
        assert!(matches!(
            decode_read_response(&[0x01, 0x03, 0x00, 0x20], READ_HOLDING_REGISTERS),
            Err(Error::IncompleteData {
                expected: 5,
                actual: 4
            })
        ));

        let valid = response(0x01, 0x03, &[0x00, 0x00, 0xD0, 0x0C]);
        for index in 0..valid.len() {
            let mut corrupted = valid.clone();
            corrupted[index] ^= 0x10;
            assert!(
                matches!(
                    decode_read_response(&corrupted, READ_HOLDING_REGISTERS),
                    Err(Error::Checksum { .. })
                ),
                "byte {index} not detected"
            );
        }

        let mut exception = vec![0x01, 0x83, 0x02];
        append_crc16(&mut exception);
        assert!(matches!(
            decode_read_response(&exception, READ_HOLDING_REGISTERS),
            Err(Error::ProtocolMismatch { field: "function code", actual, .. }) if actual == "exception 02"
        ));

        let wrong_function = response(0x01, 0x04, &[0x00, 0x01]);
        assert!(matches!(
            decode_read_response(&wrong_function, READ_HOLDING_REGISTERS),
            Err(Error::ProtocolMismatch { .. })
        ));

        // byte count larger than the payload carried
        let mut short = vec![0x01, 0x03, 0x04, 0x00, 0x01];
        append_crc16(&mut short);
        assert!(matches!(
            decode_read_response(&short, READ_HOLDING_REGISTERS),
            Err(Error::IncompleteData {
                expected: 4,
                actual: 2
            })
        ));
    }
}
