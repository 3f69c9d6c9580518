//! Integrity functions for the ASCII and Modbus RTU framings.

const CRC16_SEED: u16 = 0xFFFF;
const CRC16_POLYNOMIAL: u16 = 0xA001;

/// Nibble checksum of a 12 bit LENID value, as carried in the top nibble of
/// the ASCII LENGTH field.
pub fn length_checksum(lenid: u16) -> u8 {
    let sum = (lenid & 0x0F) + ((lenid >> 4) & 0x0F) + ((lenid >> 8) & 0x0F);
    ((!sum).wrapping_add(1) & 0x0F) as u8
}

/// Complete 16 bit LENGTH field: LCHKSUM nibble followed by the 12 bit LENID.
pub fn length_field(lenid: u16) -> u16 {
    ((length_checksum(lenid) as u16) << 12) | (lenid & 0x0FFF)
}

/// Two's complement of the byte sum of everything between SOI and CHKSUM.
pub fn frame_checksum(body: &[u8]) -> u16 {
    let sum = body
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(*byte as u16));
    (!sum).wrapping_add(1)
}

pub fn crc16_modbus(buffer: &[u8]) -> u16 {
    let mut crc = CRC16_SEED;
    for byte in buffer {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the CRC of `buffer` in wire order (low byte first).
pub fn append_crc16(buffer: &mut Vec<u8>) {
    let crc = crc16_modbus(buffer);
    buffer.extend_from_slice(&crc.to_le_bytes());
}
