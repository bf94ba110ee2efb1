//! # CRC-16/MODBUS Implementation
//!
//! CRC-16 checksum calculation for Modbus RTU frames.
//!
//! **Polynomial**: 0xA001 (0x8005 reflected)
//! **Initial Value**: 0xFFFF
//!
//! The checksum is transmitted low byte first.

/// CRC-16/MODBUS reflected polynomial
const CRC16_POLY: u16 = 0xA001;

/// Precomputed CRC16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC-16/MODBUS checksum using lookup table
///
/// # Arguments
///
/// * `data` - Frame bytes without the CRC trailer
///
/// # Returns
///
/// * `u16` - Calculated checksum (send as `to_le_bytes()`)
///
/// # Examples
///
/// ```
/// use meter_relay::modbus::crc::crc16_modbus;
///
/// assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
/// ```
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc = (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0x00FF) as usize];
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bitwise reference implementation, used to check the table
    fn crc16_modbus_slow(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;

        for &byte in data {
            crc ^= byte as u16;

            for _ in 0..8 {
                if (crc & 0x0001) != 0 {
                    crc = (crc >> 1) ^ CRC16_POLY;
                } else {
                    crc >>= 1;
                }
            }
        }

        crc
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc16_check_value() {
        // Standard CRC catalogue check value for CRC-16/MODBUS
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
        assert_eq!(crc16_modbus_slow(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_crc16_read_request() {
        // Read one holding register at address 0 from slave 1: 01 03 00 00 00 01 84 0A
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16_modbus(&frame).to_le_bytes(), [0x84, 0x0A]);
    }

    #[test]
    fn test_crc16_lookup_table_matches_slow() {
        let test_data = [
            vec![0x01, 0x02, 0x03],
            vec![0xFF, 0xFE, 0xFD],
            vec![0x65, 0x03, 0x00, 0x63, 0x00, 0x02],
            vec![0x00; 24],
            vec![0xFF; 10],
        ];

        for data in test_data.iter() {
            assert_eq!(
                crc16_modbus(data),
                crc16_modbus_slow(data),
                "CRC mismatch for data: {:?}",
                data
            );
        }
    }

    #[test]
    fn test_crc16_changes_with_data() {
        let crc1 = crc16_modbus(&[0x65, 0x03, 0x00, 0x63]);
        let crc2 = crc16_modbus(&[0x65, 0x03, 0x00, 0x64]);
        assert_ne!(crc1, crc2, "CRC should change when data changes");
    }
}
