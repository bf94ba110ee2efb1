//! # Modbus Request Encoder
//!
//! Builds Read Holding Registers request frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::crc::crc16_modbus;
use super::protocol::*;

/// Encode a Read Holding Registers (0x03) request frame
///
/// # Arguments
///
/// * `slave_id` - Modbus address of the meter
/// * `address` - First register address
/// * `quantity` - Number of 16-bit registers to read
///
/// # Returns
///
/// * `Bytes` - Complete RTU frame (8 bytes including CRC)
///
/// # Examples
///
/// ```
/// use meter_relay::modbus::encoder::encode_read_holding_registers;
///
/// let frame = encode_read_holding_registers(1, 0, 1);
/// assert_eq!(&frame[..], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
/// ```
pub fn encode_read_holding_registers(slave_id: u8, address: u16, quantity: u16) -> Bytes {
    let mut frame = BytesMut::with_capacity(REQUEST_FRAME_LEN);
    frame.put_u8(slave_id);
    frame.put_u8(FUNCTION_READ_HOLDING_REGISTERS);
    frame.put_u16(address);
    frame.put_u16(quantity);

    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);

    frame.freeze()
}

/// Encode a Read Holding Registers response, as the meter would send it
#[cfg(test)]
pub(crate) fn encode_read_response(slave_id: u8, registers: &[u16]) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(RESPONSE_HEADER_LEN + registers.len() * 2 + CRC_LEN);
    frame.put_u8(slave_id);
    frame.put_u8(FUNCTION_READ_HOLDING_REGISTERS);
    frame.put_u8((registers.len() * 2) as u8);
    for &register in registers {
        frame.put_u16(register);
    }

    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);

    frame.to_vec()
}

/// Encode an exception response for the given request function
#[cfg(test)]
pub(crate) fn encode_exception_response(slave_id: u8, function: u8, code: u8) -> Vec<u8> {
    let mut frame = BytesMut::with_capacity(EXCEPTION_FRAME_LEN);
    frame.put_u8(slave_id);
    frame.put_u8(function | EXCEPTION_FLAG);
    frame.put_u8(code);

    let crc = crc16_modbus(&frame);
    frame.put_u16_le(crc);

    frame.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_frame_layout() {
        let frame = encode_read_holding_registers(101, 99, 2);

        assert_eq!(frame.len(), REQUEST_FRAME_LEN);
        assert_eq!(frame[0], 101, "First byte should be the slave id");
        assert_eq!(frame[1], FUNCTION_READ_HOLDING_REGISTERS);
        assert_eq!(&frame[2..4], &[0x00, 0x63], "Address should be big-endian");
        assert_eq!(&frame[4..6], &[0x00, 0x02], "Quantity should be big-endian");
    }

    #[test]
    fn test_request_crc_is_little_endian() {
        let frame = encode_read_holding_registers(101, 99, 2);
        let crc = crc16_modbus(&frame[..6]);
        assert_eq!(frame[6], (crc & 0xFF) as u8);
        assert_eq!(frame[7], (crc >> 8) as u8);
    }

    #[test]
    fn test_known_request_frame() {
        let frame = encode_read_holding_registers(1, 0, 1);
        assert_eq!(&frame[..], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn test_response_frame_layout() {
        let frame = encode_read_response(101, &[0x0000, 0x3F80]);
        assert_eq!(frame.len(), 9);
        assert_eq!(frame[2], 4, "Byte count should cover two registers");
        assert_eq!(&frame[3..7], &[0x00, 0x00, 0x3F, 0x80]);
    }
}
