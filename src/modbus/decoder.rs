//! # Modbus Response Decoder
//!
//! Validates Read Holding Registers responses and decodes register values.

use super::crc::crc16_modbus;
use super::protocol::*;
use crate::error::SensorError;

/// Decode a complete Read Holding Registers response frame
///
/// # Arguments
///
/// * `slave_id` - Address the request was sent to
/// * `quantity` - Number of registers requested
/// * `frame` - Complete response bytes (including CRC)
///
/// # Returns
///
/// * `Result<Vec<u16>, SensorError>` - Register values in address order
///
/// # Errors
///
/// Returns `SensorError::DeviceBusy` for a "slave device busy" exception and
/// `SensorError::Malformed` if:
/// - Frame is too short or its length disagrees with the byte count
/// - CRC check fails
/// - Slave id or function code do not match the request
/// - Meter answered with any other exception
pub fn decode_read_response(slave_id: u8, quantity: u16, frame: &[u8]) -> Result<Vec<u16>, SensorError> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        return Err(SensorError::Malformed(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }

    let (body, trailer) = frame.split_at(frame.len() - CRC_LEN);
    let received_crc = u16::from_le_bytes([trailer[0], trailer[1]]);
    let calculated_crc = crc16_modbus(body);
    if calculated_crc != received_crc {
        return Err(SensorError::Malformed(format!(
            "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
            calculated_crc, received_crc
        )));
    }

    if body[0] != slave_id {
        return Err(SensorError::Malformed(format!(
            "response from slave {} while polling slave {}",
            body[0], slave_id
        )));
    }

    let function = body[1];
    if function == FUNCTION_READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        let code = body[2];
        if code == EXCEPTION_SLAVE_DEVICE_BUSY {
            return Err(SensorError::DeviceBusy);
        }
        return Err(SensorError::Malformed(format!(
            "meter exception 0x{:02X} ({})",
            code,
            exception_name(code)
        )));
    }

    if function != FUNCTION_READ_HOLDING_REGISTERS {
        return Err(SensorError::Malformed(format!(
            "unexpected function code 0x{:02X}",
            function
        )));
    }

    let byte_count = body[2] as usize;
    let expected = quantity as usize * 2;
    if byte_count != expected || body.len() != RESPONSE_HEADER_LEN + byte_count {
        return Err(SensorError::Malformed(format!(
            "byte count {} does not match {} requested registers",
            byte_count, quantity
        )));
    }

    Ok(body[RESPONSE_HEADER_LEN..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode an IEEE-754 single stored across two registers, low word first
///
/// The meter transmits the least significant 16 bits in the first register.
///
/// # Errors
///
/// Returns `SensorError::Malformed` if the slice is not exactly two registers
/// or the value is NaN or infinite.
///
/// # Examples
///
/// ```
/// use meter_relay::modbus::decoder::decode_f32_word_swapped;
///
/// assert_eq!(decode_f32_word_swapped(&[0x0000, 0x3F80]).unwrap(), 1.0);
/// ```
pub fn decode_f32_word_swapped(registers: &[u16]) -> Result<f32, SensorError> {
    let [low, high] = registers else {
        return Err(SensorError::Malformed(format!(
            "float needs 2 registers, got {}",
            registers.len()
        )));
    };

    let value = f32::from_bits(((*high as u32) << 16) | *low as u32);
    if !value.is_finite() {
        return Err(SensorError::Malformed(format!(
            "non-finite value in registers [0x{:04X}, 0x{:04X}]",
            low, high
        )));
    }

    Ok(value)
}
