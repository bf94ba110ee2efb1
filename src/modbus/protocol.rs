//! # Modbus Protocol Constants
//!
//! Core protocol definitions for Modbus RTU communication.

/// Read Holding Registers function code
pub const FUNCTION_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Exception code: illegal function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Exception code: illegal data address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Exception code: illegal data value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Exception code: slave device failure
pub const EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;

/// Exception code: slave device busy
pub const EXCEPTION_SLAVE_DEVICE_BUSY: u8 = 0x06;

/// Maximum registers in one Read Holding Registers request
pub const MAX_READ_REGISTERS: u16 = 125;

/// Request frame size: slave(1) + function(1) + address(2) + quantity(2) + crc(2)
pub const REQUEST_FRAME_LEN: usize = 8;

/// Response header size: slave(1) + function(1) + byte count or exception code(1)
pub const RESPONSE_HEADER_LEN: usize = 3;

/// Exception frame size: slave(1) + function(1) + code(1) + crc(2)
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// CRC trailer size
pub const CRC_LEN: usize = 2;

/// Valid unicast slave addresses
pub const SLAVE_ID_MIN: u8 = 1;
pub const SLAVE_ID_MAX: u8 = 247;

/// Human-readable name for an exception code
pub fn exception_name(code: u8) -> &'static str {
    match code {
        EXCEPTION_ILLEGAL_FUNCTION => "illegal function",
        EXCEPTION_ILLEGAL_DATA_ADDRESS => "illegal data address",
        EXCEPTION_ILLEGAL_DATA_VALUE => "illegal data value",
        EXCEPTION_SLAVE_DEVICE_FAILURE => "slave device failure",
        EXCEPTION_SLAVE_DEVICE_BUSY => "slave device busy",
        _ => "unknown exception",
    }
}
