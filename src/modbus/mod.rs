//! # Modbus RTU Module
//!
//! Minimal Modbus RTU client used to read the energy meter.
//!
//! This module handles:
//! - Read Holding Registers (0x03) request encoding
//! - Response and exception frame decoding
//! - CRC-16/MODBUS checksum calculation
//! - Word-swapped IEEE-754 float decoding
//! - A single bounded request/response exchange over any async stream

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod transport;
