//! # Modbus RTU Exchange
//!
//! One request/response round trip over an async byte stream.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::decoder::decode_read_response;
use super::encoder::encode_read_holding_registers;
use super::protocol::*;
use crate::error::SensorError;

/// Read holding registers from a slave, bounded by `timeout`
///
/// # Arguments
///
/// * `io` - Serial stream (or any async byte stream in tests)
/// * `slave_id` - Modbus address of the meter
/// * `address` - First register address
/// * `quantity` - Number of registers to read
/// * `timeout` - Deadline for the whole exchange
///
/// # Errors
///
/// * `SensorError::Timeout` if the response is not complete in time
/// * `SensorError::Transport` if the stream fails
/// * Any decoding error from [`decode_read_response`]
pub async fn read_holding_registers<T>(
    io: &mut T,
    slave_id: u8,
    address: u16,
    quantity: u16,
    timeout: Duration,
) -> Result<Vec<u16>, SensorError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if quantity == 0 || quantity > MAX_READ_REGISTERS {
        return Err(SensorError::Malformed(format!(
            "cannot request {} registers (1-{})",
            quantity, MAX_READ_REGISTERS
        )));
    }

    match tokio::time::timeout(timeout, exchange(io, slave_id, address, quantity)).await {
        Ok(result) => result,
        Err(_) => Err(SensorError::Timeout(timeout.as_millis() as u64)),
    }
}

async fn exchange<T>(io: &mut T, slave_id: u8, address: u16, quantity: u16) -> Result<Vec<u16>, SensorError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let request = encode_read_holding_registers(slave_id, address, quantity);
    io.write_all(&request).await.map_err(transport_error)?;
    io.flush().await.map_err(transport_error)?;

    let mut frame = vec![0u8; RESPONSE_HEADER_LEN];
    io.read_exact(&mut frame).await.map_err(transport_error)?;

    // Exception frames carry a code instead of a byte count
    let remaining = if frame[1] & EXCEPTION_FLAG != 0 {
        EXCEPTION_FRAME_LEN - RESPONSE_HEADER_LEN
    } else {
        frame[2] as usize + CRC_LEN
    };
    frame.resize(RESPONSE_HEADER_LEN + remaining, 0);
    io.read_exact(&mut frame[RESPONSE_HEADER_LEN..]).await.map_err(transport_error)?;

    trace!("Register {} response: {:02X?}", address, frame);
    decode_read_response(slave_id, quantity, &frame)
}

fn transport_error(e: std::io::Error) -> SensorError {
    SensorError::Transport(e.to_string())
}
