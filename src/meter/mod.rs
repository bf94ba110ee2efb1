//! # Meter Module
//!
//! Acquisition of readings from the energy meter over Modbus RTU.
//!
//! This module handles:
//! - Opening the RS-485 serial adapter (reopened after link failures)
//! - Reading the fixed register map, one measurement per request
//! - Decoding registers into a complete [`Reading`] or a [`SensorError`]
//!
//! No retries happen here; a failed poll is reported and the caller decides.

pub mod host;
pub mod registers;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use crate::config::MeterConfig;
use crate::error::SensorError;
use crate::modbus::decoder::decode_f32_word_swapped;
use crate::modbus::transport::read_holding_registers;
use crate::reading::{Reading, ReadingClock};
use registers::{Measurements, REGISTERS_PER_VALUE, REGISTER_MAP};

/// Source of meter readings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeterClient: Send {
    /// Acquire one complete reading
    async fn poll(&mut self) -> Result<Reading, SensorError>;
}

/// Read every register in [`REGISTER_MAP`] and decode the measurement set
///
/// Each request is bounded by `timeout`; the first failure aborts the poll.
pub async fn read_measurements<T>(io: &mut T, slave_id: u8, timeout: Duration) -> Result<Measurements, SensorError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut values = Vec::with_capacity(REGISTER_MAP.len());

    for (name, address) in REGISTER_MAP.iter() {
        let registers = read_holding_registers(io, slave_id, *address, REGISTERS_PER_VALUE, timeout).await?;
        let value = decode_f32_word_swapped(&registers).map_err(|e| match e {
            SensorError::Malformed(msg) => SensorError::Malformed(format!("{}: {}", name, msg)),
            other => other,
        })?;
        values.push(value as f64);
    }

    Measurements::from_values(&values)
}

/// Meter attached through a serial port
pub struct SerialMeter {
    config: MeterConfig,
    port: Option<tokio_serial::SerialStream>,
    clock: ReadingClock,
}

impl std::fmt::Debug for SerialMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialMeter")
            .field("port", &self.config.port)
            .field("device_id", &self.config.device_id)
            .field("connected", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialMeter {
    /// Create a meter client; the port is opened on the first poll
    pub fn new(config: MeterConfig) -> Self {
        let clock = ReadingClock::new(config.device_id);
        Self {
            config,
            port: None,
            clock,
        }
    }

    /// Open the serial port with the configured line settings
    fn open_port(config: &MeterConfig) -> Result<tokio_serial::SerialStream, SensorError> {
        let stop_bits = match config.stop_bits {
            1 => tokio_serial::StopBits::One,
            _ => tokio_serial::StopBits::Two,
        };

        tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(stop_bits)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()
            .map_err(|e| SensorError::Transport(format!("Failed to open {}: {}", config.port, e)))
    }
}

#[async_trait]
impl MeterClient for SerialMeter {
    async fn poll(&mut self) -> Result<Reading, SensorError> {
        if self.port.is_none() {
            let port = Self::open_port(&self.config)?;
            info!("Opened meter serial port {} at {} baud", self.config.port, self.config.baud_rate);
            self.port = Some(port);
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let result = match self.port.as_mut() {
            Some(port) => read_measurements(port, self.config.device_id, timeout).await,
            None => Err(SensorError::Transport("serial port not open".to_string())),
        };

        match result {
            Ok(measurements) => {
                let reading = self.clock.stamp(measurements, host::host_address());
                debug!("Polled reading {}", reading.id());
                Ok(reading)
            }
            Err(e) => {
                if matches!(e, SensorError::Transport(_)) {
                    warn!("Serial link to {} failed, will reopen on next poll", self.config.port);
                    self.port = None;
                } else if let Some(port) = self.port.as_ref() {
                    // Late bytes of an abandoned response would corrupt the next exchange
                    if let Err(clear_err) = port.clear(tokio_serial::ClearBuffer::Input) {
                        debug!("Failed to clear serial input buffer: {}", clear_err);
                    }
                }
                Err(e)
            }
        }
    }
}
