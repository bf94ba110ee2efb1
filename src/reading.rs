//! # Reading
//!
//! One immutable snapshot of meter measurements plus capture metadata.
//!
//! A reading is created once by [`ReadingClock::stamp`] and never modified
//! afterwards. It is serialized with the same field layout for the ledger and
//! for the collection endpoint.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meter::registers::Measurements;

/// Immutable meter snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Stable identifier, lets the endpoint discard re-deliveries
    id: String,

    /// Wall-clock capture instant
    timestamp: DateTime<Utc>,

    /// Milliseconds since the agent started, immune to clock steps
    monotonic_ms: u64,

    /// Modbus address of the meter
    meter_id: u8,

    /// Outbound address of this device, for diagnostics only
    ip_address: String,

    #[serde(flatten)]
    measurements: Measurements,
}

impl Reading {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn monotonic_ms(&self) -> u64 {
        self.monotonic_ms
    }

    pub fn meter_id(&self) -> u8 {
        self.meter_id
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn measurements(&self) -> &Measurements {
        &self.measurements
    }
}

/// Issues capture timestamps and identifiers for one meter
#[derive(Debug)]
pub struct ReadingClock {
    meter_id: u8,
    started: Instant,
    sequence: u64,
}

impl ReadingClock {
    pub fn new(meter_id: u8) -> Self {
        Self {
            meter_id,
            started: Instant::now(),
            sequence: 0,
        }
    }

    /// Capture a reading at the current instant
    ///
    /// Identifiers have the form `{meter_id}-{unix_micros}-{sequence}`.
    pub fn stamp(&mut self, measurements: Measurements, ip_address: String) -> Reading {
        let timestamp = Utc::now();
        self.sequence += 1;

        Reading {
            id: format!("{}-{}-{}", self.meter_id, timestamp.timestamp_micros(), self.sequence),
            timestamp,
            monotonic_ms: self.started.elapsed().as_millis() as u64,
            meter_id: self.meter_id,
            ip_address,
            measurements,
        }
    }
}

/// Deterministic reading for tests; `seq` shows up in the id, timestamp and values
#[cfg(test)]
pub(crate) fn test_reading(seq: u64) -> Reading {
    use crate::meter::registers::MEASUREMENT_COUNT;
    use chrono::TimeZone;

    let values = [seq as f64; MEASUREMENT_COUNT];
    Reading {
        id: format!("101-test-{}", seq),
        timestamp: Utc.timestamp_opt(1_700_000_000 + seq as i64, 0).unwrap(),
        monotonic_ms: seq * 1000,
        meter_id: 101,
        ip_address: "192.168.1.50".to_string(),
        measurements: Measurements::from_values(&values).unwrap(),
    }
}
