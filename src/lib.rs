//! # Meter Relay Library
//!
//! Read a Modbus energy meter on a fixed interval and forward every reading
//! to a remote collection endpoint.
//!
//! Readings that cannot be delivered right away are kept in a durable on-disk
//! ledger and flushed in their original order once the endpoint is reachable
//! again.

pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod meter;
pub mod modbus;
pub mod orchestrator;
pub mod probe;
pub mod reading;
pub mod uploader;
