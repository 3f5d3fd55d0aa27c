//! MQTT telemetry ingestion for ESP32 environment sensors.
//!
//! [`observer::Coordinator`] owns the broker session and the ingestion pipeline,
//! [`observer::device::DeviceService`] is the entry point for device administration.

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod mqtt;
pub mod observer;
pub mod registry;
pub mod resolver;
pub mod store;
