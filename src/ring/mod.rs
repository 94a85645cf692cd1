//! The `ring` module exposes Ring.com doorbells and chimes as sensors.
//!
//! - `api`: response records and the `RingApi` seam to the web service
//! - `sensor`: platform configuration, sensor entities and setup

pub mod api;
pub mod sensor;

pub use api::{DeviceFamily, HistoryEvent, RingApi, RingDevice, RingDevices};
pub use sensor::{RingConfig, RingSensor, SensorKind, setup_sensors};

pub const ATTRIBUTION: &str = "Data provided by Ring.com";

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

/// History entries fetched for the last activity sensor.
pub const HISTORY_LIMIT: usize = 5;
