//! Ring.com API records
//!
//! Only the fields the sensors read are modelled; everything else in the
//! API responses is ignored during deserialization.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::RingError;

/// Device collections the API reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    Chimes,
    Doorbots,
}

impl DeviceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chimes => "chimes",
            Self::Doorbots => "doorbots",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceSettings {
    /// Chime volume.
    pub volume: Option<u64>,
    /// Doorbell speaker volume.
    pub doorbell_volume: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RingDevice {
    pub id: u64,
    pub description: String,
    pub device_id: String,
    pub firmware_version: String,
    pub kind: String,
    pub time_zone: String,
    pub battery_life: Option<u64>,
    #[serde(default)]
    pub settings: DeviceSettings,
}

/// Response of the device listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RingDevices {
    #[serde(default)]
    pub chimes: Vec<RingDevice>,
    #[serde(default)]
    pub doorbots: Vec<RingDevice>,
    #[serde(default)]
    pub authorized_doorbots: Vec<RingDevice>,
}

impl RingDevices {
    pub fn family(&self, family: DeviceFamily) -> &[RingDevice] {
        match family {
            DeviceFamily::Chimes => &self.chimes,
            DeviceFamily::Doorbots => &self.doorbots,
        }
    }

    pub fn find(&self, family: DeviceFamily, id: u64) -> Option<&RingDevice> {
        self.family(family).iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recording {
    pub status: String,
}

/// One entry of a doorbell's event history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEvent {
    pub id: u64,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub answered: bool,
    pub recording: Option<Recording>,
}

/// Access to the Ring.com account the sensors read from.
pub trait RingApi {
    fn devices(&self) -> Result<RingDevices, RingError>;

    /// Most recent events of a doorbell, newest first.
    fn history(&self, device_id: u64, limit: usize) -> Result<Vec<HistoryEvent>, RingError>;
}
