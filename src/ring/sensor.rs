use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::ring::api::{DeviceFamily, HistoryEvent, RingApi, RingDevice};
use crate::ring::{ATTRIBUTION, DEFAULT_SCAN_INTERVAL_SECS, HISTORY_LIMIT};
use crate::utils::error::RingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Battery,
    LastActivity,
    Volume,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [Self::Battery, Self::LastActivity, Self::Volume];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Battery => "Battery",
            Self::LastActivity => "Last Activity",
            Self::Volume => "Volume",
        }
    }

    /// Device families this sensor is created for.
    pub fn families(&self) -> &'static [DeviceFamily] {
        match self {
            Self::Battery | Self::LastActivity => &[DeviceFamily::Doorbots],
            Self::Volume => &[DeviceFamily::Chimes, DeviceFamily::Doorbots],
        }
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        match self {
            Self::Battery => Some("%"),
            _ => None,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Battery => "mdi:battery-50",
            Self::LastActivity => "mdi:history",
            Self::Volume => "mdi:bell-ring",
        }
    }
}

fn default_conditions() -> Vec<SensorKind> {
    SensorKind::ALL.to_vec()
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RingConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "default_conditions")]
    pub monitored_conditions: Vec<SensorKind>,
    /// Seconds between two updates.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

impl RingConfig {
    pub fn from_value(config: &Value) -> Result<Self, RingError> {
        let config = RingConfig::deserialize(config)
            .map_err(|e| RingError::InvalidConfig(e.to_string()))?;
        if config.username.is_empty() || config.password.is_empty() {
            return Err(RingError::InvalidConfig(
                "username and password are required".to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct RingSensor {
    kind: SensorKind,
    family: DeviceFamily,
    device: RingDevice,
    last_event: Option<HistoryEvent>,
    name: String,
}

impl RingSensor {
    pub fn new(kind: SensorKind, family: DeviceFamily, device: RingDevice) -> Self {
        let name = format!("{} {}", device.description, kind.name());
        Self {
            kind,
            family,
            device,
            last_event: None,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn icon(&self) -> &'static str {
        self.kind.icon()
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        self.kind.unit_of_measurement()
    }

    pub fn entity_picture(&self) -> Option<&str> {
        None
    }

    pub fn state(&self) -> Option<Value> {
        match self.kind {
            SensorKind::Battery => self.device.battery_life.map(|life| life.min(100).into()),
            SensorKind::Volume => match self.family {
                DeviceFamily::Chimes => self.device.settings.volume.map(Value::from),
                DeviceFamily::Doorbots => self.device.settings.doorbell_volume.map(Value::from),
            },
            SensorKind::LastActivity => self
                .last_event
                .as_ref()
                .map(|event| event.created_at.format("%Y-%m-%d %H:%M:%S").to_string().into()),
        }
    }

    pub fn state_attributes(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("attribution".to_string(), ATTRIBUTION.into());
        data.insert("device_id".to_string(), self.device.device_id.clone().into());
        data.insert("firmware".to_string(), self.device.firmware_version.clone().into());
        data.insert("kind".to_string(), self.device.kind.clone().into());
        data.insert("timezone".to_string(), self.device.time_zone.clone().into());
        data.insert("type".to_string(), self.family.as_str().into());

        if let (SensorKind::LastActivity, Some(event)) = (self.kind, &self.last_event) {
            data.insert("created_at".to_string(), event.created_at.to_rfc3339().into());
            data.insert("answered".to_string(), event.answered.into());
            data.insert(
                "recording_status".to_string(),
                event.recording.as_ref().map(|r| r.status.clone()).into(),
            );
        }
        data
    }

    /// Refresh the device record and, for last activity, the event history.
    pub fn update<A: RingApi>(&mut self, api: &A) -> Result<(), RingError> {
        let devices = api.devices()?;
        let device = devices
            .find(self.family, self.device.id)
            .ok_or(RingError::DeviceGone(self.device.id))?;
        self.device = device.clone();

        if self.kind == SensorKind::LastActivity {
            let history = api.history(self.device.id, HISTORY_LIMIT)?;
            self.last_event = history.into_iter().next();
        }

        debug!(sensor = %self.name, state = ?self.state(), "Updated Ring sensor");
        Ok(())
    }
}

/// Create one sensor per monitored condition and supported device.
pub fn setup_sensors<A: RingApi>(api: &A, config: &RingConfig) -> Result<Vec<RingSensor>, RingError> {
    let devices = api.devices()?;

    let mut sensors = Vec::new();
    for family in [DeviceFamily::Chimes, DeviceFamily::Doorbots] {
        for device in devices.family(family) {
            for kind in &config.monitored_conditions {
                if kind.families().contains(&family) {
                    sensors.push(RingSensor::new(*kind, family, device.clone()));
                }
            }
        }
    }

    for sensor in &mut sensors {
        sensor.update(api)?;
    }

    info!(count = sensors.len(), "Ring sensors set up");
    Ok(sensors)
}
