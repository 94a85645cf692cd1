//! Z-Wave lock entity
//!
//! The lock keeps its own view of the door lock value plus two derived
//! attributes: the last access-control notification and a human readable
//! lock status built from the alarm type/level pair.

use serde_json::{Map, Value};
use tracing::debug;

use crate::utils::error::LockError;
use crate::zwave::{NodeInfo, ValueDescriptor};

pub const ATTR_NOTIFICATION: &str = "notification";
pub const ATTR_LOCK_STATUS: &str = "lock_status";

/// Configuration value (index 12) that switches the Danalock to report its
/// state through access-control notifications.
pub const CONFIG_ADVANCED: &str = "Advanced";

const POLYCONTROL: u16 = 0x010E;
const DANALOCK_V2_BTZE: u16 = 0x0002;

fn lock_notification(code: u8) -> Option<&'static str> {
    match code {
        1 => Some("Manual Lock"),
        2 => Some("Manual Unlock"),
        3 => Some("RF Lock"),
        4 => Some("RF Unlock"),
        5 => Some("Keypad Lock"),
        6 => Some("Keypad Unlock"),
        11 => Some("Lock Jammed"),
        254 => Some("Unknown Event"),
        _ => None,
    }
}

fn lock_alarm_type(alarm_type: u8) -> Option<&'static str> {
    match alarm_type {
        9 => Some("Deadbolt Jammed"),
        18 => Some("Locked with Keypad by user "),
        19 => Some("Unlocked with Keypad by user "),
        21 => Some("Manually Locked by "),
        22 => Some("Manually Unlocked by Key or Inside thumb turn"),
        24 => Some("Locked by RF"),
        25 => Some("Unlocked by RF"),
        27 => Some("Auto re-lock"),
        33 => Some("User deleted: "),
        112 => Some("Master code changed or User added: "),
        113 => Some("Duplicate Pin-code: "),
        130 => Some("RF module, power restored"),
        161 => Some("Tamper Alarm: "),
        167 => Some("Low Battery"),
        168 => Some("Critical Battery Level"),
        169 => Some("Battery too low to operate"),
        _ => None,
    }
}

fn manual_lock_alarm_level(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("Key Cylinder or Inside thumb turn"),
        2 => Some("Touch function (lock and leave)"),
        _ => None,
    }
}

fn tamper_alarm_level(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("Too many keypresses"),
        2 => Some("Cover removed"),
        _ => None,
    }
}

/// Locked/unlocked as implied by an access-control or alarm code.
fn lock_status(code: u8) -> Option<bool> {
    match code {
        1 | 3 | 5 | 18 | 21 | 24 | 27 => Some(true),
        2 | 4 | 6 | 9 | 19 | 22 | 25 => Some(false),
        _ => None,
    }
}

/// Alarm types whose level is a user slot number.
const ALARM_TYPE_STD: [u8; 5] = [18, 19, 33, 112, 113];

/// Snapshot of the node values the lock derives its state from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockValues {
    /// The door lock bool.
    pub locked: Option<bool>,
    /// Alarm command class, "Access Control" label.
    pub access_control: Option<u8>,
    /// Alarm command class, "Alarm Type" label.
    pub alarm_type: Option<u8>,
    /// Alarm command class, "Alarm Level" label.
    pub alarm_level: Option<u8>,
    /// Configuration index 12 reads `CONFIG_ADVANCED`.
    pub advanced_config: bool,
}

/// Write access to the door lock value of a node.
pub trait DoorLockValue {
    fn write(&mut self, locked: bool) -> Result<(), LockError>;
}

#[derive(Debug)]
pub struct ZwaveLock<V> {
    value: V,
    descriptor: ValueDescriptor,
    name: String,
    v2btze: bool,
    locked: Option<bool>,
    notification: Option<&'static str>,
    lock_status: Option<String>,
}

impl<V: DoorLockValue> ZwaveLock<V> {
    pub fn new(
        node: &NodeInfo,
        descriptor: ValueDescriptor,
        value: V,
        initial: &LockValues,
    ) -> Result<Self, LockError> {
        let v2btze = needs_v2btze_workaround(node)?;
        if v2btze {
            debug!(node_id = node.node_id, "Polycontrol Danalock v2 BTZE workaround enabled");
        }

        let mut lock = Self {
            value,
            descriptor,
            name: node.name.clone(),
            v2btze,
            locked: None,
            notification: None,
            lock_status: None,
        };
        lock.update_properties(initial);
        Ok(lock)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_id(&self) -> u8 {
        self.descriptor.node_id
    }

    pub fn is_locked(&self) -> Option<bool> {
        self.locked
    }

    pub fn notification(&self) -> Option<&'static str> {
        self.notification
    }

    pub fn lock_status(&self) -> Option<&str> {
        self.lock_status.as_deref()
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn workaround_enabled(&self) -> bool {
        self.v2btze
    }

    /// Re-derive state and attributes after the node reported new values.
    pub fn update_properties(&mut self, values: &LockValues) {
        self.locked = values.locked;
        debug!(locked = ?self.locked, "Lock state set from Bool value");

        let access_control = values.access_control.filter(|code| *code != 0);
        if let Some(code) = access_control {
            self.notification = lock_notification(code);
        }

        if self.v2btze && values.advanced_config {
            self.locked = access_control.and_then(lock_status);
            debug!(
                access_control = ?access_control,
                locked = ?self.locked,
                "Lock state set from Access Control value"
            );
        }

        debug!(alarm_type = ?values.alarm_type, alarm_level = ?values.alarm_level, "Lock alarm");
        let Some(alarm_type) = values.alarm_type.filter(|t| *t != 0) else {
            return;
        };
        self.lock_status = describe_alarm(alarm_type, values.alarm_level);
    }

    pub fn lock(&mut self) -> Result<(), LockError> {
        self.value.write(true)
    }

    pub fn unlock(&mut self) -> Result<(), LockError> {
        self.value.write(false)
    }

    pub fn state_attributes(&self) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some(notification) = self.notification {
            data.insert(ATTR_NOTIFICATION.to_string(), notification.into());
        }
        if let Some(status) = &self.lock_status {
            data.insert(ATTR_LOCK_STATUS.to_string(), status.clone().into());
        }
        data
    }
}

fn describe_alarm(alarm_type: u8, alarm_level: Option<u8>) -> Option<String> {
    let text = lock_alarm_type(alarm_type)?;
    let level = alarm_level.unwrap_or_default();

    let status = match alarm_type {
        21 => match manual_lock_alarm_level(level) {
            Some(detail) => format!("{text}{detail}"),
            None => text.trim_end().to_string(),
        },
        t if ALARM_TYPE_STD.contains(&t) => format!("{text}{level}"),
        161 => match tamper_alarm_level(level) {
            Some(detail) => format!("{text}{detail}"),
            None => text.trim_end_matches([':', ' ']).to_string(),
        },
        _ => text.to_string(),
    };
    Some(status)
}

/// Parse the hex id pair and check it against the devices needing the
/// Danalock workaround. Blank ids skip detection.
pub fn needs_v2btze_workaround(node: &NodeInfo) -> Result<bool, LockError> {
    let manufacturer = node.manufacturer_id.trim();
    let product = node.product_id.trim();
    if manufacturer.is_empty() || product.is_empty() {
        return Ok(false);
    }

    let manufacturer = parse_hex_id(manufacturer)?;
    let product = parse_hex_id(product)?;
    Ok((manufacturer, product) == (POLYCONTROL, DANALOCK_V2_BTZE))
}

fn parse_hex_id(raw: &str) -> Result<u16, LockError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).map_err(|_| LockError::InvalidDeviceId(raw.to_string()))
}
