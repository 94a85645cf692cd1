//! The `zwave` module implements the Z-Wave door lock platform.
//!
//! - `lock`: the lock entity, alarm/notification decoding and device workarounds
//! - `usercode`: the `set_usercode` / `get_usercode` / `clear_usercode` services
//!
//! The Z-Wave network itself is not part of this crate. Values reach the lock
//! as plain snapshots (`LockValues`) and writes leave through the
//! `DoorLockValue` and `ZwaveNetwork` traits.

pub mod lock;
pub mod usercode;

pub use lock::{DoorLockValue, LockValues, ZwaveLock};
pub use usercode::{UsercodeRequest, UsercodeService, ZwaveNetwork};

pub const DOMAIN: &str = "lock";

pub const COMMAND_CLASS_DOOR_LOCK: u8 = 0x62;
pub const COMMAND_CLASS_USER_CODE: u8 = 0x63;
pub const COMMAND_CLASS_CONFIGURATION: u8 = 0x70;
pub const COMMAND_CLASS_ALARM: u8 = 0x71;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Byte,
    Decimal,
    Int,
    List,
    Short,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueGenre {
    Basic,
    User,
    Config,
    System,
}

/// Identity of one value reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDescriptor {
    pub node_id: u8,
    pub command_class: u8,
    pub value_type: ValueType,
    pub genre: ValueGenre,
    pub index: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: u8,
    pub name: String,
    /// Hexadecimal, as reported by the controller. May be blank.
    pub manufacturer_id: String,
    /// Hexadecimal, as reported by the controller. May be blank.
    pub product_id: String,
    pub command_classes: Vec<u8>,
}

impl NodeInfo {
    pub fn has_command_class(&self, command_class: u8) -> bool {
        self.command_classes.contains(&command_class)
    }
}

/// Only user-facing boolean door lock values become lock entities.
pub fn is_lock_value(value: &ValueDescriptor) -> bool {
    value.command_class == COMMAND_CLASS_DOOR_LOCK
        && value.value_type == ValueType::Bool
        && value.genre == ValueGenre::User
}

/// Nodes carrying the user code command class get the usercode services.
pub fn supports_usercodes(node: &NodeInfo) -> bool {
    node.has_command_class(COMMAND_CLASS_USER_CODE)
}
