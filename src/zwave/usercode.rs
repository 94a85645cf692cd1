//! User code services for locks with the user code command class.

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::utils::error::LockError;

pub const SERVICE_SET_USERCODE: &str = "set_usercode";
pub const SERVICE_GET_USERCODE: &str = "get_usercode";
pub const SERVICE_CLEAR_USERCODE: &str = "clear_usercode";

pub const ATTR_NODE_ID: &str = "node_id";
pub const ATTR_CODE_SLOT: &str = "code_slot";
pub const ATTR_USERCODE: &str = "usercode";

/// Longest user code the supported locks accept.
pub const MAX_USERCODE_LEN: usize = 4;

/// Access to the user code values of the nodes on the network.
pub trait ZwaveNetwork {
    /// Current data of the user code value at `code_slot` on `node_id`.
    fn usercode(&self, node_id: u8, code_slot: u8) -> Result<String, LockError>;

    fn write_usercode(&mut self, node_id: u8, code_slot: u8, data: &str)
    -> Result<(), LockError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsercodeService {
    Set,
    Get,
    Clear,
}

impl UsercodeService {
    pub const ALL: [UsercodeService; 3] = [Self::Set, Self::Get, Self::Clear];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Set => SERVICE_SET_USERCODE,
            Self::Get => SERVICE_GET_USERCODE,
            Self::Clear => SERVICE_CLEAR_USERCODE,
        }
    }
}

impl FromStr for UsercodeService {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SERVICE_SET_USERCODE => Ok(Self::Set),
            SERVICE_GET_USERCODE => Ok(Self::Get),
            SERVICE_CLEAR_USERCODE => Ok(Self::Clear),
            other => Err(LockError::UnknownService(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUsercodeData {
    node_id: Option<Value>,
    code_slot: Option<Value>,
    usercode: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsercodeRequest {
    pub node_id: u8,
    pub code_slot: u8,
    pub usercode: Option<String>,
}

impl UsercodeRequest {
    /// Parse service data. `node_id` and `code_slot` accept integers or
    /// numeric strings; `usercode` is required for `Set` only.
    pub fn from_service_data(service: UsercodeService, data: &Value) -> Result<Self, LockError> {
        let raw = RawUsercodeData::deserialize(data)
            .map_err(|e| LockError::ServiceData(e.to_string()))?;

        let node_id = coerce_int(ATTR_NODE_ID, raw.node_id)?;
        let code_slot = coerce_int(ATTR_CODE_SLOT, raw.code_slot)?;
        let usercode = match (service, raw.usercode) {
            (UsercodeService::Set, None) => {
                return Err(LockError::ServiceData(format!(
                    "required key '{ATTR_USERCODE}' missing"
                )));
            }
            (UsercodeService::Set, Some(value)) => Some(coerce_string(value)?),
            _ => None,
        };

        Ok(Self {
            node_id,
            code_slot,
            usercode,
        })
    }
}

fn coerce_int(key: &str, value: Option<Value>) -> Result<u8, LockError> {
    let value =
        value.ok_or_else(|| LockError::ServiceData(format!("required key '{key}' missing")))?;
    let parsed = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| LockError::ServiceData(format!("invalid {key} value {value}")))
}

fn coerce_string(value: Value) -> Result<String, LockError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(LockError::ServiceData(format!(
            "invalid {ATTR_USERCODE} value {other}"
        ))),
    }
}

/// Store `usercode` in the requested slot.
pub fn set_usercode<N: ZwaveNetwork>(
    network: &mut N,
    request: &UsercodeRequest,
) -> Result<(), LockError> {
    // fail on unknown node/slot before looking at the code
    network.usercode(request.node_id, request.code_slot)?;

    let usercode = request.usercode.as_deref().unwrap_or_default();
    if usercode.chars().count() > MAX_USERCODE_LEN {
        error!(
            code_slot = request.code_slot,
            "Invalid code provided: usercode must be {MAX_USERCODE_LEN} or less digits"
        );
        return Err(LockError::InvalidUsercode {
            len: usercode.chars().count(),
            max: MAX_USERCODE_LEN,
        });
    }

    network.write_usercode(request.node_id, request.code_slot, usercode)
}

pub fn get_usercode<N: ZwaveNetwork>(
    network: &N,
    request: &UsercodeRequest,
) -> Result<String, LockError> {
    let usercode = network.usercode(request.node_id, request.code_slot)?;
    info!(code_slot = request.code_slot, "Usercode at slot is: {usercode}");
    Ok(usercode)
}

/// Overwrite the slot with as many NUL characters as the current code is long.
pub fn clear_usercode<N: ZwaveNetwork>(
    network: &mut N,
    request: &UsercodeRequest,
) -> Result<(), LockError> {
    let current = network.usercode(request.node_id, request.code_slot)?;
    let data = "\0".repeat(current.chars().count());
    debug!(len = data.len(), "Data to clear lock");

    network.write_usercode(request.node_id, request.code_slot, &data)?;
    info!(code_slot = request.code_slot, "Usercode at slot is cleared");
    Ok(())
}

/// Dispatch a lock service call by name. `get_usercode` returns the code.
pub fn handle_service<N: ZwaveNetwork>(
    network: &mut N,
    service: &str,
    data: &Value,
) -> Result<Option<String>, LockError> {
    let service = service.parse::<UsercodeService>()?;
    let request = UsercodeRequest::from_service_data(service, data)?;

    match service {
        UsercodeService::Set => set_usercode(network, &request).map(|_| None),
        UsercodeService::Get => get_usercode(network, &request).map(Some),
        UsercodeService::Clear => clear_usercode(network, &request).map(|_| None),
    }
}
