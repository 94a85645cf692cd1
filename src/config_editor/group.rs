//! Schema of one entry in the group configuration file.

use serde::Deserialize;
use serde_json::Value;

use crate::utils::error::ConfigEditError;
use crate::utils::slug::is_slug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EntityList {
    List(Vec<String>),
    /// Comma separated entity ids.
    Joined(String),
}

impl EntityList {
    pub fn entity_ids(&self) -> Vec<String> {
        match self {
            EntityList::List(ids) => ids.iter().map(|id| id.trim().to_lowercase()).collect(),
            EntityList::Joined(joined) => joined
                .split(',')
                .map(|id| id.trim().to_lowercase())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: Option<String>,
    pub entities: Option<EntityList>,
    pub icon: Option<String>,
    pub view: Option<bool>,
    pub control: Option<String>,
}

/// `<domain>.<object_id>`, both parts slugs.
pub fn is_valid_entity_id(entity_id: &str) -> bool {
    match entity_id.split_once('.') {
        Some((domain, object_id)) => is_slug(domain) && is_slug(object_id),
        None => false,
    }
}

/// Check a posted group entry. Returns the parsed form; the raw value is
/// what gets stored.
pub fn validate_group(data: &Value) -> Result<GroupConfig, ConfigEditError> {
    if !data.is_object() {
        return Err(ConfigEditError::InvalidData(
            "expected a dictionary".to_string(),
        ));
    }
    let group = GroupConfig::deserialize(data)
        .map_err(|e| ConfigEditError::InvalidData(e.to_string()))?;

    if let Some(entities) = &group.entities {
        if let Some(bad) = entities
            .entity_ids()
            .into_iter()
            .find(|id| !is_valid_entity_id(id))
        {
            return Err(ConfigEditError::InvalidData(format!(
                "Entity ID {bad} is an invalid entity id"
            )));
        }
    }
    Ok(group)
}
