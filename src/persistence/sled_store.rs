//! Restore-state cache backed by `sled`
//!
//! Entities that survive restarts (input sliders) write their last state here
//! and read it back during setup. Each entity id maps to a single JSON record
//! in the `states` tree, so a write replaces the previous value.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::utils::error::StoreError;

const STATES_TREE: &str = "states";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredState {
    pub entity_id: String,
    pub state: String,
    pub last_updated: i64,
}

#[derive(Clone)]
pub struct StateStore {
    db: Db,
    states: Tree,
}

impl StateStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let states = db.open_tree(STATES_TREE)?;
        Ok(Self { db, states })
    }

    /// Record the current state of an entity, replacing any earlier one.
    pub fn save_state(&self, entity_id: &str, state: &str) -> Result<(), StoreError> {
        let record = StoredState {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            last_updated: Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_vec(&record)?;
        self.states.insert(entity_id.as_bytes(), serialized)?;
        Ok(())
    }

    /// Last recorded state for `entity_id`, if any.
    pub fn last_state(&self, entity_id: &str) -> Result<Option<StoredState>, StoreError> {
        match self.states.get(entity_id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("db", &"sled::Db")
            .field("entries", &self.states.len())
            .finish()
    }
}
