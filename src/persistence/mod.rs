//! The `persistence` module provides the restore-state cache.
//!
//! Entities record their last state so it can be restored when the hub
//! starts again. It uses `sled` as an embedded key-value store.

pub mod sled_store;

pub use sled_store::{StateStore, StoredState};
