//! # hub-platforms
//!
//! `hub-platforms` is a set of integration platforms for a home automation hub,
//! built around an MQTT bridge that routes broker messages to subscribers by
//! topic filter.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `mqtt`: Topic filter matching, the topic router, reconnect backoff and the MQTT client component.
//! - `zwave`: Z-Wave door locks and their user code services.
//! - `input_slider`: User configured numeric sliders with restored state.
//! - `ring`: Ring.com doorbell and chime sensors.
//! - `config_editor`: Key-based editing of configuration files such as `groups.json`.
//! - `config`: Handles loading and managing hub configuration.
//! - `persistence`: Stores the last state of entities in an embedded `sled` database.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod config;
pub mod config_editor;
pub mod input_slider;
pub mod mqtt;
pub mod persistence;
pub mod ring;
pub mod utils;
pub mod zwave;
