//! The `input_slider` module provides numeric sliders configured by the user.
//!
//! - `config`: validation of the `input_slider` configuration section
//! - `slider`: the slider entities and the `select_value` service
//!
//! Accepted values are written to the `persistence::StateStore` and restored
//! on the next setup.

pub mod config;
pub mod slider;

pub use config::{SliderConfig, parse_config};
pub use slider::{InputSlider, InputSliders};

pub const DOMAIN: &str = "input_slider";
pub const SERVICE_SELECT_VALUE: &str = "select_value";

pub const ATTR_ENTITY_ID: &str = "entity_id";
pub const ATTR_VALUE: &str = "value";
pub const ATTR_MIN: &str = "min";
pub const ATTR_MAX: &str = "max";
pub const ATTR_STEP: &str = "step";
pub const ATTR_ICON: &str = "icon";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
