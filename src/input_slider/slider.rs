use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::input_slider::config::{SliderConfig, parse_config};
use crate::input_slider::{
    ATTR_ENTITY_ID, ATTR_ICON, ATTR_MAX, ATTR_MIN, ATTR_STEP, ATTR_UNIT_OF_MEASUREMENT,
    ATTR_VALUE, DOMAIN,
};
use crate::persistence::StateStore;
use crate::utils::error::SliderError;

#[derive(Debug, Clone, PartialEq)]
pub struct InputSlider {
    entity_id: String,
    config: SliderConfig,
    value: f64,
}

impl InputSlider {
    pub fn new(object_id: &str, config: SliderConfig) -> Self {
        let value = config.initial_value();
        Self {
            entity_id: format!("{DOMAIN}.{object_id}"),
            config,
            value,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn state(&self) -> String {
        self.value.to_string()
    }

    pub fn icon(&self) -> Option<&str> {
        self.config.icon.as_deref()
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.config.unit_of_measurement.as_deref()
    }

    pub fn state_attributes(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert(ATTR_MIN.to_string(), self.config.min.into());
        data.insert(ATTR_MAX.to_string(), self.config.max.into());
        data.insert(ATTR_STEP.to_string(), self.config.step.into());
        if let Some(icon) = &self.config.icon {
            data.insert(ATTR_ICON.to_string(), icon.clone().into());
        }
        if let Some(unit) = &self.config.unit_of_measurement {
            data.insert(ATTR_UNIT_OF_MEASUREMENT.to_string(), unit.clone().into());
        }
        data
    }

    /// Adopt a restored state when it lies strictly inside the range.
    fn restore(&mut self, stored: &str) -> bool {
        match stored.trim().parse::<f64>() {
            Ok(value) if value > self.config.min && value < self.config.max => {
                self.value = value;
                true
            }
            _ => false,
        }
    }

    fn in_range(&self, value: f64) -> bool {
        value >= self.config.min && value <= self.config.max
    }
}

/// Every configured slider plus the store accepted values are persisted to.
#[derive(Debug)]
pub struct InputSliders {
    sliders: BTreeMap<String, InputSlider>,
    store: Option<StateStore>,
}

impl InputSliders {
    /// Validate `config` and create the sliders, restoring earlier states
    /// from `store` when one is given.
    pub fn setup(config: Option<&Value>, store: Option<StateStore>) -> Result<Self, SliderError> {
        let configs = parse_config(config)?;

        let mut sliders = BTreeMap::new();
        for (object_id, slider_config) in configs {
            let mut slider = InputSlider::new(&object_id, slider_config);
            if let Some(store) = &store {
                restore_from(store, &mut slider);
            }
            sliders.insert(slider.entity_id.clone(), slider);
        }

        debug!(count = sliders.len(), "Input sliders set up");
        Ok(Self { sliders, store })
    }

    pub fn get(&self, entity_id: &str) -> Option<&InputSlider> {
        self.sliders.get(entity_id)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.sliders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sliders.is_empty()
    }

    /// Set the value of one slider. Values outside its range are logged and
    /// ignored.
    pub fn select_value(&mut self, entity_id: &str, value: &Value) -> Result<(), SliderError> {
        let num = coerce_value(value)?;
        let slider = self
            .sliders
            .get_mut(entity_id)
            .ok_or_else(|| SliderError::UnknownEntity(entity_id.to_string()))?;

        if !slider.in_range(num) {
            warn!(
                entity_id,
                "Invalid value: {num} (range {} - {})",
                slider.config.min,
                slider.config.max
            );
            return Ok(());
        }

        slider.value = num;
        if let Some(store) = &self.store {
            store.save_state(entity_id, &slider.state())?;
        }
        Ok(())
    }

    /// Handle the `select_value` service: `entity_id` (one id or a list) and `value`.
    pub fn select_value_service(&mut self, data: &Value) -> Result<(), SliderError> {
        let value = data
            .get(ATTR_VALUE)
            .ok_or_else(|| SliderError::InvalidValue(format!("missing '{ATTR_VALUE}'")))?;

        let entity_ids: Vec<String> = match data.get(ATTR_ENTITY_ID) {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(ids)) => ids
                .iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect(),
            _ => self.sliders.keys().cloned().collect(),
        };

        for entity_id in entity_ids {
            self.select_value(&entity_id, value)?;
        }
        Ok(())
    }
}

fn restore_from(store: &StateStore, slider: &mut InputSlider) {
    match store.last_state(&slider.entity_id) {
        Ok(Some(stored)) => {
            if slider.restore(&stored.state) {
                debug!(entity_id = %slider.entity_id, state = %stored.state, "Restored state");
            } else {
                debug!(
                    entity_id = %slider.entity_id,
                    state = %stored.state,
                    "Restored state out of range, using initial value"
                );
            }
        }
        Ok(None) => {}
        Err(e) => warn!(entity_id = %slider.entity_id, error = %e, "Unable to read restore state"),
    }
}

fn coerce_value(value: &Value) -> Result<f64, SliderError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| SliderError::InvalidValue(value.to_string()))
}
