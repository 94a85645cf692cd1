use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::utils::error::SliderError;
use crate::utils::slug::is_slug;

fn default_step() -> f64 {
    1.0
}

/// Configuration of one slider, keyed by its object id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SliderConfig {
    pub name: Option<String>,
    pub min: f64,
    pub max: f64,
    /// Defaults to `min`.
    pub initial: Option<f64>,
    #[serde(default = "default_step")]
    pub step: f64,
    pub icon: Option<String>,
    pub unit_of_measurement: Option<String>,
}

impl SliderConfig {
    pub fn initial_value(&self) -> f64 {
        self.initial.unwrap_or(self.min)
    }

    fn validate(&self, object_id: &str) -> Result<(), SliderError> {
        if self.min >= self.max {
            return Err(SliderError::InvalidConfig(format!(
                "{object_id}: maximum ({}) is not greater than minimum ({})",
                self.max, self.min
            )));
        }
        if self.step <= 0.0 {
            return Err(SliderError::InvalidConfig(format!(
                "{object_id}: step must be positive"
            )));
        }
        let initial = self.initial_value();
        if initial < self.min || initial > self.max {
            return Err(SliderError::InvalidConfig(format!(
                "{object_id}: initial value {initial} not in range {}-{}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Validate the whole `input_slider` section.
pub fn parse_config(config: Option<&Value>) -> Result<BTreeMap<String, SliderConfig>, SliderError> {
    let Some(Value::Object(entries)) = config else {
        return Err(SliderError::InvalidConfig(
            "expected a mapping of object ids to sliders".to_string(),
        ));
    };
    if entries.is_empty() {
        return Err(SliderError::InvalidConfig("no sliders configured".to_string()));
    }

    let mut sliders = BTreeMap::new();
    for (object_id, entry) in entries {
        if !is_slug(object_id) {
            return Err(SliderError::InvalidConfig(format!(
                "invalid slug '{object_id}'"
            )));
        }
        let slider = SliderConfig::deserialize(entry)
            .map_err(|e| SliderError::InvalidConfig(format!("{object_id}: {e}")))?;
        slider.validate(object_id)?;
        sliders.insert(object_id.clone(), slider);
    }
    Ok(sliders)
}
