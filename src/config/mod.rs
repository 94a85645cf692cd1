mod settings;

use config::{Config, ConfigError, Environment, File};
use tracing::debug;

use settings::PartialSettings;

pub use settings::{
    BirthMessage, LoggingSettings, MqttSettings, PersistenceSettings, Settings,
};

/// Loads the configuration from `.env`, the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing the MQTT, persistence and logging configurations
pub fn load_config() -> Result<Settings, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded environment file");
    }

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("HUB").separator("__"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
