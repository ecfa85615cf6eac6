mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    HubSettings, LogSettings, PartialSettings, ServerSettings, Settings, SnapshotBackend,
    SnapshotSettings,
};

/// Default configuration file, without extension.
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Prefix of the environment variables overriding file settings, e.g.
/// `BOARDHUB_SERVER__PORT=9000` or `BOARDHUB_HUB__MAILBOX_CAPACITY=8`.
pub const ENV_PREFIX: &str = "BOARDHUB";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional, any format `config`
/// understands) with environment overrides, merged over the defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;
