mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    GateSettings, LogSettings, PartialSettings, RecoverySettings, RetrySettings,
    ServerSettings, Settings, StoreBackend, StoreSettings, TopicSettings,
};

/// Loads the configuration from `config/default` and `PCAST_`-prefixed
/// environment variables (`PCAST_SERVER__PORT=9000`)
/// and merges it over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("PCAST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("topics.catalog"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_over(Settings::default()))
}
