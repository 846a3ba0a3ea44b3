//! Settings for the broker node, defined in the settings.toml file and overridable
//! with `BROKER__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Iri {
    /// Including the scheme, e.g. `http://localhost`.
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Pow {
    /// Number of worker channels. Unset sizes the pool from the CPU count.
    #[serde(default)]
    pub procs: Option<usize>,
    pub min_weight_magnitude: usize,
    pub min_depth: u64,
}

#[derive(Debug, Deserialize)]
pub struct Broker {
    pub seed: String,
    pub tag: String,
    pub db_file: String,
    pub batch_size: usize,
    pub max_side_chain_length: u64,
    pub max_retries: u32,
    pub unverified_grace_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Jobs {
    pub process_paid_sessions_secs: u64,
    pub process_unassigned_chunks_secs: u64,
    pub verify_unverified_chunks_secs: u64,
    pub confirm_complete_chunks_secs: u64,
}

#[allow(unused)]
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub version: String,
    pub log_level: String,

    #[serde(default)]
    pub otel_api_key: String,
    #[serde(default)]
    pub otel_endpoint: String,
    #[serde(default)]
    pub otel_service_name: String,

    pub iri: Iri,
    pub pow: Pow,
    pub broker: Broker,
    pub jobs: Jobs,
}

impl Settings {
    /// Load settings and create a new `Settings` instance.
    pub(crate) fn new(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let file: &str = config_file.unwrap_or("settings.toml");

        let s = Config::builder()
            .add_source(File::with_name(file))
            .add_source(
                Environment::with_prefix("BROKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

/// Macro to get a value from CLI args if present, otherwise use the settings value.
///
/// # Example
///
/// ```rust
/// get_config_value(args, "arg_name", String, settings.arg_name);
/// ```
#[macro_export]
macro_rules! get_config_value {
    ($args:expr, $arg_name:expr, $arg_type:ty, $settings:expr) => {
        match $args.try_get_one::<$arg_type>($arg_name) {
            Ok(Some(value)) => value,
            Ok(None) => &$settings,
            Err(err) => {
                tracing::warn!("Failed to load CLI config, loading default settings. Error: {err}");
                &$settings
            }
        }
    };
}
