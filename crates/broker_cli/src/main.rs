use std::collections::HashMap;

use anyhow::Result;
use clap::Command;
use constants::{ABOUT, BIN_NAME, NAME, VERSION};
use expanduser::expanduser;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::Resource;
use tracing::info;

mod cli;
mod config;
mod constants;
mod log;

/// Builds the log bridge. Without an API key the provider has no exporter and nothing
/// leaves the process.
fn otel_layer(
    api_key: &str,
    endpoint: &str,
    service_name: String,
) -> OpenTelemetryTracingBridge<SdkLoggerProvider, SdkLogger> {
    if api_key.trim().is_empty() {
        let provider = SdkLoggerProvider::builder().build();
        return OpenTelemetryTracingBridge::new(&provider);
    }

    let mut headers: HashMap<String, String> = HashMap::new();
    headers.insert("X-Api-Key".to_string(), api_key.to_string());
    let url = format!("{}logs", endpoint);

    let resource = Resource::builder()
        .with_attribute(opentelemetry::KeyValue::new("service.name", service_name))
        .build();

    let exporter = match LogExporter::builder()
        .with_http()
        .with_endpoint(url)
        .with_protocol(Protocol::HttpBinary)
        .with_headers(headers)
        .build()
    {
        Ok(exporter) => exporter,
        Err(error) => fatal!("Failed to create OTEL log exporter: {error}"),
    };

    let provider = SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    OpenTelemetryTracingBridge::new(&provider)
}

pub fn main() -> Result<()> {
    let about_text = format!("{} {}\n{}", NAME, VERSION, ABOUT);
    let usage_text = format!("{} <command> [options]", BIN_NAME);
    let after_help_text = format!(
        "See '{} help <command>' for more information on a command",
        BIN_NAME
    );

    let brokernode = Command::new("brokernode")
        .bin_name(BIN_NAME)
        .name(NAME)
        .version(VERSION)
        .about(about_text)
        .override_usage(usage_text)
        .after_help(after_help_text)
        .args(cli::args::common_args())
        .arg_required_else_help(true)
        .subcommands(cli::builtin())
        .subcommand_required(true);

    let matches = brokernode.get_matches();

    // The offline helpers need neither settings nor logging.
    match matches.subcommand() {
        Some(("chunks", cmd)) => return cli::chunks::exec(cmd),
        Some(("treasure", cmd)) => return cli::treasure::exec(cmd),
        _ => {}
    }

    let config_file_raw: Option<&str> = match matches.try_get_one::<String>("config") {
        Ok(config_path) => config_path.map(|s| s.as_str()),
        Err(error) => fatal!("Error while parsing config file flag: {error}"),
    };

    let expanded_path = match expanduser(config_file_raw.unwrap_or("settings.toml")) {
        Ok(path) => path,
        Err(error) => fatal!("Error while expanding config file path: {error}"),
    };
    let Some(config_file) = expanded_path.to_str() else {
        fatal!(
            "Config path is not valid UTF-8: {}",
            expanded_path.display()
        );
    };

    // CLI values take precedence over settings.toml and the environment
    let settings = match config::Settings::new(Some(config_file)) {
        Ok(s) => s,
        Err(error) => fatal!("Failed to parse settings file: {error:?}"),
    };

    let log_level = get_config_value!(matches, "log_level", String, settings.log_level);
    let otel_api_key = get_config_value!(matches, "otel_api_key", String, settings.otel_api_key);
    let otel_endpoint =
        get_config_value!(matches, "otel_endpoint", String, settings.otel_endpoint);
    let otel_service_name = get_config_value!(
        matches,
        "otel_service_name",
        String,
        settings.otel_service_name
    );

    let layer = otel_layer(otel_api_key, otel_endpoint, otel_service_name.clone());
    let _guards = log::new(log_level.as_str(), layer);
    info!("Initialised logger with log level {log_level}");
    if otel_api_key.trim().is_empty() {
        info!("No OTEL API key provided; skipping telemetry");
    }

    match matches.subcommand() {
        Some(("run", cmd)) => cli::run::exec(cmd, &settings)?,
        _ => unreachable!(),
    }

    Ok(())
}
