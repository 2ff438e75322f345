use std::env;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogLevel;

/// Initialize tracing for binaries built on the binding layer.
///
/// Uses `RUST_LOG` if set, otherwise the given level. Output is pretty by
/// default and JSON when `BLUEZ_PROPS_LOG_FORMAT=json`. Logs go to stderr so
/// stdout stays clean for command output.
///
/// # Errors
/// Returns error if a global subscriber is already installed
pub fn init(level: LogLevel) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bluez_props={level},warn")));

    let format = env::var("BLUEZ_PROPS_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format.as_str() {
        "json" => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        _ => {
            registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(true)
                        .with_level(true)
                        .with_thread_names(true)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}
