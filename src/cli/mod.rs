//! Command-line interface for inspecting BlueZ objects.
//!
//! Reads and writes single properties, follows change notifications of an
//! object and lists the daemon's object hierarchy. Every command goes
//! through the same transport, bridge and object-manager code the bindings
//! use.

mod commands;
pub mod formatting;
mod value;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use value::parse_value_like;

use crate::{
    Result,
    config::{BluezConfig, LogLevel},
};

/// Top-level arguments of `bluez-props`.
#[derive(Debug, Parser)]
#[command(name = "bluez-props")]
#[command(about = "Inspect and watch BlueZ D-Bus object properties")]
pub struct Cli {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Talk to the session bus regardless of configuration
    #[arg(long, global = true)]
    pub session: bool,

    /// Override the configured log level
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of `bluez-props`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print one property, or every property of an interface
    Get {
        /// Object path, e.g. /org/bluez/hci0/dev_00_11_22_33_44_55
        path: String,
        /// Interface name, e.g. org.bluez.Battery1
        interface: String,
        /// Property name; all properties when omitted
        name: Option<String>,
    },

    /// Write a property, parsing the value as the property's current type
    Set {
        /// Object path
        path: String,
        /// Interface name
        interface: String,
        /// Property name
        name: String,
        /// New value
        value: String,
    },

    /// Print property changes of an object until interrupted
    Watch {
        /// Object path
        path: String,
        /// Interface name
        interface: String,
    },

    /// List objects exported by the daemon
    Objects {
        /// Keep running and print objects as they come and go
        #[arg(short, long)]
        follow: bool,
    },

    /// Print the JSON schema of the configuration file
    ConfigSchema,
}

impl Cli {
    /// Loads the configuration named by `--config`, or the default one.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_config(&self) -> Result<BluezConfig> {
        match &self.config {
            Some(path) => BluezConfig::load(path),
            None => BluezConfig::load_default(),
        }
    }

    /// Log level to initialise tracing with.
    pub fn effective_log_level(&self, config: &BluezConfig) -> LogLevel {
        self.log_level.unwrap_or(config.log_level)
    }
}

/// Runs the parsed command.
///
/// # Errors
/// Returns the first error hit by the command
pub async fn run(cli: Cli, config: BluezConfig) -> Result<()> {
    let session = cli.session;

    match cli.command {
        Command::Get {
            path,
            interface,
            name,
        } => commands::get(&config, session, &path, &interface, name.as_deref()).await,
        Command::Set {
            path,
            interface,
            name,
            value,
        } => commands::set(&config, session, &path, &interface, &name, &value).await,
        Command::Watch { path, interface } => {
            commands::watch(&config, session, &path, &interface).await
        }
        Command::Objects { follow } => commands::objects(&config, session, follow).await,
        Command::ConfigSchema => {
            println!("{}", BluezConfig::schema_json()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests;
