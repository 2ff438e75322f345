//! `bluez-props` - inspect and watch BlueZ D-Bus object properties.

use std::{error::Error, process};

use bluez_props::{
    cli::{self, Cli, formatting::format_error},
    tracing_config,
};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_error(&e.to_string()));
            process::exit(2);
        }
    };
    tracing_config::init(cli.effective_log_level(&config))?;

    if let Err(e) = cli::run(cli, config).await {
        eprintln!("{}", format_error(&e.to_string()));
        process::exit(1);
    }

    Ok(())
}
