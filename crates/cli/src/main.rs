//! Vitals Monitor CLI
//!
//! A command-line tool for listing monitored devices, controlling their
//! sessions and inspecting readings and anomaly alerts.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{devices, readings};

/// Vitals Monitor CLI
#[derive(Parser)]
#[command(name = "vitals")]
#[command(author, version, about = "CLI for the Vitals Monitor daemon", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via VITALS_API_URL env var)
    #[arg(long, env = "VITALS_API_URL")]
    pub api_url: Option<String>,

    /// Output format (defaults to table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List monitored devices
    Devices,

    /// Show a device's session status
    Status {
        /// Device ID
        device: String,
    },

    /// Show current, average, min and max readings
    Stats {
        /// Device ID
        device: String,

        /// Only this metric (e.g. heart_rate, spo2)
        #[arg(long, short)]
        metric: Option<String>,
    },

    /// Show the most recent anomaly alerts, newest first
    Alerts {
        /// Device ID
        device: String,

        /// Maximum number of alerts to show
        #[arg(long, short, default_value_t = 5)]
        limit: usize,
    },

    /// Start sampling a device
    Connect {
        /// Device ID
        device: String,
    },

    /// Stop sampling a device, keeping its readings
    Disconnect {
        /// Device ID
        device: String,
    },

    /// Clear a device's readings, alerts and error counts
    Reset {
        /// Device ID
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.resolve_format(cli.format)?;

    // Initialize client
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    // Execute command
    match cli.command {
        Commands::Devices => devices::list_devices(&client, format).await?,
        Commands::Status { device } => devices::show_status(&client, &device, format).await?,
        Commands::Stats { device, metric } => {
            readings::show_stats(&client, &device, metric, format).await?;
        }
        Commands::Alerts { device, limit } => {
            readings::show_alerts(&client, &device, limit, format).await?;
        }
        Commands::Connect { device } => {
            devices::control(&client, &device, devices::Action::Connect, format).await?;
        }
        Commands::Disconnect { device } => {
            devices::control(&client, &device, devices::Action::Disconnect, format).await?;
        }
        Commands::Reset { device } => {
            devices::control(&client, &device, devices::Action::Reset, format).await?;
        }
    }

    Ok(())
}
