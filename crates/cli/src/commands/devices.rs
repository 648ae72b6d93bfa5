//! Device listing and session control commands

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{ApiClient, DeviceSummary, TransitionResponse};
use crate::output::{color_status, print_info, print_json, print_success, print_warning, OutputFormat};

/// Row for devices table
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Metrics")]
    metrics: String,
    #[tabled(rename = "Alerts")]
    alerts: usize,
    #[tabled(rename = "Errors")]
    errors: u64,
    #[tabled(rename = "Ticks")]
    ticks: u64,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            device: d.device_id.clone(),
            status: color_status(&d.status),
            metrics: d.tracked_metrics.join(", "),
            alerts: d.alert_count,
            errors: d.transient_errors,
            ticks: d.ticks,
        }
    }
}

/// List every monitored device
pub async fn list_devices(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let devices = client.devices().await?;

    match format {
        OutputFormat::Json => print_json(&devices)?,
        OutputFormat::Table => {
            if devices.is_empty() {
                print_warning("No devices are being monitored");
                return Ok(());
            }

            let rows: Vec<DeviceRow> = devices.iter().map(DeviceRow::from).collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
            println!("\nTotal: {} devices", devices.len());
        }
    }

    Ok(())
}

/// Show one device's session summary
pub async fn show_status(client: &ApiClient, device: &str, format: OutputFormat) -> Result<()> {
    let summary = client.device(device).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Device Status".bold());
            println!("{}", "=".repeat(50));
            println!("Device:            {}", summary.device_id.cyan());
            println!("Status:            {}", color_status(&summary.status));
            println!("Tracked Metrics:   {}", summary.tracked_metrics.join(", "));
            println!("Ticks:             {}", summary.ticks);
            println!("Alerts Logged:     {}", summary.alert_count);
            println!("Transient Errors:  {}", summary.transient_errors);
        }
    }

    Ok(())
}

/// Session control actions
#[derive(Debug, Clone, Copy)]
pub enum Action {
    Connect,
    Disconnect,
    Reset,
}

impl Action {
    fn past_tense(&self) -> &'static str {
        match self {
            Action::Connect => "Connected",
            Action::Disconnect => "Disconnected",
            Action::Reset => "Reset",
        }
    }
}

/// Connect, disconnect or reset a device's session
pub async fn control(client: &ApiClient, device: &str, action: Action, format: OutputFormat) -> Result<()> {
    let response = match action {
        Action::Connect => client.connect(device).await?,
        Action::Disconnect => client.disconnect(device).await?,
        Action::Reset => client.reset(device).await?,
    };

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_transition(&response, action),
    }

    Ok(())
}

fn print_transition(response: &TransitionResponse, action: Action) {
    if response.changed {
        print_success(&format!(
            "{} {} (now {})",
            action.past_tense(),
            response.device_id.cyan(),
            color_status(&response.status)
        ));
    } else {
        print_info(&format!(
            "{} is already {}",
            response.device_id.cyan(),
            color_status(&response.status)
        ));
    }
}
