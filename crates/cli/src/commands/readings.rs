//! Statistics and alert commands

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::client::{Alert, ApiClient, MetricStatistics};
use crate::output::{
    color_severity, format_timestamp, format_value, print_json, print_success, print_warning,
    OutputFormat,
};

/// Row for statistics table
#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Avg")]
    average: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Errors")]
    errors: u64,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&MetricStatistics> for StatsRow {
    fn from(s: &MetricStatistics) -> Self {
        Self {
            metric: s.metric.clone(),
            current: format!("{} {}", format_value(s.current), s.unit),
            average: format!("{:.1}", s.average),
            min: format_value(s.min),
            max: format_value(s.max),
            samples: s.samples,
            errors: s.transient_errors,
            updated: format_timestamp(&s.last_updated),
        }
    }
}

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&Alert> for AlertRow {
    fn from(a: &Alert) -> Self {
        Self {
            time: format_timestamp(&a.timestamp),
            severity: color_severity(&a.severity),
            metric: a.metric.clone(),
            value: format_value(a.value),
            message: a.message.clone(),
        }
    }
}

/// Show statistics for one metric or every tracked metric of a device
pub async fn show_stats(
    client: &ApiClient,
    device: &str,
    metric: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let stats = match metric {
        Some(metric) => vec![client.metric_statistics(device, &metric).await?],
        None => client.statistics(device).await?,
    };

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("{} {}", "Statistics for".bold(), device.cyan());
            println!();

            if stats.is_empty() {
                print_warning("No readings recorded yet");
                return Ok(());
            }

            let rows: Vec<StatsRow> = stats.iter().map(StatsRow::from).collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Show the most recent alerts of a device, newest first
pub async fn show_alerts(client: &ApiClient, device: &str, limit: usize, format: OutputFormat) -> Result<()> {
    let alerts = client.alerts(device, limit).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            if alerts.is_empty() {
                print_success(&format!("No anomalies recorded for {}", device.cyan()));
                return Ok(());
            }

            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            println!("{}", table);

            let critical = alerts.iter().filter(|a| a.severity == "critical").count();
            if critical > 0 {
                println!("\n{} {} critical", "!".red().bold(), critical);
            }
        }
    }

    Ok(())
}
