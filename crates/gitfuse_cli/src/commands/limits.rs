use std::path::Path;

use clap::ValueEnum;
use gitfuse::github::{GitHubRateLimits, RateLimitResource};

use crate::commands::shared::{build_client, load_etag_cache};
use crate::config::Config;

/// Output format for tabular command output.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Print a list of rows as a rounded table or pretty JSON.
pub(crate) fn print_rows<T>(items: Vec<T>, format: OutputFormat) -> Result<(), serde_json::Error>
where
    T: serde::Serialize + tabled::Tabled,
{
    match format {
        OutputFormat::Table => {
            let mut table = tabled::Table::new(items);
            table.with(tabled::settings::Style::rounded());
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }
    Ok(())
}

/// Handle the limits command.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    token_file: Option<&Path>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_client(config, token_file, None, load_etag_cache(config))?;
    let limits = client.get_rate_limits().await?;
    print_rows(rate_limits_to_display(&limits), output)?;
    Ok(())
}

/// One rate limit bucket as shown by `gitfuse limits`.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct QuotaRow {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Remaining")]
    pub remaining: usize,
    #[tabled(rename = "Limit")]
    pub limit: usize,
    #[tabled(rename = "Used")]
    pub used_percent: String,
    #[tabled(rename = "Resets")]
    pub resets: String,
}

impl QuotaRow {
    pub(crate) fn new(
        name: &str,
        resource: &RateLimitResource,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let used_percent = match resource.limit {
            0 => 0.0,
            limit => resource.used as f64 * 100.0 / limit as f64,
        };
        let reset_at = resource.reset_at();
        let left = reset_at.signed_duration_since(now);
        let resets = if left > chrono::Duration::zero() {
            format!("{} (in {})", reset_at.format("%H:%M:%S UTC"), format_duration(left))
        } else {
            "now".to_string()
        };

        Self {
            resource: name.to_string(),
            remaining: resource.remaining,
            limit: resource.limit,
            used_percent: format!("{used_percent:.1}%"),
            resets,
        }
    }
}

pub(crate) fn rate_limits_to_display(limits: &GitHubRateLimits) -> Vec<QuotaRow> {
    let now = chrono::Utc::now();
    limits
        .named()
        .into_iter()
        .map(|(name, resource)| QuotaRow::new(name, resource, now))
        .collect()
}

/// Render as `2h 5m`, `3m 20s` or `42s`, dropping zero trailing units.
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    match (h, m, s) {
        (0, 0, s) => format!("{s}s"),
        (0, m, 0) => format!("{m}m"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, 0, _) => format!("{h}h"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}
