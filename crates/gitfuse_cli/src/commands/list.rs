use std::sync::Arc;

use gitfuse::CatalogStore;
use gitfuse::catalog::{CatalogSnapshot, RefreshOptions, refresh_catalog};
use gitfuse::retry::RetryConfig;
use tokio::sync::watch;

use crate::OwnerArgs;
use crate::commands::limits::{OutputFormat, print_rows};
use crate::commands::shared::{build_client, load_etag_cache, resolve_settings, verify_token};
use crate::config::Config;
use crate::progress::LoggingReporter;

/// One catalog row.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RepositoryRow {
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[tabled(rename = "Repository")]
    pub name: String,
    #[tabled(rename = "Branch")]
    pub default_branch: String,
    #[tabled(rename = "Size (KiB)")]
    pub size_kb: u64,
    #[tabled(rename = "Last Modified")]
    pub last_modified: String,
    #[tabled(rename = "Visibility")]
    pub visibility: String,
}

/// Flatten a snapshot into rows, owners in name order then repositories.
pub(crate) fn catalog_rows(snapshot: &CatalogSnapshot) -> Vec<RepositoryRow> {
    snapshot
        .owners
        .values()
        .flat_map(|catalog| catalog.repositories.iter())
        .map(|repo| RepositoryRow {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            default_branch: repo.default_branch.clone(),
            size_kb: repo.size_kb,
            last_modified: repo.last_modified.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            visibility: repo.visibility.to_string(),
        })
        .collect()
}

/// Handle the list command: run one refresh and print what would be mounted.
pub(crate) async fn handle_list(
    owners: OwnerArgs,
    output: OutputFormat,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = resolve_settings(config, &owners, None)?;
    let cache = load_etag_cache(config);
    let client = Arc::new(build_client(
        config,
        owners.token_file.as_deref(),
        Some(&settings),
        cache.clone(),
    )?);
    verify_token(&client).await?;

    let store = CatalogStore::new(&settings.owners);
    let options = RefreshOptions {
        concurrency: settings.concurrency,
        retry: RetryConfig::default(),
    };
    let callback = LoggingReporter::new().into_callback();
    let outcome = refresh_catalog(&client, &store, &options, &shutdown, Some(&callback)).await?;

    if let Err(e) = cache.save() {
        tracing::warn!("Failed to save ETag cache: {}", e);
    }

    for error in &outcome.errors {
        tracing::warn!("{}", error);
    }
    if outcome.published.is_none() {
        return Err(format!("No owner could be listed ({} failed)", outcome.failed).into());
    }

    print_rows(catalog_rows(&store.current()), output)?;
    Ok(())
}
