use std::sync::Arc;

use gitfuse::CatalogStore;
use gitfuse::catalog::{RefreshOptions, SchedulerOptions, run_scheduler};
use gitfuse::fs::{FsOptions, GitHubFs, Ownership};
use gitfuse::retry::RetryConfig;
use tokio::sync::watch;

use crate::MountArgs;
use crate::commands::shared::{build_client, load_etag_cache, resolve_settings, verify_token};
use crate::config::Config;
use crate::progress::LoggingReporter;

/// Handle the mount command.
///
/// Runs until Ctrl+C or until GitHub rejects the token, then unmounts.
pub(crate) async fn handle_mount(
    args: MountArgs,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = resolve_settings(config, &args.owners, args.update_rate)?;

    if !args.mount_point.is_dir() {
        return Err(format!(
            "Mount point {} does not exist or is not a directory",
            args.mount_point.display()
        )
        .into());
    }

    let cache = load_etag_cache(config);
    let client = Arc::new(build_client(
        config,
        args.owners.token_file.as_deref(),
        Some(&settings),
        cache.clone(),
    )?);
    verify_token(&client).await?;

    let store = CatalogStore::new(&settings.owners);
    tracing::info!(
        owners = settings.owners.len(),
        update_rate_secs = settings.update_rate.as_secs_f64(),
        api_url = %client.api_url(),
        "Starting catalog refresh"
    );

    let scheduler = tokio::spawn(run_scheduler(
        Arc::clone(&client),
        store.clone(),
        SchedulerOptions {
            update_rate: settings.update_rate,
            refresh: RefreshOptions {
                concurrency: settings.concurrency,
                retry: RetryConfig::default(),
            },
            etag_cache: Some(cache.clone()),
        },
        shutdown,
        Some(LoggingReporter::new().into_callback()),
    ));

    let fs = Arc::new(GitHubFs::new(
        store,
        client,
        FsOptions {
            fetch_timeout: settings.fetch_timeout,
            blob_capacity: settings.blob_capacity,
            ownership: Ownership::current(),
        },
    ));

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    let session = {
        let options = gitfuse::fs::MountOptions {
            allow_other: args.allow_other || config.mount.allow_other,
            auto_unmount: !args.no_auto_unmount && config.mount.auto_unmount,
        };
        match gitfuse::fs::mount(
            fs,
            &args.mount_point,
            &options,
            tokio::runtime::Handle::current(),
        ) {
            Ok(session) => session,
            Err(e) => {
                scheduler.abort();
                return Err(format!(
                    "Failed to mount at {}: {}",
                    args.mount_point.display(),
                    e
                )
                .into());
            }
        }
    };

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        tracing::warn!("Built without FUSE support, refreshing the catalog without mounting");
        drop(fs);
    }

    // The scheduler returns on shutdown, or early if the token is rejected.
    let result = scheduler.await;

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        drop(session);
        tracing::info!(mount_point = %args.mount_point.display(), "Unmounted filesystem");
    }

    if let Err(e) = cache.save() {
        tracing::warn!("Failed to save ETag cache: {}", e);
    }

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
        Err(e) => Err(format!("Refresh task failed: {}", e).into()),
    }
}
