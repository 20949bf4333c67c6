use console::Term;
use tokio::sync::watch;

/// Set up the Ctrl+C handler for graceful shutdown.
///
/// The first Ctrl+C flips the returned receiver to `true`; a second one
/// exits immediately with status 130.
pub(crate) fn setup_shutdown_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            return;
        }

        let is_tty = Term::stderr().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, unmounting...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, unmounting");
        }

        // Receivers may all be gone already; nothing left to notify then.
        let _ = tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            if is_tty {
                eprintln!("Force quit!");
            }
            std::process::exit(130);
        }
    });

    rx
}
