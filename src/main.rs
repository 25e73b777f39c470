//! duetodo server binary.
//!
//! Parses configuration, installs the log subscriber, starts the notification
//! scanner, and serves the REST API until Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duetodo::api;
use duetodo::background::{LogNotifier, NotificationScanner};
use duetodo::config::Cli;
use duetodo::server::Server;
use duetodo::store::TaskStore;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.into_config()?;

    let store = Arc::new(TaskStore::new());
    let shutdown = CancellationToken::new();

    let scanner = NotificationScanner::new(Arc::clone(&store), Arc::new(LogNotifier))
        .with_period(config.scan_period)
        .spawn_with_token(shutdown.child_token());

    let router = Arc::new(api::router(Arc::clone(&store), config.api_mode));
    let server = Server::bind(&config.bind_addr)
        .await?
        .with_max_connections(config.max_connections);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                ctrl_c.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    info!(mode = ?config.api_mode, scan_period = ?config.scan_period, "starting duetodo");
    server
        .run_until(
            move |req| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown,
        )
        .await?;

    scanner.stop().await;
    info!(remaining = store.len(), "duetodo stopped");
    Ok(())
}
