// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rapidex serve` command implementation.
//!
//! Wires storage, the WhatsApp backend, the connection manager, the queue
//! drainer and the HTTP gateway, then runs until SIGINT/SIGTERM.

use std::sync::Arc;

use rapidex_agent::{Deliverer, QueueDrainer, install_signal_handler};
use rapidex_config::model::RapidexConfig;
use rapidex_core::{PluginAdapter, QueueStore, RapidexError};
use rapidex_gateway::{GatewayState, start_server};
use rapidex_session::{ConnectionManager, ManagerSettings};
use rapidex_storage::SqliteStorage;
use rapidex_whatsapp::EvolutionConnector;
use tracing::{error, info, warn};

/// Runs the `rapidex serve` command.
pub async fn run_serve(config: RapidexConfig) -> Result<(), RapidexError> {
    init_tracing(&config.service.log_level);

    info!(name = %config.service.name, "starting rapidex serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    let queue: Arc<dyn QueueStore> = storage.clone();

    let connector = Arc::new(EvolutionConnector::new(&config.whatsapp)?);
    info!(api_url = %config.whatsapp.api_url, "whatsapp backend configured");

    let manager = ConnectionManager::new(connector, ManagerSettings::from(&config.sessions));

    if config.sessions.restore_on_startup {
        match manager.restore_persisted().await {
            Ok(count) => info!(count, "restored persisted sessions"),
            Err(e) => warn!(error = %e, "session restore failed"),
        }
    }

    let cancel = install_signal_handler();

    let drainer_task = if config.queue.enabled {
        let drainer = QueueDrainer::new(
            Arc::clone(&queue),
            Deliverer::new(manager.clone()),
            &config.queue,
        );
        drainer.recover_interrupted().await?;
        let drainer_cancel = cancel.clone();
        Some(tokio::spawn(async move { drainer.run(drainer_cancel).await }))
    } else {
        info!("delivery queue disabled");
        None
    };

    let state = GatewayState::new(
        manager.clone(),
        config.queue.enabled.then(|| Arc::clone(&queue)),
    );
    let served = start_server(&config.server, state, cancel.clone()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped with error");
    }

    // The server may have failed on its own; stop everything else too.
    cancel.cancel();

    if let Some(task) = drainer_task {
        if let Err(e) = task.await {
            warn!(error = %e, "drainer task ended abnormally");
        }
    }

    manager.shutdown().await;

    if let Err(e) = storage.shutdown().await {
        warn!(error = %e, "storage shutdown failed");
    }

    info!("rapidex serve shutdown complete");
    served
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rapidex={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
