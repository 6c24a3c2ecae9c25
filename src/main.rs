use std::{future::IntoFuture, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::metadata::LevelFilter;
use tracing::{info, warn};

use custom_model::bridge::{CacheBridge, SharedResponseCache};
use custom_model::core::{status_router, LoadGate, SettingsManager, StatusState};
use custom_model::intercept::{static_router, worker_router, WorkerHandle, WorkerState};
use custom_model::models::{from_path, AssetStore, DirectoryPersistence};
use custom_model::output::ActivityLog;

fn setup_logging() {
    let filter = std::env::var("MODEL_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let settings_manager = SettingsManager::new()?;
    let settings = settings_manager.read().with_env_overrides();
    let data_dir = settings_manager.data_dir();
    info!("Model files persisted under {}", data_dir.display());

    let activity = Arc::new(ActivityLog::new());
    let shared = Arc::new(SharedResponseCache::new(settings.prefix.clone()));
    let persistence = Arc::new(DirectoryPersistence::new(&data_dir));
    let store = Arc::new(AssetStore::new(CacheBridge::new(shared.clone(), persistence)));
    store.restore().await;

    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        let source = path.clone();
        match tokio::task::spawn_blocking(move || from_path(&source))
            .await
            .context("import task failed")?
        {
            Ok(bag) => {
                let report = store.replace(bag).await;
                info!(
                    "Imported {} files from {}, {} written to the shared cache",
                    store.snapshot().len(),
                    path.display(),
                    report.written
                );
            }
            Err(error) => warn!("Could not import {}: {error}", path.display()),
        }
    }

    let worker = WorkerHandle::new();
    let gate = Arc::new(LoadGate::new(
        store.clone(),
        worker.clone(),
        activity.clone(),
        settings.worker_origin(),
    ));
    let worker_app = worker_router(WorkerState::new(shared.clone(), activity.clone()));
    let static_app = static_router(&settings.ui_dir, settings.prefix.clone()).nest(
        "/api",
        status_router(StatusState {
            store: store.clone(),
            worker: worker.clone(),
            activity: activity.clone(),
            gate,
        }),
    );

    let worker_addr = settings.worker_addr();
    let worker_listener = TcpListener::bind(&worker_addr)
        .await
        .with_context(|| format!("bind worker responder on {worker_addr}"))?;
    worker.mark_controlling();
    info!("Model file responder listening on http://{worker_addr}{}", settings.prefix);

    let static_addr = settings.static_addr();
    let static_listener = TcpListener::bind(&static_addr)
        .await
        .with_context(|| format!("bind UI server on {static_addr}"))?;
    info!(
        "Serving {} on http://{static_addr} (source: {})",
        settings.ui_dir.display(),
        settings.source.label()
    );

    for item in store.checklist() {
        let mark = if item.satisfied { "x" } else { " " };
        let optional = if item.required { "" } else { " (optional)" };
        info!("[{mark}] {}{optional}", item.label);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_server = axum::serve(worker_listener, worker_app)
        .with_graceful_shutdown(wait_for(shutdown_rx.clone()))
        .into_future();
    let static_server = axum::serve(static_listener, static_app)
        .with_graceful_shutdown(wait_for(shutdown_rx))
        .into_future();

    info!("Server ready. Press Ctrl+C to stop.");
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
    tokio::try_join!(worker_server, static_server)?;

    worker.release();
    info!("Stopped");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!("Failed to install SIGTERM handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
