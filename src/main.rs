mod config;
mod routes;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::services::assets::FileAssetStore;
use crate::services::client::ConnectionConfig;
use crate::services::collector::{Collector, CollectorConfig, open_log};
use crate::services::hub::{Hub, HubConfig};
use crate::state::{AppState, AssetState};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    let (writer, reader) = open_log(&config.message_dir())
        .await
        .expect("failed to open event log");
    let (collector, collector_handle) = Collector::new(writer, reader, CollectorConfig::from_env());
    let collector_task = collector.start();

    let (hub, hub_handle) = Hub::new(collector_handle.clone(), HubConfig::from_env(config.replay_scope));
    let hub_task = tokio::spawn(hub.run());

    let message_app = routes::message_app(AppState::new(hub_handle.clone(), ConnectionConfig::from_env()));
    let asset_app = routes::asset_app(AssetState::new(Arc::new(FileAssetStore::new(config.asset_dir()))));

    let message_listener = bind(config.message_port).await;
    let asset_listener = bind(config.asset_port).await;

    let (stop_tx, stop_rx) = watch::channel(false);
    let message_server = spawn_server("message", message_listener, message_app, stop_rx.clone());
    let asset_server = spawn_server("asset", asset_listener, asset_app, stop_rx);

    info!(
        message_port = config.message_port,
        asset_port = config.asset_port,
        data_dir = %config.data_dir.display(),
        "inkhub listening"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    info!("shutdown requested");

    // PHASE: STOP ACCEPTING
    let _ = stop_tx.send(true);
    let grace = config.shutdown_grace();

    // PHASE: HUB
    // Dropping every client closes their live queues; write tasks send close frames.
    if timeout(grace, hub_handle.shutdown()).await.is_err() {
        warn!(?grace, "hub shutdown timed out");
    }
    join_within("hub", hub_task, grace).await;

    // PHASE: LISTENERS
    join_within("message server", message_server, grace).await;
    join_within("asset server", asset_server, grace).await;

    // PHASE: COLLECTOR
    if timeout(grace, collector_handle.stop()).await.is_err() {
        warn!(?grace, "collector stop timed out");
    }
    join_within("collector", collector_task, grace).await;

    info!(collector = ?collector_handle.state(), "terminated");
}

async fn bind(port: u16) -> TcpListener {
    TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind")
}

fn spawn_server(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop.wait_for(|stopped| *stopped).await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!(server = name, error = %e, "server failed");
        }
        info!(server = name, "server stopped");
    })
}

async fn join_within(name: &'static str, task: JoinHandle<()>, grace: Duration) {
    match timeout(grace, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(task = name, error = %e, "task failed"),
        Err(_) => warn!(task = name, ?grace, "task did not finish within grace period"),
    }
}
