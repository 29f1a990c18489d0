//! draftden - multi-seat booster draft coordinator

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use draftden_core::RoomStore;
use draftden_net::Hub;

mod config;

use config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    info!(port = config.port, db = %config.db_path, "starting draftden");

    let hub = Arc::new(Hub::new());

    let store = match RoomStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(error = %err, db = %config.db_path, "failed to open room store");
            std::process::exit(1);
        }
    };
    match store.load_rooms() {
        Ok(records) => {
            let found = records.len();
            let restored = hub.restore_rooms(records);
            info!(found, restored, "restored draft rooms");
        }
        Err(err) => {
            error!(error = %err, "failed to load persisted rooms");
            std::process::exit(1);
        }
    }
    hub.set_store(store);

    // Periodic persistence. A failed pass is retried on the next tick;
    // the store itself skips rooms that have not advanced.
    let save_hub = Arc::clone(&hub);
    let save_interval = Duration::from_secs(config.save_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(save_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match save_hub.save_to_store() {
                Ok(written) if written > 0 => {
                    tracing::debug!(written, "persisted changed rooms");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "room save failed, retrying next tick"),
            }
        }
    });

    let app = draftden_net::http::router(Arc::clone(&hub));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %addr, "listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "server error");
    }

    // Final pass so a clean shutdown loses nothing.
    if let Err(err) = hub.save_to_store() {
        warn!(error = %err, "final room save failed");
    }
    info!("shutdown complete");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}
