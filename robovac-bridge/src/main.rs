use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use robovac_bridge::api::{self, AppState};
use robovac_bridge::config::Config;
use robovac_bridge::device::DeviceHolder;
use robovac_bridge::miio::MiioConnector;
use robovac_bridge::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing::init();

    let config = Config::from_env()?;
    let holder =
        DeviceHolder::new(Box::new(MiioConnector::new(config.robot.clone())));
    let state = AppState::new(Arc::new(holder), config.robot.token.clone());
    let app = api::router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(("0.0.0.0", config.api.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.api.port))?;
    info!(port = config.api.port, "listening");

    let shutdown = CancellationToken::new();
    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => {},
                _ = sigterm.recv() => {},
            }
            trace!("shutdown signal received");
            shutdown.cancel();
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("exiting");
    Ok(())
}
