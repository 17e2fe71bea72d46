mod sim;

use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanctl_core::{DeviceConfig, FanDriver, FileStore, LogIndicator, SpeedSensor, VirtualChannel};
use fanctl_server::{event_channel, FanController, Peripherals};
use fanctl_web::{create_router, WebState};

use crate::sim::SimulatedRadio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,fanctl=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Fan controller starting...");

    // Configuration
    let config = match std::env::var("FANCTL_CONFIG") {
        Ok(path) => DeviceConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        Err(_) => {
            tracing::info!("FANCTL_CONFIG not set, using defaults");
            DeviceConfig::default()
        }
    };

    let store = Arc::new(
        FileStore::open(&config.store_path)
            .with_context(|| format!("opening store {}", config.store_path.display()))?,
    );

    // Simulated hardware
    let (event_tx, event_rx) = event_channel();
    let channel = VirtualChannel::new(config.max_duty);
    let duty = channel.duty_handle();
    let sensor = Arc::new(SpeedSensor::new(
        config.sample_window(),
        config.pulses_per_revolution,
    ));
    let radio = SimulatedRadio::new(event_tx.clone(), sim::neighbourhood(&config))?;

    let peripherals = Peripherals {
        store,
        fan: Arc::new(FanDriver::new(channel)),
        indicator: Arc::new(LogIndicator::new()),
        sensor: sensor.clone(),
        radio,
    };
    let controller = FanController::new(config.clone(), peripherals, (event_tx, event_rx));
    let running = controller.start()?;

    let tach_handle = sim::spawn_tachometer(sensor, duty, config.max_duty);

    // HTTP server
    let app = create_router(WebState::new(
        running.api().clone(),
        config.web_root.clone(),
    ))
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    tracing::info!("HTTP server listening on {}", config.http_addr);

    let http_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    tracing::info!("Fan controller ready!");
    tracing::info!("   Web UI:  http://{}/", config.http_addr);
    tracing::info!("   Speed:   curl http://{}/api/fan/speed", config.http_addr);
    tracing::info!("   Wi-Fi:   curl http://{}/api/wifi/status", config.http_addr);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        result = http_handle => {
            match result {
                Ok(Err(e)) => tracing::error!("HTTP server error: {}", e),
                _ => tracing::warn!("HTTP server stopped"),
            }
        }
        _ = tach_handle => {
            tracing::warn!("Tachometer simulation stopped");
        }
    }

    running.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
