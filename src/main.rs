use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sensor_collector::{
    api::{self, AppState},
    config::Config,
    db,
    export::Exporter,
    hardware::SysfsBus,
    location::LatestPosition,
    notify::Notifier,
    sensors::SensorRegistry,
    settings::SettingsHandle,
    store::SampleStore,
    supervisor::{Collaborators, CollectionSupervisor},
    upload::{HttpTransport, UploadCoordinator},
    wake_lock::SysfsWakeLock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; variables may also be set externally
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let store = SampleStore::new(pool.clone());
    let settings = SettingsHandle::new(config.settings.clone());
    let notifier = Notifier::new();
    let exporter = Exporter::new(&config.export_dir);
    let registry = SensorRegistry::new(pool, store.clone(), exporter.clone(), settings.clone(), notifier.clone());

    let uploader = UploadCoordinator::new(
        registry.clone(),
        store.clone(),
        settings.clone(),
        notifier.clone(),
        HttpTransport::new(&config.upload_base_url),
        config.upload_base_url.clone(),
    );

    let location = LatestPosition::new(config.location_fix);
    let supervisor = CollectionSupervisor::new(Collaborators {
        registry: registry.clone(),
        store: store.clone(),
        settings: settings.clone(),
        notifier: notifier.clone(),
        uploader: uploader.clone(),
        bus: Arc::new(SysfsBus::new(&config.iio_device_path, &config.gpio_path)),
        location: Arc::new(location.clone()),
        wake_lock: Arc::new(SysfsWakeLock::new(&config.wake_lock_path, "sensor_collector")),
    });

    let state = AppState {
        registry,
        store,
        supervisor: supervisor.clone(),
        uploader,
        settings,
        notifier,
        exporter,
        location,
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight ticks finish and flush pending uploads before exiting.
    supervisor.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
