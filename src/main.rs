use calm_stream::{
    build_router,
    cli::{Cli, Commands},
    switch::IDLE_TITLE,
    AppState, Broadcaster, DatasetCatalog, RelayDevice, ServerConfig, SourceSwitch,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calm_stream=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Listing datasets needs only the dataset root, not device credentials
    let start_dataset = match cli.command {
        Some(Commands::Datasets) => {
            let catalog = DatasetCatalog::scan(ServerConfig::dataset_dir_from_env());
            println!("{:<5} {:<20} {:<40}", "ID", "Category", "File");
            println!("{}", "-".repeat(65));
            for info in catalog.infos() {
                println!("{:<5} {:<20} {:<40}", info.id, info.category, info.path);
            }
            return Ok(());
        }
        Some(Commands::Serve { dataset }) => dataset,
        None => None,
    };

    // Load configuration
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            error!("Set DEVICE_ID, EMAIL and PASSWORD in the environment or a .env file");
            return Err(e.into());
        }
    };

    let catalog = Arc::new(DatasetCatalog::scan(config.dataset_dir.clone()));

    // Server mode
    info!("🚀 Starting Calm Stream v{}", VERSION);
    info!("📋 Configuration loaded:");
    info!("   Port: {}", config.port);
    info!("   Bind address: {}", config.bind_addr);
    info!("   Device: {}", config.credentials.device_id);
    info!("   Device bridge: {}", config.device_bridge_url);
    info!("   Dataset directory: {:?}", config.dataset_dir);
    info!("   Replay interval: {:?}", config.replay_interval);
    info!("📚 Found {} datasets", catalog.len());

    let hub = Broadcaster::new(catalog.grouped(), IDLE_TITLE);
    let device = Arc::new(RelayDevice::new(config.device_bridge_url.clone()));
    let switch = Arc::new(SourceSwitch::new(
        catalog,
        hub.clone(),
        device,
        config.credentials.clone(),
        config.replay_interval,
    ));

    match start_dataset {
        Some(id) => {
            let descriptor = switch.select_replay_by_id(id).await?;
            info!("▶️  Replaying {}", descriptor.relative_path);
        }
        None => {
            if let Err(e) = switch.select_live().await {
                error!("Could not start the live device: {}", e);
                return Err(e.into());
            }
            info!("🧠 Streaming calm scores from device {}", config.credentials.device_id);
        }
    }

    let state = Arc::new(AppState::new(
        hub,
        switch.clone(),
        config.session_queue_capacity,
    ));

    let public_dir = config.public_dir.is_dir().then_some(config.public_dir.as_path());
    if public_dir.is_none() {
        warn!("Static directory {:?} not found, serving API only", config.public_dir);
    }
    let app = build_router(state, public_dir);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("🎧 Listening on http://{}", addr);
    info!("📡 WebSocket endpoint: ws://{}/ws", addr);
    info!("🔑 Health endpoint: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    switch.stop().await;
    info!("Server stopped");

    Ok(())
}
