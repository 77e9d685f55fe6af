mod codec;
mod compiler;
mod config;
mod db;
mod dhcp;
mod handlers;
mod models;
mod router;
mod tree;
mod utils;

use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compiler::{DocsisEncoder, ParameterCompiler};
use config::Config;
use db::Store;
use dhcp::DhcpConfigWriter;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub compiler: ParameterCompiler,
    pub dhcp: DhcpConfigWriter,
    /// Serializes tree imports so concurrent uploads cannot claim the same id block
    pub import_lock: tokio::sync::Mutex<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env next to the binary
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prov_base=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting ProvBase Server");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Provisioning Dir: {}", cfg.prov_dir);
    tracing::info!("Encoder: {} (timeout {}s)", cfg.encoder_bin, cfg.encoder_timeout.as_secs());
    tracing::info!("Listen: {}", cfg.listen_addr);

    // Initialize database
    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    let encoder = Arc::new(DocsisEncoder::new(cfg.encoder_bin.clone(), cfg.encoder_timeout));
    let compiler = ParameterCompiler::new(&cfg.prov_dir, &cfg.encoder_keyfile, encoder);
    let dhcp = DhcpConfigWriter::new(&cfg.dhcp_conf_dir, &cfg.dhcpd_conf);

    // Create app state
    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        compiler,
        dhcp,
        import_lock: tokio::sync::Mutex::new(()),
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("ProvBase listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("ProvBase shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
