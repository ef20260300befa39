use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notesync_api::{router, AppState, ServerConfig, StoreKind};
use notesync_core::RemoteStore;
use notesync_inference::{OpenAIBackend, Summarizer};
use notesync_store::{MemoryRemoteStore, PgRemoteStore, PoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file, rotated daily
    //   LOG_ANSI    - "true"/"false" override ANSI colors
    //   RUST_LOG    - env filter (default: "notesync=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "notesync_api=debug,notesync_store=info,notesync_inference=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notesync-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env()?;

    let store: Arc<dyn RemoteStore> = match config.store {
        StoreKind::Memory => {
            info!(store = "memory", "Using in-memory note store");
            Arc::new(MemoryRemoteStore::new())
        }
        StoreKind::Postgres => {
            let store = PgRemoteStore::connect(&config.database_url, PoolConfig::from_env()).await?;
            store.migrate().await?;
            info!(store = "postgres", "Connected to note store");
            Arc::new(store)
        }
    };

    let backend = OpenAIBackend::from_env()?;
    let mut summarizer = Summarizer::new(Arc::new(backend));
    if let Some(prompt) = config.summary_prompt.clone() {
        info!("Using custom summary prompt");
        summarizer = summarizer.with_system_prompt(prompt);
    }
    let state = AppState::new(summarizer, store);
    let app = router(state, config.blob_root.as_deref());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
