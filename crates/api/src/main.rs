use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use creator_api::config::{ProvisionConfig, ServerConfig};
use creator_api::router::build_router;
use creator_api::state::AppState;
use creator_cloud::{HetznerConfig, HetznerProvider, MachineProvider};
use creator_db::repositories::MachineRepo;
use creator_events::LogHub;
use creator_pipeline::{
    ConfigurationRunner, PgProvisionStore, ProvisionPipeline, ProvisionStore, ReadinessProber,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    // `--migrate` applies pending migrations and exits.
    let migrate_only = std::env::args().skip(1).any(|arg| arg == "--migrate");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = creator_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    creator_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    creator_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready, migrations applied");

    if migrate_only {
        return;
    }

    let config = ServerConfig::from_env();
    let provision_config = ProvisionConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        ansible_dir = %provision_config.ansible_dir.display(),
        playbook = %provision_config.playbook,
        "Loaded configuration",
    );

    let provider: Arc<dyn MachineProvider> =
        Arc::new(HetznerProvider::new(HetznerConfig::from_env()));

    // No run survives a restart; anything still provisioning is failed.
    let interrupted = MachineRepo::fail_interrupted(&pool)
        .await
        .expect("Failed to recover interrupted provisioning runs");
    if !interrupted.is_empty() {
        tracing::warn!(
            count = interrupted.len(),
            machine_ids = ?interrupted,
            "Marked interrupted provisioning runs as failed",
        );
    }

    let hub = Arc::new(LogHub::new());
    let store: Arc<dyn ProvisionStore> = Arc::new(PgProvisionStore::new(pool.clone()));
    let pipeline = Arc::new(ProvisionPipeline::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        ReadinessProber::default(),
        ConfigurationRunner::new(provision_config.runner_config()),
    ));
    let shutdown = CancellationToken::new();

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        hub: Arc::clone(&hub),
        store,
        provider,
        pipeline,
        shutdown: shutdown.clone(),
    };
    let app = build_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "Listening");

    let on_signal = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        wait_for_signal().await;
        // Streaming sessions hold their connections open until told to stop.
        on_signal.cancel();
    });

    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    let served = tokio::select! {
        result = server.into_future() => result,
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(drain).await;
        } => {
            tracing::warn!(drain_secs = drain.as_secs(), "Connections did not drain in time");
            Ok(())
        }
    };
    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
    }

    tracing::info!(
        streaming_machines = hub.channel_count().await,
        "Shut down; in-flight runs will be failed on next start",
    );
}

/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` emits one JSON
/// object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "creator_api=debug,creator_pipeline=debug,creator_cloud=info,tower_http=debug".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.expect("Failed to install Ctrl-C handler");
                tracing::info!("SIGINT received, shutting down");
            }
            _ = term.recv() => tracing::info!("SIGTERM received, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
        tracing::info!("Ctrl-C received, shutting down");
    }
}
