//! Binary entrypoint for the keyway lock PIN manager.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use keyway_api::background;
use keyway_api::config::ServerConfig;
use keyway_api::router::build_app_router;
use keyway_api::state::AppState;
use keyway_api::ws::WsManager;
use keyway_core::settings::{defaults, keys, parse_bool, parse_positive};
use keyway_db::repositories::SettingsRepo;
use keyway_engine::{FeedFetcher, StaticScheduleEvaluator, SyncScheduler, SyncService};
use keyway_events::EventBus;
use keyway_locks::{discovery, HaClient, HaConfig, LockWriter, ZwaveJsUiClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Guest Lock PIN Manager server.
#[derive(Debug, Parser)]
#[command(name = "keyway", version)]
struct Cli {
    /// HTTP server address.
    #[arg(long, default_value = "0.0.0.0:8099")]
    addr: String,

    /// Data directory for the SQLite database.
    #[arg(long, default_value = "/data")]
    data: String,

    /// Directory of static frontend files.
    #[arg(long, default_value = "./static")]
    r#static: String,

    /// Probe the running server's health endpoint and exit.
    #[arg(long)]
    health_check: bool,
}

/// The subset of add-on options the engine cares about.
#[derive(Debug, Default, serde::Deserialize)]
struct AddonOptions {
    #[serde(default)]
    zwave_js_ui_ws_url: String,
}

fn load_addon_options(data_dir: &str) -> AddonOptions {
    let path = format!("{}/options.json", data_dir.trim_end_matches('/'));
    std::fs::read(&path)
        .ok()
        .and_then(|data| serde_json::from_slice(&data).ok())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.health_check {
        std::process::exit(match run_health_check(&cli.addr).await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Health check failed: {e}");
                1
            }
        });
    }

    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(ServerConfig::new(
        cli.addr.clone(),
        cli.data.clone(),
        cli.r#static.clone(),
    ));
    tracing::info!(
        addr = %config.addr,
        data = %config.data_dir,
        version = env!("CARGO_PKG_VERSION"),
        "Starting keyway"
    );

    // --- Database ---
    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::error!(error = %e, dir = %config.data_dir, "Failed to create data directory");
        std::process::exit(1);
    }

    let pool = match keyway_db::create_pool(&config.database_path()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open database");
            std::process::exit(1);
        }
    };

    if let Err(e) = keyway_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run migrations");
        std::process::exit(1);
    }
    tracing::info!("Database migrations applied");

    // --- Z-Wave JS UI URL: add-on option > persisted setting > env ---
    let addon_options = load_addon_options(&config.data_dir);
    if !addon_options.zwave_js_ui_ws_url.is_empty() {
        keyway_locks::config::set_zwave_js_ui_url(&addon_options.zwave_js_ui_ws_url);
    } else if let Ok(Some(url)) = SettingsRepo::get(&pool, keys::ZWAVE_JS_UI_WS_URL).await {
        if !url.is_empty() {
            keyway_locks::config::set_zwave_js_ui_url(&url);
        }
    }

    // --- Engine components ---
    let bus = Arc::new(EventBus::default());
    let ws_manager = Arc::new(WsManager::new());
    let ha = Arc::new(HaClient::new(HaConfig::from_env()));
    let zwave = Arc::new(ZwaveJsUiClient::new());

    let battery_efficient = SettingsRepo::get_or(&pool, keys::BATTERY_EFFICIENT_MODE, "true")
        .await
        .map(|v| parse_bool(&v))
        .unwrap_or(true);
    let batch_window = if battery_efficient {
        SettingsRepo::get_or(&pool, keys::BATCH_WINDOW_SECONDS, "30")
            .await
            .map(|v| parse_positive(&v, defaults::BATCH_WINDOW_SECONDS))
            .unwrap_or(defaults::BATCH_WINDOW_SECONDS)
    } else {
        // Batching off: drain almost immediately after the first intent.
        1
    };
    let writer = LockWriter::new(
        pool.clone(),
        Arc::clone(&ha),
        Arc::clone(&zwave),
        Arc::clone(&bus),
        batch_window,
    );

    let default_interval = SettingsRepo::get_or(&pool, keys::DEFAULT_SYNC_INTERVAL_MIN, "15")
        .await
        .map(|v| parse_positive(&v, defaults::DEFAULT_SYNC_INTERVAL_MIN as u64) as i64)
        .unwrap_or(defaults::DEFAULT_SYNC_INTERVAL_MIN);

    let cancel = CancellationToken::new();

    let sync = Arc::new(SyncService::new(
        pool.clone(),
        FeedFetcher::new(),
        Arc::clone(&bus),
    ));
    let scheduler = SyncScheduler::new(
        pool.clone(),
        sync,
        default_interval,
        cancel.child_token(),
    );
    if let Err(e) = scheduler.start().await {
        tracing::error!(error = %e, "Failed to start calendar scheduler");
        std::process::exit(1);
    }

    let evaluator = StaticScheduleEvaluator::new(
        pool.clone(),
        background::intent_sink(&writer),
        Arc::clone(&bus),
    );
    if let Err(e) = evaluator.initialize().await {
        tracing::error!(error = %e, "Failed to initialise static PIN residency");
        std::process::exit(1);
    }

    let state = AppState {
        pool: pool.clone(),
        config: Arc::clone(&config),
        bus: Arc::clone(&bus),
        ws_manager: Arc::clone(&ws_manager),
        writer: Arc::clone(&writer),
        ha: Arc::clone(&ha),
        scheduler: Arc::clone(&scheduler),
        evaluator: Arc::clone(&evaluator),
    };

    let handles = background::spawn_all(&state, Arc::clone(&evaluator), &cancel);

    // Best-effort initial lock status probe.
    {
        let pool = pool.clone();
        let ha = Arc::clone(&ha);
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            if let Err(e) = discovery::refresh_lock_status(&pool, &ha, &bus).await {
                tracing::warn!(error = %e, "Initial lock status refresh failed");
            }
        });
    }

    // --- HTTP server ---
    let app = build_app_router(state);
    let listener = match tokio::net::TcpListener::bind(&config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.addr, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %config.addr, "Listening");

    let shutdown_cancel = cancel.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown_cancel.cancel();
    });

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "Server error");
    }

    // --- Graceful shutdown: stop loops, flush the writer, close up ---
    tracing::info!("Shutting down");
    scheduler.stop();
    ws_manager.shutdown_all().await;
    writer.flush_now().await;

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, futures_util::future::join_all(handles))
        .await
        .is_err()
    {
        tracing::warn!("Background loops did not stop within the grace budget");
    }

    pool.close().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Probe the health endpoint of a running instance (Docker HEALTHCHECK).
async fn run_health_check(addr: &str) -> Result<(), String> {
    let port = addr.rsplit(':').next().unwrap_or("8099");
    let url = format!("http://127.0.0.1:{port}/api/health");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("status {}", response.status()));
    }
    Ok(())
}
