//! Polybot backend entrypoint.
//!
//! Grounded on `original_source/src/main.py`'s CLI surface (`--user-id`,
//! `--manager`, `--live`, `--debug`) and on the teacher's `clap`-derive +
//! `tracing-subscriber` startup sequence, generalized from a single-binary
//! axum server into a Tenant Runtime / Supervisor dispatcher.

use clap::Parser;
use polybot_backend::error::StartupError;
use polybot_backend::models::TradingMode;
use polybot_backend::runtime::TenantRuntime;
use polybot_backend::store::log_sink::AuditLogLayer;
use polybot_backend::store::Store;
use polybot_backend::supervisor::Supervisor;
use polybot_backend::vault::Vault;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "polybot", about = "Multi-tenant prediction-market and crypto/stock arbitrage trading bot")]
struct Cli {
    /// Run a single tenant's runtime directly (legacy single-tenant mode).
    #[arg(long)]
    user_id: Option<Uuid>,

    /// Run the Supervisor, reconciling all tenants marked active in Store.
    #[arg(long)]
    manager: bool,

    /// Run in live mode. Also settable via LIVE_TRADING=true|1|yes.
    #[arg(long)]
    live: bool,

    /// Lower the log level to debug.
    #[arg(long)]
    debug: bool,
}

fn live_mode_from_env(cli_live: bool) -> bool {
    if cli_live {
        return true;
    }
    std::env::var("LIVE_TRADING")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let mode = if live_mode_from_env(cli.live) { TradingMode::Live } else { TradingMode::Paper };

    if mode.is_live() && std::env::var("POLYBOT_MASTER_KEY").is_err() {
        eprintln!("fatal: POLYBOT_MASTER_KEY is required when running in live mode");
        std::process::exit(1);
    }

    let allow_plaintext = std::env::var("ALLOW_PLAINTEXT_SECRETS")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);
    let vault = Arc::new(Vault::from_env(allow_plaintext));

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("SUPABASE_URL"))
        .unwrap_or_else(|_| "postgres://localhost/polybot".to_string());

    let store = match Store::connect(&database_url, vault).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fatal: could not connect to store: {e}");
            std::process::exit(1);
        }
    };

    let audit_layer = AuditLogLayer::spawn(store.raw_pool(), None, Duration::from_secs(5));
    init_tracing(cli.debug, audit_layer);

    let result = if cli.manager {
        run_supervisor(store, mode).await;
        Ok(())
    } else {
        match cli.user_id {
            Some(user_id) => run_single_tenant(store, user_id, mode).await,
            None => {
                tracing::error!("either --user-id <uuid> or --manager is required");
                Err(StartupError::MissingCredentials("--user-id or --manager".to_string()))
            }
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool, audit_layer: AuditLogLayer) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(audit_layer)
        .init();
}

async fn run_supervisor(store: Store, mode: TradingMode) {
    let supervisor = Supervisor::new(store, mode);
    let cancel = supervisor.cancellation_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel.cancel();
    });
    supervisor.run().await;
}

/// Legacy single-tenant entrypoint: run one Tenant Runtime directly until
/// ctrl-c, then shut it down gracefully. Runtime task crashes inside it are
/// isolated to their own scanner/housekeeping task and logged, never
/// terminating this process (per the taxonomy in error.rs).
async fn run_single_tenant(store: Store, tenant_id: Uuid, mode: TradingMode) -> Result<(), StartupError> {
    let cancel = CancellationToken::new();
    let runtime = TenantRuntime::start(tenant_id, store, mode, &cancel).await?;

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_cancel.cancel();
    });

    cancel.cancelled().await;
    runtime.shutdown().await;
    Ok(())
}
