//! LeaseGate Server
//!
//! Budget control plane for LLM-calling agents: hands out encrypted provider
//! credentials under budget leases and reconciles reported spend.
//!
//! # Features
//!
//! - Identity-claim handshake with per-lease budget reservation
//! - Usage reporting, lease return, operator refresh and revocation
//! - Budget increase requests with operator approval
//! - Background reclamation of expired leases
//! - Graceful shutdown handling
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! leasegate-server --dev-mode
//!
//! # Start with custom config
//! leasegate-server --config /path/to/config.toml
//!
//! # Start with environment overrides
//! LEASEGATE__SERVER__PORT=8080 leasegate-server
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leasegate_api::{create_router, AppState};
use leasegate_auth::{AdminGuard, IdentityVerifier};
use leasegate_core::BudgetControl;
use leasegate_crypto::{CredentialEncryptor, CredentialVault, RootKey};
use leasegate_ledger::Ledger;

use crate::config::{LoggingConfig, ServerConfig};

/// Shortest identity secret accepted outside dev mode
const MIN_IDENTITY_SECRET_LEN: usize = 32;

/// Shortest operator token accepted outside dev mode
const MIN_ADMIN_TOKEN_LEN: usize = 16;

// =============================================================================
// CLI Arguments
// =============================================================================

/// LeaseGate Server - budget control for LLM-calling agents
#[derive(Parser, Debug)]
#[command(name = "leasegate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "LEASEGATE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "LEASEGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "LEASEGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LEASEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "LEASEGATE_LOG_FORMAT")]
    log_format: Option<String>,

    /// SQLite connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Identity claim signing secret
    #[arg(long, env = "LEASEGATE_IDENTITY_SECRET", hide_env_values = true)]
    identity_secret: Option<String>,

    /// Credential root key (hex or base64)
    #[arg(long, env = "LEASEGATE_ROOT_KEY", hide_env_values = true)]
    root_key: Option<String>,

    /// Operator bearer token
    #[arg(long, env = "LEASEGATE_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Enable development mode (ephemeral secrets when unset)
    #[arg(long, env = "LEASEGATE_DEV_MODE")]
    dev_mode: bool,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    apply_overrides(&mut server_config, &args);

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        dev_mode = args.dev_mode,
        "Starting LeaseGate server"
    );

    validate_config(&mut server_config, args.dev_mode)?;

    let ledger = init_ledger(&server_config).await?;
    let control = init_control(&server_config, ledger.clone())?;

    let admin = AdminGuard::new(&server_config.admin.token);
    if !admin.is_enabled() {
        tracing::warn!("No operator token configured; administrative routes are disabled");
    }

    let state = Arc::new(AppState::new(control.clone(), admin));
    let app = create_router(state, &server_config.api);

    let sweeper = server_config
        .server
        .sweep_interval
        .map(|every| spawn_sweeper(control, every));

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        host = %server_config.server.host,
        port = %server_config.server.port,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    ledger.close().await;

    tracing::info!("Server shutdown complete");

    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

fn apply_overrides(config: &mut ServerConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.logging.format = format.clone();
    }
    if let Some(url) = &args.database_url {
        config.database.url = url.clone();
    }
    if let Some(secret) = &args.identity_secret {
        config.identity.secret = secret.clone();
    }
    if let Some(root_key) = &args.root_key {
        config.crypto.root_key = root_key.clone();
    }
    if let Some(token) = &args.admin_token {
        config.admin.token = token.clone();
    }
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber
            .with(fmt::layer().json().with_target(true))
            .try_init()?,
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .try_init()?,
    }

    Ok(())
}

/// Validate configuration; in dev mode, fill missing secrets with ephemeral ones
fn validate_config(config: &mut ServerConfig, dev_mode: bool) -> anyhow::Result<()> {
    if config.identity.secret.len() < MIN_IDENTITY_SECRET_LEN {
        if !dev_mode {
            anyhow::bail!(
                "identity.secret must be at least {} bytes. Set LEASEGATE__IDENTITY__SECRET.",
                MIN_IDENTITY_SECRET_LEN
            );
        }
        tracing::warn!("Using an ephemeral identity secret; issued claims die with the process");
        config.identity.secret = RootKey::generate().to_hex();
    }

    if config.crypto.root_key.trim().is_empty() {
        if !dev_mode {
            anyhow::bail!("crypto.root_key must be set. Set LEASEGATE__CRYPTO__ROOT_KEY.");
        }
        tracing::warn!("Using an ephemeral root key; stored provider keys will not survive a restart");
        config.crypto.root_key = RootKey::generate().to_hex();
    }

    if !dev_mode
        && !config.admin.token.is_empty()
        && config.admin.token.len() < MIN_ADMIN_TOKEN_LEN
    {
        anyhow::bail!(
            "admin.token must be at least {} characters",
            MIN_ADMIN_TOKEN_LEN
        );
    }

    config
        .leases
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid lease policy: {}", e))?;

    if config.server.sweep_interval.map_or(false, |d| d.is_zero()) {
        anyhow::bail!("server.sweep_interval must be positive");
    }

    Ok(())
}

/// Open the ledger and run a health check
async fn init_ledger(config: &ServerConfig) -> anyhow::Result<Ledger> {
    tracing::info!("Connecting to ledger database...");

    let ledger = Ledger::connect(&config.database).await?;
    ledger
        .health_check()
        .await
        .context("ledger health check failed")?;

    let inconsistent = ledger.budgets().find_inconsistent().await?;
    if !inconsistent.is_empty() {
        tracing::error!(
            agents = inconsistent.len(),
            "Budgets failing the allocation invariant found at startup"
        );
    }

    tracing::info!("Ledger ready");
    Ok(ledger)
}

/// Wire the protocol services
fn init_control(config: &ServerConfig, ledger: Ledger) -> anyhow::Result<BudgetControl> {
    let root = RootKey::parse(&config.crypto.root_key).context("crypto.root_key")?;
    let vault_root = if config.crypto.vault_key.trim().is_empty() {
        root.clone()
    } else {
        RootKey::parse(&config.crypto.vault_key).context("crypto.vault_key")?
    };

    let encryptor = CredentialEncryptor::new(&root)?;
    let vault = CredentialVault::new(&vault_root)?;
    let verifier = IdentityVerifier::new(config.identity.clone());

    Ok(BudgetControl::new(
        ledger,
        verifier,
        encryptor,
        vault,
        config.leases.clone(),
    ))
}

/// Periodically close leases that outlived their expiry
fn spawn_sweeper(control: BudgetControl, every: Duration) -> JoinHandle<()> {
    tracing::info!(interval_ms = every.as_millis() as u64, "Starting lease sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match control.reconciler().reclaim_expired().await {
                Ok(report) if report.reclaimed > 0 => tracing::info!(
                    reclaimed = report.reclaimed,
                    returned = report.returned.value(),
                    "Reclaimed expired leases"
                ),
                Ok(_) => tracing::trace!("No expired leases"),
                Err(e) => tracing::warn!(error = %e, "Lease sweep failed"),
            }
        }
    })
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
