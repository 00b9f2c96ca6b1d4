//! Server Configuration
//!
//! Layered configuration for the LeaseGate server: `config/default`, then
//! `config/local`, then an optional `--config` file, then
//! `LEASEGATE__SECTION__KEY` environment variables, then CLI overrides
//! applied in `main`.

use anyhow::Context;
use leasegate_api::ApiConfig;
use leasegate_auth::IdentityConfig;
use leasegate_core::LeasePolicy;
use leasegate_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server binding configuration
    pub server: ServerSettings,

    /// Ledger database
    pub database: LedgerConfig,

    /// Identity claim signing
    pub identity: IdentityConfig,

    /// Credential encryption keys
    pub crypto: CryptoSettings,

    /// Lease granting policy
    pub leases: LeasePolicy,

    /// Operator credential
    pub admin: AdminSettings,

    /// HTTP layer
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// How often expired leases are reclaimed; `None` disables the sweeper
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            sweep_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl ServerSettings {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

/// Credential encryption keys
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSettings {
    /// Root key for wrapping credentials handed to agents (hex or base64)
    pub root_key: String,

    /// Root key for sealing stored provider credentials; `root_key` when empty
    pub vault_key: String,
}

impl std::fmt::Debug for CryptoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoSettings")
            .field("root_key", &"[REDACTED]")
            .field("vault_key", &"[REDACTED]")
            .finish()
    }
}

/// Operator credential settings
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Bearer token for administrative routes; empty disables them
    pub token: String,
}

impl std::fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSettings")
            .field("enabled", &!self.token.is_empty())
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        // Later sources override earlier ones
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LEASEGATE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration")
    }
}
