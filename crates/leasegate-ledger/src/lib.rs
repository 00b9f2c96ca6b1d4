//! LeaseGate Ledger Store
//!
//! Transactional persistence for agent budgets, leases, usage, budget
//! requests and sealed provider credentials, on SQLite through SQLx.
//!
//! # Consistency
//!
//! Every operation that touches more than one field runs as a single
//! transaction whose first statement writes the row it depends on. SQLite
//! then holds the database write lock for the rest of the transaction, so a
//! read-modify-write can never interleave with another writer. After each
//! commit, for every agent:
//!
//! ```text
//! total_allocated == total_spent + budget_remaining,  budget_remaining >= 0
//! ```
//!
//! The identity is also enforced by a `CHECK` constraint on the table.
//!
//! # Repository Pattern
//!
//! Each aggregate has its own repository, created from [`Ledger`]:
//! [`BudgetRepo`], [`LeaseRepo`], [`RequestRepo`] and [`ProviderKeyRepo`].

pub mod config;
pub mod error;
pub mod models;
pub mod repos;
pub mod retry;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::info;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use models::*;
pub use repos::*;
pub use retry::{with_retry, RetryConfig, RetryPolicy};

/// Connection pool and repository factory
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl Ledger {
    /// Open (and create if missing) the database described by `config`
    pub async fn connect(config: &LedgerConfig) -> LedgerResult<Self> {
        info!(url = %config.url_masked(), "Opening ledger database");

        let in_memory = config.is_in_memory();
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| LedgerError::Connection(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);
        if !in_memory {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // A private in-memory database lives and dies with its connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        info!(in_memory = in_memory, "Connected to ledger database");

        let ledger = Self {
            pool,
            retry: config.retry.clone(),
        };
        if config.run_migrations {
            ledger.migrate().await?;
        }
        Ok(ledger)
    }

    /// Fresh, migrated in-memory ledger
    pub async fn in_memory() -> LedgerResult<Self> {
        Self::connect(&LedgerConfig::in_memory()).await
    }

    /// Run database migrations
    pub async fn migrate(&self) -> LedgerResult<()> {
        info!("Running ledger migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create repository instances
    pub fn budgets(&self) -> BudgetRepo {
        BudgetRepo::new(self.pool.clone(), self.retry.clone())
    }

    pub fn leases(&self) -> LeaseRepo {
        LeaseRepo::new(self.pool.clone(), self.retry.clone())
    }

    pub fn requests(&self) -> RequestRepo {
        RequestRepo::new(self.pool.clone(), self.retry.clone())
    }

    pub fn provider_keys(&self) -> ProviderKeyRepo {
        ProviderKeyRepo::new(self.pool.clone())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("connections", &self.pool.size())
            .finish()
    }
}
