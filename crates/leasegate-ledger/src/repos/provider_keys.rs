//! Provider credential repository
//!
//! Secrets are stored sealed; this repository never sees plaintext.

use chrono::{DateTime, Utc};
use leasegate_types::*;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{classify, LedgerError, LedgerResult};
use crate::models::*;

/// Provider key repository
pub struct ProviderKeyRepo {
    pool: SqlitePool,
}

impl ProviderKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        key_id: &ProviderKeyId,
        provider: Provider,
        description: Option<&str>,
        sealed_secret: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<DbProviderKey> {
        let sql = format!(
            r#"
            INSERT INTO provider_keys (key_id, provider, description, sealed_secret, is_enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5)
            RETURNING {}
            "#,
            PROVIDER_KEY_COLUMNS
        );
        let key = sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(key_id.as_str())
            .bind(provider.as_str())
            .bind(description)
            .bind(sealed_secret)
            .bind(to_millis(now))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("provider key {}", key_id)))?;

        info!(key_id = %key_id, provider = %provider, "Provider key stored");
        Ok(key)
    }

    pub async fn find(&self, key_id: &ProviderKeyId) -> LedgerResult<Option<DbProviderKey>> {
        let sql = format!("SELECT {} FROM provider_keys WHERE key_id = ?1", PROVIDER_KEY_COLUMNS);
        let key = sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(key_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    /// Oldest enabled key for `provider`
    pub async fn first_enabled(&self, provider: Provider) -> LedgerResult<Option<DbProviderKey>> {
        let sql = format!(
            r#"
            SELECT {} FROM provider_keys
            WHERE provider = ?1 AND is_enabled = 1
            ORDER BY created_at, rowid
            LIMIT 1
            "#,
            PROVIDER_KEY_COLUMNS
        );
        let key = sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    /// Metadata of every stored key, oldest first
    pub async fn list(&self) -> LedgerResult<Vec<ProviderKeyInfo>> {
        let sql = format!(
            "SELECT {} FROM provider_keys ORDER BY created_at, rowid",
            PROVIDER_KEY_COLUMNS
        );
        let keys = sqlx::query_as::<_, DbProviderKey>(&sql)
            .fetch_all(&self.pool)
            .await?;

        keys.iter().map(DbProviderKey::info).collect()
    }

    pub async fn set_enabled(
        &self,
        key_id: &ProviderKeyId,
        enabled: bool,
    ) -> LedgerResult<ProviderKeyInfo> {
        let sql = format!(
            "UPDATE provider_keys SET is_enabled = ?1 WHERE key_id = ?2 RETURNING {}",
            PROVIDER_KEY_COLUMNS
        );
        let key = sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(enabled)
            .bind(key_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LedgerError::not_found("provider key", key_id))?;

        info!(key_id = %key_id, enabled = enabled, "Provider key updated");
        key.info()
    }

    pub async fn touch_last_used(&self, key_id: &ProviderKeyId, now: DateTime<Utc>) -> LedgerResult<()> {
        sqlx::query("UPDATE provider_keys SET last_used_at = ?1 WHERE key_id = ?2")
            .bind(to_millis(now))
            .bind(key_id.as_str())
            .execute(&self.pool)
            .await?;

        debug!(key_id = %key_id, "Provider key used");
        Ok(())
    }
}
