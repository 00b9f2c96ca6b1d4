//! Provider credential management

use leasegate_crypto::SecretString;
use leasegate_types::*;
use std::sync::Arc;

use crate::error::{ControlError, ControlResult};
use crate::ControlContext;

/// Longest description stored with a key
const MAX_DESCRIPTION_LEN: usize = 200;

/// Stores and manages sealed provider credentials
pub struct ProviderKeyService {
    ctx: Arc<ControlContext>,
}

impl ProviderKeyService {
    pub(crate) fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Seal and store a provider credential
    pub async fn add(
        &self,
        provider: Provider,
        secret: SecretString,
        description: Option<&str>,
    ) -> ControlResult<ProviderKeyInfo> {
        if secret.expose_secret().trim().is_empty() {
            return Err(ControlError::Validation("credential must not be empty".to_string()));
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        if description.map(|d| d.chars().count() > MAX_DESCRIPTION_LEN).unwrap_or(false) {
            return Err(ControlError::Validation(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        let key_id = ProviderKeyId::new();
        let sealed = self.ctx.vault.seal(&key_id, &secret)?;
        drop(secret);

        let stored = self
            .ctx
            .ledger
            .provider_keys()
            .insert(&key_id, provider, description, &sealed, self.ctx.clock.now())
            .await?;
        Ok(stored.info()?)
    }

    pub async fn list(&self) -> ControlResult<Vec<ProviderKeyInfo>> {
        Ok(self.ctx.ledger.provider_keys().list().await?)
    }

    pub async fn set_enabled(&self, key_id: &ProviderKeyId, enabled: bool) -> ControlResult<ProviderKeyInfo> {
        Ok(self.ctx.ledger.provider_keys().set_enabled(key_id, enabled).await?)
    }

    /// First enabled key for a provider, if any
    pub async fn first_enabled_for(&self, provider: Provider) -> ControlResult<Option<ProviderKeyInfo>> {
        let key = self.ctx.ledger.provider_keys().first_enabled(provider).await?;
        Ok(key.map(|k| k.info()).transpose()?)
    }
}
