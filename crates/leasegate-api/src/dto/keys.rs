//! Provider key DTOs

use serde::Deserialize;
use validator::Validate;

#[derive(Deserialize, Validate)]
pub struct AddProviderKeyBody {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub provider: String,
    #[validate(length(min = 1, max = 4096, message = "must be 1-4096 characters"))]
    pub secret: String,
    #[serde(default)]
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub description: Option<String>,
}

impl std::fmt::Debug for AddProviderKeyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddProviderKeyBody")
            .field("provider", &self.provider)
            .field("secret", &"[REDACTED]")
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetKeyEnabledBody {
    pub enabled: bool,
}
