//! Token Registry
//!
//! Tracks issued access tokens in the cache so they can be revoked before
//! they expire naturally. Each token is stored under its own namespaced key
//! with the owning user id as the value.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::cache::Cache;
use crate::error::Result;

const TOKEN_NAMESPACE: &str = "jwt:token";

/// Revocation bookkeeping on top of any cache engine.
#[derive(Clone)]
pub struct TokenRegistry {
    cache: Arc<dyn Cache>,
    namespace: String,
}

impl TokenRegistry {
    /// Registry with a fresh `jwt:token:<suffix>` namespace.
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self::with_namespace(cache, format!("{}:{}", TOKEN_NAMESPACE, &suffix[..8]))
    }

    pub fn with_namespace(cache: Arc<dyn Cache>, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}:{}", self.namespace, token)
    }

    /// Records `token` as active for `ttl`, normally the token's own lifetime.
    pub async fn remember(&self, token: &str, user_id: &str, ttl: Duration) -> Result<()> {
        self.cache
            .set(&self.token_key(token), user_id.into(), ttl)
            .await?;
        debug!("Registered token for user '{}'", user_id);
        Ok(())
    }

    pub async fn is_active(&self, token: &str) -> Result<bool> {
        self.cache.exists(&self.token_key(token)).await
    }

    /// User id the token was issued to, when it is still active.
    pub async fn owner(&self, token: &str) -> Result<String> {
        self.cache.get(&self.token_key(token)).await
    }

    pub async fn revoke(&self, token: &str) -> Result<()> {
        self.cache.delete(&self.token_key(token)).await?;
        debug!("Revoked token");
        Ok(())
    }
}
