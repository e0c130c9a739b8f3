//! Key-value scratch space for import bookkeeping.
//!
//! The import pipeline keeps three kinds of short-lived state in Redis, all
//! scoped by workspace and explicitly deleted at finalization:
//!
//! - provider credentials (`import:<provider>:<workspace_id>`)
//! - the one-shot tag-import marker (`import:<provider>:<workspace_id>:tags`)
//! - dedup claims for short-link slots (`import:claim:<domain>:<key>`)
//!
//! None of this is the durable record of "was this link imported"; that
//! lives in the `links` table's (domain, key) uniqueness constraint. The
//! claims exist so a double-fired invocation can be detected and audited
//! without touching Postgres.

use rocket_db_pools::deadpool_redis::{redis::AsyncCommands, Pool, PoolError};
use thiserror::Error;

use crate::import::ProviderKind;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("kv command error: {0}")]
    Command(#[from] rocket_db_pools::deadpool_redis::redis::RedisError),
}

/// Thin facade over the shared Redis pool.
#[derive(Clone)]
pub struct KvStore {
    pool: Pool,
}

impl KvStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    /// Set only if the key does not already exist. Returns whether this call
    /// claimed the key.
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool, KvError> {
        let mut conn = self.pool.get().await?;
        let claimed: bool = conn.set_nx(key, value).await?;
        Ok(claimed)
    }

    pub async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Key for the workspace's stored provider credentials. Deleting it is also
/// how an operator cancels a running import (§ cancellation model).
pub fn credentials_key(provider: ProviderKind, workspace_id: i32) -> String {
    format!("import:{}:{}", provider.as_str(), workspace_id)
}

/// Marker set once the provider's tag taxonomy has been imported for a
/// workspace, so later link pages skip the tag pass.
pub fn tag_marker_key(provider: ProviderKind, workspace_id: i32) -> String {
    format!("import:{}:{}:tags", provider.as_str(), workspace_id)
}

/// Dedup claim for one short-link slot.
pub fn claim_key(domain: &str, key: &str) -> String {
    format!("import:claim:{}:{}", domain, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_provider_and_workspace() {
        assert_eq!(credentials_key(ProviderKind::Bitly, 42), "import:bitly:42");
        assert_eq!(
            tag_marker_key(ProviderKind::Rebrandly, 7),
            "import:rebrandly:7:tags"
        );
        assert_eq!(claim_key("d.co", "abc"), "import:claim:d.co:abc");
    }
}
