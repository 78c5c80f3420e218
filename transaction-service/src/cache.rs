//! The Read-Side Cache (spec §4.6): memoizes account-transaction history
//! pages, invalidated wholesale on every Transaction Store write. Cache
//! failures degrade silently to the database — a `redis` outage must never
//! turn into a user-visible error.

use ledger_core::AccountId;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

/// Key shape: `(account_id, page, size, sort)` per spec §4.6.
#[derive(Debug, Clone)]
pub struct HistoryPageKey {
    pub account_id: AccountId,
    pub page: u32,
    pub size: u32,
    pub sort: String,
}

impl HistoryPageKey {
    fn redis_key(&self) -> String {
        format!(
            "txn-history:{}:{}:{}:{}",
            self.account_id.as_str(),
            self.page,
            self.size,
            self.sort
        )
    }
}

/// Wraps a redis connection manager with the "log and fall through" rule
/// from spec §4.6.
pub struct HistoryCache {
    client: Option<redis::Client>,
}

impl HistoryCache {
    #[must_use]
    pub fn connect(cache_url: &str) -> Self {
        match redis::Client::open(cache_url) {
            Ok(client) => Self { client: Some(client) },
            Err(err) => {
                tracing::warn!(error = %err, "failed to build redis client; history cache disabled");
                Self { client: None }
            }
        }
    }

    /// Only used by tests that want a cache that's always a pass-through.
    #[must_use]
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &HistoryPageKey) -> Option<T> {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "redis connection failed, degrading to database");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key.redis_key()).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "redis GET failed, degrading to database");
                return None;
            }
        };
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    pub async fn put<T: Serialize>(&self, key: &HistoryPageKey, value: &T) {
        let Some(client) = self.client.as_ref() else { return };
        let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
            return;
        };
        if let Ok(serialized) = serde_json::to_string(value) {
            // 60s TTL: coarse invalidation on write already keeps this
            // fresh; the TTL is just a backstop against a missed eviction.
            let _: Result<(), _> = conn.set_ex(key.redis_key(), serialized, 60).await;
        }
    }

    /// Invalidates every cached history page for every account. Spec §4.6
    /// calls this "coarse but correct": any successful write anywhere in
    /// the Transaction Store evicts the whole cache rather than tracking
    /// exactly which pages it touched.
    pub async fn invalidate_all(&self) {
        let Some(client) = self.client.as_ref() else { return };
        let Ok(mut conn) = client.get_multiplexed_async_connection().await else {
            return;
        };
        let keys: Result<Vec<String>, _> = conn.keys("txn-history:*").await;
        if let Ok(keys) = keys {
            if !keys.is_empty() {
                let _: Result<(), _> = conn.del(keys).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_always_misses_and_never_panics() {
        let cache = HistoryCache::disabled();
        let key = HistoryPageKey {
            account_id: AccountId::from("acct-1"),
            page: 0,
            size: 20,
            sort: "createdAt,desc".to_string(),
        };
        assert!(cache.get::<Vec<i32>>(&key).await.is_none());
        cache.put(&key, &vec![1, 2, 3]).await;
        cache.invalidate_all().await;
    }
}
