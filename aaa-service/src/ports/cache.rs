//! TTL key/value cache port, generalised from the teacher's single-purpose
//! `TokenBlacklist` trait (`auth-service/src/services/redis.rs`) into the
//! full Get/Set/Delete/Exists/Keys/Expire/TTL surface spec.md §6 names.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, anyhow::Error>;
    async fn set(&self, key: &str, value: Value, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error>;
    /// Glob-style pattern scan, e.g. `org:{id}:user:*`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, anyhow::Error>;
    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;
    async fn ttl(&self, key: &str) -> Result<Option<i64>, anyhow::Error>;
    async fn close(&self) -> Result<(), anyhow::Error>;
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// In-memory reference adapter, grounded on the teacher's `MockBlacklist`
/// pairing. Suitable for tests and local wiring, not production traffic.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > Utc::now()
    }

    fn glob_match(pattern: &str, candidate: &str) -> bool {
        // Only `*` is supported, matching the cache key conventions in spec.md §6.
        if !pattern.contains('*') {
            return pattern == candidate;
        }
        let mut segments = pattern.split('*').peekable();
        let mut rest = candidate;
        let mut first = true;
        while let Some(segment) = segments.next() {
            if segment.is_empty() {
                first = false;
                continue;
            }
            if first {
                if !rest.starts_with(segment) {
                    return false;
                }
                rest = &rest[segment.len()..];
            } else if segments.peek().is_none() {
                return rest.ends_with(segment);
            } else if let Some(pos) = rest.find(segment) {
                rest = &rest[pos + segment.len()..];
            } else {
                return false;
            }
            first = false;
        }
        true
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, anyhow::Error> {
        let live_value = self.entries.get(key).and_then(|entry| Self::is_live(&entry).then(|| entry.value.clone()));
        if live_value.is_some() {
            return Ok(live_value);
        }
        // Guard dropped above before this remove — holding it here would deadlock
        // against DashMap's own shard lock.
        let expired = matches!(self.entries.get(key), Some(e) if !Self::is_live(&e));
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds.max(1));
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, anyhow::Error> {
        Ok(self
            .entries
            .iter()
            .filter(|kv| Self::is_live(kv.value()) && Self::glob_match(pattern, kv.key()))
            .map(|kv| kv.key().clone())
            .collect())
    }

    async fn expire(&self, key: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds.max(1));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, anyhow::Error> {
        Ok(self.entries.get(key).and_then(|entry| {
            if Self::is_live(&entry) {
                Some((entry.expires_at - Utc::now()).num_seconds().max(0))
            } else {
                None
            }
        }))
    }

    async fn close(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.set("k", Value::String("v".into()), 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Value::String("v".into())));
    }

    #[tokio::test]
    async fn expired_entry_is_absent() {
        let cache = InMemoryCache::new();
        cache.set("k", Value::Bool(true), -1).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn glob_pattern_matches_prefix_and_suffix() {
        let cache = InMemoryCache::new();
        cache.set("org:1:user:2:groups", Value::Null, 60).await.unwrap();
        cache.set("org:1:user:3:groups", Value::Null, 60).await.unwrap();
        cache.set("org:2:user:2:groups", Value::Null, 60).await.unwrap();
        let mut matched = cache.keys("org:1:user:*").await.unwrap();
        matched.sort();
        assert_eq!(
            matched,
            vec!["org:1:user:2:groups".to_string(), "org:1:user:3:groups".to_string()]
        );
    }
}
