//! Consistency Manager (spec.md §5) — chooses an isolation tier per
//! resource class and issues an opaque, wait-bounded consistency token. No
//! teacher analogue exists for this; built directly from the resource-class
//! table in spec.md §5, in the plain-struct-with-pure-methods idiom the
//! teacher uses for stateless domain services (`services::policy`).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyTier {
    Eventual,
    Bounded,
    Strict,
}

pub struct ConsistencyManager {
    wait_timeout: Duration,
}

impl ConsistencyManager {
    pub fn new(wait_timeout_ms: u64) -> Self {
        Self {
            wait_timeout: Duration::from_millis(wait_timeout_ms),
        }
    }

    /// Resource classes `organization`, `role`, `binding` default to
    /// `strict`; `user`, `group`, `permission` to `bounded`; everything
    /// else to `eventual`.
    pub fn tier_for(&self, resource_class: &str) -> ConsistencyTier {
        match resource_class {
            "organization" | "role" | "binding" => ConsistencyTier::Strict,
            "user" | "group" | "permission" => ConsistencyTier::Bounded,
            _ => ConsistencyTier::Eventual,
        }
    }

    /// Produces an opaque consistency token. The source's token is a
    /// timestamp-derived string with no write-read coordination; this
    /// retains that shape (spec.md §9) — a real backend may swap in an
    /// LSN/SCN-derived token behind the same return type.
    pub fn issue_token(&self) -> String {
        format!("consistency-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    /// Bounds how long a `strict`-tier write may wait for read-your-writes
    /// consistency. Callers race this against their own wait future and
    /// treat a timeout as "proceed, consistency is best-effort" rather than
    /// failing the write (spec.md §5).
    pub async fn bounded_wait<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::time::timeout(self.wait_timeout, fut).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_classes_map_to_the_contractual_tiers() {
        let manager = ConsistencyManager::new(5000);
        assert_eq!(manager.tier_for("organization"), ConsistencyTier::Strict);
        assert_eq!(manager.tier_for("role"), ConsistencyTier::Strict);
        assert_eq!(manager.tier_for("binding"), ConsistencyTier::Strict);
        assert_eq!(manager.tier_for("user"), ConsistencyTier::Bounded);
        assert_eq!(manager.tier_for("group"), ConsistencyTier::Bounded);
        assert_eq!(manager.tier_for("permission"), ConsistencyTier::Bounded);
        assert_eq!(manager.tier_for("audit"), ConsistencyTier::Eventual);
    }

    #[tokio::test]
    async fn bounded_wait_times_out_without_failing() {
        let manager = ConsistencyManager::new(10);
        let result = manager.bounded_wait(tokio::time::sleep(Duration::from_millis(200))).await;
        assert!(result.is_none());
    }
}
