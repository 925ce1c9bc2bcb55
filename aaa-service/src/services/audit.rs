//! Audit Recorder (spec.md §4.3). Grounded on the teacher's
//! `auth-service/src/services/security_audit.rs` dual-mode `log`/`log_async`
//! severity tiers, applied to the general-purpose `AuditRecord` model instead
//! of the teacher's fixed `SecurityEventType` set.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{AuditRecord, AuditStatus};
use crate::ports::{AuditQuery, AuditRepository, CachePort};

/// Actions whose failures are logged at `warn` rather than `info`, in
/// addition to the normal persisted record.
const SECURITY_SENSITIVE_ACTIONS: &[&str] = &[
    "login",
    "logout",
    "refresh_token",
    "pin_verify",
    "role_assign",
    "role_remove",
    "permission_grant",
    "permission_revoke",
    "api_key_issue",
    "api_key_revoke",
];

/// A subset of the security-sensitive actions whose failures are logged at
/// `error` — repeated hostile probing against these is the highest-signal
/// case for paging.
const CRITICAL_ACTIONS: &[&str] = &["role_assign", "permission_grant", "api_key_issue"];

/// Actions carrying performance metadata in `detail` (`duration_ms`,
/// `response_size`, `db_queries`) worth a dedicated structured log line.
const PERFORMANCE_SENSITIVE_ACTIONS: &[&str] = &["authorize", "bulk_authorize", "column_check"];

pub struct AuditRecorder {
    repo: Arc<dyn AuditRepository>,
    cache: Arc<dyn CachePort>,
    failed_audit_log_ttl_seconds: i64,
}

impl AuditRecorder {
    pub fn new(repo: Arc<dyn AuditRepository>, cache: Arc<dyn CachePort>, failed_audit_log_ttl_seconds: i64) -> Self {
        Self {
            repo,
            cache,
            failed_audit_log_ttl_seconds,
        }
    }

    /// Records one audit entry. Never fails the caller's flow: if
    /// persistence fails the record is cached under `failed_audit_log:{id}`
    /// (TTL configured, default 24h) for a later reconciliation sweep, and a
    /// structured log line is always emitted regardless of persistence
    /// outcome.
    pub async fn record(&self, record: AuditRecord) -> AuditRecord {
        match self.repo.create(record.clone()).await {
            Ok(persisted) => {
                self.emit_log(&persisted);
                persisted
            }
            Err(e) => {
                tracing::error!(audit_id = %record.id, error = %e, "failed to persist audit record, caching for retry");
                if let Ok(value) = serde_json::to_value(&record) {
                    let _ = self
                        .cache
                        .set(
                            &format!("failed_audit_log:{}", record.id),
                            value,
                            self.failed_audit_log_ttl_seconds,
                        )
                        .await;
                }
                self.emit_log(&record);
                record
            }
        }
    }

    fn emit_log(&self, record: &AuditRecord) {
        let is_failure = record.status == AuditStatus::Failure;
        let is_security = SECURITY_SENSITIVE_ACTIONS.contains(&record.action.as_str());
        let is_critical = CRITICAL_ACTIONS.contains(&record.action.as_str());
        let is_performance = PERFORMANCE_SENSITIVE_ACTIONS.contains(&record.action.as_str());

        if is_security && is_failure {
            if is_critical {
                tracing::error!(
                    audit_id = %record.id,
                    action = %record.action,
                    resource_type = %record.resource_type,
                    resource_id = ?record.resource_id,
                    user_id = ?record.user_id,
                    message = %record.message,
                    "critical security-sensitive action failed"
                );
            } else {
                tracing::warn!(
                    audit_id = %record.id,
                    action = %record.action,
                    resource_type = %record.resource_type,
                    resource_id = ?record.resource_id,
                    user_id = ?record.user_id,
                    message = %record.message,
                    "security-sensitive action failed"
                );
            }
        } else {
            tracing::info!(
                audit_id = %record.id,
                action = %record.action,
                resource_type = %record.resource_type,
                status = ?record.status,
                user_id = ?record.user_id,
                "audit record"
            );
        }

        if is_performance {
            let duration_ms = record.detail.get("duration_ms").and_then(Value::as_i64);
            let response_size = record.detail.get("response_size").and_then(Value::as_i64);
            let db_queries = record.detail.get("db_queries").and_then(Value::as_i64);
            tracing::info!(
                audit_id = %record.id,
                action = %record.action,
                duration_ms,
                response_size,
                db_queries,
                "performance-sensitive action completed"
            );
        }
    }

    /// Fetches a single record by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<AuditRecord>, anyhow::Error> {
        self.repo.get_by_id(id).await
    }

    /// Runs a paged query. `query.limit` is clamped to `[1, 1000]` by the
    /// repository; when `organization_ids` is `Some`, rows whose
    /// `resource_type == "organization"` resource_id falls outside the set
    /// are dropped and the mismatch is logged rather than silently included.
    pub async fn query(
        &self,
        query: AuditQuery,
        organization_scope: Option<&HashSet<String>>,
    ) -> Result<Vec<AuditRecord>, anyhow::Error> {
        let rows = self.repo.query(query).await?;
        let Some(scope) = organization_scope else {
            return Ok(rows);
        };

        let mut allowed = Vec::with_capacity(rows.len());
        for row in rows {
            if row.resource_type == "organization" {
                match &row.resource_id {
                    Some(org_id) if scope.contains(org_id) => allowed.push(row),
                    Some(org_id) => {
                        tracing::warn!(audit_id = %row.id, organization_id = %org_id, "dropped out-of-scope audit row from query result");
                    }
                    None => allowed.push(row),
                }
            } else {
                allowed.push(row);
            }
        }
        Ok(allowed)
    }

    /// Structural integrity check over the non-chained audit log: confirms
    /// every stored record still deserializes and its `timestamp` is not in
    /// the future. There is no hash chain here (see `services::event_chain`
    /// for that) — this only catches corruption, not tampering.
    pub async fn validate_integrity(&self, since: chrono::DateTime<Utc>) -> Result<Vec<Uuid>, anyhow::Error> {
        let rows = self
            .repo
            .query(AuditQuery {
                since: Some(since),
                limit: 1000,
                ..Default::default()
            })
            .await?;
        let now = Utc::now();
        Ok(rows
            .into_iter()
            .filter(|r| r.timestamp > now)
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryAuditRepository, InMemoryCache};

    fn recorder() -> AuditRecorder {
        AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()), Arc::new(InMemoryCache::new()), 86_400)
    }

    #[tokio::test]
    async fn records_a_successful_entry() {
        let recorder = recorder();
        let record = AuditRecord::new(
            Some(Uuid::new_v4()),
            "login",
            "user",
            None,
            AuditStatus::Success,
            "login succeeded",
        );
        let persisted = recorder.record(record).await;
        let fetched = recorder.get(persisted.id).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn query_respects_organization_scope() {
        let recorder = recorder();
        let org_id = Uuid::new_v4().to_string();
        let mut in_scope = AuditRecord::new(None, "role_assign", "organization", Some(org_id.clone()), AuditStatus::Success, "ok");
        in_scope.resource_id = Some(org_id.clone());
        let mut out_of_scope = AuditRecord::new(None, "role_assign", "organization", Some("other-org".to_string()), AuditStatus::Success, "ok");
        out_of_scope.resource_id = Some("other-org".to_string());

        recorder.record(in_scope).await;
        recorder.record(out_of_scope).await;

        let mut scope = HashSet::new();
        scope.insert(org_id);
        let rows = recorder
            .query(
                AuditQuery {
                    resource_type: Some("organization".to_string()),
                    limit: 100,
                    ..Default::default()
                },
                Some(&scope),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn query_clamps_oversized_limit() {
        let recorder = recorder();
        for _ in 0..3 {
            recorder
                .record(AuditRecord::new(None, "login", "user", None, AuditStatus::Success, "ok"))
                .await;
        }
        let rows = recorder
            .query(
                AuditQuery {
                    limit: 10_000,
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }
}
