//! Audit record — the general-purpose, non-chained audit trail emitted by
//! `services::audit::AuditRecorder`. The tamper-evident stream lives in
//! `models::event`; this model is append-only but not hash-linked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
    pub message: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: HashMap<String, Value>,
}

impl AuditRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Option<Uuid>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: Option<String>,
        status: AuditStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id,
            status,
            message: message.into(),
            ip: None,
            user_agent: None,
            timestamp: Utc::now(),
            detail: HashMap::new(),
        }
    }
}
