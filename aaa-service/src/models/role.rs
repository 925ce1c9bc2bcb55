//! Role, Permission, Action and the join tables the Authorization Engine
//! (`services::authz`) walks to resolve a decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    Global,
    Organization,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub scope: RoleScope,
    pub organization_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(
        name: String,
        scope: RoleScope,
        organization_id: Option<Uuid>,
        group_id: Option<Uuid>,
        parent_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            scope,
            organization_id,
            group_id,
            parent_id,
            version: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A "named permission" — name follows `{resource_type}_{action}` and grants
/// the action globally on that resource type, per the GLOSSARY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub resource_id: Option<Uuid>,
    pub action_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Permission {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            resource_id: None,
            action_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Builds the canonical `{resource_type}_{action}` name.
    pub fn canonical_name(resource_type: &str, action: &str) -> String {
        format!("{resource_type}_{action}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub verb: String,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(verb: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            verb,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RolePermission {
    pub fn new(role_id: Uuid, permission_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role_id,
            permission_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Fine-grained "role X can do action A on instance I of type T" table.
/// `resource_id` of `None` is stored/matched as the wildcard `*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ResourcePermission {
    pub fn new(role_id: Uuid, resource_type: String, resource_id: Option<String>, action: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            role_id,
            resource_type,
            resource_id,
            action,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn matches_resource_id(&self, requested: &str) -> bool {
        match &self.resource_id {
            None => true,
            Some(rid) if rid == "*" => true,
            Some(rid) => rid == requested,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserRole {
    pub fn new(user_id: Uuid, role_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
