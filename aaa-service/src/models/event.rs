//! The hash-chained, append-only Event stream (`services::event_chain`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BindingCreated,
    BindingUpdated,
    BindingDeleted,
    BindingRolledBack,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    RoleAssignedToGroup,
    RoleRemovedFromGroup,
    GroupCreated,
    GroupUpdated,
    GroupDeleted,
    UserGroupMembershipChanged,
    OrganizationCreated,
    OrganizationUpdated,
    OrganizationDeleted,
    OrganizationHierarchyChanged,
    ResourceCreated,
    ResourceUpdated,
    ResourceDeleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BindingCreated => "binding_created",
            EventKind::BindingUpdated => "binding_updated",
            EventKind::BindingDeleted => "binding_deleted",
            EventKind::BindingRolledBack => "binding_rolled_back",
            EventKind::RoleCreated => "role_created",
            EventKind::RoleUpdated => "role_updated",
            EventKind::RoleDeleted => "role_deleted",
            EventKind::RoleAssignedToGroup => "role_assigned_to_group",
            EventKind::RoleRemovedFromGroup => "role_removed_from_group",
            EventKind::GroupCreated => "group_created",
            EventKind::GroupUpdated => "group_updated",
            EventKind::GroupDeleted => "group_deleted",
            EventKind::UserGroupMembershipChanged => "user_group_membership_changed",
            EventKind::OrganizationCreated => "organization_created",
            EventKind::OrganizationUpdated => "organization_updated",
            EventKind::OrganizationDeleted => "organization_deleted",
            EventKind::OrganizationHierarchyChanged => "organization_hierarchy_changed",
            EventKind::ResourceCreated => "resource_created",
            EventKind::ResourceUpdated => "resource_updated",
            EventKind::ResourceDeleted => "resource_deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Service,
    System,
}

/// One entry of the hash-linked stream. `hash` is computed over the
/// canonical serialisation of every field but itself — see
/// `services::event_chain::canonical_payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub sequence_num: i64,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub kind: EventKind,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub organization_id: Option<Uuid>,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCheckpoint {
    pub last_event_id: Uuid,
    pub last_sequence_num: i64,
    pub last_hash: String,
    /// SHA-256 digest over the concatenation of all hashes up to this
    /// sequence; a true Merkle tree is the intended upgrade (spec.md §4.4).
    pub digest: String,
    pub total_count: i64,
    pub created_at: DateTime<Utc>,
}
