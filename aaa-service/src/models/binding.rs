//! Generalised assignment — the `Binding` model backs the Column Resolver's
//! caveat-carried column-group grants as well as ad hoc role/permission
//! assignments that don't fit the dedicated join tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    User,
    Service,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingType {
    Role,
    Permission,
}

/// Conditions evaluated at decision time: a time window, required request
/// attributes, and/or a list of column groups this binding grants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Caveat {
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub required_attributes: HashMap<String, String>,
    #[serde(default)]
    pub column_groups: Vec<String>,
}

impl Caveat {
    pub fn is_time_valid(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if at < from {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if at > until {
                return false;
            }
        }
        true
    }

    pub fn attributes_satisfied(&self, provided: &HashMap<String, String>) -> bool {
        self.required_attributes
            .iter()
            .all(|(k, v)| provided.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub id: Uuid,
    pub subject_type: SubjectType,
    pub subject_id: Uuid,
    pub binding_type: BindingType,
    pub target_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub caveat: Option<Caveat>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Binding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subject_type: SubjectType,
        subject_id: Uuid,
        binding_type: BindingType,
        target_id: Uuid,
        resource_type: String,
        resource_id: Option<String>,
        caveat: Option<Caveat>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_type,
            subject_id,
            binding_type,
            target_id,
            resource_type,
            resource_id,
            caveat,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
