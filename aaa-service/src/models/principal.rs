//! Principal model — a tagged variant over User and Service identities, not
//! an inheritance hierarchy. A `Principal` carries exactly one of
//! `user_id`/`service_id`; `Principal::new` enforces the pairing so an
//! inconsistent value can never be constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    User,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub principal_type: PrincipalType,
    pub user_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub name: String,
    pub organization_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PrincipalError {
    #[error("a user principal must carry user_id and no service_id")]
    InconsistentUser,
    #[error("a service principal must carry service_id and no user_id")]
    InconsistentService,
}

impl Principal {
    pub fn new_user(
        user_id: Uuid,
        name: String,
        organization_id: Option<Uuid>,
    ) -> Result<Self, PrincipalError> {
        Ok(Self {
            id: Uuid::new_v4(),
            principal_type: PrincipalType::User,
            user_id: Some(user_id),
            service_id: None,
            name,
            organization_id,
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        })
    }

    pub fn new_service(
        service_id: Uuid,
        name: String,
        organization_id: Option<Uuid>,
    ) -> Result<Self, PrincipalError> {
        Ok(Self {
            id: Uuid::new_v4(),
            principal_type: PrincipalType::Service,
            user_id: None,
            service_id: Some(service_id),
            name,
            organization_id,
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        })
    }

    /// Checks the tag/field pairing invariant; used by the repository layer
    /// before accepting externally-constructed values (e.g. deserialized).
    pub fn validate_consistency(&self) -> Result<(), PrincipalError> {
        match self.principal_type {
            PrincipalType::User => {
                if self.user_id.is_none() || self.service_id.is_some() {
                    return Err(PrincipalError::InconsistentUser);
                }
            }
            PrincipalType::Service => {
                if self.service_id.is_none() || self.user_id.is_some() {
                    return Err(PrincipalError::InconsistentService);
                }
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub country_code: String,
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub is_validated: bool,
    pub must_change_password: bool,
    pub status: UserStatus,
    pub tokens: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        phone_number: String,
        country_code: String,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number,
            country_code,
            username: None,
            email: None,
            password_hash,
            pin_hash: None,
            is_validated: false,
            must_change_password: false,
            status: UserStatus::Active,
            tokens: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_eligible_for_login(&self) -> bool {
        self.deleted_at.is_none() && self.is_active && self.status == UserStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: Uuid,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Service {
    pub fn new(name: String, description: Option<String>, organization_id: Uuid, api_key_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            organization_id,
            api_key_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
