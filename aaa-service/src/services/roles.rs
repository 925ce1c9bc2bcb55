//! Role & UserRole service (spec.md §4.7). Grounded on the teacher's
//! `models/capability.rs`/`services/policy.rs` CRUD-with-pre-validation
//! idiom; every mutation invalidates cache, emits audit, and appends an
//! event per spec.md's cache-coherence contract.

use std::sync::Arc;

use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{ActorType, AuditRecord, AuditStatus, EventKind, Role, RoleScope, UserRole};
use crate::ports::{CachePort, RoleRepository};
use crate::services::audit::AuditRecorder;
use crate::services::event_chain::EventChain;

pub struct RoleService {
    role_repo: Arc<dyn RoleRepository>,
    cache: Arc<dyn CachePort>,
    audit: Arc<AuditRecorder>,
    events: Arc<EventChain>,
}

impl RoleService {
    pub fn new(role_repo: Arc<dyn RoleRepository>, cache: Arc<dyn CachePort>, audit: Arc<AuditRecorder>, events: Arc<EventChain>) -> Self {
        Self {
            role_repo,
            cache,
            audit,
            events,
        }
    }

    /// Rejects a duplicate name within the same scope (invariant 2).
    pub async fn create_role(
        &self,
        name: String,
        description: Option<String>,
        scope: RoleScope,
        organization_id: Option<Uuid>,
        group_id: Option<Uuid>,
        parent_id: Option<Uuid>,
        actor_id: Option<Uuid>,
    ) -> Result<Role, AppError> {
        if self
            .role_repo
            .get_by_name_in_scope(&name, organization_id, group_id)
            .await
            .map_err(AppError::InternalError)?
            .is_some()
        {
            return Err(AppError::Conflict(anyhow::anyhow!("role name {name:?} already exists in this scope")));
        }

        let mut role = Role::new(name, scope, organization_id, group_id, parent_id);
        role.description = description;
        let created = self.role_repo.create(role).await.map_err(AppError::InternalError)?;

        self.audit
            .record(AuditRecord::new(actor_id, "role_create", "role", Some(created.id.to_string()), AuditStatus::Success, "role created"))
            .await;
        self.events
            .create_event(
                actor_id,
                actor_id.map(|_| ActorType::User).unwrap_or(ActorType::System),
                EventKind::RoleCreated,
                "role".to_string(),
                Some(created.id.to_string()),
                organization_id,
                std::collections::HashMap::new(),
            )
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        Ok(created)
    }

    /// Pre-validates: role exists, role active, role not already actively
    /// assigned to this user.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid, actor_id: Option<Uuid>) -> Result<UserRole, AppError> {
        let role = self
            .role_repo
            .get_by_id(role_id)
            .await
            .map_err(AppError::InternalError)?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("role {role_id} not found")))?;
        if !role.is_active {
            return Err(AppError::Conflict(anyhow::anyhow!("role {role_id} is not active")));
        }
        if self
            .role_repo
            .has_active_assignment(user_id, role_id)
            .await
            .map_err(AppError::InternalError)?
        {
            return Err(AppError::Conflict(anyhow::anyhow!("user {user_id} already has role {role_id} assigned")));
        }

        let assignment = self
            .role_repo
            .assign_to_user(UserRole::new(user_id, role_id))
            .await
            .map_err(AppError::InternalError)?;

        self.cache
            .delete(&format!("user_roles:{user_id}"))
            .await
            .map_err(AppError::InternalError)?;
        self.audit
            .record(AuditRecord::new(actor_id, "role_assign_role", "user_role", Some(user_id.to_string()), AuditStatus::Success, format!("assigned role {role_id}")))
            .await;
        self.events
            .create_event(
                actor_id,
                actor_id.map(|_| ActorType::User).unwrap_or(ActorType::System),
                EventKind::RoleAssignedToGroup,
                "user_role".to_string(),
                Some(user_id.to_string()),
                role.organization_id,
                std::collections::HashMap::new(),
            )
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        Ok(assignment)
    }

    /// Deactivates the join row rather than deleting it.
    pub async fn remove_role(&self, user_id: Uuid, role_id: Uuid, actor_id: Option<Uuid>) -> Result<(), AppError> {
        self.role_repo
            .remove_from_user(user_id, role_id)
            .await
            .map_err(AppError::InternalError)?;

        self.cache
            .delete(&format!("user_roles:{user_id}"))
            .await
            .map_err(AppError::InternalError)?;
        self.audit
            .record(AuditRecord::new(actor_id, "role_remove_role", "user_role", Some(user_id.to_string()), AuditStatus::Success, format!("removed role {role_id}")))
            .await;
        self.events
            .create_event(
                actor_id,
                actor_id.map(|_| ActorType::User).unwrap_or(ActorType::System),
                EventKind::RoleRemovedFromGroup,
                "user_role".to_string(),
                Some(user_id.to_string()),
                None,
                std::collections::HashMap::new(),
            )
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryAuditRepository, InMemoryCache, InMemoryEventRepository, InMemoryRoleRepository};

    async fn service() -> RoleService {
        let role_repo = Arc::new(InMemoryRoleRepository::new());
        let cache: Arc<dyn CachePort> = Arc::new(InMemoryCache::new());
        let audit = Arc::new(AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()), cache.clone(), 86_400));
        let events = Arc::new(EventChain::new(Arc::new(InMemoryEventRepository::new())).await.unwrap());
        RoleService::new(role_repo, cache, audit, events)
    }

    #[tokio::test]
    async fn create_role_rejects_duplicate_name_in_scope() {
        let service = service().await;
        service
            .create_role("billing_admin".to_string(), None, RoleScope::Global, None, None, None, None)
            .await
            .unwrap();
        let dup = service
            .create_role("billing_admin".to_string(), None, RoleScope::Global, None, None, None, None)
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn assign_role_rejects_double_assignment() {
        let service = service().await;
        let role = service
            .create_role("editor".to_string(), None, RoleScope::Global, None, None, None, None)
            .await
            .unwrap();
        let user_id = Uuid::new_v4();
        service.assign_role(user_id, role.id, None).await.unwrap();
        let dup = service.assign_role(user_id, role.id, None).await;
        assert!(dup.is_err());
    }
}
