//! Authorization Engine (spec.md §4.1) — the decision core. No single
//! teacher file matches this directly; grounded on the teacher's
//! `models/capability.rs` role/permission shapes and `services/policy.rs`'s
//! stateless-service-over-ports idiom, generalised to the full
//! direct+group+parent-closure resolution spec.md requires.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuditRecord, AuditStatus, Permission, ResourcePermission, Role};
use crate::ports::{CachePort, GroupRepository, PermissionRepository, RoleRepository};
use crate::services::audit::AuditRecorder;
use crate::services::jwt::RoleSummary;

/// Fixed action alphabet used by `expand` — distinct from the grammar's
/// action set, which also allows `admin`.
pub const ACTION_ALPHABET: &[&str] = &["view", "edit", "delete", "manage", "create", "read", "update"];

const GRAMMAR_RESOURCE_TYPES: &[&str] = &["user", "role", "permission", "organization", "group", "system"];
const GRAMMAR_ACTIONS: &[&str] = &["view", "edit", "delete", "manage", "create", "read", "update", "admin"];

#[derive(Debug, Clone)]
pub struct AuthorizeInput {
    pub principal_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

pub struct AuthorizationEngine {
    role_repo: Arc<dyn RoleRepository>,
    group_repo: Arc<dyn GroupRepository>,
    permission_repo: Arc<dyn PermissionRepository>,
    cache: Arc<dyn CachePort>,
    audit: Arc<AuditRecorder>,
    admin_role_names: HashSet<String>,
    admin_permission_names: HashSet<String>,
    decision_ttl_seconds: i64,
}

impl AuthorizationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role_repo: Arc<dyn RoleRepository>,
        group_repo: Arc<dyn GroupRepository>,
        permission_repo: Arc<dyn PermissionRepository>,
        cache: Arc<dyn CachePort>,
        audit: Arc<AuditRecorder>,
        admin_role_names: HashSet<String>,
        admin_permission_names: HashSet<String>,
        decision_ttl_seconds: i64,
    ) -> Self {
        Self {
            role_repo,
            group_repo,
            permission_repo,
            cache,
            audit,
            admin_role_names,
            admin_permission_names,
            decision_ttl_seconds,
        }
    }

    fn cache_key(principal_id: Uuid, resource_type: &str, resource_id: Option<&str>, action: &str) -> String {
        format!(
            "perm:{principal_id}:{resource_type}:{}:{action}",
            resource_id.unwrap_or("*")
        )
    }

    /// Direct user-roles ∪ group-inherited roles, followed by each role's
    /// `parent_id` closure, de-duplicated by id (invariant 5).
    async fn effective_roles(&self, principal_id: Uuid) -> Result<Vec<Role>, anyhow::Error> {
        let mut roles: HashMap<Uuid, Role> = HashMap::new();

        for assignment in self.role_repo.active_user_roles(principal_id).await? {
            if let Some(role) = self.role_repo.get_by_id(assignment.role_id).await? {
                if role.is_active {
                    roles.insert(role.id, role);
                }
            }
        }

        for membership in self.group_repo.active_memberships_for_principal(principal_id).await? {
            for grant in self.group_repo.active_roles_for_group(membership.group_id).await? {
                if let Some(role) = self.role_repo.get_by_id(grant.role_id).await? {
                    if role.is_active {
                        roles.insert(role.id, role);
                    }
                }
            }
        }

        let mut frontier: Vec<Uuid> = roles.keys().copied().collect();
        while let Some(role_id) = frontier.pop() {
            let Some(parent_id) = roles.get(&role_id).and_then(|r| r.parent_id) else {
                continue;
            };
            if roles.contains_key(&parent_id) {
                continue;
            }
            if let Some(parent) = self.role_repo.get_by_id(parent_id).await? {
                if parent.is_active {
                    frontier.push(parent.id);
                    roles.insert(parent.id, parent);
                }
            }
        }

        Ok(roles.into_values().collect())
    }

    fn resource_permission_matches(
        rp: &ResourcePermission,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> bool {
        if !rp.is_active || rp.resource_type != resource_type || rp.action != action {
            return false;
        }
        match resource_id {
            Some(rid) => rp.matches_resource_id(rid),
            None => rp.resource_id.is_none() || rp.resource_id.as_deref() == Some("*"),
        }
    }

    async fn named_permission_for_role(&self, role_id: Uuid, expected_name: &str) -> Result<Option<Permission>, anyhow::Error> {
        for rp in self.role_repo.active_role_permissions(role_id).await? {
            if !rp.is_active {
                continue;
            }
            if let Some(permission) = self.permission_repo.get_by_id(rp.permission_id).await? {
                if permission.is_active && permission.name == expected_name {
                    return Ok(Some(permission));
                }
            }
        }
        Ok(None)
    }

    async fn admin_named_permission_for_role(&self, role_id: Uuid) -> Result<Option<Permission>, anyhow::Error> {
        for rp in self.role_repo.active_role_permissions(role_id).await? {
            if !rp.is_active {
                continue;
            }
            if let Some(permission) = self.permission_repo.get_by_id(rp.permission_id).await? {
                if permission.is_active && self.admin_permission_names.contains(&permission.name) {
                    return Ok(Some(permission));
                }
            }
        }
        Ok(None)
    }

    async fn finalize(&self, cache_key: &str, input: &AuthorizeInput, decision: &Decision) -> Result<(), anyhow::Error> {
        if let Ok(value) = serde_json::to_value(decision) {
            self.cache.set(cache_key, value, self.decision_ttl_seconds).await?;
        }
        if !decision.allowed {
            self.audit
                .record(AuditRecord::new(
                    Some(input.principal_id),
                    "access_denied",
                    input.resource_type.clone(),
                    input.resource_id.clone(),
                    AuditStatus::Failure,
                    decision.reason.clone(),
                ))
                .await;
        }
        Ok(())
    }

    /// Matches an already-resolved effective-role set against one
    /// `(resource_type, resource_id, action)` triple: per-role resource-scoped
    /// match, then named-permission match, then the admin shortcut. Shared by
    /// `authorize` (resolves roles itself) and `authorize_bulk` (resolves once
    /// for the whole batch).
    async fn decide(&self, roles: &[Role], resource_type: &str, resource_id: Option<&str>, action: &str) -> Result<Decision, anyhow::Error> {
        if roles.is_empty() {
            return Ok(Decision {
                allowed: false,
                reason: "no roles".to_string(),
            });
        }

        let expected_name = Permission::canonical_name(resource_type, action);

        for role in roles {
            let resource_perms = self.role_repo.active_resource_permissions(role.id).await?;
            if resource_perms
                .iter()
                .any(|rp| Self::resource_permission_matches(rp, action, resource_type, resource_id))
            {
                return Ok(Decision {
                    allowed: true,
                    reason: format!("resource permission on role: {}", role.name),
                });
            }

            if self.named_permission_for_role(role.id, &expected_name).await?.is_some() {
                return Ok(Decision {
                    allowed: true,
                    reason: format!("named permission {expected_name} on role: {}", role.name),
                });
            }
        }

        for role in roles {
            if self.admin_role_names.contains(&role.name) {
                return Ok(Decision {
                    allowed: true,
                    reason: format!("admin role: {}", role.name),
                });
            }
            if let Some(permission) = self.admin_named_permission_for_role(role.id).await? {
                return Ok(Decision {
                    allowed: true,
                    reason: format!("admin permission: {} on role: {}", permission.name, role.name),
                });
            }
        }

        Ok(Decision {
            allowed: false,
            reason: "no matching permissions".to_string(),
        })
    }

    /// Runs the full seven-step decision algorithm from a cold start. Hits
    /// the cache probe first, then `effective_roles`, then `decide`.
    pub async fn authorize(&self, input: AuthorizeInput) -> Result<Decision, anyhow::Error> {
        let cache_key = Self::cache_key(
            input.principal_id,
            &input.resource_type,
            input.resource_id.as_deref(),
            &input.action,
        );

        if let Some(cached) = self.cache.get(&cache_key).await? {
            if let Ok(decision) = serde_json::from_value::<Decision>(cached) {
                return Ok(decision);
            }
        }

        let roles = self.effective_roles(input.principal_id).await?;
        let decision = self.decide(&roles, &input.resource_type, input.resource_id.as_deref(), &input.action).await?;
        self.finalize(&cache_key, &input, &decision).await?;
        Ok(decision)
    }

    /// Evaluates a batch of `(resource_type, resource_id, action)` tuples,
    /// reusing one resolved effective-role set for the principal. Keyed by
    /// `"{rtype}:{rid}:{action}"`.
    pub async fn authorize_bulk(
        &self,
        principal_id: Uuid,
        checks: Vec<(String, Option<String>, String)>,
    ) -> Result<HashMap<String, Decision>, anyhow::Error> {
        let roles = self.effective_roles(principal_id).await?;
        let mut results = HashMap::with_capacity(checks.len());
        for (resource_type, resource_id, action) in checks {
            let key = format!("{resource_type}:{}:{action}", resource_id.as_deref().unwrap_or("*"));
            let cache_key = Self::cache_key(principal_id, &resource_type, resource_id.as_deref(), &action);

            let cached = match self.cache.get(&cache_key).await? {
                Some(value) => serde_json::from_value::<Decision>(value).ok(),
                None => None,
            };
            let decision = match cached {
                Some(decision) => decision,
                None => {
                    let decision = self.decide(&roles, &resource_type, resource_id.as_deref(), &action).await?;
                    let input = AuthorizeInput {
                        principal_id,
                        resource_type,
                        resource_id,
                        action,
                    };
                    self.finalize(&cache_key, &input, &decision).await?;
                    decision
                }
            };
            results.insert(key, decision);
        }
        Ok(results)
    }

    /// Resolves effective roles into the `(RoleSummary, permission names)`
    /// shape JWT claims carry (spec.md §4.2 step 3). Permission names are
    /// the union of active named permissions across every effective role.
    pub async fn roles_and_permissions(&self, principal_id: Uuid) -> Result<(Vec<RoleSummary>, Vec<String>), anyhow::Error> {
        let roles = self.effective_roles(principal_id).await?;
        let mut summaries = Vec::with_capacity(roles.len());
        let mut permissions = HashSet::new();
        for role in &roles {
            summaries.push(RoleSummary {
                id: role.id,
                name: role.name.clone(),
            });
            for rp in self.role_repo.active_role_permissions(role.id).await? {
                if !rp.is_active {
                    continue;
                }
                if let Some(permission) = self.permission_repo.get_by_id(rp.permission_id).await? {
                    if permission.is_active {
                        permissions.insert(permission.name);
                    }
                }
            }
        }
        Ok((summaries, permissions.into_iter().collect()))
    }

    /// Enumerates the fixed action alphabet for `(principal, rtype, rid)`
    /// and returns those that evaluate to allow.
    pub async fn expand(
        &self,
        principal_id: Uuid,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<Vec<String>, anyhow::Error> {
        let mut allowed = Vec::new();
        for action in ACTION_ALPHABET {
            let decision = self
                .authorize(AuthorizeInput {
                    principal_id,
                    resource_type: resource_type.to_string(),
                    resource_id: resource_id.map(str::to_string),
                    action: action.to_string(),
                })
                .await?;
            if decision.allowed {
                allowed.push(action.to_string());
            }
        }
        Ok(allowed)
    }
}

/// Validates and parses a `"{resource_type}:{action}"` permission string
/// against the grammar's fixed vocabularies.
pub fn parse_permission_string(value: &str) -> Result<(String, String), anyhow::Error> {
    let Some((resource_type, action)) = value.split_once(':') else {
        return Err(anyhow::anyhow!("permission string must be \"resource_type:action\", got {value:?}"));
    };
    if !GRAMMAR_RESOURCE_TYPES.contains(&resource_type) {
        return Err(anyhow::anyhow!("unknown resource_type {resource_type:?}"));
    }
    if !GRAMMAR_ACTIONS.contains(&action) {
        return Err(anyhow::anyhow!("unknown action {action:?}"));
    }
    Ok((resource_type.to_string(), action.to_string()))
}

#[derive(Debug, Clone)]
pub struct DerivedEndpoint {
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
}

/// Derives `(resource_type, resource_id, action)` from a request path and
/// method for middleware use: `/api/v{n}/{resource}/{id?}/…`.
pub fn derive_endpoint(path: &str, http_method: &str) -> Option<DerivedEndpoint> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    // segments[0] = "api", segments[1] = "v{n}", segments[2] = resource, segments[3]? = id
    let resource = segments.get(2)?;
    let resource_type = singularize(resource);
    let resource_id = segments.get(3).map(|s| s.to_string());
    Some(DerivedEndpoint {
        resource_type,
        resource_id,
        action: http_method.to_lowercase(),
    })
}

fn singularize(word: &str) -> String {
    word.strip_suffix('s').unwrap_or(word).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, GroupMembership, GroupRole, PrincipalKind, RoleScope};
    use crate::ports::{InMemoryAuditRepository, InMemoryCache, InMemoryGroupRepository, InMemoryPermissionRepository, InMemoryRoleRepository};

    fn admin_names() -> HashSet<String> {
        ["super_admin", "admin", "system_admin"].into_iter().map(String::from).collect()
    }

    fn admin_permission_names() -> HashSet<String> {
        ["manage", "admin", "super_admin"].into_iter().map(String::from).collect()
    }

    fn engine() -> (
        AuthorizationEngine,
        Arc<InMemoryRoleRepository>,
        Arc<InMemoryGroupRepository>,
        Arc<InMemoryPermissionRepository>,
    ) {
        let role_repo = Arc::new(InMemoryRoleRepository::new());
        let group_repo = Arc::new(InMemoryGroupRepository::new());
        let permission_repo = Arc::new(InMemoryPermissionRepository::new());
        let cache = Arc::new(InMemoryCache::new());
        let audit = Arc::new(AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()), cache.clone(), 86_400));

        let engine = AuthorizationEngine::new(
            role_repo.clone(),
            group_repo.clone(),
            permission_repo.clone(),
            cache,
            audit,
            admin_names(),
            admin_permission_names(),
            300,
        );
        (engine, role_repo, group_repo, permission_repo)
    }

    #[tokio::test]
    async fn s1_admin_wildcard() {
        let (engine, role_repo, _group_repo, _perm_repo) = engine();
        let role = Role::new("admin".to_string(), RoleScope::Global, None, None, None);
        role_repo.create(role.clone()).await.unwrap();
        let user_id = Uuid::new_v4();
        role_repo.assign_to_user(crate::models::UserRole::new(user_id, role.id)).await.unwrap();

        let decision = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "user".to_string(),
                resource_id: Some("u2".to_string()),
                action: "delete".to_string(),
            })
            .await
            .unwrap();
        assert!(decision.allowed);
        assert!(decision.reason.contains("admin role: admin"));
    }

    #[tokio::test]
    async fn s2_named_permission_exact_match_no_action_only_bypass() {
        let (engine, role_repo, _group_repo, perm_repo) = engine();
        let role = Role::new("address_reader".to_string(), RoleScope::Global, None, None, None);
        role_repo.create(role.clone()).await.unwrap();
        let permission = Permission::new("address_read".to_string());
        perm_repo.create(permission.clone()).await.unwrap();
        role_repo
            .add_role_permission(crate::models::RolePermission::new(role.id, permission.id))
            .await
            .unwrap();
        let user_id = Uuid::new_v4();
        role_repo.assign_to_user(crate::models::UserRole::new(user_id, role.id)).await.unwrap();

        let allow = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "address".to_string(),
                resource_id: Some("a1".to_string()),
                action: "read".to_string(),
            })
            .await
            .unwrap();
        assert!(allow.allowed);

        let deny = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "attachment".to_string(),
                resource_id: Some("a1".to_string()),
                action: "read".to_string(),
            })
            .await
            .unwrap();
        assert!(!deny.allowed, "action-only match must not bypass the resource_type prefix");
    }

    #[tokio::test]
    async fn s3_resource_scoped_and_wildcard() {
        let (engine, role_repo, _group_repo, _perm_repo) = engine();
        let role = Role::new("editor".to_string(), RoleScope::Global, None, None, None);
        role_repo.create(role.clone()).await.unwrap();
        role_repo
            .add_resource_permission(ResourcePermission::new(
                role.id,
                "document".to_string(),
                Some("doc42".to_string()),
                "edit".to_string(),
            ))
            .await
            .unwrap();
        let user_id = Uuid::new_v4();
        role_repo.assign_to_user(crate::models::UserRole::new(user_id, role.id)).await.unwrap();

        let hit = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "document".to_string(),
                resource_id: Some("doc42".to_string()),
                action: "edit".to_string(),
            })
            .await
            .unwrap();
        assert!(hit.allowed);

        let miss = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "document".to_string(),
                resource_id: Some("doc99".to_string()),
                action: "edit".to_string(),
            })
            .await
            .unwrap();
        assert!(!miss.allowed);
    }

    #[tokio::test]
    async fn s4_group_inheritance_with_zero_direct_roles() {
        let (engine, role_repo, group_repo, _perm_repo) = engine();
        let role = Role::new("group_editor".to_string(), RoleScope::Global, None, None, None);
        role_repo.create(role.clone()).await.unwrap();
        role_repo
            .add_resource_permission(ResourcePermission::new(role.id, "document".to_string(), None, "edit".to_string()))
            .await
            .unwrap();

        let organization_id = Uuid::new_v4();
        let group = Group::new(organization_id, "editors".to_string(), None);
        group_repo.create(group.clone()).await.unwrap();
        group_repo.grant_role_to_group(GroupRole::new(group.id, role.id)).await.unwrap();

        let user_id = Uuid::new_v4();
        group_repo
            .add_membership(GroupMembership::new(group.id, user_id, PrincipalKind::User))
            .await
            .unwrap();

        let decision = engine
            .authorize(AuthorizeInput {
                principal_id: user_id,
                resource_type: "document".to_string(),
                resource_id: Some("doc1".to_string()),
                action: "edit".to_string(),
            })
            .await
            .unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn no_roles_denies() {
        let (engine, _role_repo, _group_repo, _perm_repo) = engine();
        let decision = engine
            .authorize(AuthorizeInput {
                principal_id: Uuid::new_v4(),
                resource_type: "user".to_string(),
                resource_id: None,
                action: "read".to_string(),
            })
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "no roles");
    }

    #[test]
    fn endpoint_derivation_singularises_and_lowercases_method() {
        let derived = derive_endpoint("/api/v1/users/42", "GET").unwrap();
        assert_eq!(derived.resource_type, "user");
        assert_eq!(derived.resource_id, Some("42".to_string()));
        assert_eq!(derived.action, "get");
    }

    #[test]
    fn permission_grammar_rejects_unknown_vocabulary() {
        assert!(parse_permission_string("user:read").is_ok());
        assert!(parse_permission_string("widget:read").is_err());
        assert!(parse_permission_string("user:fly").is_err());
    }
}
