//! AAA engine: authorization decisions, identity/session lifecycle, a
//! hash-chained audit stream, and the cache coherence layer that fronts
//! them. Transport (HTTP/RPC), durable persistence, and the transport
//! cache are owned by the caller — this crate exposes ports for them.

pub mod config;
pub mod context;
pub mod models;
pub mod ports;
pub mod services;

use std::collections::HashSet;
use std::sync::Arc;

use ports::{CachePort, GroupRepository, OrganizationRepository, PermissionRepository, RoleRepository, ServiceRepository, UserRepository};
use ports::{AuditRepository, BindingRepository, ColumnGroupRepository, EventRepository};
use services::audit::AuditRecorder;
use services::auth::AuthService;
use services::authz::AuthorizationEngine;
use services::cache_coherence::CacheCoherence;
use services::columns::ColumnResolver;
use services::consistency::ConsistencyManager;
use services::event_chain::EventChain;
use services::jwt::JwtService;
use services::principals::PrincipalService;
use services::roles::RoleService;

/// Every repository port the engine depends on, gathered behind one struct
/// so wiring a concrete backend means constructing one of these rather than
/// threading nine constructor arguments through every call site.
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub organizations: Arc<dyn OrganizationRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub permissions: Arc<dyn PermissionRepository>,
    pub bindings: Arc<dyn BindingRepository>,
    pub column_groups: Arc<dyn ColumnGroupRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub events: Arc<dyn EventRepository>,
}

/// Assembles every service behind the ports it needs. Construction is
/// fallible only insofar as the event chain must read the last persisted
/// event to resume its cursor.
pub struct AaaEngine {
    pub authz: Arc<AuthorizationEngine>,
    pub auth: Arc<AuthService>,
    pub audit: Arc<AuditRecorder>,
    pub events: Arc<EventChain>,
    pub cache_coherence: Arc<CacheCoherence>,
    pub columns: Arc<ColumnResolver>,
    pub roles: Arc<RoleService>,
    pub principals: Arc<PrincipalService>,
    pub consistency: Arc<ConsistencyManager>,
}

impl AaaEngine {
    pub async fn assemble(config: &config::AaaConfig, cache: Arc<dyn CachePort>, repos: Repositories) -> Result<Self, anyhow::Error> {
        let audit = Arc::new(AuditRecorder::new(repos.audit.clone(), cache.clone(), config.cache_ttl.failed_audit_log_seconds));
        let events = Arc::new(EventChain::new(repos.events.clone()).await?);

        let admin_role_names: HashSet<String> = config.admin_role_names.clone();
        let admin_permission_names: HashSet<String> = config.admin_permission_names.clone();

        let authz = Arc::new(AuthorizationEngine::new(
            repos.roles.clone(),
            repos.groups.clone(),
            repos.permissions.clone(),
            cache.clone(),
            audit.clone(),
            admin_role_names,
            admin_permission_names,
            config.cache_ttl.permission_decision_seconds,
        ));

        let jwt = JwtService::new(&config.jwt);
        let auth = Arc::new(AuthService::new(
            repos.users.clone(),
            cache.clone(),
            jwt,
            authz.clone(),
            audit.clone(),
            config.mfa_code_length,
            config.jwt.refresh_token_expiry_days,
        ));

        let cache_coherence = Arc::new(CacheCoherence::new(
            cache.clone(),
            repos.organizations.clone(),
            repos.groups.clone(),
            repos.roles.clone(),
            config.cache_ttl.clone(),
            config.warming.max_concurrency,
        ));

        let columns = Arc::new(ColumnResolver::new(repos.bindings.clone(), repos.groups.clone(), repos.column_groups.clone()));

        let roles = Arc::new(RoleService::new(repos.roles.clone(), cache.clone(), audit.clone(), events.clone()));

        let principals = Arc::new(PrincipalService::new(repos.services.clone(), audit.clone()));

        let consistency = Arc::new(ConsistencyManager::new(config.consistency_wait_ms));

        Ok(Self {
            authz,
            auth,
            audit,
            events,
            cache_coherence,
            columns,
            roles,
            principals,
            consistency,
        })
    }
}
