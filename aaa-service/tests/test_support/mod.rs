//! Test harness — assembles a fully-wired `AaaEngine` over in-memory ports.
//! Grounded on the teacher's `tests/common/mod.rs` `TestApp` builder, minus
//! the gRPC transport and Postgres pool the teacher spins up: this crate has
//! no transport of its own, so the harness stops at the engine boundary.
#![allow(dead_code)]

use std::sync::Arc;

use aaa_service::config::{AaaConfig, CacheTtlConfig, JwtConfig, WarmingConfig};
use aaa_service::ports::{
    CachePort, InMemoryAuditRepository, InMemoryBindingRepository, InMemoryColumnGroupRepository, InMemoryEventRepository,
    InMemoryGroupRepository, InMemoryOrganizationRepository, InMemoryPermissionRepository, InMemoryRoleRepository,
    InMemoryServiceRepository, InMemoryUserRepository, InMemoryCache,
};
use aaa_service::{AaaEngine, Repositories};
use service_core::config::Config as CoreConfig;
use std::collections::HashSet;

pub struct TestApp {
    pub engine: AaaEngine,
    pub cache: Arc<dyn CachePort>,
    pub users: Arc<InMemoryUserRepository>,
    pub services: Arc<InMemoryServiceRepository>,
    pub organizations: Arc<InMemoryOrganizationRepository>,
    pub groups: Arc<InMemoryGroupRepository>,
    pub roles: Arc<InMemoryRoleRepository>,
    pub permissions: Arc<InMemoryPermissionRepository>,
    pub bindings: Arc<InMemoryBindingRepository>,
    pub column_groups: Arc<InMemoryColumnGroupRepository>,
}

fn test_config() -> AaaConfig {
    AaaConfig {
        common: CoreConfig {
            service_name: "aaa-service-test".to_string(),
            log_level: "info".to_string(),
        },
        environment: aaa_service::config::Environment::Dev,
        jwt: JwtConfig {
            secret: "test-secret-at-least-this-long-enough".to_string(),
            issuer: "aaa-service".to_string(),
            audience: "aaa-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            leeway_seconds: 30,
        },
        cache_ttl: CacheTtlConfig::default(),
        warming: WarmingConfig::default(),
        admin_role_names: ["super_admin", "admin", "system_admin"].into_iter().map(String::from).collect::<HashSet<_>>(),
        admin_permission_names: ["manage", "admin", "super_admin"].into_iter().map(String::from).collect::<HashSet<_>>(),
        mfa_code_length: 6,
        consistency_wait_ms: 5_000,
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = test_config();
        let cache: Arc<dyn CachePort> = Arc::new(InMemoryCache::new());

        let users = Arc::new(InMemoryUserRepository::new());
        let services = Arc::new(InMemoryServiceRepository::new());
        let organizations = Arc::new(InMemoryOrganizationRepository::new());
        let groups = Arc::new(InMemoryGroupRepository::new());
        let roles = Arc::new(InMemoryRoleRepository::new());
        let permissions = Arc::new(InMemoryPermissionRepository::new());
        let bindings = Arc::new(InMemoryBindingRepository::new());
        let column_groups = Arc::new(InMemoryColumnGroupRepository::new());
        let audit = Arc::new(InMemoryAuditRepository::new());
        let events = Arc::new(InMemoryEventRepository::new());

        let repos = Repositories {
            users: users.clone(),
            services: services.clone(),
            organizations: organizations.clone(),
            groups: groups.clone(),
            roles: roles.clone(),
            permissions: permissions.clone(),
            bindings: bindings.clone(),
            column_groups: column_groups.clone(),
            audit,
            events,
        };

        let engine = AaaEngine::assemble(&config, cache.clone(), repos).await.expect("engine assembly");

        Self {
            engine,
            cache,
            users,
            services,
            organizations,
            groups,
            roles,
            permissions,
            bindings,
            column_groups,
        }
    }
}
