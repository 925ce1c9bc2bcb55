//! Cache Coherence (spec.md §4.5): warming loop plus event-typed
//! invalidation. Grounded on the teacher's `services::redis` for the
//! cache-key conventions and on the `WarmingConfig`/`isRunning`-under-a-lock
//! shape spec.md §5 and §9 describe, translated into a `tokio::sync::Mutex`
//! run-flag and a `Semaphore` for bounded warming concurrency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Semaphore, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CacheTtlConfig;
use crate::models::EventKind;
use crate::ports::{CachePort, GroupRepository, OrganizationRepository, RoleRepository};

pub struct WarmingTargets {
    pub organization_ids: Vec<Uuid>,
    pub group_ids: Vec<Uuid>,
    /// (organization_id, user_id) pairs to pre-warm effective-role lookups for.
    pub org_user_pairs: Vec<(Uuid, Uuid)>,
}

pub struct CacheCoherence {
    cache: Arc<dyn CachePort>,
    organization_repo: Arc<dyn OrganizationRepository>,
    group_repo: Arc<dyn GroupRepository>,
    role_repo: Arc<dyn RoleRepository>,
    ttl: CacheTtlConfig,
    max_concurrency: usize,
    running: Arc<AtomicBool>,
    stop: Arc<Mutex<Option<tokio::sync::oneshot::Sender<()>>>>,
}

impl CacheCoherence {
    pub fn new(
        cache: Arc<dyn CachePort>,
        organization_repo: Arc<dyn OrganizationRepository>,
        group_repo: Arc<dyn GroupRepository>,
        role_repo: Arc<dyn RoleRepository>,
        ttl: CacheTtlConfig,
        max_concurrency: usize,
    ) -> Self {
        Self {
            cache,
            organization_repo,
            group_repo,
            role_repo,
            ttl,
            max_concurrency,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the warming loop: one immediate pass, then a pass every
    /// `interval`. Bounded by a semaphore so warming never starves request
    /// traffic for repository/cache connections.
    pub fn start(self: &Arc<Self>, interval: Duration, targets: WarmingTargets) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let this = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.warm_once(&targets).await;
                    }
                    _ = &mut rx => {
                        this.running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        // store synchronously via blocking lock avoided — use try_lock since
        // start() is only ever called once per instance before traffic begins.
        if let Ok(mut guard) = self.stop.try_lock() {
            *guard = Some(tx);
        }
        handle
    }

    /// Signals the warming loop to stop after its current pass and awaits
    /// the handle.
    pub async fn stop(&self, handle: JoinHandle<()>) {
        if let Some(tx) = self.stop.lock().await.take() {
            let _ = tx.send(());
        }
        let _ = handle.await;
    }

    async fn warm_once(&self, targets: &WarmingTargets) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let mut handles = Vec::new();

        for organization_id in targets.organization_ids.clone() {
            let permit = semaphore.clone();
            let this_cache = self.cache.clone();
            let org_repo = self.organization_repo.clone();
            let group_repo = self.group_repo.clone();
            let ttl = self.ttl.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                warm_organization(&*this_cache, &*org_repo, &*group_repo, organization_id, &ttl).await;
            }));
        }

        for group_id in targets.group_ids.clone() {
            let permit = semaphore.clone();
            let this_cache = self.cache.clone();
            let group_repo = self.group_repo.clone();
            let ttl = self.ttl.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                warm_group(&*this_cache, &*group_repo, group_id, &ttl).await;
            }));
        }

        for (organization_id, user_id) in targets.org_user_pairs.clone() {
            let permit = semaphore.clone();
            let this_cache = self.cache.clone();
            let role_repo = self.role_repo.clone();
            let group_repo = self.group_repo.clone();
            let ttl = self.ttl.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await;
                warm_effective_roles(&*this_cache, &*role_repo, &*group_repo, organization_id, user_id, &ttl).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Deletes the fixed key set plus any glob-pattern matches for the given
    /// event kind. Never propagates an individual delete failure — each is
    /// logged and the sweep continues.
    pub async fn invalidate(&self, kind: EventKind, organization_id: Option<Uuid>, group_id: Option<Uuid>, user_id: Option<Uuid>) {
        let (exact_keys, patterns) = strategy_for(kind, organization_id, group_id, user_id);

        for key in exact_keys {
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(key = %key, error = %e, "cache invalidation delete failed");
            }
        }

        for pattern in patterns {
            match self.cache.keys(&pattern).await {
                Ok(matched) => {
                    for key in matched {
                        if let Err(e) = self.cache.delete(&key).await {
                            tracing::warn!(key = %key, error = %e, "cache invalidation delete failed");
                        }
                    }
                }
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "cache invalidation scan failed"),
            }
        }
    }
}

async fn warm_organization(cache: &dyn CachePort, org_repo: &dyn OrganizationRepository, group_repo: &dyn GroupRepository, organization_id: Uuid, ttl: &CacheTtlConfig) {
    if let Ok(Some(org)) = org_repo.get_by_id(organization_id).await {
        let _ = cache
            .set(&format!("org:{organization_id}:hierarchy"), json!(org), ttl.organization_hierarchy_seconds)
            .await;
    }
    if let Ok(children) = org_repo.list_children(organization_id).await {
        let _ = cache
            .set(&format!("org:{organization_id}:children"), json!(children), ttl.organization_hierarchy_seconds)
            .await;
    }
    if let Ok(groups) = group_repo.list_by_organization(organization_id).await {
        let _ = cache
            .set(&format!("org:{organization_id}:groups"), json!(groups), ttl.organization_hierarchy_seconds)
            .await;
    }
}

async fn warm_group(cache: &dyn CachePort, group_repo: &dyn GroupRepository, group_id: Uuid, ttl: &CacheTtlConfig) {
    if let Ok(roles) = group_repo.active_roles_for_group(group_id).await {
        let _ = cache.set(&format!("group:{group_id}:roles"), json!(roles), ttl.group_roles_seconds).await;
    }
    if let Ok(members) = group_repo.active_members_of_group(group_id).await {
        let _ = cache.set(&format!("group:{group_id}:members"), json!(members), ttl.group_roles_seconds).await;
    }
}

async fn warm_effective_roles(
    cache: &dyn CachePort,
    role_repo: &dyn RoleRepository,
    group_repo: &dyn GroupRepository,
    organization_id: Uuid,
    user_id: Uuid,
    ttl: &CacheTtlConfig,
) {
    if let Ok(direct) = role_repo.active_user_roles(user_id).await {
        let mut role_ids: Vec<Uuid> = direct.iter().map(|ur| ur.role_id).collect();
        if let Ok(memberships) = group_repo.active_memberships_for_principal(user_id).await {
            for membership in memberships {
                if let Ok(grants) = group_repo.active_roles_for_group(membership.group_id).await {
                    role_ids.extend(grants.into_iter().map(|g| g.role_id));
                }
            }
        }
        let _ = cache
            .set(
                &format!("org:{organization_id}:user:{user_id}:effective_roles"),
                json!(role_ids),
                ttl.user_effective_roles_seconds,
            )
            .await;
    }
}

/// Maps an event kind to its fixed exact-key deletes plus glob-pattern
/// scans, per the table in spec.md §4.5.
fn strategy_for(kind: EventKind, organization_id: Option<Uuid>, group_id: Option<Uuid>, user_id: Option<Uuid>) -> (Vec<String>, Vec<String>) {
    let mut exact = Vec::new();
    let mut patterns = Vec::new();

    match kind {
        EventKind::OrganizationCreated | EventKind::OrganizationUpdated | EventKind::OrganizationDeleted | EventKind::OrganizationHierarchyChanged => {
            if let Some(org_id) = organization_id {
                exact.push(format!("org:{org_id}:hierarchy"));
                exact.push(format!("org:{org_id}:parent_hierarchy"));
                exact.push(format!("org:{org_id}:children"));
                exact.push(format!("org:{org_id}:active_children"));
                exact.push(format!("org:{org_id}:stats"));
                patterns.push(format!("org:{org_id}:user:*"));
            }
        }
        EventKind::GroupCreated | EventKind::GroupUpdated | EventKind::GroupDeleted => {
            if let Some(gid) = group_id {
                exact.push(format!("group:{gid}:hierarchy"));
                exact.push(format!("group:{gid}:ancestors"));
                exact.push(format!("group:{gid}:descendants"));
                exact.push(format!("group:{gid}:children"));
                exact.push(format!("group:{gid}:active_children"));
            }
            if let Some(org_id) = organization_id {
                exact.push(format!("org:{org_id}:groups"));
                exact.push(format!("org:{org_id}:active_groups"));
                exact.push(format!("org:{org_id}:group_hierarchy"));
            }
        }
        EventKind::UserGroupMembershipChanged => {
            if let Some(gid) = group_id {
                exact.push(format!("group:{gid}:members"));
                exact.push(format!("group:{gid}:active_members"));
                exact.push(format!("group:{gid}:member_details"));
            }
            if let Some(uid) = user_id {
                exact.push(format!("user_roles:{uid}"));
                if let Some(org_id) = organization_id {
                    patterns.push(format!("org:{org_id}:user:{uid}:*"));
                }
            }
        }
        EventKind::RoleAssignedToGroup | EventKind::RoleRemovedFromGroup => {
            if let Some(gid) = group_id {
                exact.push(format!("group:{gid}:roles"));
                exact.push(format!("group:{gid}:active_roles"));
                exact.push(format!("group:{gid}:role_details"));
                exact.push(format!("group:{gid}:role_inheritance"));
            }
            if let Some(org_id) = organization_id {
                patterns.push(format!("org:{org_id}:user:*"));
            }
        }
        EventKind::RoleUpdated | EventKind::RoleCreated | EventKind::RoleDeleted => {
            if let Some(org_id) = organization_id {
                patterns.push(format!("org:{org_id}:user:*"));
            }
        }
        EventKind::BindingCreated | EventKind::BindingUpdated | EventKind::BindingDeleted | EventKind::BindingRolledBack => {
            if let Some(uid) = user_id {
                patterns.push(format!("perm:{uid}:*"));
            }
        }
        EventKind::ResourceCreated | EventKind::ResourceUpdated | EventKind::ResourceDeleted => {
            if let Some(uid) = user_id {
                patterns.push(format!("perm:{uid}:*"));
            }
        }
    }

    (exact, patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryCache;

    #[tokio::test]
    async fn invalidation_is_idempotent() {
        let cache: Arc<dyn CachePort> = Arc::new(InMemoryCache::new());
        let org_id = Uuid::new_v4();
        cache.set(&format!("org:{org_id}:hierarchy"), json!("x"), 60).await.unwrap();

        let organization_repo = Arc::new(crate::ports::InMemoryOrganizationRepository::new());
        let group_repo = Arc::new(crate::ports::InMemoryGroupRepository::new());
        let role_repo = Arc::new(crate::ports::InMemoryRoleRepository::new());
        let coherence = CacheCoherence::new(cache.clone(), organization_repo, group_repo, role_repo, CacheTtlConfig::default(), 4);

        coherence.invalidate(EventKind::OrganizationUpdated, Some(org_id), None, None).await;
        coherence.invalidate(EventKind::OrganizationUpdated, Some(org_id), None, None).await;

        assert!(cache.get(&format!("org:{org_id}:hierarchy")).await.unwrap().is_none());
    }
}
