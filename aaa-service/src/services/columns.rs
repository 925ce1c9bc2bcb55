//! Column Resolver (spec.md §4.6). No teacher analogue; grounded on the
//! `Binding`/`Caveat`/`ColumnGroup` shapes in `models` and on the per-table
//! cache the concurrency section calls for — a `RwLock`-guarded map rather
//! than the unguarded map the source uses (spec.md §5 names this
//! explicitly as the intended upgrade).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::ColumnGroup;
use crate::ports::{BindingRepository, ColumnGroupRepository, GroupRepository};

pub struct ColumnCheckResult {
    pub all_allowed: bool,
    pub allowed_columns: Vec<String>,
    pub denied_columns: Vec<String>,
    pub allowed_groups: Vec<String>,
}

pub struct ColumnResolver {
    binding_repo: Arc<dyn BindingRepository>,
    group_repo: Arc<dyn GroupRepository>,
    column_group_repo: Arc<dyn ColumnGroupRepository>,
    table_cache: RwLock<HashMap<String, Vec<ColumnGroup>>>,
}

impl ColumnResolver {
    pub fn new(
        binding_repo: Arc<dyn BindingRepository>,
        group_repo: Arc<dyn GroupRepository>,
        column_group_repo: Arc<dyn ColumnGroupRepository>,
    ) -> Self {
        Self {
            binding_repo,
            group_repo,
            column_group_repo,
            table_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn column_groups_for_table(&self, table_name: &str) -> Result<Vec<ColumnGroup>, anyhow::Error> {
        if let Some(cached) = self.table_cache.read().await.get(table_name) {
            return Ok(cached.clone());
        }
        let groups = self.column_group_repo.groups_for_table(table_name).await?;
        self.table_cache.write().await.insert(table_name.to_string(), groups.clone());
        Ok(groups)
    }

    /// Invalidates the per-table cache after a `ColumnGroup`/`ColumnMember`
    /// mutation. Callers hold the write lock for the duration of a single
    /// swap, not the whole request.
    pub async fn invalidate_table(&self, table_name: &str) {
        self.table_cache.write().await.remove(table_name);
    }

    /// Collects the set of column-group names a principal's bindings grant
    /// on `table_name`, directly and via active group memberships.
    async fn allowed_group_names(&self, principal_id: Uuid, table_name: &str, resource_id: Option<&str>) -> Result<HashSet<String>, anyhow::Error> {
        let mut allowed = HashSet::new();
        let now = Utc::now();

        let mut subject_ids = vec![principal_id];
        for membership in self.group_repo.active_memberships_for_principal(principal_id).await? {
            subject_ids.push(membership.group_id);
        }

        for subject_id in subject_ids {
            for binding in self.binding_repo.active_for_subject(subject_id).await? {
                if !binding.is_active || binding.resource_type != table_name {
                    continue;
                }
                if let Some(rid) = resource_id {
                    if let Some(binding_rid) = &binding.resource_id {
                        if binding_rid != rid && binding_rid != "*" {
                            continue;
                        }
                    }
                }
                let Some(caveat) = &binding.caveat else {
                    continue;
                };
                if !caveat.is_time_valid(now) {
                    continue;
                }
                allowed.extend(caveat.column_groups.iter().cloned());
            }
        }

        Ok(allowed)
    }

    /// Returns which of `requested_columns` the principal may see on
    /// `table_name` (optionally scoped to a single `resource_id`), plus the
    /// column-group names that granted access.
    pub async fn check_columns(
        &self,
        principal_id: Uuid,
        table_name: &str,
        resource_id: Option<&str>,
        requested_columns: &[String],
    ) -> Result<ColumnCheckResult, anyhow::Error> {
        let allowed_group_names = self.allowed_group_names(principal_id, table_name, resource_id).await?;
        let table_groups = self.column_groups_for_table(table_name).await?;

        let mut allowed_columns = HashSet::new();
        let mut matched_group_names = Vec::new();
        for group in table_groups.iter().filter(|g| g.is_active && allowed_group_names.contains(&g.name)) {
            matched_group_names.push(group.name.clone());
            for member in self.column_group_repo.active_members(group.id).await? {
                if member.is_active {
                    allowed_columns.insert(member.column_name);
                }
            }
        }

        let mut denied_columns = Vec::new();
        let mut result_allowed = Vec::new();
        for column in requested_columns {
            if allowed_columns.contains(column) {
                result_allowed.push(column.clone());
            } else {
                denied_columns.push(column.clone());
            }
        }

        Ok(ColumnCheckResult {
            all_allowed: denied_columns.is_empty(),
            allowed_columns: result_allowed,
            denied_columns,
            allowed_groups: matched_group_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Binding, BindingType, Caveat, SubjectType};
    use crate::ports::{InMemoryBindingRepository, InMemoryColumnGroupRepository, InMemoryGroupRepository};

    #[tokio::test]
    async fn direct_binding_grants_its_column_group_only() {
        let binding_repo = Arc::new(InMemoryBindingRepository::new());
        let group_repo = Arc::new(InMemoryGroupRepository::new());
        let column_group_repo = Arc::new(InMemoryColumnGroupRepository::new());

        let group = ColumnGroup::new("users".to_string(), "contact_info".to_string());
        column_group_repo.create_group(group.clone()).await.unwrap();
        column_group_repo
            .add_member(crate::models::ColumnMember::new(group.id, "phone_number".to_string()))
            .await
            .unwrap();
        column_group_repo
            .add_member(crate::models::ColumnMember::new(group.id, "email".to_string()))
            .await
            .unwrap();

        let user_id = Uuid::new_v4();
        let caveat = Caveat {
            column_groups: vec!["contact_info".to_string()],
            ..Default::default()
        };
        binding_repo
            .create(Binding::new(
                SubjectType::User,
                user_id,
                BindingType::Permission,
                Uuid::new_v4(),
                "users".to_string(),
                None,
                Some(caveat),
            ))
            .await
            .unwrap();

        let resolver = ColumnResolver::new(binding_repo, group_repo, column_group_repo);
        let result = resolver
            .check_columns(
                user_id,
                "users",
                None,
                &["phone_number".to_string(), "email".to_string(), "password_hash".to_string()],
            )
            .await
            .unwrap();

        assert!(!result.all_allowed);
        assert_eq!(result.allowed_columns.len(), 2);
        assert_eq!(result.denied_columns, vec!["password_hash".to_string()]);
        assert_eq!(result.allowed_groups, vec!["contact_info".to_string()]);
    }

    #[tokio::test]
    async fn no_matching_bindings_denies_everything() {
        let binding_repo = Arc::new(InMemoryBindingRepository::new());
        let group_repo = Arc::new(InMemoryGroupRepository::new());
        let column_group_repo = Arc::new(InMemoryColumnGroupRepository::new());
        let resolver = ColumnResolver::new(binding_repo, group_repo, column_group_repo);

        let result = resolver
            .check_columns(Uuid::new_v4(), "users", None, &["email".to_string()])
            .await
            .unwrap();
        assert!(!result.all_allowed);
        assert!(result.allowed_columns.is_empty());
    }
}
