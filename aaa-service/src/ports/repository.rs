//! Repository ports — one trait per entity family, `Create/Update/SoftDelete/
//! GetByID/List` per spec.md §6, plus the narrow extra queries each service
//! actually needs (e.g. "active user-roles for a user"). In-memory
//! implementations back the test suite; a real backend implements the same
//! trait behind a Postgres/Mongo/etc. client the caller owns.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::*;

fn is_visible<T>(deleted_at: &Option<chrono::DateTime<Utc>>, include_deleted: bool) -> bool
where
    T: Sized,
{
    include_deleted || deleted_at.is_none()
}

/// Generic in-memory store shared by every `InMemory*Repository`. Not part
/// of the port surface — an implementation detail of the reference adapters.
pub struct InMemoryStore<T> {
    rows: DashMap<Uuid, T>,
}

impl<T: Clone> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }
}

impl<T: Clone> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, row: T) {
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.rows.get(id).map(|r| r.value().clone())
    }

    pub fn all(&self) -> Vec<T> {
        self.rows.iter().map(|r| r.value().clone()).collect()
    }

    pub fn remove(&self, id: &Uuid) {
        self.rows.remove(id);
    }
}

macro_rules! soft_delete_repo {
    ($repo_name:ident, $entity:ty, $field_deleted:ident, $field_active:ident) => {
        impl InMemoryStore<$entity> {
            pub fn soft_delete_row(&self, id: &Uuid) -> bool {
                if let Some(mut row) = self.rows.get_mut(id) {
                    row.$field_deleted = Some(Utc::now());
                    row.$field_active = false;
                    row.updated_at = Utc::now();
                    true
                } else {
                    false
                }
            }
        }
    };
}

soft_delete_repo!(_user, User, deleted_at, is_active);
soft_delete_repo!(_service, Service, deleted_at, is_active);
soft_delete_repo!(_org, Organization, deleted_at, is_active);
soft_delete_repo!(_group, Group, deleted_at, is_active);
soft_delete_repo!(_role, Role, deleted_at, is_active);
soft_delete_repo!(_permission, Permission, deleted_at, is_active);
soft_delete_repo!(_role_permission, RolePermission, deleted_at, is_active);
soft_delete_repo!(_resource_permission, ResourcePermission, deleted_at, is_active);
soft_delete_repo!(_user_role, UserRole, deleted_at, is_active);
soft_delete_repo!(_group_membership, GroupMembership, deleted_at, is_active);
soft_delete_repo!(_group_role, GroupRole, deleted_at, is_active);
soft_delete_repo!(_binding, Binding, deleted_at, is_active);
soft_delete_repo!(_column_group, ColumnGroup, deleted_at, is_active);
soft_delete_repo!(_column_member, ColumnMember, deleted_at, is_active);

// ---------------------------------------------------------------------
// User
// ---------------------------------------------------------------------

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, anyhow::Error>;
    async fn update(&self, user: User) -> Result<User, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error>;
    async fn get_by_id_with_deleted(&self, id: Uuid) -> Result<Option<User>, anyhow::Error>;
    async fn get_by_phone(&self, country_code: &str, phone_number: &str) -> Result<Option<User>, anyhow::Error>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error>;
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<User>, anyhow::Error>;
    async fn count(&self) -> Result<i64, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    store: InMemoryStore<User>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> Result<User, anyhow::Error> {
        self.store.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, mut user: User) -> Result<User, anyhow::Error> {
        user.updated_at = Utc::now();
        self.store.insert(user.id, user.clone());
        Ok(user)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.store.soft_delete_row(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        Ok(self.store.get(&id).filter(|u| is_visible::<User>(&u.deleted_at, false)))
    }

    async fn get_by_id_with_deleted(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        Ok(self.store.get(&id))
    }

    async fn get_by_phone(&self, country_code: &str, phone_number: &str) -> Result<Option<User>, anyhow::Error> {
        Ok(self
            .store
            .all()
            .into_iter()
            .find(|u| u.deleted_at.is_none() && u.country_code == country_code && u.phone_number == phone_number))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, anyhow::Error> {
        Ok(self
            .store
            .all()
            .into_iter()
            .find(|u| u.deleted_at.is_none() && u.username.as_deref() == Some(username)))
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<User>, anyhow::Error> {
        let mut rows: Vec<User> = self.store.all().into_iter().filter(|u| u.deleted_at.is_none()).collect();
        rows.sort_by_key(|u| u.created_at);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> Result<i64, anyhow::Error> {
        Ok(self.store.all().iter().filter(|u| u.deleted_at.is_none()).count() as i64)
    }
}

// ---------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create(&self, service: Service) -> Result<Service, anyhow::Error>;
    async fn update(&self, service: Service) -> Result<Service, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Service>, anyhow::Error>;
    async fn list_by_organization(&self, organization_id: Uuid) -> Result<Vec<Service>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryServiceRepository {
    store: InMemoryStore<Service>,
}

impl InMemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn create(&self, service: Service) -> Result<Service, anyhow::Error> {
        self.store.insert(service.id, service.clone());
        Ok(service)
    }

    async fn update(&self, mut service: Service) -> Result<Service, anyhow::Error> {
        service.updated_at = Utc::now();
        self.store.insert(service.id, service.clone());
        Ok(service)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.store.soft_delete_row(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Service>, anyhow::Error> {
        Ok(self.store.get(&id).filter(|s| s.deleted_at.is_none()))
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> Result<Vec<Service>, anyhow::Error> {
        Ok(self
            .store
            .all()
            .into_iter()
            .filter(|s| s.deleted_at.is_none() && s.organization_id == organization_id)
            .collect())
    }
}

// ---------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn create(&self, org: Organization) -> Result<Organization, anyhow::Error>;
    async fn update(&self, org: Organization) -> Result<Organization, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>, anyhow::Error>;
    async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Organization>, anyhow::Error>;
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Organization>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryOrganizationRepository {
    store: InMemoryStore<Organization>,
}

impl InMemoryOrganizationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrganizationRepository for InMemoryOrganizationRepository {
    async fn create(&self, org: Organization) -> Result<Organization, anyhow::Error> {
        self.store.insert(org.id, org.clone());
        Ok(org)
    }

    async fn update(&self, mut org: Organization) -> Result<Organization, anyhow::Error> {
        org.updated_at = Utc::now();
        self.store.insert(org.id, org.clone());
        Ok(org)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.store.soft_delete_row(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Organization>, anyhow::Error> {
        Ok(self.store.get(&id).filter(|o| o.deleted_at.is_none()))
    }

    async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Organization>, anyhow::Error> {
        Ok(self
            .store
            .all()
            .into_iter()
            .filter(|o| o.deleted_at.is_none() && o.parent_id == Some(parent_id))
            .collect())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Organization>, anyhow::Error> {
        let mut rows: Vec<_> = self.store.all().into_iter().filter(|o| o.deleted_at.is_none()).collect();
        rows.sort_by_key(|o| o.created_at);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

// ---------------------------------------------------------------------
// Group + membership + group-role grant
// ---------------------------------------------------------------------

#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: Group) -> Result<Group, anyhow::Error>;
    async fn update(&self, group: Group) -> Result<Group, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Group>, anyhow::Error>;
    async fn list_by_organization(&self, organization_id: Uuid) -> Result<Vec<Group>, anyhow::Error>;

    async fn add_membership(&self, membership: GroupMembership) -> Result<GroupMembership, anyhow::Error>;
    async fn deactivate_membership(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn active_memberships_for_principal(&self, principal_id: Uuid) -> Result<Vec<GroupMembership>, anyhow::Error>;
    async fn active_members_of_group(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, anyhow::Error>;

    async fn grant_role_to_group(&self, grant: GroupRole) -> Result<GroupRole, anyhow::Error>;
    async fn revoke_role_from_group(&self, group_id: Uuid, role_id: Uuid) -> Result<(), anyhow::Error>;
    async fn active_roles_for_group(&self, group_id: Uuid) -> Result<Vec<GroupRole>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryGroupRepository {
    groups: InMemoryStore<Group>,
    memberships: InMemoryStore<GroupMembership>,
    group_roles: InMemoryStore<GroupRole>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn create(&self, group: Group) -> Result<Group, anyhow::Error> {
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn update(&self, mut group: Group) -> Result<Group, anyhow::Error> {
        group.updated_at = Utc::now();
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.groups.soft_delete_row(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Group>, anyhow::Error> {
        Ok(self.groups.get(&id).filter(|g| g.deleted_at.is_none()))
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> Result<Vec<Group>, anyhow::Error> {
        Ok(self
            .groups
            .all()
            .into_iter()
            .filter(|g| g.deleted_at.is_none() && g.organization_id == organization_id)
            .collect())
    }

    async fn add_membership(&self, membership: GroupMembership) -> Result<GroupMembership, anyhow::Error> {
        self.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn deactivate_membership(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.memberships.soft_delete_row(&id);
        Ok(())
    }

    async fn active_memberships_for_principal(&self, principal_id: Uuid) -> Result<Vec<GroupMembership>, anyhow::Error> {
        Ok(self
            .memberships
            .all()
            .into_iter()
            .filter(|m| m.is_active && m.deleted_at.is_none() && m.principal_id == principal_id)
            .collect())
    }

    async fn active_members_of_group(&self, group_id: Uuid) -> Result<Vec<GroupMembership>, anyhow::Error> {
        Ok(self
            .memberships
            .all()
            .into_iter()
            .filter(|m| m.is_active && m.deleted_at.is_none() && m.group_id == group_id)
            .collect())
    }

    async fn grant_role_to_group(&self, grant: GroupRole) -> Result<GroupRole, anyhow::Error> {
        self.group_roles.insert(grant.id, grant.clone());
        Ok(grant)
    }

    async fn revoke_role_from_group(&self, group_id: Uuid, role_id: Uuid) -> Result<(), anyhow::Error> {
        if let Some(row) = self
            .group_roles
            .all()
            .into_iter()
            .find(|gr| gr.group_id == group_id && gr.role_id == role_id && gr.is_active)
        {
            self.group_roles.soft_delete_row(&row.id);
        }
        Ok(())
    }

    async fn active_roles_for_group(&self, group_id: Uuid) -> Result<Vec<GroupRole>, anyhow::Error> {
        Ok(self
            .group_roles
            .all()
            .into_iter()
            .filter(|gr| gr.is_active && gr.deleted_at.is_none() && gr.group_id == group_id)
            .collect())
    }
}

// ---------------------------------------------------------------------
// Role, Permission, and the join tables the Authorization Engine walks
// ---------------------------------------------------------------------

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: Role) -> Result<Role, anyhow::Error>;
    async fn update(&self, role: Role) -> Result<Role, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Role>, anyhow::Error>;
    async fn get_by_name_in_scope(
        &self,
        name: &str,
        organization_id: Option<Uuid>,
        group_id: Option<Uuid>,
    ) -> Result<Option<Role>, anyhow::Error>;
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Role>, anyhow::Error>;

    async fn assign_to_user(&self, user_role: UserRole) -> Result<UserRole, anyhow::Error>;
    async fn remove_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), anyhow::Error>;
    async fn active_user_roles(&self, user_id: Uuid) -> Result<Vec<UserRole>, anyhow::Error>;
    async fn has_active_assignment(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, anyhow::Error>;

    async fn add_role_permission(&self, rp: RolePermission) -> Result<RolePermission, anyhow::Error>;
    async fn active_role_permissions(&self, role_id: Uuid) -> Result<Vec<RolePermission>, anyhow::Error>;

    async fn add_resource_permission(&self, rp: ResourcePermission) -> Result<ResourcePermission, anyhow::Error>;
    async fn active_resource_permissions(&self, role_id: Uuid) -> Result<Vec<ResourcePermission>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryRoleRepository {
    roles: InMemoryStore<Role>,
    user_roles: InMemoryStore<UserRole>,
    role_permissions: InMemoryStore<RolePermission>,
    resource_permissions: InMemoryStore<ResourcePermission>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn create(&self, role: Role) -> Result<Role, anyhow::Error> {
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update(&self, mut role: Role) -> Result<Role, anyhow::Error> {
        role.updated_at = Utc::now();
        role.version += 1;
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.roles.soft_delete_row(&id);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Role>, anyhow::Error> {
        Ok(self.roles.get(&id).filter(|r| r.deleted_at.is_none()))
    }

    async fn get_by_name_in_scope(
        &self,
        name: &str,
        organization_id: Option<Uuid>,
        group_id: Option<Uuid>,
    ) -> Result<Option<Role>, anyhow::Error> {
        Ok(self.roles.all().into_iter().find(|r| {
            r.deleted_at.is_none()
                && r.name == name
                && r.organization_id == organization_id
                && r.group_id == group_id
        }))
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Role>, anyhow::Error> {
        let mut rows: Vec<_> = self.roles.all().into_iter().filter(|r| r.deleted_at.is_none()).collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn assign_to_user(&self, user_role: UserRole) -> Result<UserRole, anyhow::Error> {
        self.user_roles.insert(user_role.id, user_role.clone());
        Ok(user_role)
    }

    async fn remove_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), anyhow::Error> {
        if let Some(row) = self
            .user_roles
            .all()
            .into_iter()
            .find(|ur| ur.user_id == user_id && ur.role_id == role_id && ur.is_active)
        {
            self.user_roles.soft_delete_row(&row.id);
        }
        Ok(())
    }

    async fn active_user_roles(&self, user_id: Uuid) -> Result<Vec<UserRole>, anyhow::Error> {
        Ok(self
            .user_roles
            .all()
            .into_iter()
            .filter(|ur| ur.is_active && ur.deleted_at.is_none() && ur.user_id == user_id)
            .collect())
    }

    async fn has_active_assignment(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, anyhow::Error> {
        Ok(self
            .user_roles
            .all()
            .into_iter()
            .any(|ur| ur.is_active && ur.deleted_at.is_none() && ur.user_id == user_id && ur.role_id == role_id))
    }

    async fn add_role_permission(&self, rp: RolePermission) -> Result<RolePermission, anyhow::Error> {
        self.role_permissions.insert(rp.id, rp.clone());
        Ok(rp)
    }

    async fn active_role_permissions(&self, role_id: Uuid) -> Result<Vec<RolePermission>, anyhow::Error> {
        Ok(self
            .role_permissions
            .all()
            .into_iter()
            .filter(|rp| rp.is_active && rp.deleted_at.is_none() && rp.role_id == role_id)
            .collect())
    }

    async fn add_resource_permission(&self, rp: ResourcePermission) -> Result<ResourcePermission, anyhow::Error> {
        self.resource_permissions.insert(rp.id, rp.clone());
        Ok(rp)
    }

    async fn active_resource_permissions(&self, role_id: Uuid) -> Result<Vec<ResourcePermission>, anyhow::Error> {
        Ok(self
            .resource_permissions
            .all()
            .into_iter()
            .filter(|rp| rp.is_active && rp.deleted_at.is_none() && rp.role_id == role_id)
            .collect())
    }
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn create(&self, permission: Permission) -> Result<Permission, anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Permission>, anyhow::Error>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Permission>, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryPermissionRepository {
    store: InMemoryStore<Permission>,
}

impl InMemoryPermissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissionRepository {
    async fn create(&self, permission: Permission) -> Result<Permission, anyhow::Error> {
        self.store.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Permission>, anyhow::Error> {
        Ok(self.store.get(&id).filter(|p| p.deleted_at.is_none()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Permission>, anyhow::Error> {
        Ok(self.store.all().into_iter().find(|p| p.deleted_at.is_none() && p.name == name))
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.store.soft_delete_row(&id);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Binding (generalised assignment, carries column-group caveats)
// ---------------------------------------------------------------------

#[async_trait]
pub trait BindingRepository: Send + Sync {
    async fn create(&self, binding: Binding) -> Result<Binding, anyhow::Error>;
    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error>;
    async fn active_for_subject(&self, subject_id: Uuid) -> Result<Vec<Binding>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryBindingRepository {
    store: InMemoryStore<Binding>,
}

impl InMemoryBindingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BindingRepository for InMemoryBindingRepository {
    async fn create(&self, binding: Binding) -> Result<Binding, anyhow::Error> {
        self.store.insert(binding.id, binding.clone());
        Ok(binding)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), anyhow::Error> {
        self.store.soft_delete_row(&id);
        Ok(())
    }

    async fn active_for_subject(&self, subject_id: Uuid) -> Result<Vec<Binding>, anyhow::Error> {
        Ok(self
            .store
            .all()
            .into_iter()
            .filter(|b| b.is_active && b.deleted_at.is_none() && b.subject_id == subject_id)
            .collect())
    }
}

// ---------------------------------------------------------------------
// Column groups
// ---------------------------------------------------------------------

#[async_trait]
pub trait ColumnGroupRepository: Send + Sync {
    async fn create_group(&self, group: ColumnGroup) -> Result<ColumnGroup, anyhow::Error>;
    async fn add_member(&self, member: ColumnMember) -> Result<ColumnMember, anyhow::Error>;
    async fn groups_for_table(&self, table_name: &str) -> Result<Vec<ColumnGroup>, anyhow::Error>;
    async fn active_members(&self, column_group_id: Uuid) -> Result<Vec<ColumnMember>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryColumnGroupRepository {
    groups: InMemoryStore<ColumnGroup>,
    members: InMemoryStore<ColumnMember>,
}

impl InMemoryColumnGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColumnGroupRepository for InMemoryColumnGroupRepository {
    async fn create_group(&self, group: ColumnGroup) -> Result<ColumnGroup, anyhow::Error> {
        self.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn add_member(&self, member: ColumnMember) -> Result<ColumnMember, anyhow::Error> {
        self.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn groups_for_table(&self, table_name: &str) -> Result<Vec<ColumnGroup>, anyhow::Error> {
        Ok(self
            .groups
            .all()
            .into_iter()
            .filter(|g| g.deleted_at.is_none() && g.table_name == table_name)
            .collect())
    }

    async fn active_members(&self, column_group_id: Uuid) -> Result<Vec<ColumnMember>, anyhow::Error> {
        Ok(self
            .members
            .all()
            .into_iter()
            .filter(|m| m.is_active && m.deleted_at.is_none() && m.column_group_id == column_group_id)
            .collect())
    }
}

// ---------------------------------------------------------------------
// Audit and Event
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub status: Option<AuditStatus>,
    pub since: Option<chrono::DateTime<Utc>>,
    pub until: Option<chrono::DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn create(&self, record: AuditRecord) -> Result<AuditRecord, anyhow::Error>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<AuditRecord>, anyhow::Error>;
    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryAuditRepository {
    store: InMemoryStore<AuditRecord>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn create(&self, record: AuditRecord) -> Result<AuditRecord, anyhow::Error> {
        self.store.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<AuditRecord>, anyhow::Error> {
        Ok(self.store.get(&id))
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, anyhow::Error> {
        let limit = query.limit.clamp(1, 1000);
        let mut rows: Vec<AuditRecord> = self
            .store
            .all()
            .into_iter()
            .filter(|r| query.user_id.is_none() || r.user_id == query.user_id)
            .filter(|r| query.action.as_deref().map(|a| a == r.action).unwrap_or(true))
            .filter(|r| {
                query
                    .resource_type
                    .as_deref()
                    .map(|t| t == r.resource_type)
                    .unwrap_or(true)
            })
            .filter(|r| {
                query
                    .resource_id
                    .as_deref()
                    .map(|rid| Some(rid) == r.resource_id.as_deref())
                    .unwrap_or(true)
            })
            .filter(|r| query.status.map(|s| s == r.status).unwrap_or(true))
            .filter(|r| query.since.map(|s| r.timestamp >= s).unwrap_or(true))
            .filter(|r| query.until.map(|u| r.timestamp <= u).unwrap_or(true))
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.timestamp));
        Ok(rows.into_iter().skip(query.offset).take(limit).collect())
    }
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn append(&self, event: Event) -> Result<Event, anyhow::Error>;
    async fn last(&self) -> Result<Option<Event>, anyhow::Error>;
    async fn range(&self, start: i64, end: i64) -> Result<Vec<Event>, anyhow::Error>;
    async fn before(
        &self,
        occurred_before: chrono::DateTime<Utc>,
        resource_types: Option<Vec<String>>,
    ) -> Result<Vec<Event>, anyhow::Error>;
    async fn count(&self) -> Result<i64, anyhow::Error>;
}

#[derive(Default)]
pub struct InMemoryEventRepository {
    store: InMemoryStore<Event>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn append(&self, event: Event) -> Result<Event, anyhow::Error> {
        self.store.insert(event.id, event.clone());
        Ok(event)
    }

    async fn last(&self) -> Result<Option<Event>, anyhow::Error> {
        Ok(self.store.all().into_iter().max_by_key(|e| e.sequence_num))
    }

    async fn range(&self, start: i64, end: i64) -> Result<Vec<Event>, anyhow::Error> {
        let mut rows: Vec<Event> = self
            .store
            .all()
            .into_iter()
            .filter(|e| e.sequence_num >= start && e.sequence_num <= end)
            .collect();
        rows.sort_by_key(|e| e.sequence_num);
        Ok(rows)
    }

    async fn before(
        &self,
        occurred_before: chrono::DateTime<Utc>,
        resource_types: Option<Vec<String>>,
    ) -> Result<Vec<Event>, anyhow::Error> {
        let mut rows: Vec<Event> = self
            .store
            .all()
            .into_iter()
            .filter(|e| e.occurred_at <= occurred_before)
            .filter(|e| {
                resource_types
                    .as_ref()
                    .map(|types| types.iter().any(|t| t == &e.resource_type))
                    .unwrap_or(true)
            })
            .collect();
        rows.sort_by_key(|e| e.sequence_num);
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, anyhow::Error> {
        Ok(self.store.all().len() as i64)
    }
}
