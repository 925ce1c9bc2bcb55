//! Principal/Service Identity (spec.md §4.7, second half). Wraps
//! `models::principal::Principal`'s tag/field consistency check and adds
//! API-key issuance/validation for Service-type principals — grounded on
//! the teacher's service-identity handling in `auth-service/src/services`.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{AuditRecord, AuditStatus, Principal, Service};
use crate::ports::ServiceRepository;
use crate::services::audit::AuditRecorder;
use crate::services::password::{hash_api_key, verify_api_key};

pub struct PrincipalService {
    service_repo: Arc<dyn ServiceRepository>,
    audit: Arc<AuditRecorder>,
}

/// A freshly minted API key, returned exactly once — only its hash is
/// persisted.
pub struct IssuedApiKey {
    pub service: Service,
    pub plaintext_key: String,
}

impl PrincipalService {
    pub fn new(service_repo: Arc<dyn ServiceRepository>, audit: Arc<AuditRecorder>) -> Self {
        Self { service_repo, audit }
    }

    pub fn new_user_principal(user_id: Uuid, name: String, organization_id: Option<Uuid>) -> Result<Principal, AppError> {
        Principal::new_user(user_id, name, organization_id).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
    }

    pub fn new_service_principal(service_id: Uuid, name: String, organization_id: Option<Uuid>) -> Result<Principal, AppError> {
        Principal::new_service(service_id, name, organization_id).map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
    }

    /// Validates the tag/field pairing invariant for a principal that
    /// arrived over the wire (e.g. deserialized from a request body).
    pub fn validate(principal: &Principal) -> Result<(), AppError> {
        principal.validate_consistency().map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
    }

    /// Registers a service identity and issues its API key. The plaintext
    /// key is returned once; only `hash_api_key(key)` is stored.
    pub async fn issue_service(
        &self,
        name: String,
        description: Option<String>,
        organization_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<IssuedApiKey, AppError> {
        let plaintext_key = generate_api_key();
        let api_key_hash = hash_api_key(&plaintext_key);
        let service = Service::new(name, description, organization_id, api_key_hash);
        let created = self.service_repo.create(service).await.map_err(AppError::InternalError)?;

        self.audit
            .record(AuditRecord::new(actor_id, "api_key_issue", "service", Some(created.id.to_string()), AuditStatus::Success, "service api key issued"))
            .await;

        Ok(IssuedApiKey {
            service: created,
            plaintext_key,
        })
    }

    /// Validates a candidate API key against the stored service, in
    /// constant time. Returns the matching active `Service` on success.
    pub async fn validate_api_key(&self, service_id: Uuid, candidate: &str) -> Result<Service, AppError> {
        let service = self
            .service_repo
            .get_by_id(service_id)
            .await
            .map_err(AppError::InternalError)?
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("invalid credentials")))?;

        if !service.is_active || !verify_api_key(candidate, &service.api_key_hash) {
            self.audit
                .record(AuditRecord::new(
                    actor_id_from_service(&service),
                    "api_key_validate",
                    "service",
                    Some(service_id.to_string()),
                    AuditStatus::Failure,
                    "api key mismatch or service inactive",
                ))
                .await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }

        Ok(service)
    }

    pub async fn revoke_api_key(&self, service_id: Uuid, actor_id: Option<Uuid>) -> Result<(), AppError> {
        self.service_repo.soft_delete(service_id).await.map_err(AppError::InternalError)?;
        self.audit
            .record(AuditRecord::new(actor_id, "api_key_revoke", "service", Some(service_id.to_string()), AuditStatus::Success, "service api key revoked"))
            .await;
        Ok(())
    }
}

fn actor_id_from_service(service: &Service) -> Option<Uuid> {
    Some(service.id)
}

fn generate_api_key() -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(40).map(char::from).collect();
    format!("svc_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{InMemoryAuditRepository, InMemoryCache, InMemoryServiceRepository};

    #[tokio::test]
    async fn issued_key_validates_and_wrong_key_fails() {
        let service_repo = Arc::new(InMemoryServiceRepository::new());
        let cache: Arc<dyn crate::ports::CachePort> = Arc::new(InMemoryCache::new());
        let audit = Arc::new(AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()), cache, 86_400));
        let principals = PrincipalService::new(service_repo, audit);

        let issued = principals.issue_service("billing-worker".to_string(), None, Uuid::new_v4(), None).await.unwrap();
        let valid = principals.validate_api_key(issued.service.id, &issued.plaintext_key).await;
        assert!(valid.is_ok());

        let invalid = principals.validate_api_key(issued.service.id, "wrong-key").await;
        assert!(invalid.is_err());
    }

    #[test]
    fn principal_consistency_rejects_mismatched_tag() {
        let mut principal = Principal::new_user(Uuid::new_v4(), "alice".to_string(), None).unwrap();
        principal.service_id = Some(Uuid::new_v4());
        assert!(PrincipalService::validate(&principal).is_err());
    }
}
