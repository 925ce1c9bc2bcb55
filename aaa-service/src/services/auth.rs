//! Auth/Session (spec.md §4.2). Shaped like the teacher's `AuthService` —
//! one method per flow, a uniform "invalid credentials" surface on every
//! authentication-failure branch, cache-resident refresh tokens for
//! server-side revocation — grounded on the teacher's `auth-service`
//! login/refresh handlers and `services::jwt`/`services::policy` built in
//! this crate.

use std::sync::Arc;

use service_core::error::AppError;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::models::{AuditRecord, AuditStatus, User};
use crate::ports::{CachePort, UserRepository};
use crate::services::authz::AuthorizationEngine;
use crate::services::audit::AuditRecorder;
use crate::services::jwt::{JwtService, MintInput, TokenResponse, TokenType};
use crate::services::password::{hash_secret, verify_secret, Secret};
use crate::services::policy::PolicyService;

pub enum LoginIdentifier {
    Phone { country_code: String, phone_number: String },
    Username(String),
}

pub struct LoginRequest {
    pub identifier: LoginIdentifier,
    pub password: String,
    pub second_factor_code: Option<String>,
    pub context: RequestContext,
}

pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    cache: Arc<dyn CachePort>,
    jwt: JwtService,
    authz: Arc<AuthorizationEngine>,
    audit: Arc<AuditRecorder>,
    mfa_code_length: usize,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        cache: Arc<dyn CachePort>,
        jwt: JwtService,
        authz: Arc<AuthorizationEngine>,
        audit: Arc<AuditRecorder>,
        mfa_code_length: usize,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            user_repo,
            cache,
            jwt,
            authz,
            audit,
            mfa_code_length,
            refresh_token_ttl_seconds: refresh_token_expiry_days * 86_400,
        }
    }

    async fn log_failure(&self, user_id: Option<Uuid>, true_reason: &str, context: &RequestContext) {
        tracing::warn!(user_id = ?user_id, reason = true_reason, "login failed");
        let mut record = AuditRecord::new(user_id, "login", "user", user_id.map(|id| id.to_string()), AuditStatus::Failure, true_reason);
        record.ip = context.ip.clone();
        record.user_agent = context.user_agent.clone();
        self.audit.record(record).await;
    }

    /// Returns `Unauthorized("invalid credentials")` on every failure branch
    /// — not-found, soft-deleted, password mismatch, inactive status all
    /// look identical to the caller. The true reason is logged at `warn`.
    pub async fn login(&self, request: LoginRequest) -> Result<TokenResponse, AppError> {
        let user = match &request.identifier {
            LoginIdentifier::Phone { country_code, phone_number } => self
                .user_repo
                .get_by_phone(country_code, phone_number)
                .await
                .map_err(AppError::InternalError)?,
            LoginIdentifier::Username(username) => self
                .user_repo
                .get_by_username(username)
                .await
                .map_err(AppError::InternalError)?,
        };

        let Some(user) = user else {
            self.log_failure(None, "no user found for identifier", &request.context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        };

        if !user.is_eligible_for_login() {
            self.log_failure(Some(user.id), "account not eligible for login (deleted, inactive, or suspended)", &request.context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }

        if !verify_secret(&Secret::new(request.password), &crate::services::password::PasswordHashString::new(user.password_hash.clone())) {
            self.log_failure(Some(user.id), "password mismatch", &request.context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }

        if let Some(code) = &request.second_factor_code {
            let result = PolicyService::verify_second_factor(&*self.cache, user.id, code, self.mfa_code_length)
                .await
                .map_err(AppError::InternalError)?;
            if let Err(reason) = result {
                self.log_failure(Some(user.id), &format!("second factor failed: {reason:?}"), &request.context).await;
                return Err(AppError::Unauthorized(anyhow::anyhow!("invalid MFA code")));
            }
        }

        let tokens = self.mint_and_store(&user).await?;

        let mut record = AuditRecord::new(Some(user.id), "login", "user", Some(user.id.to_string()), AuditStatus::Success, "login succeeded");
        record.ip = request.context.ip.clone();
        record.user_agent = request.context.user_agent.clone();
        self.audit.record(record).await;

        Ok(tokens)
    }

    async fn mint_and_store(&self, user: &User) -> Result<TokenResponse, AppError> {
        let (roles, permissions) = self
            .authz
            .roles_and_permissions(user.id)
            .await
            .map_err(AppError::InternalError)?;

        let input = MintInput {
            user_id: user.id,
            username: user.username.clone(),
            is_validated: user.is_validated,
            roles,
            permissions,
        };
        let tokens = self.jwt.mint_pair(&input).map_err(AppError::InternalError)?;

        self.cache
            .set(
                &format!("refresh_token:{}", user.id),
                serde_json::Value::String(tokens.refresh_token.clone()),
                self.refresh_token_ttl_seconds,
            )
            .await
            .map_err(AppError::InternalError)?;

        Ok(tokens)
    }

    /// Requires the presented refresh token to decode, match `token_type ==
    /// refresh`, compare byte-for-byte against the cached value (server-side
    /// revocation), and requires the user's PIN.
    pub async fn refresh(&self, refresh_token: &str, pin: &str, context: &RequestContext) -> Result<TokenResponse, AppError> {
        let claims = self
            .jwt
            .decode_expect(refresh_token, TokenType::Refresh)
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("invalid credentials")))?;

        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("invalid credentials")))?;

        let cached = self
            .cache
            .get(&format!("refresh_token:{user_id}"))
            .await
            .map_err(AppError::InternalError)?;
        let Some(cached_value) = cached.and_then(|v| v.as_str().map(str::to_string)) else {
            self.log_failure(Some(user_id), "no cached refresh token (already logged out or expired)", context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        };
        if cached_value != refresh_token {
            self.log_failure(Some(user_id), "presented refresh token does not match cached value", context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }

        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .map_err(AppError::InternalError)?
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("invalid credentials")))?;
        if !user.is_eligible_for_login() {
            self.log_failure(Some(user_id), "account not eligible at refresh time", context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }

        let Some(pin_hash) = &user.pin_hash else {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid mPin")));
        };
        if !verify_secret(&Secret::new(pin.to_string()), &crate::services::password::PasswordHashString::new(pin_hash.clone())) {
            self.log_failure(Some(user_id), "pin mismatch on refresh", context).await;
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid mPin")));
        }

        self.mint_and_store(&user).await
    }

    /// Deletes the cached refresh token. Access tokens already issued remain
    /// valid until their own expiry — a documented limitation (spec.md §9).
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        self.cache
            .delete(&format!("refresh_token:{user_id}"))
            .await
            .map_err(AppError::InternalError)?;
        self.audit
            .record(AuditRecord::new(Some(user_id), "logout", "user", Some(user_id.to_string()), AuditStatus::Success, "logout"))
            .await;
        Ok(())
    }

    /// PIN set: requires the current password and no existing PIN.
    pub async fn set_pin(&self, user_id: Uuid, current_password: &str, new_pin: &str) -> Result<(), AppError> {
        let mut user = self.load_user(user_id).await?;
        if !verify_secret(&Secret::new(current_password.to_string()), &crate::services::password::PasswordHashString::new(user.password_hash.clone())) {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid credentials")));
        }
        if user.pin_hash.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!("a PIN is already set for this user")));
        }
        user.pin_hash = Some(hash_secret(&Secret::new(new_pin.to_string())).map_err(AppError::InternalError)?.into_string());
        self.user_repo.update(user).await.map_err(AppError::InternalError)?;
        Ok(())
    }

    /// PIN update: requires the current PIN to match.
    pub async fn update_pin(&self, user_id: Uuid, current_pin: &str, new_pin: &str) -> Result<(), AppError> {
        let mut user = self.load_user(user_id).await?;
        let Some(pin_hash) = &user.pin_hash else {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid mPin")));
        };
        if !verify_secret(&Secret::new(current_pin.to_string()), &crate::services::password::PasswordHashString::new(pin_hash.clone())) {
            return Err(AppError::Unauthorized(anyhow::anyhow!("invalid mPin")));
        }
        user.pin_hash = Some(hash_secret(&Secret::new(new_pin.to_string())).map_err(AppError::InternalError)?.into_string());
        self.user_repo.update(user).await.map_err(AppError::InternalError)?;
        Ok(())
    }

    pub async fn verify_pin(&self, user_id: Uuid, pin: &str) -> Result<bool, AppError> {
        let user = self.load_user(user_id).await?;
        let Some(pin_hash) = &user.pin_hash else {
            return Ok(false);
        };
        Ok(verify_secret(&Secret::new(pin.to_string()), &crate::services::password::PasswordHashString::new(pin_hash.clone())))
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .map_err(AppError::InternalError)?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user {user_id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::RoleScope;
    use crate::ports::{
        InMemoryAuditRepository, InMemoryCache, InMemoryGroupRepository, InMemoryPermissionRepository, InMemoryRoleRepository,
        InMemoryUserRepository,
    };
    use std::collections::HashSet;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-at-least-this-long".to_string(),
            issuer: "aaa-service".to_string(),
            audience: "aaa-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            leeway_seconds: 30,
        }
    }

    fn build_service() -> (AuthService, Arc<InMemoryUserRepository>, Arc<dyn CachePort>) {
        let user_repo = Arc::new(InMemoryUserRepository::new());
        let cache: Arc<dyn CachePort> = Arc::new(InMemoryCache::new());
        let role_repo = Arc::new(InMemoryRoleRepository::new());
        let group_repo = Arc::new(InMemoryGroupRepository::new());
        let permission_repo = Arc::new(InMemoryPermissionRepository::new());
        let audit = Arc::new(AuditRecorder::new(Arc::new(InMemoryAuditRepository::new()), cache.clone(), 86_400));
        let authz = Arc::new(AuthorizationEngine::new(
            role_repo,
            group_repo,
            permission_repo,
            cache.clone(),
            audit.clone(),
            HashSet::new(),
            HashSet::new(),
            300,
        ));
        let jwt = JwtService::new(&jwt_config());
        let service = AuthService::new(user_repo.clone(), cache.clone(), jwt, authz, audit, 6, 7);
        (service, user_repo, cache)
    }

    #[tokio::test]
    async fn login_round_trip_and_refresh_requires_pin() {
        let (service, user_repo, _cache) = build_service();
        let password_hash = hash_secret(&Secret::new("hunter22".to_string())).unwrap().into_string();
        let mut user = User::new("5550100".to_string(), "1".to_string(), password_hash);
        user.is_validated = true;
        user.pin_hash = Some(hash_secret(&Secret::new("1234".to_string())).unwrap().into_string());
        user_repo.create(user.clone()).await.unwrap();

        let tokens = service
            .login(LoginRequest {
                identifier: LoginIdentifier::Phone { country_code: "1".to_string(), phone_number: "5550100".to_string() },
                password: "hunter22".to_string(),
                second_factor_code: None,
                context: RequestContext::new(),
            })
            .await
            .unwrap();

        let wrong_pin = service.refresh(&tokens.refresh_token, "0000", &RequestContext::new()).await;
        assert!(wrong_pin.is_err());

        let new_tokens = service.refresh(&tokens.refresh_token, "1234", &RequestContext::new()).await.unwrap();
        assert_ne!(new_tokens.refresh_token, tokens.refresh_token);

        let stale_refresh = service.refresh(&tokens.refresh_token, "1234", &RequestContext::new()).await;
        assert!(stale_refresh.is_err(), "old refresh token must no longer validate after rotation");
    }

    #[tokio::test]
    async fn logout_invalidates_refresh() {
        let (service, user_repo, _cache) = build_service();
        let password_hash = hash_secret(&Secret::new("hunter22".to_string())).unwrap().into_string();
        let mut user = User::new("5550101".to_string(), "1".to_string(), password_hash);
        user.pin_hash = Some(hash_secret(&Secret::new("1234".to_string())).unwrap().into_string());
        user_repo.create(user.clone()).await.unwrap();

        let tokens = service
            .login(LoginRequest {
                identifier: LoginIdentifier::Phone { country_code: "1".to_string(), phone_number: "5550101".to_string() },
                password: "hunter22".to_string(),
                second_factor_code: None,
                context: RequestContext::new(),
            })
            .await
            .unwrap();

        service.logout(user.id).await.unwrap();
        let result = service.refresh(&tokens.refresh_token, "1234", &RequestContext::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_uniform_unauthorized() {
        let (service, user_repo, _cache) = build_service();
        let password_hash = hash_secret(&Secret::new("hunter22".to_string())).unwrap().into_string();
        let user = User::new("5550102".to_string(), "1".to_string(), password_hash);
        user_repo.create(user).await.unwrap();

        let err = service
            .login(LoginRequest {
                identifier: LoginIdentifier::Phone { country_code: "1".to_string(), phone_number: "5550102".to_string() },
                password: "wrong".to_string(),
                second_factor_code: None,
                context: RequestContext::new(),
            })
            .await
            .unwrap_err();
        match err {
            AppError::Unauthorized(e) => assert_eq!(e.to_string(), "invalid credentials"),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }
}
