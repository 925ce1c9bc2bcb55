//! JWT mint/verify. Shape (claims set, `TokenResponse`, struct layout)
//! follows the teacher's `auth-service/src/services/jwt.rs`; the algorithm
//! is HS256 symmetric per spec.md §4.2/§6 rather than the teacher's
//! RS256-from-PEM-files (see DESIGN.md and SPEC_FULL.md §9 for the
//! deviation rationale — there is no JWKS endpoint to serve for a
//! symmetric key).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: Option<String>,
    pub is_validated: bool,
    pub roles: Vec<RoleSummary>,
    pub permissions: Vec<String>,
    pub token_type: TokenType,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    leeway_seconds: i64,
}

pub struct MintInput {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub is_validated: bool,
    pub roles: Vec<RoleSummary>,
    pub permissions: Vec<String>,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            leeway_seconds: config.leeway_seconds,
        }
    }

    fn build_claims(&self, input: &MintInput, token_type: TokenType, ttl: Duration) -> Claims {
        let now = Utc::now();
        let skew = Duration::seconds(self.leeway_seconds / 2);
        Claims {
            sub: input.user_id.to_string(),
            username: input.username.clone(),
            is_validated: input.is_validated,
            roles: input.roles.clone(),
            permissions: input.permissions.clone(),
            token_type,
            iat: (now - skew).timestamp(),
            nbf: (now - skew).timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        }
    }

    pub fn mint_access_token(&self, input: &MintInput) -> Result<String, anyhow::Error> {
        let claims = self.build_claims(input, TokenType::Access, Duration::minutes(self.access_token_expiry_minutes));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to encode access token: {e}"))
    }

    pub fn mint_refresh_token(&self, input: &MintInput) -> Result<String, anyhow::Error> {
        let claims = self.build_claims(input, TokenType::Refresh, Duration::days(self.refresh_token_expiry_days));
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("failed to encode refresh token: {e}"))
    }

    pub fn mint_pair(&self, input: &MintInput) -> Result<TokenResponse, anyhow::Error> {
        Ok(TokenResponse {
            access_token: self.mint_access_token(input)?,
            refresh_token: self.mint_refresh_token(input)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.set_audience(&[self.audience.clone()]);
        validation.leeway = self.leeway_seconds.max(0) as u64;
        validation
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation()).map(|data| data.claims)
    }

    pub fn decode_expect(&self, token: &str, expected: TokenType) -> Result<Claims, jsonwebtoken::errors::Error> {
        let claims = self.decode(token)?;
        if claims.token_type != expected {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-at-least-this-long".to_string(),
            issuer: "aaa-service".to_string(),
            audience: "aaa-clients".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            leeway_seconds: 30,
        }
    }

    fn input() -> MintInput {
        MintInput {
            user_id: Uuid::new_v4(),
            username: Some("alice".to_string()),
            is_validated: true,
            roles: vec![RoleSummary { id: Uuid::new_v4(), name: "admin".to_string() }],
            permissions: vec!["user_read".to_string()],
        }
    }

    #[test]
    fn mints_and_decodes_an_access_token() {
        let service = JwtService::new(&config());
        let input = input();
        let token = service.mint_access_token(&input).unwrap();
        let claims = service.decode_expect(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, input.user_id.to_string());
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn rejects_wrong_token_type() {
        let service = JwtService::new(&config());
        let token = service.mint_refresh_token(&input()).unwrap();
        assert!(service.decode_expect(&token, TokenType::Access).is_err());
    }
}
