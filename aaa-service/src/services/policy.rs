//! Second-factor dispatch (spec.md §4.2.1). Shaped like the teacher's
//! `PolicyService` — a stateless service struct with associated functions —
//! applied to MFA verification instead of password-policy checks.

use serde::Deserialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::ports::CachePort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaFailureReason {
    NoRecordConfigured,
    CodeMismatch,
    MalformedCode,
    UnknownMethod,
}

#[derive(Debug, Deserialize)]
struct MfaRecord {
    #[serde(rename = "type")]
    method: String,
}

pub struct PolicyService;

impl PolicyService {
    /// Dispatches second-factor verification per the `mfa:{user_id}` record.
    /// Always returns a bare pass/fail — callers must surface the uniform
    /// "invalid MFA code" message regardless of `MfaFailureReason`.
    pub async fn verify_second_factor(
        cache: &dyn CachePort,
        user_id: Uuid,
        provided_code: &str,
        code_length: usize,
    ) -> Result<Result<(), MfaFailureReason>, anyhow::Error> {
        let Some(record) = cache.get(&format!("mfa:{user_id}")).await? else {
            return Ok(Err(MfaFailureReason::NoRecordConfigured));
        };
        let record: MfaRecord = serde_json::from_value(record)
            .map_err(|e| anyhow::anyhow!("malformed mfa record: {e}"))?;

        match record.method.as_str() {
            "totp" => Ok(Self::verify_totp_placeholder(provided_code, code_length)),
            "sms" => Ok(Self::verify_cache_code(cache, &format!("sms_code:{user_id}"), provided_code).await?),
            "email" => Ok(Self::verify_cache_code(cache, &format!("email_code:{user_id}"), provided_code).await?),
            _ => Ok(Err(MfaFailureReason::UnknownMethod)),
        }
    }

    /// Placeholder TOTP: accepts any syntactically-valid code of the
    /// configured length. A real implementation fetches the user's TOTP
    /// secret and compares against ±1 step windows — left as the documented
    /// open question (spec.md §9).
    fn verify_totp_placeholder(provided_code: &str, code_length: usize) -> Result<(), MfaFailureReason> {
        if provided_code.len() == code_length && provided_code.chars().all(|c| c.is_ascii_digit()) {
            Ok(())
        } else {
            Err(MfaFailureReason::MalformedCode)
        }
    }

    async fn verify_cache_code(
        cache: &dyn CachePort,
        key: &str,
        provided_code: &str,
    ) -> Result<Result<(), MfaFailureReason>, anyhow::Error> {
        let Some(value) = cache.get(key).await? else {
            return Ok(Err(MfaFailureReason::NoRecordConfigured));
        };
        let Some(expected) = value.as_str() else {
            return Ok(Err(MfaFailureReason::MalformedCode));
        };
        let matches = expected.len() == provided_code.len()
            && bool::from(expected.as_bytes().ct_eq(provided_code.as_bytes()));
        if matches {
            cache.delete(key).await?;
            Ok(Ok(()))
        } else {
            Ok(Err(MfaFailureReason::CodeMismatch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryCache;
    use serde_json::json;

    #[tokio::test]
    async fn sms_code_matches_and_is_consumed() {
        let cache = InMemoryCache::new();
        let user_id = Uuid::new_v4();
        cache.set(&format!("mfa:{user_id}"), json!({"type": "sms"}), 300).await.unwrap();
        cache.set(&format!("sms_code:{user_id}"), json!("123456"), 300).await.unwrap();

        let result = PolicyService::verify_second_factor(&cache, user_id, "123456", 6).await.unwrap();
        assert!(result.is_ok());
        assert!(cache.get(&format!("sms_code:{user_id}")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_mfa_record_fails() {
        let cache = InMemoryCache::new();
        let result = PolicyService::verify_second_factor(&cache, Uuid::new_v4(), "123456", 6).await.unwrap();
        assert_eq!(result.unwrap_err(), MfaFailureReason::NoRecordConfigured);
    }

    #[tokio::test]
    async fn totp_placeholder_accepts_any_well_formed_code() {
        let cache = InMemoryCache::new();
        let user_id = Uuid::new_v4();
        cache.set(&format!("mfa:{user_id}"), json!({"type": "totp"}), 300).await.unwrap();
        assert!(PolicyService::verify_second_factor(&cache, user_id, "000000", 6).await.unwrap().is_ok());
        assert!(PolicyService::verify_second_factor(&cache, user_id, "abcdef", 6).await.unwrap().is_err());
    }
}
