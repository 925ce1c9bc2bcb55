use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashSet;
use std::env;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    /// Clock-skew tolerance in seconds; `iat`/`nbf` are backdated by half of this.
    pub leeway_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheTtlConfig {
    pub permission_decision_seconds: i64,
    pub user_effective_roles_seconds: i64,
    pub group_roles_seconds: i64,
    pub organization_hierarchy_seconds: i64,
    pub failed_audit_log_seconds: i64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            permission_decision_seconds: 300,
            user_effective_roles_seconds: 300,
            group_roles_seconds: 900,
            organization_hierarchy_seconds: 1800,
            failed_audit_log_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarmingConfig {
    pub interval_seconds: u64,
    pub max_concurrency: usize,
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            max_concurrency: 8,
        }
    }
}

/// Domain configuration for the AAA engine — the ambient `service_core::config::Config`
/// carries service identity/log level; this carries the engine's own knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct AaaConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub cache_ttl: CacheTtlConfig,
    #[serde(default)]
    pub warming: WarmingConfig,
    /// Role names that short-circuit authorization to allow, per the admin shortcut.
    #[serde(default = "default_admin_roles")]
    pub admin_role_names: HashSet<String>,
    /// Named permissions that short-circuit authorization to allow.
    #[serde(default = "default_admin_permissions")]
    pub admin_permission_names: HashSet<String>,
    /// Digits required for SMS/email/TOTP second-factor codes.
    #[serde(default = "default_mfa_code_length")]
    pub mfa_code_length: usize,
    /// Bound on the consistency-wait performed for `strict` tier writes.
    #[serde(default = "default_consistency_wait_ms")]
    pub consistency_wait_ms: u64,
}

fn default_admin_roles() -> HashSet<String> {
    ["super_admin", "admin", "system_admin"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_admin_permissions() -> HashSet<String> {
    ["manage", "admin", "super_admin"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_mfa_code_length() -> usize {
    6
}

fn default_consistency_wait_ms() -> u64 {
    5_000
}

impl AaaConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let config = AaaConfig {
            common,
            environment,
            jwt: JwtConfig {
                secret: core_config::Config::get_env("JWT_SECRET", "", is_prod)?,
                issuer: core_config::Config::get_env("JWT_ISSUER", "aaa-service", is_prod)?,
                audience: core_config::Config::get_env("JWT_AUDIENCE", "aaa-clients", is_prod)?,
                access_token_expiry_minutes: core_config::Config::get_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
                refresh_token_expiry_days: core_config::Config::get_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?
                .parse()
                .map_err(|e: std::num::ParseIntError| {
                    AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                })?,
                leeway_seconds: core_config::Config::get_env("JWT_LEEWAY_SECONDS", "30", is_prod)?
                    .parse()
                    .map_err(|e: std::num::ParseIntError| {
                        AppError::ConfigError(anyhow::anyhow!(e.to_string()))
                    })?,
            },
            cache_ttl: CacheTtlConfig::default(),
            warming: WarmingConfig::default(),
            admin_role_names: default_admin_roles(),
            admin_permission_names: default_admin_permissions(),
            mfa_code_length: default_mfa_code_length(),
            consistency_wait_ms: default_consistency_wait_ms(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_SECRET must be set"
            )));
        }
        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }
        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }
        if self.cache_ttl.permission_decision_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "cache TTLs must be positive"
            )));
        }
        if self.admin_role_names.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "admin_role_names must not be empty"
            )));
        }
        Ok(())
    }
}
