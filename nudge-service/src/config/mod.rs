use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct NudgeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub smtp: SmtpConfig,
    /// Name used in the From header when a workspace has no name of its own.
    pub from_name: String,
    pub cron: CronConfig,
    pub reminders: ReminderConfig,
    pub rate_limit: RateLimitConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronConfig {
    /// Shared secret for `/api/cron/reminders`. Empty disables the endpoint.
    pub secret: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReminderConfig {
    pub stale_after_days: i64,
    pub grace_days: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 180,
            grace_days: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub backend: RateLimitBackend,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity provider's admin API. Unset disables reply-to
    /// lookups.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

impl NudgeConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let backend = match get_env("RATE_LIMIT_BACKEND", Some("memory"), false)?
            .to_lowercase()
            .as_str()
        {
            "redis" => RateLimitBackend::Redis,
            "memory" => RateLimitBackend::Memory,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "RATE_LIMIT_BACKEND must be 'memory' or 'redis', got '{}'",
                    other
                )))
            }
        };

        let config = NudgeConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("nudge_db"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env("SMTP_PORT", Some("587"), is_prod)?
                    .parse()
                    .unwrap_or(587),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("reminders@nudge.local"), is_prod)?,
                enabled: env::var("SMTP_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            from_name: get_env("SMTP_FROM_NAME", Some("Nudge"), false)?,
            cron: CronConfig {
                secret: get_env("CRON_SECRET", Some(""), is_prod)?,
            },
            reminders: ReminderConfig {
                stale_after_days: parse_days("REMINDER_STALE_AFTER_DAYS", 180)?,
                grace_days: parse_days("REMINDER_GRACE_DAYS", 0)?,
            },
            rate_limit: RateLimitConfig {
                per_minute: get_env("RATE_LIMIT_PER_MINUTE", Some("30"), false)?
                    .parse()
                    .unwrap_or(30),
                backend,
                redis_url: env::var("REDIS_URL").ok(),
            },
            identity: IdentityConfig {
                api_url: env::var("IDENTITY_API_URL").ok().filter(|v| !v.is_empty()),
                api_key: env::var("IDENTITY_API_KEY").ok().filter(|v| !v.is_empty()),
            },
        };

        if config.rate_limit.backend == RateLimitBackend::Redis
            && config.rate_limit.redis_url.is_none()
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REDIS_URL is required when RATE_LIMIT_BACKEND=redis"
            )));
        }

        Ok(config)
    }
}

fn parse_days(key: &str, default: i64) -> Result<i64, AppError> {
    let raw = get_env(key, Some(&default.to_string()), false)?;
    match raw.trim().parse::<i64>() {
        Ok(days) if days >= 0 => Ok(days),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a non-negative number of days, got '{}'",
            key,
            raw
        ))),
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_default_outside_prod() {
        let value = get_env("NUDGE_TEST_SURELY_UNSET_KEY", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_get_env_required_in_prod() {
        let err = get_env("NUDGE_TEST_SURELY_UNSET_KEY", Some("fallback"), true).unwrap_err();
        assert!(err.to_string().contains("required in production"));
    }

    #[test]
    fn test_parse_days_uses_default() {
        assert_eq!(parse_days("NUDGE_TEST_UNSET_DAYS", 180).unwrap(), 180);
    }

    #[test]
    fn test_reminder_defaults() {
        let defaults = ReminderConfig::default();
        assert_eq!(defaults.stale_after_days, 180);
        assert_eq!(defaults.grace_days, 0);
    }
}
