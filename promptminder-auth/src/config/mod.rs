use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Upper bound for session and invitation lifetimes.
pub const MAX_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub access: AccessConfig,
    pub lifetimes: LifetimeConfig,
    pub hosted: Option<HostedProviderConfig>,
    /// Fallback key for bearer verification when the provider secret is unset.
    pub jwt_secret: Option<Secret<String>>,
    pub base_url: String,
    pub route_guard: RouteGuardConfig,
    pub smtp: Option<SmtpConfig>,
    pub rate_limit: RateLimitConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Unset in dev means the in-memory store is used.
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub admin_usernames: Vec<String>,
    pub allowed_email_domains: Vec<String>,
    pub invite_only: bool,
}

#[derive(Debug, Clone)]
pub struct LifetimeConfig {
    pub session_ttl_days: i64,
    pub invitation_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct HostedProviderConfig {
    pub url: String,
    pub anon_key: Secret<String>,
    pub jwt_secret: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct RouteGuardConfig {
    pub protected_prefixes: Vec<String>,
    pub sign_in_path: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: Secret<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub email_attempts: u32,
    pub email_window_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let hosted = match (get_optional_env("SUPABASE_URL"), get_optional_env("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(HostedProviderConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key: Secret::new(anon_key),
                jwt_secret: get_optional_env("SUPABASE_JWT_SECRET").map(Secret::new),
            }),
            _ => None,
        };

        let smtp = match get_optional_env("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", None, is_prod)?),
                from: get_env("SMTP_FROM", None, is_prod)?,
            }),
            None => None,
        };

        let database_url = if is_prod {
            Some(get_env("DATABASE_URL", None, is_prod)?)
        } else {
            get_optional_env("DATABASE_URL")
        };

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("promptminder-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: database_url.map(Secret::new),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            },
            access: AccessConfig {
                admin_usernames: split_list(&get_env("ADMIN_USERNAMES", Some(""), false)?),
                allowed_email_domains: split_list(&get_env(
                    "NEXT_PUBLIC_ALLOWED_EMAIL_DOMAINS",
                    Some("dev.zo"),
                    false,
                )?),
                invite_only: parse_env("INVITE_ONLY", "false", false)?,
            },
            lifetimes: LifetimeConfig {
                session_ttl_days: parse_env("SESSION_TTL_DAYS", "7", false)?,
                invitation_ttl_days: parse_env("INVITATION_TTL_DAYS", "7", false)?,
            },
            hosted,
            jwt_secret: get_optional_env("JWT_SECRET").map(Secret::new),
            base_url: get_env("BASE_URL", Some("http://localhost:3000"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            route_guard: RouteGuardConfig {
                protected_prefixes: split_list(&get_env(
                    "PROTECTED_PATH_PREFIXES",
                    Some("/prompts,/teams"),
                    false,
                )?),
                sign_in_path: get_env("SIGN_IN_PATH", Some("/sign-in"), false)?,
            },
            smtp,
            rate_limit: RateLimitConfig {
                email_attempts: parse_env("RATE_LIMIT_EMAIL_ATTEMPTS", "5", false)?,
                email_window_seconds: parse_env("RATE_LIMIT_EMAIL_WINDOW_SECONDS", "3600", false)?,
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10", false)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", false)?,
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if !(1..=MAX_TTL_DAYS).contains(&self.lifetimes.session_ttl_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_TTL_DAYS must be between 1 and {}",
                MAX_TTL_DAYS
            )));
        }

        if !(1..=MAX_TTL_DAYS).contains(&self.lifetimes.invitation_ttl_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "INVITATION_TTL_DAYS must be between 1 and {}",
                MAX_TTL_DAYS
            )));
        }

        if self.rate_limit.email_attempts == 0 || self.rate_limit.login_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Rate limit attempts must be greater than 0"
            )));
        }

        if !self.route_guard.sign_in_path.starts_with('/') {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SIGN_IN_PATH must start with '/'"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.secure_cookies() {
                tracing::warn!("BASE_URL is not https in production; cookies will not be marked secure");
            }

            if self.bearer_secret().is_none() {
                tracing::warn!("No JWT secret configured; bearer sessions will not authenticate");
            }
        }

        Ok(())
    }

    /// Cookies carry `Secure` when the public URL is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Key used to verify bearer tokens: the provider secret, else `JWT_SECRET`.
    pub fn bearer_secret(&self) -> Option<&str> {
        self.hosted
            .as_ref()
            .and_then(|h| h.jwt_secret.as_ref())
            .or(self.jwt_secret.as_ref())
            .map(|s| s.expose_secret().as_str())
    }
}

impl Default for AuthConfig {
    /// Local development settings: in-memory store, no hosted provider, no SMTP.
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "promptminder-auth".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            access: AccessConfig {
                admin_usernames: Vec::new(),
                allowed_email_domains: vec!["dev.zo".to_string()],
                invite_only: false,
            },
            lifetimes: LifetimeConfig {
                session_ttl_days: 7,
                invitation_ttl_days: 7,
            },
            hosted: None,
            jwt_secret: None,
            base_url: "http://localhost:3000".to_string(),
            route_guard: RouteGuardConfig {
                protected_prefixes: vec!["/prompts".to_string(), "/teams".to_string()],
                sign_in_path: "/sign-in".to_string(),
            },
            smtp: None,
            rate_limit: RateLimitConfig {
                email_attempts: 5,
                email_window_seconds: 3600,
                login_attempts: 10,
                login_window_seconds: 900,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

/// Comma-separated list, trimmed, empty entries dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_drops_empty_entries() {
        assert_eq!(
            split_list(" alice, ,bob@corp.com ,"),
            vec!["alice".to_string(), "bob@corp.com".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_secure_cookies_follow_base_url() {
        let mut config = AuthConfig::default();
        assert!(!config.secure_cookies());

        config.base_url = "https://promptminder.dev.zo".to_string();
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_bearer_secret_prefers_provider_secret() {
        let mut config = AuthConfig::default();
        assert_eq!(config.bearer_secret(), None);

        config.jwt_secret = Some(Secret::new("fallback".to_string()));
        assert_eq!(config.bearer_secret(), Some("fallback"));

        config.hosted = Some(HostedProviderConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: Secret::new("anon".to_string()),
            jwt_secret: Some(Secret::new("provider".to_string())),
        });
        assert_eq!(config.bearer_secret(), Some("provider"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_sign_in_path() {
        let mut config = AuthConfig::default();
        config.route_guard.sign_in_path = "sign-in".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_lifetimes() {
        let mut config = AuthConfig::default();
        config.lifetimes.session_ttl_days = 100_000;
        assert!(config.validate().is_err());

        let mut config = AuthConfig::default();
        config.lifetimes.invitation_ttl_days = MAX_TTL_DAYS + 1;
        assert!(config.validate().is_err());

        let mut config = AuthConfig::default();
        config.lifetimes.session_ttl_days = MAX_TTL_DAYS;
        config.lifetimes.invitation_ttl_days = MAX_TTL_DAYS;
        assert!(config.validate().is_ok());
    }
}
