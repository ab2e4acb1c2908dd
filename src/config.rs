//! Client configuration parsed from environment variables.

use crate::error::ApiError;
use crate::gateway::BOOTSTRAP_PATHS;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_AUTH_FAILURE_STATUS: u16 = 403;
pub const DEFAULT_MAX_RENEWAL_ATTEMPTS: u32 = 4;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Rules the request pipeline applies to every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    /// Statuses treated as "credential expired".
    pub failure_statuses: Vec<u16>,
    /// Upper bound of renewals a single call may trigger.
    pub max_attempts: u32,
    /// Endpoints whose failures are returned untouched.
    pub bootstrap_paths: Vec<String>,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            failure_statuses: vec![DEFAULT_AUTH_FAILURE_STATUS],
            max_attempts: DEFAULT_MAX_RENEWAL_ATTEMPTS,
            bootstrap_paths: BOOTSTRAP_PATHS.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

impl AuthPolicy {
    #[must_use]
    pub fn is_auth_failure(&self, status: u16) -> bool {
        self.failure_statuses.contains(&status)
    }

    /// Whether `path` targets login, register or refresh.
    ///
    /// Query strings and trailing slashes are ignored.
    #[must_use]
    pub fn is_bootstrap(&self, path: &str) -> bool {
        let bare = path.split('?').next().unwrap_or(path).trim_end_matches('/');
        self.bootstrap_paths.iter().any(|p| p.trim_end_matches('/') == bare)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub policy: AuthPolicy,
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Config for `base_url` with every other setting at its default.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            policy: AuthPolicy::default(),
            timeouts: Timeouts::default(),
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `CLASSMATE_API_URL`: default `http://127.0.0.1:8080/api`
    /// - `CLASSMATE_AUTH_FAILURE_STATUSES`: comma-separated, default `403`
    /// - `CLASSMATE_MAX_RENEWAL_ATTEMPTS`: default 4
    /// - `CLASSMATE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CLASSMATE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the failure-status list is malformed.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var("CLASSMATE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let failure_statuses = parse_statuses(std::env::var("CLASSMATE_AUTH_FAILURE_STATUSES").ok().as_deref())?;
        let policy = AuthPolicy {
            failure_statuses,
            max_attempts: env_parse("CLASSMATE_MAX_RENEWAL_ATTEMPTS", DEFAULT_MAX_RENEWAL_ATTEMPTS),
            ..AuthPolicy::default()
        };
        let timeouts = Timeouts {
            request_secs: env_parse("CLASSMATE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("CLASSMATE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { policy, timeouts, ..Self::new(base_url) })
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<u16>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(vec![DEFAULT_AUTH_FAILURE_STATUS]);
    };
    let statuses = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u16>() {
            Ok(code @ 100..=599) => Ok(code),
            _ => Err(ApiError::ConfigParse(format!("invalid CLASSMATE_AUTH_FAILURE_STATUSES entry: {s}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if statuses.is_empty() {
        return Err(ApiError::ConfigParse("CLASSMATE_AUTH_FAILURE_STATUSES is empty".into()));
    }
    Ok(statuses)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
