//! Configuration management for the agent mail router.
//!
//! Every knob is read from the environment once at startup via
//! [`Config::from_env`]; business logic never calls `std::env::var` directly.

use std::env;

/// Registration policy for new agents and DID:web shadow agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    Open,
    ApprovalRequired,
}

impl RegistrationPolicy {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "approval_required" | "approval-required" => Self::ApprovalRequired,
            _ => Self::Open,
        }
    }

    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Process-wide configuration, loaded once from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sweep tick interval (`CLEANUP_INTERVAL_MS`).
    pub cleanup_interval_ms: u64,
    /// Heartbeat timeout before an agent flips offline (`HEARTBEAT_TIMEOUT_MS`).
    pub heartbeat_timeout_ms: u64,
    /// Default message TTL when none is supplied (`MESSAGE_TTL_SEC`).
    pub message_ttl_sec: u64,
    /// Whether API-key auth is enforced at all (`API_KEY_REQUIRED`).
    pub api_key_required: bool,
    /// The operator master key, compared in constant time (`MASTER_API_KEY`).
    pub master_api_key: Option<String>,
    /// Open or approval-gated registration (`REGISTRATION_POLICY`).
    pub registration_policy: RegistrationPolicy,
    /// `did:web` domain allowlist; empty means "any public domain"
    /// (`DID_WEB_ALLOWED_DOMAINS`).
    pub did_web_allowed_domains: Vec<String>,
    /// How long a resolved round table lingers after expiry/resolution
    /// before sweep purge (`ROUND_TABLE_PURGE_TTL_MS`).
    pub round_table_purge_ttl_ms: u64,
    /// Default visibility timeout for `pull`, in seconds. Not externally
    /// configured by the spec but kept as a typed constant rather than a
    /// magic number sprinkled through the inbox engine.
    pub default_visibility_timeout_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 60_000,
            heartbeat_timeout_ms: 300_000,
            message_ttl_sec: 86_400,
            api_key_required: false,
            master_api_key: None,
            registration_policy: RegistrationPolicy::Open,
            did_web_allowed_domains: Vec::new(),
            round_table_purge_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            default_visibility_timeout_sec: 60,
        }
    }
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// the documented defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.cleanup_interval_ms =
            env_u64("CLEANUP_INTERVAL_MS", config.cleanup_interval_ms);
        config.heartbeat_timeout_ms =
            env_u64("HEARTBEAT_TIMEOUT_MS", config.heartbeat_timeout_ms);
        config.message_ttl_sec = env_u64("MESSAGE_TTL_SEC", config.message_ttl_sec);
        config.api_key_required = env_bool("API_KEY_REQUIRED", config.api_key_required);
        config.master_api_key = env_value("MASTER_API_KEY");
        if let Some(v) = env_value("REGISTRATION_POLICY") {
            config.registration_policy = RegistrationPolicy::parse(&v);
        }
        if let Some(v) = env_value("DID_WEB_ALLOWED_DOMAINS") {
            config.did_web_allowed_domains = parse_csv(&v);
        }
        config.round_table_purge_ttl_ms = env_u64(
            "ROUND_TABLE_PURGE_TTL_MS",
            config.round_table_purge_ttl_ms,
        );

        config
    }
}

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<std::collections::HashMap<String, String>> =
        std::cell::RefCell::new(std::collections::HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v).filter(|v| !v.is_empty());
    }
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
