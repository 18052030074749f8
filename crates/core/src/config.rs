use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Default location of the routing rules document stream.
pub const DEFAULT_RULES_PATH: &str = "config/routing-rules.yml";

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub routing_rules: RoutingRulesConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GATEWAY_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GATEWAY_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            routing_rules: RoutingRulesConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  routing_rules: path={}, lock_timeout={}",
            self.routing_rules.rules_config_path.display(),
            self.routing_rules
                .lock_timeout()
                .map(|d| format!("{}ms", d.as_millis()))
                .unwrap_or_else(|| "none".to_string())
        );
    }

    /// Return the resolved settings as JSON for operators (`rules-admin config`).
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "routing_rules": {
                "path": self.routing_rules.rules_config_path,
                "lock_timeout_ms": self.routing_rules.lock_timeout_ms,
            },
        })
    }
}

// ── Routing rules ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRulesConfig {
    /// File holding the routing rules as a YAML document stream.
    pub rules_config_path: PathBuf,
    /// Upper bound on waiting for the rules file lock. `0` blocks indefinitely.
    pub lock_timeout_ms: u64,
}

impl RoutingRulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rules_config_path: PathBuf::from(profiled_env_or(p, "ROUTING_RULES_PATH", DEFAULT_RULES_PATH)),
            lock_timeout_ms: profiled_env_u64(p, "ROUTING_RULES_LOCK_TIMEOUT_MS", 0),
        }
    }

    /// The bounded lock wait, or `None` when callers should block indefinitely.
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }
}

impl Default for RoutingRulesConfig {
    fn default() -> Self {
        Self {
            rules_config_path: PathBuf::from(DEFAULT_RULES_PATH),
            lock_timeout_ms: 0,
        }
    }
}
