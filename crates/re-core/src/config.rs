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

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub broker: BrokerConfig,
    pub ingress: IngressConfig,
    pub throttle: ThrottleConfig,
    pub scheduler: SchedulerConfig,
    pub smtp: SmtpConfig,
    pub rules: RulesConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &[
    "RE_BROKER_FRONTEND",
    "SMTP_HOST",
    "RE_RULES_DIR",
    "PG_HOST",
];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RE_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            broker: BrokerConfig::from_env_profiled(p),
            ingress: IngressConfig::from_env_profiled(p),
            throttle: ThrottleConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            rules: RulesConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  broker:    frontend={}, backend={}", self.broker.frontend, self.broker.backend);
        tracing::info!("  ingress:   max_payload_bytes={}", self.ingress.max_payload_bytes);
        tracing::info!("  throttle:  rate/s={}, loop_threshold={}", self.throttle.rate_per_second, self.throttle.loop_threshold);
        tracing::info!("  scheduler: tick={}s", self.scheduler.tick_interval.as_secs());
        tracing::info!("  smtp:      host={}, configured={}", self.smtp.host, self.smtp.is_configured());
        tracing::info!("  rules:     dir={}", self.rules.dir.display());
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "broker": { "frontend": self.broker.frontend, "backend": self.broker.backend },
            "ingress": { "max_payload_bytes": self.ingress.max_payload_bytes },
            "throttle": {
                "rate_per_second": self.throttle.rate_per_second,
                "loop_threshold": self.throttle.loop_threshold,
                "loop_window_secs": self.throttle.loop_window.as_secs(),
            },
            "scheduler": { "tick_secs": self.scheduler.tick_interval.as_secs() },
            "smtp": { "host": self.smtp.host, "port": self.smtp.port, "configured": self.smtp.is_configured() },
            "rules": { "dir": self.rules.dir, "hot_reload": self.rules.hot_reload },
        })
    }
}

// ── Broker (ZeroMQ pub/sub endpoints) ────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Endpoint the engine subscribes to device telemetry on.
    pub frontend: String,
    /// Endpoint the engine publishes dispatched output on.
    pub backend: String,
}

impl BrokerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            frontend: profiled_env_or(p, "RE_BROKER_FRONTEND", "tcp://127.0.0.1:5555"),
            backend: profiled_env_or(p, "RE_BROKER_BACKEND", "tcp://127.0.0.1:5556"),
        }
    }
}

// ── Ingress ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    pub max_payload_bytes: usize,
    /// Bounded inbound queue capacity per rule worker.
    pub worker_queue_capacity: usize,
}

impl IngressConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_payload_bytes: profiled_env_u64(p, "RE_PAYLOAD_MAX_BYTES", crate::message::MAX_PAYLOAD_BYTES as u64) as usize,
            worker_queue_capacity: profiled_env_u32(p, "RE_WORKER_QUEUE_CAPACITY", 100) as usize,
        }
    }
}

// ── Throttle / loop guard ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub rate_per_second: u32,
    pub loop_threshold: u32,
    pub loop_window: Duration,
}

impl ThrottleConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rate_per_second: profiled_env_u32(p, "RE_THROTTLE_RATE", 10),
            loop_threshold: profiled_env_u32(p, "RE_THROTTLE_LOOP_THRESHOLD", 5),
            loop_window: Duration::from_secs(profiled_env_u64(p, "RE_THROTTLE_LOOP_WINDOW_SECS", 60)),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tick_interval: Duration::from_secs(profiled_env_u64(p, "RE_SCHEDULER_TICK_SECS", 60)),
        }
    }
}

// ── SMTP (email output) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "SMTP_HOST", "localhost"),
            port: profiled_env_u16(p, "SMTP_PORT", 587),
            username: profiled_env_opt(p, "SMTP_USERNAME"),
            password: profiled_env_opt(p, "SMTP_PASSWORD"),
            from_address: profiled_env_or(p, "SMTP_FROM", "rules-engine@localhost"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

// ── Rules (repository) ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub dir: PathBuf,
    pub hot_reload: bool,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "RE_RULES_DIR", "rules")),
            hot_reload: profiled_env_bool(p, "RE_RULES_HOT_RELOAD", true),
        }
    }
}
