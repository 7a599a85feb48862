use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ConfigError;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "audit-gateway")]
#[command(about = "Reverse proxy that audits chat completions before forwarding")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Path prefix under which proxied requests live
    #[arg(long, env = "PROXY_PREFIX", default_value = "/proxy")]
    pub prefix: String,

    // Route table as a JSON array of site configs
    // Example: '[{"path":"openai","baseOrigin":"https://api.openai.com"}]'
    #[arg(long, env = "PROXY_ROUTES", default_value = "[]")]
    pub routes: String,

    // Base URL of the content classifier, audit is skipped when unset
    #[arg(long, env = "CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    // Secret used to seal credentials and transcripts in notices
    #[arg(long, env = "NOTIFY_SECRET", hide_env_values = true)]
    pub notify_secret: Option<String>,

    // Webhook receiving violation notices, notices are logged when unset
    #[arg(long, env = "NOTIFY_WEBHOOK_URL")]
    pub notify_webhook: Option<String>,

    // Sweep interval for expired counters and bans, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval: u64,

    // Upper bound on a buffered (audited) request body
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_body_bytes: usize,
}

pub const DEFAULT_RATE_LIMIT: u32 = 120;
pub const DEFAULT_AUDIT_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_AUDIT_PARAMETER: &str = "messages";
pub const DEFAULT_MAX_VIOLATIONS: u32 = 12;
pub const DEFAULT_VIOLATION_WINDOW_MINUTES: u64 = 60;
pub const DEFAULT_BAN_DURATION_MINUTES: u64 = 60;
// one year
pub const MAX_CONFIG_MINUTES: u64 = 365 * 24 * 60;

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

fn default_audit_path() -> String {
    DEFAULT_AUDIT_PATH.to_string()
}

fn default_audit_parameter() -> String {
    DEFAULT_AUDIT_PARAMETER.to_string()
}

fn default_max_violations() -> u32 {
    DEFAULT_MAX_VIOLATIONS
}

fn default_violation_window() -> u64 {
    DEFAULT_VIOLATION_WINDOW_MINUTES
}

fn default_ban_duration() -> u64 {
    DEFAULT_BAN_DURATION_MINUTES
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub path: String,
    pub base_origin: String,
    // requests per minute, 0 = unlimited
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_audit_path")]
    pub audit_path: String,
    #[serde(default = "default_audit_parameter")]
    pub audit_parameter: String,
    // 0 disables ban tracking for this route
    #[serde(default = "default_max_violations")]
    pub max_violations: u32,
    #[serde(default = "default_violation_window")]
    pub violation_window_minutes: u64,
    #[serde(default = "default_ban_duration")]
    pub ban_duration_minutes: u64,
}

impl SiteConfig {
    pub fn for_origin(origin: &str) -> Self {
        Self {
            path: String::new(),
            base_origin: origin.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            audit_path: default_audit_path(),
            audit_parameter: default_audit_parameter(),
            max_violations: DEFAULT_MAX_VIOLATIONS,
            violation_window_minutes: DEFAULT_VIOLATION_WINDOW_MINUTES,
            ban_duration_minutes: DEFAULT_BAN_DURATION_MINUTES,
        }
    }

    // clamped, so a hand-built config can't overflow an Instant
    pub fn violation_window(&self) -> Duration {
        minutes(self.violation_window_minutes)
    }

    pub fn ban_duration(&self) -> Duration {
        minutes(self.ban_duration_minutes)
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.min(MAX_CONFIG_MINUTES) * 60)
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    by_path: HashMap<String, SiteConfig>,
    // load order, so origin lookups pick the first configured route
    order: Vec<String>,
}

impl RouteTable {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let sites: Vec<SiteConfig> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_sites(sites)
    }

    pub fn from_sites(sites: Vec<SiteConfig>) -> Result<Self, ConfigError> {
        let mut table = RouteTable::default();

        for mut site in sites {
            if site.path.is_empty() || site.path.contains('/') {
                return Err(ConfigError::InvalidPath(site.path));
            }
            site.base_origin = validate_origin(&site.base_origin)?;
            check_minutes(&site)?;

            if table.by_path.contains_key(&site.path) {
                return Err(ConfigError::DuplicateRoute(site.path));
            }
            table.order.push(site.path.clone());
            table.by_path.insert(site.path.clone(), site);
        }

        Ok(table)
    }

    // exact, case-sensitive lookup
    pub fn get(&self, path: &str) -> Option<&SiteConfig> {
        self.by_path.get(path)
    }

    pub fn find_by_origin(&self, origin: &str) -> Option<&SiteConfig> {
        self.order
            .iter()
            .filter_map(|p| self.by_path.get(p))
            .find(|site| site.base_origin == origin)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.order.iter().filter_map(|p| self.by_path.get(p))
    }
}

fn validate_origin(raw: &str) -> Result<String, ConfigError> {
    let url = reqwest::Url::parse(raw.trim_end_matches('/'))
        .map_err(|_| ConfigError::InvalidOrigin(raw.to_string()))?;

    let scheme_ok = matches!(url.scheme(), "http" | "https");
    if !scheme_ok || url.host_str().is_none() {
        return Err(ConfigError::InvalidOrigin(raw.to_string()));
    }
    // keep a base path if one was configured
    let path = url.path().trim_end_matches('/');
    Ok(format!("{}{}", canonical_origin(&url), path))
}

// lowercase scheme and host, default port dropped: one spelling per upstream
pub fn canonical_origin(url: &reqwest::Url) -> String {
    url.origin().ascii_serialization()
}

fn check_minutes(site: &SiteConfig) -> Result<(), ConfigError> {
    for (field, value) in [
        ("violationWindowMinutes", site.violation_window_minutes),
        ("banDurationMinutes", site.ban_duration_minutes),
    ] {
        if value > MAX_CONFIG_MINUTES {
            return Err(ConfigError::OutOfRange {
                field,
                value,
                max: MAX_CONFIG_MINUTES,
            });
        }
    }
    Ok(())
}

impl Args {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    // prefix normalised to "/name" with no trailing slash
    pub fn normalized_prefix(&self) -> String {
        normalize_prefix(&self.prefix)
    }
}

pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
