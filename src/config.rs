use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Top-level config loaded from `sherlog.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SherlogConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub backend: BackendsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff")]
    pub retry_backoff: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_llm_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            retry_backoff: default_backoff(),
        }
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_llm_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_llm_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    /// One of `metrics-only`, `logs-only`, `combined`.
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,
    #[serde(default)]
    pub prometheus: BackendConfig,
    #[serde(default)]
    pub loki: BackendConfig,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            prometheus: BackendConfig::default(),
            loki: BackendConfig::default(),
        }
    }
}

fn default_backend_type() -> String {
    "combined".to_string()
}

/// Per-backend connection settings. Immutable once a backend is built.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Exponential backoff multiplier between retries.
    #[serde(default = "default_backoff")]
    pub retry_backoff: f64,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Extra random fraction added to each delay. 0 keeps delays exact.
    #[serde(default)]
    pub retry_jitter: f64,
    /// Overrides `cache.ttl_secs` for this backend.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_backoff: default_backoff(),
            initial_retry_delay_ms: default_initial_delay_ms(),
            max_retry_delay_ms: default_max_delay_ms(),
            retry_jitter: 0.0,
            cache_ttl_secs: None,
        }
    }
}

impl BackendConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
            .with_initial_delay(Duration::from_millis(self.initial_retry_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_retry_delay_ms))
            .with_jitter(self.retry_jitter)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> f64 {
    1.5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub store: CacheStoreKind,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Entry cap for the in-process store.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl(),
            store: CacheStoreKind::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    1800
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_max_entries() -> usize {
    crate::cache::memory::DEFAULT_MAX_ENTRIES
}

fn default_key_prefix() -> String {
    "sherlog:".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    /// Events API bot; enabled when both the signing secret and bot token are set.
    pub signing_secret: Option<String>,
    pub bot_token: Option<String>,
    #[serde(default = "default_slack_api_base")]
    pub api_base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            signing_secret: None,
            bot_token: None,
            api_base_url: default_slack_api_base(),
        }
    }
}

fn default_slack_api_base() -> String {
    crate::slack::DEFAULT_API_BASE.to_string()
}

impl SherlogConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: SherlogConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Layer environment overrides on top of the file. `lookup` is
    /// `std::env::var(..).ok()` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHERLOG_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("SHERLOG_BACKEND") {
            self.backend.backend_type = v;
        }
        if let Some(v) = lookup("PROMETHEUS_URL") {
            self.backend.prometheus.url = Some(v);
        }
        if let Some(v) = lookup("LOKI_URL") {
            self.backend.loki.url = Some(v);
        }
        if let Some(v) = lookup("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Some(v) = lookup("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("SHERLOG_CACHE_ENABLED") {
            self.cache.enabled = !matches!(v.as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(ttl) = lookup("SHERLOG_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.cache.ttl_secs = ttl;
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.cache.redis_url = v;
            self.cache.store = CacheStoreKind::Redis;
        }
        if let Some(v) = lookup("SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(v);
        }
        if let Some(v) = lookup("SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(v);
        }
        if let Some(v) = lookup("SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(v);
        }
    }

    pub fn cache_ttl_for(&self, backend: &BackendConfig) -> Duration {
        Duration::from_secs(backend.cache_ttl_secs.unwrap_or(self.cache.ttl_secs))
    }
}
