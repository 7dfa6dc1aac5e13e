use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Comic-Updater
///
/// Every section is optional; a missing section falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub updater: UpdaterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP client and request gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-fetch timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether redirects are followed by the client
    ///
    /// When disabled, 3xx responses count as successful fetches.
    #[serde(rename = "follow-redirects", default = "default_true")]
    pub follow_redirects: bool,

    /// Upper bound on how long a cached response may be served (hours)
    #[serde(rename = "cache-ttl-hours", default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
}

/// Page discovery tuning
#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    /// Delay before each candidate probe (milliseconds)
    #[serde(rename = "probe-delay-ms", default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    /// Delay between pages in multi-page mode (milliseconds)
    #[serde(rename = "page-delay-ms", default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// How many times verification falls back to an earlier stored page
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Similarity threshold used when clustering candidate strings
    #[serde(rename = "cluster-threshold", default = "default_cluster_threshold")]
    pub cluster_threshold: f64,

    /// Similarity threshold used to find the "next" link on the previous page
    #[serde(rename = "link-threshold", default = "default_link_threshold")]
    pub link_threshold: f64,

    /// How often the auto-update scheduler looks for due comics (seconds)
    #[serde(
        rename = "auto-check-interval-secs",
        default = "default_auto_check_interval_secs"
    )]
    pub auto_check_interval_secs: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 60 * 60)
    }
}

impl UpdaterConfig {
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn auto_check_interval(&self) -> Duration {
        Duration::from_secs(self.auto_check_interval_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            follow_redirects: true,
            cache_ttl_hours: default_cache_ttl_hours(),
        }
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            probe_delay_ms: default_probe_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            max_retries: default_max_retries(),
            cluster_threshold: default_cluster_threshold(),
            link_threshold: default_link_threshold(),
            auto_check_interval_secs: default_auto_check_interval_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_user_agent() -> String {
    format!("comic-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_probe_delay_ms() -> u64 {
    500
}

fn default_page_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_cluster_threshold() -> f64 {
    crate::similarity::DEFAULT_CLUSTER_THRESHOLD
}

fn default_link_threshold() -> f64 {
    crate::similarity::DEFAULT_LINK_THRESHOLD
}

fn default_auto_check_interval_secs() -> u64 {
    5
}

fn default_database_path() -> String {
    "./comics.db".to_string()
}
