//! # Harbor Configuration
//!
//! Settings for the backend connection, the offline store, cache tiers,
//! the interceptor and the sync coordinator.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Resolution                             │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HARBOR_BASE_URL, HARBOR_DB_PATH, HARBOR_POLL_INTERVAL_SECS,        │
//! │     HARBOR_MAX_RETRIES, HARBOR_API_TTL_SECS                            │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  2. Config File (harbor.toml)                                          │
//! │     Location: ~/.config/harbor/harbor.toml (Linux)                     │
//! │              ~/Library/Application Support/dev.harbor.harbor/ (macOS)  │
//! │              %APPDATA%\harbor\harbor\config\ (Windows)                 │
//! │                          │                                              │
//! │                          ▼                                              │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use harbor_core::routing::DEFAULT_BYPASS_PREFIXES;
use harbor_core::{
    CacheTier, Collection, DEFAULT_API_CACHE_TTL_SECS, DEFAULT_DRAIN_ATTEMPTS,
    DEFAULT_DRAIN_RETRY_DELAY_MS, DEFAULT_MAX_RECORD_RETRIES, DEFAULT_POLL_INTERVAL_SECS,
};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Backend Settings
// =============================================================================

/// Where the backend lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Origin every request target is resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Name of the session cookie the auth token travels in.
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Header carrying the CSRF token on mutations.
    #[serde(default = "default_csrf_header")]
    pub csrf_header: String,

    /// Path polled by the connectivity probe.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_session_cookie() -> String {
    "sessionid".to_string()
}

fn default_csrf_header() -> String {
    "X-CSRFToken".to_string()
}

fn default_health_path() -> String {
    "/api/health/".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            session_cookie: default_session_cookie(),
            csrf_header: default_csrf_header(),
            health_path: default_health_path(),
        }
    }
}

impl BackendSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Offline store location and pool size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Database file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

impl StoreSettings {
    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }

        directories::ProjectDirs::from("dev", "harbor", "harbor")
            .map(|dirs| dirs.data_dir().join("harbor.db"))
            .unwrap_or_else(|| PathBuf::from("harbor.db"))
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Shell assets and pages fetched into the cache at startup.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/static/manifest.json",
    "/static/favicon.ico",
    "/static/js/offline.js",
    "/static/js/offline-db.js",
    "/static/js/offline-sync.js",
    "/static/js/notifications.js",
    "/static/js/auto-save-service.js",
    "/login/",
    "/dashboard/",
    "/orders/",
    "/inventory/",
    "/customers/",
    "/sales/",
    "/track/",
    "/orders/create/",
    "/offline/",
];

/// Time-to-live per cache tier and the startup warm list.
///
/// A `None` TTL means the tier never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_api_ttl")]
    pub api_ttl_secs: Option<u64>,

    #[serde(default)]
    pub page_ttl_secs: Option<u64>,

    #[serde(default)]
    pub static_ttl_secs: Option<u64>,

    #[serde(default)]
    pub image_ttl_secs: Option<u64>,

    #[serde(default)]
    pub dynamic_ttl_secs: Option<u64>,

    /// Paths warmed once the backend is reachable. Paths without a file
    /// extension are fetched as page loads.
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,
}

fn default_api_ttl() -> Option<u64> {
    Some(DEFAULT_API_CACHE_TTL_SECS)
}

fn default_precache() -> Vec<String> {
    DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect()
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            api_ttl_secs: default_api_ttl(),
            page_ttl_secs: None,
            static_ttl_secs: None,
            image_ttl_secs: None,
            dynamic_ttl_secs: None,
            precache: default_precache(),
        }
    }
}

impl CacheSettings {
    /// TTL for entries stored under `tier`.
    pub fn ttl_for(&self, tier: CacheTier) -> Option<chrono::Duration> {
        let secs = match tier {
            CacheTier::Api => self.api_ttl_secs,
            CacheTier::Pages => self.page_ttl_secs,
            CacheTier::Static => self.static_ttl_secs,
            CacheTier::Images => self.image_ttl_secs,
            CacheTier::Dynamic => self.dynamic_ttl_secs,
        }?;
        chrono::Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }
}

// =============================================================================
// Interceptor Settings
// =============================================================================

/// Routing inputs for the interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorSettings {
    /// Prefix of the structured API surface.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Paths that always go straight to the network.
    #[serde(default = "default_bypass_prefixes")]
    pub bypass_prefixes: Vec<String>,
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_bypass_prefixes() -> Vec<String> {
    DEFAULT_BYPASS_PREFIXES.iter().map(|p| p.to_string()).collect()
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        InterceptorSettings {
            api_prefix: default_api_prefix(),
            bypass_prefixes: default_bypass_prefixes(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Endpoints business entities are POSTed to on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEndpoints {
    #[serde(default = "default_orders_endpoint")]
    pub orders: String,

    #[serde(default = "default_customers_endpoint")]
    pub customers: String,

    #[serde(default = "default_products_endpoint")]
    pub products: String,

    #[serde(default = "default_inventory_endpoint")]
    pub inventory: String,
}

fn default_orders_endpoint() -> String {
    "/api/orders/create/".to_string()
}

fn default_customers_endpoint() -> String {
    "/api/customers/".to_string()
}

fn default_products_endpoint() -> String {
    "/api/products/".to_string()
}

fn default_inventory_endpoint() -> String {
    "/api/inventory/".to_string()
}

impl Default for EntityEndpoints {
    fn default() -> Self {
        EntityEndpoints {
            orders: default_orders_endpoint(),
            customers: default_customers_endpoint(),
            products: default_products_endpoint(),
            inventory: default_inventory_endpoint(),
        }
    }
}

impl EntityEndpoints {
    /// Replay endpoint for an entity collection.
    ///
    /// `None` for collections that are not POSTed as entities.
    pub fn endpoint_for(&self, collection: Collection) -> Option<&str> {
        match collection {
            Collection::Orders => Some(&self.orders),
            Collection::Customers => Some(&self.customers),
            Collection::Products => Some(&self.products),
            Collection::Inventory => Some(&self.inventory),
            Collection::FormQueue | Collection::ApiCache => None,
        }
    }
}

/// Sync coordinator behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between drain cycles while online (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delivery attempts per record before it is dead-lettered.
    #[serde(default = "default_max_record_retries")]
    pub max_record_retries: u32,

    /// Passes per drain cycle.
    #[serde(default = "default_drain_attempts")]
    pub drain_attempts: u32,

    /// Pause between passes (milliseconds).
    #[serde(default = "default_drain_retry_delay")]
    pub drain_retry_delay_ms: u64,

    /// How long synced records are kept before purging (days).
    #[serde(default = "default_synced_retention_days")]
    pub synced_retention_days: u32,

    /// Batch endpoint for autosaved form values.
    #[serde(default = "default_autosave_path")]
    pub autosave_path: String,

    /// Health probe interval while online (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Longest wait between probes while offline (seconds).
    #[serde(default = "default_probe_max_backoff")]
    pub probe_max_backoff_secs: u64,

    #[serde(default)]
    pub endpoints: EntityEndpoints,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_max_record_retries() -> u32 {
    DEFAULT_MAX_RECORD_RETRIES
}
fn default_drain_attempts() -> u32 {
    DEFAULT_DRAIN_ATTEMPTS
}
fn default_drain_retry_delay() -> u64 {
    DEFAULT_DRAIN_RETRY_DELAY_MS
}
fn default_synced_retention_days() -> u32 {
    7
}
fn default_autosave_path() -> String {
    "/api/autosave/sync/".to_string()
}
fn default_probe_interval() -> u64 {
    15
}
fn default_probe_max_backoff() -> u64 {
    60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_interval_secs: default_poll_interval(),
            max_record_retries: default_max_record_retries(),
            drain_attempts: default_drain_attempts(),
            drain_retry_delay_ms: default_drain_retry_delay(),
            synced_retention_days: default_synced_retention_days(),
            autosave_path: default_autosave_path(),
            probe_interval_secs: default_probe_interval(),
            probe_max_backoff_secs: default_probe_max_backoff(),
            endpoints: EntityEndpoints::default(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn drain_retry_delay(&self) -> Duration {
        Duration::from_millis(self.drain_retry_delay_ms)
    }

    pub fn synced_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.synced_retention_days))
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Harbor configuration.
///
/// ## Example Config File
/// ```toml
/// [backend]
/// base_url = "https://shop.example.com"
/// session_cookie = "sessionid"
///
/// [cache]
/// api_ttl_secs = 3600
/// precache = ["/", "/dashboard/", "/static/js/offline.js"]
///
/// [interceptor]
/// bypass_prefixes = ["/login/", "/logout/", "/api/auth/"]
///
/// [sync]
/// poll_interval_secs = 30
/// max_record_retries = 3
///
/// [sync.endpoints]
/// orders = "/api/orders/create/"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarborConfig {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub interceptor: InterceptorSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl HarborConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (harbor.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let base = url::Url::parse(&self.backend.base_url)?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.sync.max_record_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_record_retries must be greater than 0".into(),
            ));
        }

        if self.sync.drain_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "drain_attempts must be greater than 0".into(),
            ));
        }

        if self.sync.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        if !self.interceptor.api_prefix.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "api_prefix must start with '/', got: {}",
                self.interceptor.api_prefix
            )));
        }

        if let Some(bad) = self
            .interceptor
            .bypass_prefixes
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(SyncError::InvalidConfig(format!(
                "bypass prefix must start with '/', got: {}",
                bad
            )));
        }

        if let Some(bad) = self.cache.precache.iter().find(|p| !p.starts_with('/')) {
            return Err(SyncError::InvalidConfig(format!(
                "precache path must start with '/', got: {}",
                bad
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HARBOR_BASE_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Ok(path) = std::env::var("HARBOR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("HARBOR_POLL_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.poll_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid HARBOR_POLL_INTERVAL_SECS"),
            }
        }

        if let Ok(retries) = std::env::var("HARBOR_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(r) => self.sync.max_record_retries = r,
                Err(_) => warn!(value = %retries, "Ignoring invalid HARBOR_MAX_RETRIES"),
            }
        }

        if let Ok(ttl) = std::env::var("HARBOR_API_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(t) => self.cache.api_ttl_secs = Some(t),
                Err(_) => warn!(value = %ttl, "Ignoring invalid HARBOR_API_TTL_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "harbor", "harbor")
            .map(|dirs| dirs.config_dir().join("harbor.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarborConfig::default();
        assert_eq!(config.sync.poll_interval_secs, 30);
        assert_eq!(config.sync.max_record_retries, 3);
        assert_eq!(config.sync.drain_attempts, 3);
        assert_eq!(config.sync.drain_retry_delay_ms, 5000);
        assert_eq!(config.cache.api_ttl_secs, Some(3600));
        assert_eq!(config.sync.endpoints.orders, "/api/orders/create/");
        assert!(config
            .interceptor
            .bypass_prefixes
            .contains(&"/api/autosave/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = HarborConfig::default();

        config.backend.base_url = "ftp://shop.example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.backend.base_url = "https://shop.example.com".into();
        config.sync.max_record_retries = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        config.sync.max_record_retries = 3;
        config.sync.drain_attempts = 0;
        assert!(config.validate().is_err());

        config.sync.drain_attempts = 3;
        config.interceptor.bypass_prefixes.push("login/".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_sections() {
        let toml_str = r#"
            [backend]
            base_url = "https://pos.example.com"

            [sync]
            max_record_retries = 5

            [sync.endpoints]
            orders = "/api/v2/orders/"
        "#;

        let config: HarborConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.base_url, "https://pos.example.com");
        assert_eq!(config.backend.session_cookie, "sessionid");
        assert_eq!(config.sync.max_record_retries, 5);
        assert_eq!(config.sync.drain_attempts, 3);
        assert_eq!(config.sync.endpoints.orders, "/api/v2/orders/");
        assert_eq!(config.sync.endpoints.customers, "/api/customers/");
    }

    #[test]
    fn test_precache_list() {
        assert!(CacheSettings::default().precache.contains(&"/offline/".to_string()));

        let config: HarborConfig = toml::from_str(
            r#"
            [cache]
            precache = ["/", "/static/app.css"]
        "#,
        )
        .unwrap();
        assert_eq!(config.cache.precache, vec!["/", "/static/app.css"]);
        assert_eq!(config.cache.api_ttl_secs, Some(3600));

        let mut config = HarborConfig::default();
        config.cache.precache.push("static/app.css".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_ttl_per_tier() {
        let cache = CacheSettings::default();
        assert_eq!(cache.ttl_for(CacheTier::Api), Some(chrono::Duration::hours(1)));
        assert_eq!(cache.ttl_for(CacheTier::Static), None);
    }

    #[test]
    fn test_endpoint_for_collection() {
        let endpoints = EntityEndpoints::default();
        assert_eq!(endpoints.endpoint_for(Collection::Inventory), Some("/api/inventory/"));
        assert_eq!(endpoints.endpoint_for(Collection::FormQueue), None);
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harbor.toml");

        let mut config = HarborConfig::default();
        config.backend.base_url = "https://till.example.com".into();
        config.sync.synced_retention_days = 30;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: HarborConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }
}
