//! # Core Configuration Module
//!
//! Provides configuration management for the media core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every dependency and setting the core needs. `build()` validates
//! eagerly so a misconfigured host fails at startup instead of in the middle
//! of a scan or a download.
//!
//! ## Sections
//!
//! - database path for the SQLite store
//! - [`MetadataApiConfig`] for the external catalog service
//! - [`NodeIdentity`] describing this node to federated peers
//! - [`FederationConfig`] timeouts and download progress granularity
//! - [`SyncSettings`] for library scanning
//! - an `HttpClient` bridge (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, a `ReqwestHttpClient` is
//! injected automatically if no client was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, MetadataApiConfig, NodeIdentity};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/mediahub/library.db")
//!     .metadata_api_config(MetadataApiConfig::new().with_api_key("tmdb-token"))
//!     .node_identity(NodeIdentity::new("living-room", "http://10.0.0.5:8080"))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default inter-call delay for the catalog service.
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 250;

/// Default catalog endpoint.
pub const DEFAULT_METADATA_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Media extensions recognised by the scanner out of the box.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "avi", "mov", "wmv", "webm", "ts", "m2ts", "mpg", "mpeg", "flv",
];

/// Core configuration for the media core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client used by the catalog and federation clients
    pub http_client: Arc<dyn HttpClient>,

    /// External catalog configuration
    pub metadata_api_config: MetadataApiConfig,

    /// How this node introduces itself to peers
    pub node_identity: NodeIdentity,

    /// Peer communication settings
    pub federation: FederationConfig,

    /// Library scanning settings
    pub sync: SyncSettings,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("metadata_api_config", &self.metadata_api_config)
            .field("node_identity", &self.node_identity)
            .field("federation", &self.federation)
            .field("sync", &self.sync)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Configuration for the external metadata catalog.
///
/// # Security Note
///
/// API keys should never be hardcoded. Load them from the environment
/// ([`CoreConfigBuilder::from_env`]) or from the host's secret storage.
#[derive(Clone, PartialEq, Eq)]
pub struct MetadataApiConfig {
    /// Bearer token for the catalog API
    pub api_key: Option<String>,

    /// Base URL of the catalog API, without trailing slash
    pub base_url: String,

    /// Preferred metadata language (e.g. "en-US")
    pub language: String,

    /// Minimum delay between two catalog requests in milliseconds
    pub rate_limit_delay_ms: u64,
}

impl MetadataApiConfig {
    /// Creates a config pointing at the public catalog with no key configured
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            language: "en-US".to_string(),
            rate_limit_delay_ms: DEFAULT_RATE_LIMIT_DELAY_MS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.api_key {
            if key.trim().is_empty() {
                return Err(Error::Config("Metadata API key cannot be empty".to_string()));
            }
        }

        validate_http_url("Metadata base URL", &self.base_url)?;

        if self.language.trim().is_empty() {
            return Err(Error::Config("Metadata language cannot be empty".to_string()));
        }

        if self.rate_limit_delay_ms > 60_000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for MetadataApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .finish()
    }
}

/// Identity this node presents during the registration handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Display name shown on peers
    pub name: String,

    /// URL under which peers can reach this node
    pub url: String,

    /// Key peers must present when calling this node
    pub api_key: Option<String>,
}

impl NodeIdentity {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("Node name cannot be empty".to_string()));
        }
        validate_http_url("Node URL", &self.url)
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new("mediahub", "http://localhost:8080")
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Timeouts and transfer settings for peer communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationConfig {
    /// Bound on the health probe used by node validation
    pub validate_timeout: Duration,

    /// Timeout for registration and catalog requests
    pub request_timeout: Duration,

    /// Timeout for a whole file transfer
    pub download_timeout: Duration,

    /// Bytes written between two download payload updates
    pub download_progress_interval_bytes: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            validate_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(6 * 60 * 60),
            download_progress_interval_bytes: 1024 * 1024,
        }
    }
}

impl FederationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.validate_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Federation timeouts must be greater than zero".to_string(),
            ));
        }
        if self.download_timeout < self.request_timeout {
            return Err(Error::Config(
                "Download timeout must not be shorter than the request timeout".to_string(),
            ));
        }
        if self.download_progress_interval_bytes == 0 {
            return Err(Error::Config(
                "Download progress interval must be greater than 0 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Library scanning settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Lowercase file extensions (without dot) treated as media
    pub media_extensions: Vec<String>,

    /// Number of leading bytes hashed into a file fingerprint
    pub fingerprint_sample_bytes: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            fingerprint_sample_bytes: 64 * 1024,
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.media_extensions.is_empty() {
            return Err(Error::Config(
                "At least one media extension must be configured".to_string(),
            ));
        }
        if self
            .media_extensions
            .iter()
            .any(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(Error::Config(
                "Media extensions must be non-empty and given without a leading dot".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_http_url(label: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", label, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "{} must use http or https, got '{}'",
            label, other
        ))),
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.metadata_api_config.validate()?;
        self.node_identity.validate()?;
        self.federation.validate()?;
        self.sync.validate()?;

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new().map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for catalog and peer requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject an implementation with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    metadata_api_config: Option<MetadataApiConfig>,
    node_identity: Option<NodeIdentity>,
    federation: Option<FederationConfig>,
    sync: Option<SyncSettings>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Seeds a builder from `MEDIAHUB_*` environment variables.
    ///
    /// Recognised variables: `MEDIAHUB_DATABASE_PATH`, `MEDIAHUB_TMDB_API_KEY`,
    /// `MEDIAHUB_TMDB_BASE_URL`, `MEDIAHUB_NODE_NAME`, `MEDIAHUB_NODE_URL`,
    /// `MEDIAHUB_NODE_API_KEY`. Unset variables leave the defaults in place.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(path) = lookup("MEDIAHUB_DATABASE_PATH") {
            builder = builder.database_path(path);
        }

        let mut metadata = MetadataApiConfig::new();
        if let Some(key) = lookup("MEDIAHUB_TMDB_API_KEY") {
            metadata = metadata.with_api_key(key);
        }
        if let Some(base_url) = lookup("MEDIAHUB_TMDB_BASE_URL") {
            metadata = metadata.with_base_url(base_url);
        }
        builder = builder.metadata_api_config(metadata);

        let defaults = NodeIdentity::default();
        let mut identity = NodeIdentity::new(
            lookup("MEDIAHUB_NODE_NAME").unwrap_or(defaults.name),
            lookup("MEDIAHUB_NODE_URL").unwrap_or(defaults.url),
        );
        if let Some(key) = lookup("MEDIAHUB_NODE_API_KEY") {
            identity = identity.with_api_key(key);
        }
        builder.node_identity(identity)
    }

    /// Sets the database file path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Injects the HTTP client bridge.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn metadata_api_config(mut self, config: MetadataApiConfig) -> Self {
        self.metadata_api_config = Some(config);
        self
    }

    pub fn node_identity(mut self, identity: NodeIdentity) -> Self {
        self.node_identity = Some(identity);
        self
    }

    pub fn federation(mut self, federation: FederationConfig) -> Self {
        self.federation = Some(federation);
        self
    }

    pub fn sync_settings(mut self, sync: SyncSettings) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - the database path is missing
    /// - no `HttpClient` was injected and no default is available
    /// - any section fails validation
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            database_path,
            http_client,
            metadata_api_config: self.metadata_api_config.unwrap_or_default(),
            node_identity: self.node_identity.unwrap_or_default(),
            federation: self.federation.unwrap_or_default(),
            sync: self.sync.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(256),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse, HttpStream};
    use std::collections::HashMap;

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            unimplemented!("not used in config tests")
        }

        async fn download_stream(&self, _request: HttpRequest) -> BridgeResult<HttpStream> {
            unimplemented!("not used in config tests")
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder().http_client(Arc::new(NoopHttpClient))
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = builder().build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Database path is required"));
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = builder().database_path("/data/library.db").build().unwrap();

        assert_eq!(config.database_path, PathBuf::from("/data/library.db"));
        assert_eq!(
            config.metadata_api_config.rate_limit_delay_ms,
            DEFAULT_RATE_LIMIT_DELAY_MS
        );
        assert_eq!(config.federation, FederationConfig::default());
        assert!(config
            .sync
            .media_extensions
            .iter()
            .any(|ext| ext == "mkv"));
        assert_eq!(config.event_buffer_size, 256);
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let err = CoreConfig::builder()
            .database_path("/data/library.db")
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMissing { .. }));
        assert!(err.to_string().contains("HttpClient"));
    }

    #[test]
    fn test_invalid_node_url_rejected() {
        let err = builder()
            .database_path("/data/library.db")
            .node_identity(NodeIdentity::new("den", "ftp://10.0.0.2"))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_empty_node_name_rejected() {
        let err = builder()
            .database_path("/data/library.db")
            .node_identity(NodeIdentity::new("  ", "http://10.0.0.2"))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("Node name"));
    }

    #[test]
    fn test_metadata_config_validation() {
        assert!(MetadataApiConfig::new().validate().is_ok());
        assert!(MetadataApiConfig::new().with_api_key("").validate().is_err());
        assert!(MetadataApiConfig::new()
            .with_rate_limit_delay_ms(120_000)
            .validate()
            .is_err());
        assert!(MetadataApiConfig::new()
            .with_base_url("not a url")
            .validate()
            .is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = MetadataApiConfig::new().with_base_url("http://localhost:9000/3/");
        assert_eq!(config.base_url, "http://localhost:9000/3");
    }

    #[test]
    fn test_federation_validation() {
        let mut federation = FederationConfig::default();
        assert!(federation.validate().is_ok());

        federation.download_progress_interval_bytes = 0;
        assert!(federation.validate().is_err());

        let federation = FederationConfig {
            download_timeout: Duration::from_secs(1),
            ..FederationConfig::default()
        };
        assert!(federation.validate().is_err());
    }

    #[test]
    fn test_sync_settings_validation() {
        let settings = SyncSettings {
            media_extensions: vec![".mkv".to_string()],
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = SyncSettings {
            media_extensions: Vec::new(),
            ..SyncSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MEDIAHUB_DATABASE_PATH", "/srv/media.db"),
            ("MEDIAHUB_TMDB_API_KEY", "token-123"),
            ("MEDIAHUB_NODE_NAME", "attic"),
            ("MEDIAHUB_NODE_URL", "https://attic.example.com/"),
            ("MEDIAHUB_NODE_API_KEY", "node-key"),
        ]);

        let config = CoreConfigBuilder::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .http_client(Arc::new(NoopHttpClient))
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/srv/media.db"));
        assert_eq!(
            config.metadata_api_config.api_key.as_deref(),
            Some("token-123")
        );
        assert_eq!(config.node_identity.name, "attic");
        assert_eq!(config.node_identity.url, "https://attic.example.com");
        assert_eq!(config.node_identity.api_key.as_deref(), Some("node-key"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = builder()
            .database_path("/data/library.db")
            .metadata_api_config(MetadataApiConfig::new().with_api_key("super-secret"))
            .node_identity(NodeIdentity::default().with_api_key("node-secret"))
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("node-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
