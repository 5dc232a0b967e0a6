//! Session configurations

use std::collections::BTreeMap;
use std::time::Duration;

/// Caching behavior for requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    /// Use the transport's default caching behavior
    #[default]
    UseProtocolCachePolicy,
    /// Always go to the origin
    ReloadIgnoringLocalCache,
    /// Serve from cache when possible, regardless of age
    ReturnCacheDataElseLoad,
}

/// Cookie acceptance policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookiePolicy {
    /// Accept all cookies
    Always,
    /// Never accept or send cookies
    Never,
    /// Accept cookies only from the main document's domain
    #[default]
    OnlyFromMainDocumentDomain,
}

/// Where cookies for a custom session are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookieStorage {
    /// Shared with foreground and background sessions of the same transport
    #[default]
    Shared,
    /// Private to the session
    Isolated,
}

/// Transport execution context.
///
/// Compared by value; the session manager keeps one transport session per
/// distinct configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Configuration {
    /// Default session bound to the application's lifetime
    #[default]
    Foreground,
    /// No persistent cache or cookies
    Ephemeral,
    /// Survives application suspension; identified by a stable string
    Background(String),
    /// Caller-supplied transport parameters
    Custom(CustomConfiguration),
}

impl Configuration {
    /// Background configuration with the given identifier
    pub fn background(identifier: impl Into<String>) -> Self {
        Configuration::Background(identifier.into())
    }

    /// Background configuration whose identifier is derived from `app_identity`
    pub fn background_for_app(app_identity: &str) -> Self {
        Configuration::Background(format!("{}.background", app_identity))
    }

    /// Identifier of a background configuration
    pub fn background_identifier(&self) -> Option<&str> {
        match self {
            Configuration::Background(identifier) => Some(identifier),
            _ => None,
        }
    }

    /// Whether sessions for this configuration survive app suspension
    pub fn is_background(&self) -> bool {
        matches!(self, Configuration::Background(_))
    }
}

/// Transport parameters for [`Configuration::Custom`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomConfiguration {
    /// Whether requests may use cellular networks
    pub allows_cellular_access: bool,
    /// Idle timeout while waiting for data
    pub timeout_for_request: Option<Duration>,
    /// Upper bound for a whole transfer
    pub timeout_for_resource: Option<Duration>,
    /// Concurrent connections per host
    pub max_connections_per_host: Option<usize>,
    /// Cache policy
    pub cache_policy: CachePolicy,
    /// Cookie acceptance policy
    pub cookie_policy: CookiePolicy,
    /// Cookie storage
    pub cookie_storage: CookieStorage,
    /// Headers added to every request
    pub additional_headers: BTreeMap<String, String>,
    /// User agent
    pub user_agent: Option<String>,
}

impl Default for CustomConfiguration {
    fn default() -> Self {
        Self {
            allows_cellular_access: true,
            timeout_for_request: None,
            timeout_for_resource: None,
            max_connections_per_host: None,
            cache_policy: CachePolicy::default(),
            cookie_policy: CookiePolicy::default(),
            cookie_storage: CookieStorage::default(),
            additional_headers: BTreeMap::new(),
            user_agent: None,
        }
    }
}

impl CustomConfiguration {
    /// Create a configuration builder
    pub fn builder() -> CustomConfigurationBuilder {
        CustomConfigurationBuilder::default()
    }
}

/// Builder for [`CustomConfiguration`]
#[derive(Debug, Default)]
pub struct CustomConfigurationBuilder {
    config: CustomConfiguration,
}

impl CustomConfigurationBuilder {
    /// Allow or forbid cellular access
    pub fn allows_cellular_access(mut self, allowed: bool) -> Self {
        self.config.allows_cellular_access = allowed;
        self
    }

    /// Set request timeout
    pub fn timeout_for_request(mut self, timeout: Duration) -> Self {
        self.config.timeout_for_request = Some(timeout);
        self
    }

    /// Set resource timeout
    pub fn timeout_for_resource(mut self, timeout: Duration) -> Self {
        self.config.timeout_for_resource = Some(timeout);
        self
    }

    /// Limit concurrent connections per host
    pub fn max_connections_per_host(mut self, max: usize) -> Self {
        self.config.max_connections_per_host = Some(max);
        self
    }

    /// Set caching behavior
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.config.cache_policy = policy;
        self
    }

    /// Set cookie acceptance policy
    pub fn cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.config.cookie_policy = policy;
        self
    }

    /// Set cookie storage
    pub fn cookie_storage(mut self, storage: CookieStorage) -> Self {
        self.config.cookie_storage = storage;
        self
    }

    /// Add a default header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .additional_headers
            .insert(name.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Finish as a [`Configuration::Custom`]
    pub fn build(self) -> Configuration {
        Configuration::Custom(self.config)
    }
}
