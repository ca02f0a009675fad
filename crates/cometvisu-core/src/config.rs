// ── Runtime connection configuration ──
//
// These types describe *how* to talk to a CometVisu backend. They carry
// credential data and connection tuning, but never touch disk.
// The CLI constructs a `ClientConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use cometvisu_api::backend::{self, BackendConfig, BackendPatch, Capabilities};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Which backend configuration a client starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    /// A preset or alias name (`default`, `openhab`, `oh2`, ...). Unknown
    /// names fall back to `default`.
    Named(String),
    /// A caller-supplied patch merged onto the `default` preset.
    Override(BackendPatch),
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::Named(backend::DEFAULT_BACKEND.into())
    }
}

impl BackendSelector {
    /// Resolve to a normalized configuration.
    pub fn resolve(&self) -> BackendConfig {
        match self {
            Self::Named(name) => backend::resolve(name),
            Self::Override(patch) => backend::resolve_override(patch),
        }
    }
}

/// Login credentials. Empty or missing fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub device: Option<String>,
}

impl Credentials {
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password
            .as_ref()
            .map(|p| p.expose_secret())
            .unwrap_or_default()
    }

    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or_default()
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs on home servers).
    DangerAcceptInvalid,
}

/// Exponential backoff for transport reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Configuration for one client session.
///
/// Built by the CLI, passed to `Client` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin backend paths are resolved against (e.g. `http://192.168.1.10/`).
    pub server: Url,
    pub backend: BackendSelector,
    /// Login URL used instead of the backend's `login` resource.
    pub login_url: Option<String>,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// Connect timeout.
    pub timeout: Duration,
    pub capabilities: Capabilities,
    /// Base period of the watchdog; checks run every 5 ticks.
    pub watchdog_tick: Duration,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn new(server: Url) -> Self {
        Self {
            server,
            backend: BackendSelector::default(),
            login_url: None,
            credentials: Credentials::default(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            capabilities: Capabilities::default(),
            watchdog_tick: Duration::from_secs(1),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_backend(mut self, backend: BackendSelector) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}
