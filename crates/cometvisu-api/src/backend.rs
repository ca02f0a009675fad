//! Backend presets and the typed backend configuration.
//!
//! A backend is the server-side counterpart of the protocol (the `cgi-bin`
//! reference server, openHAB, openHAB 2). Each preset is expressed as a
//! [`BackendPatch`] merged over the `default` preset; servers may push
//! another patch with the login response, which is merged the same way.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Session id used when the login response carries none.
pub const DEFAULT_SESSION: &str = "SESSION";

/// Name of the preset every other preset is merged onto.
pub const DEFAULT_BACKEND: &str = "default";

const DEFAULT_MAX_CONNECTION_AGE: Duration = Duration::from_millis(60 * 1000);
const DEFAULT_MAX_DATA_AGE: Duration = Duration::from_millis(3200 * 1000);

// ── Enums ────────────────────────────────────────────────────────────

/// Wire protocol used for the live data stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
pub enum TransportKind {
    #[serde(rename = "long-polling")]
    #[strum(serialize = "long-polling")]
    LongPolling,
    #[serde(rename = "sse")]
    #[strum(serialize = "sse")]
    Sse,
}

/// Logical resource names a backend maps to path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Resource {
    Login,
    Read,
    Write,
    Rrd,
}

/// Lifecycle action run when a transport connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseHook {
    /// Tell an Atmosphere server (openHAB 1) to drop the suspended request
    /// by sending one read with `X-Atmosphere-Transport: close`.
    AtmosphereClose,
}

// ── Resources ────────────────────────────────────────────────────────

/// Path segment per logical resource, relative to the backend base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub login: String,
    pub read: String,
    pub write: String,
    pub rrd: String,
}

impl Resources {
    pub fn get(&self, resource: Resource) -> &str {
        match resource {
            Resource::Login => &self.login,
            Resource::Read => &self.read,
            Resource::Write => &self.write,
            Resource::Rrd => &self.rrd,
        }
    }

    fn merge(&mut self, patch: ResourcesPatch) {
        if let Some(login) = patch.login {
            self.login = login;
        }
        if let Some(read) = patch.read {
            self.read = read;
        }
        if let Some(write) = patch.write {
            self.write = write;
        }
        if let Some(rrd) = patch.rrd {
            self.rrd = rrd;
        }
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            login: "l".into(),
            read: "r".into(),
            write: "w".into(),
            rrd: "rrdfetch".into(),
        }
    }
}

/// Partial resource map as sent by a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrd: Option<String>,
}

/// Lifecycle hooks of a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, rename = "onClose", skip_serializing_if = "Option::is_none")]
    pub on_close: Option<CloseHook>,
}

// ── BackendConfig ────────────────────────────────────────────────────

/// Fully resolved configuration of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub name: String,
    /// Always ends with `/` once [`normalized`](Self::normalized).
    pub base_url: String,
    pub transport: TransportKind,
    pub resources: Resources,
    /// Restart the connection if the last read is older than this.
    pub max_connection_age: Duration,
    /// Reload all data if the last full read is older than this.
    pub max_data_age: Duration,
    /// Headers sent with every request that asks for them.
    pub headers: BTreeMap<String, String>,
    /// Headers whose value is taken from the last response and sent back.
    pub resend_headers: BTreeMap<String, Option<String>>,
    pub transport_fallback: Option<Box<BackendPatch>>,
    pub hooks: Hooks,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BACKEND.into(),
            base_url: "/cgi-bin/".into(),
            transport: TransportKind::LongPolling,
            resources: Resources::default(),
            max_connection_age: DEFAULT_MAX_CONNECTION_AGE,
            max_data_age: DEFAULT_MAX_DATA_AGE,
            headers: BTreeMap::new(),
            resend_headers: BTreeMap::new(),
            transport_fallback: None,
            hooks: Hooks::default(),
        }
    }
}

/// What the runtime can do, used to pick a transport fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub event_stream: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { event_stream: true }
    }
}

impl BackendConfig {
    /// Shallow, last-write-wins merge of `patch` over `self`.
    ///
    /// Header maps and the resource map merge per key so a server sending
    /// a single resource cannot unset the others.
    pub fn merged(mut self, patch: &BackendPatch) -> Self {
        self.merge(patch);
        self
    }

    pub fn merge(&mut self, patch: &BackendPatch) {
        let patch = patch.clone();
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(base_url) = patch.base_url {
            self.base_url = base_url;
        }
        if let Some(transport) = patch.transport {
            self.transport = transport;
        }
        if let Some(resources) = patch.resources {
            self.resources.merge(resources);
        }
        if let Some(ms) = patch.max_connection_age {
            self.max_connection_age = Duration::from_millis(ms);
        }
        if let Some(ms) = patch.max_data_age {
            self.max_data_age = Duration::from_millis(ms);
        }
        if let Some(headers) = patch.headers {
            self.headers.extend(headers);
        }
        if let Some(resend) = patch.resend_headers {
            self.resend_headers.extend(resend);
        }
        if let Some(fallback) = patch.transport_fallback {
            self.transport_fallback = Some(fallback);
        }
        if let Some(hooks) = patch.hooks {
            if hooks.on_close.is_some() {
                self.hooks.on_close = hooks.on_close;
            }
        }
    }

    /// Swap in the transport fallback if the preferred event stream is not
    /// available in this runtime.
    pub fn apply_capabilities(mut self, caps: Capabilities) -> Self {
        if self.transport == TransportKind::Sse && !caps.event_stream {
            if let Some(fallback) = self.transport_fallback.take() {
                tracing::debug!(backend = %self.name, "event stream unsupported, using fallback");
                self.merge(&fallback);
            }
        }
        self
    }

    /// Append the trailing slash to `base_url` if it is missing.
    pub fn normalized(mut self) -> Self {
        if !self.base_url.ends_with('/') {
            self.base_url.push('/');
        }
        self
    }

    /// Relative path of a resource on this backend.
    pub fn resource_path(&self, resource: Resource) -> String {
        format!("{}{}", self.base_url, self.resources.get(resource))
    }

    /// Fixed headers plus any captured resend header values, resend first.
    pub fn request_headers(&self) -> Vec<(&str, &str)> {
        let resend = self
            .resend_headers
            .iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v)));
        let fixed = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()));
        resend.chain(fixed).collect()
    }
}

// ── BackendPatch ─────────────────────────────────────────────────────

/// Partial backend configuration, the shape presets and servers use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesPatch>,
    /// Milliseconds.
    #[serde(default, rename = "maxConnectionAge", skip_serializing_if = "Option::is_none")]
    pub max_connection_age: Option<u64>,
    /// Milliseconds.
    #[serde(default, rename = "maxDataAge", skip_serializing_if = "Option::is_none")]
    pub max_data_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "resendHeaders", skip_serializing_if = "Option::is_none")]
    pub resend_headers: Option<BTreeMap<String, Option<String>>>,
    #[serde(default, rename = "transportFallback", skip_serializing_if = "Option::is_none")]
    pub transport_fallback: Option<Box<BackendPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
}

// ── Registry ─────────────────────────────────────────────────────────

/// Names of the built-in presets, in display order.
pub const PRESETS: [&str; 3] = ["default", "openhab", "openhab2"];

/// Map a legacy backend name to its canonical preset name.
pub fn canonical_name(name: &str) -> &str {
    match name {
        "cgi-bin" => "default",
        "oh" => "openhab",
        "oh2" => "openhab2",
        other => other,
    }
}

/// The patch a known preset applies over `default`.
///
/// Returns `None` for names that are not presets (after alias resolution).
pub fn preset(name: &str) -> Option<BackendPatch> {
    match canonical_name(name) {
        "default" => Some(BackendPatch::default()),
        "openhab" => Some(BackendPatch {
            name: Some("openHAB".into()),
            base_url: Some("/services/cv/".into()),
            headers: Some(BTreeMap::from([(
                "X-Atmosphere-Transport".to_owned(),
                "long-polling".to_owned(),
            )])),
            resend_headers: Some(BTreeMap::from([(
                "X-Atmosphere-tracking-id".to_owned(),
                None,
            )])),
            hooks: Some(Hooks {
                on_close: Some(CloseHook::AtmosphereClose),
            }),
            ..BackendPatch::default()
        }),
        // openHAB 2 configures itself with the login response.
        "openhab2" => Some(BackendPatch {
            name: Some("openHAB2".into()),
            base_url: Some("/rest/cv/".into()),
            transport: Some(TransportKind::Sse),
            ..BackendPatch::default()
        }),
        _ => None,
    }
}

/// Resolve a backend name to a normalized configuration.
///
/// Unknown names fall back to `default` without error.
pub fn resolve(name: &str) -> BackendConfig {
    let config = match preset(name) {
        Some(patch) => BackendConfig::default().merged(&patch),
        None => {
            tracing::debug!(backend = name, "unknown backend, using default");
            BackendConfig::default()
        }
    };
    config.normalized()
}

/// Merge a caller-supplied override onto the `default` preset.
pub fn resolve_override(patch: &BackendPatch) -> BackendConfig {
    BackendConfig::default().merged(patch).normalized()
}
