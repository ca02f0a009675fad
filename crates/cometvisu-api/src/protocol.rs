// Protocol messages
//
// Query builders for login/read/write requests and tolerant decoders for
// the login and read responses. Backends are not strict about types
// (an index may arrive as a string, a version as a number), so responses
// are picked apart field by field instead of derived wholesale.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::{BackendPatch, DEFAULT_SESSION};

/// Query string as ordered key/value pairs. Keys may repeat (`a`, `f`).
pub type Query = Vec<(&'static str, String)>;

// ── Login ────────────────────────────────────────────────────────────

/// Credentials sent with a login request; empty fields are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoginRequest<'a> {
    pub user: &'a str,
    pub password: &'a str,
    pub device: &'a str,
}

impl LoginRequest<'_> {
    pub fn to_query(&self) -> Query {
        [("u", self.user), ("p", self.password), ("d", self.device)]
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k, v.to_owned()))
            .collect()
    }
}

/// Decoded login response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginResponse {
    /// Session id (`s`).
    pub session: Option<String>,
    /// Protocol version (`v`).
    pub version: Option<String>,
    /// Backend configuration pushed by the server (`c`).
    pub config: Option<BackendPatch>,
}

impl LoginResponse {
    pub fn from_value(value: &Value) -> Self {
        let config = value.get("c").and_then(backend_patch);
        Self {
            session: value.get("s").and_then(scalar_to_string),
            version: value.get("v").and_then(scalar_to_string),
            config,
        }
    }

    /// The session id, or the placeholder if the server sent none.
    pub fn session(&self) -> &str {
        self.session.as_deref().unwrap_or(DEFAULT_SESSION)
    }
}

// ── Read ─────────────────────────────────────────────────────────────

/// Parameters of a read (subscription) request.
#[derive(Debug, Clone, Copy)]
pub struct ReadRequest<'a> {
    pub session: &'a str,
    pub addresses: &'a [String],
    pub filters: &'a [String],
    /// Last index seen; `None` requests a full read.
    pub index: Option<u64>,
}

impl ReadRequest<'_> {
    pub fn to_query(&self) -> Query {
        let mut query: Query = vec![("s", self.session.to_owned())];
        query.extend(self.addresses.iter().map(|a| ("a", a.clone())));
        query.extend(self.filters.iter().map(|f| ("f", f.clone())));
        if let Some(index) = self.index {
            query.push(("i", index.to_string()));
        }
        query
    }
}

/// Decoded read response or event-stream message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResponse {
    /// Address → value.
    pub data: BTreeMap<String, Value>,
    /// Index to resume from.
    pub index: Option<u64>,
}

impl ReadResponse {
    pub fn from_value(value: &Value) -> Self {
        let data = value
            .get("d")
            .and_then(Value::as_object)
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let index = value.get("i").and_then(|i| match i {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        Self { data, index }
    }
}

// ── Write ────────────────────────────────────────────────────────────

/// Parameters of a write request.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub session: &'a str,
    pub address: &'a str,
    pub value: &'a str,
    /// Client timestamp in milliseconds; defeats caching proxies and
    /// WebKit caches that would otherwise swallow repeated writes.
    pub timestamp: i64,
}

impl WriteRequest<'_> {
    pub fn to_query(&self) -> Query {
        vec![
            ("s", self.session.to_owned()),
            ("a", self.address.to_owned()),
            ("v", self.value.to_owned()),
            ("ts", self.timestamp.to_string()),
        ]
    }
}

/// Decode the pushed backend configuration key by key. Keys with a bad
/// value are logged and skipped; the rest still apply.
fn backend_patch(value: &Value) -> Option<BackendPatch> {
    let Some(c) = value.as_object() else {
        debug!("ignoring backend configuration that is not an object");
        return None;
    };
    Some(BackendPatch {
        name: field(c, "name"),
        base_url: field(c, "baseURL"),
        transport: field(c, "transport"),
        resources: field(c, "resources"),
        max_connection_age: field(c, "maxConnectionAge"),
        max_data_age: field(c, "maxDataAge"),
        headers: field(c, "headers"),
        resend_headers: field(c, "resendHeaders"),
        transport_fallback: field(c, "transportFallback"),
        hooks: field(c, "hooks"),
    })
}

fn field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    let value = object.get(key).filter(|v| !v.is_null())?;
    serde_json::from_value(value.clone())
        .map_err(|e| debug!(key, error = %e, "ignoring malformed backend setting"))
        .ok()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
