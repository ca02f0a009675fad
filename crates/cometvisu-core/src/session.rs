// Session state owned by a `Client`: login progress and the active
// subscription.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use cometvisu_api::backend::DEFAULT_SESSION;
use serde_json::Value;
use strum::Display;

use crate::client::Client;

/// Progress of the login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LoginPhase {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Invoked once after a successful login. Captures whatever context it
/// needs.
pub type LoginCallback = Box<dyn FnOnce(&Client) + Send>;

/// Login bookkeeping.
pub struct LoginSettings {
    pub phase: LoginPhase,
    /// Log in and configure the backend without starting the data stream.
    pub login_only: bool,
    pub callback: Option<LoginCallback>,
    /// Bumped by every login attempt and by `stop`; responses carrying an
    /// older generation are stale.
    pub(crate) generation: u64,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            phase: LoginPhase::Anonymous,
            login_only: false,
            callback: None,
            generation: 0,
        }
    }
}

impl fmt::Debug for LoginSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginSettings")
            .field("phase", &self.phase)
            .field("login_only", &self.login_only)
            .field("callback", &self.callback.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Addresses and filters the client is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub addresses: Vec<String>,
    /// Loaded ahead of `addresses` by full reads.
    pub initial_addresses: Vec<String>,
    pub filters: Vec<String>,
    pub session: String,
}

impl Subscription {
    /// Addresses to send with a read. A full read puts the initial
    /// addresses first, skipping any that are subscribed anyway.
    pub fn read_addresses(&self, full: bool) -> Cow<'_, [String]> {
        if !full || self.initial_addresses.is_empty() {
            return Cow::Borrowed(&self.addresses);
        }
        let mut addresses =
            Vec::with_capacity(self.initial_addresses.len() + self.addresses.len());
        for address in self.initial_addresses.iter().chain(&self.addresses) {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }
        Cow::Owned(addresses)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            initial_addresses: Vec::new(),
            filters: Vec::new(),
            session: DEFAULT_SESSION.into(),
        }
    }
}

/// Values pushed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Address → value.
    pub data: BTreeMap<String, Value>,
    /// First payload since the last login or reconnect.
    pub initial: bool,
}
