// cometvisu-core: Session layer between cometvisu-api and consumers (CLI).

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;
pub mod watchdog;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{
    Client, ErrorCallback, RequestHandle, RequestOptions, ResponseCallback, WATCHDOG_GRACE_TICKS,
};
pub use config::{BackendSelector, ClientConfig, Credentials, ReconnectConfig, TlsVerification};
pub use error::CoreError;
pub use registry::{live_clients, stop_all};
pub use session::{LoginCallback, LoginPhase, LoginSettings, Subscription, Update};
pub use transport::Transport;
pub use watchdog::Watchdog;

// Wire-layer types consumers routinely need.
pub use cometvisu_api::backend::{self, BackendConfig, BackendPatch, Capabilities, Resource};
pub use cometvisu_api::{LoginResponse, TransportKind};
