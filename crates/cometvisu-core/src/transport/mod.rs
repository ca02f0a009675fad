// ── Transport strategies ──
//
// A transport owns the live data stream of one client. The client picks
// the strategy from the backend's `TransportKind` and swaps it whenever
// a new backend configuration changes the kind.

mod long_polling;
mod sse;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cometvisu_api::{LoginResponse, TransportKind};

use crate::client::ClientInner;
use crate::config::ReconnectConfig;

pub use long_polling::LongPolling;
pub use sse::EventStream;

/// Extra time granted to a read on top of the backend's
/// `max_connection_age` before the request is given up.
pub(crate) const READ_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Capability contract of a transport strategy.
///
/// Every method returns immediately; network work runs in spawned tasks,
/// so they must be called from within a tokio runtime.
pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    /// Take over after a successful login; connect when `start` is set.
    fn handle_session(&self, response: &LoginResponse, start: bool);

    /// Start (or restart) the data stream.
    fn connect(&self);

    /// Drop the current connection and reconnect. `full` discards the
    /// resume index so all values are read again.
    fn restart(&self, full: bool);

    /// Stop the data stream.
    fn abort(&self);

    fn is_connection_running(&self) -> bool;

    /// Protocol version announced by the last login response.
    fn version(&self) -> Option<String>;
}

/// Build the strategy for `kind`, bound to the owning client.
pub(crate) fn create(
    kind: TransportKind,
    client: Weak<ClientInner>,
    reconnect: ReconnectConfig,
) -> Arc<dyn Transport> {
    match kind {
        TransportKind::LongPolling => Arc::new(LongPolling::new(client, reconnect)),
        TransportKind::Sse => Arc::new(EventStream::new(client, reconnect)),
    }
}

/// Exponential backoff with a deterministic jitter seeded from the attempt
/// number.
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

/// Sleep for the backoff delay unless cancelled first. Returns `false` on
/// cancellation.
pub(crate) async fn backoff(
    attempt: u32,
    config: &ReconnectConfig,
    cancel: &tokio_util::sync::CancellationToken,
) -> bool {
    let delay = calculate_backoff(attempt, config);
    tracing::info!(
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        attempt,
        "waiting before reconnect"
    );
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
