// ── Connection watchdog ──
//
// Restarts the transport when no data arrived for longer than the
// backend's `max_connection_age`, or when the transport reports its
// connection as down. A restart is a full one (all values reloaded) once
// the last full read is older than `max_data_age`.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{Client, ClientInner};

#[derive(Debug, Clone, Copy)]
struct Marks {
    /// Last data reception.
    last: Instant,
    /// Last full data reception.
    hard_last: Instant,
}

/// Liveness monitor bound to one client.
#[derive(Debug)]
pub struct Watchdog {
    client: Weak<ClientInner>,
    tick: Duration,
    marks: Arc<Mutex<Marks>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Watchdog {
    pub(crate) fn new(client: Weak<ClientInner>, tick: Duration) -> Self {
        let now = Instant::now();
        Self {
            client,
            tick,
            marks: Arc::new(Mutex::new(Marks {
                last: now,
                hard_last: now,
            })),
            cancel: Mutex::new(None),
        }
    }

    /// Check the connection every `grace_ticks` ticks. Replaces a running
    /// monitor.
    pub fn start(&self, grace_ticks: u32) {
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.cancel).replace(token.clone()) {
            previous.cancel();
        }
        {
            let now = Instant::now();
            let mut marks = lock(&self.marks);
            marks.last = now;
            marks.hard_last = now;
        }

        let period = self.tick * grace_ticks.max(1);
        debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "watchdog started");
        tokio::spawn(monitor(
            self.client.clone(),
            Arc::clone(&self.marks),
            period,
            token,
        ));
    }

    pub fn stop(&self) {
        if let Some(token) = lock(&self.cancel).take() {
            token.cancel();
            debug!("watchdog stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.cancel).is_some()
    }

    /// Record data reception; `full` marks a complete reload.
    pub fn ping(&self, full: bool) {
        let now = Instant::now();
        let mut marks = lock(&self.marks);
        marks.last = now;
        if full {
            marks.hard_last = now;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("watchdog lock poisoned")
}

async fn monitor(
    weak: Weak<ClientInner>,
    marks: Arc<Mutex<Marks>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        let Some(client) = Client::upgrade(&weak) else {
            break;
        };
        check(&client, &marks, &cancel);
    }
}

fn check(client: &Client, marks: &Mutex<Marks>, cancel: &CancellationToken) {
    let backend = client.backend();
    let transport = client.current_transport();
    let now = Instant::now();
    let current = *lock(marks);

    if now.duration_since(current.last) < backend.max_connection_age
        && transport.is_connection_running()
    {
        return;
    }

    // A concurrent `stop` must not be undone by the restart.
    if cancel.is_cancelled() || !client.is_logged_in() {
        debug!("client stopped, skipping restart");
        return;
    }

    let full = now.duration_since(current.hard_last) > backend.max_data_age;
    info!(full, "connection stale, restarting");
    client.restart(full);
    lock(marks).last = now;
}
