// Long polling: one read request at a time, the next one issued as soon
// as the previous answered. The server holds a read open until values
// change or its own timeout passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cometvisu_api::backend::{CloseHook, Resource};
use cometvisu_api::{
    Dispatcher, Error, LoginResponse, ReadRequest, ReadResponse, Request, Response, TransportKind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{READ_TIMEOUT_SLACK, Transport, backoff};
use crate::client::{Client, ClientInner, RequestOptions};
use crate::config::ReconnectConfig;

const ATMOSPHERE_TRANSPORT: &str = "X-Atmosphere-Transport";

#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    /// Resume index of the last read; `None` asks for a full read.
    index: Mutex<Option<u64>>,
    version: Mutex<Option<String>>,
}

/// Long-polling transport strategy.
#[derive(Debug)]
pub struct LongPolling {
    client: Weak<ClientInner>,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl LongPolling {
    pub(crate) fn new(client: Weak<ClientInner>, reconnect: ReconnectConfig) -> Self {
        Self {
            client,
            reconnect,
            shared: Arc::new(Shared::default()),
            cancel: Mutex::new(None),
        }
    }

    /// Resume index of the last successful read.
    pub fn last_index(&self) -> Option<u64> {
        *lock(&self.shared.index)
    }
}

impl Transport for LongPolling {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPolling
    }

    fn handle_session(&self, response: &LoginResponse, start: bool) {
        lock(&self.shared.version).clone_from(&response.version);
        if start {
            self.connect();
        }
    }

    fn connect(&self) {
        let Some(client) = Client::upgrade(&self.client) else {
            return;
        };
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.cancel).replace(token.clone()) {
            previous.cancel();
        }
        self.shared.running.store(true, Ordering::SeqCst);
        client.set_running(true);
        info!(backend = %client.backend().name, "long-polling started");

        tokio::spawn(poll_loop(
            self.client.clone(),
            Arc::clone(&self.shared),
            self.reconnect.clone(),
            token,
        ));
    }

    fn restart(&self, full: bool) {
        self.abort();
        if full {
            *lock(&self.shared.index) = None;
            if let Some(client) = Client::upgrade(&self.client) {
                client.set_data_received(false);
            }
        }
        self.connect();
    }

    fn abort(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let Some(token) = lock(&self.cancel).take() else {
            return;
        };
        token.cancel();
        debug!("long-polling aborted");

        if let Some(client) = Client::upgrade(&self.client) {
            run_close_hook(&client);
        }
    }

    fn is_connection_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn version(&self) -> Option<String> {
        lock(&self.shared.version).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("long-polling state lock poisoned")
}

// ── Poll loop ────────────────────────────────────────────────────────

async fn poll_loop(
    weak: Weak<ClientInner>,
    shared: Arc<Shared>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        let Some((dispatcher, request)) = next_request(&weak, &shared) else {
            shared.running.store(false, Ordering::SeqCst);
            break;
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = dispatcher.get(request) => result,
        };

        let Some(client) = Client::upgrade(&weak) else {
            break;
        };
        let outcome = result.and_then(|response| handle_read(&client, &shared, &response));
        drop(client);

        match outcome {
            Ok(()) => attempt = 0,
            Err(e) => {
                warn!(error = %e, attempt, "long-polling read failed");
                if e.is_session_lost() {
                    *lock(&shared.index) = None;
                }
                if !backoff(attempt, &reconnect, &cancel).await {
                    break;
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }

    debug!("long-polling loop exiting");
}

fn next_request(weak: &Weak<ClientInner>, shared: &Shared) -> Option<(Dispatcher, Request)> {
    let client = Client::upgrade(weak)?;
    let backend = client.backend();
    let subscription = client.subscription();
    let index = *lock(&shared.index);

    let url = client
        .dispatcher()
        .resolve(&backend.resource_path(Resource::Read))
        .map_err(|e| warn!(error = %e, "cannot build read URL"))
        .ok()?;
    let query = ReadRequest {
        session: &subscription.session,
        addresses: &subscription.read_addresses(index.is_none()),
        filters: &subscription.filters,
        index,
    }
    .to_query();

    let request = Request::new(url)
        .query(query)
        .headers(backend.request_headers())
        .timeout(backend.max_connection_age + READ_TIMEOUT_SLACK);
    Some((client.dispatcher().clone(), request))
}

fn handle_read(client: &Client, shared: &Shared, response: &Response) -> Result<(), Error> {
    client.capture_resend_headers(response);
    let Some(body) = response.body.as_ref() else {
        return Err(Error::Deserialization {
            message: "read response without payload".into(),
            body: String::new(),
        });
    };

    let read = ReadResponse::from_value(body);
    let full = {
        let mut index = lock(&shared.index);
        let full = index.is_none();
        if read.index.is_some() {
            *index = read.index;
        }
        full
    };
    trace!(count = read.data.len(), index = ?read.index, full, "read response");

    if !read.data.is_empty() {
        client.update(read.data);
    }
    client.watchdog().ping(full);
    Ok(())
}

// ── Close hook ───────────────────────────────────────────────────────

/// Run the backend's close hook, if any.
fn run_close_hook(client: &Client) {
    let backend = client.backend();
    if backend.hooks.on_close != Some(CloseHook::AtmosphereClose) {
        return;
    }
    if tokio::runtime::Handle::try_current().is_err() {
        return;
    }
    let Ok(url) = client
        .dispatcher()
        .resolve(&backend.resource_path(Resource::Read))
    else {
        return;
    };

    debug!("sending atmosphere close request");
    client.do_request(
        url,
        Vec::new(),
        None,
        RequestOptions {
            before_send: true,
            headers: vec![(ATMOSPHERE_TRANSPORT.to_owned(), "close".to_owned())],
            ..RequestOptions::default()
        },
    );
}
