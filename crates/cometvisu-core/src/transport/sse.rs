// Server-sent events: a single long-lived read request whose body is a
// `text/event-stream`; every `message` event carries one `{d, i}` payload.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use cometvisu_api::backend::Resource;
use cometvisu_api::{
    Dispatcher, Error, LoginResponse, ReadRequest, ReadResponse, Request, SseMessage,
    TransportKind, parser,
};
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Transport, backoff};
use crate::client::{Client, ClientInner};
use crate::config::ReconnectConfig;

const MESSAGE_EVENT: &str = "message";

#[derive(Debug, Default)]
struct Shared {
    connected: AtomicBool,
    version: Mutex<Option<String>>,
}

/// Event-stream transport strategy.
#[derive(Debug)]
pub struct EventStream {
    client: Weak<ClientInner>,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl EventStream {
    pub(crate) fn new(client: Weak<ClientInner>, reconnect: ReconnectConfig) -> Self {
        Self {
            client,
            reconnect,
            shared: Arc::new(Shared::default()),
            cancel: Mutex::new(None),
        }
    }
}

impl Transport for EventStream {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
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
        client.set_running(true);
        info!(backend = %client.backend().name, "event stream starting");

        tokio::spawn(stream_loop(
            self.client.clone(),
            Arc::clone(&self.shared),
            self.reconnect.clone(),
            token,
        ));
    }

    fn restart(&self, _full: bool) {
        self.abort();
        self.connect();
    }

    fn abort(&self) {
        if let Some(token) = lock(&self.cancel).take() {
            token.cancel();
            debug!("event stream aborted");
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn is_connection_running(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn version(&self) -> Option<String> {
        lock(&self.shared.version).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("event stream state lock poisoned")
}

// ── Stream loop ──────────────────────────────────────────────────────

async fn stream_loop(
    weak: Weak<ClientInner>,
    shared: Arc<Shared>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        let Some((dispatcher, request)) = open_request(&weak) else {
            break;
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            opened = dispatcher.open_event_stream(request) => opened,
        };

        let result = match opened {
            Ok(stream) => {
                shared.connected.store(true, Ordering::SeqCst);
                info!("event stream connected");
                attempt = 0;
                let result = consume(&weak, stream, &cancel).await;
                shared.connected.store(false, Ordering::SeqCst);
                result
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => debug!("event stream ended"),
            Err(e) => warn!(error = %e, attempt, "event stream failed"),
        }

        if cancel.is_cancelled() || !backoff(attempt, &reconnect, &cancel).await {
            break;
        }
        attempt = attempt.saturating_add(1);
    }

    shared.connected.store(false, Ordering::SeqCst);
    debug!("event stream loop exiting");
}

fn open_request(weak: &Weak<ClientInner>) -> Option<(Dispatcher, Request)> {
    let client = Client::upgrade(weak)?;
    let backend = client.backend();
    let subscription = client.subscription();

    let url = client
        .dispatcher()
        .resolve(&backend.resource_path(Resource::Read))
        .map_err(|e| warn!(error = %e, "cannot build event stream URL"))
        .ok()?;
    let query = ReadRequest {
        session: &subscription.session,
        addresses: &subscription.read_addresses(true),
        filters: &subscription.filters,
        index: None,
    }
    .to_query();

    let request = Request::new(url)
        .query(query)
        .headers(backend.request_headers());
    Some((client.dispatcher().clone(), request))
}

/// Read events until the stream ends, fails, or is cancelled.
async fn consume<S>(weak: &Weak<ClientInner>, stream: S, cancel: &CancellationToken) -> Result<(), Error>
where
    S: Stream<Item = Result<SseMessage, Error>>,
{
    let mut stream = pin!(stream);
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            item = stream.next() => item,
        };
        match item {
            None => return Ok(()),
            Some(Err(e)) => return Err(e),
            Some(Ok(message)) => {
                let Some(client) = Client::upgrade(weak) else {
                    return Ok(());
                };
                handle_message(&client, &message);
            }
        }
    }
}

fn handle_message(client: &Client, message: &SseMessage) {
    if message.event != MESSAGE_EVENT {
        trace!(event = %message.event, "ignoring event");
        return;
    }
    let Some(value) = parser::parse_lenient(&message.data) else {
        debug!("event without usable payload");
        return;
    };

    let read = ReadResponse::from_value(&value);
    trace!(count = read.data.len(), index = ?read.index, "event");
    if !read.data.is_empty() {
        client.update(read.data);
    }
    client.watchdog().ping(true);
}
