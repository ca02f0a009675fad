// ── Session client ──
//
// Owns the login state machine, the subscription and the active transport
// of one backend connection. Every public operation returns immediately;
// responses are handled in spawned tasks which re-validate the login
// phase and generation before touching any state.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use cometvisu_api::backend::{BackendConfig, Resource};
use cometvisu_api::protocol::Query;
use cometvisu_api::request::ACCEPT_WRITE;
use cometvisu_api::{
    Dispatcher, LoginRequest, LoginResponse, Request, Response, TlsMode, TransportConfig,
    WriteRequest,
};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::{ClientConfig, TlsVerification};
use crate::error::CoreError;
use crate::registry;
use crate::session::{LoginCallback, LoginPhase, LoginSettings, Subscription, Update};
use crate::transport::{self, Transport};
use crate::watchdog::Watchdog;

const UPDATE_CHANNEL_SIZE: usize = 256;

/// Watchdog checks run every this many ticks.
pub const WATCHDOG_GRACE_TICKS: u32 = 5;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static LAST_WRITE_TS: AtomicI64 = AtomicI64::new(0);

// ── Request dispatch types ───────────────────────────────────────

/// Success continuation of [`Client::do_request`].
pub type ResponseCallback = Box<dyn FnOnce(&Client, Response) + Send>;

/// Failure listener of [`Client::do_request`].
pub type ErrorCallback = Box<dyn FnOnce(&Client, &cometvisu_api::Error) + Send>;

/// Per-request options.
#[derive(Default)]
pub struct RequestOptions {
    /// Replaces the default `Accept: application/json`.
    pub accept: Option<Cow<'static, str>>,
    /// Attach captured resend headers, then the backend's fixed headers.
    pub before_send: bool,
    /// Extra headers applied last.
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub on_error: Option<ErrorCallback>,
}

/// Handle to an in-flight request started by [`Client::do_request`].
#[derive(Debug)]
pub struct RequestHandle {
    cancel: CancellationToken,
    task: JoinHandle<Option<Result<u16, cometvisu_api::Error>>>,
}

impl RequestHandle {
    /// Abort the request. Neither callback runs afterwards.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the request and its callbacks have completed.
    ///
    /// Yields the response status or the failure, and `None` when the
    /// request was aborted or the client dropped first.
    pub async fn finished(self) -> Option<Result<u16, CoreError>> {
        let outcome = self.task.await.ok()??;
        Some(outcome.map_err(CoreError::from))
    }
}

// ── Client ───────────────────────────────────────────────────────

/// Session client for one CometVisu backend.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Dropping the last handle
/// stops the session and removes it from the process-wide registry.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    id: u64,
    config: ClientConfig,
    dispatcher: Dispatcher,
    state: Mutex<State>,
    phase: watch::Sender<LoginPhase>,
    update_tx: broadcast::Sender<Update>,
    watchdog: Watchdog,
}

struct State {
    backend: BackendConfig,
    login: LoginSettings,
    subscription: Subscription,
    running: bool,
    data_received: bool,
    last_error: Option<String>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Create a client from configuration. Does NOT contact the backend --
    /// call [`subscribe`](Self::subscribe) or [`login`](Self::login).
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let dispatcher = Dispatcher::new(config.server.clone(), &transport)?;
        Ok(Self::with_dispatcher(config, dispatcher))
    }

    /// Create a client around a pre-built dispatcher.
    pub fn with_dispatcher(config: ClientConfig, dispatcher: Dispatcher) -> Self {
        let backend = config
            .backend
            .resolve()
            .apply_capabilities(config.capabilities);
        let (phase, _) = watch::channel(LoginPhase::Anonymous);
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);

        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| ClientInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(State {
                transport: transport::create(
                    backend.transport,
                    weak.clone(),
                    config.reconnect.clone(),
                ),
                backend,
                login: LoginSettings::default(),
                subscription: Subscription::default(),
                running: false,
                data_received: false,
                last_error: None,
            }),
            watchdog: Watchdog::new(weak.clone(), config.watchdog_tick),
            dispatcher,
            phase,
            update_tx,
            config,
        });

        registry::register(&inner);
        debug!(id = inner.id, "client created");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn upgrade(weak: &Weak<ClientInner>) -> Option<Self> {
        weak.upgrade().map(Self::from_inner)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("client state lock poisoned")
    }

    fn set_phase(&self, state: &mut State, phase: LoginPhase) {
        state.login.phase = phase;
        self.inner.phase.send_replace(phase);
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Process-unique id of this client.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Snapshot of the current backend configuration.
    pub fn backend(&self) -> BackendConfig {
        self.state().backend.clone()
    }

    /// Relative path of a resource on the current backend.
    pub fn resource_path(&self, resource: Resource) -> String {
        self.state().backend.resource_path(resource)
    }

    pub fn session(&self) -> String {
        self.state().subscription.session.clone()
    }

    pub fn subscription(&self) -> Subscription {
        self.state().subscription.clone()
    }

    pub fn login_phase(&self) -> LoginPhase {
        self.state().login.phase
    }

    pub fn is_logged_in(&self) -> bool {
        self.login_phase() == LoginPhase::Authenticated
    }

    /// Whether a login-only handshake has been requested and not yet
    /// turned into a full session.
    pub fn is_login_only(&self) -> bool {
        self.state().login.login_only
    }

    /// Is the communication running at the moment?
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Whether data arrived since the last login or full restart.
    pub fn data_received(&self) -> bool {
        self.state().data_received
    }

    /// Reason of the last failed login, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn current_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.state().transport)
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.inner.watchdog
    }

    /// Subscribe to value updates.
    pub fn updates(&self) -> broadcast::Receiver<Update> {
        self.inner.update_tx.subscribe()
    }

    /// Subscribe to login phase changes.
    pub fn phase_changes(&self) -> watch::Receiver<LoginPhase> {
        self.inner.phase.subscribe()
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // ── Backend ──────────────────────────────────────────────────

    /// Replace the backend configuration.
    ///
    /// The transport strategy is swapped when the transport kind changes;
    /// the previous strategy is aborted.
    pub fn set_backend(&self, backend: BackendConfig) {
        let replaced = {
            let mut state = self.state();
            self.install_backend(&mut state, backend)
        };
        if let Some(previous) = replaced {
            previous.abort();
        }
    }

    fn install_backend(
        &self,
        state: &mut State,
        backend: BackendConfig,
    ) -> Option<Arc<dyn Transport>> {
        let backend = backend
            .normalized()
            .apply_capabilities(self.inner.config.capabilities);

        let replaced = if backend.transport == state.transport.kind() {
            None
        } else {
            debug!(
                from = %state.transport.kind(),
                to = %backend.transport,
                "switching transport"
            );
            let fresh = transport::create(
                backend.transport,
                Arc::downgrade(&self.inner),
                self.inner.config.reconnect.clone(),
            );
            Some(std::mem::replace(&mut state.transport, fresh))
        };
        state.backend = backend;
        replaced
    }

    /// Captured resend header values followed by the fixed headers.
    pub(crate) fn before_send_headers(&self) -> Vec<(String, String)> {
        self.state()
            .backend
            .request_headers()
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect()
    }

    /// Remember values of configured resend headers for the next request.
    pub(crate) fn capture_resend_headers(&self, response: &Response) {
        let mut state = self.state();
        for (name, value) in &mut state.backend.resend_headers {
            if let Some(captured) = response.header(name) {
                if value.as_deref() != Some(captured) {
                    trace!(header = %name, "captured resend header");
                    *value = Some(captured.to_owned());
                }
            }
        }
    }

    // ── Subscription control ─────────────────────────────────────

    /// Replace the subscribed addresses and filters.
    ///
    /// An empty address list stops the communication. Going from no
    /// addresses to some starts it: by logging in, or, if a login-only
    /// handshake is pending, by connecting the already configured
    /// transport.
    pub fn subscribe(&self, addresses: Vec<String>, filters: Vec<String>) {
        enum Action {
            Stop,
            Connect(Arc<dyn Transport>),
            Login,
            Nothing,
        }

        let action = {
            let mut state = self.state();
            let start_communication = state.subscription.addresses.is_empty();
            state.subscription.addresses = addresses;
            state.subscription.filters = filters;

            if state.subscription.addresses.is_empty() {
                Action::Stop
            } else if !start_communication {
                Action::Nothing
            } else if state.login.login_only {
                state.login.login_only = false;
                match state.login.phase {
                    LoginPhase::Authenticated => Action::Connect(Arc::clone(&state.transport)),
                    LoginPhase::Authenticating => {
                        debug!("upgrading pending login-only handshake to a full session");
                        Action::Nothing
                    }
                    LoginPhase::Anonymous => Action::Login,
                }
            } else {
                Action::Login
            }
        };

        match action {
            Action::Stop => self.stop(),
            Action::Connect(transport) => {
                transport.connect();
                self.inner.watchdog.start(WATCHDOG_GRACE_TICKS);
            }
            Action::Login => self.login(false, None),
            Action::Nothing => {}
        }
    }

    /// Addresses to load with every full read in addition to the
    /// subscribed ones. Takes effect with the next full read.
    pub fn set_initial_addresses(&self, addresses: Vec<String>) {
        self.state().subscription.initial_addresses = addresses;
    }

    // ── Login state machine ──────────────────────────────────────

    /// Log into the backend.
    ///
    /// With `login_only` the backend configuration is negotiated but no
    /// data stream is started. When already logged in no request is made
    /// and the callback (or a still pending one) runs before this returns.
    pub fn login(&self, login_only: bool, callback: Option<LoginCallback>) {
        let generation = {
            let mut state = self.state();
            if state.login.phase == LoginPhase::Authenticated {
                let callback = callback.or_else(|| state.login.callback.take());
                drop(state);
                debug!("already logged in");
                if let Some(callback) = callback {
                    callback(self);
                }
                return;
            }

            state.login.login_only = login_only;
            state.login.callback = callback;
            state.login.generation += 1;
            self.set_phase(&mut state, LoginPhase::Authenticating);
            state.login.generation
        };

        let url = match self.login_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build login URL");
                self.login_failed(generation, &e.to_string());
                return;
            }
        };

        let credentials = &self.inner.config.credentials;
        let query = LoginRequest {
            user: credentials.user(),
            password: credentials.password(),
            device: credentials.device(),
        }
        .to_query();

        debug!(%url, login_only, generation, "logging in");
        self.do_request(
            url,
            query,
            Some(Box::new(move |client: &Client, response: Response| {
                client.handle_login(generation, &response);
            })),
            RequestOptions {
                on_error: Some(Box::new(move |client: &Client, err: &cometvisu_api::Error| {
                    client.login_failed(generation, &err.to_string());
                })),
                ..RequestOptions::default()
            },
        );
    }

    /// Wait until a pending login settles.
    pub async fn login_settled(&self) -> Result<(), CoreError> {
        let mut rx = self.inner.phase.subscribe();
        let phase = *rx
            .wait_for(|phase| *phase != LoginPhase::Authenticating)
            .await
            .map_err(|_| CoreError::Internal("login state channel closed".into()))?;

        match phase {
            LoginPhase::Authenticated => Ok(()),
            LoginPhase::Anonymous | LoginPhase::Authenticating => Err(CoreError::LoginFailed {
                message: self.last_error().unwrap_or_else(|| "not logged in".into()),
            }),
        }
    }

    fn login_url(&self) -> Result<Url, CoreError> {
        let path = match &self.inner.config.login_url {
            Some(url) => url.clone(),
            None => self.resource_path(Resource::Login),
        };
        Ok(self.inner.dispatcher.resolve(&path)?)
    }

    fn handle_login(&self, generation: u64, response: &Response) {
        let Some(body) = response.body.as_ref() else {
            self.login_failed(generation, "login response carried no payload");
            return;
        };
        let login = LoginResponse::from_value(body);

        let (transport, replaced, start, callback) = {
            let mut state = self.state();
            if state.login.generation != generation || state.login.phase != LoginPhase::Authenticating
            {
                debug!(generation, "ignoring stale login response");
                return;
            }

            let replaced = login.config.as_ref().and_then(|patch| {
                debug!("applying backend configuration from login response");
                let merged = state.backend.clone().merged(patch);
                self.install_backend(&mut state, merged)
            });

            login.session().clone_into(&mut state.subscription.session);
            state.data_received = false;
            state.last_error = None;
            let start = !state.login.login_only;
            self.set_phase(&mut state, LoginPhase::Authenticated);
            (
                Arc::clone(&state.transport),
                replaced,
                start,
                state.login.callback.take(),
            )
        };

        info!(session = %login.session(), version = ?login.version, "logged in");
        if let Some(previous) = replaced {
            previous.abort();
        }
        transport.handle_session(&login, start);
        if start {
            self.inner.watchdog.start(WATCHDOG_GRACE_TICKS);
        }
        if let Some(callback) = callback {
            callback(self);
        }
    }

    fn login_failed(&self, generation: u64, message: &str) {
        let dropped = {
            let mut state = self.state();
            if state.login.generation != generation || state.login.phase != LoginPhase::Authenticating
            {
                debug!(generation, "ignoring stale login failure");
                return;
            }
            state.last_error = Some(message.to_owned());
            self.set_phase(&mut state, LoginPhase::Anonymous);
            state.login.callback.take()
        };
        drop(dropped);
        warn!(error = message, "login failed");
    }

    // ── Request dispatch ─────────────────────────────────────────

    /// Send a GET request in the background.
    ///
    /// `callback` receives the decoded response, `options.on_error` the
    /// failure. Values of configured resend headers are captured from
    /// every response.
    pub fn do_request(
        &self,
        url: Url,
        query: Query,
        callback: Option<ResponseCallback>,
        options: RequestOptions,
    ) -> RequestHandle {
        let RequestOptions {
            accept,
            before_send,
            headers,
            timeout,
            on_error,
        } = options;

        let mut request = Request::new(url).query(query);
        if let Some(accept) = accept {
            request = request.accept(accept);
        }
        if before_send {
            for (name, value) in self.before_send_headers() {
                request = request.header(name, value);
            }
        }
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let dispatcher = self.inner.dispatcher.clone();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            let url = request.url.clone();
            let result = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(%url, "request aborted");
                    return None;
                }
                result = dispatcher.get(request) => result,
            };
            let client = Client::upgrade(&weak)?;
            match result {
                Ok(response) => {
                    let status = response.status;
                    client.capture_resend_headers(&response);
                    if let Some(callback) = callback {
                        callback(&client, response);
                    }
                    Some(Ok(status))
                }
                Err(e) => {
                    warn!(%url, error = %e, "request failed");
                    if let Some(on_error) = on_error {
                        on_error(&client, &e);
                    }
                    Some(Err(e))
                }
            }
        });

        RequestHandle { cancel, task }
    }

    // ── Write ────────────────────────────────────────────────────

    /// Send a value to an address. Fire-and-forget; the outcome is logged
    /// and can be awaited through the returned handle.
    pub fn write(&self, address: &str, value: &str) -> Result<RequestHandle, CoreError> {
        let (path, session) = {
            let state = self.state();
            (
                state.backend.resource_path(Resource::Write),
                state.subscription.session.clone(),
            )
        };
        let url = self.inner.dispatcher.resolve(&path)?;
        let query = WriteRequest {
            session: &session,
            address,
            value,
            timestamp: next_timestamp(),
        }
        .to_query();

        debug!(address, value, "write");
        Ok(self.do_request(
            url,
            query,
            Some(Box::new(|_: &Client, response: Response| {
                debug!(status = response.status, "write acknowledged");
            })),
            RequestOptions {
                accept: Some(Cow::Borrowed(ACCEPT_WRITE)),
                ..RequestOptions::default()
            },
        ))
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Stop the communication. Idempotent.
    ///
    /// Late responses to a login issued before this call are ignored.
    pub fn stop(&self) {
        let (transport, dropped) = {
            let mut state = self.state();
            state.running = false;
            state.login.generation += 1;
            self.set_phase(&mut state, LoginPhase::Anonymous);
            (Arc::clone(&state.transport), state.login.callback.take())
        };
        drop(dropped);
        transport.abort();
        self.inner.watchdog.stop();
        debug!(id = self.inner.id, "client stopped");
    }

    /// Restart the data stream; `full` reloads every value.
    pub fn restart(&self, full: bool) {
        let transport = self.current_transport();
        transport.restart(full);
    }

    // ── Transport callbacks ──────────────────────────────────────

    pub(crate) fn set_running(&self, running: bool) {
        self.state().running = running;
    }

    pub(crate) fn set_data_received(&self, received: bool) {
        self.state().data_received = received;
    }

    /// Forward values to consumers.
    pub(crate) fn update(&self, data: BTreeMap<String, Value>) {
        let initial = {
            let mut state = self.state();
            let initial = !state.data_received;
            state.data_received = true;
            initial
        };
        trace!(count = data.len(), initial, "update");
        let _ = self.inner.update_tx.send(Update { data, initial });
    }
}

impl ClientInner {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("server", &self.inner.config.server.as_str())
            .finish_non_exhaustive()
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        registry::deregister(self.id);
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.running = false;
        state.transport.abort();
        self.watchdog.stop();
        debug!(id = self.id, "client dropped");
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Build a [`TransportConfig`] from the client configuration.
fn build_transport(config: &ClientConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        connect_timeout: config.timeout,
        ..TransportConfig::default()
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

/// Current time in milliseconds, never smaller than a previous result.
fn next_timestamp() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    LAST_WRITE_TS.fetch_max(now, Ordering::Relaxed).max(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_never_decrease() {
        let mut previous = next_timestamp();
        for _ in 0..1000 {
            let ts = next_timestamp();
            assert!(ts >= previous);
            previous = ts;
        }
    }

    #[test]
    fn tls_modes_map_to_transport() {
        assert!(matches!(
            tls_to_transport(&TlsVerification::DangerAcceptInvalid),
            TlsMode::DangerAcceptInvalid
        ));
        assert!(matches!(
            tls_to_transport(&TlsVerification::SystemDefaults),
            TlsMode::System
        ));
    }
}
