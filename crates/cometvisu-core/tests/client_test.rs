#![allow(clippy::unwrap_used)]
// Integration tests for `Client` against a wiremock backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cometvisu_core::{
    BackendPatch, BackendSelector, Capabilities, Client, ClientConfig, CoreError, LoginPhase,
    Resource, TransportKind, backend, live_clients,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer, backend: &str) -> ClientConfig {
    ClientConfig::new(Url::parse(&server.uri()).unwrap())
        .with_backend(BackendSelector::Named(backend.into()))
}

async fn requests_to(server: &MockServer, route: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == route)
        .collect()
}

fn query_values(request: &wiremock::Request, key: &str) -> Vec<String> {
    request
        .url
        .query_pairs()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

/// Poll `condition` for up to two seconds.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

async fn eventually_requests(server: &MockServer, route: &str, count: usize) -> bool {
    for _ in 0..100 {
        if requests_to(server, route).await.len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn mount_login(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// A read answering once with data, then holding every further read open.
async fn mount_reads(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .mount(server)
        .await;
    mount_hanging_reads(server, route).await;
}

async fn mount_hanging_reads(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "d": {}, "i": 99 }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(server)
        .await;
}

// ── Subscription control ────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_logs_in_once_and_streams_updates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "0815", "v": "0.0.1" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_reads(&server, "/cgi-bin/r", json!({ "d": { "1/2/3": "01" }, "i": 7 })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    let mut updates = client.updates();
    client.subscribe(vec!["1/2/3".into()], vec!["filter".into()]);

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(update.initial);
    assert_eq!(update.data.get("1/2/3"), Some(&json!("01")));

    assert!(client.is_running());
    assert!(client.is_logged_in());
    assert!(client.data_received());
    assert_eq!(client.session(), "0815");
    assert_eq!(client.current_transport().version().as_deref(), Some("0.0.1"));

    let reads = requests_to(&server, "/cgi-bin/r").await;
    let first = reads[0].url.query().unwrap_or_default().to_owned();
    assert!(first.contains("s=0815"), "query was {first}");
    assert!(first.contains("a=1%2F2%2F3"), "query was {first}");
    assert!(first.contains("f=filter"), "query was {first}");
    assert!(!first.contains("i="), "first read must be a full read: {first}");

    // The follow-up read resumes from the returned index.
    assert!(eventually_requests(&server, "/cgi-bin/r", 2).await);
    let reads = requests_to(&server, "/cgi-bin/r").await;
    assert!(reads[1].url.query().unwrap_or_default().contains("i=7"));

    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

#[tokio::test]
async fn test_initial_addresses_are_loaded_by_full_reads_only() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "0815" })).await;
    mount_reads(&server, "/cgi-bin/r", json!({ "d": { "0/0/1": "1" }, "i": 3 })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.set_initial_addresses(vec!["0/0/1".into(), "1/2/3".into()]);
    client.subscribe(vec!["1/2/3".into()], vec![]);
    assert_eq!(client.subscription().initial_addresses, ["0/0/1", "1/2/3"]);

    assert!(eventually_requests(&server, "/cgi-bin/r", 2).await);
    let reads = requests_to(&server, "/cgi-bin/r").await;
    assert_eq!(query_values(&reads[0], "a"), ["0/0/1", "1/2/3"]);
    assert_eq!(query_values(&reads[1], "a"), ["1/2/3"]);
    assert_eq!(query_values(&reads[1], "i"), ["3"]);
    client.stop();
}

#[tokio::test]
async fn test_subscribe_with_new_addresses_does_not_log_in_again() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.subscribe(vec!["1/2/3".into()], vec![]);
    client.login_settled().await.unwrap();
    client.subscribe(vec!["1/2/4".into(), "1/2/5".into()], vec![]);

    assert_eq!(client.subscription().addresses, vec!["1/2/4", "1/2/5"]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

#[tokio::test]
async fn test_subscribe_empty_stops_the_client() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let client = Client::new(config(&server, "default")).unwrap();

    client.subscribe(vec![], vec![]);
    assert!(!client.is_running());

    client.subscribe(vec!["1/2/3".into()], vec![]);
    assert!(eventually(|| client.is_running()).await);
    assert!(client.watchdog().is_active());

    client.subscribe(vec![], vec![]);
    assert!(!client.is_running());
    assert_eq!(client.login_phase(), LoginPhase::Anonymous);
    assert!(!client.current_transport().is_connection_running());
    assert!(!client.watchdog().is_active());
}

#[tokio::test]
async fn test_subscribe_after_login_only_connects_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "42" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    assert!(client.is_logged_in());
    assert!(client.is_login_only());
    assert!(!client.is_running());
    assert!(requests_to(&server, "/cgi-bin/r").await.is_empty());

    client.subscribe(vec!["1/2/3".into()], vec![]);
    assert!(!client.is_login_only());
    assert!(client.is_running());
    assert!(eventually_requests(&server, "/cgi-bin/r", 1).await);
    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

#[tokio::test]
async fn test_subscribe_upgrades_outstanding_login_only_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "s": "7" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.subscribe(vec!["1/2/3".into()], vec![]);
    client.login_settled().await.unwrap();

    assert!(eventually(|| client.is_running()).await);
    assert!(eventually_requests(&server, "/cgi-bin/r", 1).await);
    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

// ── Login state machine ─────────────────────────────────────────────

#[tokio::test]
async fn test_login_sends_only_non_empty_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .and(query_param("u", "admin"))
        .and(query_param("d", "kitchen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "1" })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = cometvisu_core::Credentials {
        user: Some("admin".into()),
        password: Some(String::new().into()),
        device: Some("kitchen".into()),
    };
    let client = Client::new(config(&server, "default").with_credentials(credentials)).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    let logins = requests_to(&server, "/cgi-bin/l").await;
    let query = logins[0].url.query().unwrap_or_default().to_owned();
    assert!(!query.contains("p="), "query was {query}");
}

#[tokio::test]
async fn test_login_uses_configured_login_url() {
    let server = MockServer::start().await;
    mount_login(&server, "/auth/login", json!({ "s": "1" })).await;

    let mut cfg = config(&server, "default");
    cfg.login_url = Some("/auth/login".into());
    let client = Client::new(cfg).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    assert_eq!(requests_to(&server, "/auth/login").await.len(), 1);
}

#[tokio::test]
async fn test_login_callback_runs_after_login() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    client.login(
        true,
        Some(Box::new(move |client: &Client| {
            assert!(client.is_logged_in());
            flag.store(true, Ordering::SeqCst);
        })),
    );
    assert!(!called.load(Ordering::SeqCst));

    client.login_settled().await.unwrap();
    assert!(eventually(|| called.load(Ordering::SeqCst)).await);
}

#[tokio::test]
async fn test_login_when_authenticated_runs_callback_inline() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    client.login(
        false,
        Some(Box::new(move |_: &Client| flag.store(true, Ordering::SeqCst))),
    );

    // No await in between: the callback already ran.
    assert!(called.load(Ordering::SeqCst));
    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

#[tokio::test]
async fn test_login_when_authenticated_ignores_backend_change() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;
    mount_login(&server, "/services/cv/l", json!({ "s": "2" })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    client.set_backend(backend::resolve("openhab"));
    client.login(true, None);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(requests_to(&server, "/services/cv/l").await.is_empty());
    assert_eq!(client.session(), "1");
}

#[tokio::test]
async fn test_login_response_configures_backend() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        "/cgi-bin/l",
        json!({ "s": "abc", "c": { "baseURL": "/x", "resources": { "read": "read" } } }),
    )
    .await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    assert_eq!(client.session(), "abc");
    assert_eq!(client.resource_path(Resource::Read), "/x/read");
    assert_eq!(client.resource_path(Resource::Write), "/x/w");
}

#[tokio::test]
async fn test_login_without_session_uses_placeholder() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "v": "0.0.1" })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    assert_eq!(client.session(), "SESSION");
}

#[tokio::test]
async fn test_login_response_switches_transport() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1", "c": { "transport": "sse" } })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    assert_eq!(client.current_transport().kind(), TransportKind::LongPolling);

    client.login(true, None);
    client.login_settled().await.unwrap();
    assert_eq!(client.current_transport().kind(), TransportKind::Sse);
}

#[tokio::test]
async fn test_transport_fallback_without_event_stream_support() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        "/cgi-bin/l",
        json!({
            "s": "1",
            "c": { "transport": "sse", "transportFallback": { "transport": "long-polling" } }
        }),
    )
    .await;

    let mut cfg = config(&server, "default");
    cfg.capabilities = Capabilities {
        event_stream: false,
    };
    let client = Client::new(cfg).unwrap();
    client.login(true, None);
    client.login_settled().await.unwrap();

    assert_eq!(client.backend().transport, TransportKind::LongPolling);
    assert_eq!(client.current_transport().kind(), TransportKind::LongPolling);
}

#[tokio::test]
async fn test_login_failure_returns_to_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(ResponseTemplate::new(500).set_body_string("broken"))
        .mount(&server)
        .await;

    let client = Client::new(config(&server, "default")).unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    client.login(
        false,
        Some(Box::new(move |_: &Client| flag.store(true, Ordering::SeqCst))),
    );

    let result = client.login_settled().await;
    assert!(matches!(result, Err(CoreError::LoginFailed { .. })));
    assert_eq!(client.login_phase(), LoginPhase::Anonymous);
    assert!(client.last_error().unwrap().contains("500"));
    assert!(!called.load(Ordering::SeqCst));
    assert!(!client.is_running());
}

#[tokio::test]
async fn test_stop_discards_late_login_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "s": "late" }))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let client = Client::new(config(&server, "default")).unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    client.login(
        false,
        Some(Box::new(move |_: &Client| flag.store(true, Ordering::SeqCst))),
    );
    assert_eq!(client.login_phase(), LoginPhase::Authenticating);

    client.stop();
    client.stop();
    assert!(eventually_requests(&server, "/cgi-bin/l", 1).await);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!client.is_running());
    assert_eq!(client.login_phase(), LoginPhase::Anonymous);
    assert_ne!(client.session(), "late");
    assert!(!called.load(Ordering::SeqCst));
    assert!(requests_to(&server, "/cgi-bin/r").await.is_empty());
}

// ── Write ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_write_sends_address_value_and_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/w"))
        .and(query_param("s", "SESSION"))
        .and(query_param("a", "1/2/3"))
        .and(query_param("v", "on"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::new(config(&server, "default")).unwrap();
    for _ in 0..2 {
        let outcome = client.write("1/2/3", "on").unwrap().finished().await;
        assert!(matches!(outcome, Some(Ok(200))), "outcome was {outcome:?}");
    }

    let writes = requests_to(&server, "/cgi-bin/w").await;
    let accept = writes[0].headers.get("accept").unwrap().to_str().unwrap();
    assert!(accept.contains("text/javascript"), "accept was {accept}");

    let timestamps: Vec<i64> = writes
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "ts")
                .map(|(_, v)| v.parse().unwrap())
                .unwrap()
        })
        .collect();
    assert_eq!(timestamps.len(), 2);
    assert!(timestamps[1] >= timestamps[0]);
}

#[tokio::test]
async fn test_rejected_write_reports_backend_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/w"))
        .respond_with(ResponseTemplate::new(500).set_body_string("bus offline"))
        .mount(&server)
        .await;

    let client = Client::new(config(&server, "default")).unwrap();
    let outcome = client.write("1/2/3", "on").unwrap().finished().await;
    match outcome {
        Some(Err(CoreError::Backend { status, message })) => {
            assert_eq!(status, Some(500));
            assert!(message.contains("bus offline"), "message was {message}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_request_handle_aborts_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = Client::new(config(&server, "default")).unwrap();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let url = Url::parse(&server.uri()).unwrap().join("/cgi-bin/r").unwrap();
    let handle = client.do_request(
        url,
        Vec::new(),
        Some(Box::new(move |_: &Client, _| flag.store(true, Ordering::SeqCst))),
        cometvisu_core::RequestOptions::default(),
    );
    handle.abort();
    let outcome = tokio::time::timeout(Duration::from_secs(1), handle.finished())
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert!(!called.load(Ordering::SeqCst));
}

// ── openHAB specifics ───────────────────────────────────────────────

#[tokio::test]
async fn test_openhab_resends_tracking_header_and_closes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/cv/l"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Atmosphere-tracking-id", "track-1")
                .set_body_json(json!({ "s": "oh" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/cv/r"))
        .and(header("X-Atmosphere-tracking-id", "track-1"))
        .and(header("X-Atmosphere-Transport", "long-polling"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string(r#"{"d":{"Light":"ON"},"i":1}"#),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/cv/r"))
        .and(header("X-Atmosphere-Transport", "close"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mount_hanging_reads(&server, "/services/cv/r").await;

    let client = Client::new(config(&server, "oh")).unwrap();
    let mut updates = client.updates();
    client.subscribe(vec!["Light".into()], vec![]);

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.data.get("Light"), Some(&json!("ON")));

    client.stop();
    let mut closed = false;
    for _ in 0..100 {
        closed = requests_to(&server, "/services/cv/r")
            .await
            .iter()
            .any(|r| {
                r.headers
                    .get("X-Atmosphere-Transport")
                    .is_some_and(|v| v == "close")
            });
        if closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(closed, "no close request was sent");
    // The backend configuration itself keeps the long-polling header.
    assert_eq!(
        client
            .backend()
            .headers
            .get("X-Atmosphere-Transport")
            .map(String::as_str),
        Some("long-polling")
    );
}

// ── Event stream ────────────────────────────────────────────────────

#[tokio::test]
async fn test_openhab2_streams_events() {
    let server = MockServer::start().await;
    mount_login(&server, "/rest/cv/l", json!({ "s": "sse-session", "v": "2.0.0" })).await;
    Mock::given(method("GET"))
        .and(path("/rest/cv/r"))
        .and(header("accept", "text/event-stream"))
        .and(query_param("s", "sse-session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "data: {\"d\":{\"Light\":\"ON\"},\"i\":3}\n\n",
                "text/event-stream",
            ),
        )
        .mount(&server)
        .await;

    let client = Client::new(config(&server, "oh2")).unwrap();
    assert_eq!(client.current_transport().kind(), TransportKind::Sse);

    let mut updates = client.updates();
    client.subscribe(vec!["Light".into()], vec![]);

    let update = tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(update.initial);
    assert_eq!(update.data.get("Light"), Some(&json!("ON")));
    assert!(client.is_running());
    assert_eq!(client.current_transport().version().as_deref(), Some("2.0.0"));

    client.stop();
    assert!(!client.current_transport().is_connection_running());
}

// ── Watchdog ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_watchdog_restarts_stale_connection() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let mut cfg = config(&server, "default");
    cfg.backend = BackendSelector::Override(BackendPatch {
        max_connection_age: Some(150),
        ..BackendPatch::default()
    });
    cfg.watchdog_tick = Duration::from_millis(20);
    let client = Client::new(cfg).unwrap();

    client.subscribe(vec!["1/2/3".into()], vec![]);
    assert!(eventually_requests(&server, "/cgi-bin/r", 1).await);

    // The first read never answers; the watchdog has to reconnect.
    assert!(eventually_requests(&server, "/cgi-bin/r", 2).await);
    assert!(client.is_running());
    assert_eq!(requests_to(&server, "/cgi-bin/l").await.len(), 1);
}

#[tokio::test]
async fn test_watchdog_does_not_restart_a_stopped_client() {
    let server = MockServer::start().await;
    mount_hanging_reads(&server, "/cgi-bin/r").await;

    let mut cfg = config(&server, "default");
    cfg.watchdog_tick = Duration::from_millis(10);
    let client = Client::new(cfg).unwrap();

    // Logged out with a dead transport: every check finds it stale.
    client.watchdog().start(1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(client.watchdog().is_active());
    assert!(!client.is_running());
    assert!(requests_to(&server, "/cgi-bin/r").await.is_empty());
    client.stop();
}

#[tokio::test]
async fn test_restart_full_reads_everything_again() {
    let server = MockServer::start().await;
    mount_login(&server, "/cgi-bin/l", json!({ "s": "1" })).await;
    mount_reads(&server, "/cgi-bin/r", json!({ "d": { "1/2/3": "01" }, "i": 5 })).await;

    let client = Client::new(config(&server, "default")).unwrap();
    let mut updates = client.updates();
    client.subscribe(vec!["1/2/3".into()], vec![]);
    tokio::time::timeout(Duration::from_secs(2), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(eventually_requests(&server, "/cgi-bin/r", 2).await);

    client.restart(true);
    assert!(!client.data_received());
    assert!(eventually_requests(&server, "/cgi-bin/r", 3).await);

    let reads = requests_to(&server, "/cgi-bin/r").await;
    let query = reads[2].url.query().unwrap_or_default().to_owned();
    assert!(!query.contains("i="), "full restart must drop the index: {query}");
}

// ── Registry ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dropping_client_deregisters_it() {
    let server = MockServer::start().await;
    let client = Client::new(config(&server, "default")).unwrap();
    let id = client.id();
    assert!(live_clients().iter().any(|c| c.id() == id));

    drop(client);
    assert!(!live_clients().iter().any(|c| c.id() == id));
}
