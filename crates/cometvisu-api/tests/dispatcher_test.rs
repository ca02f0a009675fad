#![allow(clippy::unwrap_used)]
// Integration tests for `Dispatcher` using wiremock.

use futures_util::StreamExt;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cometvisu_api::backend::{self, Resource};
use cometvisu_api::{Dispatcher, Error, LoginRequest, LoginResponse, ReadResponse, Request};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Dispatcher) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let dispatcher = Dispatcher::with_client(reqwest::Client::new(), base_url);
    (server, dispatcher)
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_sends_credentials_as_query() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .and(query_param("u", "admin"))
        .and(query_param("d", "panel"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "4711", "v": "0.0.1" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = backend::resolve("default");
    let url = dispatcher.resolve(&config.resource_path(Resource::Login)).unwrap();
    let query = LoginRequest {
        user: "admin",
        password: "",
        device: "panel",
    }
    .to_query();

    let resp = dispatcher.get(Request::new(url).query(query)).await.unwrap();
    let login = LoginResponse::from_value(&resp.body.unwrap());
    assert_eq!(login.session(), "4711");
}

#[tokio::test]
async fn test_http_error_is_reported() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let url = dispatcher.resolve("/cgi-bin/r").unwrap();
    let result = dispatcher.get(Request::new(url)).await;

    match result {
        Err(Error::Http { status, ref body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}

// ── Lenient bodies ──────────────────────────────────────────────────

#[tokio::test]
async fn test_text_plain_body_is_parsed() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .and(path("/services/cv/r"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Atmosphere-tracking-id", "track-1")
                .set_body_string(r#"{"d":{"1/2/3":"00"},"i":1}{"d":{"1/2/4":"01"},"i":2}"#),
        )
        .mount(&server)
        .await;

    let url = dispatcher.resolve("/services/cv/r").unwrap();
    let resp = dispatcher.get(Request::new(url)).await.unwrap();

    assert_eq!(resp.header("X-Atmosphere-tracking-id"), Some("track-1"));
    let read = ReadResponse::from_value(&resp.body.unwrap());
    assert_eq!(read.index, Some(2));
    assert_eq!(read.data.len(), 2);
}

#[tokio::test]
async fn test_garbage_body_is_none() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let url = dispatcher.resolve("/cgi-bin/r").unwrap();
    let resp = dispatcher.get(Request::new(url)).await.unwrap();
    assert!(resp.body.is_none());
}

#[tokio::test]
async fn test_custom_headers_are_sent() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .and(header("X-Atmosphere-Transport", "long-polling"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = backend::resolve("openhab");
    let url = dispatcher.resolve(&config.resource_path(Resource::Read)).unwrap();
    dispatcher
        .get(Request::new(url).headers(config.request_headers()))
        .await
        .unwrap();
}

// ── Event stream ────────────────────────────────────────────────────

#[tokio::test]
async fn test_event_stream_is_decoded() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/cv/r"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "data: {\"d\":{\"Light\":\"ON\"},\"i\":3}\n\n: ping\n\n",
                "text/event-stream",
            ),
        )
        .mount(&server)
        .await;

    let url = dispatcher.resolve("/rest/cv/r").unwrap();
    let stream = dispatcher.open_event_stream(Request::new(url)).await.unwrap();
    let events: Vec<_> = stream.collect().await;

    assert_eq!(events.len(), 1);
    let message = events[0].as_ref().unwrap();
    let read = ReadResponse::from_value(&serde_json::from_str(&message.data).unwrap());
    assert_eq!(read.data.get("Light"), Some(&json!("ON")));
    assert_eq!(read.index, Some(3));
}

#[tokio::test]
async fn test_event_stream_rejects_wrong_content_type() {
    let (server, dispatcher) = setup().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
        )
        .mount(&server)
        .await;

    let url = dispatcher.resolve("/rest/cv/r").unwrap();
    let result = dispatcher.open_event_stream(Request::new(url)).await;
    assert!(matches!(result, Err(Error::EventStream(_))));
}
