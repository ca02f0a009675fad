#![allow(clippy::unwrap_used)]
// `stop_all` affects every client in the process, so it lives in its own
// test binary.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cometvisu_core::{BackendSelector, Client, ClientConfig, LoginPhase, stop_all};

#[tokio::test]
async fn test_stop_all_stops_every_live_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/l"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/cv/l"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s": "2" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "d": {} }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let server_url = Url::parse(&server.uri()).unwrap();
    let clients: Vec<Client> = ["default", "openhab"]
        .into_iter()
        .map(|name| {
            let config = ClientConfig::new(server_url.clone())
                .with_backend(BackendSelector::Named(name.into()));
            Client::new(config).unwrap()
        })
        .collect();

    for client in &clients {
        client.subscribe(vec!["1/2/3".into()], vec![]);
    }
    for client in &clients {
        client.login_settled().await.unwrap();
        assert!(client.is_running());
    }

    stop_all();

    for client in &clients {
        assert!(!client.is_running());
        assert_eq!(client.login_phase(), LoginPhase::Anonymous);
        assert!(!client.current_transport().is_connection_running());
        assert!(!client.watchdog().is_active());
    }
}
