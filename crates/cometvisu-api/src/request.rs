// HTTP request dispatch
//
// Wraps `reqwest::Client` with the backend's URL resolution, header
// handling and tolerant body decoding. Every request is a GET with a query
// string; the protocol never sends a request body.

use std::borrow::Cow;
use std::time::Duration;

use futures_util::Stream;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::parser;
use crate::protocol::Query;
use crate::sse::{self, SseMessage};
use crate::transport::TransportConfig;

/// Accept header for structured responses.
pub const ACCEPT_JSON: &str = "application/json";

/// Accept header for writes; some servers answer with `text/javascript`.
pub const ACCEPT_WRITE: &str = "application/json, text/javascript, */*; q=0.01";

const ACCEPT_EVENT_STREAM: &str = "text/event-stream";

/// A single outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub query: Query,
    pub headers: Vec<(String, String)>,
    pub accept: Cow<'static, str>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            query: Vec::new(),
            headers: Vec::new(),
            accept: Cow::Borrowed(ACCEPT_JSON),
            timeout: None,
        }
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.headers
            .extend(headers.into_iter().map(|(n, v)| (n.to_owned(), v.to_owned())));
        self
    }

    pub fn accept(mut self, accept: impl Into<Cow<'static, str>>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::new();
        let accept = HeaderValue::from_str(&self.accept).map_err(|e| Error::InvalidHeader {
            name: ACCEPT.to_string(),
            reason: e.to_string(),
        })?;
        map.insert(ACCEPT, accept);
        for (name, value) in &self.headers {
            let invalid = |reason: String| Error::InvalidHeader {
                name: name.clone(),
                reason,
            };
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// A decoded response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed body; `None` if empty or unparseable.
    pub body: Option<Value>,
}

impl Response {
    /// A response header as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP dispatcher bound to one server origin.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    server: Url,
}

impl Dispatcher {
    /// Create a dispatcher from a `TransportConfig`.
    ///
    /// `server` is the origin relative backend paths are resolved against
    /// (e.g. `http://192.168.1.10:8080/`).
    pub fn new(server: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            server,
        })
    }

    /// Create a dispatcher with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, server: Url) -> Self {
        Self { http, server }
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// Resolve a backend path (or absolute URL) against the server origin.
    pub fn resolve(&self, path: &str) -> Result<Url, Error> {
        self.server.join(path).map_err(Error::InvalidUrl)
    }

    /// Send a GET request and decode the body leniently.
    pub async fn get(&self, request: Request) -> Result<Response, Error> {
        debug!("GET {}", request.url);

        let headers = request.header_map()?;
        let mut builder = self
            .http
            .get(request.url)
            .query(&request.query)
            .headers(headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let headers = resp.headers().clone();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let text = resp.text().await.map_err(Error::Transport)?;
        trace!(len = text.len(), "response body received");
        let body = parser::parse_lenient(&text).and_then(parser::get_response);

        Ok(Response {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    /// Open a `text/event-stream` and decode it into messages.
    pub async fn open_event_stream(
        &self,
        request: Request,
    ) -> Result<impl Stream<Item = Result<SseMessage, Error>> + Send + use<>, Error> {
        debug!("SSE {}", request.url);

        let request = request.accept(ACCEPT_EVENT_STREAM);
        let mut headers = request.header_map()?;
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let resp = self
            .http
            .get(request.url)
            .query(&request.query)
            .headers(headers)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        if let Some(ct) = resp.headers().get(CONTENT_TYPE) {
            let ct = ct.to_str().unwrap_or("");
            if !ct.contains(ACCEPT_EVENT_STREAM) {
                return Err(Error::EventStream(format!("unexpected content type {ct:?}")));
            }
        }

        Ok(sse::decode(resp.bytes_stream()))
    }
}
