// ── Core error types ──
//
// User-facing errors from cometvisu-core. Consumers see session-level
// failures, not raw HTTP machinery; the `From<cometvisu_api::Error>` impl
// translates wire-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Event stream failed: {reason}")]
    EventStream { reason: String },

    // ── Backend errors ───────────────────────────────────────────────
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<cometvisu_api::Error> for CoreError {
    fn from(err: cometvisu_api::Error) -> Self {
        match err {
            cometvisu_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Backend {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            cometvisu_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            cometvisu_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            cometvisu_api::Error::InvalidHeader { name, reason } => CoreError::Config {
                message: format!("Invalid header {name}: {reason}"),
            },
            cometvisu_api::Error::Http { status, body } => CoreError::Backend {
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                },
                status: Some(status),
            },
            cometvisu_api::Error::EventStream(reason) => CoreError::EventStream { reason },
            cometvisu_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
