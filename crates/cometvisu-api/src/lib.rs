//! Wire layer for the CometVisu protocol.
//!
//! - [`backend`]: backend presets, alias resolution and the typed
//!   [`BackendConfig`] with its explicit merge.
//! - [`protocol`]: login/read/write query builders and tolerant response
//!   decoders.
//! - [`request`]: the [`Dispatcher`] performing HTTP requests.
//! - [`parser`]: lenient body parsing for misbehaving servers.
//! - [`sse`]: incremental `text/event-stream` decoding.

pub mod backend;
pub mod error;
pub mod parser;
pub mod protocol;
pub mod request;
pub mod sse;
pub mod transport;

pub use backend::{
    BackendConfig, BackendPatch, Capabilities, CloseHook, Resource, TransportKind,
};
pub use error::Error;
pub use protocol::{LoginRequest, LoginResponse, ReadRequest, ReadResponse, WriteRequest};
pub use request::{Dispatcher, Request, Response};
pub use sse::SseMessage;
pub use transport::{TlsMode, TransportConfig};
