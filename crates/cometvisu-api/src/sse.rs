//! Server-sent events decoding.
//!
//! A small incremental decoder for the `text/event-stream` format, fed with
//! body chunks as they arrive. Field handling follows the HTML living
//! standard: `data` lines accumulate, an empty line dispatches, lines
//! starting with `:` are comments.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt, stream};
use tracing::trace;

use crate::error::Error;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event type; `"message"` when the server sent none.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<Duration>,
}

/// Incremental event-stream decoder.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: BytesMut,
    event: String,
    data: String,
    id: Option<String>,
    retry: Option<Duration>,
}

impl EventDecoder {
    /// Feed a chunk, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(message) = self.process_line(&line) {
                out.push(message);
            }
        }
        out
    }

    /// Split the next complete line off the buffer.
    ///
    /// A trailing lone CR is held back until the next chunk shows whether
    /// it starts a CRLF pair.
    fn next_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|&b| b == CR || b == LF)?;
        let terminator_len = if self.buffer[pos] == CR {
            match self.buffer.get(pos + 1) {
                None => return None,
                Some(&LF) => 2,
                Some(_) => 1,
            }
        } else {
            1
        };
        let line = self.buffer.split_to(pos).freeze();
        self.buffer.advance(terminator_len);
        Some(line)
    }

    fn process_line(&mut self, line: &[u8]) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.first() == Some(&b':') {
            trace!("event stream comment");
            return None;
        }

        let text = String::from_utf8_lossy(line);
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (text.as_ref(), ""),
        };

        match field {
            "event" => value.clone_into(&mut self.event),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.id = Some(value.to_owned()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseMessage {
            event: if event.is_empty() { "message".into() } else { event },
            data,
            id: self.id.clone(),
            retry: self.retry,
        })
    }
}

/// Turn a body byte stream into a stream of decoded events.
///
/// A body error is yielded once as [`Error::EventStream`]; the stream ends
/// when the body ends.
pub fn decode<S, E>(body: S) -> impl Stream<Item = Result<SseMessage, Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = (Box::pin(body), EventDecoder::default(), VecDeque::new(), false);
    stream::unfold(state, |(mut body, mut decoder, mut pending, failed)| async move {
        if failed {
            return None;
        }
        loop {
            if let Some(message) = pending.pop_front() {
                return Some((Ok(message), (body, decoder, pending, false)));
            }
            match body.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                Some(Err(e)) => {
                    let err = Error::EventStream(e.to_string());
                    return Some((Err(err), (body, decoder, pending, true)));
                }
                None => return None,
            }
        }
    })
}
