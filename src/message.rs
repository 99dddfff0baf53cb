use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::{fmt, future};

use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderMap, Method, StatusCode};

use crate::error::{BoxError, StreamError};
use crate::frame::{PseudoHeaders, Reason};
use crate::queue::FrameQueue;
use crate::stream::{Capacity, StreamRef};

/// A received message: the initial HEADERS plus the body stream.
pub struct Message {
    pseudo: PseudoHeaders,
    fields: HeaderMap,
    payload: Payload,
}

impl Message {
    pub(crate) fn new(pseudo: PseudoHeaders, fields: HeaderMap, payload: Payload) -> Message {
        Message {
            pseudo,
            fields,
            payload,
        }
    }

    #[inline]
    pub fn pseudo(&self) -> &PseudoHeaders {
        &self.pseudo
    }

    #[inline]
    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }

    #[inline]
    pub fn payload(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn into_parts(self) -> (PseudoHeaders, HeaderMap, Payload) {
        (self.pseudo, self.fields, self.payload)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("pseudo", &self.pseudo)
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// A piece of a received message body.
pub enum Chunk {
    /// A DATA frame's payload, with the flow-control refund handle for it.
    Data {
        payload: Bytes,
        capacity: Capacity,
    },
    /// The trailers block ending the stream.
    Trailers(HeaderMap),
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunk::Data { payload, .. } => f
                .debug_struct("Data")
                .field("data_len", &payload.len())
                .finish(),
            Chunk::Trailers(fields) => f
                .debug_struct("Trailers")
                .field("fields", &fields.len())
                .finish(),
        }
    }
}

/// Body of a received message.
///
/// A lazy, finite, non-restartable sequence of [`Chunk`]s: either empty
/// (the initial HEADERS carried END_STREAM) or fed by the stream's frame
/// queue. Reading past the end keeps yielding `Ok(None)`; after a reset the
/// next read fails with the stream error.
///
/// Dropping the payload while the remote half is still streaming cancels
/// the stream, as the frames would have nowhere to go.
pub struct Payload {
    stream: StreamRef,
    queue: Option<Arc<FrameQueue>>,
    done: bool,
}

impl Payload {
    pub(crate) fn empty(stream: StreamRef) -> Payload {
        Payload {
            stream,
            queue: None,
            done: false,
        }
    }

    pub(crate) fn queued(stream: StreamRef, queue: Arc<FrameQueue>) -> Payload {
        Payload {
            stream,
            queue: Some(queue),
            done: false,
        }
    }

    /// Pull the next body chunk. `Ok(None)` is the end of the stream.
    pub fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Chunk>, StreamError>> {
        match &self.queue {
            None => Poll::Ready(Ok(None)),
            Some(queue) => queue.poll_read(cx),
        }
    }

    /// Pull the next body chunk. `Ok(None)` is the end of the stream.
    pub async fn read(&mut self) -> Result<Option<Chunk>, StreamError> {
        future::poll_fn(|cx| self.poll_read(cx)).await
    }
}

impl Stream for Payload {
    type Item = Result<Chunk, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.poll_read(cx) {
            Poll::Ready(Ok(Some(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Ok(None)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Err(err)) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if !self.stream.remote_half_closed() {
            log::trace!(
                "{:?} body dropped while the peer is still streaming, cancelling",
                self.stream.id()
            );
            self.stream.local_reset(Reason::CANCEL);
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}

/// A piece of an outbound message body.
#[derive(Debug)]
pub enum SendChunk {
    /// A DATA frame to write. The last frame of a body without trailers
    /// must set `end_stream`.
    Data { payload: Bytes, end_stream: bool },
    /// The trailers block. Always ends the stream.
    Trailers(HeaderMap),
}

/// Outbound body: the application's frame stream, drained by the send loop.
///
/// An `Err` item aborts the stream; a [`StreamError`](crate::StreamError)
/// passes through unchanged, any other error becomes a local
/// `INTERNAL_ERROR` abort.
pub type SendBodyStream = Pin<Box<dyn Stream<Item = Result<SendChunk, BoxError>> + Send>>;

/// A message submitted to [`StreamRef::send`](crate::StreamRef::send).
pub struct SendMessage {
    pseudo: PseudoHeaders,
    fields: HeaderMap,
    body: Option<SendBodyStream>,
}

impl SendMessage {
    /// Message without a body; the initial HEADERS will carry END_STREAM.
    pub fn new(pseudo: PseudoHeaders, fields: HeaderMap) -> SendMessage {
        SendMessage {
            pseudo,
            fields,
            body: None,
        }
    }

    /// Request message, for the client side of a stream.
    pub fn request(method: Method, path: impl Into<String>, fields: HeaderMap) -> SendMessage {
        SendMessage::new(PseudoHeaders::request(method, path), fields)
    }

    /// Response message, for the server side of a stream.
    pub fn response(status: StatusCode, fields: HeaderMap) -> SendMessage {
        SendMessage::new(PseudoHeaders::response(status), fields)
    }

    /// Attach a body stream. The initial HEADERS will not carry END_STREAM;
    /// the stream ends when a frame with `end_stream` (or trailers) has been
    /// written.
    pub fn with_body(mut self, body: SendBodyStream) -> SendMessage {
        self.body = Some(body);
        self
    }

    pub(crate) fn into_parts(self) -> (PseudoHeaders, HeaderMap, Option<SendBodyStream>) {
        (self.pseudo, self.fields, self.body)
    }
}

impl fmt::Debug for SendMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendMessage")
            .field("pseudo", &self.pseudo)
            .field("fields", &self.fields.len())
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
