use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::{fmt, future::Future, pin::Pin};

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::error::{wrap_producer_error, Interrupt, OperationError, StreamError};
use crate::frame::{contains_connection_headers, Data, Frame, Headers, Reason, Reset, StreamId};
use crate::message::{Chunk, Message, Payload, SendBodyStream, SendMessage};
use crate::queue::FrameQueue;
use crate::state::{Remote, State, StateCell};
use crate::stats::Stats;
use crate::writer::FrameWriter;

/// Role of the local endpoint on a stream.
///
/// A client sends requests and receives responses; a server receives
/// requests and sends responses. The role does not change the state
/// machine, only which message constructors the application uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Client,
    Server,
}

/// Transport for one bidirectional HTTP/2 stream.
///
/// A stream transport sits between the connection's inbound demultiplexer,
/// which feeds it frames through [`recv`](StreamRef::recv), and the
/// application, which sends one message through [`send`](StreamRef::send)
/// and receives one through
/// [`on_receive_message`](StreamRef::on_receive_message).
///
/// All state transitions go through a single atomic cell; `recv`, `send`,
/// resets and cancellations may run on different threads without locks.
#[derive(Clone)]
pub struct StreamRef(Arc<StreamInner>);

pub(crate) struct StreamInner {
    /// The h2 stream identifier
    id: StreamId,
    kind: Kind,
    state: StateCell,
    writer: Arc<dyn FrameWriter>,
    stats: Arc<dyn Stats>,
    /// Body frame queue, installed by the admission that leaves `Pending`.
    queue: OnceLock<Arc<FrameQueue>>,
    /// Terminal reason, set by the transition winner once the state is
    /// `Closed`.
    reason: OnceLock<StreamError>,
    /// Flipped once on close; wakes the outbound loop out of a pending
    /// body read.
    closed: watch::Sender<bool>,
    message_tx: Mutex<Option<oneshot::Sender<Result<Message, StreamError>>>>,
    message_rx: Mutex<Option<oneshot::Receiver<Result<Message, StreamError>>>>,
    reset_tx: Mutex<Option<oneshot::Sender<Result<(), StreamError>>>>,
    reset_rx: Mutex<Option<oneshot::Receiver<Result<(), StreamError>>>>,
}

// ===== impl StreamRef =====

impl StreamRef {
    pub fn new(
        id: StreamId,
        writer: Arc<dyn FrameWriter>,
        stats: Arc<dyn Stats>,
        kind: Kind,
    ) -> StreamRef {
        let (message_tx, message_rx) = oneshot::channel();
        let (reset_tx, reset_rx) = oneshot::channel();
        let (closed, _) = watch::channel(false);

        StreamRef(Arc::new(StreamInner {
            id,
            kind,
            state: StateCell::new(),
            writer,
            stats,
            queue: OnceLock::new(),
            reason: OnceLock::new(),
            closed,
            message_tx: Mutex::new(Some(message_tx)),
            message_rx: Mutex::new(Some(message_rx)),
            reset_tx: Mutex::new(Some(reset_tx)),
            reset_rx: Mutex::new(Some(reset_rx)),
        }))
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.0.id
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.state.load() == State::Closed
    }

    pub(crate) fn remote_half_closed(&self) -> bool {
        matches!(self.0.state.load(), State::RemoteClosed | State::Closed)
    }

    /// One-shot future of the received message: resolves when the peer's
    /// initial HEADERS have been delivered, fails when the stream is aborted
    /// first. Dropping it unresolved cancels the stream.
    ///
    /// Panics if taken more than once.
    pub fn on_receive_message(&self) -> OnMessage {
        let rx = self
            .0
            .message_rx
            .lock()
            .take()
            .expect("on_receive_message may only be taken once");
        OnMessage {
            stream: self.clone(),
            rx,
            done: false,
        }
    }

    /// One-shot terminal signal: resolves `Ok` when the stream closes with
    /// `NO_ERROR`, and with the stream error otherwise.
    ///
    /// Panics if taken more than once.
    pub fn on_reset(&self) -> OnReset {
        let rx = self
            .0
            .reset_rx
            .lock()
            .take()
            .expect("on_reset may only be taken once");
        OnReset {
            stream: self.clone(),
            rx,
        }
    }

    /// Admit an inbound frame.
    ///
    /// Never suspends. Returns `false` when the stream was already closed
    /// and the frame did not advance the state; the value is advisory, a
    /// dispatcher may log or ignore it.
    pub fn recv(&self, frame: Frame) -> bool {
        debug_assert_eq!(frame.stream_id(), self.0.id);

        match frame {
            Frame::Headers(hdrs) => self.recv_headers(hdrs),
            Frame::Data(data) => self.recv_data(data),
            Frame::Reset(frm) => self.recv_rst_stream(frm),
        }
    }

    fn recv_headers(&self, hdrs: Headers) -> bool {
        log::trace!(
            "{:?} processing HEADERS, state: {:?}",
            self.0.id,
            self.0.state
        );
        let eos = hdrs.is_end_stream();

        loop {
            let state = self.0.state.load();
            match (state, eos) {
                (State::Closed, _) => return false,

                // initial headers
                (State::Open { remote: Remote::Pending }, false)
                | (State::LocalClosed { remote: Remote::Pending }, false) => {
                    if self.reject_message_headers(&hdrs) {
                        return true;
                    }
                    let queue = self.install_queue(false);
                    let next = match state {
                        State::Open { .. } => State::Open {
                            remote: Remote::Streaming,
                        },
                        _ => State::LocalClosed {
                            remote: Remote::Streaming,
                        },
                    };
                    if !self.0.state.transition(state, next) {
                        continue;
                    }
                    self.deliver_message(hdrs, Payload::queued(self.clone(), queue));
                    return true;
                }

                // initial headers ending the remote half
                (State::Open { remote: Remote::Pending }, true) => {
                    if self.reject_message_headers(&hdrs) {
                        return true;
                    }
                    // the queue stays empty; it exists so a later reset has
                    // something to poison while reads are in flight
                    let queue = self.install_queue(true);
                    queue.close();
                    if !self.0.state.transition(state, State::RemoteClosed) {
                        continue;
                    }
                    self.deliver_message(hdrs, Payload::queued(self.clone(), queue));
                    return true;
                }
                (State::LocalClosed { remote: Remote::Pending }, true) => {
                    if self.reject_message_headers(&hdrs) {
                        return true;
                    }
                    if !self.0.state.transition(state, State::Closed) {
                        continue;
                    }
                    let err = StreamError::Local(Reason::NO_ERROR);
                    let _ = self.0.reason.set(err);
                    self.deliver_message(hdrs, Payload::empty(self.clone()));
                    self.resolve_reset(err);
                    return true;
                }

                // trailers
                (State::Open { remote: Remote::Streaming }, true) => {
                    if contains_connection_headers(hdrs.fields()) {
                        self.reject_headers();
                        return true;
                    }
                    if !self.0.state.transition(state, State::RemoteClosed) {
                        continue;
                    }
                    let queue = self.0.queue.get().expect("streaming state without a queue");
                    queue.offer(Chunk::Trailers(hdrs.into_fields()));
                    queue.close();
                    self.0.stats.remote_trailers();
                    return true;
                }
                (State::LocalClosed { remote: Remote::Streaming }, true) => {
                    if contains_connection_headers(hdrs.fields()) {
                        self.reject_headers();
                        return true;
                    }
                    if !self.0.state.transition(state, State::Closed) {
                        continue;
                    }
                    let err = StreamError::Local(Reason::NO_ERROR);
                    let _ = self.0.reason.set(err);
                    let queue = self.0.queue.get().expect("streaming state without a queue");
                    queue.offer(Chunk::Trailers(hdrs.into_fields()));
                    queue.close();
                    self.0.stats.remote_trailers();
                    self.resolve_reset(err);
                    return true;
                }

                // a second headers block that is not trailers
                (State::Open { remote: Remote::Streaming }, false)
                | (State::LocalClosed { remote: Remote::Streaming }, false) => {
                    log::debug!("{:?} unexpected HEADERS while streaming", self.0.id);
                    self.local_reset(Reason::INTERNAL_ERROR);
                    return true;
                }

                (State::RemoteClosed, false) => {
                    log::debug!("{:?} HEADERS received on closed remote half", self.0.id);
                    self.local_reset(Reason::STREAM_CLOSED);
                    return true;
                }
                (State::RemoteClosed, true) => {
                    log::debug!("{:?} trailers received on closed remote half", self.0.id);
                    self.local_reset(Reason::INTERNAL_ERROR);
                    return true;
                }
            }
        }
    }

    fn recv_data(&self, data: Data) -> bool {
        log::trace!(
            "{:?} processing DATA frame: {:?} bytes, state: {:?}",
            self.0.id,
            data.payload().len(),
            self.0.state
        );
        let eos = data.is_end_stream();

        loop {
            let state = self.0.state.load();
            match state {
                State::Closed => return false,

                State::Open { remote: Remote::Pending }
                | State::LocalClosed { remote: Remote::Pending } => {
                    log::debug!("{:?} DATA received before initial HEADERS", self.0.id);
                    self.local_reset(Reason::INTERNAL_ERROR);
                    return true;
                }

                State::RemoteClosed => {
                    log::debug!("{:?} DATA received on closed remote half", self.0.id);
                    self.local_reset(Reason::STREAM_CLOSED);
                    return true;
                }

                State::Open { remote: Remote::Streaming } => {
                    if eos {
                        if !self.0.state.transition(state, State::RemoteClosed) {
                            continue;
                        }
                        let queue =
                            self.0.queue.get().expect("streaming state without a queue").clone();
                        self.offer_data(&queue, data);
                        queue.close();
                    } else {
                        let queue =
                            self.0.queue.get().expect("streaming state without a queue").clone();
                        self.offer_data(&queue, data);
                    }
                    return true;
                }

                State::LocalClosed { remote: Remote::Streaming } => {
                    if eos {
                        if !self.0.state.transition(state, State::Closed) {
                            continue;
                        }
                        let err = StreamError::Local(Reason::NO_ERROR);
                        let _ = self.0.reason.set(err);
                        let queue =
                            self.0.queue.get().expect("streaming state without a queue").clone();
                        self.offer_data(&queue, data);
                        queue.close();
                        self.resolve_reset(err);
                    } else {
                        let queue =
                            self.0.queue.get().expect("streaming state without a queue").clone();
                        self.offer_data(&queue, data);
                    }
                    return true;
                }
            }
        }
    }

    fn recv_rst_stream(&self, frm: Reset) -> bool {
        log::trace!("{:?} processing RESET: {:?}", self.0.id, frm.reason());
        if self.try_reset(StreamError::Remote(frm.reason())) {
            self.0.stats.remote_reset();
            true
        } else {
            false
        }
    }

    /// Enqueue an admitted DATA frame, attaching its window refund handle.
    /// A rejected offer means the queue was poisoned under us; the reset
    /// that poisoned it wins.
    fn offer_data(&self, queue: &FrameQueue, data: Data) {
        let len = data.payload().len();
        let capacity = Capacity::new(len as u32, &self.0);
        if queue.offer(Chunk::Data {
            payload: data.into_payload(),
            capacity,
        }) {
            self.0.stats.remote_data(len);
        } else {
            log::trace!("{:?} body queue rejected DATA frame", self.0.id);
            self.local_reset(Reason::STREAM_CLOSED);
        }
    }

    /// Reject inbound headers carrying connection-specific fields.
    fn reject_headers(&self) {
        log::debug!("{:?} connection-specific headers received", self.0.id);
        self.local_reset(Reason::PROTOCOL_ERROR);
    }

    /// Validate headers that would deliver a received message: they must be
    /// free of connection-specific fields, and their pseudo section must
    /// match the local role (a client receives responses, a server receives
    /// requests). Returns `true` after rejecting, and the frame is consumed.
    fn reject_message_headers(&self, hdrs: &Headers) -> bool {
        if contains_connection_headers(hdrs.fields()) {
            self.reject_headers();
            return true;
        }
        let matches_kind = match self.0.kind {
            Kind::Client => hdrs.pseudo().is_response(),
            Kind::Server => hdrs.pseudo().is_request(),
        };
        if !matches_kind {
            log::debug!(
                "{:?} pseudo headers do not fit a {:?} stream",
                self.0.id,
                self.0.kind
            );
            self.local_reset(Reason::PROTOCOL_ERROR);
            return true;
        }
        false
    }

    fn install_queue(&self, empty_body: bool) -> Arc<FrameQueue> {
        self.0
            .queue
            .get_or_init(|| {
                Arc::new(if empty_body {
                    FrameQueue::bounded(1)
                } else {
                    FrameQueue::unbounded()
                })
            })
            .clone()
    }

    fn deliver_message(&self, hdrs: Headers, payload: Payload) {
        let (pseudo, fields) = hdrs.into_parts();
        let message = Message::new(pseudo, fields, payload);
        if let Some(tx) = self.0.message_tx.lock().take() {
            if tx.send(Ok(message)).is_err() {
                log::trace!("{:?} receiver is gone, message dropped", self.0.id);
            }
        }
    }

    /// Send a message on the local half of the stream.
    ///
    /// The returned future resolves once the initial HEADERS have been
    /// written; its value is a second future that resolves once the whole
    /// body (including the END_STREAM frame or trailers) has been written.
    /// Dropping either future before it resolves cancels the stream.
    pub fn send(&self, message: SendMessage) -> SendHeaders {
        let stream = self.clone();
        let (pseudo, fields, body) = message.into_parts();

        let fut = Box::pin(async move {
            match stream.0.state.load() {
                State::Closed => {
                    return Err(OperationError::Stream(stream.close_reason()));
                }
                State::LocalClosed { .. } => {
                    return Err(OperationError::IllegalState("local half already closed"));
                }
                _ => {}
            }

            if contains_connection_headers(&fields) {
                log::debug!("{:?} connection-specific headers in message", stream.0.id);
                stream.local_reset(Reason::PROTOCOL_ERROR);
                return Err(StreamError::Local(Reason::PROTOCOL_ERROR).into());
            }

            let mut hdrs = Headers::new(stream.0.id, pseudo, fields);
            let eos = body.is_none();
            if eos {
                hdrs.set_end_stream();
            }
            log::trace!("{:?} sending headers, eos: {}", stream.0.id, eos);
            stream.write_headers_frame(hdrs).await?;

            if eos {
                stream.close_local()?;
                Ok(SendBody {
                    stream: stream.clone(),
                    fut: None,
                    done: true,
                })
            } else {
                let drain = stream.clone();
                let body = body.expect("checked above");
                Ok(SendBody {
                    stream: stream.clone(),
                    fut: Some(Box::pin(async move { drain.drain_body(body).await })),
                    done: false,
                })
            }
        });

        SendHeaders {
            stream: self.clone(),
            fut,
            done: false,
        }
    }

    /// Drain the outbound body, one frame at a time, until a frame with
    /// END_STREAM has been written.
    async fn drain_body(&self, mut body: SendBodyStream) -> Result<(), OperationError> {
        let mut closed = self.0.closed.subscribe();
        loop {
            if self.0.state.load() == State::Closed {
                return Err(self.close_reason().into());
            }

            let item = tokio::select! {
                // a reset interrupts a pending body read
                _ = closed.changed() => continue,
                item = body.next() => item,
            };

            match item {
                Some(Ok(chunk)) => match chunk {
                    crate::message::SendChunk::Data {
                        payload,
                        end_stream,
                    } => {
                        let len = payload.len();
                        let mut data = Data::new(self.0.id, payload);
                        if end_stream {
                            data.set_end_stream();
                        }
                        self.write_data_frame(data).await?;
                        self.0.stats.local_data(len);
                        if end_stream {
                            self.close_local()?;
                            return Ok(());
                        }
                    }
                    crate::message::SendChunk::Trailers(fields) => {
                        if contains_connection_headers(&fields) {
                            log::debug!(
                                "{:?} connection-specific headers in trailers",
                                self.0.id
                            );
                            self.local_reset(Reason::PROTOCOL_ERROR);
                            return Err(StreamError::Local(Reason::PROTOCOL_ERROR).into());
                        }
                        let hdrs = Headers::trailers(self.0.id, fields);
                        self.write_headers_frame(hdrs).await?;
                        self.0.stats.local_trailers();
                        self.close_local()?;
                        return Ok(());
                    }
                },
                Some(Err(err)) => {
                    let err = wrap_producer_error(err);
                    self.reset_with(err);
                    return Err(err.into());
                }
                None => {
                    // the producer ended without an END_STREAM frame;
                    // complete the half-stream for it
                    let mut data = Data::new(self.0.id, Bytes::new());
                    data.set_end_stream();
                    self.write_data_frame(data).await?;
                    self.close_local()?;
                    return Ok(());
                }
            }
        }
    }

    async fn write_headers_frame(&self, hdrs: Headers) -> Result<(), OperationError> {
        if let Err(err) = self.0.writer.write_headers(hdrs).await {
            log::debug!("{:?} writing HEADERS failed: {}", self.0.id, err);
            self.remote_reset(Reason::INTERNAL_ERROR);
            return Err(StreamError::Remote(Reason::INTERNAL_ERROR).into());
        }
        Ok(())
    }

    async fn write_data_frame(&self, data: Data) -> Result<(), OperationError> {
        if let Err(err) = self.0.writer.write_data(data).await {
            log::debug!("{:?} writing DATA failed: {}", self.0.id, err);
            self.remote_reset(Reason::INTERNAL_ERROR);
            return Err(StreamError::Remote(Reason::INTERNAL_ERROR).into());
        }
        Ok(())
    }

    /// The local half has sent END_STREAM.
    fn close_local(&self) -> Result<(), OperationError> {
        loop {
            let state = self.0.state.load();
            match state {
                State::Open { remote } => {
                    if self.0.state.transition(state, State::LocalClosed { remote }) {
                        log::trace!("{:?} local half closed", self.0.id);
                        return Ok(());
                    }
                }
                State::RemoteClosed => {
                    if self.0.state.transition(state, State::Closed) {
                        log::trace!("{:?} closed", self.0.id);
                        let err = StreamError::Local(Reason::NO_ERROR);
                        let _ = self.0.reason.set(err);
                        self.resolve_reset(err);
                        return Ok(());
                    }
                }
                State::LocalClosed { .. } => {
                    // double close is a bug in the caller
                    if self.0.state.transition(state, State::Closed) {
                        log::debug!("{:?} local half closed twice", self.0.id);
                        self.teardown(StreamError::Local(Reason::INTERNAL_ERROR));
                        return Err(OperationError::IllegalState("local half already closed"));
                    }
                }
                State::Closed => return Ok(()),
            }
        }
    }

    /// Abort the stream from this side. Emits RST_STREAM; a no-op once the
    /// stream is closed.
    pub fn local_reset(&self, reason: Reason) {
        if self.try_reset(StreamError::Local(reason)) {
            log::trace!("{:?} reset locally: {:?}", self.0.id, reason);
            self.0.stats.local_reset();
            self.0.writer.write_reset(Reset::new(self.0.id, reason));
        }
    }

    /// Abort the stream on behalf of the peer. Nothing is written to the
    /// wire; a no-op once the stream is closed.
    pub fn remote_reset(&self, reason: Reason) {
        if self.try_reset(StreamError::Remote(reason)) {
            log::trace!("{:?} reset by peer: {:?}", self.0.id, reason);
            self.0.stats.remote_reset();
        }
    }

    fn reset_with(&self, err: StreamError) {
        match err {
            StreamError::Local(reason) => self.local_reset(reason),
            StreamError::Remote(reason) => self.remote_reset(reason),
        }
    }

    /// CAS any resettable state to `Closed` and tear down what the prior
    /// state owned. Returns `false` if the stream was already closed.
    fn try_reset(&self, err: StreamError) -> bool {
        loop {
            let state = self.0.state.load();
            if state == State::Closed {
                return false;
            }
            if self.0.state.transition(state, State::Closed) {
                self.teardown(err);
                return true;
            }
        }
    }

    /// Runs once, by the thread that won the transition to `Closed`: fail
    /// the pending message promise and the body queue, then resolve the
    /// terminal signal.
    fn teardown(&self, err: StreamError) {
        let _ = self.0.reason.set(err);
        if let Some(tx) = self.0.message_tx.lock().take() {
            let _ = tx.send(Err(err));
        }
        if let Some(queue) = self.0.queue.get() {
            queue.fail(err, true);
        }
        self.resolve_reset(err);
    }

    fn resolve_reset(&self, err: StreamError) {
        self.0.closed.send_replace(true);
        if let Some(tx) = self.0.reset_tx.lock().take() {
            let _ = tx.send(if err.reason() == Reason::NO_ERROR {
                Ok(())
            } else {
                Err(err)
            });
        }
    }

    fn close_reason(&self) -> StreamError {
        // the reason is published right after the winning transition; the
        // fallback covers a reader racing that window
        *self
            .0
            .reason
            .get()
            .unwrap_or(&StreamError::Local(Reason::STREAM_CLOSED))
    }
}

impl fmt::Debug for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("state", &self.0.state)
            .finish()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        if self.state.load() != State::Closed {
            log::trace!("{:?} dropped while open, sending RST_STREAM", self.id);
            self.stats.local_reset();
            self.writer.write_reset(Reset::new(self.id, Reason::CANCEL));
        }
    }
}

// ===== impl Capacity =====

/// Window refund handle attached to every received DATA chunk.
///
/// The bytes of a DATA frame occupy the stream's flow-control window until
/// the application has finished with them. Releasing capacity (or dropping
/// the handle, which releases the remainder) emits a WINDOW_UPDATE for the
/// stream by the amount consumed.
pub struct Capacity {
    remaining: AtomicU32,
    stream: Option<Arc<StreamInner>>,
}

impl Capacity {
    fn new(size: u32, stream: &Arc<StreamInner>) -> Capacity {
        Capacity {
            remaining: AtomicU32::new(size),
            stream: Some(stream.clone()),
        }
    }

    /// A handle tied to no stream, refunding nowhere.
    #[cfg(test)]
    pub(crate) fn null() -> Capacity {
        Capacity {
            remaining: AtomicU32::new(0),
            stream: None,
        }
    }

    pub fn size(&self) -> u32 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Release `size` bytes back to the peer's flow window.
    ///
    /// Panics if `size` exceeds the remaining capacity.
    pub fn release(&self, size: u32) {
        let mut current = self.remaining.load(Ordering::Relaxed);
        loop {
            let Some(rest) = current.checked_sub(size) else {
                panic!("capacity overflow");
            };
            match self.remaining.compare_exchange(
                current,
                rest,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.refund(size);
    }

    fn refund(&self, size: u32) {
        if size > 0 {
            if let Some(stream) = &self.stream {
                log::trace!("{:?} refunding {} bytes to the peer window", stream.id, size);
                stream.writer.update_window(stream.id, size);
            }
        }
    }
}

impl Drop for Capacity {
    fn drop(&mut self) {
        let rest = self.remaining.swap(0, Ordering::Relaxed);
        self.refund(rest);
    }
}

impl fmt::Debug for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capacity")
            .field("remaining", &self.size())
            .finish()
    }
}

// ===== one-shot futures =====

/// Future of the received message. See
/// [`StreamRef::on_receive_message`].
///
/// Dropping it before it resolves cancels the stream with `CANCEL`;
/// [`abort`](OnMessage::abort) maps other application interrupts to their
/// reset codes.
pub struct OnMessage {
    stream: StreamRef,
    rx: oneshot::Receiver<Result<Message, StreamError>>,
    done: bool,
}

impl OnMessage {
    /// Stop waiting for the message and abort the stream, announcing the
    /// interrupt's reset code to the peer.
    pub fn abort(mut self, interrupt: Interrupt) {
        self.done = true;
        self.stream.local_reset(interrupt.reason());
    }
}

impl Future for OnMessage {
    type Output = Result<Message, StreamError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(res)) => {
                this.done = true;
                Poll::Ready(res)
            }
            Poll::Ready(Err(_)) => {
                // the transport never drops the sender without a value
                this.done = true;
                Poll::Ready(Err(this.stream.close_reason()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for OnMessage {
    fn drop(&mut self) {
        if !self.done {
            self.stream.local_reset(Reason::CANCEL);
        }
    }
}

impl fmt::Debug for OnMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnMessage")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}

/// Terminal signal of the stream. See [`StreamRef::on_reset`].
pub struct OnReset {
    stream: StreamRef,
    rx: oneshot::Receiver<Result<(), StreamError>>,
}

impl Future for OnReset {
    type Output = Result<(), StreamError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(this.stream.close_reason())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for OnReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnReset")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}

// ===== send futures =====

/// First phase of a send: resolves once the initial HEADERS have been
/// written, yielding the body-completion future. Dropping it unresolved
/// cancels the stream.
pub struct SendHeaders {
    stream: StreamRef,
    fut: Pin<Box<dyn Future<Output = Result<SendBody, OperationError>> + Send>>,
    done: bool,
}

impl Future for SendHeaders {
    type Output = Result<SendBody, OperationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.fut.as_mut().poll(cx) {
            Poll::Ready(res) => {
                this.done = true;
                Poll::Ready(res)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SendHeaders {
    fn drop(&mut self) {
        if !self.done {
            log::trace!("{:?} send cancelled before headers", self.stream.id());
            self.stream.local_reset(Reason::CANCEL);
        }
    }
}

impl fmt::Debug for SendHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendHeaders")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}

/// Second phase of a send: resolves once the whole body, including the
/// END_STREAM frame or trailers, has been written. Dropping it while the
/// body is still being drained cancels the stream.
pub struct SendBody {
    stream: StreamRef,
    fut: Option<Pin<Box<dyn Future<Output = Result<(), OperationError>> + Send>>>,
    done: bool,
}

impl Future for SendBody {
    type Output = Result<(), OperationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.fut.as_mut() {
            None => {
                this.done = true;
                Poll::Ready(Ok(()))
            }
            Some(fut) => match fut.as_mut().poll(cx) {
                Poll::Ready(res) => {
                    this.done = true;
                    Poll::Ready(res)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl Drop for SendBody {
    fn drop(&mut self) {
        if !self.done {
            log::trace!("{:?} send cancelled mid-body", self.stream.id());
            self.stream.local_reset(Reason::CANCEL);
        }
    }
}

impl fmt::Debug for SendBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendBody")
            .field("stream_id", &self.stream.id())
            .finish()
    }
}
