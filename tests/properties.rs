//! Model-based checks of the admission table over arbitrary frame and
//! reset interleavings.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::task::noop_waker_ref;
use http::{HeaderMap, StatusCode};
use proptest::prelude::*;

use h2_transport::frame::{Data, Frame, Headers, PseudoHeaders, Reason, Reset, StreamId};
use h2_transport::{FrameWriter, Kind, Stats, StreamRef, WriteFuture};

const ID: StreamId = StreamId::new(1);

struct SinkWriter;

impl FrameWriter for SinkWriter {
    fn write_headers(&self, _: Headers) -> WriteFuture {
        Box::pin(async { Ok(()) })
    }

    fn write_data(&self, _: Data) -> WriteFuture {
        Box::pin(async { Ok(()) })
    }

    fn write_reset(&self, _: Reset) {}

    fn update_window(&self, _: StreamId, _: u32) {}
}

#[derive(Default)]
struct ByteStats {
    remote_data_bytes: AtomicUsize,
}

impl Stats for ByteStats {
    fn remote_data(&self, bytes: usize) {
        self.remote_data_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
enum Event {
    Headers { eos: bool },
    Data { eos: bool, len: usize },
    Reset(u32),
    LocalReset(u32),
}

fn event_strategy() -> impl Strategy<Value = Event> {
    prop_oneof![
        any::<bool>().prop_map(|eos| Event::Headers { eos }),
        (any::<bool>(), 0usize..64).prop_map(|(eos, len)| Event::Data { eos, len }),
        (0u32..16).prop_map(Event::Reset),
        (0u32..16).prop_map(Event::LocalReset),
    ]
}

/// Independent rendering of the admission table, used as the oracle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Model {
    Pending,
    Streaming,
    RemoteClosed,
    Closed,
}

struct Step {
    next: Model,
    /// Expected `recv` return value, for frame events.
    admitted: bool,
    /// DATA payload bytes the stats sink must record.
    bytes: usize,
    /// The event delivers the received message.
    delivers: bool,
}

fn apply(model: Model, event: &Event) -> Step {
    let step = |next, admitted, bytes, delivers| Step {
        next,
        admitted,
        bytes,
        delivers,
    };

    match (model, event) {
        (Model::Closed, _) => step(Model::Closed, false, 0, false),
        (_, Event::LocalReset(_)) | (_, Event::Reset(_)) => step(Model::Closed, true, 0, false),

        (Model::Pending, Event::Headers { eos: false }) => step(Model::Streaming, true, 0, true),
        (Model::Pending, Event::Headers { eos: true }) => step(Model::RemoteClosed, true, 0, true),
        (Model::Streaming, Event::Headers { eos: false }) => step(Model::Closed, true, 0, false),
        (Model::Streaming, Event::Headers { eos: true }) => step(Model::RemoteClosed, true, 0, false),
        (Model::RemoteClosed, Event::Headers { .. }) => step(Model::Closed, true, 0, false),

        (Model::Pending, Event::Data { .. }) => step(Model::Closed, true, 0, false),
        (Model::Streaming, Event::Data { eos, len }) => {
            let next = if *eos { Model::RemoteClosed } else { Model::Streaming };
            step(next, true, *len, false)
        }
        (Model::RemoteClosed, Event::Data { .. }) => step(Model::Closed, true, 0, false),
    }
}

fn headers_frame(eos: bool) -> Frame {
    let mut hdrs = Headers::new(ID, PseudoHeaders::response(StatusCode::OK), HeaderMap::new());
    if eos {
        hdrs.set_end_stream();
    }
    hdrs.into()
}

fn data_frame(len: usize, eos: bool) -> Frame {
    let mut data = Data::new(ID, Bytes::from(vec![0u8; len]));
    if eos {
        data.set_end_stream();
    }
    data.into()
}

proptest! {
    /// For any interleaving of inbound frames and local resets, the state
    /// cell ends `Closed`, the terminal signal resolves exactly once, the
    /// message resolves at most once and never before its headers, and the
    /// recorded DATA bytes match the admitted frames.
    #[test]
    fn admission_matches_the_table(events in proptest::collection::vec(event_strategy(), 0..48)) {
        let stats = Arc::new(ByteStats::default());
        let stream = StreamRef::new(ID, Arc::new(SinkWriter), stats.clone(), Kind::Client);

        let mut on_message = stream.on_receive_message();
        let mut message_resolved = false;
        // dropping a streaming body cancels the stream, so the message is
        // held until the end of the run
        let mut held_message = None;
        let mut cx = Context::from_waker(noop_waker_ref());

        let mut model = Model::Pending;
        let mut delivered = false;
        let mut expected_bytes = 0usize;

        for event in &events {
            let step = apply(model, event);

            match event {
                Event::Headers { eos } => {
                    prop_assert_eq!(stream.recv(headers_frame(*eos)), step.admitted);
                }
                Event::Data { eos, len } => {
                    prop_assert_eq!(stream.recv(data_frame(*len, *eos)), step.admitted);
                }
                Event::Reset(code) => {
                    prop_assert_eq!(
                        stream.recv(Reset::new(ID, Reason::from(*code)).into()),
                        step.admitted
                    );
                }
                Event::LocalReset(code) => {
                    stream.local_reset(Reason::from(*code));
                }
            }

            delivered |= step.delivers;
            expected_bytes += step.bytes;
            model = step.next;

            prop_assert_eq!(stream.is_closed(), model == Model::Closed);

            if !message_resolved {
                match Pin::new(&mut on_message).poll(&mut cx) {
                    Poll::Ready(Ok(msg)) => {
                        // never resolves before the initial HEADERS
                        prop_assert!(delivered);
                        held_message = Some(msg);
                        message_resolved = true;
                    }
                    Poll::Ready(Err(_)) => {
                        prop_assert!(stream.is_closed());
                        message_resolved = true;
                    }
                    Poll::Pending => {}
                }
            }
        }

        // force the terminal state and observe the one-shot signal
        stream.local_reset(Reason::CANCEL);
        prop_assert!(stream.is_closed());

        let mut on_reset = stream.on_reset();
        prop_assert!(Pin::new(&mut on_reset).poll(&mut cx).is_ready());

        prop_assert_eq!(stats.remote_data_bytes.load(Ordering::Relaxed), expected_bytes);
        drop(held_message);
    }
}
