//! Per-stream transport state machine for HTTP/2.
//!
//! This library implements the stream-lifecycle state machine of
//! [RFC 7540 §5.1] for a single bidirectional HTTP/2 stream, as used inside
//! a proxy or RPC runtime that multiplexes many streams over one connection.
//! It is decoupled from the wire: the connection owns the socket, the
//! framing codec and HPACK, and hands each stream transport its already
//! decoded frames.
//!
//! # Layout
//!
//! One [`StreamRef`] exists per stream. The connection's inbound
//! demultiplexer feeds it frames through [`StreamRef::recv`]; the
//! application sends its message through [`StreamRef::send`] and receives
//! the peer's through [`StreamRef::on_receive_message`]. Outbound frames
//! leave through the injected [`FrameWriter`], and per-stream events are
//! recorded on the injected [`Stats`] sink.
//!
//! # Concurrency
//!
//! The state machine is lock-free: the stream state lives in a single
//! atomic cell and every transition is a compare-and-set, retried against
//! the freshly read state when it fails. `recv`, `send`, cancellation and
//! the terminal [`StreamRef::on_reset`] signal may all run on different
//! threads.
//!
//! Either side may abort the stream. A locally originated reset is
//! announced to the peer with RST_STREAM; a reset received from the peer is
//! absorbed. Both poison the received body so that pending reads fail, and
//! both resolve the terminal signal exactly once.
//!
//! [RFC 7540 §5.1]: https://httpwg.org/specs/rfc7540.html#StreamStates

#![deny(rust_2018_idioms)]
#![cfg_attr(test, deny(warnings))]

mod error;
mod message;
mod queue;
mod state;
mod stats;
mod stream;
mod writer;

pub mod frame;

pub use self::error::{BoxError, Interrupt, OperationError, StreamError};
pub use self::message::{Chunk, Message, Payload, SendBodyStream, SendChunk, SendMessage};
pub use self::stats::{NullStats, Stats};
pub use self::stream::{
    Capacity, Kind, OnMessage, OnReset, SendBody, SendHeaders, StreamRef,
};
pub use self::writer::{FrameWriter, WriteFuture};
