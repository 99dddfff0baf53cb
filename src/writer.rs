use std::{future::Future, io, net, pin::Pin};

use crate::frame::{Data, Headers, Reset, StreamId};

/// Completion of a frame write.
pub type WriteFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

/// The connection-side frame sink a stream transport writes into.
///
/// An implementation wraps the connection's encoder and write buffer. It is
/// serialized by its owner; a stream transport never issues concurrent
/// writes from within itself (the outbound loop is strictly sequential).
///
/// Writes must be accepted at call time: `write_headers` and `write_data`
/// enqueue the frame immediately and return a future that resolves once the
/// frame has been flushed. RST_STREAM and WINDOW_UPDATE are fire-and-forget
/// enqueues, as they are emitted from paths that cannot suspend.
pub trait FrameWriter: Send + Sync + 'static {
    /// Write a HEADERS (or trailers) frame.
    fn write_headers(&self, headers: Headers) -> WriteFuture;

    /// Write a DATA frame.
    fn write_data(&self, data: Data) -> WriteFuture;

    /// Enqueue a RST_STREAM frame.
    fn write_reset(&self, reset: Reset);

    /// Enqueue a WINDOW_UPDATE frame increasing the stream's window by
    /// `delta` bytes.
    fn update_window(&self, stream_id: StreamId, delta: u32);

    /// Local address of the underlying connection, for log output.
    fn local_addr(&self) -> Option<net::SocketAddr> {
        None
    }

    /// Peer address of the underlying connection, for log output.
    fn peer_addr(&self) -> Option<net::SocketAddr> {
        None
    }
}
