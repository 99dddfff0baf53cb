//! Per-stream metrics sink.

/// Collector for per-stream transport events.
///
/// `local` is this side of the stream, `remote` is the peer. The host
/// injects an implementation backed by its metrics registry; when it has
/// none, [`NullStats`] is the null object to pass.
pub trait Stats: Send + Sync + 'static {
    /// Stream aborted by this side; a RST_STREAM was emitted.
    fn local_reset(&self) {}

    /// Stream aborted by the peer.
    fn remote_reset(&self) {}

    /// Trailers written to the peer.
    fn local_trailers(&self) {}

    /// Trailers received from the peer.
    fn remote_trailers(&self) {}

    /// DATA frame written to the peer, with its payload size.
    fn local_data(&self, bytes: usize) {
        let _ = bytes;
    }

    /// DATA frame admitted from the peer, with its payload size.
    fn remote_data(&self, bytes: usize) {
        let _ = bytes;
    }
}

/// Stats sink that records nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullStats;

impl Stats for NullStats {}
