use std::collections::VecDeque;
use std::task::{Context, Poll};

use futures_util::task::AtomicWaker;
use parking_lot::Mutex;

use crate::error::StreamError;
use crate::frame::Reason;
use crate::message::Chunk;

/// Inbound body frame queue.
///
/// Single producer (the frame admission running on the connection's
/// demultiplexer), single consumer (the application draining the body).
///
/// The queue has two terminal marks. `close` records a clean end of stream:
/// buffered frames stay readable and the reader then observes the end.
/// `fail` poisons the queue: with `discard` the buffer is dropped and the
/// next read fails immediately, without it the buffered tail drains first.
pub(crate) struct FrameQueue {
    inner: Mutex<Inner>,
    waker: AtomicWaker,
}

struct Inner {
    buf: VecDeque<Chunk>,
    capacity: Option<usize>,
    eos: bool,
    failed: Option<StreamError>,
}

impl FrameQueue {
    pub(crate) fn unbounded() -> FrameQueue {
        FrameQueue::with_capacity(None)
    }

    pub(crate) fn bounded(capacity: usize) -> FrameQueue {
        FrameQueue::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> FrameQueue {
        FrameQueue {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                capacity,
                eos: false,
                failed: None,
            }),
            waker: AtomicWaker::new(),
        }
    }

    /// Enqueue a frame for the consumer. Returns `false` if the queue no
    /// longer accepts frames (closed, failed, or bounded and full).
    pub(crate) fn offer(&self, chunk: Chunk) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.eos || inner.failed.is_some() {
                return false;
            }
            if let Some(capacity) = inner.capacity {
                if inner.buf.len() >= capacity {
                    return false;
                }
            }
            inner.buf.push_back(chunk);
        }
        self.waker.wake();
        true
    }

    /// Mark the clean end of the stream. Buffered frames remain readable.
    pub(crate) fn close(&self) {
        self.inner.lock().eos = true;
        self.waker.wake();
    }

    /// Poison the queue. The first failure wins; `discard` drops any
    /// buffered frames so the next read fails immediately.
    pub(crate) fn fail(&self, err: StreamError, discard: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.failed.is_none() {
                inner.failed = Some(err);
            }
            if discard {
                inner.buf.clear();
            }
        }
        self.waker.wake();
    }

    /// Pull the next frame. `Ok(None)` is the end of the stream.
    pub(crate) fn poll_read(
        &self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Chunk>, StreamError>> {
        let mut inner = self.inner.lock();
        if let Some(chunk) = inner.buf.pop_front() {
            return Poll::Ready(Ok(Some(chunk)));
        }
        if let Some(err) = inner.failed {
            return Poll::Ready(if err.reason() == Reason::NO_ERROR {
                Ok(None)
            } else {
                Err(err)
            });
        }
        if inner.eos {
            return Poll::Ready(Ok(None));
        }
        // registering under the lock closes the race with a concurrent offer
        self.waker.register(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures_util::task::noop_waker_ref;
    use http::HeaderMap;

    use super::FrameQueue;
    use crate::error::StreamError;
    use crate::frame::Reason;
    use crate::message::Chunk;

    fn data(payload: &'static str) -> Chunk {
        Chunk::Data {
            payload: Bytes::from_static(payload.as_bytes()),
            capacity: crate::stream::Capacity::null(),
        }
    }

    fn read(q: &FrameQueue) -> Poll<Result<Option<Chunk>, StreamError>> {
        q.poll_read(&mut Context::from_waker(noop_waker_ref()))
    }

    #[test]
    fn frames_drain_in_order() {
        let q = FrameQueue::unbounded();
        assert!(q.offer(data("a")));
        assert!(q.offer(Chunk::Trailers(HeaderMap::new())));
        q.close();

        assert!(matches!(read(&q), Poll::Ready(Ok(Some(Chunk::Data { .. })))));
        assert!(matches!(
            read(&q),
            Poll::Ready(Ok(Some(Chunk::Trailers(_))))
        ));
        assert!(matches!(read(&q), Poll::Ready(Ok(None))));
        // end of stream is sticky
        assert!(matches!(read(&q), Poll::Ready(Ok(None))));
    }

    #[test]
    fn offer_after_close_is_rejected() {
        let q = FrameQueue::unbounded();
        q.close();
        assert!(!q.offer(data("late")));
    }

    #[test]
    fn bounded_queue_rejects_overflow() {
        let q = FrameQueue::bounded(1);
        assert!(q.offer(data("a")));
        assert!(!q.offer(data("b")));
    }

    #[test]
    fn fail_without_discard_drains_the_tail() {
        let q = FrameQueue::unbounded();
        assert!(q.offer(data("tail")));
        q.fail(StreamError::Remote(Reason::CANCEL), false);

        assert!(matches!(read(&q), Poll::Ready(Ok(Some(Chunk::Data { .. })))));
        assert!(matches!(
            read(&q),
            Poll::Ready(Err(StreamError::Remote(Reason::CANCEL)))
        ));
    }

    #[test]
    fn fail_with_discard_drops_the_tail() {
        let q = FrameQueue::unbounded();
        assert!(q.offer(data("tail")));
        q.fail(StreamError::Remote(Reason::CANCEL), true);

        assert!(matches!(
            read(&q),
            Poll::Ready(Err(StreamError::Remote(Reason::CANCEL)))
        ));
    }

    #[test]
    fn first_failure_wins() {
        let q = FrameQueue::unbounded();
        q.fail(StreamError::Local(Reason::PROTOCOL_ERROR), true);
        q.fail(StreamError::Remote(Reason::CANCEL), true);

        assert!(matches!(
            read(&q),
            Poll::Ready(Err(StreamError::Local(Reason::PROTOCOL_ERROR)))
        ));
    }

    #[test]
    fn no_error_failure_reads_as_end_of_stream() {
        let q = FrameQueue::unbounded();
        q.fail(StreamError::Local(Reason::NO_ERROR), false);
        assert!(matches!(read(&q), Poll::Ready(Ok(None))));
    }

    #[test]
    fn poison_after_close_fails_pending_reads() {
        let q = FrameQueue::bounded(1);
        q.close();
        assert!(matches!(read(&q), Poll::Ready(Ok(None))));

        q.fail(StreamError::Remote(Reason::CANCEL), true);
        assert!(matches!(
            read(&q),
            Poll::Ready(Err(StreamError::Remote(Reason::CANCEL)))
        ));
    }
}
