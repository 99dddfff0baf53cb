use std::{error, fmt};

use crate::frame::Reason;

/// Boxed error produced by an outbound body stream.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// A stream-level abort, tagged with the side that initiated it.
///
/// The tag determines the wire behavior: a `Local` abort must be announced
/// to the peer with a RST_STREAM frame, while a `Remote` abort is already
/// the consequence of receiving one and is absorbed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StreamError {
    /// Abort initiated on this side of the connection.
    Local(Reason),
    /// Abort initiated by the peer.
    Remote(Reason),
}

impl StreamError {
    /// The HTTP/2 error code carried by the abort.
    pub fn reason(&self) -> Reason {
        match *self {
            StreamError::Local(reason) | StreamError::Remote(reason) => reason,
        }
    }

    /// Returns true if the abort was initiated on this side.
    pub fn is_local(&self) -> bool {
        matches!(self, StreamError::Local(_))
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StreamError::Local(reason) => write!(fmt, "stream error detected: {}", reason),
            StreamError::Remote(reason) => write!(fmt, "stream error received: {}", reason),
        }
    }
}

impl error::Error for StreamError {}

/// Errors returned by transport operations.
#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperationError {
    /// The stream was aborted.
    #[error("{0}")]
    Stream(#[from] StreamError),

    /// The operation is not legal in the current stream state. This is a bug
    /// in the calling code, not a protocol event.
    #[error("illegal stream state: {0}")]
    IllegalState(&'static str),
}

impl OperationError {
    /// The stream abort behind this error, if any.
    pub fn stream_error(&self) -> Option<StreamError> {
        match *self {
            OperationError::Stream(err) => Some(err),
            OperationError::IllegalState(_) => None,
        }
    }
}

/// Application-side interruption of
/// [`on_receive_message`](crate::StreamRef::on_receive_message).
///
/// Each interrupt maps to the error code of the local reset it triggers.
#[derive(Debug, Clone, Copy)]
pub enum Interrupt {
    /// Abort with an explicit error code.
    Reset(Reason),
    /// Abort caused by an earlier stream error.
    Stream(StreamError),
    /// The application is no longer interested in the message.
    Cancelled,
    /// The application is shedding load.
    Rejected,
    /// Any other failure.
    Other,
}

impl Interrupt {
    pub(crate) fn reason(&self) -> Reason {
        match *self {
            Interrupt::Reset(reason) => reason,
            Interrupt::Stream(err) => err.reason(),
            Interrupt::Cancelled => Reason::CANCEL,
            Interrupt::Rejected => Reason::REFUSED_STREAM,
            Interrupt::Other => Reason::INTERNAL_ERROR,
        }
    }
}

/// Classify an outbound body stream failure. A `StreamError` raised by the
/// producer passes through unchanged; anything else becomes a local abort.
pub(crate) fn wrap_producer_error(err: BoxError) -> StreamError {
    match err.downcast::<StreamError>() {
        Ok(err) => *err,
        Err(err) => {
            log::debug!("outbound body stream failed: {}", err);
            StreamError::Local(Reason::INTERNAL_ERROR)
        }
    }
}
