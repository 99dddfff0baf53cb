use bytes::Bytes;

use crate::frame::{Frame, StreamId};

/// Data frame
///
/// Data frames convey arbitrary, variable-length sequences of octets
/// associated with a stream. One or more DATA frames are used, for instance,
/// to carry HTTP request or response payloads.
///
/// This is the post-decode form: padding has already been stripped by the
/// connection codec.
#[derive(Clone, Eq, PartialEq)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    end_stream: bool,
}

impl Data {
    /// Creates a new DATA frame.
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        debug_assert!(!stream_id.is_zero());

        Data {
            stream_id,
            data: payload,
            end_stream: false,
        }
    }

    /// Returns the stream identifier that this frame is associated with.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Gets the value of the `END_STREAM` flag for this frame.
    ///
    /// If true, this frame is the last that the endpoint will send for the
    /// identified stream.
    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// Sets the value for the `END_STREAM` flag on this frame.
    pub fn set_end_stream(&mut self) {
        self.end_stream = true;
    }

    /// Returns a reference to this frame's payload.
    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    /// Consumes `self` and returns the frame's payload.
    pub fn into_payload(self) -> Bytes {
        self.data
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Self {
        Frame::Data(src)
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = fmt.debug_struct("Data");
        f.field("stream_id", &self.stream_id);
        f.field("data_len", &self.data.len());
        if self.end_stream {
            f.field("flags", &"END_STREAM");
        }
        // `data` bytes purposefully excluded
        f.finish()
    }
}
