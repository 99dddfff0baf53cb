use std::fmt;

use http::{header, HeaderMap, Method, StatusCode};

use crate::frame::{Frame, StreamId};

/// Header frame
///
/// This could be either a request, a response, or a trailers block. This is
/// the post-decode form: the HPACK block has already been expanded by the
/// connection codec.
pub struct Headers {
    /// The ID of the stream with which this frame is associated.
    stream_id: StreamId,

    /// Pseudo headers, these are broken out as they must be sent as part of
    /// the headers frame.
    pseudo: PseudoHeaders,

    /// The decoded header fields
    fields: HeaderMap,

    end_stream: bool,
}

#[derive(Debug, Default)]
pub struct PseudoHeaders {
    // Request
    pub method: Option<Method>,
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: Option<String>,

    // Response
    pub status: Option<StatusCode>,
}

// ===== impl Headers =====

impl Headers {
    /// Create a new HEADERS frame
    pub fn new(stream_id: StreamId, pseudo: PseudoHeaders, fields: HeaderMap) -> Self {
        Headers {
            stream_id,
            pseudo,
            fields,
            end_stream: false,
        }
    }

    /// Create a trailers block. Trailers always end the half-stream.
    pub fn trailers(stream_id: StreamId, fields: HeaderMap) -> Self {
        Headers {
            stream_id,
            pseudo: PseudoHeaders::default(),
            fields,
            end_stream: true,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn set_end_stream(&mut self) {
        self.end_stream = true;
    }

    pub fn pseudo(&self) -> &PseudoHeaders {
        &self.pseudo
    }

    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }

    pub fn into_parts(self) -> (PseudoHeaders, HeaderMap) {
        (self.pseudo, self.fields)
    }

    pub fn into_fields(self) -> HeaderMap {
        self.fields
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Frame::Headers(src)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Headers");
        builder
            .field("stream_id", &self.stream_id)
            .field("fields", &self.fields.len());
        if self.end_stream {
            builder.field("flags", &"END_STREAM");
        }
        // field values purposefully not included
        builder.finish()
    }
}

// ===== impl PseudoHeaders =====

impl PseudoHeaders {
    pub fn request(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if path.is_empty() && method != Method::OPTIONS && method != Method::CONNECT {
            path = "/".to_string();
        }

        PseudoHeaders {
            method: Some(method),
            scheme: None,
            authority: None,
            path: Some(path),
            status: None,
        }
    }

    pub fn response(status: StatusCode) -> Self {
        PseudoHeaders {
            method: None,
            scheme: None,
            authority: None,
            path: None,
            status: Some(status),
        }
    }

    pub fn set_scheme(&mut self, scheme: impl Into<String>) {
        self.scheme = Some(scheme.into());
    }

    pub fn set_authority(&mut self, authority: impl Into<String>) {
        self.authority = Some(authority.into());
    }

    /// Returns true if this is a request header block.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.status.is_none()
    }

    /// Returns true if this is a response header block.
    pub fn is_response(&self) -> bool {
        self.status.is_some() && self.method.is_none()
    }
}

// ===== util =====

/// Connection level header fields are not supported in HTTP/2 and must
/// result in a protocol error, in either direction.
pub(crate) fn contains_connection_headers(fields: &HeaderMap) -> bool {
    for (name, value) in fields.iter() {
        if name == &header::CONNECTION
            || name == &header::TRANSFER_ENCODING
            || name == &header::UPGRADE
            || name == "keep-alive"
            || name == "proxy-connection"
            || name == "proxy-authenticate"
            || name == "proxy-authorization"
        {
            log::trace!("connection level header: {:?}", name);
            return true;
        }
        if name == &header::TE && value != "trailers" {
            log::trace!("TE header not set to trailers; val={:?}", value);
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use http::{header, HeaderMap, HeaderValue, Method, StatusCode};

    use super::{contains_connection_headers, PseudoHeaders};

    #[test]
    fn connection_specific_headers() {
        let mut fields = HeaderMap::new();
        fields.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        assert!(!contains_connection_headers(&fields));

        fields.insert(header::CONNECTION, HeaderValue::from_static("close"));
        assert!(contains_connection_headers(&fields));

        let mut fields = HeaderMap::new();
        fields.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        assert!(contains_connection_headers(&fields));
    }

    #[test]
    fn te_trailers_is_allowed() {
        let mut fields = HeaderMap::new();
        fields.insert(header::TE, HeaderValue::from_static("trailers"));
        assert!(!contains_connection_headers(&fields));

        fields.insert(header::TE, HeaderValue::from_static("gzip"));
        assert!(contains_connection_headers(&fields));
    }

    #[test]
    fn request_path_defaults() {
        let pseudo = PseudoHeaders::request(Method::GET, "");
        assert_eq!(pseudo.path.as_deref(), Some("/"));

        let pseudo = PseudoHeaders::request(Method::CONNECT, "");
        assert_eq!(pseudo.path.as_deref(), Some(""));
    }

    #[test]
    fn request_and_response_shapes() {
        let req = PseudoHeaders::request(Method::GET, "/");
        assert!(req.is_request());
        assert!(!req.is_response());

        let res = PseudoHeaders::response(StatusCode::OK);
        assert!(res.is_response());
        assert!(!res.is_request());

        // trailers carry no pseudo headers and are neither
        let none = PseudoHeaders::default();
        assert!(!none.is_request());
        assert!(!none.is_response());
    }
}
