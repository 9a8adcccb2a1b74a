//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("request exceeds the size limit")]
    TooLarge,
}

/// A parsed HTTP/1.1 request head plus whatever body bytes followed it.
///
/// Created by [`Request::parse`] from the connection buffer. The server
/// re-parses once the full `Content-Length` body has arrived, so handlers
/// always see the complete body.
///
/// # Examples
///
/// ```
/// use relaychat::http::request::Request;
///
/// let raw = b"POST /api/chat?debug=1 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\n\r\n{}";
/// let (request, offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/api/chat");
/// assert_eq!(request.content_length().unwrap(), Some(2));
/// assert_eq!(&raw[offset..], b"{}");
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we accept per request.
    const MAX_HEADERS: usize = 64;

    /// Parses the request head in `buf`.
    ///
    /// Returns the request and the byte offset at which the body begins.
    /// The query string is dropped; the relay has no use for it.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: the header block has not fully arrived.
    /// - [`RequestError::Parse`]: the data is not valid HTTP/1.x.
    /// - [`RequestError::MissingField`]: method, path or version absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;
        let path = target.split('?').next().unwrap_or(target).to_owned();

        let version = raw
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                body: Bytes::copy_from_slice(&buf[body_offset..]),
            },
            body_offset,
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the connection should stay open after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive; HTTP/1.0 needs an explicit header.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Value of `Content-Length`, or `None` when the header is absent.
    ///
    /// # Errors
    ///
    /// [`RequestError::InvalidContentLength`] when the header is not a number.
    pub fn content_length(&self) -> Result<Option<usize>, RequestError> {
        match self.headers.get("content-length") {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| RequestError::InvalidContentLength),
            None => Ok(None),
        }
    }
}
