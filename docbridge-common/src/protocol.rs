//! # Wire Vocabulary
//!
//! Purpose: Name the two request kinds the bridge serves and the fixed set of
//! statuses it can answer with.
//!
//! ## Design Principles
//!
//! 1. **Closed Dispatch**: Methods collapse into a small tagged variant so the
//!    handler matches exhaustively instead of comparing strings.
//! 2. **Explicit Rejection**: Unknown methods are carried, not defaulted to a read.
//! 3. **Static Text**: Status lines are `&'static str` to keep encoding allocation-free.
//!
//! ## Response Shapes
//!
//! ```text
//! write ok:  HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n
//! read ok:   HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{..}\n{..}\n
//! error:     HTTP/1.1 4xx/5xx ...\r\nContent-Type: application/json\r\nContent-Length: n\r\n\r\n{"error":..}
//! ```

use core::fmt;

/// Content type announced on every JSON-bearing response.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Methods advertised in `Allow` headers.
pub const ALLOWED_METHODS: &str = "GET, POST";

/// The operation a request maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// Insert the request body as one document.
    Write,
    /// Dump the whole collection as newline-delimited JSON.
    Read,
    /// Any other method; carries the raw token for diagnostics.
    Unsupported(String),
}

impl RequestKind {
    /// Maps a request-line method token to a request kind.
    ///
    /// Methods are case-sensitive per RFC 9110, so `get` is unsupported.
    pub fn from_method(method: &str) -> Self {
        match method {
            "POST" => Self::Write,
            "GET" => Self::Read,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => f.write_str("write"),
            Self::Read => f.write_str("read"),
            Self::Unsupported(method) => write!(f, "unsupported({method})"),
        }
    }
}

/// HTTP statuses the bridge can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    MethodNotAllowed,
    RequestTimeout,
    PayloadTooLarge,
    HeaderFieldsTooLarge,
    InternalServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl StatusCode {
    /// Numeric status code.
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::MethodNotAllowed => 405,
            Self::RequestTimeout => 408,
            Self::PayloadTooLarge => 413,
            Self::HeaderFieldsTooLarge => 431,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Reason phrase for the status line.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::HeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
            Self::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Full HTTP/1.1 status line without the trailing CRLF.
    pub const fn status_line(self) -> &'static str {
        match self {
            Self::Ok => "HTTP/1.1 200 OK",
            Self::BadRequest => "HTTP/1.1 400 Bad Request",
            Self::MethodNotAllowed => "HTTP/1.1 405 Method Not Allowed",
            Self::RequestTimeout => "HTTP/1.1 408 Request Timeout",
            Self::PayloadTooLarge => "HTTP/1.1 413 Payload Too Large",
            Self::HeaderFieldsTooLarge => "HTTP/1.1 431 Request Header Fields Too Large",
            Self::InternalServerError => "HTTP/1.1 500 Internal Server Error",
            Self::NotImplemented => "HTTP/1.1 501 Not Implemented",
            Self::ServiceUnavailable => "HTTP/1.1 503 Service Unavailable",
        }
    }
}
