//! # HTTP/1.x Request Parser
//!
//! Parse one HTTP/1.x request (head plus `Content-Length` body) from a
//! streaming TCP buffer.
//!
//! ## Design Principles
//!
//! 1. **State Machine Pattern**: Explicit parser states avoid rescanning the
//!    head once it has been consumed.
//! 2. **Streaming Friendly**: The parser consumes from a mutable buffer and
//!    returns `None` when more data is needed.
//! 3. **Bounded Input**: Head and body sizes are checked before buffering more,
//!    so a peer cannot grow the buffer without limit.
//! 4. **Fail Fast**: Malformed heads return an error code immediately.

use bytes::{Buf, Bytes, BytesMut};

use docbridge_common::{BridgeError, BridgeResult, RequestKind};

/// Default cap on the request line plus headers.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 8 * 1024;

/// Default cap on the request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Size limits enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_head_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits {
            max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A fully framed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Dispatch target derived from the method token.
    pub kind: RequestKind,
    /// Raw method token.
    pub method: String,
    /// Request target as sent; only used for logging.
    pub target: String,
    /// Body bytes (empty without `Content-Length`).
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Head {
    method: String,
    target: String,
    content_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Head,
    Body,
}

/// Incremental parser for a single request.
#[derive(Debug)]
pub struct RequestParser {
    state: ParseState,
    limits: ParseLimits,
    head: Option<Head>,
}

impl RequestParser {
    /// Creates a new parser in the initial state.
    pub fn new(limits: ParseLimits) -> Self {
        RequestParser {
            state: ParseState::Head,
            limits,
            head: None,
        }
    }

    /// Returns true once the head has been consumed but the body is incomplete.
    pub fn awaiting_body(&self) -> bool {
        self.state == ParseState::Body
    }

    /// Attempts to parse a request from the buffer.
    ///
    /// Returns `Ok(None)` if more data is required.
    pub fn parse(&mut self, buf: &mut BytesMut) -> BridgeResult<Option<Request>> {
        loop {
            match self.state {
                ParseState::Head => {
                    skip_leading_newlines(buf);
                    let end = match find_head_end(buf) {
                        Some(end) => end,
                        None => {
                            if buf.len() > self.limits.max_head_bytes {
                                return Err(BridgeError::HeaderTooLarge);
                            }
                            return Ok(None);
                        }
                    };
                    if end > self.limits.max_head_bytes {
                        return Err(BridgeError::HeaderTooLarge);
                    }
                    let raw = buf.split_to(end);
                    let head = parse_head(&raw)?;
                    if head.content_length > self.limits.max_body_bytes {
                        return Err(BridgeError::PayloadTooLarge);
                    }
                    self.head = Some(head);
                    self.state = ParseState::Body;
                }
                ParseState::Body => {
                    let needed = match &self.head {
                        Some(head) => head.content_length,
                        None => return Err(BridgeError::InternalError),
                    };
                    if buf.len() < needed {
                        return Ok(None);
                    }
                    let body = buf.split_to(needed).freeze();
                    self.state = ParseState::Head;
                    let Head { method, target, .. } =
                        self.head.take().ok_or(BridgeError::InternalError)?;
                    return Ok(Some(Request {
                        kind: RequestKind::from_method(&method),
                        method,
                        target,
                        body,
                    }));
                }
            }
        }
    }
}

fn skip_leading_newlines(buf: &mut BytesMut) {
    let blank = buf.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
    buf.advance(blank);
}

/// Returns the offset just past the empty line that ends the head.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (idx, &b) in buf.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &buf[line_start..idx];
        if line.is_empty() || line == b"\r" {
            return Some(idx + 1);
        }
        line_start = idx + 1;
    }
    None
}

fn parse_head(raw: &[u8]) -> BridgeResult<Head> {
    let text = std::str::from_utf8(raw).map_err(|_| BridgeError::MalformedRequest)?;
    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let request_line = lines.next().ok_or(BridgeError::MalformedRequest)?;
    let (method, target) = parse_request_line(request_line)?;

    let mut content_length: Option<usize> = None;
    for line in lines.take_while(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(BridgeError::MalformedRequest)?;
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(BridgeError::MalformedRequest);
        }
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            let len = parse_content_length(value)?;
            match content_length {
                Some(existing) if existing != len => return Err(BridgeError::MalformedRequest),
                _ => content_length = Some(len),
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(BridgeError::UnsupportedEncoding);
        }
    }

    Ok(Head {
        method: method.to_string(),
        target: target.to_string(),
        content_length: content_length.unwrap_or(0),
    })
}

fn parse_request_line(line: &str) -> BridgeResult<(&str, &str)> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(BridgeError::MalformedRequest);
    };
    if method.is_empty() || !method.bytes().all(is_token_byte) {
        return Err(BridgeError::MalformedRequest);
    }
    if target.is_empty() {
        return Err(BridgeError::MalformedRequest);
    }
    if version != "HTTP/1.1" && version != "HTTP/1.0" {
        return Err(BridgeError::MalformedRequest);
    }
    Ok((method, target))
}

fn parse_content_length(value: &str) -> BridgeResult<usize> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BridgeError::MalformedRequest);
    }
    // Lengths too large for usize are necessarily over any body limit.
    Ok(value.parse::<usize>().unwrap_or(usize::MAX))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
