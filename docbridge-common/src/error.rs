//! # DocBridge Error Types
//!
//! ## Design Principles
//!
//! 1. **Stable Codes**: Each variant has a fixed numeric code that is echoed in
//!    error response bodies.
//! 2. **Categorized Ranges**: Codes are grouped by intent (client, server, transient, protocol).
//! 3. **Low Overhead**: Enums are `Copy` and `repr(u16)` so they travel freely
//!    between the parser, the handler and the encoder.
//! 4. **Status Mapping**: Every code maps to exactly one HTTP status, so no
//!    failure can be reported as success.

use core::fmt;

use crate::protocol::StatusCode;

/// Result type used across DocBridge components.
pub type BridgeResult<T> = core::result::Result<T, BridgeError>;

/// High-level category for grouping error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BridgeErrorCategory {
    /// Invalid input or user request issues.
    Client,
    /// Server-side store or invariant failures.
    Server,
    /// Retryable conditions such as an unreachable store or a slow peer.
    Transient,
    /// Framing or protocol features the server does not speak.
    Protocol,
}

impl BridgeErrorCategory {
    /// Returns true if the category is safe to retry.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Error codes surfaced to clients and operators.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BridgeError {
    /// Client error: request line or headers are not valid HTTP/1.x (code 1).
    MalformedRequest = 1,
    /// Client error: body is not a JSON object (code 2).
    MalformedDocument = 2,
    /// Client error: body exceeds the configured limit (code 3).
    PayloadTooLarge = 3,
    /// Client error: request head exceeds the configured limit (code 4).
    HeaderTooLarge = 4,

    /// Server error: the store rejected or failed the operation (code 10).
    StoreFailure = 10,
    /// Server error: internal invariant violated (code 11).
    InternalError = 11,

    /// Transient error: the store cannot be reached (code 20).
    StoreUnavailable = 20,
    /// Transient error: the store handle was already released (code 21).
    Disconnected = 21,
    /// Transient error: the peer did not finish its request in time (code 22).
    RequestTimeout = 22,

    /// Protocol error: method is neither GET nor POST (code 30).
    UnsupportedMethod = 30,
    /// Protocol error: transfer encodings are not supported (code 31).
    UnsupportedEncoding = 31,
}

impl BridgeError {
    /// Returns the stable numeric code for the error.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Returns the coarse category of the error.
    pub const fn category(self) -> BridgeErrorCategory {
        match self {
            Self::MalformedRequest
            | Self::MalformedDocument
            | Self::PayloadTooLarge
            | Self::HeaderTooLarge => BridgeErrorCategory::Client,
            Self::StoreFailure | Self::InternalError => BridgeErrorCategory::Server,
            Self::StoreUnavailable | Self::Disconnected | Self::RequestTimeout => {
                BridgeErrorCategory::Transient
            }
            Self::UnsupportedMethod | Self::UnsupportedEncoding => BridgeErrorCategory::Protocol,
        }
    }

    /// Returns true if callers should retry the operation.
    pub const fn is_retryable(self) -> bool {
        self.category().is_retryable()
    }

    /// Returns the HTTP status used to report this error.
    pub const fn status(self) -> StatusCode {
        match self {
            Self::MalformedRequest | Self::MalformedDocument => StatusCode::BadRequest,
            Self::PayloadTooLarge => StatusCode::PayloadTooLarge,
            Self::HeaderTooLarge => StatusCode::HeaderFieldsTooLarge,
            Self::StoreFailure | Self::InternalError => StatusCode::InternalServerError,
            Self::StoreUnavailable | Self::Disconnected => StatusCode::ServiceUnavailable,
            Self::RequestTimeout => StatusCode::RequestTimeout,
            Self::UnsupportedMethod => StatusCode::MethodNotAllowed,
            Self::UnsupportedEncoding => StatusCode::NotImplemented,
        }
    }

    /// Converts a numeric code into a typed error.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::MalformedDocument),
            3 => Some(Self::PayloadTooLarge),
            4 => Some(Self::HeaderTooLarge),
            10 => Some(Self::StoreFailure),
            11 => Some(Self::InternalError),
            20 => Some(Self::StoreUnavailable),
            21 => Some(Self::Disconnected),
            22 => Some(Self::RequestTimeout),
            30 => Some(Self::UnsupportedMethod),
            31 => Some(Self::UnsupportedEncoding),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MalformedRequest => "malformed request",
            Self::MalformedDocument => "malformed document",
            Self::PayloadTooLarge => "payload too large",
            Self::HeaderTooLarge => "header too large",
            Self::StoreFailure => "store failure",
            Self::InternalError => "internal error",
            Self::StoreUnavailable => "store unavailable",
            Self::Disconnected => "store disconnected",
            Self::RequestTimeout => "request timeout",
            Self::UnsupportedMethod => "unsupported method",
            Self::UnsupportedEncoding => "unsupported transfer encoding",
        };
        write!(f, "{}", label)
    }
}

impl std::error::Error for BridgeError {}
