//! Error kinds for the connection pipeline, protocol engine and static responder.
//!
//! Mirrors the source's error *kind* taxonomy (Transport / Protocol / Filesystem / App)
//! rather than a family of distinct types: one enum, `From` impls at the I/O and parse
//! boundaries, manual `Display`.

use core::fmt;
use std::io;

/// Failure while parsing a request line or header block.
#[derive(Debug)]
pub enum Parse {
    RequestLine,
    HeaderName,
    HeaderValue,
    HeaderTooLarge,
    MissingContentLength,
    InvalidRange,
}

impl Parse {
    /// Status code this parse failure maps to per the request parser's body-length policy.
    pub const fn status(&self) -> http::StatusCode {
        match self {
            Self::MissingContentLength => http::StatusCode::LENGTH_REQUIRED,
            Self::InvalidRange => http::StatusCode::RANGE_NOT_SATISFIABLE,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for Parse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestLine => f.write_str("malformed request line"),
            Self::HeaderName => f.write_str("malformed header name"),
            Self::HeaderValue => f.write_str("malformed header value"),
            Self::HeaderTooLarge => f.write_str("header block exceeds configured limit"),
            Self::MissingContentLength => f.write_str("missing or invalid Content-Length"),
            Self::InvalidRange => f.write_str("invalid Range header"),
        }
    }
}

/// Error kinds crossing the connection pipeline, protocol engine, static responder
/// and app bridge. Every I/O call in this crate returns this type (or `io::Error`,
/// converted into it at the boundary) instead of propagating into its neighbours.
#[derive(Debug)]
pub enum Error {
    /// Read/write/timeout on the socket. Terminal for the connection.
    Transport(io::Error),
    /// Malformed request line/headers, or a body-length policy violation.
    Protocol(Parse),
    /// Content root missing, target absent or not a file, or a traversal attempt.
    Filesystem(io::Error),
    /// App raised before any header was sent.
    AppSynchronous(String),
    /// App raised after headers were already sent; status cannot be rewritten.
    AppPostHeader(String),
}

impl Error {
    /// Whether this error occurred before or after the response headers were emitted.
    /// Error handling policy (§7) hinges entirely on this split.
    pub const fn is_post_header(&self) -> bool {
        matches!(self, Self::AppPostHeader(_))
    }

    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::Transport(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Protocol(p) => p.status(),
            Self::Filesystem(e) if e.kind() == io::ErrorKind::NotFound => http::StatusCode::NOT_FOUND,
            Self::Filesystem(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::AppSynchronous(_) | Self::AppPostHeader(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Protocol(p) => write!(f, "protocol error: {p}"),
            Self::Filesystem(e) => write!(f, "filesystem error: {e}"),
            Self::AppSynchronous(msg) => write!(f, "app error before headers sent: {msg}"),
            Self::AppPostHeader(msg) => write!(f, "app error after headers sent: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) | Self::Filesystem(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<Parse> for Error {
    fn from(e: Parse) -> Self {
        Self::Protocol(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
