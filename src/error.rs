//! Errors that can occur while serving a connection.

use std::fmt;
use std::io;
use std::result;

/// Errors that may kill off a request, a WebSocket session, or a connection.
#[derive(Debug)]
pub enum Error {
    /// The peer has gone away, or the stream ended in the middle of a line,
    /// a body, or a frame.  This is the one error that can't reasonably be
    /// reported back to the peer.
    ConnectionClosed,
    /// A header or request line exceeded the line buffer without producing
    /// a CRLF terminator.
    LineTooLong,
    /// The request line or header block was malformed.
    BadRequest,
    /// The client used a method we don't serve.
    BadMethod,
    /// The requested resource does not exist, or isn't a regular file.
    NotFound,
    /// The resolved path escaped the static-files root, or the root itself
    /// was unacceptable.  Reported to clients as 404 so that we don't leak
    /// what exists outside the sandbox.
    Forbidden,
    /// The static-files root plus the request URI exceeded `PATH_MAX`.
    NameTooLong,
    /// The configured static-files root is not a directory.
    NotADirectory,
    /// A WebSocket frame violated the protocol.  Carries a static
    /// description of what, exactly, the peer did wrong.
    BadFrame(&'static str),
    /// The peer sent an unmasked frame on a connection where masking is
    /// required (client-to-server traffic).
    UnmaskedFrame,
    /// For convenience, `io::Error`s can be propagated as `Error`s.
    IoError(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::IoError(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectionClosed => f.write_str("connection closed"),
            Error::LineTooLong => f.write_str("line too long"),
            Error::BadRequest => f.write_str("bad request"),
            Error::BadMethod => f.write_str("method not allowed"),
            Error::NotFound => f.write_str("not found"),
            Error::Forbidden => f.write_str("forbidden"),
            Error::NameTooLong => f.write_str("name too long"),
            Error::NotADirectory => f.write_str("not a directory"),
            Error::BadFrame(what) => write!(f, "bad frame: {}", what),
            Error::UnmaskedFrame => f.write_str("unmasked frame from peer"),
            Error::IoError(e) => write!(f, "i/o error: {}", e),
        }
    }
}

/// Alias for a Result in Error.
pub type Result<R> = result::Result<R, Error>;
