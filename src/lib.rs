//! A small HTTP/1.1 server that also speaks WebSocket (RFC 6455) on the
//! same port.
//!
//! It does two things: serve regular files out of a sandboxed static-files
//! directory, and echo WebSocket messages back at whoever sent them.  It
//! does them with blocking I/O and (by default) a forked process per
//! connection, which keeps every code path boring and every connection
//! isolated.
//!
//! The interesting parts are the wire layer -- the request reader, the
//! path sandbox, and the frame codec -- which is where all of the protocol
//! and trust decisions live.  The rest is plumbing.

pub mod ascii;
pub mod con;
pub mod error;
pub mod filetype;
pub mod frame;
pub mod headers;
pub mod net;
pub mod request;
pub mod response;
pub mod sandbox;
pub mod server;
pub mod unix;
pub mod ws;

pub use error::{Error, Result};
