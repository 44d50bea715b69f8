//! HTTP response support.

use std::io::{self, Read};

use log::info;

use crate::con::Connection;
use crate::error::*;

/// The reason phrases we emit.  Status codes outside this table don't occur.
fn reason(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "",
    }
}

/// Begins a response by printing the status line.  The caller should follow
/// up by adding any desired headers and then writing a CRLF.
pub fn start(con: &mut Connection, code: u16) -> Result<()> {
    con.write(b"HTTP/1.1 ")?;
    con.write_decimal(code as u64)?;
    con.write(b" ")?;
    con.write(reason(code).as_bytes())?;
    con.write(b"\r\n")
}

/// Emits a complete response with no headers and no body.
pub fn empty(con: &mut Connection, code: u16) -> Result<()> {
    info!("response: status={} {}", code, reason(code));
    start(con, code)?;
    con.write(b"\r\n")?;
    con.flush_output()
}

/// Emits the interim `100 Continue` response and flushes it, so a client
/// holding back its body gets moving.
pub fn continue_100(con: &mut Connection) -> Result<()> {
    con.write(b"HTTP/1.1 100 Continue\r\n\r\n")?;
    con.flush_output()
}

/// Signals the given error to the client as an HTTP status.
///
/// Sandbox violations and over-long names come out as 404 -- clients get no
/// hint about what exists beyond the root.  Internal I/O trouble is blamed
/// on the request; we never emit a 500.
pub fn barf(con: &mut Connection, error: &Error) -> Result<()> {
    let code = match error {
        // The client has gone away; nobody is listening to what we'd say.
        Error::ConnectionClosed => return Ok(()),
        Error::BadMethod => 405,
        Error::NotFound | Error::Forbidden | Error::NameTooLong => 404,
        _ => 400,
    };
    empty(con, code)
}

/// Copies `src` to the connection in blocks of `block_size` bytes until EOF.
/// Either the whole stream is copied and its length returned, or the failure
/// is reported -- a partial copy never reports success.
pub fn copy_stream(
    con: &mut Connection,
    src: &mut impl Read,
    block_size: usize,
) -> Result<u64> {
    let mut buf = vec![0u8; block_size.max(1)];
    let mut total = 0u64;
    loop {
        let count = match src.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::IoError(e)),
        };
        con.write(&buf[..count])?;
        total += count as u64;
    }
}
