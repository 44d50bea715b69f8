//! Connection management.
//!
//! A `Connection` wraps the two directions of an accepted socket (or, in
//! tests, a pair of pipes) in buffered readers/writers and provides the
//! line-oriented and raw operations the protocol code is built from.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;

use crate::error::*;
use crate::unix;

/// Upper bound on a single request or header line, terminator included.
/// Lines that run past this without a CRLF fail with `LineTooLong`.
pub const MAX_LINE: usize = 8192;

pub struct Connection {
    input: io::BufReader<fs::File>,
    output: io::BufWriter<fs::File>,
}

impl Connection {
    /// Wraps an accepted stream.  The descriptor is duplicated so that the
    /// read and write halves can later be closed independently (the
    /// WebSocket teardown wants this).
    pub fn from_stream(stream: TcpStream) -> io::Result<Connection> {
        let (input, output) = unix::split_stream(stream)?;
        Ok(Connection::from_files(input, output))
    }

    pub fn from_files(input: fs::File, output: fs::File) -> Connection {
        const INPUT_BUF_BYTES: usize = 1024;
        const OUTPUT_BUF_BYTES: usize = 1024;

        Connection {
            input: io::BufReader::with_capacity(INPUT_BUF_BYTES, input),
            output: io::BufWriter::with_capacity(OUTPUT_BUF_BYTES, output),
        }
    }

    /// Reads a CRLF-terminated line, of the sort used in HTTP requests.
    /// This function guarantees that a successful result describes an entire
    /// line -- if the input is closed before CRLF, it signals
    /// `ConnectionClosed`.
    ///
    /// The terminator is the exact byte pair CR LF.  A bare LF does not end
    /// the line; it's kept as content.
    ///
    /// The delimiter is removed before the result is returned.
    pub fn readline(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            // +2 leaves room for the CRLF itself, so that a line of exactly
            // MAX_LINE content bytes still parses.
            let budget = (MAX_LINE + 2).saturating_sub(line.len());
            if budget == 0 {
                return Err(Error::LineTooLong);
            }
            // Note: we're not using read_line because that deals in UTF-8.
            // Thankfully read_until is available, and it already retries
            // interrupted reads.
            let n = self
                .input
                .by_ref()
                .take(budget as u64)
                .read_until(b'\n', &mut line)?;
            if n == 0 {
                // EOF before a terminator.
                return Err(Error::ConnectionClosed);
            }
            if line.ends_with(b"\r\n") {
                let len = line.len();
                line.truncate(len - 2);
                return Ok(line);
            }
            // Either a bare LF (content, keep reading) or the budget ran out
            // mid-line; the next pass sorts out which.
        }
    }

    /// Reads exactly `buf.len()` bytes of request body.  Short delivery --
    /// EOF before the advertised Content-Length arrives -- and every other
    /// read failure are the client's problem and map to `BadRequest`.
    pub fn read_body(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf).map_err(|_| Error::BadRequest)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        // Don't use the default conversion from io::Error here -- failures on
        // write are the client's fault and can't typically be reported, so
        // it's important that we indicate ConnectionClosed.
        self.output
            .write_all(data)
            .map_err(|_| Error::ConnectionClosed)
    }

    pub fn write_decimal(&mut self, value: u64) -> Result<()> {
        write!(self.output, "{}", value).map_err(|_| Error::ConnectionClosed)
    }

    pub fn flush_output(&mut self) -> Result<()> {
        self.output.flush().map_err(|_| Error::ConnectionClosed)
    }

    /// Takes the connection apart into its buffered halves.  Used when a
    /// request upgrades to WebSocket and the session takes over the wire.
    pub fn into_streams(
        self,
    ) -> (io::BufReader<fs::File>, io::BufWriter<fs::File>) {
        (self.input, self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unix;
    use std::io::{Read, Write};
    use std::mem;

    // Note: these tests rely on buffering in the pipes.  Hoping for the best.
    pub fn make_piped_connection() -> (Connection, fs::File, fs::File) {
        let pipe_to_con = unix::pipe().unwrap();
        let pipe_from_con = unix::pipe().unwrap();

        let c = Connection::from_files(pipe_to_con.input, pipe_from_con.output);
        (c, pipe_to_con.output, pipe_from_con.input)
    }

    #[test]
    fn test_readline() {
        let (mut c, mut to_con, _) = make_piped_connection();

        to_con.write_all(b"\r\n").unwrap();
        assert_eq!(b"", &c.readline().unwrap()[..]);
        to_con.write_all(b"abcd\r\nohai\r\n").unwrap();
        assert_eq!(b"abcd", &c.readline().unwrap()[..]);
        assert_eq!(b"ohai", &c.readline().unwrap()[..]);
    }

    #[test]
    fn test_readline_bare_lf_is_content() {
        let (mut c, mut to_con, _) = make_piped_connection();

        to_con.write_all(b"embedded\nnewline\r\n").unwrap();
        assert_eq!(b"embedded\nnewline", &c.readline().unwrap()[..]);
    }

    #[test]
    fn test_readline_eof() {
        let (mut c, mut to_con, _) = make_piped_connection();

        to_con.write_all(b"truncated").unwrap();
        mem::drop(to_con); // close our side of this pipe
        match c.readline().err() {
            Some(Error::ConnectionClosed) => (),
            Some(_) => panic!("unexpected error from readline() at stream end"),
            _ => panic!("readline() must fail at stream end"),
        };
    }

    #[test]
    fn test_readline_too_long() {
        let (mut c, mut to_con, _) = make_piped_connection();

        // Keep this comfortably under the pipe buffer so the write can't
        // block before readline gets a chance to bail.
        let long = vec![b'a'; MAX_LINE + 16];
        to_con.write_all(&long).unwrap();
        match c.readline().err() {
            Some(Error::LineTooLong) => (),
            other => panic!("expected LineTooLong, got {:?}", other),
        };
    }

    #[test]
    fn test_read_body_short_delivery() {
        let (mut c, mut to_con, _) = make_piped_connection();

        to_con.write_all(b"hel").unwrap();
        mem::drop(to_con);
        let mut body = [0u8; 5];
        match c.read_body(&mut body).err() {
            Some(Error::BadRequest) => (),
            other => panic!("expected BadRequest, got {:?}", other),
        };
    }

    #[test]
    fn test_write_roundtrip() {
        let (mut c, to_con, mut from_con) = make_piped_connection();

        c.write(b"Content-Length: ").unwrap();
        c.write_decimal(2112).unwrap();
        c.write(b"\r\n").unwrap();
        c.flush_output().unwrap();

        mem::drop(to_con);
        mem::drop(c); // close the write half so the read below terminates

        let mut out = Vec::new();
        from_con.read_to_end(&mut out).unwrap();
        assert_eq!(&out[..], b"Content-Length: 2112\r\n");
    }
}
