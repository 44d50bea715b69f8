//! Request header parsing and lookup.
//!
//! Header names are case-insensitive, so we normalize them to lower case on
//! the way into the map and at every lookup.  Values keep whatever 8-bit
//! encoding the client used; we only trim the optional whitespace around
//! them.

use log::warn;
use rustc_hash::FxHashMap;

use crate::ascii;
use crate::con::Connection;
use crate::error::*;

/// A mapping from lower-cased header name to its most recent value.
/// Duplicate names overwrite; insertion order is not preserved.
#[derive(Debug, Default)]
pub struct Headers {
    map: FxHashMap<Vec<u8>, Vec<u8>>,
}

impl Headers {
    pub fn new() -> Headers {
        Headers::default()
    }

    /// Inserts a header, lower-casing the name.  Any earlier value under the
    /// same name is discarded.
    pub fn insert(&mut self, mut name: Vec<u8>, value: Vec<u8>) {
        name.make_ascii_lowercase();
        self.map.insert(name, value);
    }

    /// Looks up a header by name, in any case.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        if name.iter().any(u8::is_ascii_uppercase) {
            self.map.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
        } else {
            self.map.get(name).map(Vec::as_slice)
        }
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Reads header lines from the connection until the empty line that ends
    /// the block.
    ///
    /// Lines without a colon, lines whose name isn't a plain HTTP token, and
    /// folded continuation lines (leading SP/HT -- an obsolete construct we
    /// don't support) are logged and skipped.  Only a failure of the line
    /// reader itself fails the whole block.
    pub fn parse(con: &mut Connection) -> Result<Headers> {
        let mut headers = Headers::new();
        loop {
            let line = con.readline()?;
            if line.is_empty() {
                return Ok(headers);
            }
            if line[0] == b' ' || line[0] == b'\t' {
                warn!(
                    "skipping folded header line: {}",
                    String::from_utf8_lossy(&line)
                );
                continue;
            }
            let colon = match line.iter().position(|&b| b == b':') {
                Some(i) => i,
                None => {
                    warn!(
                        "skipping invalid header: {}",
                        String::from_utf8_lossy(&line)
                    );
                    continue;
                }
            };
            let (name, value) = line.split_at(colon);
            if name.is_empty() || !name.iter().all(|&b| (b'!'..=b'~').contains(&b)) {
                warn!(
                    "skipping header with bad name: {}",
                    String::from_utf8_lossy(&line)
                );
                continue;
            }
            // value still carries the colon; drop it before trimming.
            headers.insert(name.to_vec(), ascii::trim(&value[1..]).to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unix;
    use std::io::Write;
    use std::mem;

    fn parse_block(block: &[u8]) -> Result<Headers> {
        let pipe_in = unix::pipe().unwrap();
        let pipe_out = unix::pipe().unwrap();
        let mut con = Connection::from_files(pipe_in.input, pipe_out.output);
        let mut to_con = pipe_in.output;
        to_con.write_all(block).unwrap();
        mem::drop(to_con);
        Headers::parse(&mut con)
    }

    #[test]
    fn test_parse_simple_block() {
        let h = parse_block(
            b"Content-Length: 2112\r\n\
              Header-No-OWS:NoOptionalWhiteSpace\r\n\
              Header-OWS: \t OptionalWhiteSpace \t \r\n\
              \r\n",
        )
        .unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(b"content-length"), Some(b"2112" as &[u8]));
        assert_eq!(h.get(b"header-no-ows"), Some(b"NoOptionalWhiteSpace" as &[u8]));
        assert_eq!(h.get(b"header-ows"), Some(b"OptionalWhiteSpace" as &[u8]));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let h = parse_block(b"Upgrade: websocket\r\n\r\n").unwrap();
        assert_eq!(h.get(b"upgrade"), Some(b"websocket" as &[u8]));
        assert_eq!(h.get(b"Upgrade"), Some(b"websocket" as &[u8]));
        assert_eq!(h.get(b"UPGRADE"), Some(b"websocket" as &[u8]));
    }

    #[test]
    fn test_duplicates_overwrite() {
        let h = parse_block(b"X-Thing: one\r\nx-thing: two\r\n\r\n").unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(b"x-thing"), Some(b"two" as &[u8]));
    }

    #[test]
    fn test_junk_lines_are_skipped() {
        let h = parse_block(
            b"no colon here\r\n\
              \tfolded continuation\r\n\
              bad name: spaces before the colon\r\n\
              Good: yes\r\n\
              \r\n",
        )
        .unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(b"good"), Some(b"yes" as &[u8]));
    }

    #[test]
    fn test_truncated_block_fails() {
        match parse_block(b"Host: x\r\n").err() {
            Some(Error::ConnectionClosed) => (),
            other => panic!("expected ConnectionClosed, got {:?}", other),
        };
    }
}
