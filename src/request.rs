//! HTTP request support.

use log::info;

use crate::con::Connection;
use crate::error::*;
use crate::headers::Headers;

/// The methods we can name.  Parsing is case-insensitive; anything else is
/// `Unknown`.  Recognizing a method is not the same as serving it -- the
/// dispatch in `server` answers 405 for most of these.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Trace,
    Unknown,
}

impl Method {
    pub fn parse(raw: &[u8]) -> Method {
        const TABLE: &[(&[u8], Method)] = &[
            (b"GET", Method::Get),
            (b"HEAD", Method::Head),
            (b"POST", Method::Post),
            (b"PUT", Method::Put),
            (b"PATCH", Method::Patch),
            (b"DELETE", Method::Delete),
            (b"OPTIONS", Method::Options),
            (b"TRACE", Method::Trace),
        ];
        for &(name, method) in TABLE {
            if raw.eq_ignore_ascii_case(name) {
                return method;
            }
        }
        Method::Unknown
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Vec<u8>,
    pub version: (u32, u32),
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

/// Accepts a request from the given `Connection` and returns its contents,
/// or an error.
///
/// Errors may be returned *during* reception of the request; the connection
/// is not reusable afterwards.  An unrecognized method fails before the
/// headers are read -- there is nothing we could do with them.
pub fn read(con: &mut Connection) -> Result<Request> {
    let request_line = con.readline()?;
    let (method, uri, version) = parse_request_line(&request_line)?;
    info!(
        "request: method={:?} uri={} version={}.{}",
        method,
        String::from_utf8_lossy(&uri),
        version.0,
        version.1
    );
    if method == Method::Unknown {
        return Err(Error::BadMethod);
    }

    let headers = Headers::parse(con)?;

    Ok(Request {
        method,
        uri,
        version,
        headers,
        body: None, // Filled in by the dispatch, for methods that carry one.
    })
}

/// Request-Line = Method SP Request-URI SP HTTP-Version CRLF.  Runs of
/// spaces are tolerated between the parts; anything other than exactly
/// three parts is a bad request.
fn parse_request_line(line: &[u8]) -> Result<(Method, Vec<u8>, (u32, u32))> {
    let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
    let method = parts.next().ok_or(Error::BadRequest)?;
    let uri = parts.next().ok_or(Error::BadRequest)?;
    let version = parts.next().ok_or(Error::BadRequest)?;
    if parts.next().is_some() {
        return Err(Error::BadRequest);
    }
    Ok((Method::parse(method), uri.to_vec(), parse_version(version)?))
}

/// HTTP-Version = "HTTP/" 1*DIGIT "." 1*DIGIT
fn parse_version(raw: &[u8]) -> Result<(u32, u32)> {
    let rest = raw.strip_prefix(b"HTTP/").ok_or(Error::BadRequest)?;
    let dot = rest
        .iter()
        .position(|&b| b == b'.')
        .ok_or(Error::BadRequest)?;
    let major = parse_u32(&rest[..dot])?;
    let minor = parse_u32(&rest[dot + 1..])?;
    Ok((major, minor))
}

fn parse_u32(digits: &[u8]) -> Result<u32> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::BadRequest)
}
