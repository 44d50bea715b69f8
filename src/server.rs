//! The per-connection request driver, which ties the other modules
//! together.
//!
//! One invocation serves exactly one HTTP request (or one whole WebSocket
//! session) and then lets the connection close; there is no keep-alive.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;

use log::{info, warn};

use crate::con::Connection;
use crate::error::*;
use crate::filetype;
use crate::request::{self, Method, Request};
use crate::response;
use crate::sandbox::Sandbox;
use crate::ws::{self, Message, Session};

/// Serves one connection to completion.  Every failure either maps to an
/// HTTP status on the wire or, when the peer is already gone, to silence.
pub fn serve(mut con: Connection, sandbox: &Sandbox) {
    let req = match request::read(&mut con) {
        Ok(req) => req,
        Err(e) => {
            let _ = response::barf(&mut con, &e);
            return;
        }
    };

    if ws::is_upgradable(&req.headers) {
        serve_websocket(con, &req);
        return;
    }

    if let Err(e) = dispatch(&mut con, sandbox, req) {
        let _ = response::barf(&mut con, &e);
    }
}

fn dispatch(
    con: &mut Connection,
    sandbox: &Sandbox,
    mut req: Request,
) -> Result<()> {
    // An impatient client may be holding its body back until we bless the
    // headers.  We bless them unconditionally -- and, notably, before
    // they've been fully validated.
    if let Some(expect) = req.headers.get(b"expect") {
        if expect.eq_ignore_ascii_case(b"100-continue") {
            info!("sending 100 Continue");
            response::continue_100(con)?;
        }
    }

    match req.method {
        Method::Post | Method::Put => receive_upload(con, &mut req),
        Method::Get => send_file(con, sandbox, &req),
        _ => Err(Error::BadMethod),
    }
}

/// POST and PUT: the body is read completely and then dropped with the
/// request.  There is no routing to hand it to; acknowledging receipt is
/// all we do.
fn receive_upload(con: &mut Connection, req: &mut Request) -> Result<()> {
    let content_length = req
        .headers
        .get(b"content-length")
        .and_then(|v| std::str::from_utf8(v).ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    if content_length > 0 {
        info!("reading request body: content-length={}", content_length);
        let mut body = vec![0u8; content_length];
        con.read_body(&mut body)?;
        req.body = Some(body);
    }

    response::empty(con, 201)
}

fn send_file(
    con: &mut Connection,
    sandbox: &Sandbox,
    req: &Request,
) -> Result<()> {
    let uri: &[u8] = if req.uri == b"/" { b"/index.html" } else { &req.uri };

    let path = sandbox.resolve(uri)?;
    let meta = fs::metadata(&path).map_err(|_| Error::NotFound)?;
    if !meta.is_file() {
        return Err(Error::NotFound);
    }
    let mut file = fs::File::open(&path).map_err(|_| Error::NotFound)?;

    info!("sending {} ({} bytes)", path.display(), meta.len());
    response::start(con, 200)?;
    con.write(b"Content-Length: ")?;
    con.write_decimal(meta.len())?;
    con.write(b"\r\nContent-Type: ")?;
    con.write(filetype::from_path(uri))?;
    con.write(b"\r\n\r\n")?;

    // Stream the file in the filesystem's preferred block size.
    response::copy_stream(con, &mut file, meta.blksize() as usize)?;
    con.flush_output()
}

/// Hands the connection over to a WebSocket session and echoes every
/// complete message back at the peer until it closes or errs out.
fn serve_websocket(con: Connection, req: &Request) {
    let (input, output) = con.into_streams();
    let mut session =
        match Session::upgrade(input, output, &req.headers, true) {
            Ok(s) => s,
            Err(e) => {
                // No HTTP response here; a botched handshake just drops
                // the connection.
                warn!("websocket upgrade failed: {}", e);
                return;
            }
        };
    echo(&mut session);
    // Dropping the session sends GOING_AWAY if the peer didn't close first.
}

fn echo<R: Read, W: Write>(session: &mut Session<R, W>) {
    loop {
        match session.wait() {
            Ok(Message::Close) => {
                info!(
                    "peer closed websocket: status={}",
                    session.close_status()
                );
                return;
            }
            Ok(kind) => {
                if kind == Message::Text {
                    info!(
                        "text message: {}",
                        String::from_utf8_lossy(session.message())
                    );
                }
                let msg = session.message().to_vec();
                if let Err(e) = session.send(kind, &msg) {
                    warn!("websocket send failed: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("websocket session error: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{self, Frame, Opcode};
    use crate::unix;
    use std::fs;
    use std::io::{Read, Write};
    use std::mem;

    const INDEX_BODY: &[u8] = b"<html><body>It works.</body></html>";

    fn fixture() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), INDEX_BODY).unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        (dir, sandbox)
    }

    /// Feeds `input` to a fresh connection, runs the server on it, and
    /// returns everything it wrote.  The input has to fit in the pipe
    /// buffer, which it comfortably does for these cases.
    fn run(sandbox: &Sandbox, input: &[u8]) -> Vec<u8> {
        let pipe_in = unix::pipe().unwrap();
        let pipe_out = unix::pipe().unwrap();
        let con = Connection::from_files(pipe_in.input, pipe_out.output);
        let mut to_con = pipe_in.output;
        let mut from_con = pipe_out.input;

        to_con.write_all(input).unwrap();
        mem::drop(to_con);
        serve(con, sandbox);

        let mut out = Vec::new();
        from_con.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_get_existing_file() {
        let (_dir, sandbox) = fixture();
        let out = run(
            &sandbox,
            b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", INDEX_BODY.len())));
        assert!(out.ends_with(INDEX_BODY));
    }

    #[test]
    fn test_get_root_rewrites_to_index() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(out.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with(INDEX_BODY));
    }

    #[test]
    fn test_get_escape_attempt_is_404() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"GET /../../etc/passwd HTTP/1.1\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[test]
    fn test_get_missing_file_is_404() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"GET /nope.html HTTP/1.1\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 404 Not Found\r\n\r\n");
    }

    #[test]
    fn test_post_with_expect_continue() {
        let (_dir, sandbox) = fixture();
        let out = run(
            &sandbox,
            b"POST /x HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\nhello",
        );
        assert_eq!(
            &out[..],
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\n\r\n"
        );
    }

    #[test]
    fn test_post_short_body_is_400() {
        let (_dir, sandbox) = fixture();
        let out = run(
            &sandbox,
            b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello",
        );
        assert_eq!(&out[..], b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[test]
    fn test_bogus_method_is_405() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"BOGUS / HTTP/1.1\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
    }

    #[test]
    fn test_recognized_but_unserved_method_is_405() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"DELETE /index.html HTTP/1.1\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        let out = run(&sandbox, b"HEAD /index.html HTTP/1.1\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
    }

    #[test]
    fn test_malformed_request_line_is_400() {
        let (_dir, sandbox) = fixture();
        let out = run(&sandbox, b"GET /\r\n\r\n");
        assert_eq!(&out[..], b"HTTP/1.1 400 Bad Request\r\n\r\n");
    }

    #[test]
    fn test_websocket_echo_through_serve() {
        let (_dir, sandbox) = fixture();

        let mut input = Vec::new();
        input.extend_from_slice(
            b"GET /chat HTTP/1.1\r\n\
              Host: x\r\n\
              Connection: keep-alive, Upgrade\r\n\
              Upgrade: websocket\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              \r\n",
        );
        let key = [7u8, 7, 7, 7];
        let mut f = Frame::new(Opcode::Text, true, b"ohai".to_vec());
        frame::write_frame(&mut input, &mut f, Some(key)).unwrap();
        let mut f = Frame::new(
            Opcode::Close,
            true,
            ws::STATUS_NORMAL.to_be_bytes().to_vec(),
        );
        frame::write_frame(&mut input, &mut f, Some(key)).unwrap();

        let out = run(&sandbox, &input);
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text
            .contains("sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

        // After the headers: the proof-of-life PING, then the echoed text.
        let frames_at = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        let frames = &out[frames_at..];
        assert!(frames.starts_with(b"\x89\x00"));
        assert!(frames[2..].starts_with(b"\x81\x04ohai"));
    }
}
