//! WebSocket upgrade and session handling (RFC 6455).
//!
//! A session comes into being when an HTTP request passes the upgrade
//! predicate and the handshake succeeds; from then on the connection speaks
//! frames (see `frame`) until either side closes.  The only application
//! behavior on top is the echo: complete messages are sent straight back.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, info, warn};
use sha1::{Digest, Sha1};

use crate::error::*;
use crate::frame::{self, Frame, Opcode};
use crate::headers::Headers;

/// The fixed GUID every conforming server hashes into its accept key.
const HANDSHAKE_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Close status codes we use (RFC 6455 section 7.4.1).
pub const STATUS_NORMAL: u16 = 1000;
pub const STATUS_GOING_AWAY: u16 = 1001;

/// What `Session::wait` can surface to the driver.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Message {
    Text,
    Binary,
    /// The peer closed the connection; `close_status` has the code.
    Close,
}

/// The header test that turns a request into a WebSocket session.
///
/// We only require `upgrade: websocket`.  The `connection: upgrade` token
/// is deliberately not checked: some clients (Firefox among them) send
/// `Connection: keep-alive, Upgrade`, and we'd rather be lenient than parse
/// comma-separated header values.
pub fn is_upgradable(headers: &Headers) -> bool {
    headers
        .get(b"upgrade")
        .map_or(false, |v| v.eq_ignore_ascii_case(b"websocket"))
}

/// Computes the `sec-websocket-accept` value: the base64 (unwrapped) SHA-1
/// of the client key concatenated with the handshake GUID.
pub fn accept_key(key: &[u8]) -> String {
    let mut sha = Sha1::new();
    sha.update(key);
    sha.update(HANDSHAKE_GUID);
    BASE64.encode(sha.finalize())
}

pub struct Session<R: Read, W: Write> {
    input: Option<R>,
    output: Option<W>,
    /// Whether inbound frames must be masked.  True for a server talking to
    /// a client; the frame codec enforces it.
    require_masked: bool,
    /// Scratch frame reused for every read; its payload capacity only
    /// grows.
    scratch: Frame,
    /// Reassembly buffer for fragmented messages.
    message: Vec<u8>,
    close_status: u16,
    ping_recv: u32,
    pong_recv: u32,
    ping_sent: u32,
}

impl<R: Read, W: Write> Session<R, W> {
    /// Performs the server side of the handshake and returns the live
    /// session.
    ///
    /// Requires the upgrade predicate to hold and a `sec-websocket-key` to
    /// be present; fails with `BadRequest` otherwise, in which case no
    /// bytes have been written and the caller should drop the connection.
    /// On success the 101 response is followed immediately by an empty
    /// PING, as proof of life.
    pub fn upgrade(
        input: R,
        mut output: W,
        headers: &Headers,
        require_masked: bool,
    ) -> Result<Session<R, W>> {
        if !is_upgradable(headers) {
            warn!("not a websocket request");
            return Err(Error::BadRequest);
        }
        let key = match headers.get(b"sec-websocket-key") {
            Some(k) => k,
            None => {
                warn!("websocket key not found in headers");
                return Err(Error::BadRequest);
            }
        };
        let accept = accept_key(key);
        debug!("sec-websocket-accept: {}", accept);

        info!("switching protocols");
        output.write_all(b"HTTP/1.1 101 Switching Protocols\r\n")?;
        output.write_all(b"connection: upgrade\r\n")?;
        output.write_all(b"upgrade: websocket\r\n")?;
        output.write_all(b"sec-websocket-accept: ")?;
        output.write_all(accept.as_bytes())?;
        output.write_all(b"\r\n\r\n")?;
        output.flush()?;

        let mut session = Session {
            input: Some(input),
            output: Some(output),
            require_masked,
            scratch: Frame::empty(),
            message: Vec::new(),
            close_status: 0,
            ping_recv: 0,
            pong_recv: 0,
            ping_sent: 0,
        };
        // Say hello before the peer gets a word in.
        session.write_control(Opcode::Ping, Vec::new())?;
        session.ping_sent += 1;
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }

    /// The close status the peer sent, meaningful after `wait` returns
    /// `Close`.  Zero if the CLOSE frame carried no status.
    pub fn close_status(&self) -> u16 {
        self.close_status
    }

    /// The payload of the last complete message surfaced by `wait`.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Blocks until a complete message, a close, or an error.
    ///
    /// Fragmented messages are reassembled across CONT frames; the
    /// reassembly buffer is reset when a new message starts.  Control
    /// frames may arrive *between* fragments and are handled here without
    /// disturbing the reassembly state: PING is answered with a PONG
    /// carrying the same payload, PONG is counted, CLOSE ends the loop.
    pub fn wait(&mut self) -> Result<Message> {
        let mut prev_opcode: Option<Opcode> = None;
        loop {
            {
                let input =
                    self.input.as_mut().ok_or(Error::ConnectionClosed)?;
                frame::read_frame(input, self.require_masked, &mut self.scratch)?;
            }

            match self.scratch.opcode {
                Opcode::Ping => {
                    info!("received PING; sending PONG");
                    self.ping_recv += 1;
                    // Echo the payload back out of the scratch frame; the
                    // reassembly buffer is left alone.
                    self.scratch.opcode = Opcode::Pong;
                    self.scratch.fin = true;
                    let output =
                        self.output.as_mut().ok_or(Error::ConnectionClosed)?;
                    frame::write_frame(output, &mut self.scratch, None)?;
                }
                Opcode::Pong => {
                    info!("received PONG");
                    self.pong_recv += 1;
                }
                Opcode::Close => {
                    match self.scratch.payload.len() {
                        0 => (), // no status given; stays 0
                        1 => {
                            return Err(Error::BadFrame(
                                "close frame with 1-byte payload",
                            ))
                        }
                        _ => {
                            self.close_status = u16::from_be_bytes([
                                self.scratch.payload[0],
                                self.scratch.payload[1],
                            ]);
                        }
                    }
                    info!("received CLOSE: status={}", self.close_status);
                    return Ok(Message::Close);
                }
                data_opcode => {
                    let effective = if data_opcode == Opcode::Continuation {
                        prev_opcode.ok_or(Error::BadFrame(
                            "continuation with no message in progress",
                        ))?
                    } else {
                        // First frame of a new message.
                        self.message.clear();
                        data_opcode
                    };
                    self.message.extend_from_slice(&self.scratch.payload);
                    if self.scratch.fin {
                        return Ok(match effective {
                            Opcode::Text => Message::Text,
                            _ => Message::Binary,
                        });
                    }
                    prev_opcode = Some(effective);
                }
            }
        }
    }

    /// Sends one complete, unmasked message frame.
    pub fn send(&mut self, kind: Message, payload: &[u8]) -> Result<()> {
        let opcode = match kind {
            Message::Text => Opcode::Text,
            _ => Opcode::Binary,
        };
        let output = self.output.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut frame = Frame::new(opcode, true, payload.to_vec());
        frame::write_frame(output, &mut frame, None)
    }

    /// Sends a CLOSE frame carrying `status` and shuts the session down.
    /// Both halves of the connection are released; calling this twice is a
    /// no-op.
    pub fn close(&mut self, status: u16) -> Result<()> {
        let mut output = match self.output.take() {
            Some(o) => o,
            None => {
                debug!("websocket already closed");
                return Ok(());
            }
        };
        info!("closing websocket: status={}", status);
        let mut frame =
            Frame::new(Opcode::Close, true, status.to_be_bytes().to_vec());
        let result = frame::write_frame(&mut output, &mut frame, None);
        // The reader is a separate object over a duplicated descriptor, so
        // it's released on its own.
        drop(output);
        self.input = None;
        result
    }

    fn write_control(&mut self, opcode: Opcode, payload: Vec<u8>) -> Result<()> {
        let output = self.output.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut frame = Frame::new(opcode, true, payload);
        frame::write_frame(output, &mut frame, None)
    }

    #[cfg(test)]
    fn stats(&self) -> (u32, u32, u32) {
        (self.ping_recv, self.pong_recv, self.ping_sent)
    }
}

impl<R: Read, W: Write> Drop for Session<R, W> {
    fn drop(&mut self) {
        if self.output.is_some() {
            let _ = self.close(STATUS_GOING_AWAY);
        }
    }
}
