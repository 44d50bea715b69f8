//! The WebSocket frame codec (RFC 6455 section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! All multi-byte lengths are big-endian.  Client-to-server payloads are
//! XOR-masked with a 4-byte key; server-to-client payloads are not.
//!
//! TEXT payloads are *not* validated as UTF-8.  That check is deliberately
//! omitted; peers that care must bring their own validation.

use std::io::{Read, Write};

use log::debug;

use crate::ascii;
use crate::error::*;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    fn from_wire(bits: u8) -> Result<Opcode> {
        match bits {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(Error::BadFrame("unknown opcode")),
        }
    }

    /// Control frames carry opcodes 0x8 and up; they may never be
    /// fragmented or exceed 125 payload bytes.
    pub fn is_control(self) -> bool {
        self as u8 & 0x8 != 0
    }
}

/// One decoded frame.  A session keeps a single `Frame` as scratch and
/// reads every inbound frame into it; the payload vector's capacity only
/// ever grows, so steady-state traffic doesn't allocate.
#[derive(Debug)]
pub struct Frame {
    pub opcode: Opcode,
    pub fin: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn empty() -> Frame {
        Frame {
            opcode: Opcode::Continuation,
            fin: true,
            payload: Vec::new(),
        }
    }

    pub fn new(opcode: Opcode, fin: bool, payload: Vec<u8>) -> Frame {
        Frame {
            opcode,
            fin,
            payload,
        }
    }
}

/// Reads one frame into `frame`, replacing its previous contents.
///
/// With `require_masked` set (the server side of a connection), an unmasked
/// frame is a protocol violation.  Reserved bits, unknown opcodes, 64-bit
/// lengths with the high bit set, and fragmented or oversized control
/// frames are rejected.  EOF anywhere inside the frame is
/// `ConnectionClosed`.
pub fn read_frame<R: Read>(
    input: &mut R,
    require_masked: bool,
    frame: &mut Frame,
) -> Result<()> {
    let mut head = [0u8; 2];
    read_full(input, &mut head)?;

    let fin = head[0] & 0x80 != 0;
    if head[0] & 0x70 != 0 {
        return Err(Error::BadFrame("reserved bits set"));
    }
    let opcode = Opcode::from_wire(head[0] & 0x0F)?;

    let masked = head[1] & 0x80 != 0;
    if require_masked && !masked {
        return Err(Error::UnmaskedFrame);
    }

    let len = match head[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            read_full(input, &mut ext)?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            read_full(input, &mut ext)?;
            let len = u64::from_be_bytes(ext);
            if len & (1 << 63) != 0 {
                return Err(Error::BadFrame("64-bit length high bit set"));
            }
            len
        }
        n => n as u64,
    };
    debug!(
        "frame header in: fin={} opcode={:?} mask={} len={}",
        fin, opcode, masked, len
    );

    if opcode.is_control() && (!fin || len > 125) {
        return Err(Error::BadFrame("fragmented or oversized control frame"));
    }

    let mut key = [0u8; 4];
    if masked {
        read_full(input, &mut key)?;
        debug!("mask key: {}", ascii::hex(&key));
    }

    let len = usize::try_from(len)
        .map_err(|_| Error::BadFrame("payload larger than address space"))?;
    frame.opcode = opcode;
    frame.fin = fin;
    frame.payload.clear();
    frame.payload.resize(len, 0);
    read_full(input, &mut frame.payload)?;
    if masked {
        mask_in_place(&mut frame.payload, key);
    }
    if log::log_enabled!(log::Level::Debug) && !frame.payload.is_empty() {
        let dump = &frame.payload[..frame.payload.len().min(32)];
        debug!("payload: {}", ascii::hex(dump));
    }
    Ok(())
}

/// Writes one frame, using the shortest length encoding that fits, and
/// flushes it so the frame leaves as a unit.
///
/// When a mask key is supplied, the payload is XORed *in place* before it's
/// written, mirroring the read side; the frame is left masked afterwards.
/// Servers pass `None`.
pub fn write_frame<W: Write>(
    output: &mut W,
    frame: &mut Frame,
    mask: Option<[u8; 4]>,
) -> Result<()> {
    let b0 = (frame.fin as u8) << 7 | frame.opcode as u8;
    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    let len = frame.payload.len();

    debug!(
        "frame header out: fin={} opcode={:?} mask={} len={}",
        frame.fin,
        frame.opcode,
        mask.is_some(),
        len
    );
    if len <= 125 {
        output.write_all(&[b0, mask_bit | len as u8])?;
    } else if len <= 0xFFFF {
        output.write_all(&[b0, mask_bit | 126])?;
        output.write_all(&(len as u16).to_be_bytes())?;
    } else {
        output.write_all(&[b0, mask_bit | 127])?;
        output.write_all(&(len as u64).to_be_bytes())?;
    }

    if let Some(key) = mask {
        output.write_all(&key)?;
        mask_in_place(&mut frame.payload, key);
    }
    output.write_all(&frame.payload)?;
    output.flush()?;
    Ok(())
}

/// The masking transform: byte `i` is XORed with `key[i mod 4]`.  Its own
/// inverse.
pub fn mask_in_place(payload: &mut [u8], key: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}

fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ConnectionClosed
        } else {
            Error::IoError(e)
        }
    })
}
