//! Blocking client: frames one request, reads one response, and renders
//! response payloads as text.
//!
//! Used by the command-line tool and by the wire tests. Unlike the server
//! side, everything here blocks; pipelining is just writing several frames
//! before reading the replies back.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::config::MAX_MSG;
use crate::protocol::{
    encode_request, read_le32, HEADER_LEN, TAG_ARR, TAG_DBL, TAG_ERR, TAG_INT, TAG_NIL, TAG_STR,
};

/// A response payload that does not decode as a tagged value.
#[derive(Debug)]
pub struct MalformedResponse;

impl fmt::Display for MalformedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed response payload")
    }
}

impl std::error::Error for MalformedResponse {}

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Client {
            stream: TcpStream::connect(addr)?,
        })
    }

    /// Frame and send one request.
    pub fn send(&mut self, args: &[&[u8]]) -> io::Result<()> {
        let payload = encode_request(args);
        if payload.len() > MAX_MSG {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "request too long",
            ));
        }
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        self.stream.write_all(&frame)
    }

    /// Read one response payload.
    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_MSG {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "reply too long"));
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Send one request and wait for its reply.
    pub fn query(&mut self, args: &[&[u8]]) -> io::Result<Vec<u8>> {
        self.send(args)?;
        self.recv()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Render a response payload as one line per value.
pub fn render_response(payload: &[u8]) -> Result<String, MalformedResponse> {
    let mut text = String::new();
    let end = render_value(payload, 0, &mut text)?;
    if end != payload.len() {
        return Err(MalformedResponse);
    }
    Ok(text)
}

fn render_value(buf: &[u8], pos: usize, out: &mut String) -> Result<usize, MalformedResponse> {
    let tag = *buf.get(pos).ok_or(MalformedResponse)?;
    match tag {
        TAG_NIL => {
            out.push_str("(nil)\n");
            Ok(pos + 1)
        }
        TAG_ERR => {
            if pos + 9 > buf.len() {
                return Err(MalformedResponse);
            }
            let code = read_le32(buf, pos + 1) as i32;
            let len = read_le32(buf, pos + 5) as usize;
            let start = pos + 9;
            let msg = buf.get(start..start + len).ok_or(MalformedResponse)?;
            out.push_str(&format!("(err) {} {}\n", code, String::from_utf8_lossy(msg)));
            Ok(start + len)
        }
        TAG_STR => {
            if pos + 5 > buf.len() {
                return Err(MalformedResponse);
            }
            let len = read_le32(buf, pos + 1) as usize;
            let start = pos + 5;
            let value = buf.get(start..start + len).ok_or(MalformedResponse)?;
            out.push_str(&format!("(str) {}\n", String::from_utf8_lossy(value)));
            Ok(start + len)
        }
        TAG_INT => {
            let bytes = buf.get(pos + 1..pos + 9).ok_or(MalformedResponse)?;
            let value = i64::from_le_bytes(bytes.try_into().expect("8-byte slice"));
            out.push_str(&format!("(int) {}\n", value));
            Ok(pos + 9)
        }
        TAG_DBL => {
            let bytes = buf.get(pos + 1..pos + 9).ok_or(MalformedResponse)?;
            let value = f64::from_le_bytes(bytes.try_into().expect("8-byte slice"));
            out.push_str(&format!("(dbl) {}\n", value));
            Ok(pos + 9)
        }
        TAG_ARR => {
            if pos + 5 > buf.len() {
                return Err(MalformedResponse);
            }
            let n = read_le32(buf, pos + 1);
            out.push_str(&format!("(arr) len={}\n", n));
            let mut cur = pos + 5;
            for _ in 0..n {
                cur = render_value(buf, cur, out)?;
            }
            out.push_str("(arr) end\n");
            Ok(cur)
        }
        _ => Err(MalformedResponse),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;

    #[test]
    fn renders_scalars() {
        let mut out = Response::new();
        out.int(42);
        assert_eq!(render_response(out.as_bytes()).unwrap(), "(int) 42\n");

        let mut out = Response::new();
        out.dbl(1.5);
        assert_eq!(render_response(out.as_bytes()).unwrap(), "(dbl) 1.5\n");

        let mut out = Response::new();
        out.nil();
        assert_eq!(render_response(out.as_bytes()).unwrap(), "(nil)\n");
    }

    #[test]
    fn renders_nested_arrays() {
        let mut out = Response::new();
        let outer = out.begin_arr();
        out.str_bytes(b"a");
        let inner = out.begin_arr();
        out.int(1);
        out.end_arr(inner, 1);
        out.end_arr(outer, 2);

        let text = render_response(out.as_bytes()).unwrap();
        assert_eq!(
            text,
            "(arr) len=2\n(str) a\n(arr) len=1\n(int) 1\n(arr) end\n(arr) end\n"
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut out = Response::new();
        out.int(7);
        let bytes = out.as_bytes();
        assert!(render_response(&bytes[..bytes.len() - 1]).is_err());
    }
}
