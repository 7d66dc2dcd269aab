//! Wire codec for the handshake exchange.
//!
//! Three primitives cover every protocol version: length-prefixed UTF-8
//! strings (`u16` big-endian length, the classic `writeUTF` framing),
//! newline-terminated text lines, and `key: value` property blocks.
//!
//! Reads are exact, never speculative: the codec pulls only the bytes
//! the current frame needs, so the transport can be handed off intact
//! at the two points where ownership changes (the transport-security
//! upgrade and the channel build).

use std::collections::HashMap;
use std::io::{Read, Write};

use bytes::{BufMut, BytesMut};

use crate::channel::DuplexStream;
use crate::error::{RemotingError, Result};

/// Codec wrapper owning the connection's transport during handshake.
pub struct FramedStream {
    inner: Box<dyn DuplexStream>,
}

impl FramedStream {
    /// Take ownership of a transport for the handshake exchange.
    pub fn new(inner: Box<dyn DuplexStream>) -> Self {
        Self { inner }
    }

    /// Hand the transport back, e.g. for a security upgrade or the
    /// channel build. No bytes are retained by the codec.
    pub fn into_inner(self) -> Box<dyn DuplexStream> {
        self.inner
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_utf(&mut self) -> Result<String> {
        let mut len = [0u8; 2];
        self.inner.read_exact(&mut len)?;
        let len = usize::from(u16::from_be_bytes(len));

        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload)?;
        String::from_utf8(payload)
            .map_err(|_| RemotingError::Protocol("frame payload is not valid UTF-8".to_string()))
    }

    /// Write a length-prefixed UTF-8 string and flush it.
    pub fn write_utf(&mut self, text: &str) -> Result<()> {
        let payload = text.as_bytes();
        let len = u16::try_from(payload.len()).map_err(|_| {
            RemotingError::Protocol(format!(
                "frame payload too large: {} bytes (max {})",
                payload.len(),
                u16::MAX
            ))
        })?;

        let mut frame = BytesMut::with_capacity(2 + payload.len());
        frame.put_u16(len);
        frame.put_slice(payload);
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Read a newline-terminated text line (trailing `\r` stripped).
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        loop {
            match self.read_byte()? {
                b'\n' => break,
                byte => line.push(byte),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map_err(|_| RemotingError::Protocol("response line is not valid UTF-8".to_string()))
    }

    /// Write a newline-terminated text line and flush it.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(())
    }

    /// Read `key: value` lines until the blank terminator line.
    pub fn read_block(&mut self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                break;
            }
            pairs.push(split_header(&line)?);
        }
        Ok(pairs)
    }

    /// Write `key: value` lines followed by the blank terminator line.
    pub fn write_block(&mut self, pairs: &[(String, String)]) -> Result<()> {
        for (key, value) in pairs {
            self.inner.write_all(key.as_bytes())?;
            self.inner.write_all(b": ")?;
            self.inner.write_all(value.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Split one `key: value` header line.
fn split_header(line: &str) -> Result<(String, String)> {
    match line.split_once(": ") {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(RemotingError::Protocol(format!(
            "malformed header line (missing ': ' separator): {line}"
        ))),
    }
}

/// Render a property block as newline-delimited `key: value` text.
///
/// Order is preserved: the encrypted protocol requires the agent name
/// to be the first header on the wire.
pub fn format_block(pairs: &[(String, String)]) -> String {
    let mut block = String::new();
    for (key, value) in pairs {
        block.push_str(key);
        block.push_str(": ");
        block.push_str(value);
        block.push('\n');
    }
    block
}

/// Parse a property block into ordered pairs.
pub fn parse_block(text: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        pairs.push(split_header(line)?);
    }
    Ok(pairs)
}

/// Collapse ordered pairs into the decoded-header map.
pub fn into_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};
    use std::sync::{Arc, Mutex};

    fn framed(bytes: Vec<u8>) -> FramedStream {
        FramedStream::new(Box::new(Cursor::new(bytes)))
    }

    /// In-memory FIFO usable as both ends of a half-duplex exchange.
    #[derive(Clone, Default)]
    struct SharedPipe(Arc<Mutex<Vec<u8>>>);

    impl Read for SharedPipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut queued = self.0.lock().unwrap();
            let n = queued.len().min(buf.len());
            buf[..n].copy_from_slice(&queued[..n]);
            queued.drain(..n);
            Ok(n)
        }
    }

    impl Write for SharedPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_utf_roundtrip() {
        let pipe = SharedPipe::default();
        let mut sink = FramedStream::new(Box::new(pipe.clone()));
        sink.write_utf("Protocol:JNLP2-connect").unwrap();

        assert_eq!(&pipe.0.lock().unwrap()[..2], &[0, 22]);

        let mut source = FramedStream::new(Box::new(pipe));
        assert_eq!(source.read_utf().unwrap(), "Protocol:JNLP2-connect");
    }

    #[test]
    fn test_read_line_strips_carriage_return() {
        let mut source = framed(b"Welcome\r\n".to_vec());
        assert_eq!(source.read_line().unwrap(), "Welcome");
    }

    #[test]
    fn test_read_line_eof_is_transport_failure() {
        let mut source = framed(b"no newline".to_vec());
        assert!(matches!(source.read_line(), Err(RemotingError::Io(_))));
    }

    #[test]
    fn test_block_roundtrip_preserves_order() {
        let pairs = vec![
            ("Agent-Name".to_string(), "agent-7".to_string()),
            ("Secret-Key".to_string(), "abc123".to_string()),
        ];
        let parsed = parse_block(&format_block(&pairs)).unwrap();
        assert_eq!(parsed, pairs);
    }

    #[test]
    fn test_parse_block_rejects_missing_separator() {
        let result = parse_block("Agent-Name=agent-7\n");
        assert!(matches!(result, Err(RemotingError::Protocol(_))));
    }

    #[test]
    fn test_parse_block_stops_at_blank_line() {
        let parsed = parse_block("Cookie: ff\n\nTrailing: ignored\n").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0, "Cookie");
    }

    #[test]
    fn test_read_block_terminates_on_blank_line() {
        let mut source = framed(b"Cookie: ff\nAgent-Name: a\n\n".to_vec());
        let pairs = source.read_block().unwrap();
        assert_eq!(pairs.len(), 2);
    }
}
