//! Per-connection data-channel ciphers and the stream adapter.
//!
//! The encrypted handshake protocol (v3) keeps protecting traffic after
//! the handshake succeeds, but with material that is unique to the
//! connection: the controller's freshly issued session cookie salts the
//! derivation, so a new attempt never reuses an old keystream. Unlike
//! [`HandshakeCiphers`](super::HandshakeCiphers) there is no re-arm: the
//! channel is one logical message and the keystream runs continuously.

use std::io::{self, Read, Write};

use aes::cipher::{KeyIvInit, StreamCipher};

use super::ciphers::derive_bytes;
use super::SharedSecret;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Which side of the connection this cipher pair belongs to.
///
/// Each direction of the channel gets its own IV, and the two roles
/// mirror them: the initiator's write keystream is the acceptor's read
/// keystream. Sharing one keystream across both directions would pair
/// two plaintext streams with the same pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherRole {
    /// The connecting agent.
    Initiator,
    /// The controller that accepted the connection.
    Acceptor,
}

/// Continuous cipher pair for the post-handshake data channel.
pub struct ChannelCiphers {
    write: Aes128Ctr,
    read: Aes128Ctr,
}

impl ChannelCiphers {
    /// Derive the per-connection channel cipher pair.
    ///
    /// Key: PBKDF2(secret, salt = session cookie bytes). IVs: the same
    /// derivation with a direction suffix on the salt, swapped between
    /// roles so each direction runs an independent keystream.
    pub fn derive(secret: &SharedSecret, cookie: &str, role: CipherRole) -> Self {
        let key = derive_bytes(secret.as_bytes(), cookie.as_bytes());
        let to_controller = derive_bytes(secret.as_bytes(), format!("{cookie}/a2c").as_bytes());
        let to_agent = derive_bytes(secret.as_bytes(), format!("{cookie}/c2a").as_bytes());

        let (write_iv, read_iv) = match role {
            CipherRole::Initiator => (to_controller, to_agent),
            CipherRole::Acceptor => (to_agent, to_controller),
        };

        Self {
            write: Aes128Ctr::new(&key.into(), &write_iv.into()),
            read: Aes128Ctr::new(&key.into(), &read_iv.into()),
        }
    }
}

/// Stream adapter applying the channel keystream on read and write.
pub struct CipherDuplex<S> {
    inner: S,
    ciphers: ChannelCiphers,
}

impl<S> CipherDuplex<S> {
    /// Wrap a transport with the derived channel ciphers.
    pub fn new(inner: S, ciphers: ChannelCiphers) -> Self {
        Self { inner, ciphers }
    }

    /// Unwrap, abandoning the cipher state.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for CipherDuplex<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.ciphers.read.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

impl<S: Write> Write for CipherDuplex<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Encrypt a copy and push it out whole; a partial write after
        // advancing the keystream would desynchronize the peer.
        let mut enciphered = buf.to_vec();
        self.ciphers.write.apply_keystream(&mut enciphered);
        self.inner.write_all(&enciphered)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn secret() -> SharedSecret {
        SharedSecret::new("77e2f1bb3c921dd9")
    }

    const COOKIE: &str = "8d4f1c22ab9e003d8d4f1c22ab9e003d";

    #[test]
    fn test_channel_roundtrip_agent_to_controller() {
        let message = b"first frame over the established channel";

        let mut wire = Vec::new();
        let mut tx = CipherDuplex::new(
            &mut wire,
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Initiator),
        );
        tx.write_all(message).unwrap();
        drop(tx);

        assert_ne!(&wire[..], &message[..]);

        let mut rx = CipherDuplex::new(
            Cursor::new(wire),
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Acceptor),
        );
        let mut out = vec![0u8; message.len()];
        rx.read_exact(&mut out).unwrap();
        assert_eq!(out, message);
    }

    #[test]
    fn test_channel_roundtrip_controller_to_agent() {
        let message = b"response traffic";

        let mut wire = Vec::new();
        let mut tx = CipherDuplex::new(
            &mut wire,
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Acceptor),
        );
        tx.write_all(message).unwrap();
        drop(tx);

        let mut rx = CipherDuplex::new(
            Cursor::new(wire),
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Initiator),
        );
        let mut out = vec![0u8; message.len()];
        rx.read_exact(&mut out).unwrap();
        assert_eq!(out, message);
    }

    #[test]
    fn test_keystream_is_continuous_across_writes() {
        let mut wire = Vec::new();
        let mut tx = CipherDuplex::new(
            &mut wire,
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Initiator),
        );
        tx.write_all(b"abc").unwrap();
        tx.write_all(b"def").unwrap();
        drop(tx);

        let mut rx = CipherDuplex::new(
            Cursor::new(wire),
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Acceptor),
        );
        let mut out = vec![0u8; 6];
        rx.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"abcdef");
    }

    #[test]
    fn test_fresh_cookie_changes_keystream() {
        let mut first = Vec::new();
        CipherDuplex::new(
            &mut first,
            ChannelCiphers::derive(&secret(), COOKIE, CipherRole::Initiator),
        )
        .write_all(b"same plaintext")
        .unwrap();

        let mut second = Vec::new();
        CipherDuplex::new(
            &mut second,
            ChannelCiphers::derive(&secret(), "another-session", CipherRole::Initiator),
        )
        .write_all(b"same plaintext")
        .unwrap();

        assert_ne!(first, second);
    }
}
