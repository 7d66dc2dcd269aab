//! Handshake cipher construction and the re-arm discipline.

use aes::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::{CryptoError, SharedSecret, DERIVATION_ROUNDS, KEY_SIZE};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Derive `KEY_SIZE` bytes from a passphrase and salt via PBKDF2.
pub(crate) fn derive_bytes(passphrase: &[u8], salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut out = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(passphrase, salt, DERIVATION_ROUNDS, &mut out);
    out
}

/// A CTR cipher that always returns to the agreed counter position.
///
/// The wire carries no per-message nonce, so two peers stay in sync only
/// if every message starts the keystream from position zero. `apply`
/// therefore re-arms immediately after each use; the reset is a named
/// step of the cipher state, not cleanup left to callers.
struct ArmedCipher {
    cipher: Aes128Ctr,
}

impl ArmedCipher {
    fn new(key: &[u8; KEY_SIZE], iv: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes128Ctr::new(key.into(), iv.into()),
        }
    }

    /// Apply the keystream to `buf` in place, then re-arm.
    fn apply(&mut self, buf: &mut [u8]) {
        self.cipher.apply_keystream(buf);
        self.rearm();
    }

    /// Seek the counter back to the agreed starting position.
    fn rearm(&mut self) {
        self.cipher.seek(0u32);
    }
}

/// Symmetric cipher pair protecting the handshake exchange of one
/// connection attempt.
///
/// Derived deterministically from the agent identity name and the
/// pre-shared secret, so both peers construct identical material with
/// nothing key-related on the wire. Protects handshake text only; the
/// data channel uses separately derived material (see
/// [`ChannelCiphers`](super::ChannelCiphers)).
pub struct HandshakeCiphers {
    encrypt: ArmedCipher,
    decrypt: ArmedCipher,
}

impl HandshakeCiphers {
    /// Derive the connection-scoped cipher pair.
    ///
    /// Key: PBKDF2(secret, salt = identity-name bytes). IV: PBKDF2 over
    /// the same inputs with the salt bytes reversed, keeping the two
    /// derivations independent. Both ciphers are keyed identically.
    pub fn create(identity_name: &str, secret: &SharedSecret) -> Self {
        let salt = identity_name.as_bytes();
        let reversed: Vec<u8> = salt.iter().rev().copied().collect();

        let key = derive_bytes(secret.as_bytes(), salt);
        let iv = derive_bytes(secret.as_bytes(), &reversed);

        Self {
            encrypt: ArmedCipher::new(&key, &iv),
            decrypt: ArmedCipher::new(&key, &iv),
        }
    }

    /// Encrypt handshake text for the wire.
    ///
    /// The ciphertext is re-encoded one byte per `char` (U+0000–U+00FF)
    /// so it survives length-prefixed string framing unchanged. The
    /// cipher re-arms before this returns.
    pub fn encrypt(&mut self, text: &str) -> Result<String, CryptoError> {
        let mut buf = text.as_bytes().to_vec();
        self.encrypt.apply(&mut buf);
        Ok(buf.into_iter().map(char::from).collect())
    }

    /// Decrypt wire text produced by a peer's [`encrypt`](Self::encrypt).
    ///
    /// Identical re-arm discipline. Input units above U+00FF mean the
    /// frame was corrupted or never encrypted with this scheme.
    pub fn decrypt(&mut self, text: &str) -> Result<String, CryptoError> {
        let mut buf = Vec::with_capacity(text.len());
        for unit in text.chars() {
            let value = u32::from(unit);
            if value > 0xFF {
                return Err(CryptoError::MalformedCiphertext);
            }
            buf.push(value as u8);
        }
        self.decrypt.apply(&mut buf);
        String::from_utf8(buf).map_err(|_| CryptoError::CipherFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Mutex, OnceLock};

    fn secret() -> SharedSecret {
        SharedSecret::new("f2073bd1b1b79c1d3f89b74e5e1be8bc")
    }

    #[test]
    fn test_roundtrip() {
        let mut ciphers = HandshakeCiphers::create("agent-7", &secret());
        let ct = ciphers.encrypt("Secret-Key: abc123").unwrap();
        assert_ne!(ct, "Secret-Key: abc123");
        assert_eq!(ciphers.decrypt(&ct).unwrap(), "Secret-Key: abc123");
    }

    #[test]
    fn test_roundtrip_multibyte_utf8() {
        let mut ciphers = HandshakeCiphers::create("agent-7", &secret());
        let text = "Agent-Name: bücher-Ω-機";
        let ct = ciphers.encrypt(text).unwrap();
        assert_eq!(ciphers.decrypt(&ct).unwrap(), text);
    }

    #[test]
    fn test_peer_instances_interoperate() {
        let mut agent = HandshakeCiphers::create("agent-7", &secret());
        let mut controller = HandshakeCiphers::create("agent-7", &secret());

        let ct = agent.encrypt("Cookie: 0badc0de").unwrap();
        assert_eq!(controller.decrypt(&ct).unwrap(), "Cookie: 0badc0de");

        // And the other direction, from fresh counter positions.
        let ct = controller.encrypt("Welcome").unwrap();
        assert_eq!(agent.decrypt(&ct).unwrap(), "Welcome");
    }

    #[test]
    fn test_wrong_secret_does_not_recover_plaintext() {
        let mut agent = HandshakeCiphers::create("agent-7", &secret());
        let mut imposter = HandshakeCiphers::create("agent-7", &SharedSecret::new("wrong"));

        let ct = agent.encrypt("Secret-Key: abc123").unwrap();
        match imposter.decrypt(&ct) {
            Ok(garbled) => assert_ne!(garbled, "Secret-Key: abc123"),
            Err(_) => {} // keystream mismatch produced invalid UTF-8
        }
    }

    #[test]
    fn test_rearm_makes_encryption_deterministic() {
        let mut ciphers = HandshakeCiphers::create("agent-7", &secret());
        let first = ciphers.encrypt("same message").unwrap();
        let second = ciphers.encrypt("same message").unwrap();
        // Counter reset is observable: no keystream drift between calls.
        assert_eq!(first, second);
    }

    #[test]
    fn test_ciphertext_is_wire_safe() {
        let mut ciphers = HandshakeCiphers::create("agent-7", &secret());
        let ct = ciphers.encrypt("a block of handshake headers\nCookie: ff").unwrap();
        assert!(ct.chars().all(|c| u32::from(c) <= 0xFF));
    }

    #[test]
    fn test_decrypt_rejects_wide_units() {
        let mut ciphers = HandshakeCiphers::create("agent-7", &secret());
        let result = ciphers.decrypt("口口口");
        assert!(matches!(result, Err(CryptoError::MalformedCiphertext)));
    }

    // Derivation is deliberately expensive, so the property test shares
    // one peer pair across cases; re-arm guarantees that reuse is safe.
    fn peer_pair() -> &'static Mutex<(HandshakeCiphers, HandshakeCiphers)> {
        static PAIR: OnceLock<Mutex<(HandshakeCiphers, HandshakeCiphers)>> = OnceLock::new();
        PAIR.get_or_init(|| {
            Mutex::new((
                HandshakeCiphers::create("prop-agent", &secret()),
                HandshakeCiphers::create("prop-agent", &secret()),
            ))
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_decrypt_inverts_encrypt(message in "\\PC*") {
            let mut pair = peer_pair().lock().unwrap();
            let ct = pair.0.encrypt(&message).unwrap();
            let pt = pair.1.decrypt(&ct).unwrap();
            prop_assert_eq!(pt, message);
        }
    }
}
