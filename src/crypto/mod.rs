//! Connection-scoped handshake cryptography.
//!
//! The legacy handshake protocols predate any negotiated session key, so
//! confidentiality rests entirely on the pre-shared agent secret. Both
//! sides derive identical cipher material deterministically:
//!
//! ```text
//! (identity name, shared secret)
//!     │
//!     ├─[PBKDF2, salt = identity bytes]──────────► 128-bit key
//!     └─[PBKDF2, salt = reversed identity bytes]─► 128-bit IV
//! ```
//!
//! The derived pair keys two AES-128-CTR ciphers (encrypt and decrypt,
//! keyed identically). Because the wire carries no per-message nonce,
//! every message of one connection must start from the agreed counter
//! position: the cipher state is explicitly re-armed after each use.
//! Silently continuing an exhausted counter across logically separate
//! messages is the key/IV-reuse bug this module exists to rule out.
//!
//! This protects the handshake exchange against passive observation
//! only. Tampering resistance is a property of the newer protocol
//! version that upgrades the whole connection to transport security.
//!
//! # Secret Hygiene
//!
//! [`SharedSecret`] redacts its `Debug` output and zeroizes on drop.
//! Cipher instances are created per connection attempt and never shared
//! or reused across attempts.

mod ciphers;
mod secret;
mod stream;

pub use ciphers::HandshakeCiphers;
pub use secret::{SecretLookup, SharedSecret, StaticSecretMap};
pub use stream::{ChannelCiphers, CipherDuplex, CipherRole};

use thiserror::Error;

/// PBKDF2 iteration count for key and IV derivation.
pub const DERIVATION_ROUNDS: u32 = 65_536;

/// Derived key and IV size in bytes (128 bits).
pub const KEY_SIZE: usize = 16;

/// Errors from handshake cipher operations.
///
/// Variants are deliberately generic: cryptographic faults surface as an
/// I/O-style failure without cipher or padding detail, so a peer probing
/// the handshake learns nothing from the failure mode.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The cipher could not process the payload.
    #[error("handshake cipher failure")]
    CipherFailure,

    /// Ciphertext contained units outside the single-byte wire encoding.
    #[error("malformed handshake ciphertext")]
    MalformedCiphertext,
}
