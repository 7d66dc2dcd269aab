//! Remoting error types.
//!
//! # Error Classification
//!
//! Handshake failures fall into four classes, and the distinction is
//! load-bearing for the reconnecting engine that drives this crate:
//!
//! - **Configuration**: fatal, never retryable (malformed endpoint
//!   string, unusable agent configuration). Surfaced at resolution time.
//! - **Refused**: the peer or a registered listener actively declined
//!   the connection (bad token, missing header, rejected credentials).
//!   Retrying with the same inputs will fail the same way.
//! - **Transport**: stream-level I/O failure. Always retryable.
//! - **Crypto**: handshake cipher fault, mapped to a generic I/O-style
//!   failure that deliberately hides the underlying cryptographic detail.
//!
//! The `Crypto` variant preserves the full error chain via `#[source]`,
//! enabling debugging tools to display complete error context without
//! putting cipher internals on the wire or in operator-facing text.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Remoting handshake errors.
#[derive(Error, Debug)]
pub enum RemotingError {
    /// Invalid or unusable configuration. Fatal; not retryable.
    #[error("Config error: {0}")]
    Config(String),

    /// The peer or a connection listener actively refused the attempt.
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Malformed wire data (bad frame, missing mandatory header).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Identity key decoding failed. Recoverable; the caller may fall
    /// back to an anonymous endpoint or surface a configuration problem.
    #[error("Invalid identity key: {0}")]
    InvalidIdentity(String),

    /// Cryptographic operation failed.
    ///
    /// This variant preserves the full error chain via `#[source]`,
    /// while the rendered message stays deliberately generic.
    #[error("Handshake cipher error: {0}")]
    Crypto(#[source] CryptoError),

    /// Stream-level I/O error. Always retryable by the external engine.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for remoting operations
pub type Result<T> = std::result::Result<T, RemotingError>;

impl RemotingError {
    /// Whether the external engine may reasonably retry the attempt.
    ///
    /// Transport failures are transient by definition. Refusals and
    /// configuration errors will repeat until an operator intervenes,
    /// so retrying them only burns connection slots on the controller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemotingError::Io(_))
    }
}

impl From<CryptoError> for RemotingError {
    fn from(err: CryptoError) -> Self {
        RemotingError::Crypto(err)
    }
}

impl From<toml::de::Error> for RemotingError {
    fn from(err: toml::de::Error) -> Self {
        RemotingError::Config(err.to_string())
    }
}

impl From<base64::DecodeError> for RemotingError {
    fn from(err: base64::DecodeError) -> Self {
        RemotingError::InvalidIdentity(format!("Base64 decode error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = RemotingError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "peer went away",
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_refusal_and_config_are_not_retryable() {
        assert!(!RemotingError::Refused("bad credentials".to_string()).is_retryable());
        assert!(!RemotingError::Config("bad endpoint".to_string()).is_retryable());
        assert!(!RemotingError::Protocol("truncated frame".to_string()).is_retryable());
    }

    #[test]
    fn test_crypto_error_stays_generic() {
        let err = RemotingError::from(CryptoError::CipherFailure);
        let rendered = err.to_string();
        assert!(rendered.contains("Handshake cipher error"));
        // No algorithm or key detail in the operator-facing message.
        assert!(!rendered.to_lowercase().contains("aes"));
    }
}
