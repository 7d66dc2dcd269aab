//! Controller endpoints and the resolver family.
//!
//! A resolver turns agent configuration into a concrete [`Endpoint`]:
//! where to connect, which protocols the controller accepts, and the
//! identity key the controller must present before the handshake is
//! trusted. Malformed inputs are a recoverable configuration failure,
//! never a crash — the agent keeps running and reports the problem.

mod direct;
mod supplied;

pub use direct::DirectResolver;
pub use supplied::SuppliedResolver;

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;

use crate::error::{RemotingError, Result};

/// A concrete controller endpoint an agent can dial.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Controller host.
    pub host: String,
    /// Controller port.
    pub port: u16,
    /// RSA identity key the controller must present, if pinned.
    pub identity: Option<RsaPublicKey>,
    /// Protocol names the controller accepts; empty means any.
    pub protocols: HashSet<String>,
    /// DER certificate chain for transport security, if provisioned.
    pub certificates: Vec<Vec<u8>>,
    /// Proxy credentials (`user:password`), if a proxy is in the path.
    pub proxy_credentials: Option<String>,
}

impl Endpoint {
    /// Bare host-and-port endpoint with no identity or protocol pins.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            identity: None,
            protocols: HashSet::new(),
            certificates: Vec::new(),
            proxy_credentials: None,
        }
    }

    /// Dialable `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the controller accepts the named protocol.
    pub fn accepts(&self, protocol_name: &str) -> bool {
        self.protocols.is_empty() || self.protocols.contains(protocol_name)
    }

    /// Validate a presented identity key against the pinned one.
    ///
    /// A pinned key that does not match means the peer is not the
    /// controller this agent was provisioned for; the handshake must
    /// not proceed.
    pub fn verify_identity(&self, presented: &RsaPublicKey) -> Result<()> {
        match &self.identity {
            Some(pinned) if pinned != presented => Err(RemotingError::Refused(
                "controller identity key mismatch".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Maps agent configuration to a concrete endpoint.
pub trait EndpointResolver {
    /// Produce the endpoint, or a recoverable configuration failure.
    fn resolve(&self) -> Result<Endpoint>;

    /// Block until resolution inputs are available.
    ///
    /// No-op for resolvers whose data is synchronously at hand.
    fn wait_for_ready(&self) -> Result<()> {
        Ok(())
    }
}

/// Decode a base64 X.509 `SubjectPublicKeyInfo` RSA identity key.
///
/// Absent or blank input is "no identity", not an error. A malformed
/// encoding is an ordinary recoverable failure. (Unlike provider-based
/// crypto stacks there is no "RSA unavailable" case to treat as fatal:
/// the implementation is linked into the binary.)
pub fn decode_identity(encoded: Option<&str>) -> Result<Option<RsaPublicKey>> {
    let encoded = match encoded {
        Some(text) if !text.trim().is_empty() => text.trim(),
        _ => return Ok(None),
    };

    let der = BASE64.decode(encoded)?;
    let key = RsaPublicKey::from_public_key_der(&der)
        .map_err(|err| RemotingError::InvalidIdentity(err.to_string()))?;
    Ok(Some(key))
}
