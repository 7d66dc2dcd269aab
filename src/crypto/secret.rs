//! Shared secret material and acceptor-side secret lookup.

use std::collections::HashMap;
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Pre-provisioned credential known to both agent and controller.
///
/// After protocol v2 the secret is used only as key material and never
/// transmitted in clear. The raw bytes are zeroized on drop and never
/// appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wrap a provisioned secret string.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret as key-derivation passphrase bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The secret as presented in legacy plaintext headers (v1/v2 only).
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't leak the credential in debug output
        write!(f, "SharedSecret([REDACTED, {} bytes])", self.0.len())
    }
}

impl From<&str> for SharedSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SharedSecret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Acceptor-side lookup from agent name to its provisioned secret.
///
/// Handlers for the encrypted and transport-secured protocols need the
/// secret before listener dispatch begins, so the controller supplies
/// this collaborator to the handler factory. Implementations must
/// tolerate concurrent reads: one shared instance serves every
/// in-flight connection attempt.
pub trait SecretLookup: Send + Sync {
    /// Resolve the shared secret for a named agent, if it is known.
    fn secret_for(&self, agent_name: &str) -> Option<SharedSecret>;
}

/// Fixed in-memory secret table.
#[derive(Default)]
pub struct StaticSecretMap {
    secrets: HashMap<String, SharedSecret>,
}

impl StaticSecretMap {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret for an agent name.
    pub fn insert(mut self, agent_name: impl Into<String>, secret: SharedSecret) -> Self {
        self.secrets.insert(agent_name.into(), secret);
        self
    }
}

impl SecretLookup for StaticSecretMap {
    fn secret_for(&self, agent_name: &str) -> Option<SharedSecret> {
        self.secrets.get(agent_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let secret = SharedSecret::new("hunter2");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_static_map_lookup() {
        let map = StaticSecretMap::new().insert("agent-7", SharedSecret::new("s3cret"));
        assert_eq!(
            map.secret_for("agent-7").map(|s| s.expose().to_string()),
            Some("s3cret".to_string())
        );
        assert!(map.secret_for("agent-8").is_none());
    }
}
