//! Direct-connection resolver: a configured `host:port`, no discovery.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{RemotingError, Result};

use super::{decode_identity, Endpoint, EndpointResolver};

/// Resolver for agents configured with an explicit controller address.
///
/// Parsing happens at [`resolve`](EndpointResolver::resolve) time and
/// performs no network I/O; `wait_for_ready` is the default no-op
/// because everything is synchronously at hand.
pub struct DirectResolver {
    address: String,
    identity: Option<String>,
    protocols: HashSet<String>,
    certificates: Vec<Vec<u8>>,
    proxy_credentials: Option<String>,
}

impl DirectResolver {
    /// Resolver for a `host:port` controller address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            identity: None,
            protocols: HashSet::new(),
            certificates: Vec::new(),
            proxy_credentials: None,
        }
    }

    /// Pin the controller's base64-encoded RSA identity key.
    pub fn with_identity(mut self, encoded: impl Into<String>) -> Self {
        self.identity = Some(encoded.into());
        self
    }

    /// Restrict the accepted protocol names.
    pub fn with_protocols(mut self, protocols: impl IntoIterator<Item = String>) -> Self {
        self.protocols = protocols.into_iter().collect();
        self
    }

    /// Provide a DER certificate chain for transport security.
    pub fn with_certificates(mut self, certificates: Vec<Vec<u8>>) -> Self {
        self.certificates = certificates;
        self
    }

    /// Provide `user:password` proxy credentials.
    pub fn with_proxy_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.proxy_credentials = Some(credentials.into());
        self
    }
}

impl EndpointResolver for DirectResolver {
    fn resolve(&self) -> Result<Endpoint> {
        let (host, port) = split_host_port(&self.address)?;
        let identity = decode_identity(self.identity.as_deref())?;

        debug!(host, port, "resolved direct connection endpoint");
        Ok(Endpoint {
            host: host.to_string(),
            port,
            identity,
            protocols: self.protocols.clone(),
            certificates: self.certificates.clone(),
            proxy_credentials: self.proxy_credentials.clone(),
        })
    }
}

/// Split a `host:port` string, tolerating bracketed IPv6 literals.
fn split_host_port(address: &str) -> Result<(&str, u16)> {
    let bad = || RemotingError::Config(format!("invalid controller address: {address}"));

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        // "[::1]:41000"
        let (host, rest) = rest.split_once(']').ok_or_else(bad)?;
        let port = rest.strip_prefix(':').ok_or_else(bad)?;
        (host, port)
    } else {
        address.rsplit_once(':').ok_or_else(bad)?
    };

    if host.is_empty() {
        return Err(bad());
    }
    let port: u16 = port.parse().map_err(|_| bad())?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_host_and_port_synchronously() {
        let resolver = DirectResolver::new("build.example.com:41000");
        resolver.wait_for_ready().unwrap(); // no-op, returns immediately

        let endpoint = resolver.resolve().unwrap();
        assert_eq!(endpoint.host, "build.example.com");
        assert_eq!(endpoint.port, 41000);
        assert!(endpoint.identity.is_none());
    }

    #[test]
    fn test_resolves_bracketed_ipv6() {
        let endpoint = DirectResolver::new("[::1]:8080").resolve().unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 8080);
    }

    #[test]
    fn test_malformed_addresses_are_config_errors() {
        for address in ["no-port", "host:", ":41000", "host:notaport", "host:99999", ""] {
            let result = DirectResolver::new(address).resolve();
            assert!(
                matches!(result, Err(RemotingError::Config(_))),
                "address {address:?} should be a recoverable config error"
            );
        }
    }

    #[test]
    fn test_carries_through_endpoint_options() {
        let endpoint = DirectResolver::new("controller:41000")
            .with_protocols(vec!["JNLP4-connect".to_string()])
            .with_proxy_credentials("agent:hunter2")
            .resolve()
            .unwrap();

        assert!(endpoint.accepts("JNLP4-connect"));
        assert!(!endpoint.accepts("JNLP-connect"));
        assert_eq!(endpoint.proxy_credentials.as_deref(), Some("agent:hunter2"));
    }
}
