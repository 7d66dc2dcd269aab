//! Agent configuration.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//!
//! The embedding process decides where the file lives and when the
//! environment wins; this module only loads, merges, and bridges the
//! result into resolver and handshake inputs.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::crypto::SharedSecret;
use crate::endpoint::DirectResolver;
use crate::error::{RemotingError, Result};
use crate::protocol::HandshakeRequest;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identity configuration
    #[serde(default)]
    pub agent: AgentSection,

    /// Controller endpoint configuration
    #[serde(default)]
    pub controller: ControllerSection,
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| RemotingError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| RemotingError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("REMOTING_AGENT_NAME") {
            config.agent.name = name;
        }
        if let Ok(secret) = std::env::var("REMOTING_AGENT_SECRET") {
            config.agent.secret = secret;
        }
        if let Ok(address) = std::env::var("REMOTING_CONTROLLER_ADDRESS") {
            config.controller.address = address;
        }
        if let Ok(identity) = std::env::var("REMOTING_CONTROLLER_IDENTITY") {
            config.controller.identity = Some(identity);
        }

        config
    }

    /// Merge with another config (other takes precedence)
    pub fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            agent: AgentSection {
                name: pick(self.agent.name, other.agent.name, &defaults.agent.name),
                secret: pick(self.agent.secret, other.agent.secret, &defaults.agent.secret),
            },
            controller: ControllerSection {
                address: pick(
                    self.controller.address,
                    other.controller.address,
                    &defaults.controller.address,
                ),
                identity: other.controller.identity.or(self.controller.identity),
                protocols: if other.controller.protocols.is_empty() {
                    self.controller.protocols
                } else {
                    other.controller.protocols
                },
                certificates: if other.controller.certificates.is_empty() {
                    self.controller.certificates
                } else {
                    other.controller.certificates
                },
                proxy_credentials: other
                    .controller
                    .proxy_credentials
                    .or(self.controller.proxy_credentials),
            },
        }
    }

    /// Bridge into a direct-connection resolver.
    ///
    /// Certificates are configured as base64 DER blobs; a bad blob is a
    /// recoverable configuration error.
    pub fn resolver(&self) -> Result<DirectResolver> {
        let mut certificates = Vec::with_capacity(self.controller.certificates.len());
        for blob in &self.controller.certificates {
            let der = BASE64
                .decode(blob.trim())
                .map_err(|e| RemotingError::Config(format!("bad certificate in config: {e}")))?;
            certificates.push(der);
        }

        let mut resolver = DirectResolver::new(&self.controller.address)
            .with_protocols(self.controller.protocols.iter().cloned())
            .with_certificates(certificates);
        if let Some(identity) = &self.controller.identity {
            resolver = resolver.with_identity(identity);
        }
        if let Some(credentials) = &self.controller.proxy_credentials {
            resolver = resolver.with_proxy_credentials(credentials);
        }
        Ok(resolver)
    }

    /// Bridge into the initiator-side handshake inputs.
    pub fn handshake_request(&self, cookie: Option<String>) -> HandshakeRequest {
        HandshakeRequest {
            agent_name: self.agent.name.clone(),
            secret: SharedSecret::new(&*self.agent.secret),
            cookie,
        }
    }
}

fn pick(mine: String, other: String, default: &str) -> String {
    if other != default {
        other
    } else {
        mine
    }
}

/// Agent identity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    /// Provisioned agent name
    #[serde(default)]
    pub name: String,

    /// Pre-shared secret for that name
    #[serde(default)]
    pub secret: String,
}

/// Controller endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSection {
    /// Controller address as `host:port`
    pub address: String,

    /// Base64 X.509 SubjectPublicKeyInfo of the controller's RSA
    /// identity key, if pinned
    pub identity: Option<String>,

    /// Accepted protocol names; empty accepts any
    #[serde(default)]
    pub protocols: Vec<String>,

    /// Base64 DER certificates for transport security
    #[serde(default)]
    pub certificates: Vec<String>,

    /// `user:password` proxy credentials
    pub proxy_credentials: Option<String>,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            address: "localhost:50000".to_string(),
            identity: None,
            protocols: Vec::new(),
            certificates: Vec::new(),
            proxy_credentials: None,
        }
    }
}
