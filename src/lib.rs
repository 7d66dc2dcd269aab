//! # Remoting Core - Agent/Controller Handshake Negotiation
//!
//! Versioned, listener-governed handshake between a remote worker
//! ("agent") and a central coordinator ("controller") over a raw
//! bidirectional stream, before any higher-level RPC channel exists.
//!
//! ## Features
//!
//! - **Four wire protocols**: plaintext (v1), reconnect cookies (v2),
//!   encrypted handshake + cipher data channel (v3), transport-secured
//!   negotiate-then-upgrade (v4) — negotiated strongest-first
//! - **Listener-driven approval**: every attempt runs an ordered
//!   listener chain with ignore/reject/approve semantics and exactly
//!   one channel owner
//! - **Connection-scoped cryptography**: PBKDF2-derived AES-CTR cipher
//!   pairs per attempt, with explicit counter re-arm between messages
//! - **Endpoint resolution**: direct `host:port` configuration or a
//!   control-plane-fed resolver, with pinned RSA identity keys
//!
//! ## Handshake Overview
//!
//! ```text
//! Agent                               Controller
//!    |                                    |
//!    |---- Protocol:<name> greeting ----->|  version selection
//!    |---- property block --------------->|  Secret-Key / Agent-Name / Cookie
//!    |                                    |      listeners: reject or approve
//!    |<--- "Welcome" + properties --------|  fresh Cookie issued
//!    |                                    |
//!    |====== application channel ========>|  built by the approving listener
//! ```
//!
//! ## Lifecycle State Machine
//!
//! ```text
//!  Init ──► BeforeProperties ──► AfterProperties ──► BeforeChannel
//!                 │                    │                   │
//!                 │ reject             │ reject            │ reject
//!                 ▼                    ▼                   ▼
//!            Disconnected ◄── ChannelClosed ◄── AfterChannel
//! ```
//!
//! ## Quick Start
//!
//! ### Initiator (agent) side
//!
//! ```rust,ignore
//! use remoting::{AgentConfig, EndpointResolver, ProtocolHandler};
//!
//! let config = AgentConfig::from_file("remoting.toml")?;
//! let endpoint = config.resolver()?.resolve()?;
//!
//! let handler = ProtocolHandler::v2();
//! let mut state = handler.create_connection_state(stream, listeners);
//! let response = handler.send_handshake(&mut state, &config.handshake_request(None))?;
//! let channel = handler.build_channel(&mut state)?;
//! // response.cookie is presented on the next attempt
//! ```
//!
//! ### Acceptor (controller) side
//!
//! ```rust,ignore
//! use remoting::{read_greeting, ProtocolHandlerFactory};
//!
//! let handlers = ProtocolHandlerFactory::handlers(secrets, hub, security);
//! let mut state = handlers[0].create_connection_state(stream, listeners);
//! let name = read_greeting(&mut state)?;
//! let handler = ProtocolHandlerFactory::find(&handlers, &name)
//!     .ok_or_else(|| /* refuse unknown protocol */)?;
//! let accepted = handler.receive_handshake(&mut state)?;
//! let channel = handler.build_channel(&mut state)?;
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: handler family, connection lifecycle, wire codec
//! - [`crypto`]: handshake and channel ciphers, shared secrets
//! - [`endpoint`]: endpoint resolvers and identity-key decoding
//! - [`channel`]: application-channel seam
//! - [`runtime`]: engine collaborator capabilities
//! - [`config`]: TOML + environment configuration
//! - [`error`]: error types and result alias

pub mod channel;
pub mod config;
pub mod crypto;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod runtime;

// Re-exports for convenience
pub use channel::{Channel, ChannelBuilder, DuplexStream, StreamChannelBuilder};
pub use config::AgentConfig;
pub use crypto::{
    ChannelCiphers, CipherRole, HandshakeCiphers, SecretLookup, SharedSecret, StaticSecretMap,
};
pub use endpoint::{decode_identity, DirectResolver, Endpoint, EndpointResolver, SuppliedResolver};
pub use error::{RemotingError, Result};
pub use protocol::{
    read_greeting, AcceptedHandshake, ConnectionEvent, ConnectionState, ConnectionStateListener,
    HandshakeRequest, HandshakeResponse, LifecyclePhase, ProtocolHandler, ProtocolHandlerFactory,
};
pub use runtime::{
    EventNotifier, IoHub, LogNotifier, TaskExecutor, ThreadExecutor, TransportSecurity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Newest wire protocol this build speaks
pub const NEWEST_PROTOCOL: &str = "JNLP4-connect";
