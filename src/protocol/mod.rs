//! Handshake negotiation and the connection lifecycle.
//!
//! Implements the versioned agent-to-controller handshake that runs
//! before any higher-level RPC channel exists, over a raw bidirectional
//! stream the transport layer already established.
//!
//! # Exchange Overview
//!
//! ```text
//! Agent                                Controller
//!   |                                      |
//!   |---- "Protocol:JNLP2-connect" ------->|  length-prefixed greeting
//!   |---- property block ----------------->|  Secret-Key / Agent-Name / Cookie
//!   |                                      |
//!   |<--- "Welcome" -----------------------|  success token line
//!   |<--- property block (blank-line end) -|  fresh Cookie
//!   |                                      |
//!   |====== application channel ==========>|  built by the approving listener
//! ```
//!
//! A refusal replaces the success token with an `Error: <reason>` line;
//! the initiator surfaces that raw line as the failure detail.
//!
//! # Connection Lifecycle
//!
//! Every attempt drives one [`ConnectionState`] through these phases:
//!
//! | Phase              | Meaning                            | Listener power      |
//! |--------------------|------------------------------------|---------------------|
//! | `Init`             | created, nothing exchanged         | —                   |
//! | `BeforeProperties` | exchange starting                  | ignore/reject/approve |
//! | `AfterProperties`  | peer headers decoded               | ignore/reject/approve |
//! | `BeforeChannel`    | approved, channel imminent         | ignore/reject/approve |
//! | `AfterChannel`     | channel established                | notification only   |
//! | `ChannelClosed`    | channel shut down                  | notification only   |
//! | `Disconnected`     | terminal; cleanup ran exactly once | notification only   |
//!
//! Rejection at any veto-able phase jumps straight to `Disconnected`.
//! Exactly one listener may approve — approval carries the channel
//! builder, and two owners would leave channel decoration undefined.
//!
//! # Versions
//!
//! The handler family covers four wire protocols; see
//! [`ProtocolHandler`] for the per-version differences and
//! [`ProtocolHandlerFactory`] for the strongest-first preference list.

pub mod factory;
pub mod handler;
pub mod listener;
pub mod state;
pub mod wire;

pub use factory::ProtocolHandlerFactory;
pub use handler::{
    AcceptedHandshake, HandshakeRequest, HandshakeResponse, ProtocolHandler,
};
pub use listener::ConnectionStateListener;
pub use state::{ConnectionEvent, ConnectionState, LifecyclePhase};

use crate::error::{RemotingError, Result};

/// Prefix of the opening greeting frame.
pub const PROTOCOL_PREFIX: &str = "Protocol:";

/// Success token, exchanged verbatim; any other line is a refusal.
pub const GREETING_SUCCESS: &str = "Welcome";

/// Prefix of the refusal line an acceptor sends before aborting.
pub const GREETING_FAILURE: &str = "Error:";

/// Header carrying the agent's pre-shared secret.
pub const PROP_SECRET: &str = "Secret-Key";

/// Header carrying the agent's provisioned name.
pub const PROP_AGENT_NAME: &str = "Agent-Name";

/// Header carrying the reconnect cookie.
pub const PROP_COOKIE: &str = "Cookie";

/// Read the opening greeting and return the protocol name it announces.
///
/// Acceptors call this once per incoming connection, then dispatch to
/// the matching handler via
/// [`ProtocolHandlerFactory::find`].
pub fn read_greeting(state: &mut ConnectionState) -> Result<String> {
    let line = state.stream()?.read_utf()?;
    line.strip_prefix(PROTOCOL_PREFIX)
        .map(str::to_string)
        .ok_or_else(|| {
            RemotingError::Protocol(format!(
                "connection did not open with a protocol greeting: {line}"
            ))
        })
}
