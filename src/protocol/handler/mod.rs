//! The versioned protocol handler family.
//!
//! Four wire protocols coexist so that old agents keep connecting while
//! new deployments get stronger guarantees:
//!
//! | Version | Name            | Handshake protection                  |
//! |---------|-----------------|---------------------------------------|
//! | v1      | `JNLP-connect`  | none (plaintext)                      |
//! | v2      | `JNLP2-connect` | none, adds the reconnect cookie       |
//! | v3      | `JNLP3-connect` | header values encrypted, cipher data channel |
//! | v4      | `JNLP4-connect` | whole connection upgraded to transport security |
//!
//! Handlers are a closed set of tagged variants behind one method
//! surface, so the factory assembles an ordered preference list without
//! any runtime type inspection. Every handler instance is stateless and
//! shared by all concurrent connection attempts; per-attempt data —
//! cookies, ciphers, decoded headers — lives exclusively on the
//! [`ConnectionState`] the handler creates per attempt.

mod encrypted;
mod plain;
mod secured;

pub use encrypted::EncryptedProtocol;
pub use plain::{CookieProtocol, LegacyProtocol};
pub use secured::SecuredProtocol;

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;
use tracing::debug;

use crate::channel::{Channel, DuplexStream};
use crate::crypto::{CipherDuplex, SecretLookup, SharedSecret};
use crate::error::{RemotingError, Result};
use crate::protocol::listener::ConnectionStateListener;
use crate::protocol::state::ConnectionState;
use crate::runtime::TransportSecurity;

/// Initiator-side inputs to one handshake attempt.
pub struct HandshakeRequest {
    /// The agent's provisioned name.
    pub agent_name: String,
    /// The pre-shared secret for that name.
    pub secret: SharedSecret,
    /// Cookie issued by the controller on the previous successful
    /// session, if one is held.
    pub cookie: Option<String>,
}

/// What the initiator learned from a successful handshake.
pub struct HandshakeResponse {
    /// Fresh cookie to present on the next attempt, for versions that
    /// issue one.
    pub cookie: Option<String>,
    /// The controller's decoded response headers.
    pub properties: HashMap<String, String>,
}

/// What the acceptor learned from a successful handshake.
pub struct AcceptedHandshake {
    /// The connecting agent's name.
    pub agent_name: String,
    /// Cookie issued to the agent, for versions that issue one. The
    /// engine uses the cookie the agent *presented* (in the decoded
    /// headers) to detect reconnects and retire stale sessions.
    pub cookie: Option<String>,
}

/// Version-specific wire codec driving a [`ConnectionState`] through
/// its lifecycle.
pub enum ProtocolHandler {
    /// v1, `JNLP-connect`: plaintext, no cookie.
    V1(LegacyProtocol),
    /// v2, `JNLP2-connect`: plaintext plus the reconnect cookie.
    V2(CookieProtocol),
    /// v3, `JNLP3-connect`: encrypted header values and data channel.
    V3(EncryptedProtocol),
    /// v4, `JNLP4-connect`: negotiate-then-upgrade transport security.
    V4(SecuredProtocol),
}

impl ProtocolHandler {
    /// The original plaintext protocol.
    pub fn v1() -> Self {
        Self::V1(LegacyProtocol)
    }

    /// Plaintext protocol with reconnect cookies.
    pub fn v2() -> Self {
        Self::V2(CookieProtocol)
    }

    /// Encrypted-handshake protocol. The acceptor side derives ciphers
    /// from secrets resolved through `secrets`.
    pub fn v3(secrets: Arc<dyn SecretLookup>) -> Self {
        Self::V3(EncryptedProtocol::new(secrets))
    }

    /// Transport-secured protocol.
    pub fn v4(security: Arc<dyn TransportSecurity>, secrets: Arc<dyn SecretLookup>) -> Self {
        Self::V4(SecuredProtocol::new(security, secrets))
    }

    /// Protocol name as it appears in the wire greeting.
    pub fn name(&self) -> &'static str {
        match self {
            Self::V1(_) => "JNLP-connect",
            Self::V2(_) => "JNLP2-connect",
            Self::V3(_) => "JNLP3-connect",
            Self::V4(_) => "JNLP4-connect",
        }
    }

    /// Build the per-attempt state wrapping `stream` and `listeners`.
    ///
    /// Cookie and cipher fields start empty and are filled in by the
    /// exchange; the handler itself records nothing.
    pub fn create_connection_state(
        &self,
        stream: Box<dyn DuplexStream>,
        listeners: Vec<Arc<dyn ConnectionStateListener>>,
    ) -> ConnectionState {
        ConnectionState::new(stream, listeners)
    }

    /// Drive the initiator side of the handshake.
    ///
    /// On failure the state is disconnected (listeners get their
    /// terminal notification) and the error propagates to the caller;
    /// retry policy lives with the engine.
    pub fn send_handshake(
        &self,
        state: &mut ConnectionState,
        request: &HandshakeRequest,
    ) -> Result<HandshakeResponse> {
        let outcome = match self {
            Self::V1(proto) => proto.send(state, request, self.name()),
            Self::V2(proto) => proto.send(state, request, self.name()),
            Self::V3(proto) => proto.send(state, request, self.name()),
            Self::V4(proto) => proto.send(state, request, self.name()),
        };
        match outcome {
            Ok(response) => {
                debug!(protocol = self.name(), "handshake sent and accepted");
                Ok(response)
            }
            Err(err) => {
                state.disconnect();
                Err(err)
            }
        }
    }

    /// Drive the acceptor side of the handshake. Assumes the engine has
    /// already consumed the protocol greeting (see
    /// [`read_greeting`](crate::protocol::read_greeting)) and selected
    /// this handler by name.
    ///
    /// On refusal the peer is told why before the local abort; on
    /// transport failure there is nobody left to tell.
    pub fn receive_handshake(&self, state: &mut ConnectionState) -> Result<AcceptedHandshake> {
        let outcome = match self {
            Self::V1(proto) => proto.receive(state),
            Self::V2(proto) => proto.receive(state),
            Self::V3(proto) => proto.receive(state),
            Self::V4(proto) => proto.receive(state),
        };
        match outcome {
            Ok(accepted) => {
                debug!(
                    protocol = self.name(),
                    agent = accepted.agent_name,
                    "handshake accepted"
                );
                Ok(accepted)
            }
            Err(err) => {
                if !matches!(err, RemotingError::Io(_)) {
                    state.report_refusal(&err.to_string());
                }
                state.disconnect();
                Err(err)
            }
        }
    }

    /// Construct the post-handshake channel through the approving
    /// listener's builder.
    ///
    /// Fires `before_channel` (still veto-able), wraps the transport in
    /// the per-connection channel ciphers when the version derived
    /// them, and delivers the `after_channel` notification.
    pub fn build_channel(&self, state: &mut ConnectionState) -> Result<Channel> {
        match build_channel_inner(state) {
            Ok(channel) => Ok(channel),
            Err(err) => {
                state.disconnect();
                Err(err)
            }
        }
    }
}

fn build_channel_inner(state: &mut ConnectionState) -> Result<Channel> {
    state.fire_before_channel()?;

    let builder = state.approved_builder().ok_or_else(|| {
        RemotingError::Refused("no listener approved the connection".to_string())
    })?;

    let transport = state.take_stream()?.into_inner();
    let transport: Box<dyn DuplexStream> = match state.take_channel_ciphers() {
        Some(ciphers) => Box::new(CipherDuplex::new(transport, ciphers)),
        None => transport,
    };

    let channel = builder.build(transport)?;
    state.fire_after_channel(&channel);
    Ok(channel)
}

/// Issue a fresh session cookie: 32 random bytes, hex-encoded.
///
/// Opaque to the agent; the controller only ever compares it verbatim.
pub(crate) fn issue_cookie() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
