//! Transport-secured protocol (v4).
//!
//! Replaces the bespoke handshake encryption with transport-level
//! security for the whole connection. Framing changes to
//! negotiate-then-upgrade: the greeting and its acknowledgement travel
//! in plaintext, the stream is upgraded through the engine's transport
//! security context, and the ordinary cookie-bearing property exchange
//! runs inside the secured stream. The acceptor validates the presented
//! secret directly — by the time headers arrive they are
//! tamper-protected, so the check no longer needs to hide behind the
//! cipher derivation dance of v3.

use std::sync::Arc;

use crate::crypto::SecretLookup;
use crate::error::{RemotingError, Result};
use crate::protocol::state::ConnectionState;
use crate::protocol::GREETING_SUCCESS;
use crate::runtime::TransportSecurity;

use super::plain::{acceptor_exchange, initiator_exchange, send_greeting};
use super::{AcceptedHandshake, HandshakeRequest, HandshakeResponse};

/// v4, `JNLP4-connect`.
pub struct SecuredProtocol {
    security: Arc<dyn TransportSecurity>,
    secrets: Arc<dyn SecretLookup>,
}

impl SecuredProtocol {
    pub(super) fn new(security: Arc<dyn TransportSecurity>, secrets: Arc<dyn SecretLookup>) -> Self {
        Self { security, secrets }
    }

    pub(super) fn send(
        &self,
        state: &mut ConnectionState,
        request: &HandshakeRequest,
        protocol_name: &str,
    ) -> Result<HandshakeResponse> {
        state.fire_before_properties()?;
        send_greeting(state, protocol_name)?;

        // Negotiate: the peer must agree to upgrade before we do.
        let line = state.stream()?.read_line()?;
        if line != GREETING_SUCCESS {
            return Err(RemotingError::Refused(format!(
                "controller refused connection: {line}"
            )));
        }

        let plaintext = state.take_stream()?.into_inner();
        let secured = self.security.secure_initiator(plaintext)?;
        state.replace_stream(secured);

        initiator_exchange(state, request, true)
    }

    pub(super) fn receive(&self, state: &mut ConnectionState) -> Result<AcceptedHandshake> {
        state.fire_before_properties()?;

        // Agree to the upgrade, then stop talking plaintext.
        state.stream()?.write_line(GREETING_SUCCESS)?;

        let plaintext = state.take_stream()?.into_inner();
        let secured = self.security.secure_acceptor(plaintext)?;
        state.replace_stream(secured);

        acceptor_exchange(state, true, Some(&self.secrets))
    }
}
