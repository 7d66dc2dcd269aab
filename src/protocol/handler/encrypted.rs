//! Encrypted-handshake protocol (v3).
//!
//! Header keys stay plaintext; header values are encrypted with the
//! connection-scoped handshake ciphers. The agent name is the one value
//! that must travel in clear, and it must come first: the acceptor
//! needs it to look up the shared secret and derive the cipher before
//! any other value can be decrypted. That ordering is a wire-
//! compatibility property of the legacy protocol, preserved on purpose.
//!
//! On success both sides derive a second, per-connection cipher pair
//! from the freshly issued cookie; the channel transport is wrapped in
//! it when the channel is built.

use std::sync::Arc;

use crate::crypto::{ChannelCiphers, CipherRole, HandshakeCiphers, SecretLookup};
use crate::error::{RemotingError, Result};
use crate::protocol::state::ConnectionState;
use crate::protocol::wire::{format_block, into_map, parse_block};
use crate::protocol::{GREETING_SUCCESS, PROP_AGENT_NAME, PROP_COOKIE, PROP_SECRET};

use super::plain::{missing_header, send_greeting};
use super::{issue_cookie, AcceptedHandshake, HandshakeRequest, HandshakeResponse};

/// v3, `JNLP3-connect`.
pub struct EncryptedProtocol {
    secrets: Arc<dyn SecretLookup>,
}

impl EncryptedProtocol {
    pub(super) fn new(secrets: Arc<dyn SecretLookup>) -> Self {
        Self { secrets }
    }

    pub(super) fn send(
        &self,
        state: &mut ConnectionState,
        request: &HandshakeRequest,
        protocol_name: &str,
    ) -> Result<HandshakeResponse> {
        state.fire_before_properties()?;
        send_greeting(state, protocol_name)?;

        state.set_handshake_ciphers(HandshakeCiphers::create(
            &request.agent_name,
            &request.secret,
        ));

        // Agent name first and in clear; everything after it encrypted.
        let mut pairs = vec![(PROP_AGENT_NAME.to_string(), request.agent_name.clone())];
        {
            let ciphers = state.handshake_ciphers()?;
            pairs.push((
                PROP_SECRET.to_string(),
                ciphers.encrypt(request.secret.expose())?,
            ));
            if let Some(cookie) = &request.cookie {
                pairs.push((PROP_COOKIE.to_string(), ciphers.encrypt(cookie)?));
            }
        }
        state.stream()?.write_utf(&format_block(&pairs))?;

        let line = state.stream()?.read_line()?;
        if line != GREETING_SUCCESS {
            return Err(RemotingError::Refused(format!(
                "controller refused connection: {line}"
            )));
        }

        let enciphered = state.stream()?.read_block()?;
        let mut response = Vec::with_capacity(enciphered.len());
        for (key, value) in enciphered {
            let value = state.handshake_ciphers()?.decrypt(&value)?;
            response.push((key, value));
        }
        let response = into_map(response);

        let cookie = response
            .get(PROP_COOKIE)
            .cloned()
            .ok_or_else(|| missing_header(PROP_COOKIE))?;
        state.set_cookie(cookie.clone());
        state.set_channel_ciphers(ChannelCiphers::derive(
            &request.secret,
            &cookie,
            CipherRole::Initiator,
        ));

        state.set_properties(response.clone());
        state.fire_after_properties()?;

        Ok(HandshakeResponse {
            cookie: Some(cookie),
            properties: response,
        })
    }

    pub(super) fn receive(&self, state: &mut ConnectionState) -> Result<AcceptedHandshake> {
        state.fire_before_properties()?;

        let block = state.stream()?.read_utf()?;
        let pairs = parse_block(&block)?;

        // The name header carries the secret lookup key; nothing can be
        // decrypted until it has been read. Enforce the ordering.
        let agent_name = match pairs.first() {
            Some((key, value)) if key == PROP_AGENT_NAME => value.clone(),
            Some((key, _)) => {
                return Err(RemotingError::Refused(format!(
                    "first handshake header must be {PROP_AGENT_NAME}, got {key}"
                )))
            }
            None => return Err(missing_header(PROP_AGENT_NAME)),
        };

        let secret = self
            .secrets
            .secret_for(&agent_name)
            .ok_or_else(|| RemotingError::Refused(format!("unknown agent: {agent_name}")))?;
        state.set_handshake_ciphers(HandshakeCiphers::create(&agent_name, &secret));

        let mut headers = Vec::with_capacity(pairs.len());
        headers.push((PROP_AGENT_NAME.to_string(), agent_name.clone()));
        for (key, value) in pairs.into_iter().skip(1) {
            let value = state.handshake_ciphers()?.decrypt(&value)?;
            headers.push((key, value));
        }
        let headers = into_map(headers);

        let presented = headers
            .get(PROP_SECRET)
            .ok_or_else(|| missing_header(PROP_SECRET))?;
        if presented != secret.expose() {
            return Err(RemotingError::Refused(format!(
                "invalid secret for agent: {agent_name}"
            )));
        }

        state.set_properties(headers);
        state.fire_after_properties()?;

        let cookie = issue_cookie();
        let response = vec![(
            PROP_COOKIE.to_string(),
            state.handshake_ciphers()?.encrypt(&cookie)?,
        )];

        let stream = state.stream()?;
        stream.write_line(GREETING_SUCCESS)?;
        stream.write_block(&response)?;

        state.set_cookie(cookie.clone());
        state.set_channel_ciphers(ChannelCiphers::derive(
            &secret,
            &cookie,
            CipherRole::Acceptor,
        ));

        Ok(AcceptedHandshake {
            agent_name,
            cookie: Some(cookie),
        })
    }
}
