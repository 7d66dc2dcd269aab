//! Plaintext protocol versions (v1 and v2).
//!
//! Both exchange the same frames; v2 adds the reconnect cookie in each
//! direction. Neither validates the presented secret itself: that
//! belongs to the controller-side listener, which sees the decoded
//! headers at `after_properties` and approves or rejects there.

use std::sync::Arc;

use crate::crypto::SecretLookup;
use crate::error::{RemotingError, Result};
use crate::protocol::state::ConnectionState;
use crate::protocol::wire::{format_block, into_map, parse_block};
use crate::protocol::{
    GREETING_SUCCESS, PROP_AGENT_NAME, PROP_COOKIE, PROP_SECRET, PROTOCOL_PREFIX,
};

use super::{issue_cookie, AcceptedHandshake, HandshakeRequest, HandshakeResponse};

/// v1, `JNLP-connect`. No cookie support.
pub struct LegacyProtocol;

impl LegacyProtocol {
    pub(super) fn send(
        &self,
        state: &mut ConnectionState,
        request: &HandshakeRequest,
        protocol_name: &str,
    ) -> Result<HandshakeResponse> {
        state.fire_before_properties()?;
        send_greeting(state, protocol_name)?;
        initiator_exchange(state, request, false)
    }

    pub(super) fn receive(&self, state: &mut ConnectionState) -> Result<AcceptedHandshake> {
        state.fire_before_properties()?;
        acceptor_exchange(state, false, None)
    }
}

/// v2, `JNLP2-connect`. Adds the reconnect cookie.
pub struct CookieProtocol;

impl CookieProtocol {
    pub(super) fn send(
        &self,
        state: &mut ConnectionState,
        request: &HandshakeRequest,
        protocol_name: &str,
    ) -> Result<HandshakeResponse> {
        state.fire_before_properties()?;
        send_greeting(state, protocol_name)?;
        initiator_exchange(state, request, true)
    }

    pub(super) fn receive(&self, state: &mut ConnectionState) -> Result<AcceptedHandshake> {
        state.fire_before_properties()?;
        acceptor_exchange(state, true, None)
    }
}

/// Write the `Protocol:<name>` opening frame.
pub(super) fn send_greeting(state: &mut ConnectionState, protocol_name: &str) -> Result<()> {
    state
        .stream()?
        .write_utf(&format!("{PROTOCOL_PREFIX}{protocol_name}"))
}

/// Initiator side of the plaintext property exchange.
///
/// Shared with the transport-secured protocol, which runs the identical
/// exchange over its upgraded stream.
pub(super) fn initiator_exchange(
    state: &mut ConnectionState,
    request: &HandshakeRequest,
    with_cookie: bool,
) -> Result<HandshakeResponse> {
    let mut pairs = vec![
        (PROP_SECRET.to_string(), request.secret.expose().to_string()),
        (PROP_AGENT_NAME.to_string(), request.agent_name.clone()),
    ];
    if with_cookie {
        if let Some(cookie) = &request.cookie {
            pairs.push((PROP_COOKIE.to_string(), cookie.clone()));
        }
    }

    let stream = state.stream()?;
    stream.write_utf(&format_block(&pairs))?;

    let line = stream.read_line()?;
    if line != GREETING_SUCCESS {
        return Err(RemotingError::Refused(format!(
            "controller refused connection: {line}"
        )));
    }

    let response = into_map(stream.read_block()?);
    let cookie = if with_cookie {
        response.get(PROP_COOKIE).cloned()
    } else {
        None
    };
    if let Some(cookie) = &cookie {
        state.set_cookie(cookie.clone());
    }

    state.set_properties(response.clone());
    state.fire_after_properties()?;

    Ok(HandshakeResponse {
        cookie,
        properties: response,
    })
}

/// Acceptor side of the plaintext property exchange.
///
/// `secrets` is the direct-validation hook used by the transport-secured
/// protocol; the plaintext versions pass `None` and leave credential
/// checks to the listeners.
pub(super) fn acceptor_exchange(
    state: &mut ConnectionState,
    with_cookie: bool,
    secrets: Option<&Arc<dyn SecretLookup>>,
) -> Result<AcceptedHandshake> {
    let block = state.stream()?.read_utf()?;
    let headers = into_map(parse_block(&block)?);

    let agent_name = headers
        .get(PROP_AGENT_NAME)
        .cloned()
        .ok_or_else(|| missing_header(PROP_AGENT_NAME))?;
    let presented = headers
        .get(PROP_SECRET)
        .cloned()
        .ok_or_else(|| missing_header(PROP_SECRET))?;

    if let Some(secrets) = secrets {
        let expected = secrets
            .secret_for(&agent_name)
            .ok_or_else(|| RemotingError::Refused(format!("unknown agent: {agent_name}")))?;
        if presented != expected.expose() {
            return Err(RemotingError::Refused(format!(
                "invalid secret for agent: {agent_name}"
            )));
        }
    }

    state.set_properties(headers);
    state.fire_after_properties()?;

    let cookie = with_cookie.then(issue_cookie);

    let stream = state.stream()?;
    stream.write_line(GREETING_SUCCESS)?;
    match &cookie {
        Some(cookie) => stream.write_block(&[(PROP_COOKIE.to_string(), cookie.clone())])?,
        None => stream.write_block(&[])?,
    }
    if let Some(cookie) = &cookie {
        state.set_cookie(cookie.clone());
    }

    Ok(AcceptedHandshake { agent_name, cookie })
}

pub(super) fn missing_header(key: &str) -> RemotingError {
    RemotingError::Refused(format!("handshake is missing mandatory header: {key}"))
}
