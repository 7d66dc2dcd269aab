//! Per-attempt connection state and listener dispatch.
//!
//! One `ConnectionState` exists per handshake task and is the only
//! place per-attempt mutable data lives: decoded headers, approval
//! ownership, the per-listener stash, cookie and cipher material, and
//! the transport itself. Protocol handlers stay stateless and are
//! shared freely across concurrent attempts.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{Channel, ChannelBuilder, DuplexStream};
use crate::crypto::{ChannelCiphers, HandshakeCiphers};
use crate::error::{RemotingError, Result};
use crate::protocol::listener::ConnectionStateListener;
use crate::protocol::wire::FramedStream;
use crate::protocol::GREETING_FAILURE;

/// Lifecycle milestones of one connection attempt, in order.
///
/// Rejection at any veto-able milestone short-circuits straight to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Created, nothing exchanged yet.
    Init,
    /// Exchange starting; headers not yet read.
    BeforeProperties,
    /// Peer headers decoded and validated by listeners.
    AfterProperties,
    /// Approved; channel construction imminent.
    BeforeChannel,
    /// Application channel established.
    AfterChannel,
    /// Channel has shut down.
    ChannelClosed,
    /// Terminal. Cleanup has run exactly once.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerStatus {
    Active,
    Ignored,
}

struct ListenerSlot {
    listener: Arc<dyn ConnectionStateListener>,
    status: ListenerStatus,
}

/// What a listener asked for during one callback.
enum Decision {
    None,
    Ignore,
    Reject(String),
}

type Stash = HashMap<(usize, TypeId), Box<dyn Any + Send>>;

/// Listener-facing view of the connection at one milestone.
///
/// Carries the decoded headers, the calling listener's stash slot, and
/// the ignore/reject/approve controls described on
/// [`ConnectionStateListener`].
pub struct ConnectionEvent<'a> {
    listener_index: usize,
    phase: LifecyclePhase,
    properties: Option<&'a HashMap<String, String>>,
    channel_name: Option<&'a str>,
    stash: &'a mut Stash,
    owner: &'a mut Option<usize>,
    builder: &'a mut Option<Arc<dyn ChannelBuilder>>,
    decision: Decision,
}

impl ConnectionEvent<'_> {
    /// The milestone this callback belongs to.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    fn vetoable(&self) -> bool {
        matches!(
            self.phase,
            LifecyclePhase::BeforeProperties
                | LifecyclePhase::AfterProperties
                | LifecyclePhase::BeforeChannel
        )
    }

    /// Look up one decoded header value.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.and_then(|map| map.get(key)).map(String::as_str)
    }

    /// The full decoded header map, once properties have been exchanged.
    pub fn properties(&self) -> Option<&HashMap<String, String>> {
        self.properties
    }

    /// Name of the established channel, during `after_channel` only.
    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name
    }

    /// Whether some listener has already claimed channel ownership.
    pub fn is_approved(&self) -> bool {
        self.owner.is_some()
    }

    /// Stop receiving milestone callbacks for this attempt.
    ///
    /// The terminal disconnect notification is still delivered. Only
    /// meaningful at veto-able milestones.
    pub fn ignore(&mut self) {
        if self.vetoable() {
            self.decision = Decision::Ignore;
        } else {
            warn!("ignore() called during a notification milestone; no effect");
        }
    }

    /// Abort the whole attempt.
    ///
    /// Listeners later in the order are skipped, the state jumps to
    /// `Disconnected`, and no channel is built.
    pub fn reject(&mut self, reason: impl Into<String>) {
        if self.vetoable() {
            self.decision = Decision::Reject(reason.into());
        } else {
            warn!("reject() called during a notification milestone; no effect");
        }
    }

    /// Claim exclusive ownership of channel construction.
    ///
    /// The supplied builder produces the application channel once the
    /// handshake succeeds. Fails if ownership was already claimed or if
    /// called outside the veto-able milestones.
    pub fn approve(&mut self, builder: Arc<dyn ChannelBuilder>) -> Result<()> {
        if !self.vetoable() {
            return Err(RemotingError::Protocol(
                "approval is only valid before the channel is built".to_string(),
            ));
        }
        if self.owner.is_some() {
            return Err(RemotingError::Protocol(
                "connection already approved; channel ownership is exclusive".to_string(),
            ));
        }
        *self.owner = Some(self.listener_index);
        *self.builder = Some(builder);
        Ok(())
    }

    /// Store a per-connection value retrievable by this listener at any
    /// later milestone of the same attempt.
    pub fn stash<T: Any + Send>(&mut self, value: T) {
        self.stash
            .insert((self.listener_index, TypeId::of::<T>()), Box::new(value));
    }

    /// Retrieve a value this listener stashed earlier in the attempt.
    pub fn stashed<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.stash
            .get_mut(&(self.listener_index, TypeId::of::<T>()))
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }
}

/// Mutable record of one connection attempt.
///
/// Owned by exactly one handshake task; listener callbacks run
/// synchronously on that task, in registration order. Independent
/// attempts use independent instances and are free to run concurrently.
pub struct ConnectionState {
    stream: Option<FramedStream>,
    listeners: Vec<ListenerSlot>,
    properties: Option<HashMap<String, String>>,
    stash: Stash,
    owner: Option<usize>,
    builder: Option<Arc<dyn ChannelBuilder>>,
    cookie: Option<String>,
    handshake_ciphers: Option<HandshakeCiphers>,
    channel_ciphers: Option<ChannelCiphers>,
    phase: LifecyclePhase,
}

impl ConnectionState {
    /// Wrap a transport and listener list for one attempt.
    pub fn new(
        stream: Box<dyn DuplexStream>,
        listeners: Vec<Arc<dyn ConnectionStateListener>>,
    ) -> Self {
        Self {
            stream: Some(FramedStream::new(stream)),
            listeners: listeners
                .into_iter()
                .map(|listener| ListenerSlot {
                    listener,
                    status: ListenerStatus::Active,
                })
                .collect(),
            properties: None,
            stash: Stash::new(),
            owner: None,
            builder: None,
            cookie: None,
            handshake_ciphers: None,
            channel_ciphers: None,
            phase: LifecyclePhase::Init,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Decoded header map from the peer, once exchanged.
    pub fn properties(&self) -> Option<&HashMap<String, String>> {
        self.properties.as_ref()
    }

    pub(crate) fn set_properties(&mut self, map: HashMap<String, String>) {
        self.properties = Some(map);
    }

    /// Session cookie currently bound to this attempt.
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub(crate) fn set_cookie(&mut self, cookie: String) {
        self.cookie = Some(cookie);
    }

    pub(crate) fn set_handshake_ciphers(&mut self, ciphers: HandshakeCiphers) {
        self.handshake_ciphers = Some(ciphers);
    }

    pub(crate) fn handshake_ciphers(&mut self) -> Result<&mut HandshakeCiphers> {
        self.handshake_ciphers.as_mut().ok_or_else(|| {
            RemotingError::Protocol("handshake ciphers not derived for this attempt".to_string())
        })
    }

    pub(crate) fn set_channel_ciphers(&mut self, ciphers: ChannelCiphers) {
        self.channel_ciphers = Some(ciphers);
    }

    pub(crate) fn take_channel_ciphers(&mut self) -> Option<ChannelCiphers> {
        self.channel_ciphers.take()
    }

    pub(crate) fn stream(&mut self) -> Result<&mut FramedStream> {
        self.stream.as_mut().ok_or_else(|| {
            RemotingError::Protocol("connection stream no longer held by this state".to_string())
        })
    }

    pub(crate) fn take_stream(&mut self) -> Result<FramedStream> {
        self.stream.take().ok_or_else(|| {
            RemotingError::Protocol("connection stream no longer held by this state".to_string())
        })
    }

    pub(crate) fn replace_stream(&mut self, stream: Box<dyn DuplexStream>) {
        self.stream = Some(FramedStream::new(stream));
    }

    /// Builder supplied by the approving listener, if any approved.
    pub(crate) fn approved_builder(&self) -> Option<Arc<dyn ChannelBuilder>> {
        self.builder.clone()
    }

    /// Best-effort refusal report to the peer before local abort.
    ///
    /// Acceptors call this so the initiator sees a readable failure line
    /// instead of a dead socket. Write errors are irrelevant here: the
    /// attempt is already being torn down.
    pub(crate) fn report_refusal(&mut self, reason: &str) {
        if let Some(stream) = self.stream.as_mut() {
            if let Err(err) = stream.write_line(&format!("{GREETING_FAILURE} {reason}")) {
                debug!("could not report refusal to peer: {err}");
            }
        }
    }

    pub(crate) fn fire_before_properties(&mut self) -> Result<()> {
        self.fire_vetoable(LifecyclePhase::BeforeProperties, |listener, event| {
            listener.before_properties(event)
        })
    }

    pub(crate) fn fire_after_properties(&mut self) -> Result<()> {
        self.fire_vetoable(LifecyclePhase::AfterProperties, |listener, event| {
            listener.after_properties(event)
        })
    }

    pub(crate) fn fire_before_channel(&mut self) -> Result<()> {
        self.fire_vetoable(LifecyclePhase::BeforeChannel, |listener, event| {
            listener.before_channel(event)
        })
    }

    pub(crate) fn fire_after_channel(&mut self, channel: &Channel) {
        self.phase = LifecyclePhase::AfterChannel;
        self.notify(LifecyclePhase::AfterChannel, Some(channel.name()), false);
    }

    /// The engine observed the channel shutting down.
    ///
    /// Fires the `channel_closed` notification, then the terminal
    /// disconnect.
    pub fn channel_closed(&mut self) {
        if self.phase == LifecyclePhase::Disconnected {
            return;
        }
        self.phase = LifecyclePhase::ChannelClosed;
        self.notify(LifecyclePhase::ChannelClosed, None, false);
        self.disconnect();
    }

    /// Terminate the attempt.
    ///
    /// Idempotent. Every registered listener — ignoring ones included —
    /// receives exactly one disconnect notification; afterwards the
    /// stash is released and the stream is dropped.
    pub fn disconnect(&mut self) {
        if self.phase == LifecyclePhase::Disconnected {
            return;
        }
        self.phase = LifecyclePhase::Disconnected;
        self.notify(LifecyclePhase::Disconnected, None, true);
        self.stash.clear();
        self.stream = None;
    }

    /// Run one veto-able milestone through the listener chain in order.
    fn fire_vetoable(
        &mut self,
        phase: LifecyclePhase,
        call: impl Fn(&dyn ConnectionStateListener, &mut ConnectionEvent<'_>) -> Result<()>,
    ) -> Result<()> {
        self.phase = phase;
        for index in 0..self.listeners.len() {
            if self.listeners[index].status == ListenerStatus::Ignored {
                continue;
            }
            let listener = Arc::clone(&self.listeners[index].listener);
            let mut event = ConnectionEvent {
                listener_index: index,
                phase,
                properties: self.properties.as_ref(),
                channel_name: None,
                stash: &mut self.stash,
                owner: &mut self.owner,
                builder: &mut self.builder,
                decision: Decision::None,
            };
            let outcome = call(listener.as_ref(), &mut event);
            let decision = std::mem::replace(&mut event.decision, Decision::None);
            drop(event);

            match (outcome, decision) {
                (Err(err), _) => {
                    warn!(?phase, listener = index, "listener failed: {err}");
                    return Err(err);
                }
                (Ok(()), Decision::Reject(reason)) => {
                    warn!(?phase, listener = index, "listener rejected: {reason}");
                    return Err(RemotingError::Refused(reason));
                }
                (Ok(()), Decision::Ignore) => {
                    debug!(?phase, listener = index, "listener ignoring this attempt");
                    self.listeners[index].status = ListenerStatus::Ignored;
                }
                (Ok(()), Decision::None) => {}
            }
        }
        Ok(())
    }

    /// Deliver a pure notification; decisions have no effect here.
    fn notify(&mut self, phase: LifecyclePhase, channel_name: Option<&str>, include_ignored: bool) {
        for index in 0..self.listeners.len() {
            if !include_ignored && self.listeners[index].status == ListenerStatus::Ignored {
                continue;
            }
            let listener = Arc::clone(&self.listeners[index].listener);
            let mut event = ConnectionEvent {
                listener_index: index,
                phase,
                properties: self.properties.as_ref(),
                channel_name,
                stash: &mut self.stash,
                owner: &mut self.owner,
                builder: &mut self.builder,
                decision: Decision::None,
            };
            match phase {
                LifecyclePhase::AfterChannel => listener.after_channel(&mut event),
                LifecyclePhase::ChannelClosed => listener.channel_closed(&mut event),
                LifecyclePhase::Disconnected => listener.disconnected(&mut event),
                _ => debug!(?phase, "no notification defined for this phase"),
            }
        }
    }
}

impl Drop for ConnectionState {
    /// Backstop for the exactly-once disconnect guarantee: whatever path
    /// abandoned this attempt, listeners still hear about it.
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::StreamChannelBuilder;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Records every callback it receives; scripted to ignore, reject,
    /// or approve at a chosen milestone.
    #[derive(Default)]
    struct ScriptedListener {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        ignore_at: Option<LifecyclePhase>,
        reject_at: Option<LifecyclePhase>,
        approve_at: Option<LifecyclePhase>,
    }

    impl ScriptedListener {
        fn record(&self, milestone: &str) {
            self.log.lock().unwrap().push(format!("{}:{milestone}", self.label));
        }

        fn act(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
            if self.ignore_at == Some(event.phase()) {
                event.ignore();
            }
            if self.reject_at == Some(event.phase()) {
                event.reject("scripted rejection");
            }
            if self.approve_at == Some(event.phase()) {
                event.approve(Arc::new(StreamChannelBuilder::new("test")))?;
            }
            Ok(())
        }
    }

    impl ConnectionStateListener for ScriptedListener {
        fn before_properties(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
            self.record("before_properties");
            self.act(event)
        }

        fn after_properties(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
            self.record("after_properties");
            self.act(event)
        }

        fn before_channel(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
            self.record("before_channel");
            self.act(event)
        }

        fn after_channel(&self, _event: &mut ConnectionEvent<'_>) {
            self.record("after_channel");
        }

        fn channel_closed(&self, _event: &mut ConnectionEvent<'_>) {
            self.record("channel_closed");
        }

        fn disconnected(&self, _event: &mut ConnectionEvent<'_>) {
            self.record("disconnected");
        }
    }

    fn state_with(listeners: Vec<Arc<dyn ConnectionStateListener>>) -> ConnectionState {
        ConnectionState::new(Box::new(Cursor::new(Vec::new())), listeners)
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_listeners_fire_in_registration_order_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners: Vec<Arc<dyn ConnectionStateListener>> = ["l1", "l2", "l3"]
            .into_iter()
            .map(|label| {
                Arc::new(ScriptedListener {
                    label,
                    log: Arc::clone(&log),
                    ..Default::default()
                }) as Arc<dyn ConnectionStateListener>
            })
            .collect();

        let mut state = state_with(listeners);
        state.set_properties(HashMap::new());
        state.fire_after_properties().unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "l1:after_properties",
                "l2:after_properties",
                "l3:after_properties"
            ]
        );
    }

    #[test]
    fn test_rejection_short_circuits_and_everyone_gets_one_disconnect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = Arc::new(ScriptedListener {
            label: "l1",
            log: Arc::clone(&log),
            ..Default::default()
        });
        let l2 = Arc::new(ScriptedListener {
            label: "l2",
            log: Arc::clone(&log),
            reject_at: Some(LifecyclePhase::BeforeProperties),
            ..Default::default()
        });
        let l3 = Arc::new(ScriptedListener {
            label: "l3",
            log: Arc::clone(&log),
            ..Default::default()
        });

        let mut state = state_with(vec![l1, l2, l3]);
        let result = state.fire_before_properties();
        assert!(matches!(result, Err(RemotingError::Refused(_))));
        state.disconnect();
        // Idempotent: a second disconnect delivers nothing new.
        state.disconnect();

        let log = entries(&log);
        // l3 never saw the milestone l2 rejected at.
        assert!(!log.contains(&"l3:before_properties".to_string()));
        // And no later milestone fired for anyone.
        assert!(!log.iter().any(|e| e.ends_with("after_properties")));
        // But every listener got exactly one disconnect notification.
        for label in ["l1", "l2", "l3"] {
            let disconnects = log
                .iter()
                .filter(|e| *e == &format!("{label}:disconnected"))
                .count();
            assert_eq!(disconnects, 1, "listener {label}");
        }
    }

    #[test]
    fn test_ignoring_listener_skips_milestones_but_gets_disconnect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let quitter = Arc::new(ScriptedListener {
            label: "quitter",
            log: Arc::clone(&log),
            ignore_at: Some(LifecyclePhase::BeforeProperties),
            ..Default::default()
        });
        let stayer = Arc::new(ScriptedListener {
            label: "stayer",
            log: Arc::clone(&log),
            ..Default::default()
        });

        let mut state = state_with(vec![quitter, stayer]);
        state.fire_before_properties().unwrap();
        state.set_properties(HashMap::new());
        state.fire_after_properties().unwrap();
        state.disconnect();

        let log = entries(&log);
        assert!(!log.contains(&"quitter:after_properties".to_string()));
        assert!(log.contains(&"stayer:after_properties".to_string()));
        assert!(log.contains(&"quitter:disconnected".to_string()));
    }

    #[test]
    fn test_second_approval_fails_loudly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(ScriptedListener {
            label: "first",
            log: Arc::clone(&log),
            approve_at: Some(LifecyclePhase::AfterProperties),
            ..Default::default()
        });
        let second = Arc::new(ScriptedListener {
            label: "second",
            log: Arc::clone(&log),
            approve_at: Some(LifecyclePhase::AfterProperties),
            ..Default::default()
        });

        let mut state = state_with(vec![first, second]);
        state.set_properties(HashMap::new());
        let result = state.fire_after_properties();
        assert!(matches!(result, Err(RemotingError::Protocol(_))));
    }

    #[test]
    fn test_stash_gives_cross_callback_continuity_per_listener() {
        struct Counting;

        impl ConnectionStateListener for Counting {
            fn before_properties(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
                event.stash(1u32);
                Ok(())
            }

            fn after_properties(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
                let seen = event.stashed::<u32>().copied().unwrap_or(0);
                assert_eq!(seen, 1);
                event.stash(seen + 1);
                Ok(())
            }

            fn before_channel(&self, event: &mut ConnectionEvent<'_>) -> Result<()> {
                assert_eq!(event.stashed::<u32>().copied(), Some(2));
                Ok(())
            }

            fn after_channel(&self, _event: &mut ConnectionEvent<'_>) {}
        }

        let mut state = state_with(vec![Arc::new(Counting), Arc::new(Counting)]);
        state.fire_before_properties().unwrap();
        state.set_properties(HashMap::new());
        state.fire_after_properties().unwrap();
        state.fire_before_channel().unwrap();
    }

    #[test]
    fn test_drop_backstop_delivers_disconnect() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let listener = Arc::new(ScriptedListener {
                label: "l",
                log: Arc::clone(&log),
                ..Default::default()
            });
            let _state = state_with(vec![listener]);
            // Abandoned without an explicit disconnect.
        }
        assert_eq!(entries(&log), vec!["l:disconnected"]);
    }
}
