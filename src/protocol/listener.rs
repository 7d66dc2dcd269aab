//! Connection lifecycle listener capability.

use crate::error::Result;
use crate::protocol::state::ConnectionEvent;

/// Observer of one connection attempt's lifecycle milestones.
///
/// Listeners are registered in order on a
/// [`ConnectionState`](crate::protocol::ConnectionState) and invoked in
/// that order, synchronously, never concurrently with each other. At
/// the veto-able milestones (`before_properties`, `after_properties`,
/// `before_channel`) a listener may, via the event:
///
/// - do nothing — dispatch continues with the next listener;
/// - [`ignore`](ConnectionEvent::ignore) — this listener hears nothing
///   further for this attempt, except the terminal
///   [`disconnected`](Self::disconnected) notification;
/// - [`reject`](ConnectionEvent::reject) — the whole attempt aborts
///   immediately; listeners later in the order never see this
///   milestone and no channel is built;
/// - [`approve`](ConnectionEvent::approve) — claims exclusive ownership
///   of channel construction. A second approval, by any listener, is an
///   error that aborts the attempt: two owners would leave channel
///   decoration undefined.
///
/// `after_channel`, `channel_closed` and `disconnected` are pure
/// notifications with no veto power. Exactly one `disconnected` call is
/// delivered to every registered listener — ignoring and never-invoked
/// ones included — no matter where the attempt ended.
///
/// The two milestones every listener must handle are `after_properties`
/// (credential validation and approval happen here) and
/// `after_channel`; the rest default to no-ops.
pub trait ConnectionStateListener: Send + Sync {
    /// The exchange is about to start; no headers have been read yet.
    fn before_properties(&self, _event: &mut ConnectionEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// The peer's decoded header map is available on the event.
    fn after_properties(&self, event: &mut ConnectionEvent<'_>) -> Result<()>;

    /// The attempt was approved and the channel is about to be built.
    fn before_channel(&self, _event: &mut ConnectionEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// The application channel is up; available via
    /// [`ConnectionEvent::channel_name`].
    fn after_channel(&self, event: &mut ConnectionEvent<'_>);

    /// The channel has closed (normally or otherwise).
    fn channel_closed(&self, _event: &mut ConnectionEvent<'_>) {}

    /// Terminal notification; fired exactly once per attempt.
    ///
    /// By the time this returns, the per-listener stash is released and
    /// the underlying stream is dropped.
    fn disconnected(&self, _event: &mut ConnectionEvent<'_>) {}
}
