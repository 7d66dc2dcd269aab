//! Engine-side collaborator capabilities.
//!
//! The handshake runs inside an engine this crate does not own. These
//! traits are the narrow waist between the two: the engine supplies an
//! executor for connection tasks, an operator notification sink, and —
//! for the transport-secured protocol — an I/O hub and a transport
//! security context. All of them are shared across concurrent attempts
//! and must tolerate `&self` access from many threads.

use std::io;

use crate::channel::DuplexStream;

/// Submits connection-handling tasks.
///
/// One connection attempt is one task; handshake I/O blocks inside it.
/// Pooling policy belongs to the engine, not to this crate.
pub trait TaskExecutor: Send + Sync {
    /// Submit a task for execution.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Executor spawning one thread per submitted task.
#[derive(Debug, Default)]
pub struct ThreadExecutor;

impl TaskExecutor for ThreadExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        std::thread::spawn(task);
    }
}

/// Status sink for operator-facing connection events.
pub trait EventNotifier: Send + Sync {
    /// Report a status line to operators.
    fn status(&self, message: &str);
}

/// Notifier forwarding status lines to the tracing pipeline.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl EventNotifier for LogNotifier {
    fn status(&self, message: &str) {
        tracing::info!(target: "remoting::status", "{message}");
    }
}

/// I/O multiplexing facility required by the transport-secured protocol.
///
/// Opaque to the handshake itself; its presence (together with a
/// [`TransportSecurity`] context) is what lets the factory offer the v4
/// handler at all.
pub trait IoHub: Send + Sync {
    /// Facility name, for diagnostics.
    fn name(&self) -> &str {
        "io-hub"
    }
}

/// Upgrades a plaintext stream to its transport-secured form.
///
/// TLS setup itself is out of scope here; the engine wires in whatever
/// security context it maintains and the v4 handler only sequences the
/// negotiate-then-upgrade exchange around it.
pub trait TransportSecurity: Send + Sync {
    /// Secure the stream from the connecting side.
    fn secure_initiator(&self, stream: Box<dyn DuplexStream>) -> io::Result<Box<dyn DuplexStream>>;

    /// Secure the stream from the accepting side.
    fn secure_acceptor(&self, stream: Box<dyn DuplexStream>) -> io::Result<Box<dyn DuplexStream>>;
}
