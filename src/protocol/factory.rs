//! Assembly of the ordered, capability-filtered handler list.

use std::sync::Arc;

use tracing::debug;

use crate::crypto::SecretLookup;
use crate::protocol::handler::ProtocolHandler;
use crate::runtime::{IoHub, TransportSecurity};

/// Builds the protocol handler list for this process's capabilities.
///
/// Strongest-first ordering: negotiation tries the most secure protocol
/// and falls back down the list. The transport-secured handler needs
/// both an I/O multiplexing facility and a transport security context;
/// lacking either, the list starts at the encrypted handler.
pub struct ProtocolHandlerFactory;

impl ProtocolHandlerFactory {
    /// Assemble the ordered handler list.
    pub fn handlers(
        secrets: Arc<dyn SecretLookup>,
        hub: Option<Arc<dyn IoHub>>,
        security: Option<Arc<dyn TransportSecurity>>,
    ) -> Vec<ProtocolHandler> {
        let mut handlers = Vec::with_capacity(4);

        match (hub, security) {
            (Some(hub), Some(security)) => {
                debug!(hub = hub.name(), "transport-secured protocol enabled");
                handlers.push(ProtocolHandler::v4(security, Arc::clone(&secrets)));
            }
            _ => {
                debug!("transport-secured protocol unavailable; starting at encrypted");
            }
        }

        handlers.push(ProtocolHandler::v3(secrets));
        handlers.push(ProtocolHandler::v2());
        handlers.push(ProtocolHandler::v1());
        handlers
    }

    /// Find the handler an acceptor should dispatch a greeting to.
    pub fn find<'a>(
        handlers: &'a [ProtocolHandler],
        protocol_name: &str,
    ) -> Option<&'a ProtocolHandler> {
        handlers.iter().find(|h| h.name() == protocol_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DuplexStream;
    use crate::crypto::StaticSecretMap;
    use std::io;

    struct FakeHub;

    impl IoHub for FakeHub {}

    struct FakeSecurity;

    impl TransportSecurity for FakeSecurity {
        fn secure_initiator(
            &self,
            stream: Box<dyn DuplexStream>,
        ) -> io::Result<Box<dyn DuplexStream>> {
            Ok(stream)
        }

        fn secure_acceptor(
            &self,
            stream: Box<dyn DuplexStream>,
        ) -> io::Result<Box<dyn DuplexStream>> {
            Ok(stream)
        }
    }

    fn secrets() -> Arc<dyn SecretLookup> {
        Arc::new(StaticSecretMap::new())
    }

    #[test]
    fn test_full_capabilities_yield_strongest_first_order() {
        let handlers = ProtocolHandlerFactory::handlers(
            secrets(),
            Some(Arc::new(FakeHub)),
            Some(Arc::new(FakeSecurity)),
        );
        let names: Vec<_> = handlers.iter().map(ProtocolHandler::name).collect();
        assert_eq!(
            names,
            vec![
                "JNLP4-connect",
                "JNLP3-connect",
                "JNLP2-connect",
                "JNLP-connect"
            ]
        );
    }

    #[test]
    fn test_v4_needs_both_hub_and_security() {
        let without_hub =
            ProtocolHandlerFactory::handlers(secrets(), None, Some(Arc::new(FakeSecurity)));
        assert_eq!(without_hub[0].name(), "JNLP3-connect");

        let without_security =
            ProtocolHandlerFactory::handlers(secrets(), Some(Arc::new(FakeHub)), None);
        assert_eq!(without_security[0].name(), "JNLP3-connect");
        assert_eq!(without_security.len(), 3);
    }

    #[test]
    fn test_find_dispatches_by_greeting_name() {
        let handlers = ProtocolHandlerFactory::handlers(secrets(), None, None);
        assert!(ProtocolHandlerFactory::find(&handlers, "JNLP2-connect").is_some());
        assert!(ProtocolHandlerFactory::find(&handlers, "JNLP4-connect").is_none());
        assert!(ProtocolHandlerFactory::find(&handlers, "HTTP/1.1").is_none());
    }
}
