//! Resolver fed asynchronously by an external control plane.

use std::sync::{Condvar, Mutex};

use tracing::debug;

use crate::error::{RemotingError, Result};

use super::{Endpoint, EndpointResolver};

/// Resolver whose endpoint arrives later, from outside.
///
/// Some deployments learn their controller address from an external
/// control plane rather than static configuration. The connection task
/// parks in [`wait_for_ready`](EndpointResolver::wait_for_ready) until
/// the control-plane integration calls [`supply`](Self::supply).
#[derive(Default)]
pub struct SuppliedResolver {
    slot: Mutex<Option<Endpoint>>,
    ready: Condvar,
}

impl SuppliedResolver {
    /// Create an empty resolver; nothing resolves until supplied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide the endpoint, waking every parked connection task.
    pub fn supply(&self, endpoint: Endpoint) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        debug!(address = endpoint.address(), "endpoint supplied");
        *slot = Some(endpoint);
        self.ready.notify_all();
    }
}

impl EndpointResolver for SuppliedResolver {
    fn resolve(&self) -> Result<Endpoint> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone().ok_or_else(|| {
            RemotingError::Config("no endpoint has been supplied yet".to_string())
        })
    }

    fn wait_for_ready(&self) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        while slot.is_none() {
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_resolve_before_supply_is_config_error() {
        let resolver = SuppliedResolver::new();
        assert!(matches!(
            resolver.resolve(),
            Err(RemotingError::Config(_))
        ));
    }

    #[test]
    fn test_wait_unblocks_when_supplied() {
        let resolver = Arc::new(SuppliedResolver::new());

        let supplier = Arc::clone(&resolver);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            supplier.supply(Endpoint::new("controller.internal", 41000));
        });

        resolver.wait_for_ready().unwrap();
        let endpoint = resolver.resolve().unwrap();
        assert_eq!(endpoint.address(), "controller.internal:41000");

        handle.join().unwrap();
    }
}
