use super::Shared;
use crate::event::AcousticEvent;
use crate::transport::Inbound;
use std::sync::Arc;

/// Forwards transport deliveries to local subscribers in arrival order.
/// Payloads that fail to decode are dropped.
pub(super) async fn pump(inbound: Inbound, shared: Arc<Shared>) {
    while let Ok(bytes) = inbound.recv().await {
        match AcousticEvent::decode(&bytes) {
            Ok(event) => shared.deliver(event),
            Err(e) => log::warn!("Dropping malformed ping ({} bytes): {}", bytes.len(), e),
        }
    }
    log::debug!("Transport subscription ended");
}
