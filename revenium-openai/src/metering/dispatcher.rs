//! Fire-and-forget dispatch of metering events.

use std::sync::Arc;

use super::delivery::MeteringClient;
use super::payload::MeteringEvent;
use super::tracker::DeliveryTracker;

/// Hands events to detached delivery tasks.
///
/// Delivery failures are logged here and never reach the caller of the
/// chat completion.
#[derive(Debug, Clone)]
pub struct MeteringDispatcher {
    client: Arc<MeteringClient>,
    tracker: DeliveryTracker,
}

impl MeteringDispatcher {
    /// Create a dispatcher delivering through `client`.
    #[must_use]
    pub fn new(client: MeteringClient) -> Self {
        Self {
            client: Arc::new(client),
            tracker: DeliveryTracker::new(),
        }
    }

    /// Deliver `event` in the background.
    ///
    /// Returns `false` if no runtime was available to run the delivery.
    pub fn dispatch(&self, event: MeteringEvent) -> bool {
        let client = Arc::clone(&self.client);
        self.tracker.spawn(async move {
            match client.deliver(&event).await {
                Ok(()) => tracing::debug!(
                    model = %event.model,
                    stop_reason = %event.stop_reason,
                    "Metering event delivered"
                ),
                Err(e) => tracing::error!(
                    model = %event.model,
                    transaction_id = %event.transaction_id,
                    error = %e,
                    "Failed to send metering data"
                ),
            }
        })
    }

    /// Deliveries still in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }

    /// Wait for in-flight deliveries.
    pub async fn flush(&self) {
        self.tracker.flush().await;
    }

    /// Drain in-flight deliveries at shutdown.
    pub async fn close(&self) {
        self.tracker.close().await;
    }
}
