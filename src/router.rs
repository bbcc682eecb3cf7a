//! Inbound event fan-out.
//!
//! The router turns raw frames from the push connection into [`ServerEvent`]s
//! and fans them out on a tokio broadcast channel. Delivery order matches
//! arrival order on the connection; no reordering or batching. The router
//! holds no domain state — reconcilers subscribe and are the only writers of
//! the collections they own.

use tokio::sync::broadcast;

use crate::protocol::{decode_event, Frame, ServerEvent};

/// Decodes inbound frames and broadcasts typed events to subscribers.
pub struct EventRouter {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventRouter {
    /// `capacity` is the per-subscriber buffer before a lagging subscriber
    /// starts missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a subscriber. Each receiver sees every event from the point
    /// of subscription, in arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Publish an already-typed event (connection state changes come in
    /// through here).
    pub fn publish(&self, event: ServerEvent) {
        // No subscribers is fine; the event is simply unobserved.
        let _ = self.tx.send(event);
    }

    /// Decode and fan out one raw text frame. Malformed frames and payloads
    /// are logged and dropped, never fatal.
    pub fn route_text(&self, text: &str) {
        match Frame::decode(text) {
            Ok(frame) => {
                if let Some(event) = decode_event(&frame) {
                    self.publish(event);
                }
            }
            Err(err) => {
                log::warn!("dropping unparseable frame: {err}");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(256)
    }
}
