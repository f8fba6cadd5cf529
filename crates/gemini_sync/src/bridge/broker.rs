//! # Topic Broker
//!
//! In-process publish/subscribe fan-out, standing in for the external
//! broker the bridge normally talks to. Transport security and broker
//! clustering are outside this crate; what the pipeline needs is topic
//! routing with per-subscriber FIFO, and that is all this does.
//!
//! Subscribers register a topic prefix and get a bounded channel; a
//! publication to `prefix/car_id` reaches every subscriber whose prefix
//! covers it. Disconnected subscribers are pruned on the next publish.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-subscriber queue depth.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// One delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    /// Full topic the message was published to.
    pub topic: String,
    /// Raw payload bytes, verbatim from the publisher.
    pub payload: Vec<u8>,
}

/// One registered subscription.
struct Subscription {
    prefix: String,
    queue: Sender<Publication>,
}

/// Topic-prefix publish/subscribe hub.
///
/// Cheaply cloneable; all clones share one subscriber table.
#[derive(Clone)]
pub struct Broker {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl Broker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self { subscriptions: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Subscribes to every topic under a prefix.
    ///
    /// Dropping the receiver unsubscribes; the table entry is pruned on a
    /// later publish.
    pub fn subscribe(&self, prefix: &str) -> Receiver<Publication> {
        let (queue, rx) = bounded(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscriptions
            .lock()
            .push(Subscription { prefix: prefix.to_string(), queue });
        tracing::info!(prefix, "subscriber registered");
        rx
    }

    /// Publishes a payload to a topic.
    ///
    /// Returns how many subscribers received it. A subscriber with a full
    /// queue loses the message (logged); a disconnected subscriber is
    /// removed.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> usize {
        let mut delivered = 0;
        let mut table = self.subscriptions.lock();
        table.retain(|sub| {
            if !topic_matches(&sub.prefix, topic) {
                return true;
            }
            let message = Publication { topic: topic.to_string(), payload: payload.to_vec() };
            match sub.queue.try_send(message) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(topic, prefix = %sub.prefix, "subscriber queue full, message lost");
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::info!(prefix = %sub.prefix, "subscriber gone, pruned");
                    false
                }
            }
        });
        delivered
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix coverage: exact topic or any topic one or more segments below.
fn topic_matches(prefix: &str, topic: &str) -> bool {
    topic == prefix
        || (topic.len() > prefix.len()
            && topic.starts_with(prefix)
            && topic.as_bytes()[prefix.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_routing() {
        let broker = Broker::new();
        let rx = broker.subscribe("fleet/vehicles");

        assert_eq!(broker.publish("fleet/vehicles/7", b"a"), 1);
        assert_eq!(broker.publish("fleet/walkers/7", b"b"), 0);
        assert_eq!(broker.publish("fleet/vehicles", b"c"), 1);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.topic, "fleet/vehicles/7");
        assert_eq!(first.payload, b"a");
        assert_eq!(rx.try_recv().unwrap().payload, b"c");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        let broker = Broker::new();
        let _rx = broker.subscribe("fleet/veh");

        // "fleet/vehicles/7" shares the byte prefix but not the segment.
        assert_eq!(broker.publish("fleet/vehicles/7", b"x"), 0);
        assert_eq!(broker.publish("fleet/veh/7", b"y"), 1);
    }

    #[test]
    fn test_per_subscriber_fifo() {
        let broker = Broker::new();
        let rx = broker.subscribe("t");
        for i in 0..10u8 {
            broker.publish("t/1", &[i]);
        }
        for i in 0..10u8 {
            assert_eq!(rx.try_recv().unwrap().payload, vec![i]);
        }
    }

    #[test]
    fn test_disconnected_subscriber_pruned() {
        let broker = Broker::new();
        let rx = broker.subscribe("t");
        assert_eq!(broker.subscriber_count(), 1);

        drop(rx);
        broker.publish("t/1", b"x");
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn test_fan_out_to_multiple_subscribers() {
        let broker = Broker::new();
        let a = broker.subscribe("t");
        let b = broker.subscribe("t/1");

        assert_eq!(broker.publish("t/1", b"x"), 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }
}
