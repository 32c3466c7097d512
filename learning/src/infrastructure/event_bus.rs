// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Learning Events
//
// In-memory broadcast of coordinator events for observers. Publishing never
// blocks and succeeds with zero subscribers; slow receivers lose the oldest
// events once the channel capacity is exceeded.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::LearningEvent;

#[derive(Clone)]
pub struct LearningEventBus {
    sender: Arc<broadcast::Sender<LearningEvent>>,
}

impl LearningEventBus {
    /// Capacity is how many events are buffered per receiver before lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: LearningEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "Published learning event"),
            Err(_) => debug!(event_type, "No subscribers listening to learning event"),
        }
    }

    pub fn subscribe(&self) -> LearningEventReceiver {
        LearningEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct LearningEventReceiver {
    receiver: broadcast::Receiver<LearningEvent>,
}

impl LearningEventReceiver {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Result<LearningEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Learning event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<LearningEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Learning event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus closed")]
    Closed,
    #[error("Receiver lagged by {0} events")]
    Lagged(u64),
    #[error("No events available")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tracked(id: &str) -> LearningEvent {
        LearningEvent::PatternTracked {
            pattern_id: id.to_string(),
            task_type: "code_analysis".to_string(),
            pattern_used: "sequential".to_string(),
            usage_count: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = LearningEventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(tracked("p1"));

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.unwrap() {
                LearningEvent::PatternTracked { pattern_id, .. } => assert_eq!(pattern_id, "p1"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = LearningEventBus::new(4);
        bus.publish(tracked("p1"));

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv().unwrap_err(), EventBusError::Empty);
    }

    #[test]
    fn test_lagging_receiver_reports_lag() {
        let bus = LearningEventBus::new(2);
        let mut receiver = bus.subscribe();
        for i in 0..5 {
            bus.publish(tracked(&format!("p{i}")));
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(_))));
    }
}
