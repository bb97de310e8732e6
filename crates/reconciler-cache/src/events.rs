//! Change-event bus: propagates track mutations to subscribed cache
//! services without those services holding a back-reference to the
//! orchestrator.
//!
//! Grounded on `examples/original_source/src/services/cache/cache_orchestrator.py`'s
//! event dispatch: bounded background tasks, with overflow events dropped
//! and logged rather than queued unboundedly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    TrackRemoved { track_id: String },
    TrackModified { track_id: String },
    AlbumInvalidated { artist: String, album: String },
}

/// A subscriber to change events. Implementors must not hold a reference
/// back to the orchestrator — communication is one-directional, via these
/// emitted events.
#[async_trait]
pub trait ChangeSubscriber: Send + Sync {
    async fn on_event(&self, event: ChangeEvent);
}

/// Dispatches events to subscribers as bounded background tasks. Once
/// `max_background_tasks` are in flight, further publishes for that moment
/// are dropped with a debug log rather than queued — the next full scan
/// rebuilds the relevant state, so drops are recoverable.
pub struct ChangeEventBus {
    subscribers: Vec<Arc<dyn ChangeSubscriber>>,
    max_background_tasks: usize,
    inflight: Arc<AtomicUsize>,
}

impl ChangeEventBus {
    pub fn new(max_background_tasks: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            max_background_tasks,
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn ChangeSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Dispatches `event` to every subscriber. Each dispatch is an awaited
    /// background task; when `max_background_tasks` are already in flight,
    /// the event is dropped for that subscriber.
    pub async fn publish(&self, event: ChangeEvent) {
        let mut handles = Vec::with_capacity(self.subscribers.len());

        for subscriber in &self.subscribers {
            let current = self.inflight.fetch_add(1, Ordering::SeqCst);
            if current >= self.max_background_tasks {
                self.inflight.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!(?event, "change event dropped: background task limit reached");
                continue;
            }

            let subscriber = subscriber.clone();
            let event = event.clone();
            let inflight = self.inflight.clone();
            handles.push(tokio::spawn(async move {
                subscriber.on_event(event).await;
                inflight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingSubscriber {
        count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ChangeSubscriber for CountingSubscriber {
        async fn on_event(&self, _event: ChangeEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let mut bus = ChangeEventBus::new(100);
        let count = Arc::new(AtomicU32::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));

        bus.publish(ChangeEvent::TrackModified { track_id: "t1".into() }).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publish_drops_when_over_capacity() {
        let mut bus = ChangeEventBus::new(0);
        let count = Arc::new(AtomicU32::new(0));
        bus.subscribe(Arc::new(CountingSubscriber { count: count.clone() }));

        bus.publish(ChangeEvent::TrackRemoved { track_id: "t1".into() }).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
