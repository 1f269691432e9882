//! Central event distribution system.
//!
//! Unlike a broadcast channel, every subscriber owns its own bounded inbox
//! (capacity 256). A slow subscriber never holds back a fast one: when a
//! subscriber's inbox is full, the oldest pending event *for that
//! subscriber only* is dropped and replaced with a single `overflow`
//! marker, delivered once before the surviving events.
//!
//! # Usage
//!
//! ```ignore
//! let (bus, sender) = create_shared_event_bus();
//! let mut rx = bus.subscribe();
//! sender.emit(GatewayEvent::Heartbeat);
//! let event = rx.recv().await;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::event::ServerEventKind;
use crate::domain::GatewayEvent;

const INBOX_CAPACITY: usize = 256;

struct Subscriber {
    id: Uuid,
    inbox: Mutex<VecDeque<GatewayEvent>>,
    overflowed: AtomicBool,
    notify: Notify,
}

impl Subscriber {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inbox: Mutex::new(VecDeque::with_capacity(INBOX_CAPACITY)),
            overflowed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn push(&self, event: GatewayEvent) {
        let mut inbox = self.inbox.lock();
        if inbox.len() >= INBOX_CAPACITY {
            inbox.pop_front();
            self.overflowed.store(true, Ordering::Relaxed);
        }
        inbox.push_back(event);
        drop(inbox);
        self.notify.notify_one();
    }
}

/// The shared subscriber registry. Cloning an [`EventSender`] is cheap.
pub struct EventBus {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

pub type SharedEventBus = Arc<EventBus>;

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    fn emit(&self, event: GatewayEvent) {
        let subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            debug!(kind = event.kind(), "event emitted with no subscribers");
            return;
        }
        for subscriber in subscribers.iter() {
            subscriber.push(event.clone());
        }
    }

    fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Spawns the 15 s heartbeat that keeps idle SSE clients warm.
    pub fn spawn_heartbeat(sender: EventSender) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
            loop {
                interval.tick().await;
                sender.emit(GatewayEvent::Heartbeat);
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheaply-cloneable handle used to publish events onto a bus.
#[derive(Clone)]
pub struct EventSender {
    bus: Arc<EventBus>,
}

impl EventSender {
    pub fn emit(&self, event: GatewayEvent) {
        self.bus.emit(event);
    }

    /// Convenience for the common `server_event` shape.
    pub fn emit_server_event(
        &self,
        server_name: Option<String>,
        event_kind: ServerEventKind,
        message: impl Into<String>,
    ) {
        self.emit(GatewayEvent::ServerEvent { server_name, event_kind, message: message.into() });
    }

    /// Subscribe to the bus. The returned receiver unregisters its inbox
    /// from the bus when dropped.
    pub fn subscribe(&self) -> EventReceiver {
        let subscriber = Arc::new(Subscriber::new());
        self.bus.subscribers.lock().push(subscriber.clone());
        EventReceiver { subscriber, bus: self.bus.clone() }
    }
}

/// One subscriber's view of the bus. Dropping it unregisters the inbox.
pub struct EventReceiver {
    subscriber: Arc<Subscriber>,
    bus: Arc<EventBus>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> GatewayEvent {
        loop {
            if self.subscriber.overflowed.swap(false, Ordering::Relaxed) {
                warn!("subscriber inbox overflowed, emitting overflow marker");
                return GatewayEvent::ServerEvent {
                    server_name: None,
                    event_kind: ServerEventKind::Overflow,
                    message: "event bus overflow: oldest events for this subscriber were dropped"
                        .to_string(),
                };
            }
            if let Some(event) = self.subscriber.inbox.lock().pop_front() {
                return event;
            }
            self.subscriber.notify.notified().await;
        }
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscriber.id);
    }
}

/// Creates a bus and returns a sender whose `subscribe()` receivers
/// unregister themselves from the bus on drop.
pub fn create_shared_event_bus() -> (SharedEventBus, EventSender) {
    let bus = Arc::new(EventBus::new());
    let sender = EventSender { bus: bus.clone() };
    (bus, sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_emit_and_recv() {
        let (_bus, sender) = create_shared_event_bus();
        let mut rx = sender.subscribe();
        sender.emit(GatewayEvent::Heartbeat);
        let event = rx.recv().await;
        assert_eq!(event.kind(), "heartbeat");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event() {
        let (_bus, sender) = create_shared_event_bus();
        let mut a = sender.subscribe();
        let mut b = sender.subscribe();
        sender.emit(GatewayEvent::Heartbeat);
        assert_eq!(a.recv().await.kind(), "heartbeat");
        assert_eq!(b.recv().await.kind(), "heartbeat");
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let (_bus, sender) = create_shared_event_bus();
        sender.emit(GatewayEvent::Heartbeat);
    }

    #[tokio::test]
    async fn overflowing_subscriber_gets_one_marker_then_survivors() {
        let (_bus, sender) = create_shared_event_bus();
        let mut rx = sender.subscribe();
        for i in 0..(INBOX_CAPACITY + 50) {
            sender.emit(GatewayEvent::ToolExecution {
                server_name: "alpha".into(),
                original: format!("tool-{i}"),
                success: true,
                duration_ms: 1,
                error: None,
            });
        }
        let first = rx.recv().await;
        assert_eq!(first.kind(), "server_event");
        let mut remaining = 0;
        while let Ok(ev) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv())
            .await
        {
            assert_eq!(ev.kind(), "tool_execution");
            remaining += 1;
        }
        assert_eq!(remaining, INBOX_CAPACITY);
    }

    #[tokio::test]
    async fn unaffected_subscriber_receives_everything() {
        let (_bus, sender) = create_shared_event_bus();
        let mut overflowing = sender.subscribe();
        let mut healthy = sender.subscribe();
        for i in 0..1000 {
            sender.emit(GatewayEvent::ToolExecution {
                server_name: "alpha".into(),
                original: format!("tool-{i}"),
                success: true,
                duration_ms: 1,
                error: None,
            });
        }
        // Drain the healthy subscriber promptly; it never overflows because
        // nothing throttles it in this test.
        let mut count = 0;
        while let Ok(ev) =
            tokio::time::timeout(std::time::Duration::from_millis(50), healthy.recv()).await
        {
            assert_eq!(ev.kind(), "tool_execution");
            count += 1;
        }
        assert_eq!(count, 1000);

        // The overflowing subscriber never read, so it sees the marker.
        assert_eq!(overflowing.recv().await.kind(), "server_event");
    }
}
