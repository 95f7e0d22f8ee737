//! Notification delivery.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::{ClientId, Event, Notification};

/// Delivers events to a client.
///
/// Delivery failure never raises. It returns `false` and the target is
/// treated as gone.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, target: &ClientId, event: Event) -> bool;
}

/// In-process fan-out to registered clients.
///
/// Each client owns the receiving half of an unbounded channel; a closed
/// receiver unregisters the client on the next send.
#[derive(Default)]
pub struct NotificationHub {
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<Notification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return its notification receiver.
    ///
    /// Registering an existing id replaces the previous receiver.
    pub fn register(&self, client: impl Into<ClientId>) -> mpsc::UnboundedReceiver<Notification> {
        let client = client.into();
        let (tx, rx) = mpsc::unbounded_channel();
        info!(client = %client, "Client registered");
        self.clients.lock().insert(client, tx);
        rx
    }

    /// Remove a client. Returns whether it was registered.
    pub fn unregister(&self, client: &str) -> bool {
        let removed = self.clients.lock().remove(client).is_some();
        if removed {
            info!(client = %client, "Client unregistered");
        }
        removed
    }

    /// Remove a client only if it is still registered with `sender`.
    ///
    /// A client that re-registered after `sender` was taken keeps its new
    /// receiver.
    fn remove_stale(&self, client: &str, sender: &mpsc::UnboundedSender<Notification>) -> bool {
        let mut clients = self.clients.lock();
        if !clients.get(client).is_some_and(|tx| tx.same_channel(sender)) {
            return false;
        }
        clients.remove(client);
        info!(client = %client, "Client unregistered");
        true
    }

    pub fn is_registered(&self, client: &str) -> bool {
        self.clients.lock().contains_key(client)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    async fn send(&self, target: &ClientId, event: Event) -> bool {
        let sender = self.clients.lock().get(target).cloned();
        let Some(sender) = sender else {
            warn!(client = %target, kind = event.kind(), "Client not found for notification");
            return false;
        };

        match sender.send(Notification::new(event)) {
            Ok(()) => true,
            Err(e) => {
                warn!(client = %target, kind = e.0.event.kind(), "Notification dropped, client gone");
                self.remove_stale(target, &sender);
                false
            }
        }
    }
}

/// Notifier that only writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, target: &ClientId, event: Event) -> bool {
        match &event {
            Event::ConsoleLog(log) => {
                debug!(client = %target, environment_id = %log.environment_id, "{}", log.message)
            }
            Event::Error(report) => {
                warn!(client = %target, origin = %report.origin, "{}", report.message)
            }
            other => info!(client = %target, kind = other.kind(), "{:?}", other),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EnvironmentUpdate;

    fn update(status: &str) -> Event {
        Event::EnvironmentUpdate(EnvironmentUpdate::new("env-1", status))
    }

    #[tokio::test]
    async fn test_send_to_registered_client() {
        let hub = NotificationHub::new();
        let mut rx = hub.register("client-a");

        assert!(hub.send(&"client-a".to_string(), update("created")).await);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, update("created"));
    }

    #[tokio::test]
    async fn test_send_to_unknown_client() {
        let hub = NotificationHub::new();
        assert!(!hub.send(&"nobody".to_string(), update("created")).await);
    }

    #[tokio::test]
    async fn test_closed_receiver_unregisters() {
        let hub = NotificationHub::new();
        let rx = hub.register("client-a");
        drop(rx);

        assert!(!hub.send(&"client-a".to_string(), update("running")).await);
        assert!(!hub.is_registered("client-a"));
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_keeps_newer_registration() {
        let hub = NotificationHub::new();
        let stale_rx = hub.register("client-a");
        let stale_tx = hub.clients.lock().get("client-a").cloned().unwrap();

        drop(stale_rx);
        let mut rx = hub.register("client-a");

        // A sender taken before the re-registration fails and cleans up.
        assert!(stale_tx.send(Notification::new(update("running"))).is_err());
        assert!(!hub.remove_stale("client-a", &stale_tx));
        assert!(hub.is_registered("client-a"));

        assert!(hub.send(&"client-a".to_string(), update("running")).await);
        assert_eq!(rx.recv().await.unwrap().event, update("running"));
    }

    #[tokio::test]
    async fn test_log_notifier_always_delivers() {
        let notifier = LogNotifier;
        assert!(notifier.send(&"any".to_string(), Event::error("env-1", "boom")).await);
    }
}
