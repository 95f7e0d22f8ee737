//! Integration tests for notification delivery.

use std::sync::Arc;

use forge_notify::{Event, GenerationUpdate, NotificationHub, Notifier};

/// Events reach only their target client, in send order.
#[tokio::test]
async fn test_targeted_delivery_order() {
    let hub = NotificationHub::new();
    let mut a = hub.register("client-a");
    let mut b = hub.register("client-b");
    let target = "client-a".to_string();

    for phase in ["architecture", "frontend", "backend"] {
        let event = Event::GenerationUpdate(GenerationUpdate::phase("s-1", phase, "completed"));
        assert!(hub.send(&target, event).await);
    }

    let mut phases = Vec::new();
    while let Ok(notification) = a.try_recv() {
        if let Event::GenerationUpdate(update) = notification.event {
            phases.push(update.phase.unwrap_or_default());
        }
    }
    assert_eq!(phases, vec!["architecture", "frontend", "backend"]);
    assert!(b.try_recv().is_err());
}

/// Concurrent senders share one hub without losing events.
#[tokio::test]
async fn test_concurrent_senders() {
    let hub = Arc::new(NotificationHub::new());
    let mut rx = hub.register("client-a");

    let mut handles = Vec::new();
    for i in 0..8 {
        let hub = hub.clone();
        handles.push(tokio::spawn(async move {
            hub.send(&"client-a".to_string(), Event::console("env-1", "stdout", format!("line {}", i)))
                .await
        }));
    }
    for handle in handles {
        assert!(tokio_test::assert_ok!(handle.await));
    }

    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    assert_eq!(count, 8);
}

/// Re-registering replaces the previous receiver.
#[tokio::test]
async fn test_reregister_replaces_receiver() {
    let hub = NotificationHub::new();
    let old = hub.register("client-a");
    let mut new = hub.register("client-a");
    drop(old);

    assert!(hub.send(&"client-a".to_string(), Event::error("s-1", "boom")).await);
    let received = new.recv().await.unwrap();
    assert_eq!(received.event.kind(), "error");
    assert!(hub.is_registered("client-a"));
}
