//! Integration tests for the environment manager.
//!
//! All tests run against the mock runtime; no Docker daemon is needed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forge_notify::{Event, Notification, NotificationHub, Notifier};
use forge_runtime::{ExecOutput, MockRuntime};
use forge_sandbox::{
    CreateRequest, EnvironmentManager, EnvironmentStatus, SandboxConfig, SandboxError,
};
use tokio::sync::mpsc::UnboundedReceiver;

const APP: &str = "export default function App() { return <h1>Todo</h1> }";
const CLIENT: &str = "client-1";

struct Harness {
    runtime: MockRuntime,
    hub: Arc<NotificationHub>,
    manager: Arc<EnvironmentManager>,
}

fn harness_with(runtime: MockRuntime, config: SandboxConfig) -> Harness {
    let hub = Arc::new(NotificationHub::new());
    let notifier: Arc<dyn Notifier> = hub.clone();
    let manager = EnvironmentManager::new(Arc::new(runtime.clone()), notifier, config);
    Harness {
        runtime,
        hub,
        manager,
    }
}

fn harness() -> Harness {
    harness_with(MockRuntime::new(), SandboxConfig::default())
}

fn request() -> CreateRequest {
    CreateRequest::new("project-1", APP).client(CLIENT)
}

fn statuses(rx: &mut UnboundedReceiver<Notification>) -> Vec<String> {
    let mut statuses = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let Event::EnvironmentUpdate(update) = notification.event {
            statuses.push(update.status);
        }
    }
    statuses
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn instance_id(runtime: &MockRuntime) -> String {
    runtime.get_method_calls("start")[0]
        .instance
        .clone()
        .unwrap()
}

/// Unknown ids report NotFound or no-op.
#[tokio::test]
async fn test_unknown_environment() {
    let h = harness();

    assert!(matches!(h.manager.status("missing"), Err(SandboxError::NotFound(_))));
    assert!(matches!(
        h.manager.execute("missing", "ls").await,
        Err(SandboxError::NotFound(_))
    ));
    assert!(matches!(h.manager.drain_output("missing"), Err(SandboxError::NotFound(_))));
    assert!(!h.manager.destroy("missing").await);
    assert!(!h.runtime.was_called("exec"));
}

/// A created environment is running on its endpoint and the client hears about it.
#[tokio::test]
async fn test_create_runs_environment() {
    let h = harness();
    let mut rx = h.hub.register(CLIENT);

    let id = tokio_test::assert_ok!(h.manager.create(request()).await);
    let snapshot = h.manager.status(&id).unwrap();

    assert_eq!(snapshot.status, EnvironmentStatus::Running);
    assert_eq!(snapshot.project_id, "project-1");
    assert_eq!(snapshot.url.as_deref(), Some("http://localhost:40000"));
    assert_eq!(snapshot.port, Some(40000));
    assert_eq!(h.manager.list().len(), 1);

    let build = &h.runtime.get_method_calls("build")[0];
    assert_eq!(build.command.as_deref(), Some(format!("sandbox-{}", id).as_str()));
    assert!(wait_until(|| h.runtime.was_called("stream_logs")).await);
    assert_eq!(statuses(&mut rx), vec!["created", "running"]);

    h.manager.shutdown().await;
}

/// Creating at the ceiling fails and leaves the resident count unchanged.
#[tokio::test]
async fn test_capacity_exceeded() {
    let h = harness();

    for _ in 0..10 {
        h.manager.create(request()).await.unwrap();
    }
    assert_eq!(h.manager.resident_count(), 10);

    let result = h.manager.create(request()).await;
    assert!(matches!(result, Err(SandboxError::CapacityExceeded { limit: 10 })));
    assert_eq!(h.manager.resident_count(), 10);

    h.manager.shutdown().await;
}

/// A burst of concurrent creates never overshoots the ceiling.
#[tokio::test]
async fn test_concurrent_creates_respect_ceiling() {
    let config = SandboxConfig {
        max_concurrent: 4,
        ..Default::default()
    };
    let h = harness_with(
        MockRuntime::new().with_start_delay(Duration::from_millis(30)),
        config,
    );

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = h.manager.clone();
        handles.push(tokio::spawn(async move { manager.create(request()).await }));
    }

    let mut created = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(SandboxError::CapacityExceeded { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 4);
    assert_eq!(refused, 6);
    assert_eq!(h.manager.resident_count(), 4);

    h.manager.shutdown().await;
}

/// Two concurrent destroys perform exactly one teardown.
#[tokio::test]
async fn test_concurrent_destroy_single_teardown() {
    let h = harness();
    let mut rx = h.hub.register(CLIENT);
    let id = h.manager.create(request()).await.unwrap();

    let (first, second) = tokio::join!(h.manager.destroy(&id), h.manager.destroy(&id));

    assert!(first ^ second);
    assert!(matches!(h.manager.status(&id), Err(SandboxError::NotFound(_))));
    assert_eq!(h.runtime.get_method_calls("stop").len(), 1);
    assert_eq!(h.runtime.get_method_calls("remove").len(), 1);

    // The follower sees its stream end and finds nothing left to destroy.
    let runtime = h.runtime.clone();
    let instance = instance_id(&runtime);
    assert!(wait_until(|| !runtime.is_streaming(&instance)).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let destroyed = statuses(&mut rx)
        .into_iter()
        .filter(|s| s == "destroyed")
        .count();
    assert_eq!(destroyed, 1);
    assert_eq!(h.runtime.get_method_calls("stop").len(), 1);

    h.manager.shutdown().await;
}

/// An instance whose log stream ends is reaped by its follower.
#[tokio::test]
async fn test_stream_end_destroys_environment() {
    let h = harness();
    let id = h.manager.create(request()).await.unwrap();
    let instance = instance_id(&h.runtime);
    assert!(wait_until(|| h.runtime.is_streaming(&instance)).await);

    h.runtime.end_logs(&instance);

    let manager = h.manager.clone();
    assert!(wait_until(|| manager.status(&id).is_err()).await);
    assert_eq!(h.manager.resident_count(), 0);
    assert!(h.runtime.was_called("remove"));
}

/// Followed output is buffered for the monitor and forwarded to the client.
#[tokio::test]
async fn test_output_buffered_and_forwarded() {
    let h = harness();
    let mut rx = h.hub.register(CLIENT);
    let id = h.manager.create(request()).await.unwrap();
    let instance = instance_id(&h.runtime);

    h.runtime.push_log(&instance, "VITE v5.0.0 ready");
    h.runtime.push_log(&instance, "Error: Cannot find module 'leftpad123'");

    let mut lines = Vec::new();
    for _ in 0..200 {
        lines.extend(h.manager.drain_output(&id).unwrap());
        if lines.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lines, vec!["VITE v5.0.0 ready", "Error: Cannot find module 'leftpad123'"]);
    assert!(h.manager.drain_output(&id).unwrap().is_empty());

    let mut console = Vec::new();
    while console.len() < 2 {
        let notification = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        if let Event::ConsoleLog(log) = notification.event {
            console.push(log.message);
        }
    }
    assert_eq!(console.len(), 2);
    assert!(console[1].contains("leftpad123"));

    h.manager.shutdown().await;
}

/// Execute and tail delegate to the runtime's exec.
#[tokio::test]
async fn test_execute_and_tail() {
    let runtime = MockRuntime::new()
        .on_exec("tail -n 50", ExecOutput::success("first\n\nsecond\n"))
        .on_exec("npm run build", ExecOutput::failure(1, "Build failed"));
    let h = harness_with(runtime, SandboxConfig::default());
    let id = h.manager.create(request()).await.unwrap();

    let build = h.manager.execute(&id, "npm run build").await.unwrap();
    assert_eq!(build.exit_code, 1);
    assert_eq!(build.stderr, "Build failed");

    let tail = h.manager.tail_output(&id).await.unwrap();
    assert_eq!(tail, vec!["first", "second"]);

    h.manager.shutdown().await;
}

/// A runtime failure marks the environment as errored and propagates.
#[tokio::test]
async fn test_create_failure_marks_error() {
    let h = harness_with(
        MockRuntime::new().fail_on("start", "port allocation failed"),
        SandboxConfig::default(),
    );
    let mut rx = h.hub.register(CLIENT);

    let result = h.manager.create(request()).await;
    assert!(matches!(result, Err(SandboxError::Collaborator(_))));

    let snapshots = h.manager.list();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, EnvironmentStatus::Error);
    assert!(snapshots[0].error.as_deref().unwrap().contains("port allocation"));
    assert!(h.runtime.was_called("stop"));
    assert!(matches!(
        h.manager.execute(&snapshots[0].id, "ls").await,
        Err(SandboxError::NotRunning(_))
    ));
    assert_eq!(statuses(&mut rx), vec!["created", "error"]);

    assert!(h.manager.destroy(&snapshots[0].id).await);
    assert_eq!(h.manager.resident_count(), 0);
}

/// Destroying an environment while it is starting aborts the create.
#[tokio::test]
async fn test_destroy_during_create() {
    let h = harness_with(
        MockRuntime::new().with_start_delay(Duration::from_millis(100)),
        SandboxConfig::default(),
    );

    let manager = h.manager.clone();
    let create = tokio::spawn(async move { manager.create(request()).await });

    let manager = h.manager.clone();
    assert!(wait_until(|| manager.list().iter().any(|s| s.status == EnvironmentStatus::Starting)).await);
    let id = h.manager.ids().pop().unwrap();
    assert!(h.manager.destroy(&id).await);

    let result = create.await.unwrap();
    assert!(matches!(result, Err(SandboxError::Aborted(aborted)) if aborted == id));
    assert_eq!(h.manager.resident_count(), 0);
    assert!(!h.runtime.was_called("stream_logs"));
}

/// Expiry is strict: nothing is reclaimed before the idle timeout passes.
#[tokio::test]
async fn test_expiry_window() {
    let h = harness();
    let id = h.manager.create(request()).await.unwrap();
    let now = Instant::now();

    assert!(h.manager.expired_ids(now).is_empty());
    assert!(h.manager.expired_ids(now + Duration::from_secs(299)).is_empty());
    assert_eq!(h.manager.expired_ids(now + Duration::from_secs(301)), vec![id]);

    h.manager.shutdown().await;
}

/// The reclaimer destroys environments past their timeout.
#[tokio::test]
async fn test_reclaimer_destroys_expired() {
    let config = SandboxConfig {
        idle_timeout_secs: 0,
        reclaim_interval_secs: 1,
        ..Default::default()
    };
    let h = harness_with(MockRuntime::new(), config);
    let id = h.manager.create(request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let reclaimed = h.manager.reclaim_expired().await;
    assert_eq!(reclaimed, vec![id.clone()]);

    let second = h.manager.create(request()).await.unwrap();
    h.manager.start_reclaimer();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(matches!(h.manager.status(&second), Err(SandboxError::NotFound(_))));
    h.manager.shutdown().await;
}

/// Shutdown destroys every environment and joins background tasks.
#[tokio::test]
async fn test_shutdown_cleans_up() {
    let h = harness();
    h.manager.start_reclaimer();
    for _ in 0..3 {
        h.manager.create(request()).await.unwrap();
    }

    h.manager.shutdown().await;

    assert_eq!(h.manager.resident_count(), 0);
    assert_eq!(h.runtime.get_method_calls("remove").len(), 3);
}

/// Nothing is created once shutdown has begun, so no follower outlives it.
#[tokio::test]
async fn test_create_after_shutdown_is_rejected() {
    let h = harness();
    h.manager.shutdown().await;

    let result = h.manager.create(request()).await;

    assert!(matches!(result, Err(SandboxError::ShuttingDown)));
    assert_eq!(h.manager.resident_count(), 0);
    assert!(h.manager.list().is_empty());
    assert!(!h.runtime.was_called("build"));
    assert!(!h.runtime.was_called("stream_logs"));
}

/// A create racing shutdown is either rejected or torn down by it.
#[tokio::test]
async fn test_create_racing_shutdown_leaves_nothing_behind() {
    let h = harness_with(
        MockRuntime::new().with_start_delay(Duration::from_millis(50)),
        SandboxConfig::default(),
    );
    let manager = Arc::clone(&h.manager);
    let create = tokio::spawn(async move { manager.create(request()).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.manager.shutdown().await;
    let result = create.await.unwrap();

    assert!(matches!(
        result,
        Err(SandboxError::Aborted(_)) | Err(SandboxError::ShuttingDown)
    ));
    assert_eq!(h.manager.resident_count(), 0);
    assert!(!h.runtime.was_called("stream_logs"));
}
