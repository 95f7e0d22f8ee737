//! Integration tests for the error monitor.
//!
//! Environments run on the mock runtime and rewrites come from a scripted
//! generator; no Docker daemon or model is needed.

use std::sync::Arc;
use std::time::Duration;

use forge_generate::ScriptedGenerator;
use forge_heal::{ErrorMonitor, FailureKind, HealError, HealingConfig};
use forge_notify::{Event, NotificationHub, Notifier};
use forge_runtime::{ExecOutput, MockRuntime};
use forge_sandbox::{CreateRequest, EnvironmentManager, SandboxConfig};

const APP: &str = "export default function App() { return <div> }\n";
const CLIENT: &str = "client-1";
const TAIL: &str = "tail -n 50";
const MISSING_MODULE: &str = "ModuleNotFoundError: No module named 'leftpad123'";

struct Harness {
    runtime: MockRuntime,
    generator: ScriptedGenerator,
    hub: Arc<NotificationHub>,
    sandbox: Arc<EnvironmentManager>,
    monitor: Arc<ErrorMonitor>,
}

fn harness_with(runtime: MockRuntime, generator: ScriptedGenerator, config: HealingConfig) -> Harness {
    let hub = Arc::new(NotificationHub::new());
    let notifier: Arc<dyn Notifier> = hub.clone();
    let sandbox = EnvironmentManager::new(
        Arc::new(runtime.clone()),
        notifier.clone(),
        SandboxConfig::default(),
    );
    let monitor = ErrorMonitor::new(sandbox.clone(), Arc::new(generator.clone()), notifier, config);
    Harness {
        runtime,
        generator,
        hub,
        sandbox,
        monitor,
    }
}

fn harness(runtime: MockRuntime) -> Harness {
    harness_with(runtime, ScriptedGenerator::new(), HealingConfig::default())
}

async fn create(h: &Harness) -> String {
    h.sandbox
        .create(CreateRequest::new("project-1", APP).client(CLIENT))
        .await
        .unwrap()
}

fn count_commands(runtime: &MockRuntime, pattern: &str) -> usize {
    runtime
        .executed_commands()
        .iter()
        .filter(|c| c.contains(pattern))
        .count()
}

/// A missing module is installed once; the same line seen again is skipped.
#[tokio::test]
async fn test_missing_module_installed_once() {
    let runtime = MockRuntime::new()
        .on_exec(TAIL, ExecOutput::success(format!("{}\n", MISSING_MODULE)))
        .on_exec("npm install leftpad123", ExecOutput::success("added 1 package"));
    let h = harness(runtime);
    let mut rx = h.hub.register(CLIENT);
    let id = create(&h).await;

    let first = h.monitor.scan_once().await;
    assert_eq!(first.environments, 1);
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.failures[0].kind, FailureKind::Import);
    assert_eq!(first.repairs.len(), 1);

    let second = h.monitor.scan_once().await;
    assert_eq!(second.failures.len(), 1);
    assert!(second.repairs.is_empty());

    assert_eq!(count_commands(&h.runtime, "npm install leftpad123"), 1);
    let attempts = h.monitor.attempts(&id);
    assert_eq!(attempts.len(), 1);
    let outcome = attempts[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.action, "installed_package_leftpad123");
    assert!(outcome.success);

    let mut messages = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let Event::ConsoleLog(log) = notification.event {
            if log.source == "self-healing" {
                messages.push(log.message);
            }
        }
    }
    assert_eq!(messages, vec!["Self-healing: installed_package_leftpad123"]);

    h.sandbox.shutdown().await;
}

/// Different lines of the same kind are attempted independently.
#[tokio::test]
async fn test_distinct_lines_attempted_independently() {
    let runtime = MockRuntime::new().on_exec(
        TAIL,
        ExecOutput::success(format!(
            "{}\nModuleNotFoundError: No module named 'rightpad456'\n",
            MISSING_MODULE
        )),
    );
    let h = harness(runtime);
    let id = create(&h).await;

    let summary = h.monitor.scan_once().await;
    assert_eq!(summary.repairs.len(), 2);
    assert_eq!(count_commands(&h.runtime, "npm install leftpad123"), 1);
    assert_eq!(count_commands(&h.runtime, "npm install rightpad456"), 1);
    assert_eq!(h.monitor.attempts(&id).len(), 2);

    h.sandbox.shutdown().await;
}

/// Buffered output is used before the tail command.
#[tokio::test]
async fn test_buffered_output_triggers_rebuild_fallback() {
    let runtime = MockRuntime::new()
        .on_exec("npm run build", ExecOutput::failure(1, "tsc exited with 2"))
        .on_exec("npm install --force", ExecOutput::success("up to date"));
    let h = harness(runtime);
    let id = create(&h).await;

    let instance = h.runtime.get_method_calls("start")[0].instance.clone().unwrap();
    for _ in 0..200 {
        if h.runtime.is_streaming(&instance) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    h.runtime.push_log(&instance, "error during build: Build failed");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = h.monitor.scan_once().await;
    assert_eq!(summary.repairs.len(), 1);
    assert_eq!(count_commands(&h.runtime, TAIL), 0);

    let outcome = summary.repairs[0].outcome.clone().unwrap();
    assert_eq!(outcome.action, "reinstalled_dependencies");
    assert!(outcome.success);
    assert!(h.monitor.attempts(&id)[0].succeeded());

    h.sandbox.shutdown().await;
}

/// Lint repair reports failure only when both fixers fail.
#[tokio::test]
async fn test_lint_fallbacks_exhausted() {
    let runtime = MockRuntime::new()
        .on_exec(TAIL, ExecOutput::success("ESLint error: 3 problems"))
        .on_exec("npx eslint", ExecOutput::failure(1, "3 problems (3 errors)"))
        .on_exec("npx prettier", ExecOutput::failure(2, "prettier not found"));
    let h = harness(runtime);
    create(&h).await;

    let summary = h.monitor.scan_once().await;
    let outcome = summary.repairs[0].outcome.clone().unwrap();
    assert_eq!(outcome.action, "lint_failed");
    assert!(!outcome.success);
    assert_eq!(outcome.detail.as_deref(), Some("3 problems (3 errors)"));

    h.sandbox.shutdown().await;
}

/// Syntax errors are fixed by rewriting the first source file.
#[tokio::test]
async fn test_syntax_error_rewrites_source() {
    let fixed = "export default function App() { return <div /> }";
    let runtime = MockRuntime::new()
        .on_exec(TAIL, ExecOutput::success("SyntaxError: Unexpected token '<'"))
        .on_exec("find .", ExecOutput::success("./src/App.tsx\n"))
        .on_exec("cat './src/App.tsx'", ExecOutput::success(APP));
    let generator = ScriptedGenerator::new().respond(
        "Fix the following code error",
        &format!("Here is the corrected file:\n```tsx\n{}\n```\n", fixed),
    );
    let h = harness_with(runtime, generator, HealingConfig::default());
    create(&h).await;

    let summary = h.monitor.scan_once().await;
    let outcome = summary.repairs[0].outcome.clone().unwrap();
    assert_eq!(outcome.action, "fixed_syntax_error");
    assert!(outcome.success);

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(APP.trim()));
    assert!(prompts[0].contains("SyntaxError: Unexpected token '<'"));

    let write = h
        .runtime
        .executed_commands()
        .into_iter()
        .find(|c| c.starts_with("cat > './src/App.tsx'"))
        .unwrap();
    assert!(write.contains(fixed));
    assert!(!write.contains("```"));

    h.sandbox.shutdown().await;
}

/// An unchanged rewrite is reported as unresolved and nothing is written.
#[tokio::test]
async fn test_unchanged_rewrite_not_written() {
    let runtime = MockRuntime::new()
        .on_exec(TAIL, ExecOutput::success("TypeError: cannot read x"))
        .on_exec("find .", ExecOutput::success("./src/App.tsx\n"))
        .on_exec("cat './src/App.tsx'", ExecOutput::success(APP));
    let generator = ScriptedGenerator::new().respond("Fix the following code error", APP);
    let h = harness_with(runtime, generator, HealingConfig::default());
    create(&h).await;

    let summary = h.monitor.scan_once().await;
    let outcome = summary.repairs[0].outcome.clone().unwrap();
    assert_eq!(outcome.action, "could_not_fix_type");
    assert!(!outcome.success);
    assert_eq!(count_commands(&h.runtime, "cat > "), 0);

    h.sandbox.shutdown().await;
}

/// With auto-fix off, failures are reported but no strategy runs.
#[tokio::test]
async fn test_auto_fix_disabled() {
    let runtime = MockRuntime::new().on_exec(TAIL, ExecOutput::success(MISSING_MODULE));
    let config = HealingConfig {
        auto_fix_enabled: false,
        ..Default::default()
    };
    let h = harness_with(runtime, ScriptedGenerator::new(), config);
    let id = create(&h).await;

    let summary = h.monitor.scan_once().await;
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.repairs.is_empty());
    assert_eq!(count_commands(&h.runtime, "npm install"), 0);
    assert!(h.monitor.attempts(&id).is_empty());

    h.sandbox.shutdown().await;
}

/// A report-only failure that stays in the tail is announced once.
#[tokio::test]
async fn test_auto_fix_disabled_reports_each_line_once() {
    let runtime = MockRuntime::new().on_exec(TAIL, ExecOutput::success(MISSING_MODULE));
    let config = HealingConfig {
        auto_fix_enabled: false,
        ..Default::default()
    };
    let h = harness_with(runtime, ScriptedGenerator::new(), config);
    let mut rx = h.hub.register(CLIENT);
    let id = create(&h).await;

    for _ in 0..3 {
        let summary = h.monitor.scan_once().await;
        assert_eq!(summary.failures.len(), 1);
    }

    let mut detected = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let Event::ConsoleLog(log) = notification.event {
            if log.source == "self-healing" {
                detected.push(log.message);
            }
        }
    }
    assert_eq!(detected, vec!["Self-healing: detected import failure".to_string()]);
    assert!(h.monitor.attempts(&id).is_empty());

    h.sandbox.shutdown().await;
}

/// Manual requests skip classification and deduplication.
#[tokio::test]
async fn test_manual_fix() {
    let runtime = MockRuntime::new()
        .on_exec(TAIL, ExecOutput::success(""))
        .on_exec("find .", ExecOutput::success(""));
    let h = harness(runtime);
    let id = create(&h).await;

    let attempt = h.monitor.manual_fix(&id, "the page is blank").await.unwrap();
    assert_eq!(attempt.kind, FailureKind::Unknown);
    assert_eq!(attempt.outcome.as_ref().unwrap().action, "file_not_found");

    tokio_test::assert_ok!(h.monitor.manual_fix(&id, "the page is blank").await);
    assert_eq!(h.monitor.attempts(&id).len(), 2);

    assert!(matches!(
        h.monitor.manual_fix("missing", "boom").await,
        Err(HealError::NotFound(_))
    ));

    h.sandbox.shutdown().await;
}

/// Ledgers of destroyed environments are dropped on the next scan.
#[tokio::test]
async fn test_ledger_pruned_after_destroy() {
    let runtime = MockRuntime::new().on_exec(TAIL, ExecOutput::success(MISSING_MODULE));
    let h = harness(runtime);
    let id = create(&h).await;

    h.monitor.scan_once().await;
    assert_eq!(h.monitor.attempts(&id).len(), 1);

    assert!(h.sandbox.destroy(&id).await);
    let summary = h.monitor.scan_once().await;
    assert_eq!(summary.environments, 0);
    assert!(h.monitor.attempts(&id).is_empty());
}

/// A runtime failure on one environment does not abort the scan.
#[tokio::test]
async fn test_runtime_failure_skips_environment() {
    let runtime = MockRuntime::new().fail_on("exec", "daemon unavailable");
    let h = harness(runtime);
    create(&h).await;

    let summary = h.monitor.scan_once().await;
    assert_eq!(summary.environments, 0);
    assert!(summary.failures.is_empty());

    h.sandbox.shutdown().await;
}

/// The periodic scanner repairs without being called directly.
#[tokio::test]
async fn test_periodic_scanner() {
    let runtime = MockRuntime::new().on_exec(TAIL, ExecOutput::success(MISSING_MODULE));
    let config = HealingConfig {
        scan_interval_secs: 1,
        ..Default::default()
    };
    let h = harness_with(runtime, ScriptedGenerator::new(), config);
    let id = create(&h).await;

    h.monitor.start();
    h.monitor.start();
    tokio::time::sleep(Duration::from_millis(1300)).await;
    h.monitor.shutdown().await;

    assert_eq!(h.monitor.attempts(&id).len(), 1);
    h.sandbox.shutdown().await;
}
