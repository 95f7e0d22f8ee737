//! Error monitor.
//!
//! Periodically scans the recent output of every resident environment,
//! classifies failure lines and dispatches each new failure to its repair
//! strategy once. The monitor only looks environments up by id and never
//! keeps them alive.

use std::sync::Arc;

use forge_generate::GenerationClient;
use forge_notify::{Event, Notifier};
use forge_sandbox::{spawn_periodic, EnvironmentManager, SandboxError, Shutdown};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classifier::{Classifier, FailureKind, FailureRecord};
use crate::config::HealingConfig;
use crate::error::{HealError, HealResult};
use crate::ledger::{RepairAttempt, RepairLedger, RepairOutcome};
use crate::strategy::{RepairContext, StrategyTable};

/// Console source name of repair notifications.
const NOTIFY_SOURCE: &str = "self-healing";

/// Result of one scan pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Environments whose output was read
    pub environments: usize,
    /// Every classified failure line
    pub failures: Vec<FailureRecord>,
    /// Repairs dispatched during this pass
    pub repairs: Vec<RepairAttempt>,
}

/// Watches environment output and repairs failures.
pub struct ErrorMonitor {
    sandbox: Arc<EnvironmentManager>,
    generator: Arc<dyn GenerationClient>,
    notifier: Arc<dyn Notifier>,
    config: HealingConfig,
    classifier: Classifier,
    ledger: RepairLedger,
    strategies: StrategyTable,
    shutdown: Shutdown,
    scanner: Mutex<Option<JoinHandle<()>>>,
}

impl ErrorMonitor {
    pub fn new(
        sandbox: Arc<EnvironmentManager>,
        generator: Arc<dyn GenerationClient>,
        notifier: Arc<dyn Notifier>,
        config: HealingConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sandbox,
            generator,
            notifier,
            config,
            classifier: Classifier::default(),
            ledger: RepairLedger::new(),
            strategies: StrategyTable::default(),
            shutdown: Shutdown::new(),
            scanner: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Scan every resident environment once.
    ///
    /// A failing environment is logged and skipped; it never stops the pass.
    pub async fn scan_once(&self) -> ScanSummary {
        let ids = self.sandbox.ids();
        let pruned = self.ledger.prune(&ids);
        if pruned > 0 {
            debug!(count = pruned, "Pruned ledgers of departed environments");
        }

        let mut summary = ScanSummary::default();
        for id in ids {
            match self.scan_environment(&id, &mut summary).await {
                Ok(()) => summary.environments += 1,
                Err(HealError::Sandbox(SandboxError::NotFound(_))) => {
                    debug!(environment_id = %id, "Environment gone before scan");
                }
                Err(HealError::Sandbox(SandboxError::NotRunning(_))) => {
                    debug!(environment_id = %id, "Environment not running, skipping scan");
                }
                Err(e) => error!(environment_id = %id, "Error checking environment: {}", e),
            }
        }
        summary
    }

    async fn scan_environment(&self, id: &str, summary: &mut ScanSummary) -> HealResult<()> {
        let mut lines = self.sandbox.drain_output(id)?;
        if lines.is_empty() {
            lines = self.sandbox.tail_output(id).await?;
        }

        for record in self.classifier.classify_lines(&lines) {
            summary.failures.push(record.clone());

            if !self.config.auto_fix_enabled {
                if self.ledger.report(id, &record) {
                    self.notify(id, format!("Self-healing: detected {} failure", record.kind))
                        .await;
                }
                continue;
            }
            if !self.ledger.begin(id, &record) {
                debug!(environment_id = %id, kind = %record.kind, "Failure already attempted");
                continue;
            }
            if let Some(attempt) = self.repair(id, record).await {
                summary.repairs.push(attempt);
            }
        }
        Ok(())
    }

    /// Run the strategy for a reserved ledger entry and record its outcome.
    async fn repair(&self, id: &str, record: FailureRecord) -> Option<RepairAttempt> {
        info!(environment_id = %id, kind = %record.kind, "Attempting repair: {}", record.line);
        let outcome = self.dispatch(id, &record).await;
        if !outcome.success {
            warn!(environment_id = %id, action = %outcome.action, "Repair unsuccessful");
        }
        let message = format!("Self-healing: {}", outcome.action);
        let attempt = self.ledger.finish(id, &record.line_hash, outcome);
        self.notify(id, message).await;
        attempt
    }

    async fn dispatch(&self, id: &str, record: &FailureRecord) -> RepairOutcome {
        let ctx = RepairContext {
            environment_id: id,
            sandbox: &self.sandbox,
            generator: self.generator.as_ref(),
            config: &self.config,
        };
        let strategy = self.strategies.for_kind(record.kind);
        debug!(environment_id = %id, strategy = strategy.name(), "Dispatching repair");

        match strategy.attempt(&ctx, record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(environment_id = %id, "Error in automatic fix: {}", e);
                RepairOutcome::failure("failed", e.to_string())
            }
        }
    }

    async fn notify(&self, id: &str, message: String) {
        let client = match self.sandbox.status(id) {
            Ok(snapshot) => snapshot.client,
            Err(_) => None,
        };
        if let Some(client) = client {
            self.notifier
                .send(&client, Event::console(id, NOTIFY_SOURCE, message))
                .await;
        }
    }

    /// Repair a caller-supplied error message without classifying it.
    ///
    /// The attempt is recorded even if the same message was attempted
    /// before.
    pub async fn manual_fix(&self, id: &str, message: &str) -> HealResult<RepairAttempt> {
        if self.sandbox.status(id).is_err() {
            return Err(HealError::NotFound(id.to_string()));
        }

        let record = FailureRecord::new(FailureKind::Unknown, message.trim());
        self.ledger.begin_forced(id, &record);
        let line_hash = record.line_hash.clone();
        match self.repair(id, record).await {
            Some(attempt) => Ok(attempt),
            None => {
                // The environment went away and its ledger was pruned.
                self.ledger.abandon(id, &line_hash);
                Err(HealError::NotFound(id.to_string()))
            }
        }
    }

    /// Repair attempts for an environment, oldest first.
    pub fn attempts(&self, id: &str) -> Vec<RepairAttempt> {
        self.ledger.attempts(id)
    }

    /// Start the periodic scanner. Calling it again has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut scanner = self.scanner.lock();
        if scanner.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        *scanner = Some(spawn_periodic(
            "error-scanner",
            self.config.scan_interval(),
            self.shutdown.subscribe(),
            move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    let summary = monitor.scan_once().await;
                    if !summary.repairs.is_empty() {
                        info!(repairs = summary.repairs.len(), "Scan finished");
                    }
                }
            },
        ));
        info!(
            interval_secs = self.config.scan_interval_secs,
            auto_fix = self.config.auto_fix_enabled,
            "Error monitor started"
        );
    }

    /// Stop the scanner and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let scanner = self.scanner.lock().take();
        if let Some(scanner) = scanner {
            if let Err(e) = scanner.await {
                error!("Error scanner failed: {}", e);
            }
        }
        info!("Error monitor stopped");
    }
}
