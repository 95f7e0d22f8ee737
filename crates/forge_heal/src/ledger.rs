//! Per-environment record of repair attempts.
//!
//! A failure line is attempted at most once per environment while its
//! entry remains in the ledger. Each ledger keeps only the most recent
//! [`LEDGER_CAPACITY`] entries. Failures that are only reported, with
//! auto-fix off, are remembered separately and never become attempts.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::classifier::{FailureKind, FailureRecord};

/// Maximum attempts kept per environment.
pub const LEDGER_CAPACITY: usize = 10;

/// Result of one repair strategy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RepairOutcome {
    pub fn success(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: true,
            detail: Some(detail.into()),
        }
    }

    pub fn failure(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            detail: Some(error.into()),
        }
    }

    /// A failed outcome without detail.
    pub fn unresolved(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            detail: None,
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAttempt {
    pub line_hash: String,
    pub kind: FailureKind,
    pub line: String,
    /// Absent while the strategy is still running
    pub outcome: Option<RepairOutcome>,
    pub attempted_at: DateTime<Utc>,
}

impl RepairAttempt {
    fn pending(record: &FailureRecord) -> Self {
        Self {
            line_hash: record.line_hash.clone(),
            kind: record.kind,
            line: record.line.clone(),
            outcome: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.success)
    }
}

/// Repair ledgers keyed by environment id.
#[derive(Default)]
pub struct RepairLedger {
    ledgers: Mutex<HashMap<String, VecDeque<RepairAttempt>>>,
    reported: Mutex<HashMap<String, HashSet<String>>>,
}

impl RepairLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an attempt for a failure line.
    ///
    /// Returns false if the line was already attempted for the environment.
    pub fn begin(&self, environment_id: &str, record: &FailureRecord) -> bool {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.entry(environment_id.to_string()).or_default();
        if ledger.iter().any(|a| a.line_hash == record.line_hash) {
            return false;
        }
        push_capped(ledger, RepairAttempt::pending(record));
        true
    }

    /// Reserve an attempt even if the line was attempted before.
    pub fn begin_forced(&self, environment_id: &str, record: &FailureRecord) {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.entry(environment_id.to_string()).or_default();
        push_capped(ledger, RepairAttempt::pending(record));
    }

    /// Store the outcome of the newest pending attempt for a line.
    ///
    /// Returns the completed attempt, or `None` if the entry was evicted or
    /// pruned in the meantime.
    pub fn finish(
        &self,
        environment_id: &str,
        line_hash: &str,
        outcome: RepairOutcome,
    ) -> Option<RepairAttempt> {
        let mut ledgers = self.ledgers.lock();
        let attempt = ledgers
            .get_mut(environment_id)?
            .iter_mut()
            .rev()
            .find(|a| a.line_hash == line_hash && a.outcome.is_none())?;
        attempt.outcome = Some(outcome);
        Some(attempt.clone())
    }

    /// Drop a pending attempt so the line can be tried again.
    pub fn abandon(&self, environment_id: &str, line_hash: &str) -> bool {
        let mut ledgers = self.ledgers.lock();
        let Some(ledger) = ledgers.get_mut(environment_id) else {
            return false;
        };
        match ledger
            .iter()
            .rposition(|a| a.line_hash == line_hash && a.outcome.is_none())
        {
            Some(index) => ledger.remove(index).is_some(),
            None => false,
        }
    }

    /// Remember a failure line that is reported without a repair.
    ///
    /// Returns false if the line was already reported for the environment.
    pub fn report(&self, environment_id: &str, record: &FailureRecord) -> bool {
        self.reported
            .lock()
            .entry(environment_id.to_string())
            .or_default()
            .insert(record.line_hash.clone())
    }

    /// Attempts for an environment, oldest first.
    pub fn attempts(&self, environment_id: &str) -> Vec<RepairAttempt> {
        self.ledgers
            .lock()
            .get(environment_id)
            .map(|ledger| ledger.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the ledgers of environments not in `resident`. Returns how many
    /// were dropped.
    pub fn prune(&self, resident: &[String]) -> usize {
        let resident: HashSet<&str> = resident.iter().map(String::as_str).collect();
        self.reported
            .lock()
            .retain(|id, _| resident.contains(id.as_str()));

        let mut ledgers = self.ledgers.lock();
        let before = ledgers.len();
        ledgers.retain(|id, _| resident.contains(id.as_str()));
        before - ledgers.len()
    }
}

fn push_capped(ledger: &mut VecDeque<RepairAttempt>, attempt: RepairAttempt) {
    while ledger.len() >= LEDGER_CAPACITY {
        ledger.pop_front();
    }
    ledger.push_back(attempt);
}
