//! # forge_heal
//!
//! Error monitoring and automatic repair for PromptForge environments.
//!
//! The [`ErrorMonitor`] reads each environment's recent output, classifies
//! failure lines with the [`Classifier`] and hands every new failure to the
//! strategy the [`StrategyTable`] assigns to its kind. Outcomes are kept in
//! a bounded per-environment [`RepairLedger`], which also makes sure a given
//! line is attempted only once.

pub mod classifier;
pub mod config;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod strategy;

pub use classifier::{line_hash, Classifier, FailureKind, FailureRecord};
pub use config::{HealingConfig, RepairCommands};
pub use error::{HealError, HealResult};
pub use ledger::{RepairAttempt, RepairLedger, RepairOutcome, LEDGER_CAPACITY};
pub use monitor::{ErrorMonitor, ScanSummary};
pub use strategy::{
    extract_code, FormatStrategy, InstallStrategy, RebuildStrategy, RepairContext,
    RepairStrategy, RewriteStrategy, StrategyTable,
};
