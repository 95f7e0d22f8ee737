//! # forge_notify
//!
//! Client notification channel for PromptForge.
//!
//! The generation pipeline, environment manager and error monitor report
//! progress through the [`Notifier`] trait. [`NotificationHub`] fans events
//! out to in-process subscribers; [`LogNotifier`] writes them to the log.

pub mod event;
pub mod hub;

pub use event::{
    ClientId, ConsoleLog, EnvironmentUpdate, ErrorReport, Event, GenerationUpdate, Notification,
};
pub use hub::{LogNotifier, NotificationHub, Notifier};
