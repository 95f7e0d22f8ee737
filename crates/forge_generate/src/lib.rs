//! # forge_generate
//!
//! Phased code generation for PromptForge.
//!
//! A [`GenerationOrchestrator`] drives each request through the
//! architecture, frontend, backend, tests and review phases, feeding every
//! phase's prompt from the artifacts of the phases before it. Text comes
//! from a [`GenerationClient`]: [`LlmClient`] talks to a hosted model and
//! [`ScriptedGenerator`] answers from a fixed script.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod phase;
pub mod scripted;
pub mod session;

pub use cache::PromptCache;
pub use client::{collect_artifact, GenerationClient, GenerationEvent, GenerationStream};
pub use config::LlmConfig;
pub use error::{GenerationError, GenerationResult};
pub use llm::{LlmClient, LlmProvider};
pub use orchestrator::{GenerationOrchestrator, GenerationRequest};
pub use phase::Phase;
pub use scripted::ScriptedGenerator;
pub use session::{SessionSnapshot, SessionStatus};
