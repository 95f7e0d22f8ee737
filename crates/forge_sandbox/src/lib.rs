//! # forge_sandbox
//!
//! Execution environment manager for PromptForge.
//!
//! Each environment is one isolated instance running a generated project.
//! The manager enforces a global concurrency ceiling, follows every
//! instance's output for its lifetime, and reclaims environments past
//! their idle timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forge_notify::LogNotifier;
//! use forge_runtime::DockerRuntime;
//! use forge_sandbox::{CreateRequest, EnvironmentManager, SandboxConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Arc::new(DockerRuntime::new().await?);
//!     let manager = EnvironmentManager::new(runtime, Arc::new(LogNotifier), SandboxConfig::default());
//!     manager.start_reclaimer();
//!
//!     let code = "export default function App() { return <h1>Hello</h1> }";
//!     let id = manager.create(CreateRequest::new("demo", code)).await?;
//!     println!("{:?}", manager.status(&id)?);
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod manager;
pub mod tasks;
pub mod template;

pub use config::SandboxConfig;
pub use environment::{EnvironmentSnapshot, EnvironmentStatus};
pub use error::{SandboxError, SandboxResult};
pub use manager::{CreateRequest, EnvironmentManager};
pub use tasks::{spawn_periodic, Shutdown};
pub use template::{Dependencies, ProjectTemplate};
