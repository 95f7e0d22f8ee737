//! # forge_runtime
//!
//! Container runtime contract for PromptForge preview environments.
//!
//! Every environment is one isolated instance built from a file tree,
//! started with its application port published on the host, and driven
//! through a small control surface: exec, log following, stop and remove.
//!
//! # Features
//!
//! - **Runtime Trait**: `EnvironmentRuntime`, the seam the environment manager drives
//! - **Docker Runtime**: bollard-backed implementation against the local daemon
//! - **Line Splitting**: raw output chunks reassembled into whole log lines
//! - **Mock Runtime**: scriptable runtime for testing without Docker
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_runtime::{BuildRequest, DockerRuntime, EnvironmentRuntime, InstanceSpec};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = DockerRuntime::new().await?;
//!
//!     let image = runtime
//!         .build(&BuildRequest {
//!             context_dir: PathBuf::from("/tmp/sandbox"),
//!             base_image: "node:18-alpine".to_string(),
//!             tag: "sandbox-demo".to_string(),
//!         })
//!         .await?;
//!
//!     let spec = InstanceSpec::new("sandbox-demo", 3000).workdir("/app");
//!     let handle = runtime.run(&image, &spec).await?;
//!     let endpoint = runtime.start(&handle, &spec).await?;
//!     println!("Preview at {}", endpoint.url());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod docker;
pub mod error;
pub mod lines;
pub mod mock;
pub mod runner;

pub use config::{InstanceSpec, MountConfig};
pub use docker::DockerRuntime;
pub use error::{RuntimeError, RuntimeResult};
pub use lines::{split_lines, LineBuffer};
pub use mock::{CapturedCall, MockRuntime};
pub use runner::{
    BuildRequest, Endpoint, EnvironmentRuntime, ExecOutput, ImageRef, InstanceHandle, LogLine,
    LogSource, LogStream,
};
