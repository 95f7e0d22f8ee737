//! Event payloads delivered to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a connected client.
pub type ClientId = String;

/// Progress of a generation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationUpdate {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Phase the update concerns, absent for session-level updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    pub status: String,
    /// Names of the artifacts produced so far
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl GenerationUpdate {
    pub fn session(session_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: None,
            status: status.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn phase(
        session_id: impl Into<String>,
        phase: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            phase: Some(phase.into()),
            status: status.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Lifecycle change of an execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentUpdate {
    #[serde(rename = "environmentId")]
    pub environment_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EnvironmentUpdate {
    pub fn new(environment_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            status: status.into(),
            url: None,
            port: None,
            message: None,
        }
    }

    pub fn endpoint(mut self, url: impl Into<String>, port: u16) -> Self {
        self.url = Some(url.into());
        self.port = Some(port);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One line of environment output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLog {
    #[serde(rename = "environmentId")]
    pub environment_id: String,
    pub source: String,
    pub message: String,
}

/// A failure reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Session or environment the failure belongs to
    pub origin: String,
    pub message: String,
}

/// Event payload, tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    GenerationUpdate(GenerationUpdate),
    EnvironmentUpdate(EnvironmentUpdate),
    ConsoleLog(ConsoleLog),
    Error(ErrorReport),
}

impl Event {
    /// Short kind name, matching the wire tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerationUpdate(_) => "generation_update",
            Self::EnvironmentUpdate(_) => "environment_update",
            Self::ConsoleLog(_) => "console_log",
            Self::Error(_) => "error",
        }
    }

    pub fn error(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorReport {
            origin: origin.into(),
            message: message.into(),
        })
    }

    pub fn console(
        environment_id: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConsoleLog(ConsoleLog {
            environment_id: environment_id.into(),
            source: source.into(),
            message: message.into(),
        })
    }
}

/// An event stamped with its send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}
