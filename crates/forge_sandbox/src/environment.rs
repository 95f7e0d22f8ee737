//! Environment state and snapshots.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use forge_notify::ClientId;
use forge_runtime::{Endpoint, InstanceHandle};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Environment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Reserved; project tree and image are being prepared
    Creating,
    /// Instance exists and is being started
    Starting,
    /// Instance is serving on its endpoint
    Running,
    /// Instance exited
    Stopped,
    /// Creation failed
    Error,
    /// Torn down and removed from the table
    Destroyed,
}

impl EnvironmentStatus {
    /// Whether an environment in this status occupies a slot.
    pub fn is_resident(&self) -> bool {
        !matches!(self, Self::Destroyed)
    }

    /// Whether an environment in this status owns a live instance.
    pub fn has_instance(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{}", s)
    }
}

/// Read-only view of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub id: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub status: EnvironmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Client receiving this environment's events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientId>,
}

/// A resident environment as held in the manager's table.
pub(crate) struct Environment {
    pub id: String,
    pub project_id: String,
    pub client: Option<ClientId>,
    pub status: EnvironmentStatus,
    /// Present iff `status.has_instance()`
    pub handle: Option<InstanceHandle>,
    pub workdir: Option<TempDir>,
    pub endpoint: Option<Endpoint>,
    pub created_at: DateTime<Utc>,
    pub started: Instant,
    pub error: Option<String>,
    pub recent: VecDeque<String>,
}

impl Environment {
    pub fn creating(id: String, project_id: String, client: Option<ClientId>) -> Self {
        Self {
            id,
            project_id,
            client,
            status: EnvironmentStatus::Creating,
            handle: None,
            workdir: None,
            endpoint: None,
            created_at: Utc::now(),
            started: Instant::now(),
            error: None,
            recent: VecDeque::new(),
        }
    }

    pub fn snapshot(&self) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            status: self.status,
            url: self.endpoint.as_ref().map(Endpoint::url),
            port: self.endpoint.as_ref().map(|e| e.port),
            created_at: self.created_at,
            error: self.error.clone(),
            client: self.client.clone(),
        }
    }

    /// Append a line, keeping at most `limit` lines.
    pub fn remember(&mut self, line: String, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.recent.len() >= limit {
            self.recent.pop_front();
        }
        self.recent.push_back(line);
    }
}
