//! Generation session state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forge_notify::ClientId;

use crate::phase::Phase;

/// Lifecycle status of a generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub project_id: String,
    pub status: SessionStatus,
    pub current_phase: Option<Phase>,
    /// Phases that have produced an artifact, in phase order
    pub artifacts: Vec<Phase>,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One request tracked through the phase pipeline.
#[derive(Debug, Clone)]
pub(crate) struct GenerationSession {
    pub id: String,
    pub project_id: String,
    pub client: Option<ClientId>,
    pub prompt: String,
    pub context: serde_json::Value,
    pub status: SessionStatus,
    pub current_phase: Option<Phase>,
    pub artifacts: BTreeMap<Phase, String>,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationSession {
    pub fn new(
        id: String,
        project_id: String,
        client: Option<ClientId>,
        prompt: String,
        context: serde_json::Value,
    ) -> Self {
        Self {
            id,
            project_id,
            client,
            prompt,
            context,
            status: SessionStatus::Pending,
            current_phase: None,
            artifacts: BTreeMap::new(),
            errors: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.current_phase = None;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts.keys().map(|p| p.name().to_string()).collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            project_id: self.project_id.clone(),
            status: self.status,
            current_phase: self.current_phase,
            artifacts: self.artifacts.keys().copied().collect(),
            errors: self.errors.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GenerationSession {
        GenerationSession::new(
            "gen_1".into(),
            "proj".into(),
            None,
            "todo".into(),
            serde_json::Value::Null,
        )
    }

    #[test]
    fn test_finish_is_one_way() {
        let mut session = session();
        session.status = SessionStatus::InProgress;

        assert!(session.finish(SessionStatus::Cancelled));
        assert!(session.completed_at.is_some());
        assert!(!session.finish(SessionStatus::Completed));
        assert_eq!(session.status, SessionStatus::Cancelled);
    }

    #[test]
    fn test_snapshot_lists_artifact_names_only() {
        let mut session = session();
        session.artifacts.insert(Phase::Frontend, "code".into());
        session.artifacts.insert(Phase::Architecture, "plan".into());

        let snapshot = session.snapshot();
        assert_eq!(snapshot.artifacts, vec![Phase::Architecture, Phase::Frontend]);
        assert_eq!(session.artifact_names(), vec!["architecture", "frontend"]);
        assert_eq!(SessionStatus::InProgress.to_string(), "in_progress");
    }
}
