//! Generation orchestrator.
//!
//! Each session runs its phases in order on its own background task. The
//! session table is guarded by one lock that is never held across an await.
//! Cancellation is cooperative: the runner checks the session status before
//! each phase, so an in-flight phase always finishes first.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forge_notify::{ClientId, Event, GenerationUpdate, Notifier};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{collect_artifact, GenerationClient};
use crate::error::{GenerationError, GenerationResult};
use crate::phase::Phase;
use crate::session::{GenerationSession, SessionSnapshot, SessionStatus};

/// Poll interval for [`GenerationOrchestrator::wait`] when another caller
/// already owns the runner handle.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Input to [`GenerationOrchestrator::start`].
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub project_id: String,
    /// Client that receives progress events
    pub client: Option<ClientId>,
    pub context: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            project_id: project_id.into(),
            client: None,
            context: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn client(mut self, client: impl Into<ClientId>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Runs generation sessions through the phase pipeline.
pub struct GenerationOrchestrator {
    client: Arc<dyn GenerationClient>,
    notifier: Arc<dyn Notifier>,
    sessions: Mutex<HashMap<String, GenerationSession>>,
    runners: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Set by shutdown under the session lock
    closed: AtomicBool,
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self {
            client,
            notifier,
            sessions: Mutex::new(HashMap::new()),
            runners: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Register a session and start its phases in the background.
    ///
    /// Returns the session id immediately, or
    /// [`GenerationError::ShuttingDown`] once [`Self::shutdown`] has begun.
    pub fn start(self: &Arc<Self>, request: GenerationRequest) -> GenerationResult<String> {
        let id = format!("gen_{}", Uuid::new_v4().simple());
        let session = GenerationSession::new(
            id.clone(),
            request.project_id,
            request.client,
            request.prompt,
            request.context,
        );

        // The runner is registered under the session lock, so shutdown joins
        // every session it can see.
        let mut sessions = self.sessions.lock();
        if self.closed.load(Ordering::SeqCst) {
            warn!("Rejecting generation request, orchestrator is shutting down");
            return Err(GenerationError::ShuttingDown);
        }
        sessions.insert(id.clone(), session);

        let inner = tokio::spawn(Arc::clone(self).run(id.clone()));
        let orchestrator = Arc::clone(self);
        let session_id = id.clone();
        let supervisor = tokio::spawn(async move {
            if let Err(e) = inner.await {
                error!(session_id = %session_id, "Phase runner aborted: {}", e);
                orchestrator
                    .fail(&session_id, format!("phase runner aborted: {}", e))
                    .await;
            }
        });
        self.runners.lock().insert(id.clone(), supervisor);
        drop(sessions);

        info!(session_id = %id, "Generation session created");
        Ok(id)
    }

    async fn run(self: Arc<Self>, id: String) {
        let Some((context, client)) = self.begin(&id) else {
            debug!(session_id = %id, "Session no longer pending, not starting");
            return;
        };
        self.notify(client.as_ref(), GenerationUpdate::session(&id, "started"))
            .await;

        for phase in Phase::ALL {
            let Some(prompt) = self.enter_phase(&id, phase) else {
                info!(session_id = %id, phase = %phase, "Session stopped before phase");
                return;
            };

            debug!(session_id = %id, phase = %phase, "Running phase");
            let stream = self.client.generate(&prompt, &context, true);
            match collect_artifact(stream).await {
                Ok(artifact) => {
                    let stored = {
                        let mut sessions = self.sessions.lock();
                        match sessions.get_mut(&id) {
                            Some(session) => {
                                session.artifacts.insert(phase, artifact);
                                true
                            }
                            None => false,
                        }
                    };
                    if !stored {
                        return;
                    }
                    info!(session_id = %id, phase = %phase, "Phase completed");
                    self.notify(
                        client.as_ref(),
                        GenerationUpdate::phase(&id, phase.name(), "completed"),
                    )
                    .await;
                }
                Err(e) => {
                    self.fail(&id, format!("{} phase failed: {}", phase, e)).await;
                    return;
                }
            }
        }

        let artifacts = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&id) {
                Some(session) => {
                    if session.finish(SessionStatus::Completed) {
                        Some(session.artifact_names())
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(artifacts) = artifacts {
            info!(session_id = %id, "Generation session completed");
            self.notify(
                client.as_ref(),
                GenerationUpdate::session(&id, "completed").with_artifacts(artifacts),
            )
            .await;
        }
    }

    /// Move a pending session to in-progress.
    fn begin(&self, id: &str) -> Option<(serde_json::Value, Option<ClientId>)> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        if session.status != SessionStatus::Pending {
            return None;
        }
        session.status = SessionStatus::InProgress;
        Some((session.context.clone(), session.client.clone()))
    }

    /// Record the current phase and build its prompt, unless the session
    /// has left the in-progress state.
    fn enter_phase(&self, id: &str, phase: Phase) -> Option<String> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(id)?;
        if session.status != SessionStatus::InProgress {
            return None;
        }
        session.current_phase = Some(phase);
        Some(phase.build_prompt(&session.prompt, &session.context, &session.artifacts))
    }

    async fn fail(&self, id: &str, message: String) {
        let client = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(id) {
                Some(session) => {
                    if !session.finish(SessionStatus::Failed) {
                        debug!(session_id = %id, "Ignoring failure of a finished session: {}", message);
                        return;
                    }
                    session.errors.push(message.clone());
                    session.client.clone()
                }
                None => return,
            }
        };
        error!(session_id = %id, "Generation failed: {}", message);
        if let Some(client) = client {
            self.notifier.send(&client, Event::error(id, message)).await;
        }
    }

    async fn notify(&self, client: Option<&ClientId>, update: GenerationUpdate) {
        if let Some(client) = client {
            self.notifier
                .send(client, Event::GenerationUpdate(update))
                .await;
        }
    }

    pub fn status(&self, id: &str) -> GenerationResult<SessionSnapshot> {
        self.sessions
            .lock()
            .get(id)
            .map(GenerationSession::snapshot)
            .ok_or_else(|| GenerationError::SessionNotFound(id.to_string()))
    }

    /// Artifacts produced so far, keyed by phase.
    pub fn artifacts(&self, id: &str) -> GenerationResult<BTreeMap<Phase, String>> {
        self.sessions
            .lock()
            .get(id)
            .map(|session| session.artifacts.clone())
            .ok_or_else(|| GenerationError::SessionNotFound(id.to_string()))
    }

    /// Cancel a session.
    ///
    /// Returns false for unknown ids. A session that already finished keeps
    /// its terminal status.
    pub async fn cancel(&self, id: &str) -> bool {
        let (cancelled, client) = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(id) {
                Some(session) => (session.finish(SessionStatus::Cancelled), session.client.clone()),
                None => return false,
            }
        };
        if cancelled {
            info!(session_id = %id, "Generation session cancelled");
            self.notify(client.as_ref(), GenerationUpdate::session(id, "cancelled"))
                .await;
        }
        true
    }

    /// Snapshots of every session, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .lock()
            .values()
            .map(GenerationSession::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Drop a finished session from the table.
    pub fn evict(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(id) {
            Some(session) if session.status.is_terminal() => {
                sessions.remove(id);
                drop(sessions);
                self.runners.lock().remove(id);
                debug!(session_id = %id, "Session evicted");
                true
            }
            Some(_) => {
                warn!(session_id = %id, "Refusing to evict a running session");
                false
            }
            None => false,
        }
    }

    /// Wait for a session's runner to finish and return its final snapshot.
    pub async fn wait(&self, id: &str) -> GenerationResult<SessionSnapshot> {
        loop {
            let runner = self.runners.lock().remove(id);
            match runner {
                Some(runner) => {
                    if let Err(e) = runner.await {
                        error!(session_id = %id, "Session supervisor failed: {}", e);
                    }
                }
                None => {
                    let snapshot = self.status(id)?;
                    if snapshot.status.is_terminal() {
                        return Ok(snapshot);
                    }
                    tokio::time::sleep(WAIT_POLL).await;
                }
            }
        }
    }

    /// Refuse new sessions, cancel every unfinished one, join the runners
    /// and clear the table.
    pub async fn shutdown(&self) {
        info!("Shutting down generation orchestrator");
        let ids: Vec<String> = {
            let sessions = self.sessions.lock();
            self.closed.store(true, Ordering::SeqCst);
            sessions.keys().cloned().collect()
        };
        for id in &ids {
            self.cancel(id).await;
        }

        let runners: Vec<JoinHandle<()>> =
            self.runners.lock().drain().map(|(_, runner)| runner).collect();
        for runner in runners {
            if let Err(e) = runner.await {
                error!("Phase runner failed: {}", e);
            }
        }
        self.sessions.lock().clear();
    }
}
